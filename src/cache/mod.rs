//! Plan fingerprints and a concurrency-safe plan cache.
//!
//! # Design
//!
//! - Keys are SHA-256 hashes of a query's canonical JSON: filters and having
//!   are canonicalized first, so `and[and[a,b],c]` and `and[a,b,c]` share an
//!   entry.
//! - Plans are stored behind `Arc` and never mutated.
//! - The map is a `DashMap`; readers on different keys do not contend.
//! - No eviction. Callers own the cache's lifetime.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ast::Query;
use crate::planner::{canonicalize, LogicalPlan, PlanError, Planner};

/// Compute SHA256 hash of a serializable value.
///
/// The value is serialized to JSON before hashing. Returns a 64-character
/// lowercase hexadecimal string.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Cache key for a query, computed over its canonical form.
pub fn query_fingerprint(query: &Query) -> Result<String, serde_json::Error> {
    let mut canonical = query.clone();
    canonical.filters = query.filters.as_ref().map(|f| canonicalize(f, &query.object));
    canonical.having = query.having.as_ref().map(|h| canonicalize(h, &query.object));
    compute_hash(&canonical)
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Shared map from query fingerprint to planned query.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: DashMap<String, Arc<LogicalPlan>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached plan for a validated query, planning it on a miss.
    pub fn get_or_plan(&self, query: &Query) -> CacheResult<Arc<LogicalPlan>> {
        let key = query_fingerprint(query)?;

        if let Some(plan) = self.plans.get(&key) {
            tracing::debug!(key = %key, "plan cache hit");
            return Ok(Arc::clone(&plan));
        }

        let plan = Arc::new(Planner::new().plan(query)?);
        let entry = self.plans.entry(key).or_insert_with(|| Arc::clone(&plan));
        Ok(Arc::clone(&entry))
    }

    pub fn get(&self, query: &Query) -> CacheResult<Option<Arc<LogicalPlan>>> {
        let key = query_fingerprint(query)?;
        Ok(self.plans.get(&key).map(|p| Arc::clone(&p)))
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&self) {
        self.plans.clear();
    }
}
