//! Field references.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a field, optionally qualified by an object name or join alias.
///
/// Accepted JSON shapes:
///
/// ```text
/// "amount"                                  -> unqualified
/// "c.name"                                  -> qualified by alias `c`
/// {"field": "amount", "alias": "total"}     -> projected under an alias
/// {"field": "name", "object": "c"}          -> qualified, object form
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "FieldRefRepr")]
pub struct FieldRef {
    #[serde(rename = "object", skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(rename = "field")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl FieldRef {
    /// Unqualified reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
            alias: None,
        }
    }

    /// Reference qualified by an object name or join alias.
    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
            alias: None,
        }
    }

    /// Parse a dotted path. Only the first `.` separates qualifier from name.
    pub fn parse(path: &str) -> Self {
        match path.split_once('.') {
            Some((qualifier, name)) => Self::qualified(qualifier, name),
            None => Self::new(path),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name of the column this reference produces in an output row.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Dotted path without the projection alias.
    pub fn path(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q, self.name),
            None => self.name.clone(),
        }
    }

    /// Same reference without a projection alias, for comparisons.
    pub fn unaliased(&self) -> Self {
        Self {
            qualifier: self.qualifier.clone(),
            name: self.name.clone(),
            alias: None,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())?;
        if let Some(alias) = &self.alias {
            write!(f, " as {}", alias)?;
        }
        Ok(())
    }
}

impl From<&str> for FieldRef {
    fn from(path: &str) -> Self {
        FieldRef::parse(path)
    }
}

impl From<String> for FieldRef {
    fn from(path: String) -> Self {
        FieldRef::parse(&path)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldRefRepr {
    Path(String),
    Object {
        field: String,
        #[serde(default)]
        object: Option<String>,
        #[serde(default)]
        alias: Option<String>,
    },
}

impl From<FieldRefRepr> for FieldRef {
    fn from(repr: FieldRefRepr) -> Self {
        match repr {
            FieldRefRepr::Path(path) => FieldRef::parse(&path),
            FieldRefRepr::Object {
                field,
                object,
                alias,
            } => {
                let mut field_ref = match object {
                    Some(object) => FieldRef::qualified(object, field),
                    None => FieldRef::parse(&field),
                };
                field_ref.alias = alias;
                field_ref
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified() {
        let f = FieldRef::parse("c.name");
        assert_eq!(f.qualifier.as_deref(), Some("c"));
        assert_eq!(f.name, "name");
        assert_eq!(f.path(), "c.name");
    }

    #[test]
    fn test_deserialize_object_form() {
        let f: FieldRef =
            serde_json::from_str(r#"{"field": "amount", "alias": "total"}"#).unwrap();
        assert_eq!(f.name, "amount");
        assert_eq!(f.output_name(), "total");
        assert_eq!(f.to_string(), "amount as total");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let f = FieldRef::qualified("o", "amount").with_alias("amt");
        let json = serde_json::to_string(&f).unwrap();
        let back: FieldRef = serde_json::from_str(&json).unwrap();
        assert_eq!(f, back);
    }
}
