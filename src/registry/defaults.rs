//! The canonical operator set.

use super::{Arity, OperatorMapping};

fn comparison(operator: &str, graphql: &str, odata: &str) -> OperatorMapping {
    OperatorMapping::new(operator, Arity::Scalar)
        .with_rest(operator)
        .with_graphql(graphql)
        .with_odata(format!("{{field}} {} {{value}}", odata))
}

pub(super) fn canonical_operators() -> Vec<OperatorMapping> {
    vec![
        comparison("eq", "eq", "eq"),
        comparison("ne", "neq", "ne"),
        comparison("gt", "gt", "gt"),
        comparison("gte", "gte", "ge"),
        comparison("lt", "lt", "lt"),
        comparison("lte", "lte", "le"),
        OperatorMapping::new("in", Arity::List)
            .with_rest("in")
            .with_graphql("in")
            .with_odata("{field} in ({values})"),
        OperatorMapping::new("nin", Arity::List)
            .with_rest("nin")
            .with_graphql("nin")
            .with_odata("not ({field} in ({values}))"),
        OperatorMapping::new("contains", Arity::Scalar)
            .with_rest("contains")
            .with_graphql("contains")
            .with_odata("contains({field},{value})"),
        OperatorMapping::new("starts_with", Arity::Scalar)
            .with_rest("starts_with")
            .with_graphql("startsWith")
            .with_odata("startswith({field},{value})"),
        OperatorMapping::new("ends_with", Arity::Scalar)
            .with_rest("ends_with")
            .with_graphql("endsWith")
            .with_odata("endswith({field},{value})"),
        // `exists: false` is encoded as the negation of the template.
        OperatorMapping::new("exists", Arity::Flag)
            .with_rest("exists")
            .with_graphql("exists")
            .with_odata("{field} ne null"),
        OperatorMapping::new("regex", Arity::Scalar)
            .with_graphql("regex")
            .with_odata("matchesPattern({field},{value})"),
        OperatorMapping::new("between", Arity::Range)
            .with_rest("between")
            .with_odata("({field} ge {low} and {field} le {high})"),
    ]
}
