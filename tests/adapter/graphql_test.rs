use objectql::adapter::{
    AdapterConfig, AdapterError, GraphQLConfig, GraphQLFilterStyle, GraphQLPaginationStyle,
    GraphQLQuery, Target,
};
use objectql::ast::{
    AggregateFunction, Aggregation, FieldRef, FilterExpr, JoinSpec, JoinType, Pagination, Query, SortSpec, WindowFunction,
    WindowFunctionKind, WindowSpec,
};
use objectql::compile::{compile, CompileError, CompileOptions};
use serde_json::json;

fn encode_with(query: &Query, graphql: GraphQLConfig) -> Result<GraphQLQuery, AdapterError> {
    let options = CompileOptions::default()
        .with_target(Target::GraphQL)
        .with_config(AdapterConfig {
            graphql,
            ..Default::default()
        });
    match compile(query, &options) {
        Ok(output) => Ok(output.query.as_graphql().cloned().unwrap()),
        Err(CompileError::AdapterError(e)) => Err(e),
        Err(other) => panic!("unexpected compile error: {other}"),
    }
}

fn encode(query: &Query) -> Result<GraphQLQuery, AdapterError> {
    encode_with(query, GraphQLConfig::default())
}

fn orders_with_customer() -> Query {
    Query::new("order")
        .select(["id", "amount", "c.name"])
        .join(JoinSpec::new(JoinType::Left, "customer", "c", "customer_id", "c.id"))
        .filter(FilterExpr::condition("status", "eq", "open"))
        .sort(SortSpec::desc("amount"))
        .paginate(Pagination::top(10))
}

#[test]
fn test_relationship_selection() {
    let out = encode(&orders_with_customer()).unwrap();
    assert_eq!(
        out.render(),
        "order(limit: 10, order_by: [{amount: DESC}], where: {status: {eq: \"open\"}}) {\n  id\n  amount\n  c: customer {\n    name\n  }\n}"
    );
}

#[test]
fn test_window_functions_are_rejected() {
    let query = Query::new("product")
        .select(["name", "category", "sales"])
        .window(WindowFunction {
            function: WindowFunctionKind::RowNumber,
            field: None,
            offset: None,
            alias: "rank_in_category".to_string(),
            over: WindowSpec {
                partition_by: vec![FieldRef::new("category")],
                order_by: vec![SortSpec::desc("sales")],
                frame: None,
            },
        });

    let err = encode(&query).unwrap_err();
    assert!(matches!(
        err,
        AdapterError::UnsupportedInGraphQLProjection { .. }
    ));
    assert_eq!(err.path(), "windowFunctions[0]");
}

#[test]
fn test_join_without_foreign_key_is_rejected() {
    let query = Query::new("order").join(JoinSpec::new(
        JoinType::Inner,
        "customer",
        "c",
        "customer_code",
        "c.code",
    ));

    let err = encode(&query).unwrap_err();
    assert!(matches!(
        err,
        AdapterError::UnsupportedInGraphQLProjection { .. }
    ));
    assert_eq!(err.path(), "joins[0].on");
}

#[test]
fn test_relay_cursor_pagination() {
    let query = Query::new("order").paginate(Pagination::cursor("YXJyYXk6MTA="));
    let relay = GraphQLConfig {
        pagination_style: GraphQLPaginationStyle::Relay,
        default_page_size: Some(25),
        ..Default::default()
    };

    let out = encode_with(&query, relay).unwrap();
    assert_eq!(out.argument("first"), Some(&json!(25)));
    assert_eq!(out.argument("after"), Some(&json!("YXJyYXk6MTA=")));

    let err = encode(&query).unwrap_err();
    assert_eq!(
        err,
        AdapterError::UnsupportedPagination {
            mode: "cursor".to_string(),
            style: "limit_offset".to_string(),
            path: "pagination".to_string(),
        }
    );
}

#[test]
fn test_flat_style_rejects_disjunction() {
    let query = Query::new("product").filter(FilterExpr::or([
        FilterExpr::condition("price", "lt", 10),
        FilterExpr::condition("featured", "eq", true),
    ]));
    let flat = GraphQLConfig {
        filter_style: GraphQLFilterStyle::Flat,
        ..Default::default()
    };

    assert_eq!(
        encode_with(&query, flat).unwrap_err(),
        AdapterError::UnsupportedLogicalCombinatorForStyle {
            combinator: "or".to_string(),
            style: "flat".to_string(),
            path: "filters".to_string(),
        }
    );

    let nested = encode(&query).unwrap();
    assert_eq!(
        nested.argument("where"),
        Some(&json!({"OR": [{"price": {"lt": 10}}, {"featured": {"eq": true}}]}))
    );
}

#[test]
fn test_joined_field_filter_nests_under_relationship() {
    let query = Query::new("order")
        .join(JoinSpec::new(JoinType::Inner, "customer", "c", "customer_id", "c.id"))
        .filter(FilterExpr::condition("c.region", "in", vec!["EU", "UK"]));

    let out = encode(&query).unwrap();
    assert_eq!(
        out.argument("where"),
        Some(&json!({"c": {"region": {"in": ["EU", "UK"]}}}))
    );
}

#[test]
fn test_flat_style_rejects_repeated_field_and_operator() {
    let query = Query::new("product").filter(FilterExpr::and([
        FilterExpr::condition("price", "gt", 10),
        FilterExpr::condition("price", "gt", 20),
        FilterExpr::condition("price", "lt", 100),
    ]));
    let flat = GraphQLConfig {
        filter_style: GraphQLFilterStyle::Flat,
        ..Default::default()
    };

    assert_eq!(
        encode_with(&query, flat).unwrap_err(),
        AdapterError::AmbiguousEncoding {
            name: "price_gt".to_string(),
            target: Target::GraphQL,
            path: "filters.and[1]".to_string(),
        }
    );

    let ranged = Query::new("product").filter(FilterExpr::and([
        FilterExpr::condition("price", "gt", 10),
        FilterExpr::condition("price", "lt", 100),
    ]));
    let flat = GraphQLConfig {
        filter_style: GraphQLFilterStyle::Flat,
        ..Default::default()
    };
    assert_eq!(
        encode_with(&ranged, flat).unwrap().argument("where"),
        Some(&json!({"price_gt": 10, "price_lt": 100}))
    );
}

#[test]
fn test_grouping_by_a_joined_field_selects_it_on_the_relationship() {
    let query = Query::new("order")
        .join(JoinSpec::new(JoinType::Left, "customer", "c", "customer_id", "c.id"))
        .aggregate(Aggregation::new(AggregateFunction::Sum, "amount", "total"))
        .group_by("status")
        .group_by("c.region");

    let out = encode(&query).unwrap();
    assert_eq!(out.argument("group_by"), Some(&json!(["status", "c.region"])));
    assert_eq!(
        out.render_selection(),
        "{\n  status\n  total: sum(field: \"amount\")\n  c: customer {\n    region\n  }\n}"
    );
}
