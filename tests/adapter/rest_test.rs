use objectql::adapter::{
    decode_filter, AdapterConfig, AdapterError, DecodeError, RestConfig, RestFilterStyle,
    RestQuery, RestSortStyle, Target,
};
use objectql::ast::{Aggregation, AggregateFunction, FilterExpr, JoinSpec, JoinType, Pagination, Query, SortSpec};
use objectql::compile::{compile, CompileError, CompileOptions};
use objectql::registry::OperatorRegistry;

fn options(rest: RestConfig) -> CompileOptions {
    CompileOptions::default()
        .with_target(Target::Rest)
        .with_config(AdapterConfig {
            rest,
            ..Default::default()
        })
}

fn encode(query: &Query, rest: RestConfig) -> Result<RestQuery, AdapterError> {
    match compile(query, &options(rest)) {
        Ok(output) => Ok(output.query.as_rest().cloned().unwrap()),
        Err(CompileError::AdapterError(e)) => Err(e),
        Err(other) => panic!("unexpected compile error: {other}"),
    }
}

fn order_totals() -> Query {
    Query::new("order")
        .aggregate(Aggregation::count("n"))
        .aggregate(Aggregation::new(AggregateFunction::Sum, "amount", "total"))
        .group_by("customer_id")
        .having(FilterExpr::or([
            FilterExpr::condition("n", "gt", 5),
            FilterExpr::condition("total", "gte", 1000),
        ]))
}

#[test]
fn test_single_condition_round_trips_through_bracket_style() {
    let query = Query::new("customer").filter(FilterExpr::condition("name", "eq", "Alice"));
    let output = compile(&query, &options(RestConfig::default())).unwrap();
    let rest = output.query.as_rest().unwrap();

    assert_eq!(rest.query_string(), "filter%5Bname%5D%5Beq%5D=Alice");

    let decoded = decode_filter(
        &rest.query_string(),
        &RestConfig::default(),
        OperatorRegistry::global(),
    )
    .unwrap();
    assert_eq!(decoded.as_ref(), output.plan.filter());
}

#[test]
fn test_or_in_having_needs_rsql() {
    let err = encode(&order_totals(), RestConfig::default()).unwrap_err();
    assert_eq!(
        err,
        AdapterError::UnsupportedLogicalCombinatorForStyle {
            combinator: "or".to_string(),
            style: "bracket".to_string(),
            path: "having".to_string(),
        }
    );

    let rest = encode(
        &order_totals(),
        RestConfig {
            filter_style: RestFilterStyle::Rsql,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(rest.param("aggregate"), Some("n:count,total:sum(amount)"));
    assert_eq!(rest.param("group_by"), Some("customer_id"));
    assert_eq!(rest.param("having"), Some("n=gt=5,total=ge=1000"));
}

#[test]
fn test_list_request() {
    let query = Query::new("order")
        .select(["id", "amount", "c.name"])
        .join(JoinSpec::new(JoinType::Left, "customer", "c", "customer_id", "c.id"))
        .filter(FilterExpr::and([
            FilterExpr::condition("status", "eq", "open"),
            FilterExpr::condition("amount", "between", vec![100, 500]),
        ]))
        .sort(SortSpec::desc("amount"))
        .sort(SortSpec::asc("id"))
        .paginate(Pagination::offset(20, 40));

    let rest = encode(&query, RestConfig::default()).unwrap();
    assert_eq!(
        rest.params,
        vec![
            ("fields".to_string(), "id,amount,c.name".to_string()),
            ("include".to_string(), "c".to_string()),
            ("filter[status][eq]".to_string(), "open".to_string()),
            ("filter[amount][between]".to_string(), "100,500".to_string()),
            ("sort".to_string(), "-amount,id".to_string()),
            ("limit".to_string(), "20".to_string()),
            ("offset".to_string(), "40".to_string()),
        ]
    );
    assert!(rest.headers.is_empty());
}

#[test]
fn test_array_sort_and_cursor_header() {
    let query = Query::new("event")
        .sort(SortSpec::desc("created_at"))
        .paginate(Pagination::cursor("c2"));

    let rest = encode(
        &query,
        RestConfig {
            sort_style: RestSortStyle::Array,
            cursor_header: Some("X-Cursor".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(rest.param("sort[]"), Some("created_at:desc"));
    assert_eq!(rest.header("x-cursor"), Some("c2"));
    assert_eq!(rest.param("cursor"), None);
}

#[test]
fn test_regex_has_no_rest_mapping() {
    let query = Query::new("product").filter(FilterExpr::condition("sku", "regex", "^A[0-9]+$"));
    let err = encode(&query, RestConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        AdapterError::UnsupportedOperatorForTarget { ref operator, target: Target::Rest, .. }
            if operator == "regex"
    ));
    assert_eq!(err.path(), "filters");
}

#[test]
fn test_dot_style_decodes_alongside_other_params() {
    let config = RestConfig {
        filter_style: RestFilterStyle::Dot,
        ..Default::default()
    };
    let decoded = decode_filter(
        "status=eq.open&amount=gt.100&sort=-amount&limit=10",
        &config,
        OperatorRegistry::global(),
    )
    .unwrap();

    assert_eq!(
        decoded,
        Some(FilterExpr::and([
            FilterExpr::condition("status", "eq", "open"),
            FilterExpr::condition("amount", "gt", 100),
        ]))
    );
}

#[test]
fn test_string_values_keep_their_kind_through_bracket_style() {
    for text in ["42", "true", "null", "2.5", "\"quoted\""] {
        let query = Query::new("customer").filter(FilterExpr::condition("code", "eq", text));
        let output = compile(&query, &options(RestConfig::default())).unwrap();
        let rest = output.query.as_rest().unwrap();

        let decoded = decode_filter(
            &rest.query_string(),
            &RestConfig::default(),
            OperatorRegistry::global(),
        )
        .unwrap();
        assert_eq!(decoded.as_ref(), output.plan.filter(), "value {text}");
    }

    let query = Query::new("customer").filter(FilterExpr::and([
        FilterExpr::condition("code", "eq", "42"),
        FilterExpr::condition("rank", "eq", 42),
    ]));
    let rest = encode(&query, RestConfig::default()).unwrap();
    assert_eq!(rest.param("filter[code][eq]"), Some("\"42\""));
    assert_eq!(rest.param("filter[rank][eq]"), Some("42"));
}

#[test]
fn test_list_items_containing_the_separator_round_trip() {
    let query = Query::new("store").filter(FilterExpr::condition(
        "city",
        "in",
        vec!["Paris, TX", "Rome", "7"],
    ));

    let bracket = compile(&query, &options(RestConfig::default())).unwrap();
    let rest = bracket.query.as_rest().unwrap();
    assert_eq!(rest.param("filter[city][in]"), Some("\"Paris, TX\",Rome,\"7\""));
    let decoded = decode_filter(
        &rest.query_string(),
        &RestConfig::default(),
        OperatorRegistry::global(),
    )
    .unwrap();
    assert_eq!(decoded.as_ref(), bracket.plan.filter());

    let dot_config = RestConfig {
        filter_style: RestFilterStyle::Dot,
        ..Default::default()
    };
    let dot = compile(&query, &options(dot_config.clone())).unwrap();
    let rest = dot.query.as_rest().unwrap();
    assert_eq!(rest.param("city"), Some("in.(\"Paris, TX\",Rome,\"7\")"));
    let decoded = decode_filter(&rest.query_string(), &dot_config, OperatorRegistry::global()).unwrap();
    assert_eq!(decoded.as_ref(), dot.plan.filter());
}

#[test]
fn test_unterminated_quoted_list_item_is_malformed() {
    let result = decode_filter(
        "filter%5Bcity%5D%5Bin%5D=%22Paris%2CRome",
        &RestConfig::default(),
        OperatorRegistry::global(),
    );
    assert!(matches!(result, Err(DecodeError::MalformedParameter(_))));
}

#[test]
fn test_filter_field_named_like_a_reserved_parameter() {
    let query = Query::new("quota")
        .filter(FilterExpr::condition("limit", "gt", 5))
        .paginate(Pagination::top(10));

    for style in [RestFilterStyle::Dot, RestFilterStyle::Flat] {
        let err = encode(
            &query,
            RestConfig {
                filter_style: style,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            AdapterError::AmbiguousEncoding {
                name: "limit".to_string(),
                target: Target::Rest,
                path: "filters.field".to_string(),
            }
        );
    }

    // Bracket style keys conditions under the filter parameter.
    let output = compile(&query, &options(RestConfig::default())).unwrap();
    let rest = output.query.as_rest().unwrap();
    assert_eq!(rest.query_string(), "filter%5Blimit%5D%5Bgt%5D=5&limit=10");
    let decoded = decode_filter(
        &rest.query_string(),
        &RestConfig::default(),
        OperatorRegistry::global(),
    )
    .unwrap();
    assert_eq!(decoded.as_ref(), output.plan.filter());
}

#[test]
fn test_field_sharing_the_having_prefix_is_a_filter() {
    let flat = RestConfig {
        filter_style: RestFilterStyle::Flat,
        ..Default::default()
    };
    let query = Query::new("report").filter(FilterExpr::condition("having_total", "eq", 5));
    let rest = encode(&query, flat.clone()).unwrap();
    assert_eq!(rest.param("having_total"), Some("5"));

    let decoded = decode_filter(&rest.query_string(), &flat, OperatorRegistry::global()).unwrap();
    assert_eq!(decoded, Some(FilterExpr::condition("having_total", "eq", 5)));

    let doubled = Query::new("report").filter(FilterExpr::condition("price__gte", "eq", 5));
    let err = encode(&doubled, flat).unwrap_err();
    assert!(matches!(err, AdapterError::AmbiguousEncoding { .. }));
}
