use objectql::adapter::{
    AdapterConfig, AdapterError, ExpandConfig, ODataConfig, ODataQuery, ODataVersion, Target,
};
use objectql::ast::{FilterExpr, JoinSpec, JoinType, Pagination, Query, SortSpec};
use objectql::compile::{compile, compile_json, CompileError, CompileOptions};

fn options(odata: ODataConfig) -> CompileOptions {
    CompileOptions::default()
        .with_target(Target::OData)
        .with_config(AdapterConfig {
            odata,
            ..Default::default()
        })
}

fn encode_with(query: &Query, odata: ODataConfig) -> Result<ODataQuery, AdapterError> {
    match compile(query, &options(odata)) {
        Ok(output) => Ok(output.query.as_odata().cloned().unwrap()),
        Err(CompileError::AdapterError(e)) => Err(e),
        Err(other) => panic!("unexpected compile error: {other}"),
    }
}

fn encode(query: &Query) -> Result<ODataQuery, AdapterError> {
    encode_with(query, ODataConfig::default())
}

fn v2() -> ODataConfig {
    ODataConfig {
        version: ODataVersion::V2,
        ..Default::default()
    }
}

fn orders_with_customer() -> Query {
    Query::new("order")
        .select(["id", "c.name"])
        .join(JoinSpec::new(JoinType::Left, "customer", "c", "customer_id", "c.id"))
        .filter(FilterExpr::condition("c.region", "eq", "EU"))
}

#[test]
fn test_order_aggregation_uses_apply() {
    let json = r#"{
        "object": "order",
        "filters": ["status", "=", "paid"],
        "aggregations": [
            {"function": "count", "alias": "n"},
            {"function": "sum", "field": "amount", "alias": "total"}
        ],
        "groupBy": ["customer_id"],
        "having": [["n", ">", 5], "and", ["total", ">=", 1000]],
        "sort": ["-total"],
        "pagination": {"top": 10}
    }"#;

    let output = compile_json(json, &options(ODataConfig::default())).unwrap();
    let odata = output.query.as_odata().unwrap();
    assert_eq!(
        odata.options,
        vec![
            (
                "$apply".to_string(),
                "filter(status eq 'paid')/groupby((customer_id),aggregate($count as n,amount with sum as total))/filter(n gt 5 and total ge 1000)".to_string()
            ),
            ("$orderby".to_string(), "total desc".to_string()),
            ("$top".to_string(), "10".to_string()),
        ]
    );
}

#[test]
fn test_v4_expand_with_nested_select() {
    let out = encode(&orders_with_customer()).unwrap();
    assert_eq!(out.option("$select"), Some("id"));
    assert_eq!(out.option("$expand"), Some("customer($select=name)"));
    assert_eq!(out.option("$filter"), Some("customer/region eq 'EU'"));
}

#[test]
fn test_v2_selects_navigation_paths() {
    let out = encode_with(&orders_with_customer(), v2()).unwrap();
    assert_eq!(out.option("$select"), Some("id,customer/name"));
    assert_eq!(out.option("$expand"), Some("customer"));
    assert_eq!(out.option("$filter"), Some("customer/region eq 'EU'"));
}

#[test]
fn test_expand_depth_limit() {
    let query = Query::new("order")
        .join(JoinSpec::new(JoinType::Inner, "line", "l", "id", "l.order_id"))
        .join(JoinSpec::new(JoinType::Inner, "product", "p", "l.product_id", "p.id"));
    let shallow = ODataConfig {
        expand: ExpandConfig { max_depth: 1 },
        ..Default::default()
    };

    assert_eq!(
        encode_with(&query, shallow).unwrap_err(),
        AdapterError::ExpandDepthExceeded {
            depth: 2,
            limit: 1,
            path: "joins[1]".to_string(),
        }
    );

    let out = encode(&query).unwrap();
    assert_eq!(out.option("$expand"), Some("line($expand=product)"));
}

#[test]
fn test_subquery_join_becomes_expand_options() {
    let payments = Query::new("payment")
        .filter(FilterExpr::condition("status", "eq", "settled"))
        .sort(SortSpec::desc("created_at"))
        .paginate(Pagination::top(5));
    let query = Query::new("order").join(
        JoinSpec::new(JoinType::Left, "payment", "p", "id", "p.order_id").with_subquery(payments),
    );

    let out = encode(&query).unwrap();
    assert_eq!(
        out.option("$expand"),
        Some("payment($filter=status eq 'settled';$orderby=created_at desc;$top=5)")
    );

    let err = encode_with(&query, v2()).unwrap_err();
    assert!(matches!(err, AdapterError::UnsupportedFeature { .. }));
    assert_eq!(err.path(), "joins[0].subquery");
}

#[test]
fn test_v2_literals_and_functions() {
    let query = Query::new("product").filter(FilterExpr::and([
        FilterExpr::condition("status", "in", vec!["new", "used"]),
        FilterExpr::condition("stock", "gt", 3_000_000_000i64),
        FilterExpr::condition("name", "contains", "O'Brien"),
    ]));

    let out = encode_with(&query, v2()).unwrap();
    assert_eq!(
        out.option("$filter"),
        Some("(status eq 'new' or status eq 'used') and stock gt 3000000000L and substringof('O''Brien',name)")
    );
}

#[test]
fn test_function_allow_list() {
    let query = Query::new("product").filter(FilterExpr::condition("sku", "regex", "^A[0-9]+$"));
    assert_eq!(
        encode(&query).unwrap_err(),
        AdapterError::UnsupportedODataFunction {
            function: "matchesPattern".to_string(),
            path: "filters".to_string(),
        }
    );

    let permissive = ODataConfig {
        allowed_functions: vec!["matchesPattern".to_string()],
        ..Default::default()
    };
    let out = encode_with(&query, permissive).unwrap();
    assert_eq!(out.option("$filter"), Some("matchesPattern(sku,'^A[0-9]+$')"));
}

#[test]
fn test_count_option_per_version() {
    let query = Query::new("order").paginate(Pagination::offset(20, 40));

    let v4 = encode_with(
        &query,
        ODataConfig {
            include_count: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(v4.to_query_string(), "$top=20&$skip=40&$count=true");

    let v2 = encode_with(
        &query,
        ODataConfig {
            include_count: true,
            ..v2()
        },
    )
    .unwrap();
    assert_eq!(v2.option("$inlinecount"), Some("allpages"));
    assert_eq!(v2.option("$count"), None);
}

#[test]
fn test_cursor_maps_to_skiptoken() {
    let out = encode(&Query::new("order").paginate(Pagination::cursor("abc"))).unwrap();
    assert_eq!(out.option("$skiptoken"), Some("abc"));
}

#[test]
fn test_two_aliases_of_one_relationship_are_ambiguous() {
    let query = Query::new("shipment")
        .select(["id", "o.city", "d.city"])
        .join(JoinSpec::new(JoinType::Inner, "address", "o", "origin_id", "o.id"))
        .join(JoinSpec::new(JoinType::Inner, "address", "d", "destination_id", "d.id"));

    for odata in [ODataConfig::default(), v2()] {
        assert_eq!(
            encode_with(&query, odata).unwrap_err(),
            AdapterError::AmbiguousEncoding {
                name: "address".to_string(),
                target: Target::OData,
                path: "joins[1]".to_string(),
            }
        );
    }
}
