use objectql::ast::{
    Aggregation, FieldRef, FilterExpr, JoinSpec, JoinType, Pagination, Query, SortSpec,
    WindowFunction, WindowFunctionKind, WindowSpec,
};
use objectql::cache::{query_fingerprint, PlanCache};
use objectql::planner::logical::{PaginateStage, SourceId};
use objectql::planner::{plan, StageKind};

fn leaf(name: &str, value: i64) -> FilterExpr {
    FilterExpr::condition(name, "eq", value)
}

#[test]
fn test_planning_is_deterministic() {
    let query = Query::new("order")
        .join(JoinSpec::new(JoinType::Left, "customer", "c", "customer_id", "c.id"))
        .filter(FilterExpr::and([leaf("a", 1), FilterExpr::condition("c.region", "eq", "EU")]))
        .sort(SortSpec::desc("amount"))
        .paginate(Pagination::offset(50, 100));

    let first = plan(&query).unwrap();
    let second = plan(&query).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
}

#[test]
fn test_nested_and_flattens_to_same_plan() {
    let nested = Query::new("t").filter(FilterExpr::and([
        FilterExpr::and([leaf("a", 1), leaf("b", 2)]),
        leaf("c", 3),
    ]));
    let flat = Query::new("t").filter(FilterExpr::and([leaf("a", 1), leaf("b", 2), leaf("c", 3)]));

    let nested_plan = plan(&nested).unwrap();
    let flat_plan = plan(&flat).unwrap();

    assert_eq!(nested_plan, flat_plan);
    assert_eq!(
        nested_plan.fingerprint().unwrap(),
        flat_plan.fingerprint().unwrap()
    );
    assert_eq!(
        nested_plan.filter(),
        Some(&FilterExpr::and([leaf("a", 1), leaf("b", 2), leaf("c", 3)]))
    );
}

#[test]
fn test_root_qualifier_is_normalized() {
    let qualified = Query::new("order")
        .select(["order.status"])
        .filter(FilterExpr::condition("order.amount", "gt", 5));
    let bare = Query::new("order")
        .select(["status"])
        .filter(FilterExpr::condition("amount", "gt", 5));

    assert_eq!(plan(&qualified).unwrap(), plan(&bare).unwrap());
}

#[test]
fn test_operand_order_changes_fingerprint() {
    let ab = Query::new("t").filter(FilterExpr::and([leaf("a", 1), leaf("b", 2)]));
    let ba = Query::new("t").filter(FilterExpr::and([leaf("b", 2), leaf("a", 1)]));
    assert_ne!(
        plan(&ab).unwrap().fingerprint().unwrap(),
        plan(&ba).unwrap().fingerprint().unwrap()
    );
}

#[test]
fn test_aggregate_with_having_stages() {
    let query = Query::new("order")
        .aggregate(Aggregation::count("n"))
        .group_by("customer_id")
        .having(FilterExpr::condition("n", "gt", 5));

    let plan = plan(&query).unwrap();
    assert_eq!(
        plan.stage_kinds(),
        vec![StageKind::Source, StageKind::Aggregate, StageKind::Having]
    );
    let aggregate = plan.aggregate().unwrap();
    assert_eq!(aggregate.group_by, vec![FieldRef::new("customer_id")]);
    assert_eq!(aggregate.aggregates, vec![Aggregation::count("n")]);
}

#[test]
fn test_group_by_without_aggregations_still_aggregates() {
    let plan = plan(&Query::new("order").group_by("status")).unwrap();
    assert!(plan.has_stage(StageKind::Aggregate));
    assert!(plan.aggregate().unwrap().aggregates.is_empty());
}

#[test]
fn test_window_stage_for_ranked_products() {
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
        })
        .sort(SortSpec::asc("category"));

    let plan = plan(&query).unwrap();
    assert_eq!(
        plan.stage_kinds(),
        vec![StageKind::Source, StageKind::Window, StageKind::Sort]
    );
    assert_eq!(plan.windows().len(), 1);
    assert_eq!(plan.windows()[0].alias, "rank_in_category");
    assert_eq!(plan.projection.len(), 3);
}

#[test]
fn test_join_order_is_preserved() {
    let query = Query::new("order")
        .join(JoinSpec::new(JoinType::Inner, "line", "l", "id", "l.order_id"))
        .join(JoinSpec::new(JoinType::Inner, "product", "p", "l.product_id", "p.id"))
        .join(JoinSpec::new(JoinType::Left, "customer", "c", "customer_id", "c.id"));

    let plan = plan(&query).unwrap();
    let targets: Vec<SourceId> = plan.joins().map(|j| j.target).collect();
    assert_eq!(targets, vec![SourceId(1), SourceId(2), SourceId(3)]);

    let aliases: Vec<&str> = plan.sources.iter().map(|s| s.alias.as_str()).collect();
    assert_eq!(aliases, vec!["order", "l", "p", "c"]);
    assert_eq!(plan.source_of(&FieldRef::parse("p.name")), Some(SourceId(2)));
}

#[test]
fn test_cursor_pagination_stage() {
    let plan = plan(&Query::new("order").paginate(Pagination::cursor("eyJpZCI6NDJ9"))).unwrap();
    assert_eq!(
        plan.pagination(),
        Some(&PaginateStage::Cursor {
            cursor: "eyJpZCI6NDJ9".to_string()
        })
    );
}

#[test]
fn test_empty_pagination_is_dropped() {
    let plan = plan(&Query::new("order").paginate(Pagination::default())).unwrap();
    assert_eq!(plan.stage_kinds(), vec![StageKind::Source]);
}

#[test]
fn test_plan_cache_shares_equivalent_queries() {
    let cache = PlanCache::new();
    let nested = Query::new("t").filter(FilterExpr::and([FilterExpr::and([leaf("a", 1)]), leaf("b", 2)]));
    let flat = Query::new("t").filter(FilterExpr::and([leaf("a", 1), leaf("b", 2)]));

    assert_eq!(
        query_fingerprint(&nested).unwrap(),
        query_fingerprint(&flat).unwrap()
    );

    let first = cache.get_or_plan(&nested).unwrap();
    let second = cache.get_or_plan(&flat).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
}
