use objectql::ast::{
    Aggregation, FieldRef, FilterExpr, Frame, FrameBound, FrameType, JoinSpec, JoinType,
    Pagination, Query, SortSpec, WindowFunction, WindowFunctionKind, WindowSpec,
};
use objectql::registry::{Arity, OperatorMapping, OperatorRegistry};
use objectql::validation::{self, ValidationErrorKind, ValidationOptions, Validator};

fn error_kinds(query: &Query) -> Vec<ValidationErrorKind> {
    validation::validate(query)
        .unwrap_err()
        .into_iter()
        .map(|e| e.kind)
        .collect()
}

fn order_aggregation() -> Query {
    Query::from_json(
        r#"{
            "object": "order",
            "fields": ["customer_id", "n", "total"],
            "filters": ["status", "=", "paid"],
            "aggregations": [
                {"function": "count", "alias": "n"},
                {"function": "sum", "field": "amount", "alias": "total"}
            ],
            "groupBy": ["customer_id"],
            "having": [["n", ">", 5], "and", ["total", ">=", 1000]],
            "sort": ["-total"],
            "pagination": {"top": 10}
        }"#,
    )
    .unwrap()
}

#[test]
fn test_order_aggregation_is_valid() {
    assert_eq!(validation::validate(&order_aggregation()), Ok(()));
}

#[test]
fn test_validation_is_idempotent() {
    let valid = order_aggregation();
    assert_eq!(validation::validate(&valid), validation::validate(&valid));

    let invalid = Query::new("order")
        .filter(FilterExpr::condition("status", "like", "x"))
        .paginate(Pagination {
            top: Some(1),
            skip: None,
            cursor: Some("abc".to_string()),
        });
    let first = validation::validate(&invalid).unwrap_err();
    let second = validation::validate(&invalid).unwrap_err();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn test_collects_every_error() {
    let query = Query::new("order")
        .select(["1bad"])
        .filter(FilterExpr::and([
            FilterExpr::condition("status", "like", "x"),
            FilterExpr::Or(vec![]),
        ]))
        .aggregate(Aggregation::count("n"))
        .aggregate(Aggregation::count("n"));

    let errors = validation::validate(&query).unwrap_err();
    let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
    assert!(paths.contains(&"fields[0]"));
    assert!(paths.contains(&"filters.and[0].operator"));
    assert!(paths.contains(&"filters.and[1]"));
    assert!(paths.contains(&"aggregations[1].alias"));
}

#[test]
fn test_empty_object_name() {
    assert_eq!(
        error_kinds(&Query::new("")),
        vec![ValidationErrorKind::EmptyObject]
    );
}

#[test]
fn test_empty_array_filter() {
    let query = Query::from_json(r#"{"object": "order", "filters": []}"#).unwrap();
    assert_eq!(
        error_kinds(&query),
        vec![ValidationErrorKind::EmptyCombinator {
            combinator: "and".to_string()
        }]
    );
}

#[test]
fn test_ungrouped_field() {
    let query = Query::new("order")
        .select(["customer_id", "status"])
        .aggregate(Aggregation::count("n"))
        .group_by("customer_id");

    let errors = validation::validate(&query).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "fields[1]");
    assert_eq!(
        errors[0].kind,
        ValidationErrorKind::UngroupedField {
            field: "status".to_string()
        }
    );
}

#[test]
fn test_having_on_raw_field() {
    let query = Query::new("order")
        .aggregate(Aggregation::count("n"))
        .having(FilterExpr::condition("amount", "gt", 5));

    let errors = validation::validate(&query).unwrap_err();
    assert_eq!(errors[0].path, "having.field");
    assert_eq!(
        errors[0].kind,
        ValidationErrorKind::InvalidHavingReference {
            field: "amount".to_string()
        }
    );
}

#[test]
fn test_conflicting_pagination() {
    let query = Query::new("order").paginate(Pagination {
        top: None,
        skip: Some(20),
        cursor: Some("opaque".to_string()),
    });

    let errors = validation::validate(&query).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "pagination");
    assert_eq!(errors[0].kind, ValidationErrorKind::ConflictingPagination);
}

// ============================================================================
// Joins
// ============================================================================

#[test]
fn test_forward_join_reference_for_every_join_type() {
    for join_type in JoinType::ALL {
        let query = Query::new("order")
            .join(JoinSpec::new(join_type, "customer", "c", "p.customer_id", "c.id"))
            .join(JoinSpec::new(join_type, "payment", "p", "order.id", "p.order_id"));

        let errors = validation::validate(&query).unwrap_err();
        assert_eq!(errors.len(), 1, "join type {}", join_type);
        assert_eq!(errors[0].path, "joins[0].on.left");
        assert_eq!(
            errors[0].kind,
            ValidationErrorKind::ForwardJoinReference {
                alias: "p".to_string()
            }
        );
    }
}

#[test]
fn test_unknown_join_reference() {
    let query = Query::new("order").join(JoinSpec::new(
        JoinType::Inner,
        "customer",
        "c",
        "x.customer_id",
        "c.id",
    ));
    assert_eq!(
        error_kinds(&query),
        vec![ValidationErrorKind::UnknownJoinReference {
            alias: "x".to_string()
        }]
    );
}

#[test]
fn test_duplicate_join_alias() {
    let query = Query::new("order")
        .join(JoinSpec::new(JoinType::Inner, "customer", "c", "customer_id", "c.id"))
        .join(JoinSpec::new(JoinType::Left, "carrier", "c", "carrier_id", "c.id"));

    let errors = validation::validate(&query).unwrap_err();
    assert_eq!(errors[0].path, "joins[1].alias");
    assert_eq!(
        errors[0].kind,
        ValidationErrorKind::DuplicateJoinAlias {
            alias: "c".to_string()
        }
    );
}

#[test]
fn test_subquery_errors_are_prefixed() {
    let sub = Query::new("payment").filter(FilterExpr::condition("state", "like", "x"));
    let query = Query::new("order").join(
        JoinSpec::new(JoinType::Inner, "payment", "p", "id", "p.order_id").with_subquery(sub),
    );

    let errors = validation::validate(&query).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "joins[0].subquery.filters.operator");
}

#[test]
fn test_subquery_depth_limit() {
    let innermost = Query::new("c");
    let middle = Query::new("b").join(
        JoinSpec::new(JoinType::Inner, "c", "cc", "id", "cc.b_id").with_subquery(innermost),
    );
    let query = Query::new("a").join(
        JoinSpec::new(JoinType::Inner, "b", "bb", "id", "bb.a_id").with_subquery(middle),
    );

    let validator = Validator::new(OperatorRegistry::global()).with_max_depth(1);
    let errors = validator.validate(&query).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "joins[0].subquery.joins[0].subquery");
    assert_eq!(
        errors[0].kind,
        ValidationErrorKind::MaxDepthExceeded { limit: 1 }
    );

    assert!(Validator::new(OperatorRegistry::global())
        .with_options(ValidationOptions::default())
        .validate(&query)
        .is_ok());
}

// ============================================================================
// Windows
// ============================================================================

fn ranked(over: WindowSpec) -> Query {
    Query::new("product").window(WindowFunction {
        function: WindowFunctionKind::RowNumber,
        field: None,
        offset: None,
        alias: "rn".to_string(),
        over,
    })
}

#[test]
fn test_frame_without_order_by() {
    let query = ranked(WindowSpec {
        partition_by: vec![FieldRef::new("category")],
        order_by: vec![],
        frame: Some(Frame {
            frame_type: FrameType::Rows,
            start: FrameBound::UnboundedPreceding,
            end: FrameBound::CurrentRow,
        }),
    });

    let errors = validation::validate(&query).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "windowFunctions[0].over.frame");
    assert_eq!(errors[0].kind, ValidationErrorKind::FrameRequiresOrdering);
}

#[test]
fn test_reversed_frame_bounds() {
    let query = ranked(WindowSpec {
        partition_by: vec![],
        order_by: vec![SortSpec::desc("sales")],
        frame: Some(Frame {
            frame_type: FrameType::Rows,
            start: FrameBound::Following(2),
            end: FrameBound::Preceding(1),
        }),
    });

    assert!(matches!(
        error_kinds(&query).as_slice(),
        [ValidationErrorKind::InvalidFrameBounds { .. }]
    ));
}

#[test]
fn test_window_field_rules() {
    let query = Query::new("product")
        .window(WindowFunction {
            function: WindowFunctionKind::Rank,
            field: Some(FieldRef::new("sales")),
            offset: None,
            alias: "r".to_string(),
            over: WindowSpec::default(),
        })
        .window(WindowFunction {
            function: WindowFunctionKind::Lag,
            field: None,
            offset: Some(1),
            alias: "prev".to_string(),
            over: WindowSpec::default(),
        })
        .window(WindowFunction {
            function: WindowFunctionKind::Sum,
            field: Some(FieldRef::new("sales")),
            offset: Some(2),
            alias: "running".to_string(),
            over: WindowSpec::default(),
        });

    assert_eq!(
        error_kinds(&query),
        vec![
            ValidationErrorKind::WindowFieldForbidden {
                function: "rank".to_string()
            },
            ValidationErrorKind::WindowFieldRequired {
                function: "lag".to_string()
            },
            ValidationErrorKind::InvalidWindowOffset {
                function: "sum".to_string()
            },
        ]
    );
}

#[test]
fn test_window_alias_collides_with_aggregation() {
    let query = Query::new("product")
        .aggregate(Aggregation::count("n"))
        .window(WindowFunction {
            function: WindowFunctionKind::RowNumber,
            field: None,
            offset: None,
            alias: "n".to_string(),
            over: WindowSpec::default(),
        });

    let errors = validation::validate(&query).unwrap_err();
    assert_eq!(errors[0].path, "windowFunctions[0].alias");
    assert_eq!(
        errors[0].kind,
        ValidationErrorKind::DuplicateAlias {
            alias: "n".to_string()
        }
    );
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_custom_operator_is_accepted() {
    let registry = OperatorRegistry::builder()
        .with_defaults()
        .register(
            OperatorMapping::new("ilike", Arity::Scalar)
                .with_rest("ilike")
                .with_odata("contains(tolower({field}),tolower({value}))"),
        )
        .unwrap()
        .build();

    let query = Query::new("customer").filter(FilterExpr::condition("name", "ilike", "smith"));
    assert!(validation::validate(&query).is_err());
    assert!(Validator::new(&registry).validate(&query).is_ok());
}
