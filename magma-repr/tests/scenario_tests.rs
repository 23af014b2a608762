// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! End-to-end optimization and metadata scenarios over the test catalog.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_approx_eq::assert_approx_eq;
use pretty_assertions::assert_eq;

use magma_core::cost::Cost;
use magma_core::error::OptimizeError;
use magma_core::metadata::{ColumnSet, MetaTarget};
use magma_core::nodes::NodeType;
use magma_core::optimizer::{CancellationToken, Optimizer};

use magma_repr::explain::explain_to_string;
use magma_repr::metadata::{
    default_metadata_registry, ColumnOrigin, RelMetadataQuery, SELECTIVITY,
};
use magma_repr::physical_properties::physical_any;
use magma_repr::plan_nodes::{JoinType, RelNodeType};
use magma_repr::testing::{
    agg_count, col_eq_int, conversion_rules, filter, init_tracing, join_on_cols, project, scan,
    unit_optimizer, TestCatalog, UnitCostModel,
};
use magma_repr::MagmaOptimizer;

/// S1: the table's declared order flows through an identity projection, so the streaming
/// aggregate gets sorted input for free and no sort appears.
#[test]
fn trait_propagation_through_project() {
    init_tracing();
    let mut opt = unit_optimizer(conversion_rules());
    let root = agg_count(project(scan("T"), &[0, 1]), &[0], 1);
    let (plan, cost) = opt
        .optimize(root, physical_any(), &CancellationToken::new())
        .unwrap();
    assert_eq!(cost, Cost::new(3.0, 3.0, 3.0));
    assert_eq!(plan.typ, RelNodeType::PhysicalStreamingAgg);
    let project = plan.child_rel(0);
    assert_eq!(project.typ, RelNodeType::PhysicalProject);
    assert_eq!(project.child_rel(0).typ, RelNodeType::PhysicalScan);
    // the winner's trait set satisfies the request
    assert!(opt
        .volcano_optimizer()
        .trait_registry()
        .satisfies(&plan.traits, &physical_any()));
    opt.volcano_optimizer().memo().verify_integrity().unwrap();
}

/// S2: the projection swaps the columns, so the aggregate's group key is no longer the
/// sorted one and an enforcer sort must appear.
#[test]
fn trait_propagation_with_aliasing_projection() {
    let mut opt = unit_optimizer(conversion_rules());
    let root = agg_count(project(scan("T"), &[1, 0]), &[0], 1);
    let (plan, cost) = opt
        .optimize(root, physical_any(), &CancellationToken::new())
        .unwrap();
    assert_eq!(cost, Cost::new(4.0, 4.0, 4.0));
    assert_eq!(plan.typ, RelNodeType::PhysicalStreamingAgg);
    let sort = plan.child_rel(0);
    assert_eq!(sort.typ, RelNodeType::PhysicalSort);
    let project = sort.child_rel(0);
    assert_eq!(project.typ, RelNodeType::PhysicalProject);
    assert_eq!(project.child_rel(0).typ, RelNodeType::PhysicalScan);
}

/// S3: default equality selectivity applied to the scan cardinality.
#[test]
fn filter_row_count_estimate() {
    let mut opt = unit_optimizer(vec![]);
    let (_, expr_id) = opt
        .volcano_optimizer_mut()
        .add_new_expr(filter(scan("EMP"), col_eq_int(0, 100)));
    let volcano = opt.volcano_optimizer();
    let meta = volcano.metadata();
    let rm = RelMetadataQuery::new(&meta);
    assert_approx_eq!(rm.row_count(expr_id), 14.0 * 0.15);
    assert_eq!(rm.max_row_count(expr_id), f64::INFINITY);
}

/// S4: grouping makes the group key unique, and any superset of a unique key is unique.
#[test]
fn unique_keys_under_group_by() {
    let mut opt = unit_optimizer(vec![]);
    let (_, expr_id) = opt
        .volcano_optimizer_mut()
        .add_new_expr(agg_count(scan("EMP"), &[3], 0));
    let volcano = opt.volcano_optimizer();
    let meta = volcano.metadata();
    let rm = RelMetadataQuery::new(&meta);
    assert_eq!(rm.unique_keys(expr_id), vec![ColumnSet::new([0])]);
    assert_eq!(rm.are_columns_unique(expr_id, &ColumnSet::new([0])), Some(true));
    assert_eq!(
        rm.are_columns_unique(expr_id, &ColumnSet::new([0, 1])),
        Some(true)
    );
    assert_eq!(rm.are_columns_unique(expr_id, &ColumnSet::new([1])), Some(false));
}

/// Consistency between the two uniqueness kinds on a base table.
#[test]
fn columns_unique_consistent_with_unique_keys() {
    let mut opt = unit_optimizer(vec![]);
    let (_, expr_id) = opt.volcano_optimizer_mut().add_new_expr(scan("EMP"));
    let volcano = opt.volcano_optimizer();
    let meta = volcano.metadata();
    let rm = RelMetadataQuery::new(&meta);
    let unique_keys = rm.unique_keys(expr_id);
    for keys in [
        ColumnSet::new([0]),
        ColumnSet::new([0, 3]),
        ColumnSet::new([1]),
        ColumnSet::new([1, 2, 3]),
    ] {
        let contained = unique_keys.iter().any(|key| key.is_subset_of(&keys));
        assert_eq!(rm.are_columns_unique(expr_id, &keys), Some(contained));
    }
}

/// S5: a projected column traces back through the join to its base table, underived.
#[test]
fn column_origin_through_join() {
    let mut opt = unit_optimizer(vec![]);
    let (_, expr_id) = opt
        .volcano_optimizer_mut()
        .add_new_expr(project(join_on_cols(scan("EMP"), scan("DEPT"), 3, 4), &[1]));
    let volcano = opt.volcano_optimizer();
    let meta = volcano.metadata();
    let rm = RelMetadataQuery::new(&meta);
    assert_eq!(
        rm.column_origins(expr_id, 0),
        vec![ColumnOrigin {
            table: "EMP".to_string(),
            column: 1,
            derived: false,
        }]
    );
}

/// S6: cached metadata survives queries at one timestamp and is recomputed after the memo
/// changes.
#[test]
fn metadata_cache_invalidation() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let cost_model = Arc::new(UnitCostModel);
    let catalog = Arc::new(TestCatalog);
    let mut registry = default_metadata_registry(catalog.clone(), cost_model.clone());
    {
        // a variant-specific probe in front of the default chain: counts invocations and
        // defers to the next handler
        let invocations = invocations.clone();
        registry.register(
            SELECTIVITY,
            &RelNodeType::Filter,
            Arc::new(move |_q, _expr, _args| {
                invocations.fetch_add(1, Ordering::SeqCst);
                None
            }),
        );
    }
    let mut opt =
        MagmaOptimizer::with_metadata_registry(catalog, vec![], cost_model, registry);
    let cond = col_eq_int(0, 100);
    let (_, expr_id) = opt
        .volcano_optimizer_mut()
        .add_new_expr(filter(scan("EMP"), cond.clone()));
    let query_selectivity = |opt: &MagmaOptimizer| {
        let volcano = opt.volcano_optimizer();
        let meta = volcano.metadata();
        let rm = RelMetadataQuery::new(&meta);
        rm.selectivity(expr_id, Some(&cond))
    };
    let first = query_selectivity(&opt);
    assert_approx_eq!(first, 0.15);
    let second = query_selectivity(&opt);
    assert_approx_eq!(second, 0.15);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    // a structural change advances the timestamp; the next query recomputes
    opt.volcano_optimizer_mut().add_new_expr(scan("DEPT"));
    let third = query_selectivity(&opt);
    assert_approx_eq!(third, 0.15);
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[test]
fn cumulative_cost_is_monotone() {
    let mut opt = unit_optimizer(vec![]);
    let (_, project_expr) = opt
        .volcano_optimizer_mut()
        .add_new_expr(project(scan("T"), &[0]));
    let volcano = opt.volcano_optimizer();
    let scan_subset = volcano.memo().get_subset(&scan("T")).unwrap();
    let scan_best = volcano
        .memo()
        .subset_info(scan_subset)
        .winner
        .as_full_winner()
        .unwrap()
        .total_cost
        .clone();
    let meta = volcano.metadata();
    let rm = RelMetadataQuery::new(&meta);
    let cumulative = rm.cumulative_cost(project_expr).unwrap();
    assert!(cumulative >= Cost::unit());
    assert!(cumulative >= scan_best);
    assert_eq!(cumulative, Cost::new(2.0, 2.0, 2.0));
}

#[test]
fn join_gets_a_physical_plan() {
    let mut rules = MagmaOptimizer::default_transformation_rules();
    rules.extend(MagmaOptimizer::default_implementation_rules());
    let mut opt = unit_optimizer(rules);
    let root = join_on_cols(scan("EMP"), scan("DEPT"), 3, 4);
    let (plan, cost) = opt
        .optimize(root, physical_any(), &CancellationToken::new())
        .unwrap();
    assert!(matches!(
        plan.typ,
        RelNodeType::PhysicalNestedLoopJoin(JoinType::Inner)
            | RelNodeType::PhysicalHashJoin(JoinType::Inner)
    ));
    assert_eq!(cost, Cost::new(3.0, 3.0, 3.0));
    opt.volcano_optimizer().memo().verify_integrity().unwrap();
}

#[test]
fn identical_sessions_return_identical_plans() {
    let run = || {
        let mut opt = unit_optimizer(conversion_rules());
        let root = agg_count(project(scan("T"), &[1, 0]), &[0], 1);
        let (plan, cost) = opt
            .optimize(root, physical_any(), &CancellationToken::new())
            .unwrap();
        (explain_to_string(&plan), cost)
    };
    assert_eq!(run(), run());
}

#[test]
fn no_plan_without_implementation_rules() {
    let mut opt = unit_optimizer(vec![]);
    let err = opt
        .optimize(scan("EMP"), physical_any(), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, OptimizeError::NoPlanFound { .. }), "{err}");
}

#[test]
fn cancelled_session_reports_cancelled() {
    let mut opt = unit_optimizer(conversion_rules());
    let token = CancellationToken::new();
    token.cancel();
    let err = opt
        .optimize(scan("EMP"), physical_any(), &token)
        .unwrap_err();
    assert!(matches!(err, OptimizeError::Cancelled), "{err}");
}

/// A sort conversion claims the collation its keys produce.
#[test]
fn sort_conversion_claims_its_collation() {
    use magma_repr::physical_properties::{
        logical_traits, Collation, FieldCollation, COLLATION_AXIS,
    };
    use magma_repr::plan_nodes::{
        no_fetch, no_offset, ColumnRefPred, Direction, ListPred, LogicalSort, NullOrder,
        RelReprNode, RelReprPred, SortOrderPred,
    };
    let mut opt = unit_optimizer(conversion_rules());
    let keys = ListPred::new(vec![SortOrderPred::new(
        Direction::Desc,
        NullOrder::NullsLast,
        ColumnRefPred::new(1).into_pred_node(),
    )
    .into_pred_node()]);
    let root = LogicalSort::new(scan("T"), keys, no_offset(), no_fetch(), logical_traits())
        .into_plan_node();
    let (plan, cost) = opt
        .optimize(root, physical_any(), &CancellationToken::new())
        .unwrap();
    assert_eq!(plan.typ, RelNodeType::PhysicalSort);
    assert_eq!(cost, Cost::new(2.0, 2.0, 2.0));
    assert_eq!(
        plan.traits.get(COLLATION_AXIS).as_collation(),
        &Collation(vec![FieldCollation {
            column: 1,
            direction: Direction::Desc,
            null_order: NullOrder::NullsLast,
        }])
    );
}

/// The fully assembled optimizer (default rules, base cost model) still settles on a
/// physical plan.
#[test]
fn default_session_optimizes_a_join() {
    let mut opt = MagmaOptimizer::new_physical(Arc::new(TestCatalog));
    let root = join_on_cols(scan("EMP"), scan("DEPT"), 3, 4);
    let (plan, cost) = opt
        .optimize(root, physical_any(), &CancellationToken::new())
        .unwrap();
    assert!(!plan.typ.is_logical());
    assert!(!cost.is_infinite());
    opt.volcano_optimizer().memo().verify_integrity().unwrap();
}

/// Parallelism and memory stubs answer (or decline) without affecting plans.
#[test]
fn parallelism_stubs() {
    let mut opt = unit_optimizer(vec![]);
    let (_, expr_id) = opt.volcano_optimizer_mut().add_new_expr(scan("EMP"));
    let volcano = opt.volcano_optimizer();
    let meta = volcano.metadata();
    let rm = RelMetadataQuery::new(&meta);
    assert_eq!(rm.split_count(expr_id), 1);
    assert!(!rm.is_phase_transition(expr_id));
    assert_eq!(rm.memory(expr_id), None);
    assert_eq!(rm.average_row_size(MetaTarget::Expr(expr_id)), 4.0 + 16.0 + 16.0 + 4.0);
}
