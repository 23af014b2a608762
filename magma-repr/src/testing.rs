// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Test utilities shared by unit and integration tests: a fixed catalog, a unit cost
//! model, and logical plan builders. Compiled under `cfg(test)` and the `testing` feature.

use std::sync::Arc;

use magma_core::cost::Cost;
use magma_core::cost::CostModel;
use magma_core::metadata::{ColumnSet, MetadataQuery};
use magma_core::volcano::RelNodeContext;

use crate::physical_properties::{logical_traits, Collation, FieldCollation};
use crate::plan_nodes::{
    ArcRelPlanNode, ArcRelPredNode, BinOpPred, BinOpType, ColumnRefPred, ConstantPred,
    ConstantType, Direction, FuncPred, FuncType, JoinType, ListPred, LogicalAgg, LogicalFilter,
    LogicalJoin, LogicalProjection, LogicalScan, NullOrder, RelNodeType, RelPlanNodeOrSubset,
    RelReprNode, RelReprPred,
};
use crate::properties::schema::{Catalog, Field, Schema};
use crate::rules::PhysicalConversionRule;
use crate::{MagmaOptimizer, RelRule};

fn field(name: &str, typ: ConstantType, nullable: bool) -> Field {
    Field {
        name: name.to_string(),
        typ,
        nullable,
    }
}

/// A fixed catalog: the classic EMP/DEPT pair plus `T`, a table with a declared sort order.
pub struct TestCatalog;

impl Catalog for TestCatalog {
    fn get(&self, name: &str) -> Schema {
        match name {
            "EMP" => Schema::new(vec![
                field("empno", ConstantType::Int32, false),
                field("ename", ConstantType::Utf8, false),
                field("job", ConstantType::Utf8, true),
                field("deptno", ConstantType::Int32, false),
            ]),
            "DEPT" => Schema::new(vec![
                field("deptno", ConstantType::Int32, false),
                field("dname", ConstantType::Utf8, false),
            ]),
            "T" => Schema::new(vec![
                field("col0", ConstantType::Int32, false),
                field("col1", ConstantType::Int32, false),
            ]),
            other => panic!("unknown table {}", other),
        }
    }

    fn row_count(&self, name: &str) -> Option<f64> {
        match name {
            "EMP" => Some(14.0),
            "DEPT" => Some(4.0),
            "T" => Some(100.0),
            _ => None,
        }
    }

    fn unique_keys(&self, name: &str) -> Vec<ColumnSet> {
        match name {
            "EMP" | "DEPT" => vec![ColumnSet::new([0])],
            _ => vec![],
        }
    }

    fn collation(&self, name: &str) -> Collation {
        match name {
            "T" => Collation(vec![FieldCollation {
                column: 0,
                direction: Direction::Asc,
                null_order: NullOrder::NullsFirst,
            }]),
            _ => Collation::empty(),
        }
    }
}

/// Every operator at self-cost `(1, 1, 1)`, so scenario costs count operators exactly.
pub struct UnitCostModel;

impl CostModel<RelNodeType> for UnitCostModel {
    fn self_cost(
        &self,
        _typ: &RelNodeType,
        _predicates: &[ArcRelPredNode],
        _meta: &MetadataQuery<'_, RelNodeType>,
        _context: &RelNodeContext,
    ) -> Option<Cost> {
        None
    }
}

pub fn conversion_rules() -> Vec<RelRule> {
    PhysicalConversionRule::all_conversions()
}

pub fn unit_optimizer(rules: Vec<RelRule>) -> MagmaOptimizer {
    MagmaOptimizer::with_rules_and_cost(Arc::new(TestCatalog), rules, Arc::new(UnitCostModel))
}

pub fn scan(table: &str) -> ArcRelPlanNode {
    LogicalScan::new(ConstantPred::string(table), logical_traits()).into_plan_node()
}

pub fn project(
    child: impl Into<RelPlanNodeOrSubset>,
    columns: &[usize],
) -> ArcRelPlanNode {
    LogicalProjection::new(
        child,
        ListPred::new(
            columns
                .iter()
                .map(|column| ColumnRefPred::new(*column).into_pred_node())
                .collect(),
        ),
        logical_traits(),
    )
    .into_plan_node()
}

pub fn agg_count(
    child: impl Into<RelPlanNodeOrSubset>,
    group: &[usize],
    arg: usize,
) -> ArcRelPlanNode {
    LogicalAgg::new(
        child,
        ListPred::new(
            group
                .iter()
                .map(|column| ColumnRefPred::new(*column).into_pred_node())
                .collect(),
        ),
        ListPred::new(vec![FuncPred::new(
            FuncType::Count,
            vec![ColumnRefPred::new(arg).into_pred_node()],
        )
        .into_pred_node()]),
        logical_traits(),
    )
    .into_plan_node()
}

pub fn col_eq_int(column: usize, value: i64) -> ArcRelPredNode {
    BinOpPred::new(
        BinOpType::Eq,
        ColumnRefPred::new(column).into_pred_node(),
        ConstantPred::int64(value).into_pred_node(),
    )
    .into_pred_node()
}

pub fn filter(
    child: impl Into<RelPlanNodeOrSubset>,
    cond: ArcRelPredNode,
) -> ArcRelPlanNode {
    LogicalFilter::new(child, cond, logical_traits()).into_plan_node()
}

pub fn join_on_cols(
    left: impl Into<RelPlanNodeOrSubset>,
    right: impl Into<RelPlanNodeOrSubset>,
    left_col: usize,
    right_col: usize,
) -> ArcRelPlanNode {
    LogicalJoin::new(
        left,
        right,
        BinOpPred::new(
            BinOpType::Eq,
            ColumnRefPred::new(left_col).into_pred_node(),
            ColumnRefPred::new(right_col).into_pred_node(),
        )
        .into_pred_node(),
        JoinType::Inner,
        logical_traits(),
    )
    .into_plan_node()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
