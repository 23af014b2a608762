// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Typed interface of plan nodes.

mod agg;
mod filter;
mod join;
pub(super) mod macros;
pub mod predicates;
mod projection;
mod scan;
mod setop;
mod sort;
mod values;

use magma_core::nodes::{
    ArcPlanNode, ArcPredNode, NodeType, PlanNode, PlanNodeOrSubset, PredNode,
};

pub use agg::{LogicalAgg, PhysicalHashAgg, PhysicalStreamingAgg};
pub use filter::{LogicalFilter, PhysicalFilter};
pub use join::{JoinType, LogicalJoin, PhysicalHashJoin, PhysicalNestedLoopJoin};
pub use predicates::{
    collect_column_refs, conjuncts, extract_equi_join_keys, rewrite_column_refs, BinOpPred,
    BinOpType, ColumnRefPred, ConstantPred, ConstantType, Direction, FuncPred, FuncType,
    ListPred, LogOpPred, LogOpType, NullOrder, RelReprPred, SortOrderPred, UnOpPred, UnOpType,
};
pub use projection::{projection_identity_mapping, LogicalProjection, PhysicalProjection};
pub use scan::{LogicalScan, PhysicalScan};
pub use setop::{
    LogicalExcept, LogicalIntersect, LogicalUnion, PhysicalExcept, PhysicalIntersect,
    PhysicalUnion,
};
pub use sort::{decode_fetch, decode_offset, no_fetch, no_offset, LogicalSort, PhysicalSort};
pub use values::{LogicalValues, PhysicalValues};

use crate::physical_properties::RelTraitValue;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelPredType {
    Constant(ConstantType),
    ColumnRef,
    List,
    UnOp(UnOpType),
    BinOp(BinOpType),
    LogOp(LogOpType),
    Func(FuncType),
    SortOrder(Direction, NullOrder),
}

impl std::fmt::Display for RelPredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// RelNodeType FAQ:
///   - `AbstractConverter` is never produced by rules; the memo registers it when a trait
///     request has no member yet and `ExpandConversionRule` expands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelNodeType {
    // Developers: update `is_logical` after adding new plan nodes
    // Logical plan nodes
    Scan,
    Filter,
    Project,
    Join(JoinType),
    Agg,
    Sort,
    Union,
    Intersect,
    Except,
    Values,
    // Physical plan nodes
    PhysicalScan,
    PhysicalFilter,
    PhysicalProject,
    PhysicalNestedLoopJoin(JoinType),
    PhysicalHashJoin(JoinType),
    PhysicalStreamingAgg,
    PhysicalHashAgg,
    PhysicalSort,
    PhysicalUnion,
    PhysicalIntersect,
    PhysicalExcept,
    PhysicalValues,
    // Synthetic
    AbstractConverter,
}

impl std::fmt::Display for RelNodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl NodeType for RelNodeType {
    type PredType = RelPredType;
    type TraitValue = RelTraitValue;

    fn is_logical(&self) -> bool {
        matches!(
            self,
            Self::Scan
                | Self::Filter
                | Self::Project
                | Self::Join(_)
                | Self::Agg
                | Self::Sort
                | Self::Union
                | Self::Intersect
                | Self::Except
                | Self::Values
        )
    }

    fn abstract_converter() -> Self {
        Self::AbstractConverter
    }
}

pub type RelPlanNode = PlanNode<RelNodeType>;
pub type ArcRelPlanNode = ArcPlanNode<RelNodeType>;
pub type RelPlanNodeOrSubset = PlanNodeOrSubset<RelNodeType>;
pub type RelPredNode = PredNode<RelNodeType>;
pub type ArcRelPredNode = ArcPredNode<RelNodeType>;

/// Typed wrapper over an `ArcRelPlanNode` of one specific variant.
pub trait RelReprNode: 'static + Clone {
    fn into_plan_node(self) -> ArcRelPlanNode;

    fn from_plan_node(node: ArcRelPlanNode) -> Option<Self>
    where
        Self: Sized;
}
