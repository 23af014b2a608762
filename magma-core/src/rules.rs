// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

mod ir;

use anyhow::Result;

pub use ir::RuleMatcher;

use crate::nodes::{ArcPlanNode, NodeType, PlanNodeOrSubset};
use crate::optimizer::Optimizer;

/// A local equivalence-preserving rewrite. Rules come in two kinds:
/// 1. transformation rules expanding the logical plan space (logical -> logical)
/// 2. implementation rules producing physical counterparts (logical -> physical)
pub trait Rule<T: NodeType, O: Optimizer<T>>: 'static + Send + Sync {
    fn matcher(&self) -> &RuleMatcher<T>;

    /// Side condition evaluated on each binding before `apply`.
    fn matches(&self, _optimizer: &O, _binding: &ArcPlanNode<T>) -> bool {
        true
    }

    /// Produces expressions equivalent to the binding's root. Returned `PlanNode` products
    /// are registered into the root's set after trait propagation; returned `Subset`
    /// products merge that subset's set with the root's set. An error aborts the session
    /// wrapped with this rule's identity, leaving the memo untouched by this call.
    fn apply(&self, optimizer: &O, binding: ArcPlanNode<T>) -> Result<Vec<PlanNodeOrSubset<T>>>;

    fn name(&self) -> &'static str;

    fn is_impl_rule(&self) -> bool {
        false
    }
}
