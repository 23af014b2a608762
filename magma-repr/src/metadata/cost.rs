// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::sync::Arc;

use itertools::Itertools;
use magma_core::cost::{Cost, CostModel};
use magma_core::metadata::{ArcMetaValue, MetadataQuery};
use magma_core::volcano::{ExprId, RelNodeContext};

use super::meta;
use crate::plan_nodes::RelNodeType;

/// Cumulative cost: self-cost plus the best cost of every child subset. Unknown while any
/// child subset has no decided winner.
pub(super) fn derive(
    cost_model: &Arc<dyn CostModel<RelNodeType>>,
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    if matches!(node.typ, RelNodeType::AbstractConverter) {
        return None;
    }
    let mut inputs = Cost::zero();
    for child in &node.children {
        inputs += memo
            .subset_info(*child)
            .winner
            .as_full_winner()?
            .total_cost
            .clone();
    }
    let context = RelNodeContext {
        subset_id: memo.subset_of_expr(expr),
        expr_id: expr,
        children: node
            .children
            .iter()
            .map(|child| memo.reduce_subset(*child))
            .collect(),
    };
    let predicates = node
        .predicates
        .iter()
        .map(|pred| memo.get_pred(*pred))
        .collect_vec();
    let operation = cost_model
        .self_cost(&node.typ, &predicates, q, &context)
        .unwrap_or(Cost::unit());
    meta(operation + inputs)
}
