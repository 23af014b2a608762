// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Binding enumeration: interprets a rule's operand pattern against the memo, starting from
//! one root expression and drilling into child subsets.

use std::sync::Arc;

use itertools::Itertools;

use super::memo::ArcMemoExpr;
use super::optimizer::{ExprId, SubsetId, VolcanoOptimizer};
use crate::nodes::{ArcPlanNode, NodeType, PlanNode, PlanNodeOrSubset};
use crate::rules::RuleMatcher;

fn match_node<T: NodeType>(
    children: &[RuleMatcher<T>],
    node: ArcMemoExpr<T>,
    optimizer: &VolcanoOptimizer<T>,
) -> Vec<ArcPlanNode<T>> {
    let predicates = node
        .predicates
        .iter()
        .map(|pred_id| optimizer.memo().get_pred(*pred_id))
        .collect_vec();
    if let [RuleMatcher::AnyMany] = children {
        return vec![Arc::new(PlanNode {
            typ: node.typ.clone(),
            children: node
                .children
                .iter()
                .map(|child| PlanNodeOrSubset::Subset(*child))
                .collect(),
            predicates,
            traits: node.traits.clone(),
        })];
    }
    assert_eq!(children.len(), node.children.len(), "mismatched matcher");
    let mut matched_children = Vec::new();
    for (idx, child) in children.iter().enumerate() {
        match child {
            RuleMatcher::Any => {
                matched_children.push(vec![PlanNodeOrSubset::Subset(node.children[idx])]);
            }
            RuleMatcher::AnyMany => {
                unreachable!("AnyMany must be the only child operand");
            }
            _ => {
                let child_bindings = match_and_pick_subset(child, node.children[idx], optimizer);
                if child_bindings.is_empty() {
                    return vec![];
                }
                matched_children.push(
                    child_bindings
                        .into_iter()
                        .map(PlanNodeOrSubset::PlanNode)
                        .collect(),
                );
            }
        }
    }
    matched_children
        .into_iter()
        .fold(vec![vec![]], |acc, child| {
            let mut next = Vec::new();
            for binding in acc {
                for candidate in &child {
                    let mut binding = binding.clone();
                    binding.push(candidate.clone());
                    next.push(binding);
                }
            }
            next
        })
        .into_iter()
        .map(|children| {
            assert_eq!(children.len(), node.children.len());
            Arc::new(PlanNode {
                typ: node.typ.clone(),
                children,
                predicates: predicates.clone(),
                traits: node.traits.clone(),
            })
        })
        .collect()
}

fn match_and_pick<T: NodeType>(
    matcher: &RuleMatcher<T>,
    node: ArcMemoExpr<T>,
    optimizer: &VolcanoOptimizer<T>,
) -> Vec<ArcPlanNode<T>> {
    match matcher {
        RuleMatcher::MatchNode { typ, children } => {
            if &node.typ != typ {
                return vec![];
            }
            match_node(children, node, optimizer)
        }
        RuleMatcher::MatchDiscriminant {
            typ_discriminant,
            children,
        } => {
            if &std::mem::discriminant(&node.typ) != typ_discriminant {
                return vec![];
            }
            match_node(children, node, optimizer)
        }
        _ => panic!("rule pattern must have a match node at the root"),
    }
}

fn match_and_pick_subset<T: NodeType>(
    matcher: &RuleMatcher<T>,
    subset_id: SubsetId,
    optimizer: &VolcanoOptimizer<T>,
) -> Vec<ArcPlanNode<T>> {
    let memo = optimizer.memo();
    let set_id = memo.set_of_subset(subset_id);
    let mut matches = vec![];
    for expr_id in memo.exprs_in_set(set_id) {
        matches.extend(match_and_pick(matcher, memo.get_expr_memoed(expr_id), optimizer));
    }
    matches
}

pub(super) fn match_and_pick_expr<T: NodeType>(
    matcher: &RuleMatcher<T>,
    expr_id: ExprId,
    optimizer: &VolcanoOptimizer<T>,
) -> Vec<ArcPlanNode<T>> {
    let node = optimizer.memo().get_expr_memoed(expr_id);
    match_and_pick(matcher, node, optimizer)
}
