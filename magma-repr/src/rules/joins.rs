// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::sync::Arc;

use anyhow::Result;
use magma_core::nodes::{PlanNode, PlanNodeOrSubset};
use magma_core::optimizer::Optimizer;
use magma_core::rules::{Rule, RuleMatcher};

use crate::metadata::RelMetadataQuery;
use crate::physical_properties::{logical_traits, physical_any};
use crate::plan_nodes::{
    extract_equi_join_keys, rewrite_column_refs, ArcRelPlanNode, ColumnRefPred, JoinType,
    ListPred, LogicalJoin, LogicalProjection, RelNodeType, RelPlanNodeOrSubset, RelReprNode,
    RelReprPred,
};

// A join B -> B join A, with a compensating projection restoring column order
pub struct JoinCommuteRule {
    matcher: RuleMatcher<RelNodeType>,
}

impl JoinCommuteRule {
    pub fn new() -> Self {
        Self {
            matcher: RuleMatcher::MatchNode {
                typ: RelNodeType::Join(JoinType::Inner),
                children: vec![RuleMatcher::Any, RuleMatcher::Any],
            },
        }
    }
}

impl<O: Optimizer<RelNodeType>> Rule<RelNodeType, O> for JoinCommuteRule {
    fn matcher(&self) -> &RuleMatcher<RelNodeType> {
        &self.matcher
    }

    fn apply(
        &self,
        optimizer: &O,
        binding: ArcRelPlanNode,
    ) -> Result<Vec<RelPlanNodeOrSubset>> {
        let meta = optimizer.metadata();
        let rm = RelMetadataQuery::new(&meta);
        let left = binding.child(0);
        let right = binding.child(1);
        let left_len = rm.schema(left.unwrap_subset()).len();
        let right_len = rm.schema(right.unwrap_subset()).len();
        let Some(cond) = rewrite_column_refs(&binding.predicate(0), &|column| {
            Some(if column < left_len {
                column + right_len
            } else {
                column - left_len
            })
        }) else {
            return Ok(vec![]);
        };
        let join = LogicalJoin::new(right, left, cond, JoinType::Inner, logical_traits());
        let mut exprs = Vec::with_capacity(left_len + right_len);
        for column in 0..left_len {
            exprs.push(ColumnRefPred::new(right_len + column).into_pred_node());
        }
        for column in 0..right_len {
            exprs.push(ColumnRefPred::new(column).into_pred_node());
        }
        let node = LogicalProjection::new(
            join.into_plan_node(),
            ListPred::new(exprs),
            logical_traits(),
        );
        Ok(vec![PlanNodeOrSubset::PlanNode(node.into_plan_node())])
    }

    fn name(&self) -> &'static str {
        "join_commute"
    }
}

// (A join B) join C -> A join (B join C)
pub struct JoinAssocRule {
    matcher: RuleMatcher<RelNodeType>,
}

impl JoinAssocRule {
    pub fn new() -> Self {
        Self {
            matcher: RuleMatcher::MatchNode {
                typ: RelNodeType::Join(JoinType::Inner),
                children: vec![
                    RuleMatcher::MatchNode {
                        typ: RelNodeType::Join(JoinType::Inner),
                        children: vec![RuleMatcher::Any, RuleMatcher::Any],
                    },
                    RuleMatcher::Any,
                ],
            },
        }
    }
}

impl<O: Optimizer<RelNodeType>> Rule<RelNodeType, O> for JoinAssocRule {
    fn matcher(&self) -> &RuleMatcher<RelNodeType> {
        &self.matcher
    }

    fn apply(
        &self,
        optimizer: &O,
        binding: ArcRelPlanNode,
    ) -> Result<Vec<RelPlanNodeOrSubset>> {
        let meta = optimizer.metadata();
        let rm = RelMetadataQuery::new(&meta);
        let inner = binding.child_rel(0);
        let a = inner.child(0);
        let b = inner.child(1);
        let c = binding.child(1);
        let a_len = rm.schema(a.unwrap_subset()).len();
        let cond_inner = inner.predicate(0);
        // the outer condition must not touch A, otherwise it cannot move inside
        let Some(cond_outer) = rewrite_column_refs(&binding.predicate(0), &|column| {
            if column < a_len {
                None
            } else {
                Some(column - a_len)
            }
        }) else {
            return Ok(vec![]);
        };
        let bc = LogicalJoin::new(b, c, cond_outer, JoinType::Inner, logical_traits());
        let node = LogicalJoin::new(
            a,
            bc.into_plan_node(),
            cond_inner,
            JoinType::Inner,
            logical_traits(),
        );
        Ok(vec![PlanNodeOrSubset::PlanNode(node.into_plan_node())])
    }

    fn name(&self) -> &'static str {
        "join_assoc"
    }
}

/// Implements an inner equi-join with a hash join.
pub struct HashJoinRule {
    matcher: RuleMatcher<RelNodeType>,
}

impl HashJoinRule {
    pub fn new() -> Self {
        Self {
            matcher: RuleMatcher::MatchDiscriminant {
                typ_discriminant: std::mem::discriminant(&RelNodeType::Join(JoinType::Inner)),
                children: vec![RuleMatcher::AnyMany],
            },
        }
    }
}

impl<O: Optimizer<RelNodeType>> Rule<RelNodeType, O> for HashJoinRule {
    fn matcher(&self) -> &RuleMatcher<RelNodeType> {
        &self.matcher
    }

    fn matches(&self, optimizer: &O, binding: &ArcRelPlanNode) -> bool {
        if binding.typ != RelNodeType::Join(JoinType::Inner) {
            return false;
        }
        let meta = optimizer.metadata();
        let rm = RelMetadataQuery::new(&meta);
        let left_len = rm.schema(binding.child(0).unwrap_subset()).len();
        extract_equi_join_keys(&binding.predicate(0), left_len).is_some()
    }

    fn apply(
        &self,
        _optimizer: &O,
        binding: ArcRelPlanNode,
    ) -> Result<Vec<RelPlanNodeOrSubset>> {
        Ok(vec![PlanNodeOrSubset::PlanNode(Arc::new(PlanNode {
            typ: RelNodeType::PhysicalHashJoin(JoinType::Inner),
            children: vec![
                PlanNodeOrSubset::Require(binding.child(0).unwrap_subset(), physical_any()),
                PlanNodeOrSubset::Require(binding.child(1).unwrap_subset(), physical_any()),
            ],
            predicates: binding.predicates.clone(),
            traits: physical_any(),
        }))])
    }

    fn name(&self) -> &'static str {
        "hash_join"
    }

    fn is_impl_rule(&self) -> bool {
        true
    }
}
