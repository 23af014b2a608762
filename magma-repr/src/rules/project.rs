// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use anyhow::Result;
use magma_core::nodes::PlanNodeOrSubset;
use magma_core::optimizer::Optimizer;
use magma_core::rules::{Rule, RuleMatcher};

use crate::physical_properties::logical_traits;
use crate::plan_nodes::{
    ArcRelPlanNode, ColumnRefPred, ListPred, LogicalProjection, RelNodeType,
    RelPlanNodeOrSubset, RelReprNode, RelReprPred,
};

// Project(Project(X)) -> Project(X), when the outer projection only forwards columns
pub struct ProjectMergeRule {
    matcher: RuleMatcher<RelNodeType>,
}

impl ProjectMergeRule {
    pub fn new() -> Self {
        Self {
            matcher: RuleMatcher::MatchNode {
                typ: RelNodeType::Project,
                children: vec![RuleMatcher::MatchNode {
                    typ: RelNodeType::Project,
                    children: vec![RuleMatcher::Any],
                }],
            },
        }
    }
}

impl<O: Optimizer<RelNodeType>> Rule<RelNodeType, O> for ProjectMergeRule {
    fn matcher(&self) -> &RuleMatcher<RelNodeType> {
        &self.matcher
    }

    fn apply(
        &self,
        _optimizer: &O,
        binding: ArcRelPlanNode,
    ) -> Result<Vec<RelPlanNodeOrSubset>> {
        let inner = binding.child_rel(0);
        let outer_exprs = ListPred::from_pred_node(binding.predicate(0)).unwrap();
        let inner_exprs = ListPred::from_pred_node(inner.predicate(0)).unwrap().to_vec();
        let mut composed = Vec::with_capacity(outer_exprs.len());
        for expr in outer_exprs.to_vec() {
            let Some(column_ref) = ColumnRefPred::from_pred_node(expr) else {
                return Ok(vec![]);
            };
            composed.push(inner_exprs[column_ref.column()].clone());
        }
        let node = LogicalProjection::new(
            inner.child(0),
            ListPred::new(composed),
            logical_traits(),
        );
        Ok(vec![PlanNodeOrSubset::PlanNode(node.into_plan_node())])
    }

    fn name(&self) -> &'static str {
        "project_merge"
    }
}
