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
    conjuncts, ArcRelPlanNode, LogOpPred, LogOpType, LogicalFilter, RelNodeType,
    RelPlanNodeOrSubset, RelReprNode, RelReprPred,
};

// Filter(Filter(X)) -> Filter(X) with one flattened conjunction
pub struct FilterMergeRule {
    matcher: RuleMatcher<RelNodeType>,
}

impl FilterMergeRule {
    pub fn new() -> Self {
        Self {
            matcher: RuleMatcher::MatchNode {
                typ: RelNodeType::Filter,
                children: vec![RuleMatcher::MatchNode {
                    typ: RelNodeType::Filter,
                    children: vec![RuleMatcher::Any],
                }],
            },
        }
    }
}

impl<O: Optimizer<RelNodeType>> Rule<RelNodeType, O> for FilterMergeRule {
    fn matcher(&self) -> &RuleMatcher<RelNodeType> {
        &self.matcher
    }

    fn apply(
        &self,
        _optimizer: &O,
        binding: ArcRelPlanNode,
    ) -> Result<Vec<RelPlanNodeOrSubset>> {
        let inner = binding.child_rel(0);
        let mut merged = conjuncts(&binding.predicate(0));
        merged.extend(conjuncts(&inner.predicate(0)));
        let node = LogicalFilter::new(
            inner.child(0),
            LogOpPred::new(LogOpType::And, merged).into_pred_node(),
            logical_traits(),
        );
        Ok(vec![PlanNodeOrSubset::PlanNode(node.into_plan_node())])
    }

    fn name(&self) -> &'static str {
        "filter_merge"
    }
}
