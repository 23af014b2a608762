// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Expansion of abstract converters into concrete per-axis enforcers.

use anyhow::Result;
use tracing::trace;

use super::optimizer::VolcanoOptimizer;
use crate::error::OptimizeError;
use crate::nodes::{ArcPlanNode, NodeType, PlanNodeOrSubset};
use crate::optimizer::Optimizer;
use crate::rules::{Rule, RuleMatcher};

/// Fires on abstract converters. For every sibling subset of the converter's set it computes
/// the axes whose values fall short of the target trait set; when each of those axes can be
/// enforced, the chain of enforcers over that subset is registered as a member of the target
/// subset. A converter no expansion applies to is left in place; the driver marks its subset
/// impossible until new members arrive.
pub struct ExpandConversionRule<T: NodeType> {
    matcher: RuleMatcher<T>,
}

impl<T: NodeType> ExpandConversionRule<T> {
    pub fn new() -> Self {
        Self {
            matcher: RuleMatcher::MatchDiscriminant {
                typ_discriminant: std::mem::discriminant(&T::abstract_converter()),
                children: vec![RuleMatcher::AnyMany],
            },
        }
    }
}

impl<T: NodeType> Rule<T, VolcanoOptimizer<T>> for ExpandConversionRule<T> {
    fn matcher(&self) -> &RuleMatcher<T> {
        &self.matcher
    }

    fn apply(
        &self,
        optimizer: &VolcanoOptimizer<T>,
        binding: ArcPlanNode<T>,
    ) -> Result<Vec<PlanNodeOrSubset<T>>> {
        let target_traits = binding.traits.clone();
        let from_subset = binding.child(0).unwrap_subset();
        let registry = optimizer.trait_registry();
        let memo = optimizer.memo();
        let set_id = memo.set_of_subset(from_subset);
        let mut out = Vec::new();
        for subset_id in memo.subsets_of_set(set_id) {
            let subset_traits = memo.subset_traits(subset_id).clone();
            if subset_traits == target_traits {
                continue;
            }
            let needed = (0..registry.num_axes())
                .filter(|&axis| {
                    !registry
                        .axis(axis)
                        .satisfies(subset_traits.get(axis), target_traits.get(axis))
                })
                .collect::<Vec<_>>();
            if needed.is_empty() {
                // already satisfies the target; winner relaxation covers it without help
                continue;
            }
            let mut current = PlanNodeOrSubset::Subset(subset_id);
            let mut current_traits = subset_traits;
            let mut feasible = true;
            for axis in needed {
                let out_traits = current_traits.replace(axis, target_traits.get(axis).clone());
                match registry.axis(axis).enforce(
                    current.clone(),
                    target_traits.get(axis),
                    out_traits.clone(),
                ) {
                    Some(enforcer) => {
                        current = PlanNodeOrSubset::PlanNode(enforcer);
                        current_traits = out_traits;
                    }
                    None => {
                        let err = OptimizeError::InfeasibleConversion {
                            axis: registry.axis(axis).name(),
                            from: current_traits.get(axis).to_string(),
                            to: target_traits.get(axis).to_string(),
                        };
                        trace!(event = "infeasible_conversion", subset_id = %subset_id, %err);
                        feasible = false;
                        break;
                    }
                }
            }
            if feasible && registry.satisfies(&current_traits, &target_traits) {
                if let PlanNodeOrSubset::PlanNode(node) = current {
                    out.push(PlanNodeOrSubset::PlanNode(node));
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "expand_conversion"
    }

    fn is_impl_rule(&self) -> bool {
        true
    }
}
