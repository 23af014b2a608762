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
use crate::physical_properties::{physical_any, physical_traits, Collation, FieldCollation};
use crate::plan_nodes::{
    ArcRelPlanNode, ColumnRefPred, Direction, JoinType, ListPred, NullOrder, RelNodeType,
    RelPlanNodeOrSubset, RelReprPred,
};

fn require(
    child: &RelPlanNodeOrSubset,
    traits: magma_core::traits::TraitSet<RelNodeType>,
) -> RelPlanNodeOrSubset {
    PlanNodeOrSubset::Require(child.unwrap_subset(), traits)
}

/// Converts one logical operator into its physical counterpart, deriving the physical
/// node's collation and its required child traits from metadata over the logical inputs.
pub struct PhysicalConversionRule {
    matcher: RuleMatcher<RelNodeType>,
}

impl PhysicalConversionRule {
    pub fn new(logical_typ: RelNodeType) -> Self {
        Self {
            matcher: RuleMatcher::MatchDiscriminant {
                typ_discriminant: std::mem::discriminant(&logical_typ),
                children: vec![RuleMatcher::AnyMany],
            },
        }
    }

    pub fn all_conversions<O: Optimizer<RelNodeType>>() -> Vec<Arc<dyn Rule<RelNodeType, O>>> {
        // Define conversions below, and add them to this list!
        // Discriminant matching makes one value per variant sufficient.
        vec![
            Arc::new(PhysicalConversionRule::new(RelNodeType::Scan)),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Filter)),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Project)),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Join(JoinType::Inner))),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Agg)),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Sort)),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Union)),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Intersect)),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Except)),
            Arc::new(PhysicalConversionRule::new(RelNodeType::Values)),
        ]
    }
}

impl<O: Optimizer<RelNodeType>> Rule<RelNodeType, O> for PhysicalConversionRule {
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
        let own_collation = meta
            .memo()
            .get_subset(&binding)
            .map(|subset| rm.collation(subset))
            .unwrap_or_default();
        let node = match binding.typ {
            RelNodeType::Scan => vec![PlanNode {
                typ: RelNodeType::PhysicalScan,
                children: vec![],
                predicates: binding.predicates.clone(),
                traits: physical_traits(own_collation),
            }],
            RelNodeType::Filter => vec![PlanNode {
                typ: RelNodeType::PhysicalFilter,
                children: vec![require(&binding.children[0], physical_any())],
                predicates: binding.predicates.clone(),
                traits: physical_any(),
            }],
            RelNodeType::Project => {
                let mut nodes = vec![PlanNode {
                    typ: RelNodeType::PhysicalProject,
                    children: vec![require(&binding.children[0], physical_any())],
                    predicates: binding.predicates.clone(),
                    traits: physical_any(),
                }];
                // an order-preserving variant: ask the child for the order it can deliver
                // and surface it, permuted, as this projection's own collation
                let child_collation = rm.collation(binding.children[0].unwrap_subset());
                if !child_collation.is_empty() && !own_collation.is_empty() {
                    nodes.push(PlanNode {
                        typ: RelNodeType::PhysicalProject,
                        children: vec![require(
                            &binding.children[0],
                            physical_traits(child_collation),
                        )],
                        predicates: binding.predicates.clone(),
                        traits: physical_traits(own_collation),
                    });
                }
                nodes
            }
            RelNodeType::Join(join_type) => vec![PlanNode {
                typ: RelNodeType::PhysicalNestedLoopJoin(join_type),
                children: vec![
                    require(&binding.children[0], physical_any()),
                    require(&binding.children[1], physical_any()),
                ],
                predicates: binding.predicates.clone(),
                traits: physical_any(),
            }],
            RelNodeType::Agg => {
                // the streaming aggregate needs its input grouped, i.e. sorted on the
                // group keys
                let group_keys = ListPred::from_pred_node(binding.predicate(0)).unwrap();
                let child_collation = Collation(
                    group_keys
                        .to_vec()
                        .into_iter()
                        .map(|key| FieldCollation {
                            column: ColumnRefPred::from_pred_node(key).unwrap().column(),
                            direction: Direction::Asc,
                            null_order: NullOrder::NullsFirst,
                        })
                        .collect(),
                );
                let claimed = Collation(
                    (0..group_keys.len())
                        .map(|position| FieldCollation {
                            column: position,
                            direction: Direction::Asc,
                            null_order: NullOrder::NullsFirst,
                        })
                        .collect(),
                );
                vec![PlanNode {
                    typ: RelNodeType::PhysicalStreamingAgg,
                    children: vec![require(
                        &binding.children[0],
                        physical_traits(child_collation),
                    )],
                    predicates: binding.predicates.clone(),
                    traits: physical_traits(claimed),
                }]
            }
            RelNodeType::Sort => {
                let keys = ListPred::from_pred_node(binding.predicate(0)).unwrap();
                let collation = crate::metadata::collation_from_sort_keys(&keys);
                vec![PlanNode {
                    typ: RelNodeType::PhysicalSort,
                    children: vec![require(&binding.children[0], physical_any())],
                    predicates: binding.predicates.clone(),
                    traits: physical_traits(collation),
                }]
            }
            RelNodeType::Union => vec![PlanNode {
                typ: RelNodeType::PhysicalUnion,
                children: vec![
                    require(&binding.children[0], physical_any()),
                    require(&binding.children[1], physical_any()),
                ],
                predicates: binding.predicates.clone(),
                traits: physical_any(),
            }],
            RelNodeType::Intersect => vec![PlanNode {
                typ: RelNodeType::PhysicalIntersect,
                children: vec![
                    require(&binding.children[0], physical_any()),
                    require(&binding.children[1], physical_any()),
                ],
                predicates: binding.predicates.clone(),
                traits: physical_any(),
            }],
            RelNodeType::Except => vec![PlanNode {
                typ: RelNodeType::PhysicalExcept,
                children: vec![
                    require(&binding.children[0], physical_any()),
                    require(&binding.children[1], physical_any()),
                ],
                predicates: binding.predicates.clone(),
                traits: physical_any(),
            }],
            RelNodeType::Values => vec![PlanNode {
                typ: RelNodeType::PhysicalValues,
                children: vec![],
                predicates: binding.predicates.clone(),
                traits: physical_any(),
            }],
            _ => vec![],
        };
        Ok(node
            .into_iter()
            .map(|node| PlanNodeOrSubset::PlanNode(Arc::new(node)))
            .collect())
    }

    fn name(&self) -> &'static str {
        "physical_conversion"
    }

    fn is_impl_rule(&self) -> bool {
        true
    }
}

/// The order-insensitive aggregate implementation.
pub struct HashAggRule {
    matcher: RuleMatcher<RelNodeType>,
}

impl HashAggRule {
    pub fn new() -> Self {
        Self {
            matcher: RuleMatcher::MatchDiscriminant {
                typ_discriminant: std::mem::discriminant(&RelNodeType::Agg),
                children: vec![RuleMatcher::AnyMany],
            },
        }
    }
}

impl<O: Optimizer<RelNodeType>> Rule<RelNodeType, O> for HashAggRule {
    fn matcher(&self) -> &RuleMatcher<RelNodeType> {
        &self.matcher
    }

    fn apply(
        &self,
        _optimizer: &O,
        binding: ArcRelPlanNode,
    ) -> Result<Vec<RelPlanNodeOrSubset>> {
        Ok(vec![PlanNodeOrSubset::PlanNode(Arc::new(PlanNode {
            typ: RelNodeType::PhysicalHashAgg,
            children: vec![require(&binding.children[0], physical_any())],
            predicates: binding.predicates.clone(),
            traits: physical_any(),
        }))])
    }

    fn name(&self) -> &'static str {
        "hash_agg"
    }

    fn is_impl_rule(&self) -> bool {
        true
    }
}
