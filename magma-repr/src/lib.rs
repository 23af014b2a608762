// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

#![allow(clippy::new_without_default)]

use std::sync::Arc;

use magma_core::cost::{Cost, CostModel};
use magma_core::error::OptimizeError;
use magma_core::metadata::MetadataRegistry;
use magma_core::optimizer::{CancellationToken, Optimizer};
use magma_core::rules::Rule;
use magma_core::traits::TraitSet;
use magma_core::volcano::VolcanoOptimizer;

use crate::cost::BaseCostModel;
use crate::metadata::default_metadata_registry;
use crate::physical_properties::default_trait_registry;
use crate::plan_nodes::{ArcRelPlanNode, RelNodeType};
use crate::properties::schema::{Catalog, SchemaPropertyBuilder};
use crate::rules::{
    FilterMergeRule, HashAggRule, HashJoinRule, JoinAssocRule, JoinCommuteRule,
    PhysicalConversionRule, ProjectMergeRule,
};

pub mod cost;
pub mod explain;
pub mod metadata;
pub mod physical_properties;
pub mod plan_nodes;
pub mod properties;
pub mod rules;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub type RelRule = Arc<dyn Rule<RelNodeType, VolcanoOptimizer<RelNodeType>>>;

/// A fully assembled optimization session over the relational representation: the volcano
/// engine plus the default trait axes, rules, metadata providers, and schema property.
pub struct MagmaOptimizer {
    volcano: VolcanoOptimizer<RelNodeType>,
}

impl MagmaOptimizer {
    pub fn default_transformation_rules() -> Vec<RelRule> {
        vec![
            Arc::new(JoinCommuteRule::new()),
            Arc::new(JoinAssocRule::new()),
            Arc::new(ProjectMergeRule::new()),
            Arc::new(FilterMergeRule::new()),
        ]
    }

    pub fn default_implementation_rules() -> Vec<RelRule> {
        let mut rules = PhysicalConversionRule::all_conversions();
        rules.push(Arc::new(HashJoinRule::new()));
        rules.push(Arc::new(HashAggRule::new()));
        rules
    }

    pub fn new_physical(catalog: Arc<dyn Catalog>) -> Self {
        let mut rules = Self::default_transformation_rules();
        rules.extend(Self::default_implementation_rules());
        Self::with_rules_and_cost(catalog, rules, Arc::new(BaseCostModel::new()))
    }

    pub fn with_rules_and_cost(
        catalog: Arc<dyn Catalog>,
        rules: Vec<RelRule>,
        cost_model: Arc<dyn CostModel<RelNodeType>>,
    ) -> Self {
        let metadata_registry = default_metadata_registry(catalog.clone(), cost_model.clone());
        Self::with_metadata_registry(catalog, rules, cost_model, metadata_registry)
    }

    /// Full-control constructor; `metadata_registry` may carry provider overrides on top of
    /// (or instead of) the defaults.
    pub fn with_metadata_registry(
        catalog: Arc<dyn Catalog>,
        rules: Vec<RelRule>,
        cost_model: Arc<dyn CostModel<RelNodeType>>,
        metadata_registry: MetadataRegistry<RelNodeType>,
    ) -> Self {
        Self {
            volcano: VolcanoOptimizer::new(
                rules,
                cost_model,
                default_trait_registry(),
                metadata_registry,
                vec![Box::new(SchemaPropertyBuilder::new(catalog))],
            ),
        }
    }

    pub fn optimize(
        &mut self,
        root: ArcRelPlanNode,
        required: TraitSet<RelNodeType>,
        cancel: &CancellationToken,
    ) -> Result<(ArcRelPlanNode, Cost), OptimizeError> {
        self.volcano.optimize(root, required, cancel)
    }

    pub fn volcano_optimizer(&self) -> &VolcanoOptimizer<RelNodeType> {
        &self.volcano
    }

    pub fn volcano_optimizer_mut(&mut self) -> &mut VolcanoOptimizer<RelNodeType> {
        &mut self.volcano
    }
}
