// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Built-in metadata kinds, their providers, and the typed query facade.
//!
//! Providers are plain functions registered into the core handler table at session
//! construction. Every derivation is written against `RelMetadataQuery`, so providers
//! compose re-entrantly through the cache.

mod collations;
mod column_origins;
mod cost;
mod parallelism;
mod predicates;
mod row_count;
mod selectivity;
mod size;
mod unique_keys;

use std::sync::Arc;

use magma_core::cost::{Cost, CostModel};
use magma_core::metadata::{
    ArcMetaValue, ColumnSet, MetaArg, MetaTarget, MetadataKind, MetadataQuery, MetadataRegistry,
};

pub(crate) use collations::collation_from_sort_keys;
pub use row_count::DEFAULT_TABLE_ROW_CNT;
pub use selectivity::estimate_selectivity;

use crate::physical_properties::Collation;
use crate::plan_nodes::{ArcRelPredNode, JoinType, RelNodeType};
use crate::properties::schema::{Catalog, Schema, SCHEMA_PROP_IDX};

pub const ROW_COUNT: MetadataKind = MetadataKind("row_count");
pub const MAX_ROW_COUNT: MetadataKind = MetadataKind("max_row_count");
pub const CUMULATIVE_COST: MetadataKind = MetadataKind("cumulative_cost");
pub const SELECTIVITY: MetadataKind = MetadataKind("selectivity");
pub const DISTINCT_ROW_COUNT: MetadataKind = MetadataKind("distinct_row_count");
pub const UNIQUE_KEYS: MetadataKind = MetadataKind("unique_keys");
pub const COLUMNS_UNIQUE: MetadataKind = MetadataKind("columns_unique");
pub const COLUMN_ORIGINS: MetadataKind = MetadataKind("column_origins");
pub const COLLATIONS: MetadataKind = MetadataKind("collations");
pub const PREDICATES: MetadataKind = MetadataKind("predicates");
pub const AVERAGE_ROW_SIZE: MetadataKind = MetadataKind("average_row_size");
pub const AVERAGE_COLUMN_SIZES: MetadataKind = MetadataKind("average_column_sizes");
pub const MEMORY: MetadataKind = MetadataKind("memory");
pub const CUMULATIVE_MEMORY: MetadataKind = MetadataKind("cumulative_memory_within_phase");
pub const SPLIT_COUNT: MetadataKind = MetadataKind("split_count");
pub const PHASE_TRANSITION: MetadataKind = MetadataKind("is_phase_transition");

/// Where one output column ultimately comes from. `derived` is set when a projection (or
/// aggregate call) computes the column instead of forwarding it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnOrigin {
    pub table: String,
    pub column: usize,
    pub derived: bool,
}

/// Predicates known to hold on an expression's output, plus the side-specific predicates a
/// join implies on its inputs.
#[derive(Clone, Debug, Default)]
pub struct RelPredicates {
    pub pulled_up: Vec<ArcRelPredNode>,
    pub left_inferred: Vec<ArcRelPredNode>,
    pub right_inferred: Vec<ArcRelPredNode>,
}

pub(crate) fn meta<V: Send + Sync + 'static>(value: V) -> Option<ArcMetaValue> {
    Some(Arc::new(value))
}

/// Typed accessors over the core metadata query. Defaults encode the per-kind policies:
/// row counts are floored at one, max row counts default to infinity, and parallelism
/// estimates may stay unknown.
pub struct RelMetadataQuery<'a, 'q> {
    inner: &'a MetadataQuery<'q, RelNodeType>,
}

impl<'a, 'q> RelMetadataQuery<'a, 'q> {
    pub fn new(inner: &'a MetadataQuery<'q, RelNodeType>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &'a MetadataQuery<'q, RelNodeType> {
        self.inner
    }

    /// The row type, which is a logical property of the whole set rather than derived
    /// metadata.
    pub fn schema(&self, target: impl Into<MetaTarget>) -> Schema {
        let memo = self.inner.memo();
        let set_id = match target.into() {
            MetaTarget::Expr(expr) => memo.set_of_expr(expr),
            MetaTarget::Subset(subset) => memo.set_of_subset(subset),
        };
        memo.set(set_id).properties()[SCHEMA_PROP_IDX]
            .as_any()
            .downcast_ref::<Schema>()
            .expect("schema property missing")
            .clone()
    }

    pub fn row_count(&self, target: impl Into<MetaTarget>) -> f64 {
        self.inner
            .query_as::<f64>(ROW_COUNT, target, &[])
            .unwrap_or(1.0)
            .max(1.0)
    }

    pub fn max_row_count(&self, target: impl Into<MetaTarget>) -> f64 {
        self.inner
            .query_as::<f64>(MAX_ROW_COUNT, target, &[])
            .unwrap_or(f64::INFINITY)
    }

    pub fn cumulative_cost(&self, target: impl Into<MetaTarget>) -> Option<Cost> {
        self.inner.query_as::<Cost>(CUMULATIVE_COST, target, &[])
    }

    /// Fraction of rows satisfying `pred`, in `[0, 1]`. A missing predicate filters
    /// nothing.
    pub fn selectivity(
        &self,
        target: impl Into<MetaTarget>,
        pred: Option<&ArcRelPredNode>,
    ) -> f64 {
        let Some(pred) = pred else {
            return 1.0;
        };
        match self.inner.memo().get_pred_id(pred) {
            Some(pred_id) => self
                .inner
                .query_as::<f64>(SELECTIVITY, target, &[MetaArg::Pred(pred_id)])
                .unwrap_or_else(|| estimate_selectivity(pred)),
            // not interned yet, so not cacheable; estimate directly
            None => estimate_selectivity(pred),
        }
    }

    pub fn distinct_row_count(
        &self,
        target: impl Into<MetaTarget>,
        keys: &ColumnSet,
        pred: Option<&ArcRelPredNode>,
    ) -> Option<f64> {
        let pred_arg = pred
            .and_then(|pred| self.inner.memo().get_pred_id(pred))
            .map(MetaArg::Pred)
            .unwrap_or(MetaArg::Null);
        self.inner.query_as::<f64>(
            DISTINCT_ROW_COUNT,
            target,
            &[MetaArg::Cols(keys.clone()), pred_arg],
        )
    }

    pub fn unique_keys(&self, target: impl Into<MetaTarget>) -> Vec<ColumnSet> {
        self.inner
            .query_as::<Vec<ColumnSet>>(UNIQUE_KEYS, target, &[])
            .unwrap_or_default()
    }

    /// Tri-state: `Some(true)` iff some unique key is contained in `keys`, `Some(false)`
    /// when provably not unique, `None` when unknown.
    pub fn are_columns_unique(
        &self,
        target: impl Into<MetaTarget>,
        keys: &ColumnSet,
    ) -> Option<bool> {
        self.inner
            .query_as::<bool>(COLUMNS_UNIQUE, target, &[MetaArg::Cols(keys.clone())])
    }

    pub fn column_origins(
        &self,
        target: impl Into<MetaTarget>,
        column: usize,
    ) -> Vec<ColumnOrigin> {
        self.inner
            .query_as::<Vec<ColumnOrigin>>(COLUMN_ORIGINS, target, &[MetaArg::Index(column)])
            .unwrap_or_default()
    }

    pub fn collations(&self, target: impl Into<MetaTarget>) -> Vec<Collation> {
        self.inner
            .query_as::<Vec<Collation>>(COLLATIONS, target, &[])
            .unwrap_or_default()
    }

    /// The first (primary) collation, if any order is known to hold.
    pub fn collation(&self, target: impl Into<MetaTarget>) -> Collation {
        self.collations(target)
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    pub fn pulled_up_predicates(&self, target: impl Into<MetaTarget>) -> RelPredicates {
        self.inner
            .query_as::<RelPredicates>(PREDICATES, target, &[])
            .unwrap_or_default()
    }

    pub fn average_row_size(&self, target: impl Into<MetaTarget>) -> f64 {
        self.inner
            .query_as::<f64>(AVERAGE_ROW_SIZE, target, &[])
            .unwrap_or(0.0)
    }

    pub fn average_column_sizes(&self, target: impl Into<MetaTarget>) -> Vec<Option<f64>> {
        self.inner
            .query_as::<Vec<Option<f64>>>(AVERAGE_COLUMN_SIZES, target, &[])
            .unwrap_or_default()
    }

    pub fn memory(&self, target: impl Into<MetaTarget>) -> Option<f64> {
        self.inner.query_as::<f64>(MEMORY, target, &[])
    }

    pub fn cumulative_memory_within_phase(&self, target: impl Into<MetaTarget>) -> Option<f64> {
        self.inner.query_as::<f64>(CUMULATIVE_MEMORY, target, &[])
    }

    pub fn split_count(&self, target: impl Into<MetaTarget>) -> usize {
        self.inner
            .query_as::<usize>(SPLIT_COUNT, target, &[])
            .unwrap_or(1)
    }

    pub fn is_phase_transition(&self, target: impl Into<MetaTarget>) -> bool {
        self.inner
            .query_as::<bool>(PHASE_TRANSITION, target, &[])
            .unwrap_or(false)
    }
}

/// Builds the handler table with every built-in provider. Callers may register overrides
/// for specific operator variants before handing the table to the session; variant-specific
/// handlers win over these fallbacks.
pub fn default_metadata_registry(
    catalog: Arc<dyn Catalog>,
    cost_model: Arc<dyn CostModel<RelNodeType>>,
) -> MetadataRegistry<RelNodeType> {
    let mut registry = MetadataRegistry::new();
    {
        let catalog = catalog.clone();
        registry.register_fallback(
            ROW_COUNT,
            Arc::new(move |q, expr, _args| row_count::derive(&catalog, q, expr)),
        );
    }
    registry.register_fallback(
        MAX_ROW_COUNT,
        Arc::new(|q, expr, _args| row_count::derive_max(q, expr)),
    );
    registry.register_fallback(
        SELECTIVITY,
        Arc::new(|q, expr, args| selectivity::derive(q, expr, args)),
    );
    registry.register_fallback(
        DISTINCT_ROW_COUNT,
        Arc::new(|q, expr, args| row_count::derive_distinct(q, expr, args)),
    );
    {
        let catalog = catalog.clone();
        registry.register_fallback(
            UNIQUE_KEYS,
            Arc::new(move |q, expr, _args| unique_keys::derive(&catalog, q, expr)),
        );
    }
    registry.register_fallback(
        COLUMNS_UNIQUE,
        Arc::new(|q, expr, args| unique_keys::derive_columns_unique(q, expr, args)),
    );
    registry.register_fallback(
        COLUMN_ORIGINS,
        Arc::new(|q, expr, args| column_origins::derive(q, expr, args)),
    );
    {
        let catalog = catalog.clone();
        registry.register_fallback(
            COLLATIONS,
            Arc::new(move |q, expr, _args| collations::derive(&catalog, q, expr)),
        );
    }
    registry.register_fallback(
        PREDICATES,
        Arc::new(|q, expr, _args| predicates::derive(q, expr)),
    );
    registry.register_fallback(
        AVERAGE_COLUMN_SIZES,
        Arc::new(|q, expr, _args| size::derive_column_sizes(q, expr)),
    );
    registry.register_fallback(
        AVERAGE_ROW_SIZE,
        Arc::new(|q, expr, _args| size::derive_row_size(q, expr)),
    );
    {
        let cost_model = cost_model.clone();
        registry.register_fallback(
            CUMULATIVE_COST,
            Arc::new(move |q, expr, _args| cost::derive(&cost_model, q, expr)),
        );
    }
    for typ in [
        RelNodeType::PhysicalSort,
        RelNodeType::PhysicalHashAgg,
        RelNodeType::PhysicalHashJoin(JoinType::Inner),
    ] {
        registry.register(
            MEMORY,
            &typ,
            Arc::new(|q, expr, _args| parallelism::derive_memory(q, expr)),
        );
        registry.register(PHASE_TRANSITION, &typ, Arc::new(|_q, _expr, _args| meta(true)));
    }
    registry.register_fallback(
        CUMULATIVE_MEMORY,
        Arc::new(|q, expr, _args| parallelism::derive_cumulative_memory(q, expr)),
    );
    registry.register_fallback(SPLIT_COUNT, Arc::new(|_q, _expr, _args| meta(1usize)));
    registry.register_fallback(PHASE_TRANSITION, Arc::new(|_q, _expr, _args| meta(false)));
    registry
}
