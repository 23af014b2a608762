// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cost::Cost;
use crate::error::OptimizeError;
use crate::logical_property::LogicalPropertyBuilder;
use crate::metadata::MetadataQuery;
use crate::nodes::{ArcPlanNode, NodeType};
use crate::traits::{TraitRegistry, TraitSet};
use crate::volcano::SubsetId;

/// Cooperative cancellation flag polled by the driver between rule calls.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// The seam between rules and the engine driving them.
pub trait Optimizer<T: NodeType> {
    fn optimize(
        &mut self,
        root: ArcPlanNode<T>,
        required: TraitSet<T>,
        cancel: &CancellationToken,
    ) -> Result<(ArcPlanNode<T>, Cost), OptimizeError>;

    /// The idx-th logical property of a registered subset's set. The order of properties is
    /// defined by the builder list passed at session construction.
    fn get_logical_property<P: LogicalPropertyBuilder<T>>(
        &self,
        subset: SubsetId,
        idx: usize,
    ) -> P::Prop;

    fn metadata(&self) -> MetadataQuery<'_, T>;

    fn trait_registry(&self) -> &TraitRegistry<T>;
}
