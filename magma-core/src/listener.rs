// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::nodes::NodeType;
use crate::volcano::{ExprId, SubsetId};

/// Synchronous tracing hooks invoked by the driver during optimization. All methods default
/// to no-ops; implementations must not mutate the session.
pub trait OptimizerListener<T: NodeType>: 'static + Send + Sync {
    /// A rule call passed validation and is about to match/fire.
    fn rule_attempted(&self, _rule: &'static str, _expr: ExprId) {}

    /// A rule registered a new equivalent expression.
    fn rule_production(&self, _rule: &'static str, _origin: ExprId, _produced: ExprId) {}

    /// A produced expression deduplicated against an already-registered one.
    fn rel_equivalence_found(&self, _expr: ExprId, _subset: SubsetId) {}

    /// An expression was pruned from contention (e.g. an inexpandable abstract converter).
    fn rel_discarded(&self, _expr: ExprId) {}
}
