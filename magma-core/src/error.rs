// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use thiserror::Error;

use crate::volcano::SubsetId;

/// Errors surfaced by an optimization session. Missing metadata is never an error; providers
/// return `None` instead.
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// A rule action failed. Fatal to the session unless the driver is configured to
    /// continue on rule errors.
    #[error("rule {rule} failed")]
    Rule {
        rule: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The target subset has no feasible complete plan.
    #[error("no feasible plan for subset {subset}")]
    NoPlanFound { subset: SubsetId },

    /// An enforcer refused to materialize a trait value.
    #[error("cannot enforce trait axis {axis} from {from} to {to}")]
    InfeasibleConversion {
        axis: &'static str,
        from: String,
        to: String,
    },

    /// The driver stopped on request before finding any plan.
    #[error("optimization cancelled")]
    Cancelled,

    /// An internal invariant was violated. Always fatal.
    #[error("invalid optimizer state: {0}")]
    InvalidState(String),
}
