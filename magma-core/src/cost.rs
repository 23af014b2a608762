// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::cmp::Ordering;
use std::fmt::Display;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::metadata::MetadataQuery;
use crate::nodes::{ArcPredNode, NodeType};
use crate::volcano::RelNodeContext;

/// The cost of an operation: estimated output rows, cpu work, and io volume. Costs are
/// non-negative, add componentwise, and compare lexicographically on `(rows, cpu, io)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub rows: f64,
    pub cpu: f64,
    pub io: f64,
}

impl Cost {
    pub const fn new(rows: f64, cpu: f64, io: f64) -> Self {
        Self { rows, cpu, io }
    }

    /// The additive identity.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// The default self-cost of an operator without a cost-model entry.
    pub const fn unit() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    /// Absorbing upper bound; greater than every other cost.
    pub const fn infinity() -> Self {
        Self::new(f64::INFINITY, f64::INFINITY, f64::INFINITY)
    }

    /// Sentinel below all typical finite costs.
    pub const fn tiny() -> Self {
        Self::new(1e-100, 0.0, 0.0)
    }

    /// Sentinel above all typical finite costs (but still below `infinity`).
    pub const fn huge() -> Self {
        Self::new(1e100, 1e100, 1e100)
    }

    pub fn is_infinite(&self) -> bool {
        self.rows.is_infinite() || self.cpu.is_infinite() || self.io.is_infinite()
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, other: Cost) -> Cost {
        Cost::new(
            self.rows + other.rows,
            self.cpu + other.cpu,
            self.io + other.io,
        )
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, other: Cost) {
        self.rows += other.rows;
        self.cpu += other.cpu;
        self.io += other.io;
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(
            self.rows
                .total_cmp(&other.rows)
                .then(self.cpu.total_cmp(&other.cpu))
                .then(self.io.total_cmp(&other.io)),
        )
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{rows={},cpu={},io={}}}", self.rows, self.cpu, self.io)
    }
}

/// Supplies the self-cost of a single operator. The cumulative cost of an expression is its
/// self-cost plus the sum of the best costs of its child subsets; that combination is owned
/// by the driver and the cumulative-cost metadata provider.
pub trait CostModel<T: NodeType>: 'static + Send + Sync {
    /// The cost of executing one operator, excluding its inputs. `None` falls back to
    /// `Cost::unit()`.
    fn self_cost(
        &self,
        typ: &T,
        predicates: &[ArcPredNode<T>],
        meta: &MetadataQuery<'_, T>,
        context: &RelNodeContext,
    ) -> Option<Cost>;

    fn explain_cost(&self, cost: &Cost) -> String {
        cost.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicographic_order() {
        assert!(Cost::new(1.0, 9.0, 9.0) < Cost::new(2.0, 0.0, 0.0));
        assert!(Cost::new(1.0, 2.0, 9.0) < Cost::new(1.0, 3.0, 0.0));
        assert!(Cost::new(1.0, 2.0, 3.0) < Cost::new(1.0, 2.0, 4.0));
        assert!(Cost::zero() < Cost::unit());
    }

    #[test]
    fn sentinels() {
        let finite = Cost::new(1e6, 1e6, 1e6);
        assert!(Cost::tiny() < finite);
        assert!(finite < Cost::huge());
        assert!(Cost::huge() < Cost::infinity());
        assert!(!finite.is_infinite());
        assert!(Cost::infinity().is_infinite());
    }

    #[test]
    fn componentwise_addition() {
        let total = Cost::new(1.0, 2.0, 3.0) + Cost::new(4.0, 5.0, 6.0);
        assert_eq!(total, Cost::new(5.0, 7.0, 9.0));
        let mut acc = Cost::zero();
        acc += Cost::unit();
        acc += Cost::unit();
        assert_eq!(acc, Cost::new(2.0, 2.0, 2.0));
    }
}
