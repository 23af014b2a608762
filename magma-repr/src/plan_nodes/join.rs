// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::macros::define_plan_node;
use super::ArcRelPredNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    LeftSemi,
    LeftAnti,
}

impl JoinType {
    /// Whether the join's output row type concatenates both inputs (semi and anti joins
    /// only produce the left side).
    pub fn concatenates(&self) -> bool {
        matches!(self, Self::Inner | Self::LeftOuter | Self::RightOuter | Self::FullOuter)
    }
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

define_plan_node!(
    LogicalJoin,
    Join,
    [{ 0, left }, { 1, right }],
    [{ 0, cond: ArcRelPredNode }],
    { join_type: JoinType }
);

define_plan_node!(
    PhysicalNestedLoopJoin,
    PhysicalNestedLoopJoin,
    [{ 0, left }, { 1, right }],
    [{ 0, cond: ArcRelPredNode }],
    { join_type: JoinType }
);

define_plan_node!(
    PhysicalHashJoin,
    PhysicalHashJoin,
    [{ 0, left }, { 1, right }],
    [{ 0, cond: ArcRelPredNode }],
    { join_type: JoinType }
);
