// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::macros::define_plan_node;
use super::ArcRelPredNode;

define_plan_node!(
    LogicalFilter,
    Filter,
    [{ 0, child }],
    [{ 0, cond: ArcRelPredNode }]
);

define_plan_node!(
    PhysicalFilter,
    PhysicalFilter,
    [{ 0, child }],
    [{ 0, cond: ArcRelPredNode }]
);
