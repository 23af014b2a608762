// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::macros::define_plan_node;
use super::predicates::ConstantPred;

define_plan_node!(
    LogicalScan,
    Scan,
    [],
    [{ 0, table: ConstantPred }]
);

define_plan_node!(
    PhysicalScan,
    PhysicalScan,
    [],
    [{ 0, table: ConstantPred }]
);
