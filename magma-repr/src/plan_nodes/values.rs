// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::macros::define_plan_node;
use super::predicates::ListPred;

// rows is a list of equal-length constant lists.
define_plan_node!(
    LogicalValues,
    Values,
    [],
    [{ 0, rows: ListPred }]
);

define_plan_node!(
    PhysicalValues,
    PhysicalValues,
    [],
    [{ 0, rows: ListPred }]
);
