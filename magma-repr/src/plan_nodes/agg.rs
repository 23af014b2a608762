// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::macros::define_plan_node;
use super::predicates::ListPred;

// group_keys is a list of column references over the input; aggs is a list of aggregate
// function calls. The output row type is group keys first, aggregate values after.
define_plan_node!(
    LogicalAgg,
    Agg,
    [{ 0, child }],
    [{ 0, group_keys: ListPred }, { 1, aggs: ListPred }]
);

define_plan_node!(
    PhysicalStreamingAgg,
    PhysicalStreamingAgg,
    [{ 0, child }],
    [{ 0, group_keys: ListPred }, { 1, aggs: ListPred }]
);

define_plan_node!(
    PhysicalHashAgg,
    PhysicalHashAgg,
    [{ 0, child }],
    [{ 0, group_keys: ListPred }, { 1, aggs: ListPred }]
);
