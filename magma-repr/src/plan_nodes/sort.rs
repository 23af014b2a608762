// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::macros::define_plan_node;
use super::predicates::{ConstantPred, ListPred};

// exprs is a list of SortOrderPred terms. offset and fetch are Int64 constants; offset 0
// means "from the start" and fetch -1 means "unlimited".
define_plan_node!(
    LogicalSort,
    Sort,
    [{ 0, child }],
    [{ 0, exprs: ListPred }, { 1, offset: ConstantPred }, { 2, fetch: ConstantPred }]
);

define_plan_node!(
    PhysicalSort,
    PhysicalSort,
    [{ 0, child }],
    [{ 0, exprs: ListPred }, { 1, offset: ConstantPred }, { 2, fetch: ConstantPred }]
);

pub fn no_offset() -> ConstantPred {
    ConstantPred::int64(0)
}

pub fn no_fetch() -> ConstantPred {
    ConstantPred::int64(-1)
}

pub fn decode_offset(offset: &ConstantPred) -> u64 {
    offset.value().as_i64().max(0) as u64
}

pub fn decode_fetch(fetch: &ConstantPred) -> Option<u64> {
    let fetch = fetch.value().as_i64();
    if fetch < 0 {
        None
    } else {
        Some(fetch as u64)
    }
}
