// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::macros::define_plan_node;
use super::predicates::ConstantPred;

// Binary set operations; `all` distinguishes ALL from DISTINCT semantics.

define_plan_node!(
    LogicalUnion,
    Union,
    [{ 0, left }, { 1, right }],
    [{ 0, all: ConstantPred }]
);

define_plan_node!(
    LogicalIntersect,
    Intersect,
    [{ 0, left }, { 1, right }],
    [{ 0, all: ConstantPred }]
);

define_plan_node!(
    LogicalExcept,
    Except,
    [{ 0, left }, { 1, right }],
    [{ 0, all: ConstantPred }]
);

define_plan_node!(
    PhysicalUnion,
    PhysicalUnion,
    [{ 0, left }, { 1, right }],
    [{ 0, all: ConstantPred }]
);

define_plan_node!(
    PhysicalIntersect,
    PhysicalIntersect,
    [{ 0, left }, { 1, right }],
    [{ 0, all: ConstantPred }]
);

define_plan_node!(
    PhysicalExcept,
    PhysicalExcept,
    [{ 0, left }, { 1, right }],
    [{ 0, all: ConstantPred }]
);
