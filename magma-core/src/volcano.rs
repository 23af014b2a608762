// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The top-down volcano-style optimizer implementation.

mod conversion;
mod matcher;
mod memo;
mod optimizer;

pub use conversion::ExpandConversionRule;
pub use memo::{ArcMemoExpr, Memo, MemoExpr, Set, Subset, SubsetInfo, Winner, WinnerInfo};
pub use optimizer::{
    ExprId, OptimizerContext, OptimizerProperties, PredId, RelNodeContext, RuleId, SetId,
    SubsetId, VolcanoOptimizer,
};
