// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

mod filter;
mod joins;
mod physical;
mod project;

pub use filter::FilterMergeRule;
pub use joins::{HashJoinRule, JoinAssocRule, JoinCommuteRule};
pub use physical::{HashAggRule, PhysicalConversionRule};
pub use project::ProjectMergeRule;
