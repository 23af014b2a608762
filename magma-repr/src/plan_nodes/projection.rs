// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::macros::define_plan_node;
use super::predicates::ListPred;

define_plan_node!(
    LogicalProjection,
    Project,
    [{ 0, child }],
    [{ 0, exprs: ListPred }]
);

define_plan_node!(
    PhysicalProjection,
    PhysicalProject,
    [{ 0, child }],
    [{ 0, exprs: ListPred }]
);

/// The mapping `input column -> output position` induced by the projection's plain column
/// references (first occurrence wins; computed outputs do not map).
pub fn projection_identity_mapping(
    exprs: &ListPred,
) -> std::collections::HashMap<usize, usize> {
    use crate::plan_nodes::{ColumnRefPred, RelReprPred};
    let mut mapping = std::collections::HashMap::new();
    for (position, expr) in exprs.to_vec().into_iter().enumerate() {
        if let Some(column_ref) = ColumnRefPred::from_pred_node(expr) {
            mapping.entry(column_ref.column()).or_insert(position);
        }
    }
    mapping
}
