// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Memory and parallelism estimates. These are deliberately coarse; consumers must treat a
//! missing answer as unknown.

use magma_core::metadata::{ArcMetaValue, MetaTarget, MetadataQuery};
use magma_core::volcano::ExprId;

use super::{meta, RelMetadataQuery};
use crate::plan_nodes::RelNodeType;

/// Registered for the buffering operators only (sort, hash aggregate, hash join build).
pub(super) fn derive_memory(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let rm = RelMetadataQuery::new(q);
    let rows = rm.row_count(MetaTarget::Expr(expr));
    let row_size = rm.average_row_size(MetaTarget::Expr(expr));
    meta(rows * row_size)
}

pub(super) fn derive_cumulative_memory(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let mut total = rm.memory(MetaTarget::Expr(expr)).unwrap_or(0.0);
    for child in &node.children {
        total += rm
            .cumulative_memory_within_phase(MetaTarget::Subset(*child))
            .unwrap_or(0.0);
    }
    meta(total)
}
