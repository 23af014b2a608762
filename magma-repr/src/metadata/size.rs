// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use magma_core::metadata::{ArcMetaValue, MetaTarget, MetadataQuery};
use magma_core::volcano::ExprId;

use super::{meta, RelMetadataQuery};
use crate::plan_nodes::{ConstantType, ListPred, RelNodeType, RelPredType, RelReprPred};

/// Type-driven byte estimates; variable-length types get a flat default.
fn type_size(typ: ConstantType) -> f64 {
    match typ {
        ConstantType::Bool => 1.0,
        ConstantType::Int32 => 4.0,
        ConstantType::Int64 => 8.0,
        ConstantType::Float64 => 8.0,
        ConstantType::Date => 4.0,
        ConstantType::Utf8 => 16.0,
    }
}

const UNKNOWN_COLUMN_SIZE: f64 = 8.0;

pub(super) fn derive_column_sizes(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let child = |idx: usize| MetaTarget::Subset(node.children[idx]);
    let schema_sizes = |target: MetaTarget| -> Vec<Option<f64>> {
        rm.schema(target)
            .fields
            .iter()
            .map(|field| Some(type_size(field.typ)))
            .collect()
    };
    let sizes: Vec<Option<f64>> = match node.typ {
        RelNodeType::Project | RelNodeType::PhysicalProject => {
            let child_sizes = rm.average_column_sizes(child(0));
            let exprs = ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            exprs
                .to_vec()
                .into_iter()
                .map(|expr| match &expr.typ {
                    RelPredType::ColumnRef => {
                        let column = crate::plan_nodes::ColumnRefPred::from_pred_node(expr)
                            .unwrap()
                            .column();
                        child_sizes.get(column).copied().flatten()
                    }
                    RelPredType::Constant(typ) => Some(type_size(*typ)),
                    _ => Some(UNKNOWN_COLUMN_SIZE),
                })
                .collect()
        }
        RelNodeType::Union | RelNodeType::PhysicalUnion => {
            // weight each input by its estimated row count
            let left_rows = rm.row_count(child(0));
            let right_rows = rm.row_count(child(1));
            let left_sizes = rm.average_column_sizes(child(0));
            let right_sizes = rm.average_column_sizes(child(1));
            let total = left_rows + right_rows;
            left_sizes
                .iter()
                .zip(right_sizes.iter())
                .map(|(left, right)| {
                    let left = left.unwrap_or(UNKNOWN_COLUMN_SIZE);
                    let right = right.unwrap_or(UNKNOWN_COLUMN_SIZE);
                    Some((left * left_rows + right * right_rows) / total)
                })
                .collect()
        }
        RelNodeType::Filter
        | RelNodeType::PhysicalFilter
        | RelNodeType::Sort
        | RelNodeType::PhysicalSort
        | RelNodeType::Intersect
        | RelNodeType::PhysicalIntersect
        | RelNodeType::Except
        | RelNodeType::PhysicalExcept
        | RelNodeType::AbstractConverter => rm.average_column_sizes(child(0)),
        _ => schema_sizes(MetaTarget::Expr(expr)),
    };
    meta(sizes)
}

pub(super) fn derive_row_size(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let rm = RelMetadataQuery::new(q);
    let total: f64 = rm
        .average_column_sizes(MetaTarget::Expr(expr))
        .into_iter()
        .map(|size| size.unwrap_or(UNKNOWN_COLUMN_SIZE))
        .sum();
    meta(total)
}
