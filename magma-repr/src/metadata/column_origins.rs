// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use magma_core::metadata::{ArcMetaValue, MetaArg, MetaTarget, MetadataQuery};
use magma_core::volcano::ExprId;

use super::{meta, ColumnOrigin, RelMetadataQuery};
use crate::plan_nodes::{
    collect_column_refs, ColumnRefPred, ConstantPred, FuncPred, JoinType, ListPred, RelNodeType,
    RelPredType, RelReprPred,
};

fn derived(origins: Vec<ColumnOrigin>) -> Vec<ColumnOrigin> {
    origins
        .into_iter()
        .map(|origin| ColumnOrigin {
            derived: true,
            ..origin
        })
        .collect()
}

pub(super) fn derive(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
    args: &[MetaArg],
) -> Option<ArcMetaValue> {
    let Some(MetaArg::Index(column)) = args.first() else {
        return None;
    };
    let column = *column;
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let child = |idx: usize| MetaTarget::Subset(node.children[idx]);
    let origins: Vec<ColumnOrigin> = match node.typ {
        RelNodeType::Scan | RelNodeType::PhysicalScan => {
            let table = ConstantPred::from_pred_node(memo.get_pred(node.predicates[0]))
                .unwrap()
                .value()
                .as_str();
            vec![ColumnOrigin {
                table: table.to_string(),
                column,
                derived: false,
            }]
        }
        RelNodeType::Filter
        | RelNodeType::PhysicalFilter
        | RelNodeType::Sort
        | RelNodeType::PhysicalSort
        | RelNodeType::AbstractConverter => rm.column_origins(child(0), column),
        RelNodeType::Project | RelNodeType::PhysicalProject => {
            let exprs = ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let expr = exprs.to_vec().get(column)?.clone();
            match &expr.typ {
                RelPredType::ColumnRef => {
                    let input = ColumnRefPred::from_pred_node(expr).unwrap().column();
                    rm.column_origins(child(0), input)
                }
                RelPredType::Constant(_) => Vec::new(),
                _ => derived(
                    collect_column_refs(&expr)
                        .into_iter()
                        .flat_map(|input| rm.column_origins(child(0), input))
                        .collect(),
                ),
            }
        }
        RelNodeType::Join(join_type)
        | RelNodeType::PhysicalNestedLoopJoin(join_type)
        | RelNodeType::PhysicalHashJoin(join_type) => {
            if join_type.concatenates() {
                let left_len = rm.schema(child(0)).len();
                if column < left_len {
                    rm.column_origins(child(0), column)
                } else {
                    rm.column_origins(child(1), column - left_len)
                }
            } else {
                rm.column_origins(child(0), column)
            }
        }
        RelNodeType::Agg
        | RelNodeType::PhysicalStreamingAgg
        | RelNodeType::PhysicalHashAgg => {
            let group_keys =
                ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            if column < group_keys.len() {
                let input = ColumnRefPred::from_pred_node(group_keys.child(column))
                    .unwrap()
                    .column();
                rm.column_origins(child(0), input)
            } else {
                let aggs = ListPred::from_pred_node(memo.get_pred(node.predicates[1])).unwrap();
                let agg = FuncPred::from_pred_node(aggs.to_vec().get(column - group_keys.len())?.clone())?;
                derived(
                    agg.args()
                        .iter()
                        .flat_map(collect_column_refs)
                        .flat_map(|input| rm.column_origins(child(0), input))
                        .collect(),
                )
            }
        }
        RelNodeType::Union
        | RelNodeType::Intersect
        | RelNodeType::Except
        | RelNodeType::PhysicalUnion
        | RelNodeType::PhysicalIntersect
        | RelNodeType::PhysicalExcept => {
            let mut origins = rm.column_origins(child(0), column);
            origins.extend(rm.column_origins(child(1), column));
            origins
        }
        RelNodeType::Values | RelNodeType::PhysicalValues => Vec::new(),
    };
    meta(origins)
}
