// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use magma_core::metadata::{ArcMetaValue, MetaTarget, MetadataQuery};
use magma_core::volcano::ExprId;

use super::{meta, RelMetadataQuery, RelPredicates};
use crate::plan_nodes::{
    collect_column_refs, conjuncts, projection_identity_mapping, rewrite_column_refs,
    ColumnRefPred, JoinType, ListPred, RelNodeType, RelReprPred,
};

pub(super) fn derive(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let child = |idx: usize| MetaTarget::Subset(node.children[idx]);
    let predicates = match node.typ {
        RelNodeType::Filter | RelNodeType::PhysicalFilter => {
            let mut predicates = rm.pulled_up_predicates(child(0));
            predicates
                .pulled_up
                .extend(conjuncts(&memo.get_pred(node.predicates[0])));
            RelPredicates {
                pulled_up: predicates.pulled_up,
                ..Default::default()
            }
        }
        RelNodeType::Sort | RelNodeType::PhysicalSort | RelNodeType::AbstractConverter => {
            RelPredicates {
                pulled_up: rm.pulled_up_predicates(child(0)).pulled_up,
                ..Default::default()
            }
        }
        RelNodeType::Project | RelNodeType::PhysicalProject => {
            let exprs = ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let mapping = projection_identity_mapping(&exprs);
            let pulled_up = rm
                .pulled_up_predicates(child(0))
                .pulled_up
                .iter()
                .filter_map(|pred| {
                    rewrite_column_refs(pred, &|column| mapping.get(&column).copied())
                })
                .collect();
            RelPredicates {
                pulled_up,
                ..Default::default()
            }
        }
        RelNodeType::Join(join_type)
        | RelNodeType::PhysicalNestedLoopJoin(join_type)
        | RelNodeType::PhysicalHashJoin(join_type) => {
            let cond = memo.get_pred(node.predicates[0]);
            let left_len = rm.schema(child(0)).len();
            let left = rm.pulled_up_predicates(child(0)).pulled_up;
            let mut left_inferred = Vec::new();
            let mut right_inferred = Vec::new();
            for conjunct in conjuncts(&cond) {
                let columns = collect_column_refs(&conjunct);
                if columns.iter().all(|column| *column < left_len) {
                    left_inferred.push(conjunct.clone());
                } else if columns.iter().all(|column| *column >= left_len) {
                    // shift into the right input's frame
                    if let Some(shifted) =
                        rewrite_column_refs(&conjunct, &|column| Some(column - left_len))
                    {
                        right_inferred.push(shifted);
                    }
                }
            }
            let mut pulled_up = left;
            match join_type {
                JoinType::Inner => {
                    let right = rm.pulled_up_predicates(child(1)).pulled_up;
                    pulled_up.extend(right.iter().filter_map(|pred| {
                        rewrite_column_refs(pred, &|column| Some(column + left_len))
                    }));
                    pulled_up.extend(conjuncts(&cond));
                }
                JoinType::LeftSemi | JoinType::LeftAnti => {
                    // the semi-join keeps only outer-side rows; inferred left predicates
                    // hold on its output
                    if join_type == JoinType::LeftSemi {
                        pulled_up.extend(left_inferred.iter().cloned());
                    }
                }
                _ => {}
            }
            RelPredicates {
                pulled_up,
                left_inferred,
                right_inferred,
            }
        }
        RelNodeType::Agg
        | RelNodeType::PhysicalStreamingAgg
        | RelNodeType::PhysicalHashAgg => {
            let group_keys =
                ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let mapping = group_keys
                .to_vec()
                .into_iter()
                .enumerate()
                .filter_map(|(position, key)| {
                    ColumnRefPred::from_pred_node(key).map(|key| (key.column(), position))
                })
                .collect::<std::collections::HashMap<_, _>>();
            // only predicates over group keys survive aggregation
            let pulled_up = rm
                .pulled_up_predicates(child(0))
                .pulled_up
                .iter()
                .filter_map(|pred| {
                    rewrite_column_refs(pred, &|column| mapping.get(&column).copied())
                })
                .collect();
            RelPredicates {
                pulled_up,
                ..Default::default()
            }
        }
        _ => RelPredicates::default(),
    };
    meta(predicates)
}
