// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::sync::Arc;

use magma_core::metadata::{ArcMetaValue, ColumnSet, MetaArg, MetaTarget, MetadataQuery};
use magma_core::volcano::ExprId;

use super::{meta, RelMetadataQuery};
use crate::plan_nodes::{
    extract_equi_join_keys, projection_identity_mapping, ConstantPred, JoinType, ListPred,
    RelNodeType, RelReprPred,
};
use crate::properties::schema::Catalog;

pub(super) fn derive(
    catalog: &Arc<dyn Catalog>,
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let child = |idx: usize| MetaTarget::Subset(node.children[idx]);
    let keys: Vec<ColumnSet> = match node.typ {
        RelNodeType::Scan | RelNodeType::PhysicalScan => {
            let table = ConstantPred::from_pred_node(memo.get_pred(node.predicates[0]))
                .unwrap()
                .value()
                .as_str();
            catalog.unique_keys(&table)
        }
        RelNodeType::Filter
        | RelNodeType::PhysicalFilter
        | RelNodeType::Sort
        | RelNodeType::PhysicalSort
        | RelNodeType::AbstractConverter => rm.unique_keys(child(0)),
        RelNodeType::Project | RelNodeType::PhysicalProject => {
            let exprs = ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let mapping = projection_identity_mapping(&exprs);
            rm.unique_keys(child(0))
                .into_iter()
                .filter_map(|key| {
                    let mapped = key.map(|column| mapping.get(&column).copied());
                    // every key column must survive the projection
                    if mapped.len() == key.len() {
                        Some(mapped)
                    } else {
                        None
                    }
                })
                .collect()
        }
        RelNodeType::Join(join_type)
        | RelNodeType::PhysicalNestedLoopJoin(join_type)
        | RelNodeType::PhysicalHashJoin(join_type) => match join_type {
            JoinType::LeftSemi | JoinType::LeftAnti => rm.unique_keys(child(0)),
            JoinType::Inner => {
                let cond = memo.get_pred(node.predicates[0]);
                let left_len = rm.schema(child(0)).len();
                match extract_equi_join_keys(&cond, left_len) {
                    Some(pairs) => {
                        let left_cols = ColumnSet::new(pairs.iter().map(|pair| pair.0));
                        let right_cols = ColumnSet::new(pairs.iter().map(|pair| pair.1));
                        let mut keys = Vec::new();
                        // a side keeps its keys when the other side matches at most once
                        if rm.are_columns_unique(child(1), &right_cols) == Some(true) {
                            keys.extend(rm.unique_keys(child(0)));
                        }
                        if rm.are_columns_unique(child(0), &left_cols) == Some(true) {
                            keys.extend(
                                rm.unique_keys(child(1))
                                    .into_iter()
                                    .map(|key| key.map(|column| Some(column + left_len))),
                            );
                        }
                        keys
                    }
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        },
        RelNodeType::Agg
        | RelNodeType::PhysicalStreamingAgg
        | RelNodeType::PhysicalHashAgg => {
            let group_keys =
                ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            if group_keys.is_empty() {
                // a global aggregate produces exactly one row
                vec![ColumnSet::empty()]
            } else {
                vec![ColumnSet::new(0..group_keys.len())]
            }
        }
        _ => Vec::new(),
    };
    meta(keys)
}

pub(super) fn derive_columns_unique(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
    args: &[MetaArg],
) -> Option<ArcMetaValue> {
    let Some(MetaArg::Cols(keys)) = args.first() else {
        return None;
    };
    let node = q.memo().get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let unique_keys = rm.unique_keys(MetaTarget::Expr(expr));
    if unique_keys.iter().any(|key| key.is_subset_of(keys)) {
        return meta(true);
    }
    // scans and aggregates have complete knowledge of their keys
    match node.typ {
        RelNodeType::Scan
        | RelNodeType::PhysicalScan
        | RelNodeType::Agg
        | RelNodeType::PhysicalStreamingAgg
        | RelNodeType::PhysicalHashAgg => meta(false),
        _ => None,
    }
}
