// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::sync::Arc;

use magma_core::metadata::{ArcMetaValue, ColumnSet, MetaArg, MetaTarget, MetadataQuery};
use magma_core::volcano::ExprId;

use super::{meta, RelMetadataQuery};
use crate::plan_nodes::{
    decode_fetch, decode_offset, ColumnRefPred, ConstantPred, JoinType, ListPred, RelNodeType,
    RelReprPred,
};
use crate::properties::schema::Catalog;

pub const DEFAULT_TABLE_ROW_CNT: usize = 1000;

/// Estimated distinct values when `selected` rows are drawn from a domain of `domain`
/// values with replacement.
pub(super) fn num_distinct_vals(domain: f64, selected: f64) -> f64 {
    if domain <= 1.0 {
        return domain.max(0.0);
    }
    domain * (1.0 - (1.0 - 1.0 / domain).powf(selected))
}

pub(super) fn derive(
    catalog: &Arc<dyn Catalog>,
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let child = |idx: usize| MetaTarget::Subset(node.children[idx]);
    let rows = match node.typ {
        RelNodeType::Scan | RelNodeType::PhysicalScan => {
            let table = ConstantPred::from_pred_node(memo.get_pred(node.predicates[0]))
                .unwrap()
                .value()
                .as_str();
            catalog
                .row_count(&table)
                .unwrap_or(DEFAULT_TABLE_ROW_CNT as f64)
        }
        RelNodeType::Filter | RelNodeType::PhysicalFilter => {
            let cond = memo.get_pred(node.predicates[0]);
            rm.row_count(child(0)) * rm.selectivity(child(0), Some(&cond))
        }
        RelNodeType::Project | RelNodeType::PhysicalProject | RelNodeType::AbstractConverter => {
            rm.row_count(child(0))
        }
        RelNodeType::Join(join_type)
        | RelNodeType::PhysicalNestedLoopJoin(join_type)
        | RelNodeType::PhysicalHashJoin(join_type) => {
            let cond = memo.get_pred(node.predicates[0]);
            let selectivity = rm.selectivity(child(0), Some(&cond));
            let left = rm.row_count(child(0));
            match join_type {
                JoinType::Inner
                | JoinType::LeftOuter
                | JoinType::RightOuter
                | JoinType::FullOuter => left * rm.row_count(child(1)) * selectivity,
                JoinType::LeftSemi => left * selectivity,
                JoinType::LeftAnti => left * (1.0 - selectivity),
            }
        }
        RelNodeType::Agg
        | RelNodeType::PhysicalStreamingAgg
        | RelNodeType::PhysicalHashAgg => {
            let group_keys =
                ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            if group_keys.is_empty() {
                1.0
            } else {
                let keys = ColumnSet::new(group_keys.to_vec().into_iter().map(|key| {
                    ColumnRefPred::from_pred_node(key).unwrap().column()
                }));
                rm.distinct_row_count(child(0), &keys, None)
                    .unwrap_or_else(|| rm.row_count(child(0)) * 0.1)
            }
        }
        RelNodeType::Union | RelNodeType::PhysicalUnion => {
            rm.row_count(child(0)) + rm.row_count(child(1))
        }
        RelNodeType::Intersect | RelNodeType::PhysicalIntersect => {
            rm.row_count(child(0)).min(rm.row_count(child(1)))
        }
        RelNodeType::Except | RelNodeType::PhysicalExcept => rm.row_count(child(0)),
        RelNodeType::Sort | RelNodeType::PhysicalSort => {
            let offset = decode_offset(
                &ConstantPred::from_pred_node(memo.get_pred(node.predicates[1])).unwrap(),
            );
            let fetch = decode_fetch(
                &ConstantPred::from_pred_node(memo.get_pred(node.predicates[2])).unwrap(),
            );
            let mut rows = (rm.row_count(child(0)) - offset as f64).max(0.0);
            if let Some(fetch) = fetch {
                rows = rows.min(fetch as f64);
            }
            rows
        }
        RelNodeType::Values | RelNodeType::PhysicalValues => {
            ListPred::from_pred_node(memo.get_pred(node.predicates[0]))
                .unwrap()
                .len() as f64
        }
    };
    meta(rows)
}

pub(super) fn derive_max(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
) -> Option<ArcMetaValue> {
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let child = |idx: usize| MetaTarget::Subset(node.children[idx]);
    let rows = match node.typ {
        RelNodeType::Scan | RelNodeType::PhysicalScan => f64::INFINITY,
        RelNodeType::Filter
        | RelNodeType::PhysicalFilter
        | RelNodeType::Project
        | RelNodeType::PhysicalProject
        | RelNodeType::AbstractConverter => rm.max_row_count(child(0)),
        RelNodeType::Join(join_type)
        | RelNodeType::PhysicalNestedLoopJoin(join_type)
        | RelNodeType::PhysicalHashJoin(join_type) => match join_type {
            JoinType::Inner
            | JoinType::LeftOuter
            | JoinType::RightOuter
            | JoinType::FullOuter => rm.max_row_count(child(0)) * rm.max_row_count(child(1)),
            JoinType::LeftSemi | JoinType::LeftAnti => rm.max_row_count(child(0)),
        },
        RelNodeType::Agg
        | RelNodeType::PhysicalStreamingAgg
        | RelNodeType::PhysicalHashAgg => {
            let group_keys =
                ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            if group_keys.is_empty() {
                1.0
            } else {
                rm.max_row_count(child(0))
            }
        }
        RelNodeType::Union | RelNodeType::PhysicalUnion => {
            rm.max_row_count(child(0)) + rm.max_row_count(child(1))
        }
        RelNodeType::Intersect | RelNodeType::PhysicalIntersect => {
            rm.max_row_count(child(0)).min(rm.max_row_count(child(1)))
        }
        RelNodeType::Except | RelNodeType::PhysicalExcept => rm.max_row_count(child(0)),
        RelNodeType::Sort | RelNodeType::PhysicalSort => {
            let fetch = decode_fetch(
                &ConstantPred::from_pred_node(memo.get_pred(node.predicates[2])).unwrap(),
            );
            match fetch {
                Some(fetch) => fetch as f64,
                None => rm.max_row_count(child(0)),
            }
        }
        RelNodeType::Values | RelNodeType::PhysicalValues => {
            ListPred::from_pred_node(memo.get_pred(node.predicates[0]))
                .unwrap()
                .len() as f64
        }
    };
    meta(rows)
}

pub(super) fn derive_distinct(
    q: &MetadataQuery<'_, RelNodeType>,
    expr: ExprId,
    args: &[MetaArg],
) -> Option<ArcMetaValue> {
    let Some(MetaArg::Cols(keys)) = args.first() else {
        return None;
    };
    let memo = q.memo();
    let node = memo.get_expr_memoed(expr);
    let rm = RelMetadataQuery::new(q);
    let child = |idx: usize| MetaTarget::Subset(node.children[idx]);
    let pred = match args.get(1) {
        Some(MetaArg::Pred(pred_id)) => Some(memo.get_pred(*pred_id)),
        _ => None,
    };
    let selectivity = pred
        .as_ref()
        .map(super::estimate_selectivity)
        .unwrap_or(1.0);
    if keys.is_empty() {
        return meta(1.0);
    }
    if rm.are_columns_unique(MetaTarget::Expr(expr), keys) == Some(true) {
        return meta((rm.row_count(MetaTarget::Expr(expr)) * selectivity).max(1.0));
    }
    let distinct = match node.typ {
        RelNodeType::Scan | RelNodeType::PhysicalScan => {
            let rows = rm.row_count(MetaTarget::Expr(expr));
            num_distinct_vals(rows, rows * selectivity)
        }
        RelNodeType::Filter | RelNodeType::PhysicalFilter => {
            let cond = memo.get_pred(node.predicates[0]);
            let child_distinct = rm.distinct_row_count(child(0), keys, None)?;
            (child_distinct * rm.selectivity(child(0), Some(&cond)) * selectivity).max(1.0)
        }
        RelNodeType::Sort | RelNodeType::PhysicalSort | RelNodeType::AbstractConverter => {
            rm.distinct_row_count(child(0), keys, pred.as_ref())?
        }
        RelNodeType::Project | RelNodeType::PhysicalProject => {
            let exprs = ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let exprs = exprs.to_vec();
            let mut child_keys = Vec::new();
            for key in keys.iter() {
                let column_ref = ColumnRefPred::from_pred_node(exprs.get(key)?.clone())?;
                child_keys.push(column_ref.column());
            }
            rm.distinct_row_count(child(0), &ColumnSet::new(child_keys), pred.as_ref())?
        }
        RelNodeType::Agg
        | RelNodeType::PhysicalStreamingAgg
        | RelNodeType::PhysicalHashAgg => {
            let group_keys =
                ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let group_keys = group_keys.to_vec();
            let mut child_keys = Vec::new();
            for key in keys.iter() {
                let group_key = group_keys.get(key)?;
                let column_ref = ColumnRefPred::from_pred_node(group_key.clone()).unwrap();
                child_keys.push(column_ref.column());
            }
            rm.distinct_row_count(child(0), &ColumnSet::new(child_keys), None)?
        }
        _ => return None,
    };
    meta(distinct.min(rm.row_count(MetaTarget::Expr(expr))).max(1.0))
}
