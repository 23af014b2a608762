// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::collections::HashMap;
use std::sync::Arc;

use magma_core::metadata::{ArcMetaValue, MetaTarget, MetadataQuery};
use magma_core::volcano::ExprId;

use super::{meta, RelMetadataQuery};
use crate::physical_properties::{Collation, FieldCollation};
use crate::plan_nodes::{
    projection_identity_mapping, ColumnRefPred, ConstantPred, ListPred, RelNodeType, RelReprPred,
    SortOrderPred,
};
use crate::properties::schema::Catalog;

/// The collation produced by a list of sort-order terms; truncated at the first computed
/// (non-column) key.
pub(crate) fn collation_from_sort_keys(keys: &ListPred) -> Collation {
    let mut fields = Vec::new();
    for key in keys.to_vec() {
        let Some(order) = SortOrderPred::from_pred_node(key) else {
            break;
        };
        let Some(column_ref) = ColumnRefPred::from_pred_node(order.child()) else {
            break;
        };
        fields.push(FieldCollation {
            column: column_ref.column(),
            direction: order.direction(),
            null_order: order.null_order(),
        });
    }
    Collation(fields)
}

/// Remaps a collation through `input column -> output position`; stops at the first column
/// the mapping loses, since order beyond it no longer holds.
fn remap_collation(collation: &Collation, mapping: &HashMap<usize, usize>) -> Collation {
    let mut fields = Vec::new();
    for field in &collation.0 {
        match mapping.get(&field.column) {
            Some(&position) => fields.push(FieldCollation {
                column: position,
                ..*field
            }),
            None => break,
        }
    }
    Collation(fields)
}

fn remap_all(collations: Vec<Collation>, mapping: &HashMap<usize, usize>) -> Vec<Collation> {
    collations
        .iter()
        .map(|collation| remap_collation(collation, mapping))
        .filter(|collation| !collation.is_empty())
        .collect()
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
    let collations: Vec<Collation> = match node.typ {
        RelNodeType::Scan | RelNodeType::PhysicalScan => {
            let table = ConstantPred::from_pred_node(memo.get_pred(node.predicates[0]))
                .unwrap()
                .value()
                .as_str();
            let declared = catalog.collation(&table);
            if declared.is_empty() {
                Vec::new()
            } else {
                vec![declared]
            }
        }
        RelNodeType::Filter | RelNodeType::PhysicalFilter | RelNodeType::AbstractConverter => {
            rm.collations(child(0))
        }
        RelNodeType::Sort | RelNodeType::PhysicalSort => {
            let keys = ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let collation = collation_from_sort_keys(&keys);
            if collation.is_empty() {
                Vec::new()
            } else {
                vec![collation]
            }
        }
        RelNodeType::Project | RelNodeType::PhysicalProject => {
            let exprs = ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let mapping = projection_identity_mapping(&exprs);
            remap_all(rm.collations(child(0)), &mapping)
        }
        RelNodeType::PhysicalStreamingAgg => {
            let group_keys =
                ListPred::from_pred_node(memo.get_pred(node.predicates[0])).unwrap();
            let mapping = group_keys
                .to_vec()
                .into_iter()
                .enumerate()
                .filter_map(|(position, key)| {
                    ColumnRefPred::from_pred_node(key).map(|key| (key.column(), position))
                })
                .collect::<HashMap<_, _>>();
            remap_all(rm.collations(child(0)), &mapping)
        }
        _ => Vec::new(),
    };
    meta(collations)
}
