// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use magma_core::cost::{Cost, CostModel};
use magma_core::metadata::{MetaTarget, MetadataQuery};
use magma_core::volcano::RelNodeContext;

use crate::metadata::RelMetadataQuery;
use crate::plan_nodes::{ArcRelPredNode, RelNodeType};

/// A row-count-driven cost model: scans pay io, joins and sorts pay cpu, everything
/// reports its output cardinality as the `rows` component. Logical operators have no
/// entry; they fall back to unit cost and are kept out of physical subsets by the
/// convention axis.
pub struct BaseCostModel;

impl BaseCostModel {
    pub fn new() -> Self {
        Self
    }
}

impl CostModel<RelNodeType> for BaseCostModel {
    fn self_cost(
        &self,
        typ: &RelNodeType,
        _predicates: &[ArcRelPredNode],
        meta: &MetadataQuery<'_, RelNodeType>,
        context: &RelNodeContext,
    ) -> Option<Cost> {
        let rm = RelMetadataQuery::new(meta);
        let out = rm.row_count(MetaTarget::Expr(context.expr_id));
        let child_rows = |idx: usize| rm.row_count(MetaTarget::Subset(context.children[idx]));
        let cost = match typ {
            RelNodeType::PhysicalScan => Cost::new(out, 0.0, out),
            RelNodeType::PhysicalFilter => Cost::new(out, child_rows(0), 0.0),
            RelNodeType::PhysicalProject => Cost::new(out, child_rows(0), 0.0),
            RelNodeType::PhysicalNestedLoopJoin(_) => {
                Cost::new(out, child_rows(0) * child_rows(1), 0.0)
            }
            RelNodeType::PhysicalHashJoin(_) => {
                Cost::new(out, 2.0 * child_rows(0) + child_rows(1), 0.0)
            }
            RelNodeType::PhysicalSort => {
                let input = child_rows(0);
                Cost::new(out, input * input.ln_1p().max(1.0), 0.0)
            }
            RelNodeType::PhysicalStreamingAgg => Cost::new(out, child_rows(0), 0.0),
            RelNodeType::PhysicalHashAgg => Cost::new(out, 2.0 * child_rows(0), 0.0),
            RelNodeType::PhysicalUnion => Cost::new(out, child_rows(0) + child_rows(1), 0.0),
            RelNodeType::PhysicalIntersect | RelNodeType::PhysicalExcept => {
                Cost::new(out, child_rows(0) + child_rows(1), 0.0)
            }
            RelNodeType::PhysicalValues => Cost::new(out, out, 0.0),
            _ => return None,
        };
        Some(cost)
    }
}
