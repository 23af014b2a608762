// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use magma_core::metadata::{ArcMetaValue, MetaArg, MetadataQuery};
use magma_core::nodes::Value;
use magma_core::volcano::ExprId;

use super::meta;
use crate::plan_nodes::{ArcRelPredNode, BinOpType, LogOpType, RelNodeType, RelPredType, UnOpType};

/// Default estimates in the absence of statistics: equality 0.15, other comparisons 0.5,
/// IS NOT NULL 0.9, opaque terms 0.25. Conjunctions multiply; disjunctions combine by
/// inclusion-exclusion.
pub fn estimate_selectivity(pred: &ArcRelPredNode) -> f64 {
    let selectivity = match &pred.typ {
        RelPredType::LogOp(LogOpType::And) => pred
            .children
            .iter()
            .map(estimate_selectivity)
            .product::<f64>(),
        RelPredType::LogOp(LogOpType::Or) => pred
            .children
            .iter()
            .map(estimate_selectivity)
            .fold(0.0, |acc, s| acc + s - acc * s),
        RelPredType::UnOp(UnOpType::Not) => 1.0 - estimate_selectivity(&pred.children[0]),
        RelPredType::UnOp(UnOpType::IsNotNull) => 0.9,
        RelPredType::UnOp(UnOpType::IsNull) => 0.1,
        RelPredType::BinOp(BinOpType::Eq) => 0.15,
        RelPredType::BinOp(BinOpType::Neq) => 0.85,
        RelPredType::BinOp(op) if op.is_comparison() => 0.5,
        RelPredType::Constant(_) => match &pred.data {
            Some(Value::Bool(false)) => 0.0,
            _ => 1.0,
        },
        _ => 0.25,
    };
    selectivity.clamp(0.0, 1.0)
}

pub(super) fn derive(
    q: &MetadataQuery<'_, RelNodeType>,
    _expr: ExprId,
    args: &[MetaArg],
) -> Option<ArcMetaValue> {
    match args.first() {
        Some(MetaArg::Pred(pred_id)) => meta(estimate_selectivity(&q.memo().get_pred(*pred_id))),
        _ => meta(1.0),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_approx_eq::assert_approx_eq;
    use magma_core::nodes::PredNode;
    use test_case::test_case;

    use super::*;
    use crate::plan_nodes::{BinOpPred, ColumnRefPred, ConstantPred, LogOpPred, RelReprPred, UnOpPred};

    fn eq_pred() -> ArcRelPredNode {
        BinOpPred::new(
            BinOpType::Eq,
            ColumnRefPred::new(0).into_pred_node(),
            ConstantPred::int64(10).into_pred_node(),
        )
        .into_pred_node()
    }

    fn lt_pred() -> ArcRelPredNode {
        BinOpPred::new(
            BinOpType::Lt,
            ColumnRefPred::new(0).into_pred_node(),
            ConstantPred::int64(10).into_pred_node(),
        )
        .into_pred_node()
    }

    #[test_case(BinOpType::Eq, 0.15)]
    #[test_case(BinOpType::Neq, 0.85)]
    #[test_case(BinOpType::Lt, 0.5)]
    #[test_case(BinOpType::Geq, 0.5)]
    fn comparison_defaults(op: BinOpType, expected: f64) {
        let pred = BinOpPred::new(
            op,
            ColumnRefPred::new(0).into_pred_node(),
            ConstantPred::int64(1).into_pred_node(),
        )
        .into_pred_node();
        assert_approx_eq!(estimate_selectivity(&pred), expected);
    }

    #[test]
    fn and_multiplies() {
        let pred = LogOpPred::new(LogOpType::And, vec![eq_pred(), lt_pred()]).into_pred_node();
        assert_approx_eq!(estimate_selectivity(&pred), 0.15 * 0.5);
    }

    #[test]
    fn or_uses_inclusion_exclusion() {
        let pred = LogOpPred::new(LogOpType::Or, vec![eq_pred(), lt_pred()]).into_pred_node();
        assert_approx_eq!(estimate_selectivity(&pred), 0.15 + 0.5 - 0.15 * 0.5);
    }

    #[test]
    fn not_complements() {
        let pred =
            UnOpPred::new(UnOpType::Not, eq_pred()).into_pred_node();
        assert_approx_eq!(estimate_selectivity(&pred), 0.85);
    }

    #[test]
    fn is_not_null_default() {
        let pred = UnOpPred::new(UnOpType::IsNotNull, ColumnRefPred::new(0).into_pred_node())
            .into_pred_node();
        assert_approx_eq!(estimate_selectivity(&pred), 0.9);
    }

    #[test]
    fn opaque_term_default() {
        let pred: ArcRelPredNode = Arc::new(PredNode {
            typ: RelPredType::ColumnRef,
            children: vec![],
            data: Some(Value::Int64(0)),
        });
        assert_approx_eq!(estimate_selectivity(&pred), 0.25);
    }
}
