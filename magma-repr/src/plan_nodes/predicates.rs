// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Typed wrappers over the scalar expression language. The optimizer treats predicates as
//! opaque trees; metadata providers and rules introspect them through these wrappers.

use std::sync::Arc;

use magma_core::nodes::{PredNode, Value};
use serde::{Deserialize, Serialize};

use super::{ArcRelPredNode, RelPredType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstantType {
    Bool,
    Int32,
    Int64,
    Float64,
    Utf8,
    Date,
}

impl ConstantType {
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Bool(_) => ConstantType::Bool,
            Value::Int32(_) => ConstantType::Int32,
            Value::Int64(_) => ConstantType::Int64,
            Value::Float(_) => ConstantType::Float64,
            Value::String(_) => ConstantType::Utf8,
            Value::Date32(_) => ConstantType::Date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOpType {
    Neg,
    Not,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpType {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Gt,
    Geq,
    Lt,
    Leq,
}

impl BinOpType {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Neq | Self::Gt | Self::Geq | Self::Lt | Self::Leq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogOpType {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncType {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Asc => write!(f, "asc"),
            Direction::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullOrder {
    NullsFirst,
    NullsLast,
}

impl std::fmt::Display for NullOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NullOrder::NullsFirst => write!(f, "nulls_first"),
            NullOrder::NullsLast => write!(f, "nulls_last"),
        }
    }
}

/// Typed wrapper over an `ArcRelPredNode` of one specific predicate variant.
pub trait RelReprPred: 'static + Clone {
    fn into_pred_node(self) -> ArcRelPredNode;

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self>
    where
        Self: Sized;
}

/// The identity wrapper, for node slots that accept any predicate.
impl RelReprPred for ArcRelPredNode {
    fn into_pred_node(self) -> ArcRelPredNode {
        self
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        Some(node)
    }
}

#[derive(Clone, Debug)]
pub struct ConstantPred(pub ArcRelPredNode);

impl ConstantPred {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(PredNode {
            typ: RelPredType::Constant(ConstantType::of_value(&value)),
            children: vec![],
            data: Some(value),
        }))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Value::Bool(value))
    }

    pub fn int64(value: i64) -> Self {
        Self::new(Value::Int64(value))
    }

    pub fn string(value: impl AsRef<str>) -> Self {
        Self::new(Value::String(value.as_ref().into()))
    }

    pub fn value(&self) -> Value {
        self.0.unwrap_data()
    }

    pub fn constant_type(&self) -> ConstantType {
        match self.0.typ {
            RelPredType::Constant(typ) => typ,
            _ => unreachable!(),
        }
    }
}

impl RelReprPred for ConstantPred {
    fn into_pred_node(self) -> ArcRelPredNode {
        self.0
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        if matches!(node.typ, RelPredType::Constant(_)) {
            Some(Self(node))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColumnRefPred(pub ArcRelPredNode);

impl ColumnRefPred {
    pub fn new(column: usize) -> Self {
        Self(Arc::new(PredNode {
            typ: RelPredType::ColumnRef,
            children: vec![],
            data: Some(Value::Int64(column as i64)),
        }))
    }

    /// Gets the column index.
    pub fn column(&self) -> usize {
        self.0.unwrap_data().as_i64() as usize
    }
}

impl RelReprPred for ColumnRefPred {
    fn into_pred_node(self) -> ArcRelPredNode {
        self.0
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        if matches!(node.typ, RelPredType::ColumnRef) {
            Some(Self(node))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct ListPred(pub ArcRelPredNode);

impl ListPred {
    pub fn new(children: Vec<ArcRelPredNode>) -> Self {
        Self(Arc::new(PredNode {
            typ: RelPredType::List,
            children,
            data: None,
        }))
    }

    pub fn len(&self) -> usize {
        self.0.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.children.is_empty()
    }

    pub fn child(&self, idx: usize) -> ArcRelPredNode {
        self.0.child(idx)
    }

    pub fn to_vec(&self) -> Vec<ArcRelPredNode> {
        self.0.children.clone()
    }
}

impl RelReprPred for ListPred {
    fn into_pred_node(self) -> ArcRelPredNode {
        self.0
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        if matches!(node.typ, RelPredType::List) {
            Some(Self(node))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct UnOpPred(pub ArcRelPredNode);

impl UnOpPred {
    pub fn new(op_type: UnOpType, child: ArcRelPredNode) -> Self {
        Self(Arc::new(PredNode {
            typ: RelPredType::UnOp(op_type),
            children: vec![child],
            data: None,
        }))
    }

    pub fn op_type(&self) -> UnOpType {
        match self.0.typ {
            RelPredType::UnOp(op) => op,
            _ => unreachable!(),
        }
    }

    pub fn child(&self) -> ArcRelPredNode {
        self.0.child(0)
    }
}

impl RelReprPred for UnOpPred {
    fn into_pred_node(self) -> ArcRelPredNode {
        self.0
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        if matches!(node.typ, RelPredType::UnOp(_)) {
            Some(Self(node))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct BinOpPred(pub ArcRelPredNode);

impl BinOpPred {
    pub fn new(op_type: BinOpType, left: ArcRelPredNode, right: ArcRelPredNode) -> Self {
        Self(Arc::new(PredNode {
            typ: RelPredType::BinOp(op_type),
            children: vec![left, right],
            data: None,
        }))
    }

    pub fn op_type(&self) -> BinOpType {
        match self.0.typ {
            RelPredType::BinOp(op) => op,
            _ => unreachable!(),
        }
    }

    pub fn left(&self) -> ArcRelPredNode {
        self.0.child(0)
    }

    pub fn right(&self) -> ArcRelPredNode {
        self.0.child(1)
    }
}

impl RelReprPred for BinOpPred {
    fn into_pred_node(self) -> ArcRelPredNode {
        self.0
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        if matches!(node.typ, RelPredType::BinOp(_)) {
            Some(Self(node))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogOpPred(pub ArcRelPredNode);

impl LogOpPred {
    pub fn new(op_type: LogOpType, children: Vec<ArcRelPredNode>) -> Self {
        Self(Arc::new(PredNode {
            typ: RelPredType::LogOp(op_type),
            children,
            data: None,
        }))
    }

    pub fn op_type(&self) -> LogOpType {
        match self.0.typ {
            RelPredType::LogOp(op) => op,
            _ => unreachable!(),
        }
    }

    pub fn children(&self) -> Vec<ArcRelPredNode> {
        self.0.children.clone()
    }
}

impl RelReprPred for LogOpPred {
    fn into_pred_node(self) -> ArcRelPredNode {
        self.0
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        if matches!(node.typ, RelPredType::LogOp(_)) {
            Some(Self(node))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct FuncPred(pub ArcRelPredNode);

impl FuncPred {
    pub fn new(func: FuncType, args: Vec<ArcRelPredNode>) -> Self {
        Self(Arc::new(PredNode {
            typ: RelPredType::Func(func),
            children: args,
            data: None,
        }))
    }

    pub fn func(&self) -> FuncType {
        match self.0.typ {
            RelPredType::Func(func) => func,
            _ => unreachable!(),
        }
    }

    pub fn args(&self) -> Vec<ArcRelPredNode> {
        self.0.children.clone()
    }
}

impl RelReprPred for FuncPred {
    fn into_pred_node(self) -> ArcRelPredNode {
        self.0
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        if matches!(node.typ, RelPredType::Func(_)) {
            Some(Self(node))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct SortOrderPred(pub ArcRelPredNode);

impl SortOrderPred {
    pub fn new(direction: Direction, null_order: NullOrder, child: ArcRelPredNode) -> Self {
        Self(Arc::new(PredNode {
            typ: RelPredType::SortOrder(direction, null_order),
            children: vec![child],
            data: None,
        }))
    }

    pub fn direction(&self) -> Direction {
        match self.0.typ {
            RelPredType::SortOrder(direction, _) => direction,
            _ => unreachable!(),
        }
    }

    pub fn null_order(&self) -> NullOrder {
        match self.0.typ {
            RelPredType::SortOrder(_, null_order) => null_order,
            _ => unreachable!(),
        }
    }

    pub fn child(&self) -> ArcRelPredNode {
        self.0.child(0)
    }
}

impl RelReprPred for SortOrderPred {
    fn into_pred_node(self) -> ArcRelPredNode {
        self.0
    }

    fn from_pred_node(node: ArcRelPredNode) -> Option<Self> {
        if matches!(node.typ, RelPredType::SortOrder(_, _)) {
            Some(Self(node))
        } else {
            None
        }
    }
}

/// Rewrites every column reference through `mapper`; returns `None` when the mapper rejects
/// one of the referenced columns.
pub fn rewrite_column_refs(
    pred: &ArcRelPredNode,
    mapper: &impl Fn(usize) -> Option<usize>,
) -> Option<ArcRelPredNode> {
    if let Some(column_ref) = ColumnRefPred::from_pred_node(pred.clone()) {
        return Some(ColumnRefPred::new(mapper(column_ref.column())?).into_pred_node());
    }
    let mut children = Vec::with_capacity(pred.children.len());
    for child in &pred.children {
        children.push(rewrite_column_refs(child, mapper)?);
    }
    Some(Arc::new(PredNode {
        typ: pred.typ.clone(),
        children,
        data: pred.data.clone(),
    }))
}

/// Collects the column indices referenced anywhere in the predicate.
pub fn collect_column_refs(pred: &ArcRelPredNode) -> Vec<usize> {
    fn walk(pred: &ArcRelPredNode, out: &mut Vec<usize>) {
        if let Some(column_ref) = ColumnRefPred::from_pred_node(pred.clone()) {
            out.push(column_ref.column());
            return;
        }
        for child in &pred.children {
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    walk(pred, &mut out);
    out.sort_unstable();
    out.dedup();
    out
}

/// Decomposes a conjunction into its conjuncts (a non-AND predicate is its own conjunct).
pub fn conjuncts(pred: &ArcRelPredNode) -> Vec<ArcRelPredNode> {
    match &pred.typ {
        RelPredType::LogOp(LogOpType::And) => {
            pred.children.iter().flat_map(conjuncts).collect()
        }
        _ => vec![pred.clone()],
    }
}

/// Extracts equi-join key pairs `(left column, right column)` from a join condition over
/// `left_len + right_len` columns. Returns `None` when the condition is not a conjunction
/// of column equalities across the two sides.
pub fn extract_equi_join_keys(
    cond: &ArcRelPredNode,
    left_len: usize,
) -> Option<Vec<(usize, usize)>> {
    let mut keys = Vec::new();
    for conjunct in conjuncts(cond) {
        let bin_op = BinOpPred::from_pred_node(conjunct)?;
        if bin_op.op_type() != BinOpType::Eq {
            return None;
        }
        let a = ColumnRefPred::from_pred_node(bin_op.left())?.column();
        let b = ColumnRefPred::from_pred_node(bin_op.right())?.column();
        match (a < left_len, b < left_len) {
            (true, false) => keys.push((a, b - left_len)),
            (false, true) => keys.push((b, a - left_len)),
            _ => return None,
        }
    }
    if keys.is_empty() {
        None
    } else {
        Some(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_nodes::LogOpPred;

    fn col_eq_col(a: usize, b: usize) -> ArcRelPredNode {
        BinOpPred::new(
            BinOpType::Eq,
            ColumnRefPred::new(a).into_pred_node(),
            ColumnRefPred::new(b).into_pred_node(),
        )
        .into_pred_node()
    }

    #[test]
    fn rewrite_column_refs_rejects_unmapped() {
        let pred = col_eq_col(0, 3);
        let shifted = rewrite_column_refs(&pred, &|column| Some(column + 1)).unwrap();
        assert_eq!(collect_column_refs(&shifted), vec![1, 4]);
        assert!(rewrite_column_refs(&pred, &|column| {
            if column == 0 {
                None
            } else {
                Some(column)
            }
        })
        .is_none());
    }

    #[test]
    fn equi_join_keys_from_conjunction() {
        let cond = LogOpPred::new(
            LogOpType::And,
            vec![col_eq_col(0, 4), col_eq_col(5, 1)],
        )
        .into_pred_node();
        assert_eq!(
            extract_equi_join_keys(&cond, 4),
            Some(vec![(0, 0), (1, 1)])
        );
        // a non-equi conjunct disqualifies the whole condition
        let cond = LogOpPred::new(
            LogOpType::And,
            vec![
                col_eq_col(0, 4),
                BinOpPred::new(
                    BinOpType::Lt,
                    ColumnRefPred::new(1).into_pred_node(),
                    ColumnRefPred::new(5).into_pred_node(),
                )
                .into_pred_node(),
            ],
        )
        .into_pred_node();
        assert_eq!(extract_equi_join_keys(&cond, 4), None);
    }

    #[test]
    fn conjuncts_flatten_nested_ands() {
        let cond = LogOpPred::new(
            LogOpType::And,
            vec![
                col_eq_col(0, 1),
                LogOpPred::new(LogOpType::And, vec![col_eq_col(2, 3), col_eq_col(4, 5)])
                    .into_pred_node(),
            ],
        )
        .into_pred_node();
        assert_eq!(conjuncts(&cond).len(), 3);
    }
}
