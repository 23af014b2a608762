// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The plan-node representation shared by all optimizer passes.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::traits::TraitSet;
use crate::volcano::SubsetId;

pub type ArcPlanNode<T> = Arc<PlanNode<T>>;
pub type ArcPredNode<T> = Arc<PredNode<T>>;

/// The operator alphabet of a plan representation. The optimizer core is generic over this
/// trait; a representation crate supplies the concrete relational and predicate variants.
pub trait NodeType:
    PartialEq + Eq + Hash + Clone + Debug + Display + Send + Sync + 'static
{
    type PredType: PartialEq + Eq + Hash + Clone + Debug + Display + Send + Sync + 'static;

    /// One value of the per-axis physical-trait union. A trait set stores one of these per
    /// registered axis.
    type TraitValue: PartialEq + Eq + Hash + Clone + Debug + Display + Send + Sync + 'static;

    fn is_logical(&self) -> bool;

    /// The synthetic operator the memo registers when a subset with a requested trait set has
    /// no member yet. Expanded into concrete per-axis enforcers by `ExpandConversionRule`.
    fn abstract_converter() -> Self;
}

/// A constant value in the expression language.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(OrderedFloat<f64>),
    String(Arc<str>),
    Date32(i32),
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::Date32(v) => write!(f, "{}(date32)", v),
        }
    }
}

impl Value {
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(v) => *v,
            _ => panic!("value is not a bool: {}", self),
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            Value::Int32(v) => *v,
            _ => panic!("value is not an i32: {}", self),
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Int64(v) => *v,
            _ => panic!("value is not an i64: {}", self),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Float(v) => v.0,
            _ => panic!("value is not a float: {}", self),
        }
    }

    pub fn as_str(&self) -> Arc<str> {
        match self {
            Value::String(v) => v.clone(),
            _ => panic!("value is not a string: {}", self),
        }
    }
}

/// A scalar expression tree (join conditions, filter predicates, projection expressions,
/// sort keys). Predicates are opaque to the search engine itself; metadata providers
/// introspect them through `typ`, `children`, and `data`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PredNode<T: NodeType> {
    pub typ: T::PredType,
    pub children: Vec<ArcPredNode<T>>,
    pub data: Option<Value>,
}

impl<T: NodeType> Display for PredNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}", self.typ)?;
        for child in &self.children {
            write!(f, " {}", child)?;
        }
        if let Some(data) = &self.data {
            write!(f, " {}", data)?;
        }
        write!(f, ")")
    }
}

impl<T: NodeType> PredNode<T> {
    pub fn child(&self, idx: usize) -> ArcPredNode<T> {
        self.children[idx].clone()
    }

    pub fn unwrap_data(&self) -> Value {
        self.data.clone().unwrap()
    }
}

/// A child reference of an under-construction plan node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PlanNodeOrSubset<T: NodeType> {
    /// A concrete node that is not registered into the memo yet.
    PlanNode(ArcPlanNode<T>),
    /// A registered equivalence-class subset.
    Subset(SubsetId),
    /// A registered subset viewed under a required trait set. Resolved to
    /// `Memo::change_traits` when the referencing node is registered.
    Require(SubsetId, TraitSet<T>),
}

impl<T: NodeType> PlanNodeOrSubset<T> {
    pub fn unwrap_subset(&self) -> SubsetId {
        match self {
            PlanNodeOrSubset::Subset(subset) => *subset,
            PlanNodeOrSubset::Require(subset, _) => *subset,
            PlanNodeOrSubset::PlanNode(node) => {
                panic!("expected subset reference, found plan node: {}", node)
            }
        }
    }

    pub fn unwrap_plan_node(&self) -> ArcPlanNode<T> {
        match self {
            PlanNodeOrSubset::PlanNode(node) => node.clone(),
            _ => panic!("expected plan node, found subset reference"),
        }
    }
}

impl<T: NodeType> From<ArcPlanNode<T>> for PlanNodeOrSubset<T> {
    fn from(node: ArcPlanNode<T>) -> Self {
        PlanNodeOrSubset::PlanNode(node)
    }
}

impl<T: NodeType> From<SubsetId> for PlanNodeOrSubset<T> {
    fn from(subset: SubsetId) -> Self {
        PlanNodeOrSubset::Subset(subset)
    }
}

/// A relational operator node. Nodes are immutable once constructed; registration replaces
/// every child with the subset it maps to, so substituting a better member later never
/// requires rewriting parents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlanNode<T: NodeType> {
    pub typ: T,
    pub children: Vec<PlanNodeOrSubset<T>>,
    pub predicates: Vec<ArcPredNode<T>>,
    pub traits: TraitSet<T>,
}

impl<T: NodeType> Display for PlanNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}", self.typ)?;
        for child in &self.children {
            match child {
                PlanNodeOrSubset::PlanNode(node) => write!(f, " {}", node)?,
                PlanNodeOrSubset::Subset(subset) => write!(f, " {}", subset)?,
                PlanNodeOrSubset::Require(subset, traits) => {
                    write!(f, " {}@{{{}}}", subset, traits)?
                }
            }
        }
        for pred in &self.predicates {
            write!(f, " {}", pred)?;
        }
        write!(f, ")")
    }
}

impl<T: NodeType> PlanNode<T> {
    pub fn child(&self, idx: usize) -> PlanNodeOrSubset<T> {
        self.children[idx].clone()
    }

    /// Gets the idx-th child, assuming it is a materialized node rather than a subset.
    pub fn child_rel(&self, idx: usize) -> ArcPlanNode<T> {
        self.children[idx].unwrap_plan_node()
    }

    pub fn predicate(&self, idx: usize) -> ArcPredNode<T> {
        self.predicates[idx].clone()
    }
}
