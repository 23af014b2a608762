// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::sync::Arc;

use magma_core::logical_property::{LogicalProperty, LogicalPropertyBuilder};
use magma_core::metadata::ColumnSet;
use serde::{Deserialize, Serialize};

use crate::physical_properties::Collation;
use crate::plan_nodes::{
    ColumnRefPred, ConstantPred, ConstantType, FuncPred, FuncType, JoinType, ListPred,
    RelNodeType, RelPredType, RelReprPred,
};
use crate::plan_nodes::ArcRelPredNode;

pub const DEFAULT_NAME: &str = "unnamed";

/// The logical property every set carries: index 0 in the session's builder list.
pub const SCHEMA_PROP_IDX: usize = 0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub typ: ConstantType,
    pub nullable: bool,
}

impl Field {
    /// Generate a field that is only a placeholder whose members are never used.
    fn placeholder() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            typ: ConstantType::Utf8,
            nullable: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogicalProperty for Schema {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// The narrow lookup contract the optimizer assumes of the outside world: row types plus
/// the per-table statistics scans surface through metadata.
pub trait Catalog: Send + Sync + 'static {
    fn get(&self, name: &str) -> Schema;

    fn row_count(&self, _name: &str) -> Option<f64> {
        None
    }

    fn unique_keys(&self, _name: &str) -> Vec<ColumnSet> {
        Vec::new()
    }

    fn collation(&self, _name: &str) -> Collation {
        Collation::empty()
    }
}

pub struct SchemaPropertyBuilder {
    catalog: Arc<dyn Catalog>,
}

impl SchemaPropertyBuilder {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    fn derive_for_projection(exprs: &ListPred, child: &Schema) -> Schema {
        let fields = exprs
            .to_vec()
            .into_iter()
            .map(|expr| match &expr.typ {
                RelPredType::ColumnRef => {
                    let column = ColumnRefPred::from_pred_node(expr).unwrap().column();
                    child.fields[column].clone()
                }
                RelPredType::Constant(typ) => Field {
                    name: DEFAULT_NAME.to_string(),
                    typ: *typ,
                    nullable: false,
                },
                _ => Field::placeholder(),
            })
            .collect();
        Schema { fields }
    }

    fn derive_for_agg(group_keys: &ListPred, aggs: &ListPred, child: &Schema) -> Schema {
        let mut fields: Vec<Field> = group_keys
            .to_vec()
            .into_iter()
            .map(|key| {
                let column = ColumnRefPred::from_pred_node(key).unwrap().column();
                child.fields[column].clone()
            })
            .collect();
        for agg in aggs.to_vec() {
            let agg = FuncPred::from_pred_node(agg).unwrap();
            let typ = match agg.func() {
                FuncType::Count => ConstantType::Int64,
                FuncType::Avg => ConstantType::Float64,
                _ => agg
                    .args()
                    .first()
                    .and_then(|arg| ColumnRefPred::from_pred_node(arg.clone()))
                    .map(|column| child.fields[column.column()].typ)
                    .unwrap_or(ConstantType::Float64),
            };
            fields.push(Field {
                name: DEFAULT_NAME.to_string(),
                typ,
                nullable: true,
            });
        }
        Schema { fields }
    }

    fn derive_for_values(rows: &ListPred) -> Schema {
        let Some(first) = rows.to_vec().first().cloned() else {
            return Schema { fields: vec![] };
        };
        let first = ListPred::from_pred_node(first).unwrap();
        let fields = first
            .to_vec()
            .into_iter()
            .map(|value| {
                let constant = ConstantPred::from_pred_node(value).unwrap();
                Field {
                    name: DEFAULT_NAME.to_string(),
                    typ: constant.constant_type(),
                    nullable: false,
                }
            })
            .collect();
        Schema { fields }
    }
}

impl LogicalPropertyBuilder<RelNodeType> for SchemaPropertyBuilder {
    type Prop = Schema;

    fn derive(
        &self,
        typ: RelNodeType,
        predicates: &[ArcRelPredNode],
        children: &[&Schema],
    ) -> Schema {
        match typ {
            RelNodeType::Scan | RelNodeType::PhysicalScan => {
                let table = ConstantPred::from_pred_node(predicates[0].clone())
                    .unwrap()
                    .value()
                    .as_str();
                self.catalog.get(&table)
            }
            RelNodeType::Filter
            | RelNodeType::PhysicalFilter
            | RelNodeType::Sort
            | RelNodeType::PhysicalSort
            | RelNodeType::AbstractConverter => children[0].clone(),
            RelNodeType::Project | RelNodeType::PhysicalProject => {
                let exprs = ListPred::from_pred_node(predicates[0].clone()).unwrap();
                Self::derive_for_projection(&exprs, children[0])
            }
            RelNodeType::Join(join_type)
            | RelNodeType::PhysicalNestedLoopJoin(join_type)
            | RelNodeType::PhysicalHashJoin(join_type) => match join_type {
                JoinType::Inner | JoinType::LeftOuter | JoinType::RightOuter
                | JoinType::FullOuter => {
                    let mut schema = children[0].clone();
                    schema.fields.extend(children[1].fields.clone());
                    schema
                }
                JoinType::LeftSemi | JoinType::LeftAnti => children[0].clone(),
            },
            RelNodeType::Agg
            | RelNodeType::PhysicalStreamingAgg
            | RelNodeType::PhysicalHashAgg => {
                let group_keys = ListPred::from_pred_node(predicates[0].clone()).unwrap();
                let aggs = ListPred::from_pred_node(predicates[1].clone()).unwrap();
                Self::derive_for_agg(&group_keys, &aggs, children[0])
            }
            RelNodeType::Union
            | RelNodeType::Intersect
            | RelNodeType::Except
            | RelNodeType::PhysicalUnion
            | RelNodeType::PhysicalIntersect
            | RelNodeType::PhysicalExcept => children[0].clone(),
            RelNodeType::Values | RelNodeType::PhysicalValues => {
                let rows = ListPred::from_pred_node(predicates[0].clone()).unwrap();
                Self::derive_for_values(&rows)
            }
        }
    }

    fn property_name(&self) -> &'static str {
        "schema"
    }
}
