// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::sync::Arc;

use crate::logical_property::{LogicalProperty, LogicalPropertyBuilder};
use crate::nodes::{
    ArcPlanNode, ArcPredNode, NodeType, PlanNode, PlanNodeOrSubset, PredNode, Value,
};
use crate::traits::{TraitAxis, TraitRegistry, TraitSet};
use crate::volcano::SubsetId;

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TestRelTyp {
    Join,
    Project,
    Scan,
    Filter,
    PhysicalNestedLoopJoin,
    PhysicalProject,
    PhysicalScan,
    PhysicalFilter,
    Converter,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TestPredTyp {
    List,
    Expr,
    TableName,
}

impl std::fmt::Display for TestRelTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::fmt::Display for TestPredTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TestMode {
    Logical,
    Physical,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TestTraitValue {
    Mode(TestMode),
}

impl std::fmt::Display for TestTraitValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestTraitValue::Mode(mode) => write!(f, "{:?}", mode),
        }
    }
}

impl NodeType for TestRelTyp {
    type PredType = TestPredTyp;
    type TraitValue = TestTraitValue;

    fn is_logical(&self) -> bool {
        matches!(
            self,
            Self::Join | Self::Project | Self::Scan | Self::Filter
        )
    }

    fn abstract_converter() -> Self {
        Self::Converter
    }
}

/// A single discrete axis: logical expressions carry `Logical`, implemented ones
/// `Physical`. There is no enforcer; only rules can cross the axis.
pub(crate) struct ModeAxis;

impl TraitAxis<TestRelTyp> for ModeAxis {
    fn name(&self) -> &'static str {
        "mode"
    }

    fn default_value(&self) -> TestTraitValue {
        TestTraitValue::Mode(TestMode::Logical)
    }

    fn satisfies(&self, derived: &TestTraitValue, required: &TestTraitValue) -> bool {
        derived == required
    }

    fn enforce(
        &self,
        _child: PlanNodeOrSubset<TestRelTyp>,
        _required: &TestTraitValue,
        _out_traits: TraitSet<TestRelTyp>,
    ) -> Option<ArcPlanNode<TestRelTyp>> {
        None
    }
}

pub(crate) fn registry() -> TraitRegistry<TestRelTyp> {
    let mut registry = TraitRegistry::new();
    registry.add_axis(Box::new(ModeAxis));
    registry
}

pub(crate) fn logical_traits() -> TraitSet<TestRelTyp> {
    TraitSet::new(vec![TestTraitValue::Mode(TestMode::Logical)])
}

pub(crate) fn physical_traits() -> TraitSet<TestRelTyp> {
    TraitSet::new(vec![TestTraitValue::Mode(TestMode::Physical)])
}

pub(crate) fn join(
    left: impl Into<PlanNodeOrSubset<TestRelTyp>>,
    right: impl Into<PlanNodeOrSubset<TestRelTyp>>,
    cond: ArcPredNode<TestRelTyp>,
) -> ArcPlanNode<TestRelTyp> {
    Arc::new(PlanNode {
        typ: TestRelTyp::Join,
        children: vec![left.into(), right.into()],
        predicates: vec![cond],
        traits: logical_traits(),
    })
}

pub(crate) fn project(
    input: impl Into<PlanNodeOrSubset<TestRelTyp>>,
    exprs: ArcPredNode<TestRelTyp>,
) -> ArcPlanNode<TestRelTyp> {
    Arc::new(PlanNode {
        typ: TestRelTyp::Project,
        children: vec![input.into()],
        predicates: vec![exprs],
        traits: logical_traits(),
    })
}

pub(crate) fn scan(table: &str) -> ArcPlanNode<TestRelTyp> {
    Arc::new(PlanNode {
        typ: TestRelTyp::Scan,
        children: vec![],
        predicates: vec![table_name(table)],
        traits: logical_traits(),
    })
}

#[allow(dead_code)]
pub(crate) fn physical_scan(table: &str) -> ArcPlanNode<TestRelTyp> {
    Arc::new(PlanNode {
        typ: TestRelTyp::PhysicalScan,
        children: vec![],
        predicates: vec![table_name(table)],
        traits: physical_traits(),
    })
}

#[allow(dead_code)]
pub(crate) fn physical_project(
    input: impl Into<PlanNodeOrSubset<TestRelTyp>>,
    exprs: ArcPredNode<TestRelTyp>,
) -> ArcPlanNode<TestRelTyp> {
    Arc::new(PlanNode {
        typ: TestRelTyp::PhysicalProject,
        children: vec![input.into()],
        predicates: vec![exprs],
        traits: physical_traits(),
    })
}

pub(crate) fn table_name(table: &str) -> ArcPredNode<TestRelTyp> {
    Arc::new(PredNode {
        typ: TestPredTyp::TableName,
        children: vec![],
        data: Some(Value::String(table.to_string().into())),
    })
}

pub(crate) fn list(items: Vec<ArcPredNode<TestRelTyp>>) -> ArcPredNode<TestRelTyp> {
    Arc::new(PredNode {
        typ: TestPredTyp::List,
        children: items,
        data: None,
    })
}

pub(crate) fn expr(data: Value) -> ArcPredNode<TestRelTyp> {
    Arc::new(PredNode {
        typ: TestPredTyp::Expr,
        children: vec![],
        data: Some(data),
    })
}

pub(crate) fn subset_ref(subset: SubsetId) -> PlanNodeOrSubset<TestRelTyp> {
    PlanNodeOrSubset::Subset(subset)
}

#[derive(Clone, Debug)]
pub(crate) struct TestProp(pub Vec<String>);

impl LogicalProperty for TestProp {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) struct TestPropertyBuilder;

impl LogicalPropertyBuilder<TestRelTyp> for TestPropertyBuilder {
    type Prop = TestProp;

    fn derive(
        &self,
        typ: TestRelTyp,
        predicates: &[ArcPredNode<TestRelTyp>],
        children: &[&TestProp],
    ) -> TestProp {
        match typ {
            TestRelTyp::Scan => TestProp(vec!["scan_col".to_string()]),
            TestRelTyp::Project => TestProp(
                predicates[0]
                    .children
                    .iter()
                    .map(|item| item.unwrap_data().to_string())
                    .collect(),
            ),
            TestRelTyp::Join => {
                let mut columns = children[0].0.clone();
                columns.extend(children[1].0.clone());
                TestProp(columns)
            }
            _ => TestProp(children.iter().flat_map(|child| child.0.clone()).collect()),
        }
    }

    fn property_name(&self) -> &'static str {
        "test"
    }
}
