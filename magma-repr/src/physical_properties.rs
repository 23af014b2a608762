// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The two built-in trait axes: calling convention and collation.

use magma_core::nodes::{ArcPlanNode, PlanNodeOrSubset};
use magma_core::traits::{TraitAxis, TraitRegistry, TraitSet};

use crate::plan_nodes::{
    no_fetch, no_offset, ColumnRefPred, Direction, ListPred, NullOrder, PhysicalSort,
    RelNodeType, RelReprNode, RelReprPred, SortOrderPred,
};

/// Axis positions in every trait set, fixed by `default_trait_registry`.
pub const CONVENTION_AXIS: usize = 0;
pub const COLLATION_AXIS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Convention {
    /// Purely logical; satisfies nothing physical and cannot be executed.
    None,
    Physical,
}

impl std::fmt::Display for Convention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Convention::None => write!(f, "NONE"),
            Convention::Physical => write!(f, "PHYSICAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldCollation {
    pub column: usize,
    pub direction: Direction,
    pub null_order: NullOrder,
}

impl std::fmt::Display for FieldCollation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.column, self.direction, self.null_order)
    }
}

/// An ordered list of field collations. The empty collation means "no order".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Collation(pub Vec<FieldCollation>);

impl Collation {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A derived collation satisfies a required one when the requirement is a prefix.
    pub fn satisfies(&self, required: &Collation) -> bool {
        required.0.len() <= self.0.len()
            && required.0.iter().zip(self.0.iter()).all(|(r, d)| r == d)
    }
}

impl std::fmt::Display for Collation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (idx, field) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelTraitValue {
    Convention(Convention),
    Collation(Collation),
}

impl RelTraitValue {
    pub fn as_convention(&self) -> Convention {
        match self {
            RelTraitValue::Convention(convention) => *convention,
            other => panic!("trait value is not a convention: {}", other),
        }
    }

    pub fn as_collation(&self) -> &Collation {
        match self {
            RelTraitValue::Collation(collation) => collation,
            other => panic!("trait value is not a collation: {}", other),
        }
    }
}

impl std::fmt::Display for RelTraitValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelTraitValue::Convention(convention) => write!(f, "{}", convention),
            RelTraitValue::Collation(collation) => write!(f, "{}", collation),
        }
    }
}

pub struct ConventionAxis;

impl TraitAxis<RelNodeType> for ConventionAxis {
    fn name(&self) -> &'static str {
        "convention"
    }

    fn default_value(&self) -> RelTraitValue {
        RelTraitValue::Convention(Convention::None)
    }

    fn satisfies(&self, derived: &RelTraitValue, required: &RelTraitValue) -> bool {
        derived.as_convention() == required.as_convention()
    }

    /// Conventions have no enforcer; implementation rules are the only way across.
    fn enforce(
        &self,
        _child: PlanNodeOrSubset<RelNodeType>,
        _required: &RelTraitValue,
        _out_traits: TraitSet<RelNodeType>,
    ) -> Option<ArcPlanNode<RelNodeType>> {
        None
    }
}

pub struct CollationAxis;

impl TraitAxis<RelNodeType> for CollationAxis {
    fn name(&self) -> &'static str {
        "collation"
    }

    fn default_value(&self) -> RelTraitValue {
        RelTraitValue::Collation(Collation::empty())
    }

    fn satisfies(&self, derived: &RelTraitValue, required: &RelTraitValue) -> bool {
        derived.as_collation().satisfies(required.as_collation())
    }

    fn enforce(
        &self,
        child: PlanNodeOrSubset<RelNodeType>,
        required: &RelTraitValue,
        out_traits: TraitSet<RelNodeType>,
    ) -> Option<ArcPlanNode<RelNodeType>> {
        let collation = required.as_collation();
        if collation.is_empty() {
            return None;
        }
        let keys = ListPred::new(
            collation
                .0
                .iter()
                .map(|field| {
                    SortOrderPred::new(
                        field.direction,
                        field.null_order,
                        ColumnRefPred::new(field.column).into_pred_node(),
                    )
                    .into_pred_node()
                })
                .collect(),
        );
        Some(PhysicalSort::new(child, keys, no_offset(), no_fetch(), out_traits).into_plan_node())
    }
}

pub fn default_trait_registry() -> TraitRegistry<RelNodeType> {
    let mut registry = TraitRegistry::new();
    registry.add_axis(Box::new(ConventionAxis));
    registry.add_axis(Box::new(CollationAxis));
    registry
}

/// The trait set of freshly built logical nodes.
pub fn logical_traits() -> TraitSet<RelNodeType> {
    TraitSet::new(vec![
        RelTraitValue::Convention(Convention::None),
        RelTraitValue::Collation(Collation::empty()),
    ])
}

/// A physical trait set carrying the given collation.
pub fn physical_traits(collation: Collation) -> TraitSet<RelNodeType> {
    TraitSet::new(vec![
        RelTraitValue::Convention(Convention::Physical),
        RelTraitValue::Collation(collation),
    ])
}

/// Physical convention with no collation requirement.
pub fn physical_any() -> TraitSet<RelNodeType> {
    physical_traits(Collation::empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(column: usize) -> FieldCollation {
        FieldCollation {
            column,
            direction: Direction::Asc,
            null_order: NullOrder::NullsFirst,
        }
    }

    #[test]
    fn collation_prefix_satisfies() {
        let long = Collation(vec![field(0), field(1)]);
        let short = Collation(vec![field(0)]);
        assert!(long.satisfies(&short));
        assert!(long.satisfies(&Collation::empty()));
        assert!(!short.satisfies(&long));
        assert!(!short.satisfies(&Collation(vec![field(1)])));
    }

    #[test]
    fn convention_satisfies_is_equality() {
        let axis = ConventionAxis;
        let none = RelTraitValue::Convention(Convention::None);
        let physical = RelTraitValue::Convention(Convention::Physical);
        assert!(axis.satisfies(&none, &none));
        assert!(axis.satisfies(&physical, &physical));
        assert!(!axis.satisfies(&none, &physical));
        assert!(!axis.satisfies(&physical, &none));
    }

    #[test]
    fn collation_axis_enforces_with_sort() {
        use magma_core::volcano::SubsetId;
        let axis = CollationAxis;
        let required = RelTraitValue::Collation(Collation(vec![field(0)]));
        let out = physical_traits(Collation(vec![field(0)]));
        let node = axis
            .enforce(
                PlanNodeOrSubset::Subset(SubsetId::default()),
                &required,
                out.clone(),
            )
            .unwrap();
        assert_eq!(node.typ, RelNodeType::PhysicalSort);
        assert_eq!(node.traits, out);
    }
}
