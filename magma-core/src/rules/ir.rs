// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::mem::Discriminant;

use crate::nodes::NodeType;

/// The interpreted operand pattern of a rule. The root must be a `MatchNode` or
/// `MatchDiscriminant`; child operands either descend further or terminate with a subset
/// reference.
pub enum RuleMatcher<T: NodeType> {
    /// Match a node of exactly type `typ`.
    MatchNode { typ: T, children: Vec<Self> },
    /// Match any node whose variant has the given discriminant (ignoring variant payload,
    /// e.g. all join types at once).
    MatchDiscriminant {
        typ_discriminant: Discriminant<T>,
        children: Vec<Self>,
    },
    /// Bind one child as a subset reference without descending.
    Any,
    /// Bind all remaining children as subset references.
    AnyMany,
}

impl<T: NodeType> RuleMatcher<T> {
    /// Whether the root operand matches the given operator variant.
    pub fn matches_root(&self, typ: &T) -> bool {
        match self {
            RuleMatcher::MatchNode { typ: t, .. } => t == typ,
            RuleMatcher::MatchDiscriminant {
                typ_discriminant, ..
            } => *typ_discriminant == std::mem::discriminant(typ),
            _ => panic!("rule pattern must have a match node at the root"),
        }
    }

    pub(crate) fn root_discriminant(&self) -> Discriminant<T> {
        match self {
            RuleMatcher::MatchNode { typ, .. } => std::mem::discriminant(typ),
            RuleMatcher::MatchDiscriminant {
                typ_discriminant, ..
            } => *typ_discriminant,
            _ => panic!("rule pattern must have a match node at the root"),
        }
    }

    /// Whether any child operand descends into child subsets. Patterns that do are
    /// re-enqueued on their parents when new expressions appear below them.
    pub(crate) fn has_nested_matchers(&self) -> bool {
        match self {
            RuleMatcher::MatchNode { children, .. }
            | RuleMatcher::MatchDiscriminant { children, .. } => children.iter().any(|child| {
                matches!(
                    child,
                    RuleMatcher::MatchNode { .. } | RuleMatcher::MatchDiscriminant { .. }
                )
            }),
            _ => false,
        }
    }
}
