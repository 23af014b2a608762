// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

/// Defines a typed wrapper over one plan-node variant: a constructor taking children,
/// typed predicates, the optional variant payload, and the node's trait set, plus typed
/// accessors mirroring the child/predicate layout.
macro_rules! define_plan_node {
    (
        $struct_name:ident,
        $variant:ident,
        [ $({ $child_id:literal, $child_name:ident }),* ],
        [ $({ $pred_id:literal, $pred_name:ident : $pred_typ:ty }),* ]
        $(, { $inner_name:ident : $inner_typ:ty })?
    ) => {
        #[derive(Clone, Debug)]
        pub struct $struct_name(pub crate::plan_nodes::ArcRelPlanNode);

        impl crate::plan_nodes::RelReprNode for $struct_name {
            fn into_plan_node(self) -> crate::plan_nodes::ArcRelPlanNode {
                self.0
            }

            fn from_plan_node(node: crate::plan_nodes::ArcRelPlanNode) -> Option<Self> {
                #[allow(unused_variables)]
                if let crate::plan_nodes::RelNodeType::$variant $( ($inner_name) )? = node.typ {
                    Some(Self(node))
                } else {
                    None
                }
            }
        }

        impl $struct_name {
            pub fn new(
                $( $child_name: impl Into<crate::plan_nodes::RelPlanNodeOrSubset>, )*
                $( $pred_name: $pred_typ, )*
                $( $inner_name: $inner_typ, )?
                traits: magma_core::traits::TraitSet<crate::plan_nodes::RelNodeType>,
            ) -> $struct_name {
                $struct_name(std::sync::Arc::new(magma_core::nodes::PlanNode {
                    typ: crate::plan_nodes::RelNodeType::$variant $( ($inner_name) )?,
                    children: vec![ $( $child_name.into() ),* ],
                    predicates: vec![
                        $( crate::plan_nodes::RelReprPred::into_pred_node($pred_name) ),*
                    ],
                    traits,
                }))
            }

            $(
                pub fn $child_name(&self) -> crate::plan_nodes::RelPlanNodeOrSubset {
                    self.0.child($child_id)
                }
            )*

            $(
                pub fn $pred_name(&self) -> $pred_typ {
                    <$pred_typ as crate::plan_nodes::RelReprPred>::from_pred_node(
                        self.0.predicate($pred_id),
                    )
                    .unwrap()
                }
            )*

            $(
                pub fn $inner_name(&self) -> $inner_typ {
                    if let crate::plan_nodes::RelNodeType::$variant(value) = self.0.typ {
                        value
                    } else {
                        unreachable!()
                    }
                }
            )?
        }
    };
}

pub(crate) use define_plan_node;
