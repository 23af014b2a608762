// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Logical properties are derived once per equivalence set (every member produces the same
//! rows, so they share e.g. a row type). Builders run when a set is created.

use std::any::Any;
use std::fmt::Debug;

use crate::nodes::{ArcPredNode, NodeType};

pub trait LogicalProperty: 'static + Any + Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub trait LogicalPropertyBuilderAny<T: NodeType>: 'static + Send + Sync {
    fn derive_any(
        &self,
        typ: T,
        predicates: &[ArcPredNode<T>],
        children: &[&dyn LogicalProperty],
    ) -> Box<dyn LogicalProperty>;
    fn display(&self, prop: &dyn LogicalProperty) -> String;
    fn property_name(&self) -> &'static str;
}

pub trait LogicalPropertyBuilder<T: NodeType>: 'static + Send + Sync + Sized {
    type Prop: LogicalProperty + Sized + Clone;

    fn derive(&self, typ: T, predicates: &[ArcPredNode<T>], children: &[&Self::Prop])
        -> Self::Prop;

    fn property_name(&self) -> &'static str;
}

impl<T: NodeType, P: LogicalPropertyBuilder<T>> LogicalPropertyBuilderAny<T> for P {
    fn derive_any(
        &self,
        typ: T,
        predicates: &[ArcPredNode<T>],
        children: &[&dyn LogicalProperty],
    ) -> Box<dyn LogicalProperty> {
        let children: Vec<&P::Prop> = children
            .iter()
            .map(|child| {
                child
                    .as_any()
                    .downcast_ref::<P::Prop>()
                    .expect("failed to downcast child property")
            })
            .collect();
        Box::new(self.derive(typ, predicates, &children))
    }

    fn display(&self, prop: &dyn LogicalProperty) -> String {
        let prop = prop
            .as_any()
            .downcast_ref::<P::Prop>()
            .expect("failed to downcast property");
        format!("{:?}", prop)
    }

    fn property_name(&self) -> &'static str {
        LogicalPropertyBuilder::property_name(self)
    }
}
