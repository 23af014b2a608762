// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Textual plan rendering for tracing and debugging.

use pretty_xmlish::{Pretty, PrettyConfig};

use crate::plan_nodes::{ArcRelPlanNode, RelPlanNodeOrSubset};
use magma_core::nodes::PlanNodeOrSubset;

pub fn explain(node: &ArcRelPlanNode) -> Pretty<'static> {
    let mut fields: Vec<(&'static str, Pretty<'static>)> = Vec::new();
    fields.push(("traits", node.traits.to_string().into()));
    if !node.predicates.is_empty() {
        fields.push((
            "predicates",
            Pretty::Array(
                node.predicates
                    .iter()
                    .map(|pred| pred.to_string().into())
                    .collect(),
            ),
        ));
    }
    let children = node.children.iter().map(explain_child).collect();
    Pretty::simple_record(node.typ.to_string(), fields, children)
}

fn explain_child(child: &RelPlanNodeOrSubset) -> Pretty<'static> {
    match child {
        PlanNodeOrSubset::PlanNode(node) => explain(node),
        PlanNodeOrSubset::Subset(subset) => subset.to_string().into(),
        PlanNodeOrSubset::Require(subset, traits) => {
            format!("{}@{{{}}}", subset, traits).into()
        }
    }
}

pub fn explain_to_string(node: &ArcRelPlanNode) -> String {
    let mut config = PrettyConfig {
        need_boundaries: false,
        reduced_spaces: false,
        width: 300,
        ..Default::default()
    };
    let mut out = String::new();
    config.unicode(&mut out, &explain(node));
    out
}
