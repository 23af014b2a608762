// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Display;
use std::mem::Discriminant;
use std::sync::Arc;

use tracing::trace;

use super::conversion::ExpandConversionRule;
use super::matcher::match_and_pick_expr;
use super::memo::{Memo, MemoEvent, Winner, WinnerInfo};
use crate::cost::{Cost, CostModel};
use crate::error::OptimizeError;
use crate::listener::OptimizerListener;
use crate::logical_property::{LogicalPropertyBuilder, LogicalPropertyBuilderAny};
use crate::metadata::{MetadataCache, MetadataQuery, MetadataRegistry};
use crate::nodes::{ArcPlanNode, NodeType, PlanNode, PlanNodeOrSubset};
use crate::optimizer::{CancellationToken, Optimizer};
use crate::rules::Rule;
use crate::traits::{TraitRegistry, TraitSet};

pub type RuleId = usize;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct SetId(pub(super) usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct SubsetId(pub(super) usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct PredId(pub usize);

impl Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl Display for SubsetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "!{}", self.0)
    }
}

impl Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for PredId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Group id, expression id, and child group ids of the expression a cost model is asked
/// about.
#[derive(Clone, PartialEq, Eq, Debug, Default, Hash)]
pub struct RelNodeContext {
    pub subset_id: SubsetId,
    pub expr_id: ExprId,
    pub children: Vec<SubsetId>,
}

#[derive(Default, Clone, Debug)]
pub struct OptimizerContext {
    pub budget_used: bool,
    pub rules_applied: usize,
}

#[derive(Clone, Debug)]
pub struct OptimizerProperties {
    /// Upper bound on fires per rule; exceeded calls are skipped instead of fired.
    pub max_rule_fires: Option<usize>,
    pub panic_on_budget: bool,
    /// Keep firing after a rule error instead of aborting the session.
    pub continue_on_rule_error: bool,
    /// Fire calls even when a bound expression has importance zero.
    pub disable_pruning: bool,
}

impl Default for OptimizerProperties {
    fn default() -> Self {
        Self {
            max_rule_fires: Some(10_000),
            panic_on_budget: false,
            continue_on_rule_error: false,
            disable_pruning: false,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct RuleCall {
    rule_id: RuleId,
    expr_id: ExprId,
}

/// One optimization session: owns the memo, the rule queue, the trait axes, the metadata
/// handler table and cache, and the importance map. Sessions are single-threaded and share
/// no mutable state with each other.
pub struct VolcanoOptimizer<T: NodeType> {
    memo: Memo<T>,
    rules: Vec<(RuleId, Arc<dyn Rule<T, Self>>)>,
    rule_index: HashMap<Discriminant<T>, Vec<RuleId>>,
    next_rule_id: RuleId,
    expand_rule_id: RuleId,
    queue: VecDeque<RuleCall>,
    pending: HashSet<RuleCall>,
    fire_count: HashMap<RuleId, usize>,
    disabled_rules: HashSet<RuleId>,
    excluded: Option<Arc<dyn Fn(&'static str) -> bool + Send + Sync>>,
    importance: HashMap<ExprId, f64>,
    cost: Arc<dyn CostModel<T>>,
    registry: Arc<TraitRegistry<T>>,
    metadata_registry: Arc<MetadataRegistry<T>>,
    metadata_cache: RefCell<MetadataCache>,
    property_builders: Arc<[Box<dyn LogicalPropertyBuilderAny<T>>]>,
    listeners: Vec<Arc<dyn OptimizerListener<T>>>,
    pub ctx: OptimizerContext,
    pub prop: OptimizerProperties,
}

impl<T: NodeType> VolcanoOptimizer<T> {
    pub fn new(
        rules: Vec<Arc<dyn Rule<T, Self>>>,
        cost: Arc<dyn CostModel<T>>,
        registry: TraitRegistry<T>,
        metadata_registry: MetadataRegistry<T>,
        property_builders: Vec<Box<dyn LogicalPropertyBuilderAny<T>>>,
    ) -> Self {
        Self::new_with_prop(
            rules,
            cost,
            registry,
            metadata_registry,
            property_builders,
            Default::default(),
        )
    }

    pub fn new_with_prop(
        rules: Vec<Arc<dyn Rule<T, Self>>>,
        cost: Arc<dyn CostModel<T>>,
        registry: TraitRegistry<T>,
        metadata_registry: MetadataRegistry<T>,
        property_builders: Vec<Box<dyn LogicalPropertyBuilderAny<T>>>,
        prop: OptimizerProperties,
    ) -> Self {
        let registry = Arc::new(registry);
        let property_builders: Arc<[_]> = property_builders.into();
        let memo = Memo::new(registry.clone(), property_builders.clone());
        let mut this = Self {
            memo,
            rules: Vec::new(),
            rule_index: HashMap::new(),
            next_rule_id: 0,
            expand_rule_id: 0,
            queue: VecDeque::new(),
            pending: HashSet::new(),
            fire_count: HashMap::new(),
            disabled_rules: HashSet::new(),
            excluded: None,
            importance: HashMap::new(),
            cost,
            registry,
            metadata_registry: Arc::new(metadata_registry),
            metadata_cache: RefCell::new(MetadataCache::new()),
            property_builders,
            listeners: Vec::new(),
            ctx: OptimizerContext::default(),
            prop,
        };
        // the conversion expander is always installed; it is what turns trait requests into
        // enforcer operators
        this.expand_rule_id = this.add_rule(Arc::new(ExpandConversionRule::new()));
        for rule in rules {
            this.add_rule(rule);
        }
        this
    }

    pub fn add_rule(&mut self, rule: Arc<dyn Rule<T, Self>>) -> RuleId {
        let rule_id = self.next_rule_id;
        self.next_rule_id += 1;
        self.rule_index
            .entry(rule.matcher().root_discriminant())
            .or_default()
            .push(rule_id);
        self.rules.push((rule_id, rule));
        rule_id
    }

    pub fn remove_rule(&mut self, rule_id: RuleId) {
        if let Some(pos) = self.rules.iter().position(|(id, _)| *id == rule_id) {
            let (_, rule) = self.rules.remove(pos);
            if let Some(ids) = self.rule_index.get_mut(&rule.matcher().root_discriminant()) {
                ids.retain(|id| *id != rule_id);
            }
        }
    }

    /// Excludes rules by name: excluded rules stay registered but never fire.
    pub fn set_rule_excluded(
        &mut self,
        predicate: impl Fn(&'static str) -> bool + Send + Sync + 'static,
    ) {
        self.excluded = Some(Arc::new(predicate));
    }

    pub fn disable_rule(&mut self, rule_id: RuleId) {
        self.disabled_rules.insert(rule_id);
    }

    pub fn enable_rule(&mut self, rule_id: RuleId) {
        self.disabled_rules.remove(&rule_id);
    }

    pub fn is_rule_disabled(&self, rule_id: RuleId) -> bool {
        self.disabled_rules.contains(&rule_id)
    }

    pub fn add_listener(&mut self, listener: Arc<dyn OptimizerListener<T>>) {
        self.listeners.push(listener);
    }

    /// Importance is a heuristic scalar >= 0 per expression; rule calls binding an
    /// expression at zero importance are skipped unless pruning is disabled.
    pub fn set_importance(&mut self, expr_id: ExprId, importance: f64) {
        assert!(importance >= 0.0, "importance must be non-negative");
        self.importance.insert(expr_id, importance);
    }

    pub fn importance(&self, expr_id: ExprId) -> f64 {
        self.importance.get(&expr_id).copied().unwrap_or(1.0)
    }

    pub fn memo(&self) -> &Memo<T> {
        &self.memo
    }

    /// Registers an expression outside an `optimize` call; match enumeration and cost
    /// derivation run as usual. Useful for issuing metadata queries over a standalone tree.
    pub fn add_new_expr(&mut self, node: ArcPlanNode<T>) -> (SubsetId, ExprId) {
        let result = self.memo.add_new_expr(node);
        self.drain_memo_events();
        result
    }

    pub fn cost(&self) -> Arc<dyn CostModel<T>> {
        self.cost.clone()
    }

    fn rule(&self, rule_id: RuleId) -> Option<Arc<dyn Rule<T, Self>>> {
        self.rules
            .iter()
            .find(|(id, _)| *id == rule_id)
            .map(|(_, rule)| rule.clone())
    }

    pub fn dump(&self) {
        for set_id in self.memo.all_set_ids() {
            println!("set {}", set_id);
            for (idx, builder) in self.property_builders.iter().enumerate() {
                println!(
                    "  {}={}",
                    builder.property_name(),
                    builder.display(self.memo.set(set_id).properties()[idx].as_ref())
                );
            }
            for subset_id in self.memo.subsets_of_set(set_id) {
                let subset = self.memo.subset(subset_id);
                let winner = match &self.memo.subset_info(subset_id).winner {
                    Winner::Unknown => "winner=<unknown>".to_string(),
                    Winner::Impossible => "winner=<impossible>".to_string(),
                    Winner::Full(info) => format!(
                        "winner={} cost={}",
                        info.expr_id,
                        self.cost.explain_cost(&info.total_cost)
                    ),
                };
                println!("  subset {} {{{}}} {}", subset_id, subset.traits(), winner);
            }
            for expr_id in self.memo.exprs_in_set(set_id) {
                println!(
                    "  expr_id={} | {}",
                    expr_id,
                    self.memo.get_expr_memoed(expr_id)
                );
            }
        }
    }

    fn optimize_inner(
        &mut self,
        root: ArcPlanNode<T>,
        required: TraitSet<T>,
        cancel: &CancellationToken,
    ) -> Result<(ArcPlanNode<T>, Cost), OptimizeError> {
        let (root_subset, root_expr) = self.memo.add_new_expr(root);
        trace!(event = "optimize_begin", root_subset = %root_subset, root_expr = %root_expr, required = %required);
        let target = self.memo.change_traits(root_subset, &required);
        self.drain_memo_events();
        let cancelled = self.fire_rules(cancel)?;
        let target = self.memo.reduce_subset(target);
        match self.extract(target) {
            Ok((plan, cost)) => {
                trace!(event = "optimize_finish", target = %target, cost = %cost);
                Ok((plan, cost))
            }
            Err(_) if cancelled => Err(OptimizeError::Cancelled),
            Err(err) => {
                if cfg!(debug_assertions) {
                    self.dump();
                }
                Err(err)
            }
        }
    }

    fn extract(&self, target: SubsetId) -> Result<(ArcPlanNode<T>, Cost), OptimizeError> {
        let plan = self.memo.best_winner_binding(target, &mut |_, _, _| {})?;
        let cost = self
            .memo
            .subset_info(target)
            .winner
            .as_full_winner()
            .expect("extraction without a winner")
            .total_cost
            .clone();
        Ok((plan, cost))
    }

    /// FIFO firing loop. Returns whether the session was cancelled.
    fn fire_rules(&mut self, cancel: &CancellationToken) -> Result<bool, OptimizeError> {
        while let Some(call) = self.queue.pop_front() {
            self.pending.remove(&call);
            if cancel.is_cancelled() {
                trace!(event = "cancelled", remaining_calls = self.queue.len());
                self.queue.clear();
                self.pending.clear();
                return Ok(true);
            }
            self.fire_one(call)?;
        }
        Ok(false)
    }

    fn fire_one(&mut self, call: RuleCall) -> Result<(), OptimizeError> {
        let Some(rule) = self.rule(call.rule_id) else {
            return Ok(());
        };
        if self.memo.is_expr_obsolete(call.expr_id) {
            trace!(event = "call_skip", reason = "obsolete", expr_id = %call.expr_id);
            return Ok(());
        }
        if self.disabled_rules.contains(&call.rule_id) {
            return Ok(());
        }
        if let Some(excluded) = &self.excluded {
            if excluded(rule.name()) {
                return Ok(());
            }
        }
        if !self.prop.disable_pruning && self.importance(call.expr_id) == 0.0 {
            trace!(event = "call_skip", reason = "zero_importance", expr_id = %call.expr_id);
            return Ok(());
        }
        if let Some(budget) = self.prop.max_rule_fires {
            if self.fire_count.get(&call.rule_id).copied().unwrap_or(0) >= budget {
                if !self.ctx.budget_used {
                    self.ctx.budget_used = true;
                    if self.prop.panic_on_budget {
                        panic!("rule fire budget used for rule {}", rule.name());
                    }
                }
                trace!(event = "call_skip", reason = "budget", rule = %rule.name());
                return Ok(());
            }
        }
        for listener in &self.listeners {
            listener.rule_attempted(rule.name(), call.expr_id);
        }
        let bindings = match_and_pick_expr(rule.matcher(), call.expr_id, self);
        if bindings.is_empty() {
            return Ok(());
        }
        *self.fire_count.entry(call.rule_id).or_insert(0) += 1;
        self.ctx.rules_applied += 1;
        trace!(event = "fire_rule", rule = %rule.name(), expr_id = %call.expr_id, bindings = bindings.len());
        let mut products = Vec::new();
        for binding in bindings {
            if !rule.matches(self, &binding) {
                continue;
            }
            match rule.apply(self, binding) {
                Ok(mut result) => products.append(&mut result),
                Err(err) => {
                    if self.prop.continue_on_rule_error {
                        tracing::warn!(rule = %rule.name(), error = %err, "rule failed, continuing");
                        continue;
                    }
                    return Err(OptimizeError::Rule {
                        rule: rule.name(),
                        source: err,
                    });
                }
            }
        }
        // registrations are staged after every apply succeeded, so a failing rule leaves the
        // memo untouched
        let orig_set = self.memo.set_of_expr(call.expr_id);
        let orig_traits = self.memo.get_expr_memoed(call.expr_id).traits.clone();
        let mut produced_any = false;
        for product in products {
            match product {
                PlanNodeOrSubset::PlanNode(node) => {
                    let node = self.propagate_traits(node, &orig_traits);
                    let probe = self.memo.get_subset(&node);
                    if let Some(expr_id) =
                        self.memo.add_expr_to_set(PlanNodeOrSubset::PlanNode(node), orig_set)
                    {
                        produced_any = true;
                        match probe {
                            Some(subset) => {
                                for listener in &self.listeners {
                                    listener.rel_equivalence_found(expr_id, subset);
                                }
                            }
                            None => {
                                for listener in &self.listeners {
                                    listener.rule_production(rule.name(), call.expr_id, expr_id);
                                }
                            }
                        }
                    }
                }
                product => {
                    self.memo.add_expr_to_set(product, orig_set);
                    produced_any = true;
                }
            }
        }
        if call.rule_id == self.expand_rule_id && !produced_any {
            // inexpandable converter: prune its subset from contention until the set grows
            let subset = self.memo.subset_of_expr(call.expr_id);
            if matches!(self.memo.subset_info(subset).winner, Winner::Unknown) {
                self.memo.update_subset_winner(subset, Winner::Impossible);
            }
            for listener in &self.listeners {
                listener.rel_discarded(call.expr_id);
            }
        }
        self.drain_memo_events();
        Ok(())
    }

    /// Trait propagation from the original root: axes the product left at their default
    /// inherit the original expression's value.
    fn propagate_traits(
        &self,
        node: ArcPlanNode<T>,
        orig_traits: &TraitSet<T>,
    ) -> ArcPlanNode<T> {
        let propagated = self.registry.propagate(&node.traits, orig_traits);
        if propagated == node.traits {
            node
        } else {
            Arc::new(PlanNode {
                typ: node.typ.clone(),
                children: node.children.clone(),
                predicates: node.predicates.clone(),
                traits: propagated,
            })
        }
    }

    fn drain_memo_events(&mut self) {
        loop {
            let events = self.memo.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                match event {
                    MemoEvent::NewExpr(expr_id) => {
                        self.importance.entry(expr_id).or_insert(1.0);
                        self.enqueue_matches(expr_id, true);
                        self.derive_cost_and_relax(expr_id);
                    }
                    MemoEvent::ReparentedExpr(expr_id) => {
                        self.enqueue_matches(expr_id, false);
                        self.derive_cost_and_relax(expr_id);
                    }
                    MemoEvent::NewSubset(subset_id) => {
                        // offer the set's existing satisfying members to the new subset
                        for member in self.memo.members_satisfying(subset_id) {
                            self.derive_cost_and_relax(member);
                        }
                    }
                }
            }
        }
    }

    fn push_call(&mut self, rule_id: RuleId, expr_id: ExprId) {
        let call = RuleCall { rule_id, expr_id };
        if self.pending.insert(call) {
            self.queue.push_back(call);
        }
    }

    /// Event-driven match enumeration: root matches for the expression itself, and for new
    /// expressions an upward re-match of parents with nested patterns plus a re-fire of the
    /// set's abstract converters.
    fn enqueue_matches(&mut self, expr_id: ExprId, is_new: bool) {
        let typ = self.memo.get_expr_memoed(expr_id).typ.clone();
        let discriminant = std::mem::discriminant(&typ);
        if let Some(rule_ids) = self.rule_index.get(&discriminant) {
            for rule_id in rule_ids.clone() {
                self.push_call(rule_id, expr_id);
            }
        }
        if !is_new {
            return;
        }
        let set_id = self.memo.set_of_expr(expr_id);
        let mut parent_calls = Vec::new();
        for subset_id in self.memo.subsets_of_set(set_id) {
            for parent in self.memo.parents_of(subset_id) {
                let parent_typ = self.memo.get_expr_memoed(parent).typ.clone();
                if let Some(rule_ids) = self.rule_index.get(&std::mem::discriminant(&parent_typ))
                {
                    for &rule_id in rule_ids {
                        let nested = self
                            .rule(rule_id)
                            .map(|rule| rule.matcher().has_nested_matchers())
                            .unwrap_or(false);
                        if nested {
                            parent_calls.push((rule_id, parent));
                        }
                    }
                }
            }
        }
        for (rule_id, parent) in parent_calls {
            self.push_call(rule_id, parent);
        }
        let converter = std::mem::discriminant(&T::abstract_converter());
        let mut converter_calls = Vec::new();
        for member in self.memo.exprs_in_set(set_id) {
            if member != expr_id
                && std::mem::discriminant(&self.memo.get_expr_memoed(member).typ) == converter
            {
                converter_calls.push(member);
            }
        }
        for member in converter_calls {
            self.push_call(self.expand_rule_id, member);
        }
    }

    /// Shortest-path relaxation of subset winners. Whenever an expression's children all
    /// have winners, its cumulative cost (self-cost plus child best costs) is offered to
    /// every subset of its set that its trait set satisfies; improvements cascade to parent
    /// expressions.
    fn derive_cost_and_relax(&mut self, expr_id: ExprId) {
        let converter = std::mem::discriminant(&T::abstract_converter());
        let mut work = vec![expr_id];
        while let Some(expr_id) = work.pop() {
            let expr_id = self.memo.reduce_expr(expr_id);
            let expr = self.memo.get_expr_memoed(expr_id);
            if std::mem::discriminant(&expr.typ) == converter {
                continue;
            }
            let mut inputs_cost = Cost::zero();
            let mut all_known = true;
            for child in &expr.children {
                match self.memo.subset_info(*child).winner.as_full_winner() {
                    Some(winner) => inputs_cost += winner.total_cost.clone(),
                    None => {
                        all_known = false;
                        break;
                    }
                }
            }
            if !all_known {
                continue;
            }
            let context = RelNodeContext {
                subset_id: self.memo.subset_of_expr(expr_id),
                expr_id,
                children: expr
                    .children
                    .iter()
                    .map(|child| self.memo.reduce_subset(*child))
                    .collect(),
            };
            let predicates = expr
                .predicates
                .iter()
                .map(|pred| self.memo.get_pred(*pred))
                .collect::<Vec<_>>();
            let cost_model = self.cost.clone();
            let operation_cost = {
                let meta = self.metadata();
                cost_model
                    .self_cost(&expr.typ, &predicates, &meta, &context)
                    .unwrap_or(Cost::unit())
            };
            let total_cost = operation_cost.clone() + inputs_cost;
            let set_id = self.memo.set_of_expr(expr_id);
            for subset_id in self.memo.subsets_of_set(set_id) {
                if !self
                    .registry
                    .satisfies(&expr.traits, self.memo.subset_traits(subset_id))
                {
                    continue;
                }
                let improved = match &self.memo.subset_info(subset_id).winner {
                    Winner::Full(winner) => total_cost < winner.total_cost,
                    _ => true,
                };
                if improved {
                    self.memo.update_subset_winner(
                        subset_id,
                        Winner::Full(WinnerInfo {
                            expr_id,
                            total_cost: total_cost.clone(),
                            operation_cost: operation_cost.clone(),
                        }),
                    );
                    work.extend(self.memo.parents_of(subset_id));
                }
            }
        }
    }
}

impl<T: NodeType> Optimizer<T> for VolcanoOptimizer<T> {
    fn optimize(
        &mut self,
        root: ArcPlanNode<T>,
        required: TraitSet<T>,
        cancel: &CancellationToken,
    ) -> Result<(ArcPlanNode<T>, Cost), OptimizeError> {
        self.optimize_inner(root, required, cancel)
    }

    fn get_logical_property<P: LogicalPropertyBuilder<T>>(
        &self,
        subset: SubsetId,
        idx: usize,
    ) -> P::Prop {
        let set_id = self.memo.set_of_subset(subset);
        self.memo.set(set_id).properties()[idx]
            .as_any()
            .downcast_ref::<P::Prop>()
            .expect("failed to downcast logical property")
            .clone()
    }

    fn metadata(&self) -> MetadataQuery<'_, T> {
        MetadataQuery::new(&self.memo, &self.metadata_registry, &self.metadata_cache)
    }

    fn trait_registry(&self) -> &TraitRegistry<T> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{bail, Result};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::metadata::MetadataQuery;
    use crate::nodes::Value;
    use crate::tests::common::{
        expr, list, physical_traits, project, registry, scan, TestRelTyp,
    };

    struct TestCostModel;

    impl CostModel<TestRelTyp> for TestCostModel {
        fn self_cost(
            &self,
            _typ: &TestRelTyp,
            _predicates: &[crate::nodes::ArcPredNode<TestRelTyp>],
            _meta: &MetadataQuery<'_, TestRelTyp>,
            _context: &RelNodeContext,
        ) -> Option<Cost> {
            None
        }
    }

    struct PhysicalScanRule {
        matcher: crate::rules::RuleMatcher<TestRelTyp>,
    }

    impl PhysicalScanRule {
        fn new() -> Self {
            Self {
                matcher: crate::rules::RuleMatcher::MatchNode {
                    typ: TestRelTyp::Scan,
                    children: vec![],
                },
            }
        }
    }

    impl Rule<TestRelTyp, VolcanoOptimizer<TestRelTyp>> for PhysicalScanRule {
        fn matcher(&self) -> &crate::rules::RuleMatcher<TestRelTyp> {
            &self.matcher
        }

        fn apply(
            &self,
            _optimizer: &VolcanoOptimizer<TestRelTyp>,
            binding: ArcPlanNode<TestRelTyp>,
        ) -> Result<Vec<PlanNodeOrSubset<TestRelTyp>>> {
            Ok(vec![PlanNodeOrSubset::PlanNode(Arc::new(PlanNode {
                typ: TestRelTyp::PhysicalScan,
                children: vec![],
                predicates: binding.predicates.clone(),
                traits: physical_traits(),
            }))])
        }

        fn name(&self) -> &'static str {
            "physical_scan"
        }

        fn is_impl_rule(&self) -> bool {
            true
        }
    }

    struct PhysicalProjectRule {
        matcher: crate::rules::RuleMatcher<TestRelTyp>,
    }

    impl PhysicalProjectRule {
        fn new() -> Self {
            Self {
                matcher: crate::rules::RuleMatcher::MatchNode {
                    typ: TestRelTyp::Project,
                    children: vec![crate::rules::RuleMatcher::Any],
                },
            }
        }
    }

    impl Rule<TestRelTyp, VolcanoOptimizer<TestRelTyp>> for PhysicalProjectRule {
        fn matcher(&self) -> &crate::rules::RuleMatcher<TestRelTyp> {
            &self.matcher
        }

        fn apply(
            &self,
            _optimizer: &VolcanoOptimizer<TestRelTyp>,
            binding: ArcPlanNode<TestRelTyp>,
        ) -> Result<Vec<PlanNodeOrSubset<TestRelTyp>>> {
            let child = binding.child(0).unwrap_subset();
            Ok(vec![PlanNodeOrSubset::PlanNode(Arc::new(PlanNode {
                typ: TestRelTyp::PhysicalProject,
                children: vec![PlanNodeOrSubset::Require(child, physical_traits())],
                predicates: binding.predicates.clone(),
                traits: physical_traits(),
            }))])
        }

        fn name(&self) -> &'static str {
            "physical_project"
        }

        fn is_impl_rule(&self) -> bool {
            true
        }
    }

    struct FailingRule {
        matcher: crate::rules::RuleMatcher<TestRelTyp>,
    }

    impl FailingRule {
        fn new() -> Self {
            Self {
                matcher: crate::rules::RuleMatcher::MatchNode {
                    typ: TestRelTyp::Scan,
                    children: vec![],
                },
            }
        }
    }

    impl Rule<TestRelTyp, VolcanoOptimizer<TestRelTyp>> for FailingRule {
        fn matcher(&self) -> &crate::rules::RuleMatcher<TestRelTyp> {
            &self.matcher
        }

        fn apply(
            &self,
            _optimizer: &VolcanoOptimizer<TestRelTyp>,
            _binding: ArcPlanNode<TestRelTyp>,
        ) -> Result<Vec<PlanNodeOrSubset<TestRelTyp>>> {
            bail!("exploded on purpose")
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn optimizer(
        rules: Vec<Arc<dyn Rule<TestRelTyp, VolcanoOptimizer<TestRelTyp>>>>,
    ) -> VolcanoOptimizer<TestRelTyp> {
        VolcanoOptimizer::new(
            rules,
            Arc::new(TestCostModel),
            registry(),
            MetadataRegistry::new(),
            vec![],
        )
    }

    #[test]
    fn optimize_project_over_scan() {
        let mut opt = optimizer(vec![
            Arc::new(PhysicalScanRule::new()),
            Arc::new(PhysicalProjectRule::new()),
        ]);
        let root = project(scan("t1"), list(vec![expr(Value::Int64(1))]));
        let (plan, cost) = opt
            .optimize(root, physical_traits(), &CancellationToken::new())
            .unwrap();
        assert_eq!(plan.typ, TestRelTyp::PhysicalProject);
        assert_eq!(plan.child_rel(0).typ, TestRelTyp::PhysicalScan);
        assert_eq!(cost, Cost::new(2.0, 2.0, 2.0));
        assert_eq!(plan.traits, physical_traits());
        opt.memo().verify_integrity().unwrap();
    }

    #[test]
    fn no_plan_without_rules() {
        let mut opt = optimizer(vec![]);
        let err = opt
            .optimize(scan("t1"), physical_traits(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::NoPlanFound { .. }), "{err}");
    }

    #[test]
    fn cancelled_before_first_call() {
        let mut opt = optimizer(vec![
            Arc::new(PhysicalScanRule::new()),
            Arc::new(PhysicalProjectRule::new()),
        ]);
        let token = CancellationToken::new();
        token.cancel();
        let err = opt
            .optimize(
                project(scan("t1"), list(vec![expr(Value::Int64(1))])),
                physical_traits(),
                &token,
            )
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Cancelled), "{err}");
    }

    #[test]
    fn failing_rule_aborts_with_identity() {
        let mut opt = optimizer(vec![Arc::new(FailingRule::new())]);
        let err = opt
            .optimize(scan("t1"), physical_traits(), &CancellationToken::new())
            .unwrap_err();
        match err {
            OptimizeError::Rule { rule, .. } => assert_eq!(rule, "failing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failing_rule_can_be_skipped() {
        let mut opt = VolcanoOptimizer::new_with_prop(
            vec![
                Arc::new(FailingRule::new()),
                Arc::new(PhysicalScanRule::new()),
            ],
            Arc::new(TestCostModel),
            registry(),
            MetadataRegistry::new(),
            vec![],
            OptimizerProperties {
                continue_on_rule_error: true,
                ..Default::default()
            },
        );
        let (plan, _) = opt
            .optimize(scan("t1"), physical_traits(), &CancellationToken::new())
            .unwrap();
        assert_eq!(plan.typ, TestRelTyp::PhysicalScan);
    }

    #[test]
    fn excluded_rule_never_fires() {
        let mut opt = optimizer(vec![Arc::new(PhysicalScanRule::new())]);
        opt.set_rule_excluded(|name| name == "physical_scan");
        let err = opt
            .optimize(scan("t1"), physical_traits(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::NoPlanFound { .. }), "{err}");
    }

    #[test]
    fn listeners_observe_rule_activity() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct CountingListener {
            attempted: AtomicUsize,
            produced: AtomicUsize,
        }

        impl crate::listener::OptimizerListener<TestRelTyp> for CountingListener {
            fn rule_attempted(&self, _rule: &'static str, _expr: ExprId) {
                self.attempted.fetch_add(1, Ordering::SeqCst);
            }

            fn rule_production(&self, _rule: &'static str, _origin: ExprId, _produced: ExprId) {
                self.produced.fetch_add(1, Ordering::SeqCst);
            }
        }

        let listener = Arc::new(CountingListener::default());
        let mut opt = optimizer(vec![
            Arc::new(PhysicalScanRule::new()),
            Arc::new(PhysicalProjectRule::new()),
        ]);
        opt.add_listener(listener.clone());
        let root = project(scan("t1"), list(vec![expr(Value::Int64(1))]));
        opt.optimize(root, physical_traits(), &CancellationToken::new())
            .unwrap();
        assert!(listener.attempted.load(Ordering::SeqCst) > 0);
        // one physical scan and one physical project were produced
        assert_eq!(listener.produced.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deterministic_given_identical_inputs() {
        let run = || {
            let mut opt = optimizer(vec![
                Arc::new(PhysicalScanRule::new()),
                Arc::new(PhysicalProjectRule::new()),
            ]);
            let root = project(scan("t1"), list(vec![expr(Value::Int64(1))]));
            let (plan, cost) = opt
                .optimize(root, physical_traits(), &CancellationToken::new())
                .unwrap();
            (format!("{}", plan), cost)
        };
        assert_eq!(run(), run());
    }
}
