// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use itertools::Itertools;
use tracing::trace;

use super::optimizer::{ExprId, PredId, SetId, SubsetId};
use crate::cost::Cost;
use crate::error::OptimizeError;
use crate::logical_property::{LogicalProperty, LogicalPropertyBuilderAny};
use crate::nodes::{ArcPlanNode, ArcPredNode, NodeType, PlanNode, PlanNodeOrSubset};
use crate::traits::{TraitRegistry, TraitSet};

pub type ArcMemoExpr<T> = Arc<MemoExpr<T>>;

/// The memoized form of a plan node: children are subset references, predicates are
/// interned. Equivalent to MExpr in Columbia/Cascades.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemoExpr<T: NodeType> {
    pub typ: T,
    pub children: Vec<SubsetId>,
    pub predicates: Vec<PredId>,
    pub traits: TraitSet<T>,
}

impl<T: NodeType> std::fmt::Display for MemoExpr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}", self.typ)?;
        for child in &self.children {
            write!(f, " {}", child)?;
        }
        for pred in &self.predicates {
            write!(f, " {}", pred)?;
        }
        write!(f, " {{{}}})", self.traits)
    }
}

#[derive(Clone)]
pub struct WinnerInfo {
    pub expr_id: ExprId,
    pub total_cost: Cost,
    pub operation_cost: Cost,
}

#[derive(Clone, Default)]
pub enum Winner {
    #[default]
    Unknown,
    /// No feasible member and no expandable conversion; pruned from contention until a new
    /// member or expansion re-opens the subset.
    Impossible,
    Full(WinnerInfo),
}

impl Winner {
    pub fn has_full_winner(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    pub fn has_decided(&self) -> bool {
        matches!(self, Self::Full { .. } | Self::Impossible)
    }

    pub fn as_full_winner(&self) -> Option<&WinnerInfo> {
        match self {
            Self::Full(info) => Some(info),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct SubsetInfo {
    pub winner: Winner,
}

/// An equivalence class: all registered expressions producing the same rows, up to trait
/// differences, plus the logical properties shared by every member.
pub struct Set {
    pub(crate) subsets: Vec<SubsetId>,
    pub(crate) exprs: HashSet<ExprId>,
    pub(crate) properties: Arc<[Box<dyn LogicalProperty>]>,
}

impl Set {
    pub fn properties(&self) -> &Arc<[Box<dyn LogicalProperty>]> {
        &self.properties
    }
}

/// The members of a set sharing one trait set. Children of registered expressions are
/// always subsets, which is what makes substituting a better member free for parents.
pub struct Subset<T: NodeType> {
    pub(crate) set_id: SetId,
    pub(crate) traits: TraitSet<T>,
    pub(crate) info: SubsetInfo,
    pub(crate) parents: HashSet<ExprId>,
}

impl<T: NodeType> Subset<T> {
    pub fn traits(&self) -> &TraitSet<T> {
        &self.traits
    }
}

/// Structural changes surfaced to the driver: new expressions enqueue rule matches and cost
/// derivation, re-parented expressions (after set merges) re-enqueue both, and new subsets
/// get the set's existing satisfying members offered to their winner slot.
pub(crate) enum MemoEvent {
    NewExpr(ExprId),
    ReparentedExpr(ExprId),
    NewSubset(SubsetId),
}

/// The memo table: a two-level structure of sets and subsets with structural deduplication
/// and union-find set merging.
pub struct Memo<T: NodeType> {
    // Source of truth.
    sets: HashMap<SetId, Set>,
    subsets: HashMap<SubsetId, Subset<T>>,
    expr_id_to_expr_node: HashMap<ExprId, ArcMemoExpr<T>>,

    // Predicate interning.
    pred_id_to_pred_node: HashMap<PredId, ArcPredNode<T>>,
    pred_node_to_pred_id: HashMap<ArcPredNode<T>, PredId>,

    // Internal states. Set, subset, expr, and pred ids share one counter so that any id
    // appears at most once in a trace.
    id_counter: usize,
    timestamp: u64,
    registry: Arc<TraitRegistry<T>>,
    property_builders: Arc<[Box<dyn LogicalPropertyBuilderAny<T>>]>,
    events: Vec<MemoEvent>,

    // Indexes.
    expr_fingerprint_to_ids: HashMap<u64, HashSet<ExprId>>,
    expr_id_to_subset_id: HashMap<ExprId, SubsetId>,
    subset_index: HashMap<(SetId, TraitSet<T>), SubsetId>,

    // Union-find mappings for merged sets and subsets, plus forwarding for expressions
    // that became structural duplicates after a merge. The smaller (older) id survives.
    merged_set_mapping: HashMap<SetId, SetId>,
    merged_subset_mapping: HashMap<SubsetId, SubsetId>,
    dup_expr_mapping: HashMap<ExprId, ExprId>,
}

impl<T: NodeType> Memo<T> {
    pub fn new(
        registry: Arc<TraitRegistry<T>>,
        property_builders: Arc<[Box<dyn LogicalPropertyBuilderAny<T>>]>,
    ) -> Self {
        Self {
            sets: HashMap::new(),
            subsets: HashMap::new(),
            expr_id_to_expr_node: HashMap::new(),
            pred_id_to_pred_node: HashMap::new(),
            pred_node_to_pred_id: HashMap::new(),
            id_counter: 0,
            timestamp: 0,
            registry,
            property_builders,
            events: Vec::new(),
            expr_fingerprint_to_ids: HashMap::new(),
            expr_id_to_subset_id: HashMap::new(),
            subset_index: HashMap::new(),
            merged_set_mapping: HashMap::new(),
            merged_subset_mapping: HashMap::new(),
            dup_expr_mapping: HashMap::new(),
        }
    }

    fn next_set_id(&mut self) -> SetId {
        let id = self.id_counter;
        self.id_counter += 1;
        SetId(id)
    }

    fn next_subset_id(&mut self) -> SubsetId {
        let id = self.id_counter;
        self.id_counter += 1;
        SubsetId(id)
    }

    fn next_expr_id(&mut self) -> ExprId {
        let id = self.id_counter;
        self.id_counter += 1;
        ExprId(id)
    }

    fn next_pred_id(&mut self) -> PredId {
        let id = self.id_counter;
        self.id_counter += 1;
        PredId(id)
    }

    /// The memo timestamp: advances monotonically on every mutation. Cached metadata is
    /// validated against it.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn bump_timestamp(&mut self) {
        self.timestamp += 1;
    }

    pub fn trait_registry(&self) -> &TraitRegistry<T> {
        &self.registry
    }

    pub(crate) fn take_events(&mut self) -> Vec<MemoEvent> {
        std::mem::take(&mut self.events)
    }

    /// Think of it as `get_root_set`.
    pub fn reduce_set(&self, mut set_id: SetId) -> SetId {
        while let Some(parent) = self.merged_set_mapping.get(&set_id) {
            set_id = *parent;
        }
        set_id
    }

    pub fn reduce_subset(&self, mut subset_id: SubsetId) -> SubsetId {
        while let Some(parent) = self.merged_subset_mapping.get(&subset_id) {
            subset_id = *parent;
        }
        subset_id
    }

    pub fn reduce_expr(&self, mut expr_id: ExprId) -> ExprId {
        while let Some(forward) = self.dup_expr_mapping.get(&expr_id) {
            expr_id = *forward;
        }
        expr_id
    }

    pub fn is_expr_obsolete(&self, expr_id: ExprId) -> bool {
        self.dup_expr_mapping.contains_key(&expr_id)
    }

    pub fn add_new_pred(&mut self, pred_node: ArcPredNode<T>) -> PredId {
        if let Some(id) = self.pred_node_to_pred_id.get(&pred_node) {
            return *id;
        }
        let pred_id = self.next_pred_id();
        self.pred_node_to_pred_id.insert(pred_node.clone(), pred_id);
        self.pred_id_to_pred_node.insert(pred_id, pred_node);
        pred_id
    }

    pub fn get_pred(&self, pred_id: PredId) -> ArcPredNode<T> {
        self.pred_id_to_pred_node[&pred_id].clone()
    }

    pub fn get_pred_id(&self, pred_node: &ArcPredNode<T>) -> Option<PredId> {
        self.pred_node_to_pred_id.get(pred_node).copied()
    }

    pub fn get_expr_memoed(&self, expr_id: ExprId) -> ArcMemoExpr<T> {
        let expr_id = self.reduce_expr(expr_id);
        self.expr_id_to_expr_node
            .get(&expr_id)
            .expect("expr not found in expr mapping")
            .clone()
    }

    pub fn set(&self, set_id: SetId) -> &Set {
        let set_id = self.reduce_set(set_id);
        self.sets.get(&set_id).expect("set not found")
    }

    pub fn subset(&self, subset_id: SubsetId) -> &Subset<T> {
        let subset_id = self.reduce_subset(subset_id);
        self.subsets.get(&subset_id).expect("subset not found")
    }

    pub fn subset_info(&self, subset_id: SubsetId) -> &SubsetInfo {
        &self.subset(subset_id).info
    }

    pub fn subset_traits(&self, subset_id: SubsetId) -> &TraitSet<T> {
        &self.subset(subset_id).traits
    }

    pub fn set_of_subset(&self, subset_id: SubsetId) -> SetId {
        self.reduce_set(self.subset(subset_id).set_id)
    }

    pub fn subset_of_expr(&self, expr_id: ExprId) -> SubsetId {
        let expr_id = self.reduce_expr(expr_id);
        self.reduce_subset(
            *self
                .expr_id_to_subset_id
                .get(&expr_id)
                .expect("expr not found in subset mapping"),
        )
    }

    pub fn set_of_expr(&self, expr_id: ExprId) -> SetId {
        self.set_of_subset(self.subset_of_expr(expr_id))
    }

    pub fn all_set_ids(&self) -> Vec<SetId> {
        let mut ids = self.sets.keys().copied().collect_vec();
        ids.sort();
        ids
    }

    pub fn subsets_of_set(&self, set_id: SetId) -> Vec<SubsetId> {
        self.set(set_id)
            .subsets
            .iter()
            .map(|subset| self.reduce_subset(*subset))
            .unique()
            .collect()
    }

    /// All live member expressions of a set, sorted so processing order is stable across
    /// platforms.
    pub fn exprs_in_set(&self, set_id: SetId) -> Vec<ExprId> {
        let set = self.set(set_id);
        let mut exprs = set
            .exprs
            .iter()
            .copied()
            .filter(|expr| !self.dup_expr_mapping.contains_key(expr))
            .collect_vec();
        exprs.sort();
        exprs
    }

    /// The members registered with exactly this subset's trait set.
    pub fn exprs_in_subset(&self, subset_id: SubsetId) -> Vec<ExprId> {
        let subset_id = self.reduce_subset(subset_id);
        let traits = self.subsets[&subset_id].traits.clone();
        self.exprs_in_set(self.set_of_subset(subset_id))
            .into_iter()
            .filter(|expr| self.expr_id_to_expr_node[expr].traits == traits)
            .collect()
    }

    /// The members of the subset's set whose trait set satisfies this subset's trait set;
    /// these are the candidates for the subset's winner.
    pub fn members_satisfying(&self, subset_id: SubsetId) -> Vec<ExprId> {
        let subset_id = self.reduce_subset(subset_id);
        let traits = self.subsets[&subset_id].traits.clone();
        self.exprs_in_set(self.set_of_subset(subset_id))
            .into_iter()
            .filter(|expr| {
                self.registry
                    .satisfies(&self.expr_id_to_expr_node[expr].traits, &traits)
            })
            .collect()
    }

    /// Expressions that reference this subset as a child.
    pub fn parents_of(&self, subset_id: SubsetId) -> Vec<ExprId> {
        let mut parents = self
            .subset(subset_id)
            .parents
            .iter()
            .copied()
            .filter(|expr| !self.dup_expr_mapping.contains_key(expr))
            .collect_vec();
        parents.sort();
        parents
    }

    pub fn estimated_plan_space(&self) -> usize {
        self.expr_id_to_expr_node.len()
    }

    /// Fingerprint of a memoized node with all subset references rewritten to their roots,
    /// so structural equality survives merges.
    fn fingerprint_of(&self, expr: &MemoExpr<T>) -> u64 {
        let rewritten = self.rewrite_expr(expr);
        let mut hasher = DefaultHasher::new();
        rewritten.hash(&mut hasher);
        hasher.finish()
    }

    fn rewrite_expr(&self, expr: &MemoExpr<T>) -> MemoExpr<T> {
        let mut rewritten = expr.clone();
        for child in &mut rewritten.children {
            *child = self.reduce_subset(*child);
        }
        rewritten
    }

    /// Looks up the exact structural twin of an expression, if registered.
    fn lookup_expr(&self, expr: &MemoExpr<T>) -> Option<ExprId> {
        let fingerprint = self.fingerprint_of(expr);
        let rewritten = self.rewrite_expr(expr);
        if let Some(matches) = self.expr_fingerprint_to_ids.get(&fingerprint) {
            let mut matches = matches.iter().copied().collect_vec();
            matches.sort();
            for candidate_id in matches {
                let candidate_id = self.reduce_expr(candidate_id);
                let candidate = self.rewrite_expr(&self.expr_id_to_expr_node[&candidate_id]);
                if candidate == rewritten {
                    return Some(candidate_id);
                }
            }
        }
        None
    }

    fn add_expr_to_fingerprint_index(&mut self, expr_id: ExprId) {
        let expr = self.expr_id_to_expr_node.get(&expr_id).unwrap();
        let fingerprint = self.fingerprint_of(expr);
        self.expr_fingerprint_to_ids
            .entry(fingerprint)
            .or_default()
            .insert(expr_id);
    }

    fn infer_properties(&self, memo_expr: &MemoExpr<T>) -> Vec<Box<dyn LogicalProperty>> {
        let child_properties = memo_expr
            .children
            .iter()
            .map(|child| self.set(self.set_of_subset(*child)).properties.clone())
            .collect_vec();
        let child_predicates = memo_expr
            .predicates
            .iter()
            .map(|pred| self.pred_id_to_pred_node[pred].clone())
            .collect_vec();
        let mut props = Vec::with_capacity(self.property_builders.len());
        for (idx, builder) in self.property_builders.iter().enumerate() {
            let children = child_properties
                .iter()
                .map(|props| props[idx].as_ref())
                .collect_vec();
            props.push(builder.derive_any(
                memo_expr.typ.clone(),
                &child_predicates,
                children.as_slice(),
            ));
        }
        props
    }

    fn subset_for(&mut self, set_id: SetId, traits: &TraitSet<T>) -> SubsetId {
        if let Some(&subset) = self.subset_index.get(&(set_id, traits.clone())) {
            return self.reduce_subset(subset);
        }
        let subset_id = self.next_subset_id();
        self.subsets.insert(
            subset_id,
            Subset {
                set_id,
                traits: traits.clone(),
                info: SubsetInfo::default(),
                parents: HashSet::new(),
            },
        );
        self.subset_index
            .insert((set_id, traits.clone()), subset_id);
        self.sets.get_mut(&set_id).unwrap().subsets.push(subset_id);
        self.events.push(MemoEvent::NewSubset(subset_id));
        subset_id
    }

    /// Registers an expression, deduplicating against structural twins. If the expression
    /// already exists the registered subset is returned and the memo is left untouched
    /// (in particular the timestamp does not advance).
    pub fn add_new_expr(&mut self, node: ArcPlanNode<T>) -> (SubsetId, ExprId) {
        let result = self.add_expr_inner(node, None);
        #[cfg(debug_assertions)]
        self.assert_integrity();
        result
    }

    /// Registers an expression into an existing set (the `register(expr, targetSet)` form).
    /// A `Subset` argument merges the two sets instead and returns `None`.
    pub fn add_expr_to_set(
        &mut self,
        node: PlanNodeOrSubset<T>,
        set_id: SetId,
    ) -> Option<ExprId> {
        let result = match node {
            PlanNodeOrSubset::Subset(subset) => {
                let other = self.set_of_subset(subset);
                let set_id = self.reduce_set(set_id);
                self.merge_sets(set_id, other);
                None
            }
            PlanNodeOrSubset::Require(subset, traits) => {
                let converted = self.change_traits(subset, &traits);
                let other = self.set_of_subset(converted);
                let set_id = self.reduce_set(set_id);
                self.merge_sets(set_id, other);
                None
            }
            PlanNodeOrSubset::PlanNode(node) => {
                let set_id = self.reduce_set(set_id);
                let (_, expr_id) = self.add_expr_inner(node, Some(set_id));
                Some(expr_id)
            }
        };
        #[cfg(debug_assertions)]
        self.assert_integrity();
        result
    }

    /// Registers an expression; when `equiv_to` refers to a different set, both sets are
    /// merged afterwards.
    pub fn ensure_registered(
        &mut self,
        node: ArcPlanNode<T>,
        equiv_to: Option<SubsetId>,
    ) -> (SubsetId, ExprId) {
        match equiv_to {
            Some(subset) => {
                let set_id = self.set_of_subset(subset);
                let (subset_id, expr_id) = self.add_expr_inner(node, Some(set_id));
                (subset_id, expr_id)
            }
            None => self.add_new_expr(node),
        }
    }

    fn add_expr_inner(
        &mut self,
        node: ArcPlanNode<T>,
        add_to_set: Option<SetId>,
    ) -> (SubsetId, ExprId) {
        assert_eq!(
            node.traits.len(),
            self.registry.num_axes(),
            "node trait set arity does not match the registered axes"
        );
        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let subset = match child {
                PlanNodeOrSubset::Subset(subset) => self.reduce_subset(*subset),
                PlanNodeOrSubset::Require(subset, traits) => self.change_traits(*subset, traits),
                PlanNodeOrSubset::PlanNode(child) => self.add_expr_inner(child.clone(), None).0,
            };
            children.push(subset);
        }
        let memo_expr = MemoExpr {
            typ: node.typ.clone(),
            children,
            predicates: node
                .predicates
                .iter()
                .map(|pred| self.add_new_pred(pred.clone()))
                .collect(),
            traits: node.traits.clone(),
        };
        if let Some(expr_id) = self.lookup_expr(&memo_expr) {
            let subset_id = self.subset_of_expr(expr_id);
            let set_id = self.set_of_subset(subset_id);
            if let Some(target_set) = add_to_set {
                let target_set = self.reduce_set(target_set);
                if target_set != set_id {
                    self.merge_sets(target_set, set_id);
                }
            }
            return (self.reduce_subset(subset_id), self.reduce_expr(expr_id));
        }
        let expr_id = self.next_expr_id();
        let set_id = match add_to_set {
            Some(set_id) => self.reduce_set(set_id),
            None => {
                let set_id = self.next_set_id();
                let properties = self.infer_properties(&memo_expr).into();
                self.sets.insert(
                    set_id,
                    Set {
                        subsets: Vec::new(),
                        exprs: HashSet::new(),
                        properties,
                    },
                );
                set_id
            }
        };
        let subset_id = self.subset_for(set_id, &memo_expr.traits);
        trace!(event = "add_expr_to_subset", set_id = %set_id, subset_id = %subset_id, expr_id = %expr_id, memo_expr = %memo_expr);
        for child in memo_expr.children.iter().copied().unique() {
            self.subsets.get_mut(&child).unwrap().parents.insert(expr_id);
        }
        self.expr_id_to_expr_node
            .insert(expr_id, Arc::new(memo_expr));
        self.expr_id_to_subset_id.insert(expr_id, subset_id);
        self.sets.get_mut(&set_id).unwrap().exprs.insert(expr_id);
        self.add_expr_to_fingerprint_index(expr_id);
        self.events.push(MemoEvent::NewExpr(expr_id));
        self.bump_timestamp();
        (subset_id, expr_id)
    }

    /// Returns the subset holding this expression, without registering anything.
    pub fn get_subset(&self, node: &ArcPlanNode<T>) -> Option<SubsetId> {
        let memo_expr = self.try_memoize(node)?;
        let expr_id = self.lookup_expr(&memo_expr)?;
        Some(self.subset_of_expr(expr_id))
    }

    fn try_memoize(&self, node: &ArcPlanNode<T>) -> Option<MemoExpr<T>> {
        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let subset = match child {
                PlanNodeOrSubset::Subset(subset) => self.reduce_subset(*subset),
                PlanNodeOrSubset::Require(subset, traits) => {
                    let set_id = self.set_of_subset(*subset);
                    self.reduce_subset(*self.subset_index.get(&(set_id, traits.clone()))?)
                }
                PlanNodeOrSubset::PlanNode(child) => {
                    let memoized = self.try_memoize(child)?;
                    self.subset_of_expr(self.lookup_expr(&memoized)?)
                }
            };
            children.push(subset);
        }
        let mut predicates = Vec::with_capacity(node.predicates.len());
        for pred in &node.predicates {
            predicates.push(self.get_pred_id(pred)?);
        }
        Some(MemoExpr {
            typ: node.typ.clone(),
            children,
            predicates,
            traits: node.traits.clone(),
        })
    }

    /// Returns the subset of the expression's set carrying the requested trait set,
    /// registering an abstract converter into that subset when it does not exist yet.
    pub fn change_traits(&mut self, subset_id: SubsetId, to: &TraitSet<T>) -> SubsetId {
        let from = self.reduce_subset(subset_id);
        let from_traits = self.subsets[&from].traits.clone();
        if &from_traits == to {
            return from;
        }
        let set_id = self.set_of_subset(from);
        if let Some(&existing) = self.subset_index.get(&(set_id, to.clone())) {
            return self.reduce_subset(existing);
        }
        trace!(event = "change_traits", subset_id = %from, to = %to);
        let converter = Arc::new(PlanNode {
            typ: T::abstract_converter(),
            children: vec![PlanNodeOrSubset::Subset(from)],
            predicates: vec![],
            traits: to.clone(),
        });
        let (subset_id, _) = self.add_expr_inner(converter, Some(set_id));
        subset_id
    }

    pub fn update_subset_winner(&mut self, subset_id: SubsetId, winner: Winner) {
        let subset_id = self.reduce_subset(subset_id);
        if let Winner::Full(info) = &winner {
            trace!(event = "update_winner", subset_id = %subset_id, expr_id = %info.expr_id, total_cost = %info.total_cost);
        }
        self.subsets.get_mut(&subset_id).unwrap().info = SubsetInfo { winner };
        // winners feed cumulative-cost metadata, so cached entries must go stale
        self.bump_timestamp();
    }

    pub fn clear_winners(&mut self) {
        for subset in self.subsets.values_mut() {
            subset.info.winner = Winner::Unknown;
        }
        self.bump_timestamp();
    }

    pub(crate) fn merge_sets(&mut self, a: SetId, b: SetId) {
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            self.merge_sets_inner(a, b, &mut pending);
        }
    }

    fn merge_sets_inner(&mut self, a: SetId, b: SetId, pending: &mut Vec<(SetId, SetId)>) {
        let a = self.reduce_set(a);
        let b = self.reduce_set(b);
        if a == b {
            return;
        }
        // the older set survives
        let (survivor, loser) = if a < b { (a, b) } else { (b, a) };
        trace!(event = "merge_set", merge_into = %survivor, merge_from = %loser);
        self.merged_set_mapping.insert(loser, survivor);
        let loser_set = self.sets.remove(&loser).unwrap();
        for subset_id in &loser_set.subsets {
            let subset_id = *subset_id;
            if self.merged_subset_mapping.contains_key(&subset_id) {
                continue;
            }
            let traits = self.subsets[&subset_id].traits.clone();
            self.subset_index.remove(&(loser, traits.clone()));
            if let Some(&existing) = self.subset_index.get(&(survivor, traits.clone())) {
                self.merge_subsets(existing, subset_id);
            } else {
                self.subsets.get_mut(&subset_id).unwrap().set_id = survivor;
                self.subset_index.insert((survivor, traits), subset_id);
                self.sets
                    .get_mut(&survivor)
                    .unwrap()
                    .subsets
                    .push(subset_id);
            }
        }
        self.sets
            .get_mut(&survivor)
            .unwrap()
            .exprs
            .extend(loser_set.exprs.iter().copied());
        // Parents of the loser's subsets may reduce their children differently now; refresh
        // their fingerprints and surface expressions that became structural twins, which can
        // cascade into further merges upward.
        let mut touched = Vec::new();
        for subset_id in &loser_set.subsets {
            let root = self.reduce_subset(*subset_id);
            touched.extend(self.subsets[&root].parents.iter().copied());
        }
        touched.sort_unstable();
        touched.dedup();
        for expr_id in touched {
            if self.dup_expr_mapping.contains_key(&expr_id) {
                continue;
            }
            self.add_expr_to_fingerprint_index(expr_id);
            let expr = self.expr_id_to_expr_node[&expr_id].clone();
            if let Some(twin) = self.lookup_expr(&expr) {
                if twin != expr_id {
                    let (keep, dup) = if twin < expr_id {
                        (twin, expr_id)
                    } else {
                        (expr_id, twin)
                    };
                    let keep_set = self.set_of_expr(keep);
                    let dup_set = self.set_of_expr(dup);
                    if keep_set != dup_set {
                        pending.push((keep_set, dup_set));
                    } else {
                        trace!(event = "dup_expr", keep = %keep, dup = %dup);
                        self.dup_expr_mapping.insert(dup, keep);
                    }
                }
            }
            self.events.push(MemoEvent::ReparentedExpr(expr_id));
        }
        for expr_id in loser_set.exprs {
            if !self.dup_expr_mapping.contains_key(&expr_id) {
                self.events.push(MemoEvent::ReparentedExpr(expr_id));
            }
        }
        // the merged set's subsets gained members; re-relax all of them
        for subset_id in self.sets[&survivor].subsets.clone() {
            let subset_id = self.reduce_subset(subset_id);
            self.events.push(MemoEvent::NewSubset(subset_id));
        }
        self.bump_timestamp();
    }

    fn merge_subsets(&mut self, into: SubsetId, from: SubsetId) {
        trace!(event = "merge_subset", merge_into = %into, merge_from = %from);
        self.merged_subset_mapping.insert(from, into);
        let from_subset = self.subsets.remove(&from).unwrap();
        let into_subset = self.subsets.get_mut(&into).unwrap();
        into_subset
            .parents
            .extend(from_subset.parents.iter().copied());
        // keep the better of the two winners; an Impossible verdict does not survive a merge
        // because the merged subset has new members to try
        let winner = match (&into_subset.info.winner, &from_subset.info.winner) {
            (Winner::Full(a), Winner::Full(b)) => {
                if b.total_cost < a.total_cost {
                    Winner::Full(b.clone())
                } else {
                    Winner::Full(a.clone())
                }
            }
            (Winner::Full(a), _) => Winner::Full(a.clone()),
            (_, Winner::Full(b)) => Winner::Full(b.clone()),
            _ => Winner::Unknown,
        };
        into_subset.info.winner = winner;
    }

    /// Extracts the winning plan rooted at a subset by recursively materializing each
    /// subset's best member.
    pub fn best_winner_binding(
        &self,
        subset_id: SubsetId,
        post_process: &mut impl FnMut(ArcPlanNode<T>, SubsetId, &WinnerInfo),
    ) -> Result<ArcPlanNode<T>, OptimizeError> {
        let mut visited = HashSet::new();
        self.best_winner_binding_inner(subset_id, post_process, &mut visited)
    }

    fn best_winner_binding_inner(
        &self,
        subset_id: SubsetId,
        post_process: &mut impl FnMut(ArcPlanNode<T>, SubsetId, &WinnerInfo),
        visited: &mut HashSet<SubsetId>,
    ) -> Result<ArcPlanNode<T>, OptimizeError> {
        let subset_id = self.reduce_subset(subset_id);
        if !visited.insert(subset_id) {
            return Err(OptimizeError::InvalidState(format!(
                "cycle detected in subset {}",
                subset_id
            )));
        }
        if let Winner::Full(winner) = &self.subset_info(subset_id).winner {
            let expr = self.get_expr_memoed(winner.expr_id);
            let mut children = Vec::with_capacity(expr.children.len());
            for child in &expr.children {
                children.push(PlanNodeOrSubset::PlanNode(
                    self.best_winner_binding_inner(*child, post_process, visited)?,
                ));
            }
            let node = Arc::new(PlanNode {
                typ: expr.typ.clone(),
                children,
                predicates: expr.predicates.iter().map(|p| self.get_pred(*p)).collect(),
                traits: expr.traits.clone(),
            });
            post_process(node.clone(), subset_id, winner);
            visited.remove(&subset_id);
            return Ok(node);
        }
        Err(OptimizeError::NoPlanFound { subset: subset_id })
    }

    /// Checks the memo invariants; violations are always fatal.
    pub fn verify_integrity(&self) -> Result<(), OptimizeError> {
        let invalid = |message: String| Err(OptimizeError::InvalidState(message));
        for (&expr_id, expr) in &self.expr_id_to_expr_node {
            if self.dup_expr_mapping.contains_key(&expr_id) {
                continue;
            }
            let Some(&subset_id) = self.expr_id_to_subset_id.get(&expr_id) else {
                return invalid(format!("expr {} has no subset", expr_id));
            };
            let subset_id = self.reduce_subset(subset_id);
            let Some(subset) = self.subsets.get(&subset_id) else {
                return invalid(format!("expr {} references dead subset {}", expr_id, subset_id));
            };
            if subset.traits != expr.traits {
                return invalid(format!(
                    "expr {} traits {{{}}} disagree with subset {} traits {{{}}}",
                    expr_id, expr.traits, subset_id, subset.traits
                ));
            }
            let set_id = self.reduce_set(subset.set_id);
            let Some(set) = self.sets.get(&set_id) else {
                return invalid(format!("subset {} references dead set {}", subset_id, set_id));
            };
            if !set.exprs.contains(&expr_id) {
                return invalid(format!("set {} does not list member {}", set_id, expr_id));
            }
            for child in &expr.children {
                let child = self.reduce_subset(*child);
                let Some(child_subset) = self.subsets.get(&child) else {
                    return invalid(format!("expr {} has dead child subset {}", expr_id, child));
                };
                if !child_subset.parents.contains(&expr_id) {
                    return invalid(format!(
                        "subset {} does not track parent expr {}",
                        child, expr_id
                    ));
                }
            }
        }
        // deduplication: structural twins must share a set
        for exprs in self.expr_fingerprint_to_ids.values() {
            let live = exprs
                .iter()
                .map(|expr| self.reduce_expr(*expr))
                .unique()
                .collect_vec();
            for (idx, &a) in live.iter().enumerate() {
                for &b in &live[idx + 1..] {
                    let ea = self.rewrite_expr(&self.expr_id_to_expr_node[&a]);
                    let eb = self.rewrite_expr(&self.expr_id_to_expr_node[&b]);
                    if ea == eb && self.set_of_expr(a) != self.set_of_expr(b) {
                        return invalid(format!(
                            "structural twins {} and {} live in different sets",
                            a, b
                        ));
                    }
                }
            }
        }
        // winners must be members whose traits satisfy the subset and cost at least their
        // own operation cost
        for (&subset_id, subset) in &self.subsets {
            if let Winner::Full(winner) = &subset.info.winner {
                let expr_id = self.reduce_expr(winner.expr_id);
                let expr = &self.expr_id_to_expr_node[&expr_id];
                if self.set_of_expr(expr_id) != self.reduce_set(subset.set_id) {
                    return invalid(format!(
                        "winner {} of subset {} is not a member of its set",
                        expr_id, subset_id
                    ));
                }
                if !self.registry.satisfies(&expr.traits, &subset.traits) {
                    return invalid(format!(
                        "winner {} of subset {} does not satisfy {{{}}}",
                        expr_id, subset_id, subset.traits
                    ));
                }
                if winner.total_cost < winner.operation_cost {
                    return invalid(format!(
                        "winner {} of subset {} costs less than its own operation",
                        expr_id, subset_id
                    ));
                }
            }
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn assert_integrity(&self) {
        if let Err(err) = self.verify_integrity() {
            panic!("{}\n{}", err, self.dump());
        }
    }

    /// Renders the memo for diagnostics.
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for set_id in self.all_set_ids() {
            writeln!(out, "set {}", set_id).unwrap();
            for subset_id in self.subsets_of_set(set_id) {
                let subset = self.subset(subset_id);
                let winner = match &subset.info.winner {
                    Winner::Unknown => "winner=<unknown>".to_string(),
                    Winner::Impossible => "winner=<impossible>".to_string(),
                    Winner::Full(info) => format!(
                        "winner={} cost={}",
                        info.expr_id, info.total_cost
                    ),
                };
                writeln!(out, "  subset {} {{{}}} {}", subset_id, subset.traits, winner).unwrap();
            }
            for expr_id in self.exprs_in_set(set_id) {
                writeln!(out, "  expr_id={} | {}", expr_id, self.get_expr_memoed(expr_id))
                    .unwrap();
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::nodes::Value;
    use crate::tests::common::{
        expr, join, list, physical_traits, project, registry, scan, subset_ref, TestProp,
        TestPropertyBuilder, TestRelTyp,
    };

    fn new_memo() -> Memo<TestRelTyp> {
        Memo::new(Arc::new(registry()), Arc::new([]))
    }

    #[test]
    fn add_predicate() {
        let mut memo = new_memo();
        let pred_node = list(vec![expr(Value::Int32(233))]);
        let p1 = memo.add_new_pred(pred_node.clone());
        let p2 = memo.add_new_pred(pred_node.clone());
        assert_eq!(p1, p2);
    }

    #[test]
    fn set_merge_1() {
        let mut memo = new_memo();
        let (subset, _) = memo.add_new_expr(join(scan("t1"), scan("t2"), expr(Value::Bool(true))));
        let set = memo.set_of_subset(subset);
        memo.add_expr_to_set(
            join(scan("t2"), scan("t1"), expr(Value::Bool(true))).into(),
            set,
        );
        assert_eq!(memo.exprs_in_set(set).len(), 2);
    }

    #[test]
    fn set_merge_2() {
        let mut memo = new_memo();
        let (subset_1, _) = memo.add_new_expr(project(
            join(scan("t1"), scan("t2"), expr(Value::Bool(true))),
            list(vec![expr(Value::Int64(1))]),
        ));
        let (subset_2, _) = memo.add_new_expr(project(
            join(scan("t1"), scan("t2"), expr(Value::Bool(true))),
            list(vec![expr(Value::Int64(1))]),
        ));
        assert_eq!(subset_1, subset_2);
    }

    #[test]
    fn set_merge_3() {
        let mut memo = new_memo();
        let expr1 = project(scan("t1"), list(vec![expr(Value::Int64(1))]));
        let expr2 = project(scan("t1-alias"), list(vec![expr(Value::Int64(1))]));
        memo.add_new_expr(expr1.clone());
        memo.add_new_expr(expr2.clone());
        // merging two child sets causes the parents to merge
        let scan_subset = memo.get_subset(&scan("t1")).unwrap();
        let scan_set = memo.set_of_subset(scan_subset);
        memo.add_expr_to_set(scan("t1-alias").into(), scan_set);
        let set_1 = memo.set_of_subset(memo.get_subset(&expr1).unwrap());
        let set_2 = memo.set_of_subset(memo.get_subset(&expr2).unwrap());
        assert_eq!(set_1, set_2);
    }

    #[test]
    fn set_merge_4() {
        let mut memo = new_memo();
        let expr1 = project(
            project(scan("t1"), list(vec![expr(Value::Int64(1))])),
            list(vec![expr(Value::Int64(2))]),
        );
        let expr2 = project(
            project(scan("t1-alias"), list(vec![expr(Value::Int64(1))])),
            list(vec![expr(Value::Int64(2))]),
        );
        memo.add_new_expr(expr1.clone());
        memo.add_new_expr(expr2.clone());
        // merge two child sets, cascading merge
        let scan_subset = memo.get_subset(&scan("t1")).unwrap();
        let scan_set = memo.set_of_subset(scan_subset);
        memo.add_expr_to_set(scan("t1-alias").into(), scan_set);
        let set_1 = memo.set_of_subset(memo.get_subset(&expr1).unwrap());
        let set_2 = memo.set_of_subset(memo.get_subset(&expr2).unwrap());
        assert_eq!(set_1, set_2);
        let set_1 = memo.set_of_subset(memo.get_subset(&expr1.child_rel(0)).unwrap());
        let set_2 = memo.set_of_subset(memo.get_subset(&expr2.child_rel(0)).unwrap());
        assert_eq!(set_1, set_2);
        memo.verify_integrity().unwrap();
    }

    #[test]
    fn ensure_registered_merges_with_equivalent() {
        let mut memo = new_memo();
        let (subset_1, _) = memo.add_new_expr(scan("t1"));
        let (subset_2, _) = memo.add_new_expr(scan("t2"));
        assert_ne!(memo.set_of_subset(subset_1), memo.set_of_subset(subset_2));
        // declaring t2's scan equivalent to t1's subset merges both sets
        let (merged_subset, _) = memo.ensure_registered(scan("t2"), Some(subset_1));
        assert_eq!(
            memo.set_of_subset(merged_subset),
            memo.set_of_subset(memo.reduce_subset(subset_1))
        );
        assert_eq!(
            memo.set_of_subset(memo.reduce_subset(subset_1)),
            memo.set_of_subset(memo.reduce_subset(subset_2))
        );
        memo.verify_integrity().unwrap();
    }

    #[test]
    fn register_is_idempotent() {
        let mut memo = new_memo();
        let (subset_1, expr_1) = memo.add_new_expr(scan("t1"));
        let timestamp = memo.timestamp();
        let (subset_2, expr_2) = memo.add_new_expr(scan("t1"));
        assert_eq!(subset_1, subset_2);
        assert_eq!(expr_1, expr_2);
        assert_eq!(timestamp, memo.timestamp());
    }

    #[test]
    fn change_traits_creates_converter() {
        let mut memo = new_memo();
        let (subset, _) = memo.add_new_expr(scan("t1"));
        let target = memo.change_traits(subset, &physical_traits());
        assert_ne!(target, subset);
        assert_eq!(memo.subset_traits(target), &physical_traits());
        assert_eq!(memo.set_of_subset(target), memo.set_of_subset(subset));
        let members = memo.exprs_in_subset(target);
        assert_eq!(members.len(), 1);
        let converter = memo.get_expr_memoed(members[0]);
        assert_eq!(converter.typ, TestRelTyp::Converter);
        assert_eq!(converter.children, vec![memo.reduce_subset(subset)]);
        // asking again returns the same subset without a second converter
        assert_eq!(memo.change_traits(subset, &physical_traits()), target);
        assert_eq!(memo.exprs_in_subset(target).len(), 1);
    }

    #[test]
    fn subset_ref_children() {
        let mut memo = new_memo();
        let (scan_subset, _) = memo.add_new_expr(scan("t1"));
        let (subset_1, _) =
            memo.add_new_expr(project(subset_ref(scan_subset), list(vec![expr(Value::Int64(1))])));
        let (subset_2, _) =
            memo.add_new_expr(project(scan("t1"), list(vec![expr(Value::Int64(1))])));
        assert_eq!(subset_1, subset_2);
    }

    #[test]
    fn derive_logical_property() {
        let mut memo = Memo::new(
            Arc::new(registry()),
            Arc::new([Box::new(TestPropertyBuilder)]),
        );
        let (subset, _) = memo.add_new_expr(join(
            scan("t1"),
            project(
                scan("t2"),
                list(vec![expr(Value::Int64(1)), expr(Value::Int64(2))]),
            ),
            expr(Value::Bool(true)),
        ));
        let set = memo.set(memo.set_of_subset(subset));
        assert_eq!(set.properties().len(), 1);
        assert_eq!(
            set.properties()[0]
                .as_any()
                .downcast_ref::<TestProp>()
                .unwrap()
                .0,
            vec!["scan_col", "1", "2"]
        );
    }
}
