// Copyright (c) 2023-2024 CMU Database Group
//
// Use of this source code is governed by an MIT-style license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The metadata framework: table-driven dispatch from `(metadata kind, operator variant)` to
//! a handler, with chaining and a timestamp-stamped cache.
//!
//! Handlers are registered per operator discriminant at session construction; a query tries
//! the variant-specific handlers first, then the kind's fallback chain, and the first handler
//! returning a value wins. Results are cached keyed by `(kind, target, args)` together with
//! the memo timestamp; stale entries are recomputed and `None` results are never cached.
//! Queries are re-entrant: a handler may issue further queries through the same handle.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::mem::Discriminant;
use std::sync::Arc;

use crate::nodes::NodeType;
use crate::volcano::{ExprId, Memo, PredId, SubsetId, Winner};

/// An opaque capability token naming one metadata kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MetadataKind(pub &'static str);

impl Display for MetadataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A query target: either a concrete registered expression or a whole subset (resolved to a
/// deterministic representative member).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MetaTarget {
    Expr(ExprId),
    Subset(SubsetId),
}

impl From<ExprId> for MetaTarget {
    fn from(expr: ExprId) -> Self {
        MetaTarget::Expr(expr)
    }
}

impl From<SubsetId> for MetaTarget {
    fn from(subset: SubsetId) -> Self {
        MetaTarget::Subset(subset)
    }
}

/// A set of column indices, kept sorted and deduplicated.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct ColumnSet(Vec<usize>);

impl ColumnSet {
    pub fn new(columns: impl IntoIterator<Item = usize>) -> Self {
        let mut columns: Vec<usize> = columns.into_iter().collect();
        columns.sort_unstable();
        columns.dedup();
        Self(columns)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, column: usize) -> bool {
        self.0.binary_search(&column).is_ok()
    }

    pub fn is_subset_of(&self, other: &ColumnSet) -> bool {
        self.0.iter().all(|column| other.contains(*column))
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies a column mapping, dropping columns the mapping does not cover.
    pub fn map(&self, f: impl Fn(usize) -> Option<usize>) -> ColumnSet {
        ColumnSet::new(self.iter().filter_map(&f))
    }
}

impl Display for ColumnSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (idx, column) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", column)?;
        }
        write!(f, "}}")
    }
}

/// One argument of a metadata query. Arguments are part of the cache key; predicates are
/// passed interned so the key stays cheap to hash.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MetaArg {
    Null,
    Bool(bool),
    Index(usize),
    Cols(ColumnSet),
    Pred(PredId),
}

pub type ArcMetaValue = Arc<dyn Any + Send + Sync>;

pub type MetadataHandler<T> =
    Arc<dyn for<'a> Fn(&MetadataQuery<'a, T>, ExprId, &[MetaArg]) -> Option<ArcMetaValue> + Send + Sync>;

/// The handler table. Populated once at session construction.
pub struct MetadataRegistry<T: NodeType> {
    handlers: HashMap<(MetadataKind, Discriminant<T>), Vec<MetadataHandler<T>>>,
    fallbacks: HashMap<MetadataKind, Vec<MetadataHandler<T>>>,
}

impl<T: NodeType> MetadataRegistry<T> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallbacks: HashMap::new(),
        }
    }

    /// Registers a handler for one operator variant (matched by discriminant). Handlers for
    /// the same `(kind, variant)` chain in registration order.
    pub fn register(&mut self, kind: MetadataKind, variant: &T, handler: MetadataHandler<T>) {
        self.handlers
            .entry((kind, std::mem::discriminant(variant)))
            .or_default()
            .push(handler);
    }

    /// Registers a handler tried for every variant after the variant-specific chain.
    pub fn register_fallback(&mut self, kind: MetadataKind, handler: MetadataHandler<T>) {
        self.fallbacks.entry(kind).or_default().push(handler);
    }

    fn handlers_for<'a>(
        &'a self,
        kind: MetadataKind,
        typ: &T,
    ) -> impl Iterator<Item = &'a MetadataHandler<T>> {
        let specific = self
            .handlers
            .get(&(kind, std::mem::discriminant(typ)))
            .map(|chain| chain.as_slice())
            .unwrap_or(&[]);
        let fallback = self
            .fallbacks
            .get(&kind)
            .map(|chain| chain.as_slice())
            .unwrap_or(&[]);
        specific.iter().chain(fallback.iter())
    }
}

pub(crate) type MetadataCache =
    HashMap<(MetadataKind, MetaTarget, Vec<MetaArg>), (u64, ArcMetaValue)>;

/// A borrow of the session's memo, handler table, and cache through which metadata is
/// queried. Handlers receive the same handle, so derivations compose.
pub struct MetadataQuery<'a, T: NodeType> {
    memo: &'a Memo<T>,
    registry: &'a MetadataRegistry<T>,
    cache: &'a RefCell<MetadataCache>,
}

impl<'a, T: NodeType> MetadataQuery<'a, T> {
    pub(crate) fn new(
        memo: &'a Memo<T>,
        registry: &'a MetadataRegistry<T>,
        cache: &'a RefCell<MetadataCache>,
    ) -> Self {
        Self {
            memo,
            registry,
            cache,
        }
    }

    pub fn memo(&self) -> &'a Memo<T> {
        self.memo
    }

    pub fn query(
        &self,
        kind: MetadataKind,
        target: impl Into<MetaTarget>,
        args: &[MetaArg],
    ) -> Option<ArcMetaValue> {
        let target = target.into();
        let key = (kind, target, args.to_vec());
        let stamp = self.memo.timestamp();
        if let Some((cached_stamp, value)) = self.cache.borrow().get(&key) {
            if *cached_stamp == stamp {
                return Some(value.clone());
            }
        }
        let expr = self.representative(target)?;
        let typ = self.memo.get_expr_memoed(expr).typ.clone();
        let mut result = None;
        for handler in self.registry.handlers_for(kind, &typ) {
            if let Some(value) = handler(self, expr, args) {
                result = Some(value);
                break;
            }
        }
        if let Some(value) = &result {
            self.cache.borrow_mut().insert(key, (stamp, value.clone()));
        }
        result
    }

    /// `query` plus a downcast to the expected value type.
    pub fn query_as<V: Clone + 'static>(
        &self,
        kind: MetadataKind,
        target: impl Into<MetaTarget>,
        args: &[MetaArg],
    ) -> Option<V> {
        self.query(kind, target, args)
            .and_then(|value| value.downcast_ref::<V>().cloned())
    }

    /// Resolves a target to the expression the handlers run on: the expression itself, or
    /// for a subset its decided winner, falling back to the set's lowest-id member so
    /// logical derivations stay deterministic before costing.
    fn representative(&self, target: MetaTarget) -> Option<ExprId> {
        match target {
            MetaTarget::Expr(expr) => Some(self.memo.reduce_expr(expr)),
            MetaTarget::Subset(subset) => {
                let subset = self.memo.reduce_subset(subset);
                if let Winner::Full(info) = &self.memo.subset_info(subset).winner {
                    return Some(self.memo.reduce_expr(info.expr_id));
                }
                let set = self.memo.set_of_subset(subset);
                self.memo.exprs_in_set(set).into_iter().next()
            }
        }
    }
}
