//! Label resolution.
//!
//! Maps every label identity in a unit to the protected region that
//! defines it, ahead of any rewriting, so a jump can be classified the
//! moment it is met even when its label is defined further down the tree.

use rustc_hash::{FxHashMap, FxHashSet};
use tern_ir::walk::{self, Visitor};
use tern_ir::{ensure_sufficient_stack, Arena, LabelId, NodeId, NodeKind};

use crate::LowerError;

/// Which part of a `Try` a region is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Part {
    Body,
    Handler(u16),
    Finally,
    Fault,
}

impl Part {
    /// Finally and fault bodies may not be jumped out of directly.
    pub fn is_cleanup(self) -> bool {
        matches!(self, Part::Finally | Part::Fault)
    }
}

/// A lexical region delimited by protected-region boundaries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegionKey {
    /// Outside every `Try` of the unit.
    Root,
    Try { node: NodeId, part: Part },
}

/// Label identity -> defining region.
#[derive(Debug, Default)]
pub struct LabelScopes {
    defs: FxHashMap<LabelId, RegionKey>,
    ambiguous: FxHashSet<LabelId>,
}

impl LabelScopes {
    /// Resolve every label defined under `root`, stopping at nested units.
    pub fn resolve(arena: &Arena, root: NodeId) -> Self {
        let mut resolver = Resolver {
            scopes: LabelScopes::default(),
            regions: vec![RegionKey::Root],
        };
        resolver.visit_node(arena, root);
        tracing::trace!(
            labels = resolver.scopes.defs.len(),
            ambiguous = resolver.scopes.ambiguous.len(),
            "resolved labels"
        );
        resolver.scopes
    }

    /// Region defining `label`.
    ///
    /// Labels defined outside the unit resolve to [`RegionKey::Root`].
    /// Labels defined in two different regions are an error.
    pub fn region_of(&self, label: LabelId) -> Result<RegionKey, LowerError> {
        if self.ambiguous.contains(&label) {
            return Err(LowerError::AmbiguousLabel { label });
        }
        Ok(self.defs.get(&label).copied().unwrap_or(RegionKey::Root))
    }

    pub fn is_defined(&self, label: LabelId) -> bool {
        self.defs.contains_key(&label)
    }

    fn define(&mut self, label: LabelId, region: RegionKey) {
        match self.defs.get(&label) {
            Some(&existing) if existing != region => {
                self.ambiguous.insert(label);
            }
            Some(_) => {}
            None => {
                self.defs.insert(label, region);
            }
        }
    }
}

struct Resolver {
    scopes: LabelScopes,
    regions: Vec<RegionKey>,
}

impl Resolver {
    fn current(&self) -> RegionKey {
        self.regions.last().copied().unwrap_or(RegionKey::Root)
    }

    fn in_region(&mut self, arena: &Arena, key: RegionKey, id: NodeId) {
        self.regions.push(key);
        ensure_sufficient_stack(|| self.visit_node(arena, id));
        self.regions.pop();
    }
}

impl Visitor for Resolver {
    fn visit_node(&mut self, arena: &Arena, id: NodeId) {
        match arena.kind(id) {
            NodeKind::Lambda { .. } | NodeKind::Generator { .. } => {}
            NodeKind::Label { label, .. } => {
                self.scopes.define(label, self.current());
                walk::walk_node(self, arena, id);
            }
            NodeKind::Loop {
                break_label,
                continue_label,
                ..
            } => {
                let region = self.current();
                for label in break_label.into_iter().chain(continue_label) {
                    self.scopes.define(label, region);
                }
                walk::walk_node(self, arena, id);
            }
            NodeKind::Try {
                body,
                handlers,
                finally,
                fault,
            } => {
                let part = |part| RegionKey::Try { node: id, part };
                self.in_region(arena, part(Part::Body), body);
                for (i, handler) in arena.catches(handlers).iter().enumerate() {
                    let key = part(Part::Handler(u16::try_from(i).unwrap_or(u16::MAX)));
                    if let Some(filter) = handler.filter {
                        self.in_region(arena, key, filter);
                    }
                    self.in_region(arena, key, handler.body);
                }
                if let Some(finally) = finally {
                    self.in_region(arena, part(Part::Finally), finally);
                }
                if let Some(fault) = fault {
                    self.in_region(arena, part(Part::Fault), fault);
                }
            }
            _ => walk::walk_node(self, arena, id),
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
