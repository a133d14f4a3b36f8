//! Node arena.
//!
//! Struct-of-arrays layout: `kinds` and `types` are parallel columns indexed
//! by [`NodeId`]. Child lists, catch clauses, switch cases, and variable
//! lists live in flat side tables addressed by ranges. The arena is
//! append-only; rewriting a node means pushing a new one.

use crate::{
    CaseRange, CatchBlock, CatchRange, LabelDef, LabelId, Name, NodeId, NodeKind, NodeRange,
    SwitchCase, Ty, VarDef, VarId, VarRange,
};

/// Convert a table length to a `u32` index.
///
/// # Panics
/// Panics if the table outgrew the `u32` index space.
#[inline]
pub(crate) fn to_u32(len: usize, what: &str) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("too many {what}: {len} exceeds u32::MAX"))
}

/// Convert a list length to a `u16` range length.
///
/// # Panics
/// Panics if a single list is longer than `u16::MAX`.
#[inline]
pub(crate) fn to_u16(len: usize, what: &str) -> u16 {
    u16::try_from(len).unwrap_or_else(|_| panic!("{what} too long: {len} exceeds u16::MAX"))
}

/// Arena owning one IR tree (and everything the passes synthesize for it).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Arena {
    kinds: Vec<NodeKind>,
    types: Vec<Ty>,
    node_lists: Vec<NodeId>,
    catches: Vec<CatchBlock>,
    cases: Vec<SwitchCase>,
    var_lists: Vec<VarId>,
    labels: Vec<LabelDef>,
    vars: Vec<VarDef>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a node without construction checks.
    ///
    /// Passes use this to rebuild a node with rewritten children and an
    /// unchanged type; fresh nodes go through the checked builders.
    pub fn push(&mut self, kind: NodeKind, ty: Ty) -> NodeId {
        let id = NodeId::new(to_u32(self.kinds.len(), "nodes"));
        self.kinds.push(kind);
        self.types.push(ty);
        id
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.kinds[id.index()]
    }

    #[inline]
    pub fn ty(&self, id: NodeId) -> Ty {
        self.types[id.index()]
    }

    /// Number of nodes allocated so far.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    // ── Side tables ─────────────────────────────────────────────────

    pub fn push_nodes(&mut self, ids: &[NodeId]) -> NodeRange {
        if ids.is_empty() {
            return NodeRange::EMPTY;
        }
        let start = to_u32(self.node_lists.len(), "node list entries");
        self.node_lists.extend_from_slice(ids);
        NodeRange::new(start, to_u16(ids.len(), "node list"))
    }

    pub fn nodes(&self, range: NodeRange) -> &[NodeId] {
        let start = range.start as usize;
        &self.node_lists[start..start + range.len()]
    }

    pub fn push_catches(&mut self, handlers: &[CatchBlock]) -> CatchRange {
        if handlers.is_empty() {
            return CatchRange::EMPTY;
        }
        let start = to_u32(self.catches.len(), "catch clauses");
        self.catches.extend_from_slice(handlers);
        CatchRange::new(start, to_u16(handlers.len(), "catch list"))
    }

    pub fn catches(&self, range: CatchRange) -> &[CatchBlock] {
        let start = range.start as usize;
        &self.catches[start..start + range.len()]
    }

    pub fn push_cases(&mut self, cases: &[SwitchCase]) -> CaseRange {
        if cases.is_empty() {
            return CaseRange::EMPTY;
        }
        let start = to_u32(self.cases.len(), "switch cases");
        self.cases.extend_from_slice(cases);
        CaseRange::new(start, to_u16(cases.len(), "case list"))
    }

    pub fn cases(&self, range: CaseRange) -> &[SwitchCase] {
        let start = range.start as usize;
        &self.cases[start..start + range.len()]
    }

    pub fn push_vars(&mut self, vars: &[VarId]) -> VarRange {
        if vars.is_empty() {
            return VarRange::EMPTY;
        }
        let start = to_u32(self.var_lists.len(), "variable list entries");
        self.var_lists.extend_from_slice(vars);
        VarRange::new(start, to_u16(vars.len(), "variable list"))
    }

    pub fn vars(&self, range: VarRange) -> &[VarId] {
        let start = range.start as usize;
        &self.var_lists[start..start + range.len()]
    }

    // ── Labels and variables ────────────────────────────────────────

    /// Declare a new label identity.
    pub fn new_label(&mut self, name: Name, ty: Ty) -> LabelId {
        let id = LabelId::new(to_u32(self.labels.len(), "labels"));
        self.labels.push(LabelDef { name, ty });
        id
    }

    #[inline]
    pub fn label(&self, id: LabelId) -> LabelDef {
        self.labels[id.index()]
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Declare a new variable.
    pub fn new_var(&mut self, name: Name, ty: Ty) -> VarId {
        self.push_var_def(VarDef {
            name,
            ty,
            by_ref: false,
        })
    }

    /// Declare a by-reference lambda parameter.
    pub fn new_ref_param(&mut self, name: Name, ty: Ty) -> VarId {
        self.push_var_def(VarDef {
            name,
            ty,
            by_ref: true,
        })
    }

    fn push_var_def(&mut self, def: VarDef) -> VarId {
        let id = VarId::new(to_u32(self.vars.len(), "variables"));
        self.vars.push(def);
        id
    }

    #[inline]
    pub fn var(&self, id: VarId) -> VarDef {
        self.vars[id.index()]
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }
}
