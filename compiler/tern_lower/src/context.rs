//! Per-invocation lowering state.

use rustc_hash::FxHashMap;
use tern_ir::{Arena, LabelId, Name, NodeId, StringInterner, Ty, VarId};

use crate::LowerOptions;

/// Everything one lowering run owns.
///
/// The reduce memo and the name counter live here rather than on the
/// nodes or in globals, so independent trees can be lowered concurrently
/// with one context each.
pub struct LowerCtx<'a> {
    pub arena: &'a mut Arena,
    pub interner: &'a StringInterner,
    pub options: LowerOptions,
    /// Reducible node -> its reduced form. Each node reduces at most once.
    pub(crate) memo: FxHashMap<NodeId, NodeId>,
    counter: u32,
}

impl<'a> LowerCtx<'a> {
    pub fn new(arena: &'a mut Arena, interner: &'a StringInterner, options: LowerOptions) -> Self {
        Self {
            arena,
            interner,
            options,
            memo: FxHashMap::default(),
            counter: 0,
        }
    }

    /// Mint a name for a synthesized label or variable.
    ///
    /// Every call advances the counter; the suffix only appears with
    /// `debug_names`.
    pub fn fresh_name(&mut self, base: &str) -> Name {
        let n = self.counter;
        self.counter = self.counter.wrapping_add(1);
        if self.options.debug_names {
            self.interner.intern(&format!("{base}{n}"))
        } else {
            self.interner.intern(base)
        }
    }

    pub fn fresh_label(&mut self, base: &str, ty: Ty) -> LabelId {
        let name = self.fresh_name(base);
        self.arena.new_label(name, ty)
    }

    pub fn fresh_var(&mut self, base: &str, ty: Ty) -> VarId {
        let name = self.fresh_name(base);
        self.arena.new_var(name, ty)
    }

    /// Number of reductions performed so far.
    pub fn reduced_count(&self) -> usize {
        self.memo.len()
    }
}
