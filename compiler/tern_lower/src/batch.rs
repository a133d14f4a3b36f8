//! Parallel lowering of independent trees.
//!
//! Each unit owns its arena, and every run gets its own [`LowerCtx`], so
//! units share nothing but the interner. Results come back in input order.

use rayon::prelude::*;
use tern_ir::{Arena, NodeId, StringInterner};

use crate::{lower_in, LowerCtx, LowerError, LowerOptions};

/// One tree to lower: its arena and root.
#[derive(Debug)]
pub struct LowerUnit {
    pub arena: Arena,
    pub root: NodeId,
}

impl LowerUnit {
    pub fn new(arena: Arena, root: NodeId) -> Self {
        LowerUnit { arena, root }
    }
}

/// Lower every unit on the rayon pool.
///
/// A unit that fails keeps its arena as it was after the failed run; the
/// others are unaffected.
pub fn lower_batch(
    units: &mut [LowerUnit],
    interner: &StringInterner,
    options: LowerOptions,
) -> Vec<Result<NodeId, LowerError>> {
    tracing::debug!(
        units = units.len(),
        threads = rayon::current_num_threads(),
        "lowering batch"
    );
    units
        .par_iter_mut()
        .map(|unit| {
            let mut cx = LowerCtx::new(&mut unit.arena, interner, options);
            lower_in(&mut cx, unit.root)
        })
        .collect()
}
