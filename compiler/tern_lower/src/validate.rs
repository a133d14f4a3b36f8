//! Output validation.
//!
//! Checks that a lowered tree is something the backend can take: no
//! reducible nodes, no yields, and no jump that leaves a finally or fault
//! body. Enabled by [`LowerOptions::validate_output`](crate::LowerOptions).

use rustc_hash::FxHashSet;
use tern_ir::walk::{self, any_node, Visitor};
use tern_ir::{ensure_sufficient_stack, Arena, LabelId, NodeId, NodeKind};

use crate::LowerError;

/// Validate the lowered tree rooted at `root`.
pub(crate) fn validate(arena: &Arena, root: NodeId) -> Result<(), LowerError> {
    let mut validator = Validator {
        error: None,
        cleanup: Vec::new(),
    };
    validator.visit_node(arena, root);
    match validator.error {
        Some(error) => {
            tracing::debug!(%error, "lowered tree rejected");
            Err(error)
        }
        None => Ok(()),
    }
}

struct Validator {
    /// First problem found; the walk stops descending after it.
    error: Option<LowerError>,
    /// Labels defined in each enclosing finally or fault body, innermost
    /// last.
    cleanup: Vec<FxHashSet<LabelId>>,
}

impl Validator {
    fn in_cleanup(&mut self, arena: &Arena, body: NodeId) {
        self.cleanup.push(labels_within(arena, body));
        ensure_sufficient_stack(|| self.visit_node(arena, body));
        self.cleanup.pop();
    }
}

impl Visitor for Validator {
    fn visit_node(&mut self, arena: &Arena, id: NodeId) {
        if self.error.is_some() {
            return;
        }
        let kind = arena.kind(id);
        match kind {
            _ if kind.is_reducible() => {
                self.error = Some(LowerError::Unlowered { kind: kind.name() });
            }
            NodeKind::Yield { .. } => {
                self.error = Some(LowerError::Unlowered { kind: kind.name() });
            }
            NodeKind::Goto { label, .. } => {
                if let Some(labels) = self.cleanup.last() {
                    if !labels.contains(&label) {
                        self.error = Some(LowerError::JumpOutOfFinally { label });
                        return;
                    }
                }
                walk::walk_node(self, arena, id);
            }
            // A function body starts outside any cleanup.
            NodeKind::Lambda { body, .. } => {
                let enclosing = std::mem::take(&mut self.cleanup);
                ensure_sufficient_stack(|| self.visit_node(arena, body));
                self.cleanup = enclosing;
            }
            NodeKind::Try {
                body,
                handlers,
                finally,
                fault,
            } => {
                self.visit_node(arena, body);
                for handler in arena.catches(handlers) {
                    if let Some(filter) = handler.filter {
                        self.visit_node(arena, filter);
                    }
                    self.visit_node(arena, handler.body);
                }
                for cleanup in finally.into_iter().chain(fault) {
                    self.in_cleanup(arena, cleanup);
                }
            }
            _ => walk::walk_node(self, arena, id),
        }
    }
}

/// Labels a jump may target without leaving `root`.
fn labels_within(arena: &Arena, root: NodeId) -> FxHashSet<LabelId> {
    let mut labels = FxHashSet::default();
    any_node(arena, root, false, &mut |_, kind| {
        match kind {
            NodeKind::Label { label, .. } => {
                labels.insert(label);
            }
            NodeKind::Loop {
                break_label,
                continue_label,
                ..
            } => labels.extend(break_label.into_iter().chain(continue_label)),
            _ => {}
        }
        false
    });
    labels
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
