//! Stack growth for deep recursion.
//!
//! Every recursive walker in the workspace (visitors, rewriters, the
//! interpreter) enters children through [`ensure_sufficient_stack`], so
//! deeply nested trees grow the stack instead of overflowing it.

/// Remaining stack below which a new segment is allocated (128 KiB).
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated segment (1 MiB).
const SEGMENT: usize = 1024 * 1024;

/// Run `f`, first growing the stack if less than [`RED_ZONE`] remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT, f)
}

/// WASM manages its own stack; call through.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
