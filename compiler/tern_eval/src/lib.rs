//! Tern Eval - reference interpreter for lowered tern IR.
//!
//! Executes the backend vocabulary directly, so lowering passes can be
//! tested by running their output. Reducible nodes are rejected.
//!
//! # Architecture
//!
//! - [`Interpreter`]: tree-walking evaluator over an [`Arena`](tern_ir::Arena)
//! - [`Environment`]: lexical scopes as a parent-linked chain of [`Scope`]s
//! - [`Value`]: runtime values, including cursors and light-exception markers
//! - [`ControlAction`]: jumps and raised exceptions in flight
//!
//! Host functions are plain closures registered by name. Under the light
//! calling convention a failing host call produces a marker value instead
//! of raising.

mod environment;
mod errors;
mod interpreter;
mod value;

pub use environment::{Environment, LocalScope, Scope};
pub use errors::{ControlAction, EvalError, EvalResult};
pub use interpreter::{EvalStats, HostFn, Interpreter};
pub use value::{Closure, CursorState, ExceptionValue, Value};
