//! Tern Lower - lowering passes for the tern IR.
//!
//! Three reducible constructs reach the backend only in lowered form:
//! - `Generator`: rewritten into a resumable state machine ([`generator`])
//! - `FinallyFlowControl`: jumps out of finally/fault bodies routed through
//!   a post-try dispatch ([`flow`])
//! - `LightScope` / `LightCall`: failures propagated as marker values and
//!   checked after each call ([`light`])
//!
//! # Architecture
//!
//! - [`Rewriter`]: the rebuilding tree fold every pass is written against
//! - [`reduce_node`]: the per-node reduce protocol, memoized per context
//! - [`lower`]: the generic consumer that reduces everything it meets
//! - [`spill_operands`]: evaluation-order preservation around suspensions
//! - [`lower_batch`]: independent trees lowered in parallel
//!
//! Every run owns a [`LowerCtx`]; nothing is global, so contexts never
//! interfere.

mod batch;
mod context;
mod error;
mod flow;
mod generator;
mod light;
mod options;
mod reduce;
mod resolve;
pub mod rewrite;
mod spill;
mod trace;
mod validate;

pub use batch::{lower_batch, LowerUnit};
pub use context::LowerCtx;
pub use error::{LowerError, Unsupported};
pub use flow::FLOW_NONE;
pub use generator::{FINISHED, GOTO_ROUTER_NONE, GOTO_ROUTER_YIELDING, NOT_STARTED};
pub use options::LowerOptions;
pub use reduce::{lower, lower_in, reduce_for_light, reduce_node};
pub use resolve::{LabelScopes, Part, RegionKey};
pub use rewrite::Rewriter;
pub use spill::{make_assign, spill_operands, Spilled};
pub use trace::{init_tracing, LOG_ENV};
