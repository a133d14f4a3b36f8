//! Tern IR - typed tree intermediate representation.
//!
//! The data model every lowering pass reads and produces:
//! - [`Arena`]: struct-of-arrays node storage indexed by [`NodeId`]
//! - [`NodeKind`]: the closed node vocabulary, `Copy`, children by index
//! - [`Ty`]: static result types
//! - [`StringInterner`] / [`Name`]: interned debug names and host symbols
//! - Checked builders (`Arena::assign`, `Arena::goto`, ...) that reject
//!   ill-typed trees with [`IrError`]
//!
//! # Design Philosophy
//!
//! - **Flatten Everything**: no `Box<Node>`, children are `NodeId` indices
//! - **Immutable Nodes**: passes push replacements, never mutate in place
//! - **Labels by Identity**: `LabelId` indexes a label table, so forward
//!   references need no back-patching

/// Compile-time assertion that a type has a specific size.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

mod arena;
mod build;
mod error;
mod ids;
mod interner;
mod name;
mod node;
mod stack;
mod ty;
pub mod walk;

pub use arena::Arena;
pub use error::IrError;
pub use ids::{CaseRange, CatchRange, LabelId, NodeId, NodeRange, VarId, VarRange};
pub use interner::{InternError, StringInterner};
pub use name::Name;
pub use node::{
    BinaryOp, CallConv, CatchBlock, GeneratorShape, GotoKind, Intrinsic, LabelDef, Literal,
    NodeKind, SwitchCase, UnaryOp, VarDef,
};
pub use stack::ensure_sufficient_stack;
pub use ty::Ty;
