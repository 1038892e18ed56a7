//! The typed SSA intermediate representation the checker consumes.
//!
//! This crate is the abstract input boundary of the core: any front end that
//! produces this vocabulary (blocks, SSA registers, atomic memory operations
//! with explicit orderings, calls to the verifier intrinsics) can drive the
//! checker. Two front ends ship in-tree: a programmatic `ProgramBuilder`
//! used by tests and embedders, and a line-oriented `.wir` text parser used
//! by the binary.
//!
//! Also here: the `SExpr` value-expression algebra and the load annotator
//! that traces `assume` conditions back through SSA, which the driver uses
//! to prune reads that cannot satisfy an assume.

mod annot;
mod builder;
mod inst;
mod module;
mod parser;
mod sexpr;
mod types;

pub use annot::{annotate_module, Annotation};
pub use builder::{FunctionBuilder, ProgramBuilder};
pub use inst::{
    BinOp, BlockId, Callee, CmpPred, FunId, GlobalId, Inst, Intrinsic, Operand, Phi, Reg,
    RmwOp, Terminator,
};
pub use module::{BasicBlock, Function, Global, Module, ModuleInfo, SourceLoc};
pub use parser::parse_module;
pub use sexpr::{eval_bin, eval_cmp, SExpr};
pub use types::Type;

use thiserror::Error;

/// Errors surfaced while building, parsing or validating a module. These are
/// translation errors: they abort before enumeration starts.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("unknown intrinsic `{0}`")]
    UnsupportedIntrinsic(String),
    #[error("unsupported ordering `{0}` for this operation")]
    UnsupportedOrdering(String),
    #[error("malformed module: {0}")]
    MalformedModule(String),
}
