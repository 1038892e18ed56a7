//! The IR interpreter.
//!
//! Execution is cooperative: the driver picks a thread and asks for its
//! next event of interest; the interpreter folds pure computation and
//! suspends when it hits a memory or synchronization operation, handing
//! the driver a pending event to turn into a label. For loads the driver
//! feeds the observed value back before the thread can move again.
//!
//! Shared-memory values live in the execution graph, not here: a load's
//! value is whatever its reads-from edge says. The interpreter owns only
//! thread-local state (frames, SSA registers, dependency tracking) and the
//! address arena.

mod arena;
mod deps;
mod exec;
mod thread;

pub use arena::Arena;
pub use deps::DepTracker;
pub use exec::Interpreter;
pub use thread::{ThreadState, ThreadStatus};

use core_event::{AAccess, AssumeKind, EventDeps, MemOrdering, SAddr, SVal, SmpFenceKind};
use core_event::{AddressSpace, StorageDuration, WriteAttr};
use core_graph::{ReadKind, WriteKind};
use core_ir::{Annotation, FunId};
use thiserror::Error;

/// A suspension point: the event the current thread wants to perform.
/// The driver owns positions and stamps; the pending event carries only
/// the payload.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub ord: MemOrdering,
    pub deps: EventDeps,
    pub kind: PendingKind,
}

#[derive(Debug, Clone)]
pub enum PendingKind {
    Load {
        access: AAccess,
        kind: ReadKind,
        annot: Option<Annotation>,
    },
    Store {
        access: AAccess,
        value: SVal,
        kind: WriteKind,
        attrs: WriteAttr,
    },
    Fence,
    SmpFence { kind: SmpFenceKind },
    ThreadCreate { fun: FunId, arg: SVal },
    ThreadJoin { tid: i32 },
    Malloc { addr: SAddr, size: u64, duration: StorageDuration, space: AddressSpace },
    Free { addr: SAddr },
    RcuLock,
    RcuUnlock,
    RcuSync,
    DskOpen { path: String, fd: SVal },
    DskFsync { inode: SAddr, size: u64 },
    DskSync,
    DskPbarrier,
    /// An assume whose condition is false: the thread parks.
    AssumeBlocked { kind: AssumeKind },
    /// A speculative block: the body of an optional is skipped unless the
    /// driver chooses to expand it.
    OptBegin,
    /// A lock acquisition that observed the lock taken: the thread parks
    /// until a revisit hands its CAS a free lock.
    LockBlocked,
}

/// What `step` produced for a thread.
#[derive(Debug, Clone)]
pub enum StepResult {
    /// An event of interest; the driver appends a label. Loads must be
    /// answered with `resume_with` before the next step.
    Event(PendingEvent),
    /// The thread's body returned; the driver appends the finish label.
    Finished { result: SVal },
    /// Finished or blocked already; nothing to do.
    Idle,
}

/// User-program errors the interpreter detects while executing. They
/// become the verdict of the current execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpError {
    #[error("assertion failure")]
    AssertionFailure,
    #[error("uninitialized value used in {0}")]
    UninitializedRead(&'static str),
    #[error("invalid free of {0}")]
    InvalidFree(SAddr),
    #[error("access out of bounds at {0}")]
    AccessOutOfBounds(SAddr),
    #[error("unaligned atomic access at {0}")]
    UnalignedAtomic(SAddr),
    #[error("call through a non-function value")]
    BadIndirectCall,
    #[error("join of unknown thread {0}")]
    BadJoin(i64),
    #[error("unreachable code executed")]
    UnreachableExecuted,
}
