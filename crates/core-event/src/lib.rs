//! Event vocabulary shared by every layer of the checker: event identifiers
//! and stamps, memory orderings, structured addresses and scalar values,
//! dependency sets, and thread metadata.
//!
//! Everything here is plain data. The label sum type that combines these
//! pieces lives in `core-graph`, next to the structure that owns the labels.

mod addr;
mod deps;
mod event;
mod ordering;
mod value;

pub use addr::{AAccess, AType, AddressSpace, ASize, SAddr, StorageDuration, StorageType};
pub use deps::{DepInfo, EventDeps};
pub use event::{Event, Stamp};
pub use ordering::{MemOrdering, SmpFenceKind};
pub use value::SVal;

use bitflags::bitflags;

bitflags! {
    /// Attributes a write label may carry on top of its kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WriteAttr: u8 {
        /// Not observable by other threads (e.g. inits of escaping allocas).
        const LOCAL = 0x1;
        /// Annotated as the final write to its location.
        const FINAL = 0x2;
        /// Participates in a tolerated write-write race.
        const WW_RACY = 0x4;
    }
}

/// Classifies an `assume` by what produced it, so blocking reports and the
/// spinloop machinery can tell user assumptions apart from lowerings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssumeKind {
    User,
    Barrier,
    Spinloop,
}

/// Information about a simulated thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Thread identifier (index into the graph's thread list).
    pub id: i32,
    /// Identifier of the parent thread, -1 for the main thread.
    pub parent_id: i32,
    /// Function id of the thread body (argument to thread-create).
    pub fun_id: u32,
    /// Argument passed to the thread body.
    pub arg: SVal,
    /// Id of the previous symmetric thread, -1 if none.
    pub symm_id: i32,
}

impl ThreadInfo {
    pub fn new(id: i32, parent_id: i32, fun_id: u32, arg: SVal) -> Self {
        Self { id, parent_id, fun_id, arg, symm_id: -1 }
    }

    pub fn with_symmetry(mut self, symm_id: i32) -> Self {
        self.symm_id = symm_id;
        self
    }
}
