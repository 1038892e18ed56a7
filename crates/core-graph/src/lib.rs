//! The execution graph: per-thread sequences of labels, reads-from edges,
//! per-location coherence orders, and the queries the exploration driver
//! needs (coherent stores, revisit candidates, prefix extraction, stamp
//! restriction).
//!
//! The graph owns every label. Cross-references are by `Event` position or
//! by stamp; no label points at another label. Labels are mutated only to
//! re-target reads-from, to flip revisitability, or to record join
//! backlinks; everything else is append and cut.

mod coherence;
mod graph;
mod label;
mod render;
mod restrict;

pub use graph::ExecutionGraph;
pub use label::{
    DiskWriteKind, EventLabel, LabelKind, ReadKind, ReadLabel, WriteKind, WriteLabel,
};
pub use restrict::{CoPlacing, SavedPrefix};
