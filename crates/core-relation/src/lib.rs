//! Relations over execution events, stored as boolean adjacency matrices.
//!
//! Calculators build derived relations (hb, psc, prop, xb, ...) by seeding a
//! matrix over a carrier of events and then closing it under inference
//! rounds. The operations here are exactly what those calculators need:
//! edge insertion, transitive closure, irreflexivity, SCC condensation and a
//! callback DFS for the counted-constraint walks.

mod dfs;
mod matrix;

pub use dfs::{DfsEdge, DfsVisitor};
pub use matrix::EventMatrix;
