//! Memory-model consistency checking.
//!
//! A model is a list of calculators, each maintaining one derived relation
//! over the execution graph. The checker composes them into a fixpoint:
//! every round each calculator may extend its relation given the others;
//! the round repeats until nothing changes, and the model's terminal
//! relation must end up irreflexive. Coherence-local checks (per-location
//! write orders, RMW atomicity) run separately and much more often.

mod base;
mod bound;
mod checker;
mod lkmm;
mod models;

pub use bound::{BoundDecider, BoundStrategy};
pub use checker::{CheckPoint, ConsistencyChecker, ConsistencyStatus};

use ahash::AHashMap;
use core_graph::ExecutionGraph;
use core_relation::EventMatrix;
use core_view::View;

/// Names of the derived relations calculators maintain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationId {
    Sc,
    Tso,
    Psc,
    Ar,
    Prop,
    ArLkmm,
    Pb,
    RcuLink,
    Rcu,
    RcuFence,
    Xb,
}

/// Result of one calculator round.
#[derive(Debug, Clone, Copy)]
pub struct CalcResult {
    pub changed: bool,
    pub irreflexive: bool,
}

impl CalcResult {
    pub fn new(changed: bool, irreflexive: bool) -> Self {
        Self { changed, irreflexive }
    }
}

/// Shared storage for derived relations, so calculators can read each
/// other's output (xb reads prop, pb, rcu-fence; ar reads psc).
#[derive(Debug, Default)]
pub struct RelationStore {
    map: AHashMap<RelationId, EventMatrix>,
}

impl RelationStore {
    pub fn set(&mut self, id: RelationId, rel: EventMatrix) {
        self.map.insert(id, rel);
    }

    pub fn get(&self, id: RelationId) -> &EventMatrix {
        self.map.get(&id).expect("relation initialised by its calculator")
    }

    pub fn try_get(&self, id: RelationId) -> Option<&EventMatrix> {
        self.map.get(&id)
    }

    pub fn get_mut(&mut self, id: RelationId) -> &mut EventMatrix {
        self.map.get_mut(&id).expect("relation initialised by its calculator")
    }

    /// Take a relation out to mutate it while reading others.
    pub fn take(&mut self, id: RelationId) -> EventMatrix {
        self.map.remove(&id).expect("relation initialised by its calculator")
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// A module incrementally computing one derived relation.
pub trait Calculator {
    fn id(&self) -> RelationId;

    /// Seed the relation from the graph's primary data.
    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore);

    /// Extend the relation by one inference round given the other
    /// relations.
    fn step(&mut self, g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult;

    /// Keep internal caches consistent when the graph is cut to a view.
    fn on_restrict(&mut self, _preds: &View) {}

    /// Keep internal caches consistent when a saved prefix is restored for
    /// a backward revisit.
    fn on_restore(&mut self, _revisited: core_event::Event) {}
}
