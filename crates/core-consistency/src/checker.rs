use core_config::Model;
use core_event::Event;
use core_graph::ExecutionGraph;
use core_view::View;
use tracing::trace;

use crate::lkmm::{
    ArLkmmCalculator, PbCalculator, PropCalculator, RcuCalculator, RcuFenceCalculator,
    RcuLinkCalculator, XbCalculator,
};
use crate::models::{coherence_ok, ArCalculator, PscCalculator, ScCalculator, TsoCalculator};
use crate::{Calculator, RelationId, RelationStore};

/// Where in the exploration loop a check is requested. Before every step
/// only the cheap coherence-local checks run; errors and complete
/// executions get the full fixpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPoint {
    BeforeStep,
    AtError,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyStatus {
    Ok,
    Inconsistent,
}

/// Runs a model's calculators to fixpoint over a graph.
pub struct ConsistencyChecker {
    model: Model,
    calcs: Vec<Box<dyn Calculator>>,
    store: RelationStore,
}

impl ConsistencyChecker {
    pub fn new(model: Model) -> Self {
        let calcs: Vec<Box<dyn Calculator>> = match model {
            Model::Sc => vec![Box::<ScCalculator>::default()],
            Model::Tso => vec![Box::<TsoCalculator>::default()],
            // RA consistency is fully view-based: coherence-local checks
            // plus the hb views cover it, so no calculators register.
            Model::Ra => vec![],
            Model::Rc11 => vec![Box::<PscCalculator>::default()],
            Model::Imm => vec![Box::<ArCalculator>::default()],
            Model::Lkmm => vec![
                Box::<PropCalculator>::default(),
                Box::<ArLkmmCalculator>::default(),
                Box::<PbCalculator>::default(),
                Box::<RcuLinkCalculator>::default(),
                Box::<RcuCalculator>::default(),
                Box::<RcuFenceCalculator>::default(),
                Box::<XbCalculator>::default(),
            ],
        };
        Self { model, calcs, store: RelationStore::default() }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// The relation whose irreflexivity accepts an execution.
    fn terminal(&self) -> Option<RelationId> {
        match self.model {
            Model::Sc => Some(RelationId::Sc),
            Model::Tso => Some(RelationId::Tso),
            Model::Ra => None,
            Model::Rc11 => Some(RelationId::Psc),
            Model::Imm => Some(RelationId::Ar),
            Model::Lkmm => Some(RelationId::Xb),
        }
    }

    pub fn is_consistent(&mut self, g: &ExecutionGraph, point: CheckPoint) -> ConsistencyStatus {
        if !coherence_ok(g) {
            return ConsistencyStatus::Inconsistent;
        }
        if point == CheckPoint::BeforeStep {
            return ConsistencyStatus::Ok;
        }
        self.run_fixpoint(g)
    }

    fn run_fixpoint(&mut self, g: &ExecutionGraph) -> ConsistencyStatus {
        self.store.clear();
        for calc in &mut self.calcs {
            calc.init(g, &mut self.store);
        }
        let mut consistent;
        let mut rounds = 0u32;
        loop {
            let mut any_changed = false;
            consistent = true;
            for calc in &mut self.calcs {
                let result = calc.step(g, &mut self.store);
                any_changed |= result.changed;
                consistent &= result.irreflexive;
            }
            rounds += 1;
            if !any_changed {
                break;
            }
        }
        // Acceptance hinges on the terminal relation; intermediate
        // relations may legitimately relate an event to itself only via
        // cycles the terminal inherits, which the loop above already
        // folded into `consistent`.
        let terminal_ok = match self.terminal() {
            Some(id) => self
                .store
                .try_get(id)
                .map(|rel| rel.is_irreflexive())
                .unwrap_or(true),
            None => true,
        };
        trace!(
            target: "consistency",
            model = ?self.model,
            rounds,
            consistent,
            terminal_ok,
            "fixpoint"
        );
        if consistent && terminal_ok {
            ConsistencyStatus::Ok
        } else {
            ConsistencyStatus::Inconsistent
        }
    }

    /// Whether `read` may be re-pointed at another write without cutting
    /// the graph: nothing outside the read's own thread suffix depends on
    /// it, so no explored constraint can be invalidated. This is the
    /// predicate guarding in-place revisiting.
    pub fn can_revisit_in_place(&self, g: &ExecutionGraph, read: Event) -> bool {
        if self.model.tracks_deps() {
            return false;
        }
        // The read must be po-maximal in its thread (modulo a trailing
        // block marker) and porf-maximal in the graph.
        let size = g.thread_size(read.thread) as i32;
        for i in (read.index + 1)..size {
            if !g.label(Event::new(read.thread, i)).is_blocking() {
                return false;
            }
        }
        !g.labels().any(|l| {
            l.pos() != read
                && l.pos().thread != read.thread
                && l.porf_view().contains(read)
        })
    }

    pub fn on_restrict(&mut self, preds: &View) {
        for calc in &mut self.calcs {
            calc.on_restrict(preds);
        }
        // Derived relations are rebuilt per check; drop anything stale.
        self.store.clear();
    }

    pub fn on_restore(&mut self, revisited: Event) {
        for calc in &mut self.calcs {
            calc.on_restore(revisited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_event::{
        AAccess, AType, ASize, MemOrdering, SAddr, SVal, ThreadInfo,
    };
    use core_graph::{EventLabel, LabelKind, ReadKind, ReadLabel, WriteKind, WriteLabel};
    use core_view::View as VView;

    fn start(t: i32) -> EventLabel {
        EventLabel::new(
            Event::new(t, 0),
            MemOrdering::Acquire,
            LabelKind::ThreadStart {
                create: Event::initializer(),
                info: ThreadInfo::new(t, -1, 0, SVal::new(0)),
            },
        )
    }

    fn store_lab(pos: Event, addr: SAddr, val: u64, ord: MemOrdering) -> EventLabel {
        EventLabel::new(
            pos,
            ord,
            LabelKind::Write(WriteLabel {
                access: AAccess::new(addr, ASize::new(4), AType::Unsigned),
                value: SVal::new(val),
                kind: WriteKind::Plain,
                attrs: Default::default(),
                msg_view: VView::new(),
            }),
        )
    }

    fn load_lab(pos: Event, addr: SAddr, ord: MemOrdering) -> EventLabel {
        EventLabel::new(
            pos,
            ord,
            LabelKind::Read(ReadLabel {
                access: AAccess::new(addr, ASize::new(4), AType::Unsigned),
                rf: None,
                kind: ReadKind::Plain,
                revisitable: true,
                annot: None,
            }),
        )
    }

    /// Store buffering with both loads reading the initial value: the
    /// classic behavior SC forbids and RC11 allows.
    fn store_buffering(ord: MemOrdering) -> ExecutionGraph {
        let x = SAddr::static_addr(8);
        let y = SAddr::static_addr(16);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.set_init_value(y, SVal::new(0));
        g.append(start(0));
        let wx = g.append(store_lab(Event::new(0, 1), x, 1, ord));
        g.insert_co(x, 0, wx);
        let ry = g.append(load_lab(Event::new(0, 2), y, ord));
        g.set_rf(ry, Some(Event::initializer()));
        g.append(start(1));
        let wy = g.append(store_lab(Event::new(1, 1), y, 1, ord));
        g.insert_co(y, 0, wy);
        let rx = g.append(load_lab(Event::new(1, 2), x, ord));
        g.set_rf(rx, Some(Event::initializer()));
        g
    }

    #[test]
    fn sc_rejects_store_buffering_weak_outcome() {
        let g = store_buffering(MemOrdering::SequentiallyConsistent);
        let mut checker = ConsistencyChecker::new(Model::Sc);
        assert_eq!(checker.is_consistent(&g, CheckPoint::Final), ConsistencyStatus::Inconsistent);
    }

    #[test]
    fn tso_allows_store_buffering_weak_outcome() {
        let g = store_buffering(MemOrdering::SequentiallyConsistent);
        let mut checker = ConsistencyChecker::new(Model::Tso);
        // Under TSO the W->R po pairs are relaxed, so no cycle remains.
        assert_eq!(checker.is_consistent(&g, CheckPoint::Final), ConsistencyStatus::Ok);
    }

    #[test]
    fn rc11_psc_rejects_sc_marked_store_buffering() {
        let g = store_buffering(MemOrdering::SequentiallyConsistent);
        let mut checker = ConsistencyChecker::new(Model::Rc11);
        assert_eq!(checker.is_consistent(&g, CheckPoint::Final), ConsistencyStatus::Inconsistent);
    }

    #[test]
    fn rc11_allows_relaxed_store_buffering() {
        let g = store_buffering(MemOrdering::Relaxed);
        let mut checker = ConsistencyChecker::new(Model::Rc11);
        assert_eq!(checker.is_consistent(&g, CheckPoint::Final), ConsistencyStatus::Ok);
    }

    #[test]
    fn coherence_rejects_hb_contradicting_co() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.append(start(0));
        let w1 = g.append(store_lab(Event::new(0, 1), x, 1, MemOrdering::Relaxed));
        let w2 = g.append(store_lab(Event::new(0, 2), x, 2, MemOrdering::Relaxed));
        // po (hence hb) says w1 before w2; installing co the other way
        // around must be caught by the cheap checks.
        g.insert_co(x, 0, w2);
        g.insert_co(x, 1, w1);
        let mut checker = ConsistencyChecker::new(Model::Ra);
        assert_eq!(
            checker.is_consistent(&g, CheckPoint::BeforeStep),
            ConsistencyStatus::Inconsistent
        );
    }

    #[test]
    fn blocked_read_is_in_place_revisitable() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.append(start(0));
        let r = g.append(load_lab(Event::new(0, 1), x, MemOrdering::Acquire));
        g.set_rf(r, Some(Event::initializer()));
        g.append(EventLabel::new(
            Event::new(0, 2),
            MemOrdering::NotAtomic,
            LabelKind::Assume { kind: core_event::AssumeKind::User },
        ));
        let checker = ConsistencyChecker::new(Model::Rc11);
        assert!(checker.can_revisit_in_place(&g, r));

        // Dependency-tracking models never revisit in place.
        let checker_imm = ConsistencyChecker::new(Model::Imm);
        assert!(!checker_imm.can_revisit_in_place(&g, r));
    }
}
