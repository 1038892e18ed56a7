//! Calculators for the view-based models: SC, TSO, RC11 (psc) and IMM (ar).

use core_event::{Event, MemOrdering};
use core_graph::{ExecutionGraph, LabelKind};
use core_relation::EventMatrix;

use crate::base::{
    collect_carrier, hb, populate_co, populate_fr, populate_po, populate_ppo, populate_rf,
};
use crate::{CalcResult, Calculator, RelationId, RelationStore};

/// Sequential consistency: one total order compatible with program order,
/// reads-from, coherence and from-reads. Seeded completely at init; a step
/// only closes and reports.
#[derive(Debug, Default)]
pub struct ScCalculator;

impl Calculator for ScCalculator {
    fn id(&self) -> RelationId {
        RelationId::Sc
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let mut rel = EventMatrix::new(collect_carrier(g, |l| l.is_mem_access()));
        populate_po(g, &mut rel);
        populate_rf(g, &mut rel, false);
        populate_co(g, &mut rel);
        populate_fr(g, &mut rel);
        store.set(RelationId::Sc, rel);
    }

    fn step(&mut self, _g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let rel = store.get_mut(RelationId::Sc);
        rel.trans_closure();
        CalcResult::new(false, rel.is_irreflexive())
    }
}

/// Total store order: program order with the write-to-read pairs relaxed
/// (store buffering), external reads-from, coherence and from-reads.
/// Fences restore the relaxed pairs through closure.
#[derive(Debug, Default)]
pub struct TsoCalculator;

impl Calculator for TsoCalculator {
    fn id(&self) -> RelationId {
        RelationId::Tso
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let mut rel =
            EventMatrix::new(collect_carrier(g, |l| l.is_mem_access() || l.is_fence()));
        let elems: Vec<Event> = rel.elems().to_vec();
        for &a in &elems {
            for &b in &elems {
                if a.thread != b.thread || a.index >= b.index {
                    continue;
                }
                let la = g.label(a);
                let lb = g.label(b);
                // The store buffer lets a program-order-later read overtake
                // a write; every other pair stays ordered.
                if la.is_write() && lb.is_read() {
                    continue;
                }
                rel.add_edge(a, b);
            }
        }
        populate_rf(g, &mut rel, true);
        populate_co(g, &mut rel);
        populate_fr(g, &mut rel);
        store.set(RelationId::Tso, rel);
    }

    fn step(&mut self, _g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let rel = store.get_mut(RelationId::Tso);
        rel.trans_closure();
        CalcResult::new(false, rel.is_irreflexive())
    }
}

/// RC11 partial SC order over the SC-ordered accesses and fences: an edge
/// wherever happens-before, coherence or from-reads orders two SC events,
/// with fences reached through happens-before hops.
#[derive(Debug, Default)]
pub struct PscCalculator;

impl PscCalculator {
    fn add_psc_edges(g: &ExecutionGraph, rel: &mut EventMatrix) -> bool {
        let elems: Vec<Event> = rel.elems().to_vec();
        let mut changed = false;
        for &a in &elems {
            for &b in &elems {
                if a == b || rel.has(a, b) {
                    continue;
                }
                if Self::scb(g, a, b) {
                    changed |= rel.add_edge(a, b);
                }
            }
        }
        changed
    }

    /// SC-before: hb directly, or a co/fr step between accesses reachable
    /// from `a` and reaching `b` through optional hb hops (the hops carry
    /// fences into the order).
    fn scb(g: &ExecutionGraph, a: Event, b: Event) -> bool {
        if hb(g, a, b) {
            return true;
        }
        let step = |x: Event, y: Event| -> bool {
            let lx = g.label(x);
            if lx.is_write() && g.label(y).is_write() {
                let addr = lx.addr_of().expect("writes have addresses");
                if g.label(y).addr_of() == Some(addr) {
                    if let (Some(i), Some(j)) =
                        (g.co_index_of(addr, x), g.co_index_of(addr, y))
                    {
                        return i < j;
                    }
                }
            }
            if lx.is_read() && g.label(y).is_write() {
                if let Some(w) = lx.rf_of() {
                    let addr = lx.addr_of().expect("reads have addresses");
                    if g.label(y).addr_of() == Some(addr) && y != w {
                        let yi = g.co_index_of(addr, y);
                        let wi = if w.is_initializer() {
                            None
                        } else {
                            g.co_index_of(addr, w)
                        };
                        return match (wi, yi) {
                            (None, Some(_)) => true,
                            (Some(i), Some(j)) => i < j,
                            _ => false,
                        };
                    }
                }
            }
            false
        };
        // a (hb?) x -co/fr-> y (hb?) b, with the hb hops taken only when the
        // endpoint is a fence (accesses connect directly).
        let mut xs = vec![a];
        if g.label(a).is_fence() {
            xs.extend(rel_candidates(g, |x| hb(g, a, x)));
        }
        for &x in &xs {
            let mut ys = vec![b];
            if g.label(b).is_fence() {
                ys.extend(rel_candidates(g, |y| hb(g, y, b)));
            }
            for &y in &ys {
                if g.try_label(x).is_some_and(|l| l.is_mem_access())
                    && g.try_label(y).is_some_and(|l| l.is_mem_access())
                    && step(x, y)
                {
                    return true;
                }
            }
        }
        false
    }
}

fn rel_candidates(g: &ExecutionGraph, keep: impl Fn(Event) -> bool) -> Vec<Event> {
    g.labels()
        .map(|l| l.pos())
        .filter(|&e| keep(e))
        .collect()
}

impl Calculator for PscCalculator {
    fn id(&self) -> RelationId {
        RelationId::Psc
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let rel = EventMatrix::new(collect_carrier(g, |l| {
            l.is_sc() && (l.is_mem_access() || l.is_fence())
        }));
        store.set(RelationId::Psc, rel);
    }

    fn step(&mut self, g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let mut rel = store.take(RelationId::Psc);
        let changed = Self::add_psc_edges(g, &mut rel);
        rel.trans_closure();
        let irreflexive = rel.is_irreflexive();
        store.set(RelationId::Psc, rel);
        CalcResult::new(changed, irreflexive)
    }
}

/// IMM acyclicity relation: dependency-restricted program order (from the
/// ppo views), external reads-from, and the SC axioms' contribution over
/// SC-ordered events.
#[derive(Debug, Default)]
pub struct ArCalculator;

impl Calculator for ArCalculator {
    fn id(&self) -> RelationId {
        RelationId::Ar
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let mut rel =
            EventMatrix::new(collect_carrier(g, |l| l.is_mem_access() || l.is_fence()));
        populate_ppo(g, &mut rel);
        populate_rf(g, &mut rel, true);
        rel.trans_closure();
        store.set(RelationId::Ar, rel);
    }

    fn step(&mut self, g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let mut rel = store.take(RelationId::Ar);
        let elems: Vec<Event> = rel.elems().to_vec();
        let mut changed = false;
        // SC accesses feed their co/fr/hb ordering into ar.
        for &a in &elems {
            for &b in &elems {
                if a == b || rel.has(a, b) {
                    continue;
                }
                let (la, lb) = (g.label(a), g.label(b));
                if la.ordering() == MemOrdering::SequentiallyConsistent
                    && lb.ordering() == MemOrdering::SequentiallyConsistent
                    && PscCalculator::scb(g, a, b)
                {
                    changed |= rel.add_edge(a, b);
                }
            }
        }
        rel.trans_closure();
        let irreflexive = rel.is_irreflexive();
        store.set(RelationId::Ar, rel);
        CalcResult::new(changed, irreflexive)
    }
}

/// The coherence-local checks every model shares: per-location coherence
/// must agree with happens-before, and a write feeds at most one successful
/// RMW.
pub(crate) fn coherence_ok(g: &ExecutionGraph) -> bool {
    // Write-write: a co-earlier write must not be hb-after a co-later one,
    // and a read must not observe a store overwritten in its hb-past.
    for label in g.labels() {
        match label.kind() {
            LabelKind::Write(w) => {
                let pos = label.pos();
                let addr = w.access.addr;
                let Some(i) = g.co_index_of(addr, pos) else { continue };
                for &later in &g.co(addr)[i + 1..] {
                    if hb(g, later, pos) {
                        return false;
                    }
                }
            }
            LabelKind::Read(r) => {
                let Some(w) = r.rf else { continue };
                let addr = r.access.addr;
                let wi = if w.is_initializer() {
                    None
                } else {
                    match g.co_index_of(addr, w) {
                        Some(i) => Some(i),
                        None => continue,
                    }
                };
                // A coherence-later store in the read's (rf?;hb)-past hides
                // w, directly or through one of its readers.
                let start = wi.map_or(0, |i| i + 1);
                for &later in &g.co(addr)[start..] {
                    if later != label.pos() && g.is_write_rf_before(label.hb_view(), later)
                    {
                        return false;
                    }
                }
                // A program-order-later write to the location must land
                // coherence-after the observed store.
                if let Some(wi) = wi {
                    let pos = label.pos();
                    for later_lab in &g.thread_labels(pos.thread)[pos.index as usize + 1..]
                    {
                        let Some(w2) = later_lab.as_write() else { continue };
                        if w2.access.addr != addr {
                            continue;
                        }
                        if let Some(j) = g.co_index_of(addr, later_lab.pos()) {
                            if j <= wi {
                                return false;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    // RMW atomicity: no write is read by two successful RMWs.
    let mut rmw_sources: Vec<Event> = Vec::new();
    for label in g.labels() {
        let Some(r) = label.as_read() else { continue };
        if !r.is_rmw() || !rmw_succeeds(g, label.pos()) {
            continue;
        }
        let Some(w) = r.rf else { continue };
        if rmw_sources.contains(&w) {
            return false;
        }
        rmw_sources.push(w);
    }
    true
}

/// Whether the RMW read at `pos` completes with a paired write (a FAI
/// always does; a CAS only when it observed its expected value).
pub(crate) fn rmw_succeeds(g: &ExecutionGraph, pos: Event) -> bool {
    let r = g.label(pos).as_read().expect("RMW read");
    match &r.kind {
        core_graph::ReadKind::Cas { expected, .. } => {
            g.value_read(pos).is_some_and(|v| v == *expected)
        }
        core_graph::ReadKind::Fai { .. } => true,
        _ => false,
    }
}
