//! The LKMM calculator family: prop, ar-lkmm, pb, rcu-link, rcu,
//! rcu-fence and the terminal xb relation.
//!
//! Only marked accesses (atomic, in LKMM parlance) and strong fences
//! participate in prop/pb; the rcu relations quotient over read-side
//! critical sections and grace periods, propagating the counted constraint
//! (a chain with at least as many grace periods as critical sections
//! orders its endpoints) along rcu-link paths.

use core_event::Event;
use core_graph::{EventLabel, ExecutionGraph, LabelKind};
use core_relation::EventMatrix;

use crate::base::{collect_carrier, hb, populate_ppo, populate_rf};
use crate::{CalcResult, Calculator, RelationId, RelationStore};

/// Whether a label participates in prop/xb (marked access, strong fence,
/// or an RCU event).
pub(crate) fn is_marked(label: &EventLabel) -> bool {
    if label.is_mem_access() {
        return label.ordering().is_atomic();
    }
    match label.kind() {
        LabelKind::SmpFence { kind } => kind.is_strong(),
        LabelKind::RcuLock | LabelKind::RcuUnlock | LabelKind::RcuSync => true,
        _ => false,
    }
}

fn is_strong_fence(label: &EventLabel) -> bool {
    matches!(label.kind(), LabelKind::SmpFence { kind } if kind.is_strong())
        || matches!(label.kind(), LabelKind::RcuSync)
}

/// Whether `a` propagates (via the relation or happens-before) into the
/// po-prefix of the fence `f`, the trigger for cumulative fences.
fn reaches_prefix_of(
    g: &ExecutionGraph,
    rel: &EventMatrix,
    a: Event,
    f: Event,
) -> bool {
    (0..=f.index).any(|i| {
        let e = Event::new(f.thread, i);
        rel.has(a, e) || hb(g, a, e)
    })
}

/// Cumulative propagation: overwrite (co/fr) and external reads-from edges
/// between marked events, extended across strong fences.
#[derive(Debug, Default)]
pub struct PropCalculator;

impl PropCalculator {
    fn base_edge(g: &ExecutionGraph, a: Event, b: Event) -> bool {
        let (la, lb) = (g.label(a), g.label(b));
        if !(la.is_mem_access() && lb.is_mem_access()) {
            return false;
        }
        if la.addr_of() != lb.addr_of() {
            return false;
        }
        let addr = la.addr_of().expect("accesses have addresses");
        if la.is_write() && lb.is_write() {
            if let (Some(i), Some(j)) = (g.co_index_of(addr, a), g.co_index_of(addr, b)) {
                return i < j;
            }
        }
        if la.is_read() && lb.is_write() {
            let Some(w) = la.rf_of() else { return false };
            let wi = if w.is_initializer() { None } else { g.co_index_of(addr, w) };
            let bi = g.co_index_of(addr, b);
            return match (wi, bi) {
                (None, Some(_)) => b != w,
                (Some(i), Some(j)) => i < j,
                _ => false,
            };
        }
        if la.is_write() && lb.is_read() {
            return lb.rf_of() == Some(a) && a.thread != b.thread;
        }
        false
    }
}

impl Calculator for PropCalculator {
    fn id(&self) -> RelationId {
        RelationId::Prop
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let mut rel = EventMatrix::new(collect_carrier(g, is_marked));
        let elems: Vec<Event> = rel.elems().to_vec();
        for &a in &elems {
            for &b in &elems {
                if a != b && Self::base_edge(g, a, b) {
                    rel.add_edge(a, b);
                }
            }
        }
        store.set(RelationId::Prop, rel);
    }

    fn step(&mut self, g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let mut rel = store.take(RelationId::Prop);
        let elems: Vec<Event> = rel.elems().to_vec();
        let mut changed = false;
        // A strong fence makes propagation cumulative: everything prop- or
        // hb-before any event in the fence's po-prefix propagates to
        // everything po-after the fence.
        for &f in &elems {
            if !is_strong_fence(g.label(f)) {
                continue;
            }
            for &a in &elems {
                if a == f || !reaches_prefix_of(g, &rel, a, f) {
                    continue;
                }
                for &b in &elems {
                    if b != f && b.thread == f.thread && b.index > f.index {
                        changed |= rel.add_edge(a, b);
                    }
                }
            }
        }
        rel.trans_closure();
        let irreflexive = rel.is_irreflexive();
        store.set(RelationId::Prop, rel);
        CalcResult::new(changed, irreflexive)
    }
}

/// LKMM's acyclicity core: dependency-ordered program order plus external
/// reads-from over marked events.
#[derive(Debug, Default)]
pub struct ArLkmmCalculator;

impl Calculator for ArLkmmCalculator {
    fn id(&self) -> RelationId {
        RelationId::ArLkmm
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let mut rel = EventMatrix::new(collect_carrier(g, is_marked));
        populate_ppo(g, &mut rel);
        populate_rf(g, &mut rel, true);
        rel.trans_closure();
        store.set(RelationId::ArLkmm, rel);
    }

    fn step(&mut self, _g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let rel = store.get_mut(RelationId::ArLkmm);
        rel.trans_closure();
        CalcResult::new(false, rel.is_irreflexive())
    }
}

/// Propagates-before: prop into a strong fence orders an event before
/// everything the fence's thread does afterwards, hb-extended.
#[derive(Debug, Default)]
pub struct PbCalculator;

impl Calculator for PbCalculator {
    fn id(&self) -> RelationId {
        RelationId::Pb
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let rel = EventMatrix::new(collect_carrier(g, is_marked));
        store.set(RelationId::Pb, rel);
    }

    fn step(&mut self, g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let mut rel = store.take(RelationId::Pb);
        let prop = store.get(RelationId::Prop);
        let elems: Vec<Event> = rel.elems().to_vec();
        let mut changed = false;
        for &f in &elems {
            if !is_strong_fence(g.label(f)) {
                continue;
            }
            for &a in &elems {
                if a == f || !reaches_prefix_of(g, prop, a, f) {
                    continue;
                }
                for &b in &elems {
                    if b == a || b == f {
                        continue;
                    }
                    let po_after = b.thread == f.thread && b.index > f.index;
                    if po_after || hb(g, f, b) {
                        changed |= rel.add_edge(a, b);
                    }
                }
            }
        }
        rel.trans_closure();
        let irreflexive = rel.is_irreflexive();
        store.set(RelationId::Pb, rel);
        CalcResult::new(changed, irreflexive)
    }
}

/// An RCU read-side critical section or grace period, as an interval of
/// one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RcuSpan {
    CriticalSection { lock: Event, unlock: Option<Event> },
    GracePeriod { sync: Event },
}

impl RcuSpan {
    fn anchor(&self) -> Event {
        match self {
            RcuSpan::CriticalSection { lock, .. } => *lock,
            RcuSpan::GracePeriod { sync } => *sync,
        }
    }
}

pub(crate) fn collect_rcu_spans(g: &ExecutionGraph) -> Vec<RcuSpan> {
    let mut spans = Vec::new();
    for t in 0..g.num_threads() as i32 {
        let mut open: Vec<Event> = Vec::new();
        for label in g.thread_labels(t) {
            match label.kind() {
                LabelKind::RcuLock => open.push(label.pos()),
                LabelKind::RcuUnlock => {
                    if let Some(lock) = open.pop() {
                        spans.push(RcuSpan::CriticalSection { lock, unlock: Some(label.pos()) });
                    }
                }
                LabelKind::RcuSync => {
                    spans.push(RcuSpan::GracePeriod { sync: label.pos() });
                }
                _ => {}
            }
        }
        for lock in open {
            spans.push(RcuSpan::CriticalSection { lock, unlock: None });
        }
    }
    spans
}

/// Links between RCU spans: a critical section or grace period is linked to
/// another when some event of the first is prop- or hb-before some event of
/// the second.
#[derive(Debug, Default)]
pub struct RcuLinkCalculator;

fn span_events(g: &ExecutionGraph, span: RcuSpan) -> (Event, Event) {
    match span {
        RcuSpan::CriticalSection { lock, unlock } => (
            lock,
            unlock.unwrap_or_else(|| {
                Event::new(lock.thread, g.thread_size(lock.thread) as i32 - 1)
            }),
        ),
        RcuSpan::GracePeriod { sync } => (sync, sync),
    }
}

fn span_linked(g: &ExecutionGraph, store: &RelationStore, from: RcuSpan, to: RcuSpan) -> bool {
    let prop = store.get(RelationId::Prop);
    let (_, from_end) = span_events(g, from);
    let (to_start, _) = span_events(g, to);
    if from_end == to_start {
        return false;
    }
    hb(g, from_end, to_start) || prop.has(from_end, to_start)
}

impl Calculator for RcuLinkCalculator {
    fn id(&self) -> RelationId {
        RelationId::RcuLink
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let spans = collect_rcu_spans(g);
        let rel = EventMatrix::new(spans.iter().map(|s| s.anchor()).collect());
        store.set(RelationId::RcuLink, rel);
    }

    fn step(&mut self, g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let mut rel = store.take(RelationId::RcuLink);
        let spans = collect_rcu_spans(g);
        let mut changed = false;
        for &a in &spans {
            for &b in &spans {
                if a == b || rel.has(a.anchor(), b.anchor()) {
                    continue;
                }
                if span_linked(g, store, a, b) {
                    changed |= rel.add_edge(a.anchor(), b.anchor());
                }
            }
        }
        let irreflexive = rel.is_irreflexive();
        store.set(RelationId::RcuLink, rel);
        CalcResult::new(changed, irreflexive)
    }
}

/// The counted RCU constraint: along any rcu-link chain with at least as
/// many grace periods as critical sections, the endpoints are ordered.
#[derive(Debug, Default)]
pub struct RcuCalculator;

impl Calculator for RcuCalculator {
    fn id(&self) -> RelationId {
        RelationId::Rcu
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let spans = collect_rcu_spans(g);
        let rel = EventMatrix::new(spans.iter().map(|s| s.anchor()).collect());
        store.set(RelationId::Rcu, rel);
    }

    fn step(&mut self, g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let spans = collect_rcu_spans(g);
        let link = store.get(RelationId::RcuLink).clone();
        let mut rel = store.take(RelationId::Rcu);
        let mut changed = false;
        // Bounded DFS over rcu-link chains, tracking the grace-period vs
        // critical-section balance. Chains are short (one span per RCU
        // primitive), so the walk stays cheap.
        for (i, &start) in spans.iter().enumerate() {
            let mut stack: Vec<(usize, i32, Vec<usize>)> = vec![(i, 0, vec![i])];
            while let Some((cur, balance, path)) = stack.pop() {
                for (j, &next) in spans.iter().enumerate() {
                    if path.contains(&j) {
                        continue;
                    }
                    if !link.has(spans[cur].anchor(), next.anchor()) {
                        continue;
                    }
                    let balance = balance
                        + match next {
                            RcuSpan::GracePeriod { .. } => 1,
                            RcuSpan::CriticalSection { .. } => -1,
                        };
                    let gp_start = matches!(start, RcuSpan::GracePeriod { .. });
                    let total = balance + if gp_start { 1 } else { -1 };
                    if total >= 1 {
                        changed |= rel.add_edge(start.anchor(), next.anchor());
                    }
                    let mut path = path.clone();
                    path.push(j);
                    stack.push((j, balance, path));
                }
            }
        }
        rel.trans_closure();
        let irreflexive = rel.is_irreflexive();
        store.set(RelationId::Rcu, rel);
        CalcResult::new(changed, irreflexive)
    }
}

/// Expands span-level rcu edges to event-level ordering: everything marked
/// po-before an ordered span start comes before everything marked po-after
/// the other span's end.
#[derive(Debug, Default)]
pub struct RcuFenceCalculator;

impl Calculator for RcuFenceCalculator {
    fn id(&self) -> RelationId {
        RelationId::RcuFence
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        let rel = EventMatrix::new(collect_carrier(g, is_marked));
        store.set(RelationId::RcuFence, rel);
    }

    fn step(&mut self, g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let rcu = store.get(RelationId::Rcu).clone();
        let mut rel = store.take(RelationId::RcuFence);
        let mut changed = false;
        for &a in rcu.elems() {
            for b in rcu.successors(a) {
                for i in 0..a.index {
                    let la = Event::new(a.thread, i);
                    if !is_marked(g.label(la)) {
                        continue;
                    }
                    for j in (b.index + 1)..g.thread_size(b.thread) as i32 {
                        let lb = Event::new(b.thread, j);
                        if !is_marked(g.label(lb)) {
                            continue;
                        }
                        changed |= rel.add_edge(la, lb);
                    }
                }
            }
        }
        let irreflexive = rel.is_irreflexive();
        store.set(RelationId::RcuFence, rel);
        CalcResult::new(changed, irreflexive)
    }
}

/// The LKMM terminal relation: executes-before. Seeded from dependency
/// order and reads-from, extended with ar, pb and the rcu-fence
/// constraints until fixpoint; its irreflexivity is the acceptance
/// criterion.
#[derive(Debug, Default)]
pub struct XbCalculator;

impl Calculator for XbCalculator {
    fn id(&self) -> RelationId {
        RelationId::Xb
    }

    fn init(&mut self, g: &ExecutionGraph, store: &mut RelationStore) {
        // Same carrier as prop; runs after prop's init.
        let mut rel = EventMatrix::new(store.get(RelationId::Prop).elems().to_vec());
        populate_ppo(g, &mut rel);
        populate_rf(g, &mut rel, true);
        rel.trans_closure();
        store.set(RelationId::Xb, rel);
    }

    fn step(&mut self, _g: &ExecutionGraph, store: &mut RelationStore) -> CalcResult {
        let mut rel = store.take(RelationId::Xb);
        let elems: Vec<Event> = rel.elems().to_vec();
        let mut changed = false;
        for &a in &elems {
            for &b in &elems {
                if a == b || rel.has(a, b) {
                    continue;
                }
                let ar = store.get(RelationId::ArLkmm).has(a, b);
                let pb = store.get(RelationId::Pb).has(a, b);
                let rcuf = store.get(RelationId::RcuFence).has(a, b);
                if ar || pb || rcuf {
                    changed = true;
                    rel.add_edge(a, b);
                }
            }
        }
        rel.trans_closure();
        let irreflexive = rel.is_irreflexive();
        store.set(RelationId::Xb, rel);
        CalcResult::new(changed, irreflexive)
    }
}
