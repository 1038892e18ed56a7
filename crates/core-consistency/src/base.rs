//! Shared edge-seeding helpers for the calculators: carriers, program
//! order, reads-from, coherence and from-reads over a chosen carrier.

use core_event::Event;
use core_graph::{EventLabel, ExecutionGraph};
use core_relation::EventMatrix;

/// The events satisfying `keep`, in position order (thread-major). Position
/// order is stable across re-stamps, which keeps relation carriers
/// deterministic for diffing.
pub(crate) fn collect_carrier(
    g: &ExecutionGraph,
    keep: impl Fn(&EventLabel) -> bool,
) -> Vec<Event> {
    g.labels().filter(|l| keep(l)).map(EventLabel::pos).collect()
}

/// Add program-order edges between consecutive carrier events of each
/// thread. Transitive closure completes the chains.
pub(crate) fn populate_po(g: &ExecutionGraph, rel: &mut EventMatrix) {
    for t in 0..g.num_threads() as i32 {
        let mut prev: Option<Event> = None;
        for label in g.thread_labels(t) {
            if !rel.contains_elem(label.pos()) {
                continue;
            }
            if let Some(p) = prev {
                rel.add_edge(p, label.pos());
            }
            prev = Some(label.pos());
        }
    }
}

/// Add reads-from edges (write to read). `external_only` skips same-thread
/// edges.
pub(crate) fn populate_rf(g: &ExecutionGraph, rel: &mut EventMatrix, external_only: bool) {
    for label in g.labels() {
        let Some(w) = label.rf_of() else { continue };
        if w.is_initializer() {
            continue;
        }
        if external_only && w.thread == label.pos().thread {
            continue;
        }
        rel.add_edge(w, label.pos());
    }
}

/// Add coherence edges between consecutive stores of every location.
pub(crate) fn populate_co(g: &ExecutionGraph, rel: &mut EventMatrix) {
    for label in g.labels() {
        if !label.is_write() {
            continue;
        }
        let pos = label.pos();
        if let Some(succ) = g.co_successor(pos) {
            rel.add_edge(pos, succ);
        }
    }
}

/// Add from-read edges: a read is fr-before every store coherence-after the
/// one it observed (for initializer reads, before every store).
pub(crate) fn populate_fr(g: &ExecutionGraph, rel: &mut EventMatrix) {
    for label in g.labels() {
        let Some(r) = label.as_read() else { continue };
        let Some(w) = r.rf else { continue };
        let addr = r.access.addr;
        let order = g.co(addr);
        let start = if w.is_initializer() {
            0
        } else {
            match g.co_index_of(addr, w) {
                Some(i) => i + 1,
                None => continue,
            }
        };
        for &later in &order[start..] {
            if later != label.pos() {
                rel.add_edge(label.pos(), later);
            }
        }
    }
}

/// Add dependency-order edges from the ppo views: an edge `a -> b` for
/// same-thread events where `b`'s dependency prefix covers `a`.
pub(crate) fn populate_ppo(g: &ExecutionGraph, rel: &mut EventMatrix) {
    let elems: Vec<Event> = rel.elems().to_vec();
    for &b in &elems {
        let ppo = g.label(b).ppo_view().clone();
        for &a in &elems {
            if a.thread == b.thread && a.index < b.index && ppo.contains(a) {
                rel.add_edge(a, b);
            }
        }
    }
}

/// Whether `a` happens-before `b` according to the attached views.
pub(crate) fn hb(g: &ExecutionGraph, a: Event, b: Event) -> bool {
    a != b && g.label(b).hb_view().contains(a)
}
