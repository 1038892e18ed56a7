use core_event::{Event, SAddr};
use core_view::View;

use crate::graph::ExecutionGraph;

/// Coherence queries: which stores a read may observe, where a write may be
/// placed in the coherence order, and which placed reads a write may be
/// rotated to serve.
impl ExecutionGraph {
    /// Whether `w` is `(rf?;hb)`-before the view: either the write itself or
    /// one of its readers is covered.
    pub fn is_write_rf_before(&self, before: &View, w: Event) -> bool {
        if before.contains(w) {
            return true;
        }
        self.readers_of(w).into_iter().any(|r| before.contains(r))
    }

    /// Whether `e` happens-before `w` or one of `w`'s readers.
    pub fn is_hb_opt_rf_before(&self, e: Event, w: Event) -> bool {
        if self.label(w).hb_view().contains(e) {
            return true;
        }
        self.readers_of(w)
            .into_iter()
            .any(|r| self.label(r).hb_view().contains(e))
    }

    /// Index after the co-latest store that is `(hb;rf?)`-past the view:
    /// everything before it is overwritten for an observer with that view.
    pub fn split_co_before(&self, addr: SAddr, before: &View) -> usize {
        if before.is_empty() {
            return 0;
        }
        let order = self.co(addr);
        for (i, &w) in order.iter().enumerate().rev() {
            if self.is_write_rf_before(before, w) {
                return i + 1;
            }
        }
        0
    }

    /// First coherence index whose store is hb-after `e` (directly or via a
    /// reader); a new write for `e` cannot be placed past it.
    pub fn split_co_after(&self, addr: SAddr, e: Event) -> usize {
        let order = self.co(addr);
        for (i, &w) in order.iter().enumerate() {
            if self.is_hb_opt_rf_before(e, w) {
                return i;
            }
        }
        order.len()
    }

    /// The stores a read at `pos` may observe: the co-latest store of its
    /// `(hb;rf?)`-past (or the initializer if there is none) plus every
    /// coherence-later store.
    pub fn coherent_stores(&self, addr: SAddr, pos: Event) -> Vec<Event> {
        let before = if pos.index > 0 {
            self.label(pos.prev()).hb_view().clone()
        } else {
            View::new()
        };
        let beg = self.split_co_before(addr, &before);
        let order = self.co(addr);
        let mut stores = Vec::with_capacity(order.len() - beg + 1);
        if beg == 0 {
            stores.push(Event::initializer());
        } else {
            stores.push(order[beg - 1]);
        }
        stores.extend_from_slice(&order[beg..]);
        stores
    }

    /// The legal coherence offsets `[lo, hi]` for a new write at `pos`. An
    /// RMW write has exactly one slot: right after the write its read
    /// observed.
    pub fn possible_co_places(&self, addr: SAddr, pos: Event, is_rmw: bool) -> (usize, usize) {
        if is_rmw {
            debug_assert!(pos.index > 0, "an RMW write follows its read");
            let rf = self
                .label(pos.prev())
                .rf_of()
                .expect("RMW write requires a resolved read");
            let offset = if rf.is_initializer() {
                0
            } else {
                self.co_index_of(addr, rf).expect("rf within coherence") + 1
            };
            return (offset, offset);
        }
        let before = if pos.index > 0 {
            self.label(pos.prev()).hb_view().clone()
        } else {
            View::new()
        };
        (self.split_co_before(addr, &before), self.co(addr).len())
    }

    /// The already-placed reads that `w` may be rotated to serve: the
    /// revisitable reads of the location outside `w`'s porf prefix, minus
    /// those whose past already observes a coherence-later store (rerouting
    /// them would contradict coherence).
    pub fn coherent_revisits(&self, w: Event) -> Vec<Event> {
        let w_label = self.label(w);
        let addr = w_label.addr_of().expect("revisits of a non-access");
        let porf = w_label.porf_view();

        let mut loads: Vec<Event> = self
            .labels()
            .filter(|l| {
                l.as_read().is_some_and(|r| {
                    r.revisitable && r.access.addr == addr && r.rf.is_some()
                }) && !porf.contains(l.pos())
            })
            .map(|l| l.pos())
            .collect();

        // Exclude (co;rf?)-later observers: a read whose hb-past contains a
        // store placed after w (or one of its readers) must not be rerouted
        // back to w.
        let idx = self.co_index_of(addr, w);
        let later: Vec<Event> = match idx {
            Some(i) => self.co(addr)[i + 1..].to_vec(),
            None => Vec::new(),
        };
        if !later.is_empty() {
            let mut opt_rfs: Vec<Event> = later.clone();
            for &lw in &later {
                opt_rfs.extend(self.readers_of(lw));
            }
            loads.retain(|&r| {
                let before = self.label(r).hb_view();
                !opt_rfs.iter().any(|&ev| before.contains(ev))
            });
        }
        loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{EventLabel, LabelKind, ReadKind, ReadLabel, WriteKind, WriteLabel};
    use core_event::{AAccess, AType, ASize, MemOrdering, SVal, ThreadInfo, WriteAttr};

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

    fn store(pos: Event, addr: SAddr, val: u64, ord: MemOrdering) -> EventLabel {
        EventLabel::new(
            pos,
            ord,
            LabelKind::Write(WriteLabel {
                access: AAccess::new(addr, ASize::new(4), AType::Unsigned),
                value: SVal::new(val),
                kind: WriteKind::Plain,
                attrs: WriteAttr::empty(),
                msg_view: View::new(),
            }),
        )
    }

    fn load(pos: Event, addr: SAddr, ord: MemOrdering) -> EventLabel {
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

    #[test]
    fn unordered_stores_are_all_readable() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.append(start(0));
        let w0 = g.append(store(Event::new(0, 1), x, 1, MemOrdering::Relaxed));
        g.insert_co(x, 0, w0);
        g.append(start(1));
        let w1 = g.append(store(Event::new(1, 1), x, 2, MemOrdering::Relaxed));
        g.insert_co(x, 1, w1);
        g.append(start(2));
        let cands = g.coherent_stores(x, Event::new(2, 1));
        assert_eq!(cands, vec![Event::initializer(), w0, w1]);
    }

    #[test]
    fn hb_past_store_hides_the_initializer() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        // Same thread: a po-earlier store is (hb;rf?)-past the read.
        g.append(start(0));
        let w0 = g.append(store(Event::new(0, 1), x, 1, MemOrdering::Relaxed));
        g.insert_co(x, 0, w0);
        let cands = g.coherent_stores(x, Event::new(0, 2));
        assert_eq!(cands, vec![w0]);
    }

    #[test]
    fn rmw_write_slots_directly_after_its_read() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.append(start(0));
        let w0 = g.append(store(Event::new(0, 1), x, 5, MemOrdering::Relaxed));
        g.insert_co(x, 0, w0);
        g.append(start(1));
        let mut fai_read = load(Event::new(1, 1), x, MemOrdering::Relaxed);
        if let LabelKind::Read(r) = fai_read.kind_mut() {
            r.kind = ReadKind::Fai { is_barrier: false };
        }
        let r = g.append(fai_read);
        g.set_rf(r, Some(w0));
        let (lo, hi) = g.possible_co_places(x, Event::new(1, 2), true);
        assert_eq!((lo, hi), (1, 1));
    }

    #[test]
    fn revisits_skip_reads_in_the_writes_prefix() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        // T0 reads x (from init); T1 writes x.
        g.append(start(0));
        let r = g.append(load(Event::new(0, 1), x, MemOrdering::Relaxed));
        g.set_rf(r, Some(Event::initializer()));
        g.append(start(1));
        let w = g.append(store(Event::new(1, 1), x, 7, MemOrdering::Relaxed));
        g.insert_co(x, 0, w);
        assert_eq!(g.coherent_revisits(w), vec![r]);
        // Once the read is protected, it is no longer offered.
        g.set_revisitable(r, false);
        assert!(g.coherent_revisits(w).is_empty());
    }
}
