use core_event::{Event, Stamp};
use tracing::trace;

use crate::graph::ExecutionGraph;
use crate::label::{EventLabel, LabelKind};

/// Where a saved prefix write sat in its location's coherence order: right
/// after `pred`, or first if `pred` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoPlacing {
    pub write: Event,
    pub pred: Option<Event>,
}

/// The porf prefix of a write that must be restored for a backward revisit:
/// the labels beyond the revisited read's stamp, in stamp order, plus the
/// coherence placements internal to them.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedPrefix {
    pub labels: Vec<EventLabel>,
    pub placings: Vec<CoPlacing>,
}

impl ExecutionGraph {
    /// The minimal label set in `w`'s porf prefix that restriction to
    /// `r`'s stamp would delete, with their current coherence placements.
    pub fn prefix_to_save_not_before(&self, w: Event, r: Event) -> SavedPrefix {
        let cut = self.label(r).stamp();
        let porf = self.label(w).porf_view().clone();
        let mut labels: Vec<EventLabel> = self
            .labels()
            .filter(|l| l.stamp() > cut && porf.contains(l.pos()))
            .cloned()
            .collect();
        labels.sort_by_key(EventLabel::stamp);
        let placings = labels
            .iter()
            .filter(|l| l.is_write())
            .map(|l| CoPlacing { write: l.pos(), pred: self.co_predecessor(l.pos()) })
            .collect();
        SavedPrefix { labels, placings }
    }

    /// Remove every label with stamp greater than `cut`, in reverse creation
    /// order, undoing their bookkeeping. Returns the removed labels, most
    /// recent first, so the caller can release heap regions and roll back
    /// calculator state in the same transaction.
    pub fn cut_to_stamp(&mut self, cut: Stamp) -> Vec<EventLabel> {
        let mut removed: Vec<EventLabel> = Vec::new();
        for thread in &mut self.threads {
            // Stamps grow along po, so the victims form a suffix.
            let split = thread
                .iter()
                .position(|l| l.stamp() > cut)
                .unwrap_or(thread.len());
            removed.extend(thread.drain(split..));
        }
        removed.sort_by_key(|l| std::cmp::Reverse(l.stamp()));
        for label in &removed {
            match label.kind() {
                LabelKind::Write(w) => {
                    let addr = w.access.addr;
                    self.remove_from_co(addr, label.pos());
                    self.remove_from_stores(addr, label.pos());
                }
                LabelKind::ThreadJoin { child } => {
                    // The child's finish outlives the join only if it has a
                    // smaller stamp; clear the dangling backlink.
                    let child_last = Event::new(*child, self.thread_size(*child) as i32 - 1);
                    let dangling = self.contains(child_last)
                        && matches!(
                            self.label(child_last).kind(),
                            LabelKind::ThreadFinish { joined_by, .. }
                                if *joined_by == Some(label.pos())
                        );
                    if dangling {
                        self.set_joined_by(child_last, None);
                    }
                }
                _ => {}
            }
        }
        trace!(
            target: "graph.restrict",
            cut = %cut,
            removed = removed.len(),
            next_stamp = self.next_stamp,
            "cut_to_stamp"
        );
        removed
    }

    /// Re-append a saved porf prefix after a cut. Labels keep their saved
    /// views (a porf prefix is self-contained) but receive fresh stamps;
    /// writes regain their recorded coherence slots. Restored reads are no
    /// longer revisitable: the revisit that restored them owns this subtree.
    pub fn restore_prefix(&mut self, prefix: SavedPrefix) {
        for mut label in prefix.labels {
            let pos = label.pos();
            let t = pos.thread as usize;
            while self.threads.len() <= t {
                self.threads.push(Vec::new());
            }
            debug_assert_eq!(
                pos.index as usize,
                self.threads[t].len(),
                "prefix restoration must keep thread indices dense"
            );
            label.set_stamp(Stamp::new(self.next_stamp));
            self.next_stamp += 1;
            if let Some(r) = label.as_read_mut() {
                r.revisitable = false;
            }
            if let LabelKind::Write(w) = label.kind() {
                let addr = w.access.addr;
                self.stores.entry(addr).or_default().push(pos);
            }
            let addr = label.as_write().map(|w| w.access.addr);
            trace!(target: "graph.restrict", label = %label, "restore");
            self.threads[t].push(label);
            if let Some(addr) = addr {
                let placing = prefix
                    .placings
                    .iter()
                    .find(|p| p.write == pos)
                    .expect("every restored write has a placing");
                let offset = match placing.pred {
                    None => 0,
                    Some(p) => {
                        self.co_index_of(addr, p)
                            .expect("coherence predecessor restored or kept")
                            + 1
                    }
                };
                self.insert_co(addr, offset, pos);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{ReadKind, ReadLabel, WriteKind, WriteLabel};
    use core_event::{AAccess, AType, ASize, MemOrdering, SAddr, SVal, ThreadInfo, WriteAttr};
    use core_view::View;

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

    fn store(pos: Event, addr: SAddr, val: u64) -> EventLabel {
        EventLabel::new(
            pos,
            MemOrdering::Relaxed,
            LabelKind::Write(WriteLabel {
                access: AAccess::new(addr, ASize::new(4), AType::Unsigned),
                value: SVal::new(val),
                kind: WriteKind::Plain,
                attrs: WriteAttr::empty(),
                msg_view: View::new(),
            }),
        )
    }

    fn load(pos: Event, addr: SAddr) -> EventLabel {
        EventLabel::new(
            pos,
            MemOrdering::Relaxed,
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
    fn append_then_cut_is_identity() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.append(start(0));
        let w = g.append(store(Event::new(0, 1), x, 1));
        g.insert_co(x, 0, w);
        let snapshot = g.clone();
        let cut = g.label(w).stamp();

        let w2 = g.append(store(Event::new(0, 2), x, 2));
        g.insert_co(x, 1, w2);
        g.append(start(1));

        let removed = g.cut_to_stamp(cut);
        assert_eq!(removed.len(), 2);
        assert_eq!(g.threads, snapshot.threads);
        assert_eq!(g.co, snapshot.co);
        assert_eq!(g.stores, snapshot.stores);
    }

    #[test]
    fn cut_removes_exactly_the_later_stamps() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.append(start(0));
        let w = g.append(store(Event::new(0, 1), x, 1));
        g.insert_co(x, 0, w);
        g.append(start(1));
        let r = g.append(load(Event::new(1, 1), x));
        g.set_rf(r, Some(w));

        let cut = g.label(w).stamp();
        let removed = g.cut_to_stamp(cut);
        let removed_pos: Vec<Event> = removed.iter().map(EventLabel::pos).collect();
        assert!(removed_pos.contains(&Event::new(1, 0)));
        assert!(removed_pos.contains(&r));
        assert!(g.contains(w));
        assert!(!g.contains(r));
        // Reverse creation order: the read was created last, comes first.
        assert_eq!(removed[0].pos(), r);
    }

    #[test]
    fn saved_prefix_restores_with_fresh_stamps_and_co_slots() {
        let x = SAddr::static_addr(8);
        let y = SAddr::static_addr(16);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.set_init_value(y, SVal::new(0));
        // T0: R y (future revisit target)
        g.append(start(0));
        let r = g.append(load(Event::new(0, 1), y));
        g.set_rf(r, Some(Event::initializer()));
        // T1: W x 1 ; W y 1  (the writer whose prefix gets saved)
        g.append(start(1));
        let wx = g.append(store(Event::new(1, 1), x, 1));
        g.insert_co(x, 0, wx);
        let wy = g.append(store(Event::new(1, 2), y, 1));
        g.insert_co(y, 0, wy);

        let prefix = g.prefix_to_save_not_before(wy, r);
        let saved_positions: Vec<Event> =
            prefix.labels.iter().map(EventLabel::pos).collect();
        assert_eq!(saved_positions, vec![Event::new(1, 0), wx, wy]);

        let r_stamp = g.label(r).stamp();
        g.cut_to_stamp(r_stamp);
        assert!(!g.contains(wy));
        g.restore_prefix(prefix);
        g.set_rf(r, Some(wy));

        assert!(g.contains(wy));
        assert_eq!(g.co(x), &[wx]);
        assert_eq!(g.co(y), &[wy]);
        assert_eq!(g.value_read(r), Some(SVal::new(1)));
        // The read keeps its anchor stamp; the restored prefix comes after
        // it in creation order, so a later cut at the read removes it again.
        assert_eq!(g.label(r).stamp(), r_stamp);
        assert!(g.label(wy).stamp() > r_stamp);
    }
}
