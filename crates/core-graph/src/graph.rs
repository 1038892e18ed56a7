use ahash::AHashMap;
use core_event::{Event, SAddr, SVal, Stamp};
use core_view::{DepView, View};
use tracing::trace;

use crate::label::{EventLabel, LabelKind};

/// The execution graph. Owns every label; threads are dense sequences, the
/// per-location coherence orders are the only mutable enumeration choice
/// besides the reads-from edges inside read labels.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    pub(crate) threads: Vec<Vec<EventLabel>>,
    pub(crate) next_stamp: u32,
    /// Coherence order per location. Does not contain the initializer.
    pub(crate) co: AHashMap<SAddr, Vec<Event>>,
    /// All writes per location, in insertion order.
    pub(crate) stores: AHashMap<SAddr, Vec<Event>>,
    /// Initial values; a location absent here reads as poison.
    pub(crate) init_vals: AHashMap<SAddr, SVal>,
    /// Whether ppo views are maintained (IMM/LKMM).
    pub(crate) dep_tracking: bool,
}

impl ExecutionGraph {
    pub fn new(dep_tracking: bool) -> Self {
        Self { dep_tracking, ..Default::default() }
    }

    pub fn tracks_deps(&self) -> bool {
        self.dep_tracking
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn thread_size(&self, thread: i32) -> usize {
        self.threads.get(thread as usize).map_or(0, Vec::len)
    }

    pub fn contains(&self, e: Event) -> bool {
        !e.is_initializer()
            && e.thread >= 0
            && (e.index as usize) < self.thread_size(e.thread)
    }

    pub fn next_stamp(&self) -> Stamp {
        Stamp::new(self.next_stamp)
    }

    pub fn label(&self, e: Event) -> &EventLabel {
        &self.threads[e.thread as usize][e.index as usize]
    }

    pub fn try_label(&self, e: Event) -> Option<&EventLabel> {
        self.threads
            .get(e.thread as usize)?
            .get(e.index as usize)
    }

    pub(crate) fn label_mut(&mut self, e: Event) -> &mut EventLabel {
        &mut self.threads[e.thread as usize][e.index as usize]
    }

    pub fn last_of(&self, thread: i32) -> Option<&EventLabel> {
        self.threads.get(thread as usize)?.last()
    }

    pub fn thread_labels(&self, thread: i32) -> &[EventLabel] {
        self.threads.get(thread as usize).map_or(&[], Vec::as_slice)
    }

    /// Every label, in position order.
    pub fn labels(&self) -> impl Iterator<Item = &EventLabel> {
        self.threads.iter().flatten()
    }

    /// Every event position, sorted by stamp (the replay order).
    pub fn events_by_stamp(&self) -> Vec<Event> {
        let mut evs: Vec<(Stamp, Event)> =
            self.labels().map(|l| (l.stamp(), l.pos())).collect();
        evs.sort_unstable_by_key(|&(s, _)| s);
        evs.into_iter().map(|(_, e)| e).collect()
    }

    pub fn set_init_value(&mut self, addr: SAddr, val: SVal) {
        self.init_vals.insert(addr, val);
    }

    pub fn clear_init_value(&mut self, addr: SAddr) {
        self.init_vals.remove(&addr);
    }

    pub fn init_value(&self, addr: SAddr) -> Option<SVal> {
        self.init_vals.get(&addr).copied()
    }

    /// The value a read observes; `None` is poison (uninitialized).
    pub fn value_read(&self, read: Event) -> Option<SVal> {
        let r = self.label(read).as_read().expect("value_read on a non-read");
        let w = r.rf.expect("reads-from not yet chosen");
        if w.is_initializer() {
            self.init_value(r.access.addr)
        } else {
            self.label(w).val_of()
        }
    }

    /// Append a label at its position (which must be the next free index of
    /// its thread), assigning its stamp and computing its views.
    pub fn append(&mut self, mut label: EventLabel) -> Event {
        let pos = label.pos();
        debug_assert!(pos.thread >= 0, "cannot append at the initializer");
        let t = pos.thread as usize;
        while self.threads.len() <= t {
            self.threads.push(Vec::new());
        }
        debug_assert_eq!(
            pos.index as usize,
            self.threads[t].len(),
            "appends must keep thread indices dense"
        );
        label.set_stamp(Stamp::new(self.next_stamp));
        self.next_stamp += 1;
        if let LabelKind::Write(w) = label.kind() {
            self.stores.entry(w.access.addr).or_default().push(pos);
        }
        trace!(target: "graph", label = %label, "append");
        self.threads[t].push(label);
        self.recompute_views(pos);
        if self.label(pos).is_write() {
            let msg = self.compute_msg_view(pos);
            self.label_mut(pos)
                .as_write_mut()
                .expect("checked write")
                .msg_view = msg;
        }
        pos
    }

    /// Point `read` at `rf` and rebuild the read's views. The read must be
    /// the last event of its thread (reads are only rewired while maximal).
    pub fn set_rf(&mut self, read: Event, rf: Option<Event>) {
        debug_assert_eq!(
            read.index as usize + 1,
            self.thread_size(read.thread),
            "rf rewired on a non-maximal read"
        );
        self.label_mut(read)
            .as_read_mut()
            .expect("set_rf on a non-read")
            .rf = rf;
        self.recompute_views(read);
    }

    pub fn set_revisitable(&mut self, read: Event, value: bool) {
        self.label_mut(read)
            .as_read_mut()
            .expect("revisitability is a read property")
            .revisitable = value;
    }

    pub fn set_joined_by(&mut self, finish: Event, joiner: Option<Event>) {
        if let LabelKind::ThreadFinish { joined_by, .. } = self.label_mut(finish).kind_mut() {
            *joined_by = joiner;
        } else {
            unreachable!("join backlink on a non-finish label");
        }
    }

    // ---------------------------------------------------------------------
    // View computation
    // ---------------------------------------------------------------------
    //
    // Views are computed at append time from the predecessors' views plus
    // the label's synchronization inputs, and recomputed for a read when its
    // rf is rewired. Kept labels never need recomputation: restriction only
    // removes stamp-maximal suffixes and rewires maximal reads.

    pub(crate) fn recompute_views(&mut self, pos: Event) {
        let (hb, porf, ppo) = self.compute_views(pos);
        self.label_mut(pos).set_views(hb, porf, ppo);
    }

    fn compute_views(&self, pos: Event) -> (View, View, DepView) {
        let label = self.label(pos);
        let (mut hb, mut porf) = self.base_views(label);
        hb.update_idx(pos);
        porf.update_idx(pos);

        match label.kind() {
            LabelKind::Read(r) => {
                if let Some(w) = r.rf {
                    if !w.is_initializer() {
                        porf.merge_with(self.label(w).porf_view());
                        if label.is_at_least_acquire() {
                            let msg = &self.label(w).as_write().expect("rf targets a write").msg_view;
                            hb.merge_with(msg);
                        }
                    }
                }
            }
            LabelKind::ThreadJoin { child } => {
                if let Some(fin) = self.last_of(*child) {
                    debug_assert!(
                        matches!(fin.kind(), LabelKind::ThreadFinish { .. }),
                        "join created before child finished"
                    );
                    hb.merge_with(fin.hb_view());
                    porf.merge_with(fin.porf_view());
                }
            }
            LabelKind::Fence | LabelKind::SmpFence { .. } => {
                // An acquire fence synchronizes with the writes observed by
                // the po-earlier reads of its thread.
                let acquires = match label.kind() {
                    LabelKind::Fence => label.is_at_least_acquire(),
                    LabelKind::SmpFence { kind } => kind.orders_reads(),
                    _ => unreachable!(),
                };
                if acquires {
                    for prior in &self.threads[pos.thread as usize][..pos.index as usize] {
                        let Some(r) = prior.as_read() else { continue };
                        let Some(w) = r.rf else { continue };
                        if !w.is_initializer() {
                            hb.merge_with(
                                &self.label(w).as_write().expect("rf targets a write").msg_view,
                            );
                        }
                    }
                }
            }
            _ => {}
        }

        let ppo = if self.dep_tracking {
            self.compute_ppo_view(pos)
        } else {
            DepView::new()
        };
        (hb, porf, ppo)
    }

    fn base_views(&self, label: &EventLabel) -> (View, View) {
        let pos = label.pos();
        if pos.index > 0 {
            let pred = self.label(pos.prev());
            return (pred.hb_view().clone(), pred.porf_view().clone());
        }
        match label.kind() {
            LabelKind::ThreadStart { create, .. } if !create.is_initializer() => {
                let c = self.label(*create);
                (c.hb_view().clone(), c.porf_view().clone())
            }
            _ => (View::new(), View::new()),
        }
    }

    /// Dependency-restricted po prefix (with holes) for the IMM/LKMM
    /// models. Fences, release writes and the non-access labels order
    /// their whole prefix; plain accesses carry only their dependency
    /// closure plus whatever the po-earlier ordering points (fences,
    /// acquire reads) already cover.
    fn compute_ppo_view(&self, pos: Event) -> DepView {
        let label = self.label(pos);
        let full_prefix = !label.is_mem_access()
            || label.is_fence()
            || (label.is_write() && label.is_at_least_release());
        if full_prefix {
            let mut ppo = DepView::new();
            ppo.set(pos);
            return ppo;
        }
        let mut ppo = DepView::new();
        // Walk back to the nearest full-prefix label; acquire reads met on
        // the way contribute themselves and their own closure.
        for prior in self.threads[pos.thread as usize][..pos.index as usize]
            .iter()
            .rev()
        {
            if !prior.is_mem_access() || prior.is_fence() {
                ppo.merge_with(prior.ppo_view());
                break;
            }
            if prior.is_read() && prior.is_at_least_acquire() {
                ppo.merge_with(prior.ppo_view());
                ppo.update_idx(prior.pos());
                ppo.remove_hole(prior.pos());
            }
        }
        let deps = label.deps().all();
        for e in deps.iter() {
            if let Some(dep) = self.try_label(e) {
                ppo.merge_with(dep.ppo_view());
                ppo.update_idx(e);
                ppo.remove_hole(e);
            }
        }
        if let Some(r) = label.as_read() {
            if let Some(w) = r.rf {
                if !w.is_initializer() {
                    ppo.merge_with(self.label(w).ppo_view());
                }
            }
        }
        // Everything po-between the carried prefix and this label that is
        // not depended upon is a hole.
        let carried = ppo.get(pos.thread);
        ppo.update_idx(pos);
        if carried + 1 < pos.index {
            ppo.add_holes_in_range(Event::new(pos.thread, carried + 1), pos.index);
        }
        ppo
    }

    /// The view a reader acquires from a write: the release-sequence rule.
    fn compute_msg_view(&self, pos: Event) -> View {
        let label = self.label(pos);
        let w = label.as_write().expect("msg view of a non-write");
        let mut msg = if label.is_at_least_release() {
            label.hb_view().clone()
        } else {
            // A relaxed store still publishes the prefix of a po-earlier
            // release fence.
            let mut msg = View::new();
            for prior in self.threads[pos.thread as usize][..pos.index as usize]
                .iter()
                .rev()
            {
                if prior.is_fence() && prior.is_at_least_release() {
                    msg.merge_with(prior.hb_view());
                    break;
                }
            }
            msg
        };
        // RMW writes extend the release sequence of the write they read.
        if w.is_rmw() && pos.index > 0 {
            let read = self.label(pos.prev());
            if let Some(rf) = read.rf_of() {
                if !rf.is_initializer() {
                    msg.merge_with(
                        &self.label(rf).as_write().expect("rf targets a write").msg_view,
                    );
                }
            }
        }
        msg
    }

    // ---------------------------------------------------------------------
    // Store bookkeeping
    // ---------------------------------------------------------------------

    /// All writes to `addr` in insertion order.
    pub fn writes_to(&self, addr: SAddr) -> &[Event] {
        self.stores.get(&addr).map_or(&[], Vec::as_slice)
    }

    /// The coherence order of `addr` (initializer excluded).
    pub fn co(&self, addr: SAddr) -> &[Event] {
        self.co.get(&addr).map_or(&[], Vec::as_slice)
    }

    pub fn co_index_of(&self, addr: SAddr, w: Event) -> Option<usize> {
        self.co(addr).iter().position(|&e| e == w)
    }

    pub fn insert_co(&mut self, addr: SAddr, offset: usize, w: Event) {
        let order = self.co.entry(addr).or_default();
        debug_assert!(offset <= order.len(), "coherence offset out of range");
        order.insert(offset, w);
    }

    pub(crate) fn remove_from_co(&mut self, addr: SAddr, w: Event) {
        if let Some(order) = self.co.get_mut(&addr) {
            order.retain(|&e| e != w);
        }
    }

    pub(crate) fn remove_from_stores(&mut self, addr: SAddr, w: Event) {
        if let Some(list) = self.stores.get_mut(&addr) {
            list.retain(|&e| e != w);
        }
    }

    /// Drop a trailing block marker so its parked read becomes maximal
    /// again (in-place revisiting). Returns false when the thread does not
    /// end in a blocking label.
    pub fn pop_block_label(&mut self, thread: i32) -> bool {
        let Some(labels) = self.threads.get_mut(thread as usize) else {
            return false;
        };
        if labels.last().is_some_and(EventLabel::is_blocking) {
            labels.pop();
            true
        } else {
            false
        }
    }

    /// Move an already-placed write to a different coherence offset (the
    /// alternative-placement revisit).
    pub fn reposition_co(&mut self, addr: SAddr, w: Event, offset: usize) {
        self.remove_from_co(addr, w);
        self.insert_co(addr, offset, w);
    }

    /// The metadata of a thread's start label, if the thread exists.
    pub fn thread_start_info(&self, thread: i32) -> Option<&core_event::ThreadInfo> {
        match self.threads.get(thread as usize)?.first()?.kind() {
            LabelKind::ThreadStart { info, .. } => Some(info),
            _ => None,
        }
    }

    pub fn co_successor(&self, w: Event) -> Option<Event> {
        let addr = self.label(w).addr_of()?;
        let idx = self.co_index_of(addr, w)?;
        self.co(addr).get(idx + 1).copied()
    }

    pub fn co_predecessor(&self, w: Event) -> Option<Event> {
        let addr = self.label(w).addr_of()?;
        let idx = self.co_index_of(addr, w)?;
        idx.checked_sub(1).map(|i| self.co(addr)[i])
    }

    /// The reads observing `w`.
    pub fn readers_of(&self, w: Event) -> Vec<Event> {
        self.labels()
            .filter(|l| l.rf_of() == Some(w))
            .map(|l| l.pos())
            .collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{ReadKind, ReadLabel, WriteKind, WriteLabel};
    use core_event::{AAccess, AType, ASize, MemOrdering, ThreadInfo, WriteAttr};

    fn start(t: i32, create: Event) -> EventLabel {
        EventLabel::new(
            Event::new(t, 0),
            MemOrdering::Acquire,
            LabelKind::ThreadStart {
                create,
                info: ThreadInfo::new(t, 0, 0, SVal::new(0)),
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
    fn stamps_increase_in_creation_order() {
        let mut g = ExecutionGraph::new(false);
        let a = g.append(start(0, Event::initializer()));
        let x = SAddr::static_addr(8);
        let b = g.append(store(Event::new(0, 1), x, 1, MemOrdering::Relaxed));
        assert!(g.label(a).stamp() < g.label(b).stamp());
        assert_eq!(g.thread_size(0), 2);
    }

    #[test]
    fn acquire_load_inherits_release_store_prefix() {
        let x = SAddr::static_addr(8);
        let y = SAddr::static_addr(16);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.set_init_value(y, SVal::new(0));
        // T0: Wrlx x 42 ; Wrel y 1
        g.append(start(0, Event::initializer()));
        let wx = g.append(store(Event::new(0, 1), x, 42, MemOrdering::Relaxed));
        let wy = g.append(store(Event::new(0, 2), y, 1, MemOrdering::Release));
        g.insert_co(x, 0, wx);
        g.insert_co(y, 0, wy);
        // T1: Racq y (from wy)
        g.append(start(1, Event::initializer()));
        let ry = g.append(load(Event::new(1, 1), y, MemOrdering::Acquire));
        g.set_rf(ry, Some(wy));
        // The acquire view now covers the relaxed store to x.
        assert!(g.label(ry).hb_view().contains(wx));
        assert_eq!(g.value_read(ry), Some(SVal::new(1)));
    }

    #[test]
    fn relaxed_load_does_not_synchronize() {
        let y = SAddr::static_addr(16);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(y, SVal::new(0));
        g.append(start(0, Event::initializer()));
        let wy = g.append(store(Event::new(0, 1), y, 1, MemOrdering::Release));
        g.insert_co(y, 0, wy);
        g.append(start(1, Event::initializer()));
        let ry = g.append(load(Event::new(1, 1), y, MemOrdering::Relaxed));
        g.set_rf(ry, Some(wy));
        assert!(!g.label(ry).hb_view().contains(Event::new(0, 1)));
        // But porf still records the dependency.
        assert!(g.label(ry).porf_view().contains(wy));
    }

    #[test]
    fn rf_rotation_round_trips_the_views() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(x, SVal::new(0));
        g.append(start(0, Event::initializer()));
        let w = g.append(store(Event::new(0, 1), x, 1, MemOrdering::Release));
        g.insert_co(x, 0, w);
        g.append(start(1, Event::initializer()));
        let r = g.append(load(Event::new(1, 1), x, MemOrdering::Acquire));
        g.set_rf(r, Some(Event::initializer()));
        let before = g.label(r).clone();

        g.set_rf(r, Some(w));
        assert!(g.label(r).hb_view().contains(w));
        g.set_rf(r, Some(Event::initializer()));
        assert_eq!(*g.label(r), before);
    }

    #[test]
    fn uninitialized_location_reads_as_poison() {
        let z = SAddr::static_addr(24);
        let mut g = ExecutionGraph::new(false);
        g.append(start(0, Event::initializer()));
        let rz = g.append(load(Event::new(0, 1), z, MemOrdering::Relaxed));
        g.set_rf(rz, Some(Event::initializer()));
        assert_eq!(g.value_read(rz), None);
    }
}
