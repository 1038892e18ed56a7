//! Search-space bounding: decide whether any scheduling of the current
//! execution stays within a user-set bound on preemptive context switches
//! or round-robin rounds.
//!
//! The measure of a graph is the minimum over its po∪rf linearizations
//! (joins and thread starts contribute their obvious edges). A stale read
//! costs nothing; only genuinely cross-ordered accesses force a thread to
//! be interrupted mid-run. The search is exact, memoized on per-thread
//! progress, and the graphs enumeration produces keep it small.

use ahash::AHashMap;
use core_config::BoundType;
use core_event::Event;
use core_graph::{ExecutionGraph, LabelKind};

/// Mid-exploration checks run slacked (an in-flight graph may sit one
/// switch past the bound until a parked thread catches up); completed
/// executions are judged exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundStrategy {
    Slacked,
    NonSlacked,
}

/// Policy deciding whether a graph exceeds the exploration bound.
#[derive(Debug, Clone, Copy)]
pub enum BoundDecider {
    Context,
    Round,
}

impl BoundDecider {
    pub fn new(bound_type: BoundType) -> Option<Self> {
        match bound_type {
            BoundType::None => None,
            BoundType::Context => Some(BoundDecider::Context),
            BoundType::Round => Some(BoundDecider::Round),
        }
    }

    pub fn exceeds_bound(
        &self,
        g: &ExecutionGraph,
        bound: u32,
        strategy: BoundStrategy,
    ) -> bool {
        let slack = match strategy {
            BoundStrategy::Slacked => self.slack(),
            BoundStrategy::NonSlacked => 0,
        };
        self.calculate(g) > bound + slack
    }

    fn slack(&self) -> u32 {
        match self {
            BoundDecider::Context => 1,
            BoundDecider::Round => 0,
        }
    }

    /// The bound measure of the graph: minimal preemptions (context) or
    /// round-robin rounds (round) over all schedules realizing it.
    pub fn calculate(&self, g: &ExecutionGraph) -> u32 {
        Search::new(g, *self).minimum()
    }
}

struct Search<'g> {
    g: &'g ExecutionGraph,
    decider: BoundDecider,
    sizes: Vec<usize>,
    memo: AHashMap<(Vec<usize>, i32), u32>,
}

impl<'g> Search<'g> {
    fn new(g: &'g ExecutionGraph, decider: BoundDecider) -> Self {
        let sizes = (0..g.num_threads() as i32)
            .map(|t| g.thread_size(t))
            .collect();
        Self { g, decider, sizes, memo: AHashMap::new() }
    }

    fn minimum(&mut self) -> u32 {
        let progress = vec![0usize; self.sizes.len()];
        self.solve(progress, -1)
    }

    fn solve(&mut self, progress: Vec<usize>, current: i32) -> u32 {
        if progress
            .iter()
            .zip(&self.sizes)
            .all(|(p, s)| p == s)
        {
            return 0;
        }
        if let Some(&cached) = self.memo.get(&(progress.clone(), current)) {
            return cached;
        }
        let mut best = u32::MAX;
        for t in 0..self.sizes.len() as i32 {
            let idx = progress[t as usize];
            if idx >= self.sizes[t as usize] {
                continue;
            }
            if !self.executable(&progress, Event::new(t, idx as i32)) {
                continue;
            }
            let cost = self.switch_cost(&progress, current, t);
            let mut next = progress.clone();
            next[t as usize] += 1;
            let sub = self.solve(next, t);
            if sub != u32::MAX {
                best = best.min(cost + sub);
            }
        }
        self.memo.insert((progress, current), best);
        best
    }

    /// Whether the event can be scheduled given what already ran: its rf
    /// source, creator, or joined thread must have gotten there first.
    fn executable(&self, progress: &[usize], e: Event) -> bool {
        let done = |dep: Event| -> bool {
            dep.is_initializer()
                || progress
                    .get(dep.thread as usize)
                    .is_some_and(|&p| p > dep.index as usize)
        };
        match self.g.label(e).kind() {
            LabelKind::ThreadStart { create, .. } => done(*create),
            LabelKind::Read(r) => r.rf.map_or(true, done),
            LabelKind::ThreadJoin { child } => {
                let size = self.g.thread_size(*child);
                progress.get(*child as usize).is_some_and(|&p| p >= size)
            }
            _ => true,
        }
    }

    fn switch_cost(&self, progress: &[usize], current: i32, next: i32) -> u32 {
        if current < 0 || current == next {
            return 0;
        }
        match self.decider {
            BoundDecider::Context => {
                // Leaving a thread that could not continue anyway is free.
                let idx = progress[current as usize];
                if idx >= self.sizes[current as usize] {
                    return 0;
                }
                let resumable = self.executable(progress, Event::new(current, idx as i32));
                let parked = self
                    .g
                    .try_label(Event::new(current, idx as i32 - 1))
                    .is_some_and(|l| l.is_blocking());
                u32::from(resumable && !parked)
            }
            // A wrap to a lower thread id starts a new round-robin round.
            BoundDecider::Round => u32::from(next < current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_event::{
        AAccess, AType, ASize, MemOrdering, SAddr, SVal, ThreadInfo,
    };
    use core_graph::{EventLabel, ReadKind, ReadLabel, WriteKind, WriteLabel};
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
                attrs: Default::default(),
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
    fn stale_reads_cost_no_preemptions() {
        let a = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(a, SVal::new(0));
        g.append(start(0));
        let wa = g.append(store(Event::new(0, 1), a, 1));
        g.insert_co(a, 0, wa);
        g.append(start(1));
        let ra = g.append(load(Event::new(1, 1), a));
        g.set_rf(ra, Some(Event::initializer()));
        assert_eq!(BoundDecider::Context.calculate(&g), 0);
        assert!(!BoundDecider::Context.exceeds_bound(&g, 0, BoundStrategy::NonSlacked));
    }

    #[test]
    fn cross_observation_requires_a_preemption() {
        // T0: Wa; Rb.  T1: Wb; Ra.  Both reads observe the other thread's
        // store, so one thread must be interrupted mid-run.
        let a = SAddr::static_addr(8);
        let b = SAddr::static_addr(16);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(a, SVal::new(0));
        g.set_init_value(b, SVal::new(0));
        g.append(start(0));
        let wa = g.append(store(Event::new(0, 1), a, 1));
        g.insert_co(a, 0, wa);
        g.append(start(1));
        let wb = g.append(store(Event::new(1, 1), b, 1));
        g.insert_co(b, 0, wb);
        let rb = g.append(load(Event::new(0, 2), b));
        g.set_rf(rb, Some(wb));
        let ra = g.append(load(Event::new(1, 2), a));
        g.set_rf(ra, Some(wa));

        assert_eq!(BoundDecider::Context.calculate(&g), 1);
        assert!(BoundDecider::Context.exceeds_bound(&g, 0, BoundStrategy::NonSlacked));
        assert!(!BoundDecider::Context.exceeds_bound(&g, 1, BoundStrategy::NonSlacked));
    }

    #[test]
    fn rounds_count_wraps_to_lower_ids() {
        // T0: W; R (reading T1's store). T1: W. One pass over 0,1 and a
        // wrap back to 0 is the best round-robin schedule.
        let a = SAddr::static_addr(8);
        let b = SAddr::static_addr(16);
        let mut g = ExecutionGraph::new(false);
        g.set_init_value(a, SVal::new(0));
        g.set_init_value(b, SVal::new(0));
        g.append(start(0));
        let wa = g.append(store(Event::new(0, 1), a, 1));
        g.insert_co(a, 0, wa);
        g.append(start(1));
        let wb = g.append(store(Event::new(1, 1), b, 1));
        g.insert_co(b, 0, wb);
        let rb = g.append(load(Event::new(0, 2), b));
        g.set_rf(rb, Some(wb));
        assert_eq!(BoundDecider::Round.calculate(&g), 1);
        assert!(BoundDecider::Round.exceeds_bound(&g, 0, BoundStrategy::NonSlacked));
    }

    #[test]
    fn decider_construction_follows_bound_type() {
        assert!(BoundDecider::new(BoundType::None).is_none());
        assert!(matches!(BoundDecider::new(BoundType::Context), Some(BoundDecider::Context)));
        assert!(matches!(BoundDecider::new(BoundType::Round), Some(BoundDecider::Round)));
    }
}
