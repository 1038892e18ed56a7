use ahash::AHashMap;
use core_consistency::{BoundStrategy, CheckPoint, ConsistencyStatus};
use core_event::{Event, MemOrdering, SVal, ThreadInfo};
use core_graph::{EventLabel, LabelKind, ReadLabel, WriteLabel};
use core_interp::{
    Interpreter, InterpError, PendingEvent, PendingKind, StepResult, ThreadStatus,
};
use tracing::trace;

use crate::verdict::{classify, Verdict, VerdictKind};
use crate::{Driver, Revisit};

/// How one run of the interpreter over the current graph ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// All threads finished and the graph passed the full check.
    Complete,
    /// Some thread stayed parked.
    Blocked { barrier_only: bool },
    /// The bound decider pruned the execution.
    BoundPruned,
    /// Inconsistent or symmetry-redundant; contributes nothing.
    Moot,
    /// A user-program error on a consistent execution.
    Error(Verdict),
}

/// Flow control out of one handled event.
enum Flow {
    Continue,
    Moot,
    BoundPruned,
    /// An in-place revisit rewired a blocked read; replay from scratch on
    /// the mutated graph, still within the same execution.
    Restart,
    Race(Verdict),
}

impl<'m> Driver<'m> {
    /// Run the interpreter over the current graph to a terminal state,
    /// restarting after in-place revisits.
    pub(crate) fn run_to_completion(&mut self) -> RunOutcome {
        loop {
            match self.run_once() {
                Ok(outcome) => return outcome,
                Err(RestartRun) => continue,
            }
        }
    }

    fn run_once(&mut self) -> Result<RunOutcome, RestartRun> {
        let mut interp = Interpreter::new(self.module);
        interp.spawn_main();
        if self.graph.num_threads() == 0 {
            self.graph.append(EventLabel::new(
                Event::new(0, 0),
                MemOrdering::Acquire,
                LabelKind::ThreadStart {
                    create: Event::initializer(),
                    info: ThreadInfo::new(0, -1, 0, SVal::new(0)),
                },
            ));
        }

        // Replay phase: walk the recorded labels in creation order,
        // re-running each owning thread up to its recorded suspension
        // point. Determinism makes the interpreter reproduce the same
        // event stream; only the revisited read (whose suffix was cut)
        // will diverge, and it has nothing recorded after it.
        for pos in self.graph.events_by_stamp() {
            if let Err(e) = self.replay_label(&mut interp, pos) {
                return Ok(self.error_outcome(pos.thread, e));
            }
        }

        // Extension phase.
        let mut waiting: AHashMap<i32, i32> = AHashMap::new();
        loop {
            waiting.retain(|_, child| interp.status(*child) != ThreadStatus::Finished);
            let schedulable: Vec<i32> = (0..interp.num_threads() as i32)
                .filter(|&t| {
                    interp.status(t) == ThreadStatus::Runnable && !waiting.contains_key(&t)
                })
                .collect();
            let Some(tid) = self.scheduler.pick(&self.graph, &schedulable) else {
                break;
            };
            match interp.step(tid) {
                Ok(StepResult::Idle) => continue,
                Ok(StepResult::Finished { result }) => {
                    let pos = self.next_pos(tid);
                    self.graph.append(EventLabel::new(
                        pos,
                        MemOrdering::Release,
                        LabelKind::ThreadFinish { joined_by: None, result },
                    ));
                    interp.finish(tid, result);
                }
                Ok(StepResult::Event(ev)) => {
                    match self.handle_event(&mut interp, &mut waiting, tid, ev) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Moot) => return Ok(RunOutcome::Moot),
                        Ok(Flow::BoundPruned) => return Ok(RunOutcome::BoundPruned),
                        Ok(Flow::Restart) => return Err(RestartRun),
                        Ok(Flow::Race(v)) => return Ok(RunOutcome::Error(v)),
                        Err(e) => return Ok(self.error_outcome(tid, e)),
                    }
                }
                Err(e) => return Ok(self.error_outcome(tid, e)),
            }
        }

        let all_finished = (0..interp.num_threads() as i32)
            .all(|t| interp.status(t) == ThreadStatus::Finished);
        if all_finished {
            if let (Some(decider), Some(bound)) = (&self.bound, self.config.bound) {
                if decider.exceeds_bound(&self.graph, bound, BoundStrategy::NonSlacked) {
                    return Ok(RunOutcome::BoundPruned);
                }
            }
            if self.checker.is_consistent(&self.graph, CheckPoint::Final)
                != ConsistencyStatus::Ok
            {
                return Ok(RunOutcome::Moot);
            }
            if self.config.symmetry_reduction && self.symmetry_moot() {
                return Ok(RunOutcome::Moot);
            }
            let leaks = interp.arena().live_heap_regions();
            if !leaks.is_empty() {
                let (addr, size) = leaks[0];
                return Ok(RunOutcome::Error(Verdict {
                    kind: VerdictKind::Leak,
                    thread: 0,
                    pos: None,
                    message: format!("{size} bytes at {addr} never freed"),
                    graph_dump: self.maybe_dump(),
                }));
            }
            trace!(target: "driver", graph = %self.graph, "complete_execution");
            return Ok(RunOutcome::Complete);
        }

        // Some thread is parked. A join that can never be answered is a
        // deadlock; assume- and lock-parked threads are ordinary blocked
        // executions (other branches rotate the writes that wake them).
        let pure_join_cycle = !waiting.is_empty()
            && (0..interp.num_threads() as i32).all(|t| {
                interp.status(t) == ThreadStatus::Finished || waiting.contains_key(&t)
            });
        if pure_join_cycle {
            if self.checker.is_consistent(&self.graph, CheckPoint::AtError)
                != ConsistencyStatus::Ok
            {
                return Ok(RunOutcome::Moot);
            }
            let (&t, &child) = waiting.iter().next().expect("checked non-empty");
            return Ok(RunOutcome::Error(Verdict {
                kind: VerdictKind::Deadlock,
                thread: t,
                pos: None,
                message: format!("thread {t} joins thread {child}, which never finishes"),
                graph_dump: self.maybe_dump(),
            }));
        }
        let parked: Vec<i32> = (0..interp.num_threads() as i32)
            .filter(|&t| interp.status(t) == ThreadStatus::Blocked)
            .collect();
        let barrier_only = !parked.is_empty()
            && parked.iter().all(|&t| {
                matches!(
                    self.graph.last_of(t).map(EventLabel::kind),
                    Some(LabelKind::Assume { kind: core_event::AssumeKind::Barrier })
                )
            });
        Ok(RunOutcome::Blocked { barrier_only })
    }

    fn next_pos(&self, tid: i32) -> Event {
        Event::new(tid, self.graph.thread_size(tid) as i32)
    }

    fn maybe_dump(&self) -> Option<String> {
        self.config
            .dump_graphs
            .then(|| self.graph.render_with_names(&self.module.info.var_names))
    }

    fn error_outcome(&mut self, tid: i32, err: InterpError) -> RunOutcome {
        // Errors only count on consistent graphs.
        if self.checker.is_consistent(&self.graph, CheckPoint::AtError) != ConsistencyStatus::Ok
        {
            return RunOutcome::Moot;
        }
        RunOutcome::Error(Verdict {
            kind: classify(&err),
            thread: tid,
            pos: self.graph.last_of(tid).map(EventLabel::pos),
            message: err.to_string(),
            graph_dump: self.maybe_dump(),
        })
    }

    // -----------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------

    fn replay_label(
        &mut self,
        interp: &mut Interpreter<'m>,
        pos: Event,
    ) -> Result<(), InterpError> {
        let tid = pos.thread;
        match self.graph.label(pos).kind().clone() {
            LabelKind::ThreadStart { .. } => {
                debug_assert!(
                    (tid as usize) < interp.num_threads(),
                    "start replayed before its create"
                );
            }
            LabelKind::ThreadFinish { result, .. } => {
                match interp.step(tid)? {
                    StepResult::Finished { result: r } => {
                        debug_assert_eq!(r, result, "replay diverged at finish");
                        interp.finish(tid, r);
                    }
                    other => unreachable!("finish label vs interpreter {other:?}"),
                }
            }
            LabelKind::Read(_) => {
                self.expect_event(interp, tid)?;
                interp.resume_with(tid, pos, self.graph.value_read(pos))?;
            }
            LabelKind::Write(_)
            | LabelKind::Fence
            | LabelKind::SmpFence { .. }
            | LabelKind::RcuLock
            | LabelKind::RcuUnlock
            | LabelKind::RcuSync
            | LabelKind::Malloc { .. }
            | LabelKind::Free { .. }
            | LabelKind::LockLapor { .. }
            | LabelKind::UnlockLapor { .. }
            | LabelKind::DskOpen { .. }
            | LabelKind::DskFsync { .. }
            | LabelKind::DskSync
            | LabelKind::DskPbarrier => {
                self.expect_event(interp, tid)?;
            }
            LabelKind::ThreadCreate { child } => {
                let ev = self.expect_event(interp, tid)?;
                let PendingKind::ThreadCreate { fun, arg } = ev.kind else {
                    unreachable!("create label vs interpreter {:?}", ev.kind)
                };
                let spawned = interp.spawn(fun, arg);
                debug_assert_eq!(spawned, child, "replay spawned threads out of order");
                interp.resume_with(tid, pos, Some(SVal::new(child as u64)))?;
            }
            LabelKind::ThreadJoin { child } => {
                self.expect_event(interp, tid)?;
                let result = interp.thread(child).result();
                interp.resume_with(tid, pos, Some(result))?;
            }
            LabelKind::Assume { .. } | LabelKind::Block => {
                self.expect_event(interp, tid)?;
                interp.block(tid);
            }
            LabelKind::Optional { expanded } => {
                self.expect_event(interp, tid)?;
                interp.resume_with(tid, pos, Some(SVal::from(expanded)))?;
            }
        }
        Ok(())
    }

    fn expect_event(
        &mut self,
        interp: &mut Interpreter<'m>,
        tid: i32,
    ) -> Result<PendingEvent, InterpError> {
        match interp.step(tid)? {
            StepResult::Event(ev) => Ok(ev),
            other => unreachable!("recorded label but interpreter yielded {other:?}"),
        }
    }

    // -----------------------------------------------------------------
    // Extension
    // -----------------------------------------------------------------

    fn handle_event(
        &mut self,
        interp: &mut Interpreter<'m>,
        waiting: &mut AHashMap<i32, i32>,
        tid: i32,
        ev: PendingEvent,
    ) -> Result<Flow, InterpError> {
        let pos = self.next_pos(tid);
        // A join on a still-running thread is not consumed: park the event
        // and retry once the child finishes.
        if let PendingKind::ThreadJoin { tid: child } = ev.kind {
            if interp.status(child) != ThreadStatus::Finished {
                waiting.insert(tid, child);
                interp.defer(tid, ev);
                return Ok(Flow::Continue);
            }
        }
        match ev.kind {
            PendingKind::Load { access, kind, annot } => {
                self.graph.append(
                    EventLabel::new(
                        pos,
                        ev.ord,
                        LabelKind::Read(ReadLabel {
                            access,
                            rf: None,
                            kind,
                            revisitable: true,
                            annot,
                        }),
                    )
                    .with_deps(ev.deps),
                );
                if let Some(flow) = self.race_flow(pos) {
                    return Ok(flow);
                }
                let candidates = self.graph.coherent_stores(access.addr, pos);
                let read = self.graph.label(pos).as_read().expect("just appended");
                let admitted: Vec<Event> = candidates
                    .iter()
                    .copied()
                    .filter(|&w| read.admits(self.store_value(w, access.addr)))
                    .collect();
                // When no candidate can satisfy the read's assume, take any
                // store and let the assume park the thread.
                let pool = if admitted.is_empty() { &candidates } else { &admitted };
                let chosen = *pool.last().expect("initializer is always a candidate");
                for &w in pool.iter().filter(|&&w| w != chosen) {
                    self.work.push(
                        self.graph.label(pos).stamp(),
                        Revisit::Forward { read: pos, rf: w },
                    );
                }
                self.graph.set_rf(pos, Some(chosen));
                if let Some(flow) = self.gate(pos) {
                    return Ok(flow);
                }
                interp.resume_with(tid, pos, self.graph.value_read(pos))?;
            }
            PendingKind::Store { access, value, kind, attrs } => {
                let is_rmw = matches!(
                    kind,
                    core_graph::WriteKind::Fai { .. } | core_graph::WriteKind::Cas { .. }
                );
                self.graph.append(
                    EventLabel::new(
                        pos,
                        ev.ord,
                        LabelKind::Write(WriteLabel {
                            access,
                            value,
                            kind,
                            attrs,
                            msg_view: core_view::View::new(),
                        }),
                    )
                    .with_deps(ev.deps),
                );
                if let Some(flow) = self.race_flow(pos) {
                    return Ok(flow);
                }
                let (lo, hi) = self.graph.possible_co_places(access.addr, pos, is_rmw);
                self.graph.insert_co(access.addr, hi, pos);
                let stamp = self.graph.label(pos).stamp();
                for offset in lo..hi {
                    self.work.push(stamp, Revisit::CoPlace { write: pos, offset });
                }
                // The gate result is needed up front, but the backward
                // revisits must be queued even when this branch dies: an
                // RMW atomicity conflict is itself moot, yet rotating the
                // conflicting read to this write is how the other update
                // order is ever explored.
                let moot = self.gate(pos);
                let mut ipr_target: Option<Event> = None;
                for r in self.graph.coherent_revisits(pos) {
                    let read = self.graph.label(r).as_read().expect("revisit targets reads");
                    if !read.admits(value) {
                        continue;
                    }
                    let blocked_after = (r.index as usize + 1) < self.graph.thread_size(r.thread)
                        && self
                            .graph
                            .thread_labels(r.thread)
                            .iter()
                            .skip(r.index as usize + 1)
                            .all(EventLabel::is_blocking);
                    // In-place revisiting is only sound while no pending
                    // choice anchors at or above the read: a later pop
                    // would otherwise see the rewired read with its new
                    // source already cut away.
                    let anchors_below = self
                        .work
                        .max_stamp()
                        .map_or(true, |s| s < self.graph.label(r).stamp());
                    if moot.is_none()
                        && ipr_target.is_none()
                        && self.config.ipr
                        && blocked_after
                        && anchors_below
                        && self.checker.can_revisit_in_place(&self.graph, r)
                    {
                        ipr_target = Some(r);
                    } else {
                        let prefix = self.graph.prefix_to_save_not_before(pos, r);
                        self.work.push(
                            self.graph.label(r).stamp(),
                            Revisit::Backward { read: r, write: pos, prefix },
                        );
                    }
                }
                if let Some(flow) = moot {
                    return Ok(flow);
                }
                if let Some(r) = ipr_target {
                    // The parked continuation explores nothing, so
                    // rerouting the read loses no behavior and needs no
                    // restriction.
                    while self.graph.thread_size(r.thread) > r.index as usize + 1 {
                        let popped = self.graph.pop_block_label(r.thread);
                        debug_assert!(popped, "suffix checked blocking");
                    }
                    self.graph.set_rf(r, Some(pos));
                    trace!(target: "driver", read = %r, write = %pos, "in_place_revisit");
                    return Ok(Flow::Restart);
                }
            }
            PendingKind::Fence => {
                self.graph
                    .append(EventLabel::new(pos, ev.ord, LabelKind::Fence).with_deps(ev.deps));
            }
            PendingKind::SmpFence { kind } => {
                self.graph
                    .append(EventLabel::new(pos, ev.ord, LabelKind::SmpFence { kind }));
            }
            PendingKind::RcuLock => {
                self.graph.append(EventLabel::new(pos, ev.ord, LabelKind::RcuLock));
            }
            PendingKind::RcuUnlock => {
                self.graph.append(EventLabel::new(pos, ev.ord, LabelKind::RcuUnlock));
            }
            PendingKind::RcuSync => {
                self.graph.append(EventLabel::new(pos, ev.ord, LabelKind::RcuSync));
            }
            PendingKind::Malloc { addr, size, duration, space } => {
                self.graph.append(EventLabel::new(
                    pos,
                    ev.ord,
                    LabelKind::Malloc { addr, size, duration, space },
                ));
            }
            PendingKind::Free { addr } => {
                self.graph
                    .append(EventLabel::new(pos, ev.ord, LabelKind::Free { addr }));
            }
            PendingKind::DskOpen { path, fd } => {
                self.graph
                    .append(EventLabel::new(pos, ev.ord, LabelKind::DskOpen { path, fd }));
            }
            PendingKind::DskFsync { inode, size } => {
                self.graph
                    .append(EventLabel::new(pos, ev.ord, LabelKind::DskFsync { inode, size }));
            }
            PendingKind::DskSync => {
                self.graph.append(EventLabel::new(pos, ev.ord, LabelKind::DskSync));
            }
            PendingKind::DskPbarrier => {
                self.graph
                    .append(EventLabel::new(pos, ev.ord, LabelKind::DskPbarrier));
            }
            PendingKind::ThreadCreate { fun, arg } => {
                let child = interp.num_threads() as i32;
                let symm_id = self.symmetry_candidate(tid, fun.0, arg, child);
                self.graph.append(EventLabel::new(
                    pos,
                    MemOrdering::Release,
                    LabelKind::ThreadCreate { child },
                ));
                let spawned = interp.spawn(fun, arg);
                debug_assert_eq!(spawned, child);
                let info = ThreadInfo::new(child, tid, fun.0, arg).with_symmetry(symm_id);
                self.graph.append(EventLabel::new(
                    Event::new(child, 0),
                    MemOrdering::Acquire,
                    LabelKind::ThreadStart { create: pos, info },
                ));
                interp.resume_with(tid, pos, Some(SVal::new(child as u64)))?;
            }
            PendingKind::ThreadJoin { tid: child } => {
                self.graph.append(EventLabel::new(
                    pos,
                    MemOrdering::Acquire,
                    LabelKind::ThreadJoin { child },
                ));
                let finish = Event::new(child, self.graph.thread_size(child) as i32 - 1);
                self.graph.set_joined_by(finish, Some(pos));
                let result = interp.thread(child).result();
                interp.resume_with(tid, pos, Some(result))?;
            }
            PendingKind::AssumeBlocked { kind } => {
                self.graph
                    .append(EventLabel::new(pos, MemOrdering::NotAtomic, LabelKind::Assume { kind }));
                interp.block(tid);
            }
            PendingKind::LockBlocked => {
                self.graph
                    .append(EventLabel::new(pos, MemOrdering::NotAtomic, LabelKind::Block));
                interp.block(tid);
            }
            PendingKind::OptBegin => {
                self.graph.append(EventLabel::new(
                    pos,
                    MemOrdering::NotAtomic,
                    LabelKind::Optional { expanded: false },
                ));
                interp.resume_with(tid, pos, Some(SVal::new(0)))?;
            }
        }
        Ok(Flow::Continue)
    }

    /// The value a candidate store would hand a read (poison reported as 0
    /// for annotation purposes: unknown never prunes there).
    fn store_value(&self, w: Event, addr: core_event::SAddr) -> SVal {
        if w.is_initializer() {
            self.graph.init_value(addr).unwrap_or(SVal::new(0))
        } else {
            self.graph.label(w).val_of().expect("candidates are writes")
        }
    }

    /// Consistency and bound gate after a graph mutation.
    fn gate(&mut self, _pos: Event) -> Option<Flow> {
        if self.checker.is_consistent(&self.graph, CheckPoint::BeforeStep)
            != ConsistencyStatus::Ok
        {
            return Some(Flow::Moot);
        }
        if let (Some(decider), Some(bound)) = (&self.bound, self.config.bound) {
            if decider.exceeds_bound(&self.graph, bound, BoundStrategy::Slacked) {
                return Some(Flow::BoundPruned);
            }
        }
        None
    }

    fn race_flow(&mut self, pos: Event) -> Option<Flow> {
        let racy = self.find_race(pos)?;
        if self.checker.is_consistent(&self.graph, CheckPoint::AtError) != ConsistencyStatus::Ok
        {
            return Some(Flow::Moot);
        }
        Some(Flow::Race(Verdict {
            kind: VerdictKind::Race,
            thread: pos.thread,
            pos: Some(pos),
            message: format!("conflicting unordered access with {racy}"),
            graph_dump: self.maybe_dump(),
        }))
    }
}

struct RestartRun;
