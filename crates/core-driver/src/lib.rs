//! The exploration driver: owns the execution graph, the consistency
//! checker and a stack of pending choices, and enumerates every
//! maximally-consistent execution of a module exactly once.
//!
//! One complete run works the graph forward (replay recorded labels in
//! stamp order, then extend by scheduling threads); every read records its
//! sibling reads-from choices, every write records its alternative
//! coherence slots and the older reads it could serve. Popping a choice
//! restricts the graph to the choice's anchor stamp inside one transaction
//! and re-runs. Backtracking state never leaks between branches: anything
//! deeper than an anchor is cut before the anchor's alternative is taken.

mod moot;
mod revisit;
mod run;
mod schedule;
mod verdict;

pub use revisit::{Revisit, WorkSet};
pub use run::RunOutcome;
pub use schedule::Scheduler;
pub use verdict::{Report, Verdict, VerdictKind};

use std::time::Instant;

use core_config::Config;
use core_consistency::{BoundDecider, ConsistencyChecker};
use core_graph::ExecutionGraph;
use core_ir::Module;
use tracing::{debug, info};

pub struct Driver<'m> {
    module: &'m Module,
    config: Config,
    graph: ExecutionGraph,
    checker: ConsistencyChecker,
    bound: Option<BoundDecider>,
    work: WorkSet,
    scheduler: Scheduler,
    report: Report,
    histogram: Vec<u64>,
}

impl<'m> Driver<'m> {
    pub fn new(module: &'m Module, config: Config) -> Self {
        let mut graph = ExecutionGraph::new(config.model.tracks_deps());
        for g in &module.globals {
            if let Some(v) = g.init {
                graph.set_init_value(g.addr, v);
            }
        }
        let checker = ConsistencyChecker::new(config.model);
        let bound = BoundDecider::new(config.bound_type);
        let scheduler = Scheduler::new(config.schedule_policy, config.seed);
        Self {
            module,
            config,
            graph,
            checker,
            bound,
            work: WorkSet::new(),
            scheduler,
            report: Report::default(),
            histogram: Vec::new(),
        }
    }

    /// Enumerate the whole behavior space and report.
    pub fn explore(mut self) -> Report {
        let start = Instant::now();
        info!(target: "driver", model = ?self.config.model, "exploration_start");
        loop {
            let outcome = self.run_to_completion();
            self.record(outcome);
            if self.config.stop_on_first_error && self.report.errors_found() {
                break;
            }
            if let Some(limit) = self.config.timeout {
                if start.elapsed() >= limit {
                    self.report.timed_out = true;
                    break;
                }
            }
            let Some((stamp, item)) = self.work.pop() else { break };
            debug!(target: "driver", anchor = %stamp, pending = self.work.len(), "backtrack");
            self.apply(stamp, item);
        }
        self.report.elapsed = start.elapsed();
        if self.config.bounds_histogram {
            self.report.bounds_histogram = Some(std::mem::take(&mut self.histogram));
        }
        info!(
            target: "driver",
            executions = self.report.executions,
            blocked = self.report.blocked,
            errors = self.report.verdicts.len(),
            "exploration_done"
        );
        self.report
    }

    fn record(&mut self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Complete => {
                self.report.executions += 1;
                if self.config.bounds_histogram {
                    if let Some(d) = &self.bound {
                        let n = d.calculate(&self.graph) as usize;
                        if self.histogram.len() <= n {
                            self.histogram.resize(n + 1, 0);
                        }
                        self.histogram[n] += 1;
                    }
                }
            }
            RunOutcome::Blocked { barrier_only } => {
                // Barrier-aware moot: an execution parked only on barrier
                // waits is a rotation of one that completes; drop it.
                if barrier_only && !self.config.disable_bam {
                    return;
                }
                self.report.blocked += 1;
            }
            RunOutcome::BoundPruned => self.report.pruned_bound += 1,
            RunOutcome::Moot => {}
            RunOutcome::Error(v) => {
                debug!(target: "driver", kind = %v.kind, "verdict");
                self.report.verdicts.push(v);
            }
        }
    }

    fn apply(&mut self, stamp: core_event::Stamp, item: Revisit) {
        let removed = self.graph.cut_to_stamp(stamp);
        for label in &removed {
            if let core_graph::LabelKind::Malloc { addr, size, .. } = label.kind() {
                // The simulated region dies with its label; the arena is
                // rebuilt deterministically on replay.
                debug!(target: "driver", %addr, size, "region_released");
            }
        }
        let mut kept = core_view::View::new();
        for t in 0..self.graph.num_threads() as i32 {
            let size = self.graph.thread_size(t) as i32;
            if size > 0 {
                kept.set(core_event::Event::new(t, size - 1));
            }
        }
        self.checker.on_restrict(&kept);
        match item {
            Revisit::Forward { read, rf } => {
                self.graph.set_rf(read, Some(rf));
                self.graph.set_revisitable(read, true);
            }
            Revisit::CoPlace { write, offset } => {
                let addr = self
                    .graph
                    .label(write)
                    .addr_of()
                    .expect("coherence item targets a write");
                self.graph.reposition_co(addr, write, offset);
            }
            Revisit::Backward { read, write, prefix } => {
                self.graph.restore_prefix(prefix);
                self.graph.set_rf(read, Some(write));
                self.graph.set_revisitable(read, false);
                self.checker.on_restore(read);
            }
        }
    }

}
