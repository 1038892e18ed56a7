use core_config::SchedulePolicy;
use core_graph::ExecutionGraph;
use oorandom::Rand64;

/// Thread-selection policy for the extension phase. Replay is always in
/// stamp order; only genuinely new events go through the scheduler, and
/// every policy yields the same execution multiset (the enumeration is
/// policy-independent), so policies only shape exploration order.
pub struct Scheduler {
    policy: SchedulePolicy,
    rng: Rand64,
}

impl Scheduler {
    pub fn new(policy: SchedulePolicy, seed: u64) -> Self {
        Self { policy, rng: Rand64::new(u128::from(seed)) }
    }

    /// Pick one of the schedulable threads.
    pub fn pick(&mut self, g: &ExecutionGraph, schedulable: &[i32]) -> Option<i32> {
        if schedulable.is_empty() {
            return None;
        }
        let chosen = match self.policy {
            SchedulePolicy::Ltr => *schedulable.iter().min().expect("non-empty checked"),
            SchedulePolicy::Arbitrary => {
                schedulable[(self.rng.rand_u64() % schedulable.len() as u64) as usize]
            }
            SchedulePolicy::Wf => *schedulable
                .iter()
                .min_by_key(|&&t| (reads_done(g, t), t))
                .expect("non-empty checked"),
            SchedulePolicy::Wfr => {
                let key = |t: i32| reads_done(g, t);
                let best = schedulable.iter().map(|&t| key(t)).min().expect("non-empty");
                let ties: Vec<i32> =
                    schedulable.iter().copied().filter(|&t| key(t) == best).collect();
                ties[(self.rng.rand_u64() % ties.len() as u64) as usize]
            }
        };
        Some(chosen)
    }
}

/// Writes-first approximation: threads that have consumed fewer reads get
/// to push their writes out first.
fn reads_done(g: &ExecutionGraph, t: i32) -> usize {
    g.thread_labels(t).iter().filter(|l| l.is_read()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ltr_picks_lowest_id() {
        let g = ExecutionGraph::new(false);
        let mut s = Scheduler::new(SchedulePolicy::Ltr, 0);
        assert_eq!(s.pick(&g, &[2, 0, 1]), Some(0));
        assert_eq!(s.pick(&g, &[]), None);
    }

    #[test]
    fn arbitrary_is_deterministic_for_a_seed() {
        let g = ExecutionGraph::new(false);
        let picks = |seed| {
            let mut s = Scheduler::new(SchedulePolicy::Arbitrary, seed);
            (0..8).map(|_| s.pick(&g, &[0, 1, 2]).unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(picks(7), picks(7));
    }
}
