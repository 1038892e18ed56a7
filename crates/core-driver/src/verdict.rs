use std::fmt;
use std::time::Duration;

use core_event::Event;
use core_interp::InterpError;

/// Outcome classification of one complete or error-terminated execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictKind {
    Ok,
    AssertionViolation,
    Race,
    Uninitialized,
    Deadlock,
    Leak,
    MemoryError,
    ModelViolation,
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerdictKind::Ok => "ok",
            VerdictKind::AssertionViolation => "assertion_violation",
            VerdictKind::Race => "race",
            VerdictKind::Uninitialized => "uninitialized",
            VerdictKind::Deadlock => "deadlock",
            VerdictKind::Leak => "leak",
            VerdictKind::MemoryError => "memory_error",
            VerdictKind::ModelViolation => "model_violation",
        };
        f.write_str(s)
    }
}

/// One erroneous execution, with the offending event and an optional text
/// rendering of the graph that exhibited it.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub thread: i32,
    pub pos: Option<Event>,
    pub message: String,
    pub graph_dump: Option<String>,
}

pub(crate) fn classify(err: &InterpError) -> VerdictKind {
    match err {
        InterpError::AssertionFailure => VerdictKind::AssertionViolation,
        InterpError::UninitializedRead(_) => VerdictKind::Uninitialized,
        InterpError::InvalidFree(_)
        | InterpError::AccessOutOfBounds(_)
        | InterpError::UnalignedAtomic(_) => VerdictKind::MemoryError,
        InterpError::BadIndirectCall
        | InterpError::BadJoin(_)
        | InterpError::UnreachableExecuted => VerdictKind::ModelViolation,
    }
}

/// Aggregate result of an exploration.
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// Consistent complete executions.
    pub executions: u64,
    /// Executions ending with some thread parked.
    pub blocked: u64,
    /// Executions discarded by the bound decider.
    pub pruned_bound: u64,
    /// Distinct erroneous executions.
    pub verdicts: Vec<Verdict>,
    pub elapsed: Duration,
    pub timed_out: bool,
    /// Executions per bound measure, when requested.
    pub bounds_histogram: Option<Vec<u64>>,
}

impl Report {
    pub fn errors_found(&self) -> bool {
        !self.verdicts.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "complete executions explored: {}", self.executions)?;
        if self.blocked > 0 {
            writeln!(f, "blocked executions seen: {}", self.blocked)?;
        }
        if self.pruned_bound > 0 {
            writeln!(f, "executions pruned by bound: {}", self.pruned_bound)?;
        }
        if let Some(hist) = &self.bounds_histogram {
            write!(f, "bound histogram:")?;
            for (i, n) in hist.iter().enumerate() {
                write!(f, " {i}:{n}")?;
            }
            writeln!(f)?;
        }
        for v in &self.verdicts {
            write!(f, "{}: {}", v.kind, v.message)?;
            if let Some(pos) = v.pos {
                write!(f, " at {pos}")?;
            }
            writeln!(f, " (thread {})", v.thread)?;
            if let Some(dump) = &v.graph_dump {
                writeln!(f, "{dump}")?;
            }
        }
        if self.timed_out {
            writeln!(f, "exploration timed out; results are partial")?;
        }
        write!(f, "wall-clock: {:.2?}", self.elapsed)
    }
}
