use std::fmt;
use std::str::FromStr;

/// C11 memory ordering. Consume is folded into acquire on input, so the
/// discriminant 2 is intentionally unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MemOrdering {
    NotAtomic = 0,
    Relaxed = 1,
    Acquire = 3,
    Release = 4,
    AcquireRelease = 5,
    SequentiallyConsistent = 6,
}

impl MemOrdering {
    /// Whether `self` is strictly stronger than `other`. Release and acquire
    /// are incomparable; this is the C11 strength lattice, not a total order.
    pub fn is_stronger_than(self, other: MemOrdering) -> bool {
        self != other && self.is_at_least(other)
    }

    /// Whether `self` is at least as strong as `other` in the lattice.
    pub fn is_at_least(self, other: MemOrdering) -> bool {
        use MemOrdering::*;
        match (self, other) {
            (a, b) if a == b => true,
            (_, NotAtomic) => true,
            (NotAtomic, _) => false,
            (Relaxed, _) => false,
            (Acquire, Relaxed) => true,
            (Acquire, _) => false,
            (Release, Relaxed) => true,
            (Release, _) => false,
            (AcquireRelease, SequentiallyConsistent) => false,
            (AcquireRelease, _) => true,
            (SequentiallyConsistent, _) => true,
        }
    }

    pub fn is_at_least_acquire(self) -> bool {
        matches!(
            self,
            MemOrdering::Acquire
                | MemOrdering::AcquireRelease
                | MemOrdering::SequentiallyConsistent
        )
    }

    pub fn is_at_least_release(self) -> bool {
        matches!(
            self,
            MemOrdering::Release
                | MemOrdering::AcquireRelease
                | MemOrdering::SequentiallyConsistent
        )
    }

    pub fn is_sc(self) -> bool {
        self == MemOrdering::SequentiallyConsistent
    }

    pub fn is_atomic(self) -> bool {
        self != MemOrdering::NotAtomic
    }
}

impl FromStr for MemOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "na" => Ok(MemOrdering::NotAtomic),
            "rlx" => Ok(MemOrdering::Relaxed),
            "acq" => Ok(MemOrdering::Acquire),
            "rel" => Ok(MemOrdering::Release),
            "acq_rel" => Ok(MemOrdering::AcquireRelease),
            "sc" => Ok(MemOrdering::SequentiallyConsistent),
            other => Err(format!("unknown memory ordering `{other}`")),
        }
    }
}

impl fmt::Display for MemOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemOrdering::NotAtomic => "na",
            MemOrdering::Relaxed => "rlx",
            MemOrdering::Acquire => "acq",
            MemOrdering::Release => "rel",
            MemOrdering::AcquireRelease => "acq_rel",
            MemOrdering::SequentiallyConsistent => "sc",
        };
        f.write_str(s)
    }
}

/// LKMM fence flavours. The `After*` variants order only the po-previous
/// atomic (`ba` = before-atomic, `aa` = after-atomic, `as` = after-spinlock,
/// `aul` = after-unlock-lock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmpFenceKind {
    Mb,
    Rmb,
    Wmb,
    BeforeAtomic,
    AfterAtomic,
    AfterSpinlock,
    AfterUnlockLock,
}

impl SmpFenceKind {
    /// Strong fences order everything and feed the `prop`/`pb` relations.
    pub fn is_strong(self) -> bool {
        matches!(
            self,
            SmpFenceKind::Mb
                | SmpFenceKind::BeforeAtomic
                | SmpFenceKind::AfterAtomic
                | SmpFenceKind::AfterSpinlock
                | SmpFenceKind::AfterUnlockLock
        )
    }

    pub fn orders_reads(self) -> bool {
        self.is_strong() || self == SmpFenceKind::Rmb
    }

    pub fn orders_writes(self) -> bool {
        self.is_strong() || self == SmpFenceKind::Wmb
    }
}

impl FromStr for SmpFenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mb" => Ok(SmpFenceKind::Mb),
            "rmb" => Ok(SmpFenceKind::Rmb),
            "wmb" => Ok(SmpFenceKind::Wmb),
            "ba" => Ok(SmpFenceKind::BeforeAtomic),
            "aa" => Ok(SmpFenceKind::AfterAtomic),
            "as" => Ok(SmpFenceKind::AfterSpinlock),
            "aul" => Ok(SmpFenceKind::AfterUnlockLock),
            other => Err(format!("unknown smp fence kind `{other}`")),
        }
    }
}

impl fmt::Display for SmpFenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SmpFenceKind::Mb => "mb",
            SmpFenceKind::Rmb => "rmb",
            SmpFenceKind::Wmb => "wmb",
            SmpFenceKind::BeforeAtomic => "ba",
            SmpFenceKind::AfterAtomic => "aa",
            SmpFenceKind::AfterSpinlock => "as",
            SmpFenceKind::AfterUnlockLock => "aul",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_acquire_incomparable() {
        assert!(!MemOrdering::Release.is_at_least(MemOrdering::Acquire));
        assert!(!MemOrdering::Acquire.is_at_least(MemOrdering::Release));
        assert!(MemOrdering::AcquireRelease.is_at_least(MemOrdering::Release));
        assert!(MemOrdering::AcquireRelease.is_at_least(MemOrdering::Acquire));
    }

    #[test]
    fn sc_tops_the_lattice() {
        for ord in [
            MemOrdering::NotAtomic,
            MemOrdering::Relaxed,
            MemOrdering::Acquire,
            MemOrdering::Release,
            MemOrdering::AcquireRelease,
            MemOrdering::SequentiallyConsistent,
        ] {
            assert!(MemOrdering::SequentiallyConsistent.is_at_least(ord));
        }
        assert!(!MemOrdering::SequentiallyConsistent
            .is_stronger_than(MemOrdering::SequentiallyConsistent));
    }

    #[test]
    fn orderings_round_trip_through_strings() {
        for s in ["na", "rlx", "acq", "rel", "acq_rel", "sc"] {
            let ord: MemOrdering = s.parse().unwrap();
            assert_eq!(ord.to_string(), s);
        }
        assert!("weird".parse::<MemOrdering>().is_err());
    }

    #[test]
    fn rmb_orders_reads_only() {
        assert!(SmpFenceKind::Rmb.orders_reads());
        assert!(!SmpFenceKind::Rmb.orders_writes());
        assert!(SmpFenceKind::Mb.orders_reads());
        assert!(SmpFenceKind::Mb.orders_writes());
    }
}
