use std::fmt;

use core_event::{
    AAccess, AddressSpace, AssumeKind, Event, EventDeps, MemOrdering, SAddr, SVal,
    SmpFenceKind, Stamp, StorageDuration, ThreadInfo, WriteAttr,
};
use core_ir::Annotation;
use core_view::{DepView, View};

/// Flavour of a read label. RMWs are a read immediately followed by a write
/// at the next index of the same thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadKind {
    Plain,
    /// Fetch-and-inc family read; `is_barrier` marks barrier-wait lowerings
    /// for barrier-aware pruning.
    Fai { is_barrier: bool },
    Cas { expected: SVal, swap: SVal, is_lock: bool },
    Disk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskWriteKind {
    Plain,
    Metadata,
    Directory,
    Journal,
}

/// Flavour of a write label, mirroring `ReadKind` for the RMW variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Plain,
    Fai { is_barrier: bool },
    Cas { is_lock: bool },
    Disk(DiskWriteKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadLabel {
    pub access: AAccess,
    /// The write observed; `None` only between creation and the driver's
    /// reads-from choice.
    pub rf: Option<Event>,
    pub kind: ReadKind,
    /// Whether a later write may still be rotated to serve this read.
    pub revisitable: bool,
    /// Pruning annotation traced from a downstream assume, if any.
    pub annot: Option<Annotation>,
}

impl ReadLabel {
    /// Whether a candidate value can satisfy the read's assume annotation.
    /// Reads without an annotation admit everything.
    pub fn admits(&self, value: SVal) -> bool {
        match &self.annot {
            Some(a) => {
                let regs = a.expr.registers();
                debug_assert_eq!(regs.len(), 1, "annotations hinge on a single load");
                a.admits(regs[0], value)
            }
            None => true,
        }
    }

    pub fn is_rmw(&self) -> bool {
        !matches!(self.kind, ReadKind::Plain | ReadKind::Disk)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteLabel {
    pub access: AAccess,
    pub value: SVal,
    pub kind: WriteKind,
    pub attrs: WriteAttr,
    /// The view a reader synchronizing with this write acquires.
    pub msg_view: View,
}

impl WriteLabel {
    pub fn is_rmw(&self) -> bool {
        matches!(self.kind, WriteKind::Fai { .. } | WriteKind::Cas { .. })
    }
}

/// Kind-specific payload of a label.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelKind {
    ThreadStart { create: Event, info: ThreadInfo },
    ThreadFinish { joined_by: Option<Event>, result: SVal },
    ThreadCreate { child: i32 },
    ThreadJoin { child: i32 },
    Read(ReadLabel),
    Write(WriteLabel),
    Fence,
    SmpFence { kind: SmpFenceKind },
    RcuLock,
    RcuUnlock,
    RcuSync,
    Malloc { addr: SAddr, size: u64, duration: StorageDuration, space: AddressSpace },
    Free { addr: SAddr },
    LockLapor { addr: SAddr },
    UnlockLapor { addr: SAddr },
    DskOpen { path: String, fd: SVal },
    DskFsync { inode: SAddr, size: u64 },
    DskSync,
    DskPbarrier,
    /// Thread parked because an assumption failed.
    Assume { kind: AssumeKind },
    /// Thread parked for a non-assume reason (e.g. a blocked join cycle).
    Block,
    /// Speculative block emitted by an `opt_begin` whose body was skipped.
    Optional { expanded: bool },
}

/// A label: the common header (stamp, position, ordering, views, deps) plus
/// the kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLabel {
    stamp: Stamp,
    pos: Event,
    ord: MemOrdering,
    kind: LabelKind,
    deps: EventDeps,
    hb_view: View,
    porf_view: View,
    ppo_view: DepView,
}

impl EventLabel {
    pub fn new(pos: Event, ord: MemOrdering, kind: LabelKind) -> Self {
        Self {
            stamp: Stamp::new(0),
            pos,
            ord,
            kind,
            deps: EventDeps::new(),
            hb_view: View::new(),
            porf_view: View::new(),
            ppo_view: DepView::new(),
        }
    }

    pub fn with_deps(mut self, deps: EventDeps) -> Self {
        self.deps = deps;
        self
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    pub fn pos(&self) -> Event {
        self.pos
    }

    pub fn ordering(&self) -> MemOrdering {
        self.ord
    }

    pub fn kind(&self) -> &LabelKind {
        &self.kind
    }

    pub fn deps(&self) -> &EventDeps {
        &self.deps
    }

    pub fn hb_view(&self) -> &View {
        &self.hb_view
    }

    pub fn porf_view(&self) -> &View {
        &self.porf_view
    }

    pub fn ppo_view(&self) -> &DepView {
        &self.ppo_view
    }

    pub fn is_at_least_acquire(&self) -> bool {
        self.ord.is_at_least_acquire()
    }

    pub fn is_at_least_release(&self) -> bool {
        self.ord.is_at_least_release()
    }

    pub fn is_sc(&self) -> bool {
        self.ord.is_sc()
    }

    pub fn as_read(&self) -> Option<&ReadLabel> {
        match &self.kind {
            LabelKind::Read(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_write(&self) -> Option<&WriteLabel> {
        match &self.kind {
            LabelKind::Write(w) => Some(w),
            _ => None,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self.kind, LabelKind::Read(_))
    }

    pub fn is_write(&self) -> bool {
        matches!(self.kind, LabelKind::Write(_))
    }

    pub fn is_fence(&self) -> bool {
        matches!(self.kind, LabelKind::Fence | LabelKind::SmpFence { .. })
    }

    pub fn is_mem_access(&self) -> bool {
        self.is_read() || self.is_write()
    }

    /// Whether this label parks its thread.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.kind,
            LabelKind::Assume { .. } | LabelKind::Block | LabelKind::Optional { expanded: false }
        )
    }

    pub fn is_rmw(&self) -> bool {
        match &self.kind {
            LabelKind::Read(r) => r.is_rmw(),
            LabelKind::Write(w) => w.is_rmw(),
            _ => false,
        }
    }

    pub fn addr_of(&self) -> Option<SAddr> {
        match &self.kind {
            LabelKind::Read(r) => Some(r.access.addr),
            LabelKind::Write(w) => Some(w.access.addr),
            LabelKind::Malloc { addr, .. }
            | LabelKind::Free { addr }
            | LabelKind::LockLapor { addr }
            | LabelKind::UnlockLapor { addr } => Some(*addr),
            _ => None,
        }
    }

    /// Value written, for writes.
    pub fn val_of(&self) -> Option<SVal> {
        self.as_write().map(|w| w.value)
    }

    pub fn rf_of(&self) -> Option<Event> {
        self.as_read().and_then(|r| r.rf)
    }

    // Crate-internal mutators: the graph alone assigns stamps and views.

    pub(crate) fn set_stamp(&mut self, stamp: Stamp) {
        self.stamp = stamp;
    }

    pub(crate) fn set_views(&mut self, hb: View, porf: View, ppo: DepView) {
        self.hb_view = hb;
        self.porf_view = porf;
        self.ppo_view = ppo;
    }

    pub(crate) fn kind_mut(&mut self) -> &mut LabelKind {
        &mut self.kind
    }

    pub(crate) fn as_read_mut(&mut self) -> Option<&mut ReadLabel> {
        match &mut self.kind {
            LabelKind::Read(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn as_write_mut(&mut self) -> Option<&mut WriteLabel> {
        match &mut self.kind {
            LabelKind::Write(w) => Some(w),
            _ => None,
        }
    }
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            LabelKind::ThreadStart { .. } => "B".to_string(),
            LabelKind::ThreadFinish { .. } => "E".to_string(),
            LabelKind::ThreadCreate { child } => format!("TC[{child}]"),
            LabelKind::ThreadJoin { child } => format!("TJ[{child}]"),
            LabelKind::Read(r) => {
                let rf = match r.rf {
                    Some(w) => format!("{w}"),
                    None => "?".to_string(),
                };
                format!("R{}({}) [{}]", self.ord, r.access.addr, rf)
            }
            LabelKind::Write(w) => format!("W{}({}, {})", self.ord, w.access.addr, w.value),
            LabelKind::Fence => format!("F{}", self.ord),
            LabelKind::SmpFence { kind } => format!("F[{kind}]"),
            LabelKind::RcuLock => "RCU-L".to_string(),
            LabelKind::RcuUnlock => "RCU-U".to_string(),
            LabelKind::RcuSync => "RCU-S".to_string(),
            LabelKind::Malloc { addr, size, .. } => format!("M({addr}, {size})"),
            LabelKind::Free { addr } => format!("D({addr})"),
            LabelKind::LockLapor { addr } => format!("L({addr})"),
            LabelKind::UnlockLapor { addr } => format!("U({addr})"),
            LabelKind::DskOpen { path, .. } => format!("DO({path})"),
            LabelKind::DskFsync { .. } => "DF".to_string(),
            LabelKind::DskSync => "DS".to_string(),
            LabelKind::DskPbarrier => "DPB".to_string(),
            LabelKind::Assume { .. } => "BLOCK[assume]".to_string(),
            LabelKind::Block => "BLOCK".to_string(),
            LabelKind::Optional { .. } => "OPT".to_string(),
        };
        write!(f, "{}@{}: {}", self.stamp, self.pos, kind)
    }
}
