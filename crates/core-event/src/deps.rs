use std::fmt;

use crate::event::Event;

/// An ordered set of events a value or an access depends on.
///
/// Kept sorted so union and containment stay cheap for the small sets that
/// show up in practice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepInfo {
    set: Vec<Event>,
}

impl DepInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_event(e: Event) -> Self {
        Self { set: vec![e] }
    }

    pub fn contains(&self, e: Event) -> bool {
        self.set.binary_search(&e).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn insert(&mut self, e: Event) {
        if let Err(at) = self.set.binary_search(&e) {
            self.set.insert(at, e);
        }
    }

    /// Union the other set into this one.
    pub fn update(&mut self, other: &DepInfo) {
        for &e in &other.set {
            self.insert(e);
        }
    }

    pub fn clear(&mut self) {
        self.set.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.set.iter().copied()
    }

    /// Drop every event not contained in `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(Event) -> bool) {
        self.set.retain(|&e| keep(e));
    }
}

impl fmt::Display for DepInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.set.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, "]")
    }
}

/// The dependency slots attached to a memory-access label, consumed by the
/// dependency-tracking models to build `ppo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDeps {
    pub addr: DepInfo,
    pub data: DepInfo,
    pub ctrl: DepInfo,
    pub addr_po: DepInfo,
    pub cas: DepInfo,
}

impl EventDeps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.addr.is_empty()
            && self.data.is_empty()
            && self.ctrl.is_empty()
            && self.addr_po.is_empty()
            && self.cas.is_empty()
    }

    /// All slots flattened, for consumers that only care about membership.
    pub fn all(&self) -> DepInfo {
        let mut out = self.addr.clone();
        out.update(&self.data);
        out.update(&self.ctrl);
        out.update(&self.addr_po);
        out.update(&self.cas);
        out
    }
}
