use ahash::AHashMap;
use core_event::{DepInfo, Event, EventDeps};
use core_ir::Reg;

/// Per-thread dependency bookkeeping for the dependency-tracking models.
///
/// Data dependencies are per-register; address and control dependencies
/// are forwards-closed under program order, so a single running set each
/// suffices.
#[derive(Debug, Clone, Default)]
pub struct DepTracker {
    data: AHashMap<Reg, DepInfo>,
    addr_po: DepInfo,
    ctrl: DepInfo,
}

impl DepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_deps(&self, reg: Reg) -> DepInfo {
        self.data.get(&reg).cloned().unwrap_or_default()
    }

    /// The result of `dst` depends on whatever `src` depended on.
    pub fn update_data(&mut self, dst: Reg, src: Reg) {
        let src_deps = self.data_deps(src);
        self.data.entry(dst).or_default().update(&src_deps);
    }

    /// `dst` was produced by the event `e` (a load's destination).
    pub fn set_data_event(&mut self, dst: Reg, e: Event) {
        self.data.insert(dst, DepInfo::from_event(e));
    }

    pub fn update_addr_po(&mut self, src: Reg) {
        let deps = self.data_deps(src);
        self.addr_po.update(&deps);
    }

    pub fn update_ctrl(&mut self, src: Reg) {
        let deps = self.data_deps(src);
        self.ctrl.update(&deps);
    }

    pub fn update_ctrl_event(&mut self, e: Event) {
        self.ctrl.update(&DepInfo::from_event(e));
    }

    /// The dependency slots for an access whose address came through
    /// `addr_reg` and whose value (for writes) came through `data_reg`.
    pub fn deps_for_access(
        &self,
        addr_reg: Option<Reg>,
        data_reg: Option<Reg>,
    ) -> EventDeps {
        let mut deps = EventDeps::new();
        if let Some(r) = addr_reg {
            deps.addr = self.data_deps(r);
        }
        if let Some(r) = data_reg {
            deps.data = self.data_deps(r);
        }
        deps.addr_po = self.addr_po.clone();
        deps.ctrl = self.ctrl.clone();
        deps
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.addr_po.clear();
        self.ctrl.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_deps_flow_through_registers() {
        let mut t = DepTracker::new();
        let e = Event::new(0, 3);
        t.set_data_event(Reg(1), e);
        t.update_data(Reg(2), Reg(1));
        assert!(t.data_deps(Reg(2)).contains(e));
        assert!(t.data_deps(Reg(9)).is_empty());
    }

    #[test]
    fn ctrl_deps_are_cumulative() {
        let mut t = DepTracker::new();
        t.set_data_event(Reg(1), Event::new(0, 1));
        t.update_ctrl(Reg(1));
        t.set_data_event(Reg(2), Event::new(0, 4));
        t.update_ctrl(Reg(2));
        let deps = t.deps_for_access(None, None);
        assert!(deps.ctrl.contains(Event::new(0, 1)));
        assert!(deps.ctrl.contains(Event::new(0, 4)));
    }
}
