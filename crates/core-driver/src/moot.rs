use core_event::{Event, MemOrdering, SVal};
use core_graph::LabelKind;

use crate::Driver;

impl<'m> Driver<'m> {
    /// The symmetry peer of a thread about to be created: the latest
    /// existing thread spawned by the same parent with the same body and
    /// argument. -1 when symmetry reduction is off or nothing matches.
    pub(crate) fn symmetry_candidate(
        &self,
        parent: i32,
        fun_id: u32,
        arg: SVal,
        child: i32,
    ) -> i32 {
        if !self.config.symmetry_reduction {
            return -1;
        }
        (0..child)
            .rev()
            .find(|&t| {
                self.graph.thread_start_info(t).is_some_and(|info| {
                    info.parent_id == parent && info.fun_id == fun_id && info.arg == arg
                })
            })
            .unwrap_or(-1)
    }

    /// Symmetry reduction: a completed execution is redundant when some
    /// thread's event sequence is canonically smaller than its symmetric
    /// predecessor's. The canonical order breaks the tie between mirrored
    /// rf rotations by thread id.
    pub(crate) fn symmetry_moot(&self) -> bool {
        for t in 0..self.graph.num_threads() as i32 {
            let Some(info) = self.graph.thread_start_info(t) else { continue };
            let peer = info.symm_id;
            if peer < 0 {
                continue;
            }
            let mine = self.encode_thread(t);
            let theirs = self.encode_thread(peer);
            if mine < theirs {
                return true;
            }
        }
        false
    }

    /// Order-stable encoding of a thread's labels: kind tag, address,
    /// written value and observed-write stamp.
    fn encode_thread(&self, t: i32) -> Vec<(u8, u64, u64, u64)> {
        self.graph
            .thread_labels(t)
            .iter()
            .map(|l| {
                let tag = match l.kind() {
                    LabelKind::ThreadStart { .. } => 0,
                    LabelKind::Read(_) => 1,
                    LabelKind::Write(_) => 2,
                    LabelKind::Fence | LabelKind::SmpFence { .. } => 3,
                    LabelKind::ThreadFinish { .. } => 4,
                    _ => 5,
                };
                let addr = l.addr_of().map(|a| a.get()).unwrap_or(0);
                let val = l.val_of().map(SVal::get).unwrap_or(0);
                let rf = l
                    .rf_of()
                    .map(|w| {
                        if w.is_initializer() {
                            0
                        } else {
                            u64::from(self.graph.label(w).stamp().get()) + 1
                        }
                    })
                    .unwrap_or(0);
                (tag, addr, val, rf)
            })
            .collect()
    }

    /// A race: two overlapping accesses of different threads, at least one
    /// a write, at least one non-atomic, with no happens-before ordering.
    /// Checked when `pos` is created, against every older access.
    pub(crate) fn find_race(&self, pos: Event) -> Option<Event> {
        let label = self.graph.label(pos);
        let access = match label.kind() {
            LabelKind::Read(r) => r.access,
            LabelKind::Write(w) => w.access,
            _ => return None,
        };
        let hb = label.hb_view();
        for other in self.graph.labels() {
            if other.pos() == pos || other.pos().thread == pos.thread {
                continue;
            }
            let other_access = match other.kind() {
                LabelKind::Read(r) => r.access,
                LabelKind::Write(w) => w.access,
                _ => continue,
            };
            if !access.overlaps(&other_access) {
                continue;
            }
            let conflict = label.is_write() || other.is_write();
            let any_na = label.ordering() == MemOrdering::NotAtomic
                || other.ordering() == MemOrdering::NotAtomic;
            if !conflict || !any_na {
                continue;
            }
            // Writes annotated as tolerating write-write races are exempt.
            let tolerated = label.is_write()
                && other.is_write()
                && label
                    .as_write()
                    .zip(other.as_write())
                    .is_some_and(|(a, b)| {
                        a.attrs.contains(core_event::WriteAttr::WW_RACY)
                            && b.attrs.contains(core_event::WriteAttr::WW_RACY)
                    });
            if tolerated {
                continue;
            }
            if !hb.contains(other.pos()) {
                return Some(other.pos());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;
    use core_graph::EventLabel;
    use core_ir::ProgramBuilder;

    fn driver_with_empty_main(config: Config) -> (core_ir::Module, Config) {
        let mut pb = ProgramBuilder::new();
        let mut f = pb.function("main");
        f.ret();
        pb.add_function(f);
        (pb.finish(), config)
    }

    #[test]
    fn race_detection_flags_unordered_na_accesses() {
        let (module, config) = driver_with_empty_main(Config::default());
        let mut driver = Driver::new(&module, config);
        let x = core_event::SAddr::static_addr(8);
        use core_event::{AAccess, AType, ASize, ThreadInfo};
        use core_graph::{ExecutionGraph, ReadKind, ReadLabel, WriteKind, WriteLabel};
        let mut g = ExecutionGraph::new(false);
        for t in 0..2 {
            g.append(EventLabel::new(
                Event::new(t, 0),
                MemOrdering::Acquire,
                LabelKind::ThreadStart {
                    create: Event::initializer(),
                    info: ThreadInfo::new(t, -1, 0, SVal::new(0)),
                },
            ));
        }
        let w = g.append(EventLabel::new(
            Event::new(0, 1),
            MemOrdering::NotAtomic,
            LabelKind::Write(WriteLabel {
                access: AAccess::new(x, ASize::new(4), AType::Unsigned),
                value: SVal::new(1),
                kind: WriteKind::Plain,
                attrs: Default::default(),
                msg_view: Default::default(),
            }),
        ));
        g.insert_co(x, 0, w);
        let r = g.append(EventLabel::new(
            Event::new(1, 1),
            MemOrdering::NotAtomic,
            LabelKind::Read(ReadLabel {
                access: AAccess::new(x, ASize::new(4), AType::Unsigned),
                rf: None,
                kind: ReadKind::Plain,
                revisitable: true,
                annot: None,
            }),
        ));
        g.set_rf(r, Some(w));
        driver.graph = g;
        assert_eq!(driver.find_race(r), Some(w));
    }
}
