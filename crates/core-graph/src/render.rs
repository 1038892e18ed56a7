use std::fmt;

use crate::graph::ExecutionGraph;

/// Stable text rendering of an execution: threads in id order, labels in
/// program order, reads annotated with their source. Diff-friendly output
/// for `--dump-graphs` and for error reports.
impl fmt::Display for ExecutionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in 0..self.num_threads() as i32 {
            writeln!(f, "thread {t}:")?;
            for label in self.thread_labels(t) {
                writeln!(f, "  {label}")?;
            }
        }
        let mut addrs: Vec<_> = self.co.keys().copied().collect();
        addrs.sort_unstable();
        for addr in addrs {
            let order = &self.co[&addr];
            if order.is_empty() {
                continue;
            }
            write!(f, "co {addr}:")?;
            for w in order {
                write!(f, " {w}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl ExecutionGraph {
    /// Render with source-variable names substituted for raw addresses,
    /// for error reports.
    pub fn render_with_names(
        &self,
        names: &ahash::AHashMap<core_event::SAddr, String>,
    ) -> String {
        let mut out = self.to_string();
        for (addr, name) in names {
            out = out.replace(&addr.to_string(), name);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::label::{EventLabel, LabelKind, WriteKind, WriteLabel};
    use crate::ExecutionGraph;
    use core_event::{
        AAccess, AType, ASize, Event, MemOrdering, SAddr, SVal, ThreadInfo, WriteAttr,
    };
    use core_view::View;

    #[test]
    fn render_is_stable_and_mentions_coherence() {
        let x = SAddr::static_addr(8);
        let mut g = ExecutionGraph::new(false);
        g.append(EventLabel::new(
            Event::new(0, 0),
            MemOrdering::Acquire,
            LabelKind::ThreadStart {
                create: Event::initializer(),
                info: ThreadInfo::new(0, -1, 0, SVal::new(0)),
            },
        ));
        let w = g.append(EventLabel::new(
            Event::new(0, 1),
            MemOrdering::Relaxed,
            LabelKind::Write(WriteLabel {
                access: AAccess::new(x, ASize::new(4), AType::Unsigned),
                value: SVal::new(3),
                kind: WriteKind::Plain,
                attrs: WriteAttr::empty(),
                msg_view: View::new(),
            }),
        ));
        g.insert_co(x, 0, w);
        let out = g.to_string();
        assert!(out.contains("thread 0:"));
        assert!(out.contains("co G#(0, 8):"));
        assert_eq!(out, g.to_string());
    }
}
