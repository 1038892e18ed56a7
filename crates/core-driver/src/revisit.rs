use core_event::{Event, Stamp};
use core_graph::SavedPrefix;

/// One alternative the exploration still owes a visit. Choices are
/// partitioned into disjoint subtrees by their `(read, new_rf)` and
/// `(write, co_offset)` keys, which is what makes the enumeration visit
/// each consistent execution exactly once.
#[derive(Debug, Clone)]
pub enum Revisit {
    /// Re-point an existing read at a sibling store chosen when the read
    /// was created.
    Forward { read: Event, rf: Event },
    /// Re-insert a write at an alternative coherence offset.
    CoPlace { write: Event, offset: usize },
    /// Re-point an older read at a newer write, restoring the write's
    /// saved porf prefix first.
    Backward { read: Event, write: Event, prefix: SavedPrefix },
}

impl Revisit {
    /// The event whose stamp anchors the restriction for this item.
    pub fn anchor(&self) -> Event {
        match self {
            Revisit::Forward { read, .. } | Revisit::Backward { read, .. } => *read,
            Revisit::CoPlace { write, .. } => *write,
        }
    }
}

/// The pending-choice stack, ordered by anchor stamp. Popping always takes
/// the deepest (largest-stamp) item, and among items of the same anchor the
/// most recently pushed, so subtrees are exhausted before their parents.
#[derive(Debug, Default)]
pub struct WorkSet {
    items: Vec<(Stamp, Revisit)>,
}

impl WorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, stamp: Stamp, item: Revisit) {
        let at = self.items.partition_point(|(s, _)| *s <= stamp);
        self.items.insert(at, (stamp, item));
    }

    pub fn pop(&mut self) -> Option<(Stamp, Revisit)> {
        self.items.pop()
    }

    /// The deepest pending anchor, if any.
    pub fn max_stamp(&self) -> Option<Stamp> {
        self.items.last().map(|(s, _)| *s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fwd(t: i32, i: i32) -> Revisit {
        Revisit::Forward { read: Event::new(t, i), rf: Event::initializer() }
    }

    #[test]
    fn pops_deepest_anchor_first() {
        let mut w = WorkSet::new();
        w.push(Stamp::new(3), fwd(0, 3));
        w.push(Stamp::new(7), fwd(0, 7));
        w.push(Stamp::new(5), fwd(0, 5));
        assert_eq!(w.pop().unwrap().0, Stamp::new(7));
        assert_eq!(w.pop().unwrap().0, Stamp::new(5));
        assert_eq!(w.pop().unwrap().0, Stamp::new(3));
        assert!(w.pop().is_none());
    }

    #[test]
    fn same_anchor_pops_most_recent_first() {
        let mut w = WorkSet::new();
        w.push(Stamp::new(4), Revisit::Forward { read: Event::new(1, 2), rf: Event::new(0, 1) });
        w.push(Stamp::new(4), Revisit::Forward { read: Event::new(1, 2), rf: Event::new(2, 1) });
        let (_, first) = w.pop().unwrap();
        match first {
            Revisit::Forward { rf, .. } => assert_eq!(rf, Event::new(2, 1)),
            other => panic!("unexpected item {other:?}"),
        }
    }
}
