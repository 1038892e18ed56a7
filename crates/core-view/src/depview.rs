use std::fmt;

use core_event::Event;

use crate::View;

/// A vector clock whose per-thread prefix may be non-contiguous: besides the
/// maximum index it records "holes", indices below the maximum that are not
/// in the clock. This is the shape of a prefix under a dependency relation,
/// where an event may depend on a late event without depending on everything
/// before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepView {
    view: View,
    /// Sorted per-thread hole indices. Grown lazily alongside `view`.
    holes: Vec<Vec<i32>>,
}

impl DepView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    pub fn get(&self, thread: i32) -> i32 {
        self.view.get(thread)
    }

    pub fn set(&mut self, e: Event) {
        self.view.set(e);
        self.grow_holes(e.thread);
    }

    pub fn update_idx(&mut self, e: Event) {
        self.view.update_idx(e);
        self.grow_holes(e.thread);
    }

    pub fn contains(&self, e: Event) -> bool {
        if e.is_initializer() {
            return true;
        }
        e.index <= self.get(e.thread) && !self.is_hole(e)
    }

    fn is_hole(&self, e: Event) -> bool {
        self.holes_of(e.thread)
            .map(|hs| hs.binary_search(&e.index).is_ok())
            .unwrap_or(false)
    }

    fn holes_of(&self, thread: i32) -> Option<&Vec<i32>> {
        if thread < 0 {
            return None;
        }
        self.holes.get(thread as usize)
    }

    fn grow_holes(&mut self, thread: i32) {
        debug_assert!(thread >= 0);
        let t = thread as usize;
        if t >= self.holes.len() {
            self.holes.resize_with(t + 1, Vec::new);
        }
    }

    /// Mark `e` as not being in the clock. `e` must lie below the thread
    /// maximum, otherwise it would simply be outside the view.
    pub fn add_hole(&mut self, e: Event) {
        debug_assert!(e.index <= self.get(e.thread), "hole above view maximum");
        self.grow_holes(e.thread);
        let hs = &mut self.holes[e.thread as usize];
        if let Err(at) = hs.binary_search(&e.index) {
            hs.insert(at, e.index);
        }
    }

    /// Punch holes at `[from.index, until_index)` in `from.thread`.
    pub fn add_holes_in_range(&mut self, from: Event, until_index: i32) {
        for i in from.index..until_index {
            self.add_hole(Event::new(from.thread, i));
        }
    }

    pub fn remove_hole(&mut self, e: Event) {
        self.grow_holes(e.thread);
        let hs = &mut self.holes[e.thread as usize];
        if let Ok(at) = hs.binary_search(&e.index) {
            hs.remove(at);
        }
    }

    pub fn remove_all_holes(&mut self, thread: i32) {
        self.grow_holes(thread);
        self.holes[thread as usize].clear();
    }

    pub fn remove_holes_in_range(&mut self, from: Event, until_index: i32) {
        for i in from.index..until_index {
            self.remove_hole(Event::new(from.thread, i));
        }
    }

    /// Merge with another dependency view.
    ///
    /// Below both maxima a hole survives only if it is a hole in both
    /// operands; above the smaller maximum the holes of the operand that
    /// reaches higher are carried over unchanged.
    pub fn merge_with(&mut self, other: &DepView) -> &mut Self {
        if other.is_empty() {
            return self;
        }
        let len = self.len().max(other.len());
        for t in 0..len as i32 {
            let my_max = self.get(t);
            let their_max = other.get(t);
            let mine = self.holes_of(t).cloned().unwrap_or_default();
            let theirs = other.holes_of(t).cloned().unwrap_or_default();

            let mut merged: Vec<i32> = mine
                .iter()
                .copied()
                .filter(|i| theirs.binary_search(i).is_ok())
                .collect();
            if my_max < their_max {
                merged.extend(theirs.iter().copied().filter(|&i| i > my_max));
                self.view.set(Event::new(t, their_max));
            } else {
                merged.extend(mine.iter().copied().filter(|&i| i > their_max));
            }
            merged.sort_unstable();
            merged.dedup();
            self.grow_holes(t);
            self.holes[t as usize] = merged;
        }
        self
    }

    /// The downward-closed view obtained by forgetting the holes.
    pub fn to_view(&self) -> View {
        self.view.clone()
    }
}

impl fmt::Display for DepView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for t in 0..self.len() as i32 {
            write!(f, "\t{}: {} ( ", t, self.get(t))?;
            if let Some(hs) = self.holes_of(t) {
                for h in hs {
                    write!(f, "{h} ")?;
                }
            }
            writeln!(f, ")")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dv(max: &[(i32, i32)], holes: &[(i32, i32)]) -> DepView {
        let mut v = DepView::new();
        for &(t, i) in max {
            v.set(Event::new(t, i));
        }
        for &(t, i) in holes {
            v.add_hole(Event::new(t, i));
        }
        v
    }

    #[test]
    fn holes_exclude_events_below_the_max() {
        let v = dv(&[(0, 5)], &[(0, 2), (0, 3)]);
        assert!(v.contains(Event::new(0, 1)));
        assert!(!v.contains(Event::new(0, 2)));
        assert!(!v.contains(Event::new(0, 3)));
        assert!(v.contains(Event::new(0, 4)));
        assert!(!v.contains(Event::new(0, 6)));
    }

    #[test]
    fn merge_keeps_only_common_holes_below_both_maxima() {
        let mut a = dv(&[(0, 4)], &[(0, 1), (0, 2)]);
        let b = dv(&[(0, 4)], &[(0, 2), (0, 3)]);
        a.merge_with(&b);
        assert!(a.contains(Event::new(0, 1))); // covered by b
        assert!(!a.contains(Event::new(0, 2))); // hole in both
        assert!(a.contains(Event::new(0, 3))); // covered by a
    }

    #[test]
    fn merge_carries_high_holes_of_the_taller_operand() {
        let mut a = dv(&[(0, 2)], &[]);
        let b = dv(&[(0, 6)], &[(0, 4)]);
        a.merge_with(&b);
        assert_eq!(a.get(0), 6);
        assert!(a.contains(Event::new(0, 3)));
        assert!(!a.contains(Event::new(0, 4)));
        assert!(a.contains(Event::new(0, 5)));
    }

    #[test]
    fn merge_never_loses_containment() {
        let mut a = dv(&[(0, 3), (1, 2)], &[(0, 2)]);
        let b = dv(&[(0, 5)], &[(0, 1), (0, 4)]);
        let a0 = a.clone();
        a.merge_with(&b);
        for t in 0..2 {
            for i in 0..7 {
                let e = Event::new(t, i);
                if a0.contains(e) || b.contains(e) {
                    assert!(a.contains(e), "merge lost {e}");
                }
            }
        }
    }

    #[test]
    fn hole_range_helpers_round_trip() {
        let mut v = dv(&[(1, 10)], &[]);
        v.add_holes_in_range(Event::new(1, 4), 8);
        assert!(!v.contains(Event::new(1, 5)));
        v.remove_holes_in_range(Event::new(1, 4), 8);
        assert!(v.contains(Event::new(1, 5)));
    }
}
