use std::fmt;

use core_event::Event;

/// A per-thread maximum-index vector. An event `(t, i)` is in the view iff
/// `i <= max(t)`.
///
/// Threads the view has never seen report a maximum of 0, matching the
/// convention that index 0 (the thread start) is in every prefix. The
/// initializer pseudo-event is in every view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    max: Vec<i32>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads this view has an explicit entry for.
    pub fn len(&self) -> usize {
        self.max.len()
    }

    pub fn is_empty(&self) -> bool {
        self.max.is_empty()
    }

    pub fn get(&self, thread: i32) -> i32 {
        debug_assert!(thread >= 0, "initializer thread has no view entry");
        self.max.get(thread as usize).copied().unwrap_or(0)
    }

    pub fn set(&mut self, e: Event) {
        debug_assert!(e.thread >= 0, "cannot set an initializer entry");
        let t = e.thread as usize;
        if t >= self.max.len() {
            self.max.resize(t + 1, 0);
        }
        self.max[t] = e.index;
    }

    /// Raise this thread's maximum to `e` if it is not already past it.
    pub fn update_idx(&mut self, e: Event) {
        if self.get(e.thread) < e.index {
            self.set(e);
        }
    }

    pub fn contains(&self, e: Event) -> bool {
        e.is_initializer() || e.index <= self.get(e.thread)
    }

    /// Pointwise maximum with another view.
    pub fn merge_with(&mut self, other: &View) -> &mut Self {
        if other.is_empty() {
            return self;
        }
        let len = self.len().max(other.len());
        for t in 0..len as i32 {
            if self.get(t) < other.get(t) {
                self.set(Event::new(t, other.get(t)));
            }
        }
        self
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ ")?;
        for (t, max) in self.max.iter().enumerate() {
            write!(f, "{t}:{max} ")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_threads_report_zero() {
        let v = View::new();
        assert_eq!(v.get(5), 0);
        assert!(v.contains(Event::new(5, 0)));
        assert!(!v.contains(Event::new(5, 1)));
        assert!(v.contains(Event::initializer()));
    }

    #[test]
    fn update_idx_never_lowers() {
        let mut v = View::new();
        v.set(Event::new(1, 4));
        v.update_idx(Event::new(1, 2));
        assert_eq!(v.get(1), 4);
        v.update_idx(Event::new(1, 7));
        assert_eq!(v.get(1), 7);
    }

    #[test]
    fn merge_is_pointwise_max_and_monotone() {
        let mut a = View::new();
        a.set(Event::new(0, 3));
        a.set(Event::new(2, 1));
        let mut b = View::new();
        b.set(Event::new(0, 1));
        b.set(Event::new(1, 5));

        let a_before = a.clone();
        a.merge_with(&b);
        assert_eq!(a.get(0), 3);
        assert_eq!(a.get(1), 5);
        assert_eq!(a.get(2), 1);
        // Containment is monotone under merge.
        for t in 0..3 {
            for i in 0..6 {
                let e = Event::new(t, i);
                if a_before.contains(e) || b.contains(e) {
                    assert!(a.contains(e), "lost {e} during merge");
                }
            }
        }
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let mut a = View::new();
        a.set(Event::new(0, 2));
        let before = a.clone();
        a.merge_with(&View::new());
        assert_eq!(a, before);
    }
}
