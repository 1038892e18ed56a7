use ahash::AHashMap;
use core_event::Event;

/// A binary relation over a fixed, ordered carrier of events.
///
/// The carrier is chosen at construction (the events a calculator cares
/// about); membership queries for events outside the carrier are simply
/// false. Edges are bits in a dense `n * n` matrix, which keeps closure and
/// cycle checks branch-cheap for the graph sizes enumeration produces.
#[derive(Debug, Clone, Default)]
pub struct EventMatrix {
    elems: Vec<Event>,
    index: AHashMap<Event, usize>,
    adj: Vec<bool>,
}

impl EventMatrix {
    pub fn new(elems: Vec<Event>) -> Self {
        let index = elems.iter().enumerate().map(|(i, &e)| (e, i)).collect();
        let n = elems.len();
        Self { elems, index, adj: vec![false; n * n] }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn elems(&self) -> &[Event] {
        &self.elems
    }

    pub fn contains_elem(&self, e: Event) -> bool {
        self.index.contains_key(&e)
    }

    pub fn index_of(&self, e: Event) -> Option<usize> {
        self.index.get(&e).copied()
    }

    #[inline]
    fn at(&self, i: usize, j: usize) -> bool {
        self.adj[i * self.elems.len() + j]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, value: bool) {
        let n = self.elems.len();
        self.adj[i * n + j] = value;
    }

    pub fn has(&self, a: Event, b: Event) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(i), Some(j)) => self.at(i, j),
            _ => false,
        }
    }

    /// Insert an edge; returns true if it was not already present. Events
    /// outside the carrier are ignored.
    pub fn add_edge(&mut self, a: Event, b: Event) -> bool {
        let (Some(i), Some(j)) = (self.index_of(a), self.index_of(b)) else {
            return false;
        };
        if self.at(i, j) {
            return false;
        }
        self.set(i, j, true);
        true
    }

    /// Successors of `e` within the carrier.
    pub fn successors(&self, e: Event) -> impl Iterator<Item = Event> + '_ {
        let row = self.index_of(e);
        (0..self.elems.len()).filter_map(move |j| {
            let i = row?;
            self.at(i, j).then(|| self.elems[j])
        })
    }

    /// Close the relation under transitivity (Warshall).
    pub fn trans_closure(&mut self) {
        let n = self.elems.len();
        for k in 0..n {
            for i in 0..n {
                if !self.at(i, k) {
                    continue;
                }
                for j in 0..n {
                    if self.at(k, j) && !self.at(i, j) {
                        self.set(i, j, true);
                    }
                }
            }
        }
    }

    /// Whether no event relates to itself. On a transitively closed matrix
    /// this is the acyclicity check.
    pub fn is_irreflexive(&self) -> bool {
        (0..self.elems.len()).all(|i| !self.at(i, i))
    }

    /// Strongly connected components in reverse topological order, as index
    /// lists into the carrier, plus the component id of every element.
    /// Calculators use this to quotient counted constraints.
    pub fn scc_condensation(&self) -> (Vec<Vec<usize>>, Vec<usize>) {
        let n = self.elems.len();
        let mut comps: Vec<Vec<usize>> = Vec::new();
        let mut comp_of = vec![usize::MAX; n];
        let mut index = vec![usize::MAX; n];
        let mut low = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0usize;

        // Iterative Tarjan; frame = (node, next successor to try).
        for root in 0..n {
            if index[root] != usize::MAX {
                continue;
            }
            let mut frames = vec![(root, 0usize)];
            while !frames.is_empty() {
                let (v, child) = {
                    let top = frames.last_mut().expect("frame stack checked non-empty");
                    let v = top.0;
                    if index[v] == usize::MAX {
                        index[v] = next_index;
                        low[v] = next_index;
                        next_index += 1;
                        stack.push(v);
                        on_stack[v] = true;
                    }
                    let mut child = None;
                    while top.1 < n {
                        let w = top.1;
                        top.1 += 1;
                        if !self.at(v, w) {
                            continue;
                        }
                        if index[w] == usize::MAX {
                            child = Some(w);
                            break;
                        } else if on_stack[w] {
                            low[v] = low[v].min(index[w]);
                        }
                    }
                    (v, child)
                };
                if let Some(w) = child {
                    frames.push((w, 0));
                    continue;
                }
                if low[v] == index[v] {
                    let mut comp = Vec::new();
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        comp_of[w] = comps.len();
                        comp.push(w);
                        if w == v {
                            break;
                        }
                    }
                    comps.push(comp);
                }
                frames.pop();
                if let Some(parent) = frames.last().map(|f| f.0) {
                    low[parent] = low[parent].min(low[v]);
                }
            }
        }
        (comps, comp_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(n: i32) -> Vec<Event> {
        (0..n).map(|i| Event::new(0, i)).collect()
    }

    #[test]
    fn closure_reaches_transitively() {
        let mut m = EventMatrix::new(events(4));
        m.add_edge(Event::new(0, 0), Event::new(0, 1));
        m.add_edge(Event::new(0, 1), Event::new(0, 2));
        m.add_edge(Event::new(0, 2), Event::new(0, 3));
        assert!(!m.has(Event::new(0, 0), Event::new(0, 3)));
        m.trans_closure();
        assert!(m.has(Event::new(0, 0), Event::new(0, 3)));
        assert!(m.is_irreflexive());
    }

    #[test]
    fn cycles_show_up_as_reflexive_edges_after_closure() {
        let mut m = EventMatrix::new(events(3));
        m.add_edge(Event::new(0, 0), Event::new(0, 1));
        m.add_edge(Event::new(0, 1), Event::new(0, 0));
        m.trans_closure();
        assert!(!m.is_irreflexive());
    }

    #[test]
    fn edges_outside_the_carrier_are_ignored() {
        let mut m = EventMatrix::new(events(2));
        assert!(!m.add_edge(Event::new(9, 9), Event::new(0, 0)));
        assert!(!m.has(Event::new(9, 9), Event::new(0, 0)));
    }

    #[test]
    fn add_edge_reports_novelty() {
        let mut m = EventMatrix::new(events(2));
        assert!(m.add_edge(Event::new(0, 0), Event::new(0, 1)));
        assert!(!m.add_edge(Event::new(0, 0), Event::new(0, 1)));
    }

    #[test]
    fn condensation_groups_cycles_and_orders_components() {
        // 0 <-> 1 -> 2, 2 -> 3, 3 -> 2 : two components {0,1} and {2,3}.
        let mut m = EventMatrix::new(events(4));
        m.add_edge(Event::new(0, 0), Event::new(0, 1));
        m.add_edge(Event::new(0, 1), Event::new(0, 0));
        m.add_edge(Event::new(0, 1), Event::new(0, 2));
        m.add_edge(Event::new(0, 2), Event::new(0, 3));
        m.add_edge(Event::new(0, 3), Event::new(0, 2));
        let (comps, comp_of) = m.scc_condensation();
        assert_eq!(comps.len(), 2);
        assert_eq!(comp_of[0], comp_of[1]);
        assert_eq!(comp_of[2], comp_of[3]);
        assert_ne!(comp_of[0], comp_of[2]);
        // Reverse topological order: the sink component {2,3} comes first.
        assert!(comps[0].contains(&2));
    }
}
