use core_event::Event;

use crate::EventMatrix;

/// Classification of a non-tree edge met during the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfsEdge {
    Tree,
    Back,
    ForwardOrCross,
}

/// Hooks observed while walking a relation depth-first. All methods default
/// to no-ops so visitors implement only what they propagate.
pub trait DfsVisitor {
    fn on_enter(&mut self, _node: Event) {}
    fn on_edge(&mut self, _from: Event, _to: Event, _kind: DfsEdge) {}
    fn on_exit(&mut self, _node: Event) {}
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl EventMatrix {
    /// Walk the whole relation depth-first, invoking the visitor's hooks.
    /// Roots are tried in carrier order, so the walk is deterministic.
    pub fn dfs(&self, visitor: &mut dyn DfsVisitor) {
        let n = self.len();
        let mut color = vec![Color::White; n];
        for root in 0..n {
            if color[root] == Color::White {
                self.dfs_from(root, &mut color, visitor);
            }
        }
    }

    fn dfs_from(&self, root: usize, color: &mut [Color], visitor: &mut dyn DfsVisitor) {
        let n = self.len();
        let mut frames = vec![(root, 0usize)];
        color[root] = Color::Gray;
        visitor.on_enter(self.elems()[root]);
        while !frames.is_empty() {
            let (v, child) = {
                let top = frames.last_mut().expect("frame stack checked non-empty");
                let v = top.0;
                let mut child = None;
                while top.1 < n {
                    let w = top.1;
                    top.1 += 1;
                    if !self.has(self.elems()[v], self.elems()[w]) {
                        continue;
                    }
                    match color[w] {
                        Color::White => {
                            visitor.on_edge(self.elems()[v], self.elems()[w], DfsEdge::Tree);
                            child = Some(w);
                            break;
                        }
                        Color::Gray => {
                            visitor.on_edge(self.elems()[v], self.elems()[w], DfsEdge::Back)
                        }
                        Color::Black => visitor.on_edge(
                            self.elems()[v],
                            self.elems()[w],
                            DfsEdge::ForwardOrCross,
                        ),
                    }
                }
                (v, child)
            };
            if let Some(w) = child {
                color[w] = Color::Gray;
                visitor.on_enter(self.elems()[w]);
                frames.push((w, 0));
                continue;
            }
            color[v] = Color::Black;
            visitor.on_exit(self.elems()[v]);
            frames.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        enters: Vec<Event>,
        exits: Vec<Event>,
        backs: Vec<(Event, Event)>,
    }

    impl DfsVisitor for Recorder {
        fn on_enter(&mut self, node: Event) {
            self.enters.push(node);
        }
        fn on_exit(&mut self, node: Event) {
            self.exits.push(node);
        }
        fn on_edge(&mut self, from: Event, to: Event, kind: DfsEdge) {
            if kind == DfsEdge::Back {
                self.backs.push((from, to));
            }
        }
    }

    #[test]
    fn walk_visits_every_node_once() {
        let elems: Vec<Event> = (0..4).map(|i| Event::new(0, i)).collect();
        let mut m = EventMatrix::new(elems.clone());
        m.add_edge(elems[0], elems[1]);
        m.add_edge(elems[1], elems[2]);
        m.add_edge(elems[3], elems[2]);
        let mut rec = Recorder::default();
        m.dfs(&mut rec);
        assert_eq!(rec.enters.len(), 4);
        assert_eq!(rec.exits.len(), 4);
        assert!(rec.backs.is_empty());
    }

    #[test]
    fn cycles_report_back_edges() {
        let elems: Vec<Event> = (0..3).map(|i| Event::new(0, i)).collect();
        let mut m = EventMatrix::new(elems.clone());
        m.add_edge(elems[0], elems[1]);
        m.add_edge(elems[1], elems[2]);
        m.add_edge(elems[2], elems[0]);
        let mut rec = Recorder::default();
        m.dfs(&mut rec);
        assert_eq!(rec.backs, vec![(elems[2], elems[0])]);
    }
}
