// THEORY:
// Dinic's maximum-flow algorithm over an explicit residual graph. It is the
// exact inner step of every graph cut in the crate: each binary labelling
// problem is reduced to an s–t cut, and the minimum cut is read back from the
// set of nodes still reachable from the source once no augmenting path is left.
//
// The depth-first phase is iterative. Grid graphs produce augmenting paths as
// long as the image is wide, and a recursive search would overflow the stack
// on full-frame cuts.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct Edge {
    to: usize,
    cap: i64,
}

/// A flow network with `n` ordinary nodes plus a source and a sink.
#[derive(Debug)]
pub struct FlowGraph {
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>,
    source: usize,
    sink: usize,
}

impl FlowGraph {
    pub fn new(nodes: usize) -> Self {
        Self {
            edges: Vec::new(),
            adjacency: vec![Vec::new(); nodes + 2],
            source: nodes,
            sink: nodes + 1,
        }
    }

    fn add_arc_pair(&mut self, from: usize, to: usize, cap: i64, rev_cap: i64) {
        let index = self.edges.len();
        self.edges.push(Edge { to, cap });
        self.edges.push(Edge { to: from, cap: rev_cap });
        self.adjacency[from].push(index);
        self.adjacency[to].push(index + 1);
    }

    /// Adds terminal capacities: `to_source` is paid when the node ends on the
    /// sink side, `to_sink` when it ends on the source side.
    pub fn add_terminal(&mut self, node: usize, to_source: i64, to_sink: i64) {
        if to_source > 0 {
            self.add_arc_pair(self.source, node, to_source, 0);
        }
        if to_sink > 0 {
            self.add_arc_pair(node, self.sink, to_sink, 0);
        }
    }

    /// Adds a directed edge `from -> to` with capacity `cap`, cut when `from`
    /// stays with the source and `to` goes to the sink.
    pub fn add_edge(&mut self, from: usize, to: usize, cap: i64) {
        if cap > 0 {
            self.add_arc_pair(from, to, cap, 0);
        }
    }

    fn build_levels(&self, level: &mut [i32]) -> bool {
        level.fill(-1);
        level[self.source] = 0;
        let mut queue = VecDeque::from([self.source]);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let edge = self.edges[e];
                if edge.cap > 0 && level[edge.to] < 0 {
                    level[edge.to] = level[u] + 1;
                    queue.push_back(edge.to);
                }
            }
        }
        level[self.sink] >= 0
    }

    /// Runs Dinic to completion and returns the total flow.
    pub fn max_flow(&mut self) -> i64 {
        let n = self.adjacency.len();
        let mut level = vec![-1i32; n];
        let mut next_arc = vec![0usize; n];
        let mut path: Vec<usize> = Vec::new();
        let mut total = 0i64;

        while self.build_levels(&mut level) {
            next_arc.fill(0);
            path.clear();
            let mut u = self.source;

            loop {
                if u == self.sink {
                    let bottleneck = path.iter().map(|&e| self.edges[e].cap).min().unwrap_or(0);
                    for &e in &path {
                        self.edges[e].cap -= bottleneck;
                        self.edges[e ^ 1].cap += bottleneck;
                    }
                    total += bottleneck;
                    // Retreat to the tail of the first saturated edge.
                    let saturated = path.iter().position(|&e| self.edges[e].cap == 0).unwrap_or(0);
                    u = self.edges[path[saturated] ^ 1].to;
                    path.truncate(saturated);
                    continue;
                }

                let mut advanced = false;
                while next_arc[u] < self.adjacency[u].len() {
                    let e = self.adjacency[u][next_arc[u]];
                    let edge = self.edges[e];
                    if edge.cap > 0 && level[edge.to] == level[u] + 1 {
                        path.push(e);
                        u = edge.to;
                        advanced = true;
                        break;
                    }
                    next_arc[u] += 1;
                }

                if !advanced {
                    if u == self.source {
                        break;
                    }
                    // Dead end: remove it from this phase's level graph.
                    level[u] = -1;
                    if let Some(e) = path.pop() {
                        u = self.edges[e ^ 1].to;
                        next_arc[u] += 1;
                    }
                }
            }
        }
        total
    }

    /// After `max_flow`, reports for each ordinary node whether it is on the
    /// source side of the minimum cut.
    pub fn source_side(&self) -> Vec<bool> {
        let mut seen = vec![false; self.adjacency.len()];
        seen[self.source] = true;
        let mut queue = VecDeque::from([self.source]);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let edge = self.edges[e];
                if edge.cap > 0 && !seen[edge.to] {
                    seen[edge.to] = true;
                    queue.push_back(edge.to);
                }
            }
        }
        seen.truncate(self.source);
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_network_flow() {
        // CLRS figure 26.1 with nodes 0..4 as v1..v4, s = 4, t = 5.
        let mut g = FlowGraph::new(4);
        let (s, t) = (4, 5);
        g.add_arc_pair(s, 0, 16, 0);
        g.add_arc_pair(s, 1, 13, 0);
        g.add_edge(0, 2, 12);
        g.add_edge(1, 0, 4);
        g.add_edge(1, 3, 14);
        g.add_edge(2, 1, 9);
        g.add_arc_pair(2, t, 20, 0);
        g.add_edge(3, 2, 7);
        g.add_arc_pair(3, t, 4, 0);
        assert_eq!(g.max_flow(), 23);
    }

    #[test]
    fn cut_separates_cheap_side() {
        // Node 0 is tied to the source strongly, node 1 to the sink.
        let mut g = FlowGraph::new(2);
        g.add_terminal(0, 10, 1);
        g.add_terminal(1, 1, 10);
        g.add_edge(0, 1, 3);
        g.add_edge(1, 0, 3);
        assert_eq!(g.max_flow(), 1 + 1 + 3);
        assert_eq!(g.source_side(), vec![true, false]);
    }

    #[test]
    fn long_chain_does_not_recurse() {
        let n = 200_000;
        let mut g = FlowGraph::new(n);
        g.add_terminal(0, 5, 0);
        for i in 0..n - 1 {
            g.add_edge(i, i + 1, 7);
        }
        g.add_terminal(n - 1, 0, 9);
        assert_eq!(g.max_flow(), 5);
    }
}
