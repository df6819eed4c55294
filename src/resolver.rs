//! Dependency-first ordering of a [`BuildGraph`].
//!
//! For every edge `N -> D` the resolved order places `D` before `N`, so base
//! images come before the images built on top of them. Two strategies are
//! available; both reject cyclic graphs without returning a partial order.

use crate::error::{BuildError, Result};
use crate::filter;
use crate::graph::{BuildGraph, Node};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Kahn's algorithm. No recursion, reports every node left unvisited on a cycle.
    #[default]
    Iterative,
    /// Depth-first search with an active-path guard.
    Recursive,
}

pub struct Resolver<'g> {
    graph: &'g BuildGraph,
    strategy: Strategy,
}

impl<'g> Resolver<'g> {
    pub fn new(graph: &'g BuildGraph) -> Self {
        Self {
            graph,
            strategy: Strategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns every node of the graph in dependency-first order.
    pub fn resolve(&self) -> Result<Vec<&'g Node>> {
        let order = match self.strategy {
            Strategy::Iterative => self.topological_sort()?,
            Strategy::Recursive => self.depth_first()?,
        };
        let nodes = self.graph.nodes();
        Ok(order.into_iter().map(|idx| &nodes[idx]).collect())
    }

    /// Resolves the closure of `seeds` instead of the whole graph. With
    /// `downstream` only the seeds and their dependents are kept; otherwise
    /// their prerequisites are included as well.
    pub fn resolve_nodes(&self, seeds: &[&str], downstream: bool) -> Result<Vec<Node>> {
        let subgraph = if downstream {
            filter::downstream(self.graph, seeds)?
        } else {
            filter::full(self.graph, seeds)?
        };

        let order = Resolver::new(&subgraph)
            .with_strategy(self.strategy)
            .resolve()?
            .into_iter()
            .cloned()
            .collect();
        Ok(order)
    }

    fn topological_sort(&self) -> Result<Vec<usize>> {
        let count = self.graph.len();
        let mut in_degree = vec![0usize; count];

        for idx in 0..count {
            for dep in self.graph.edge_indices(idx) {
                in_degree[dep] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for dep in self.graph.edge_indices(idx) {
                in_degree[dep] -= 1;
                if in_degree[dep] == 0 {
                    queue.push_back(dep);
                }
            }
        }

        if order.len() != count {
            let mut emitted = vec![false; count];
            for &idx in &order {
                emitted[idx] = true;
            }
            let nodes = (0..count)
                .filter(|&i| !emitted[i])
                .map(|i| self.graph.nodes()[i].name.clone())
                .collect();
            return Err(cycle_error(nodes));
        }

        // Emitted dependents-first; flip to put prerequisites first.
        order.reverse();
        Ok(order)
    }

    fn depth_first(&self) -> Result<Vec<usize>> {
        let count = self.graph.len();
        let mut state = DfsState {
            resolved: Vec::with_capacity(count),
            done: vec![false; count],
            on_path: vec![false; count],
            path: Vec::new(),
        };

        for idx in 0..count {
            if !state.done[idx] {
                self.visit(idx, &mut state)?;
            }
        }
        Ok(state.resolved)
    }

    fn visit(&self, idx: usize, state: &mut DfsState) -> Result<()> {
        state.on_path[idx] = true;
        state.path.push(idx);

        for dep in self.graph.edge_indices(idx) {
            if state.done[dep] {
                continue;
            }
            if state.on_path[dep] {
                // The cycle is the part of the active path starting at `dep`.
                let start = state.path.iter().position(|&p| p == dep).unwrap_or(0);
                let nodes = state.path[start..]
                    .iter()
                    .map(|&i| self.graph.nodes()[i].name.clone())
                    .collect();
                return Err(cycle_error(nodes));
            }
            self.visit(dep, state)?;
        }

        state.path.pop();
        state.on_path[idx] = false;
        state.done[idx] = true;
        state.resolved.push(idx);
        Ok(())
    }
}

struct DfsState {
    resolved: Vec<usize>,
    done: Vec<bool>,
    on_path: Vec<bool>,
    path: Vec<usize>,
}

fn cycle_error(mut nodes: Vec<String>) -> BuildError {
    nodes.sort();
    tracing::error!(nodes = ?nodes, "Cyclic dependencies detected");
    BuildError::CyclicDependency { nodes }
}
