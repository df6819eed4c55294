//! Closure filtering: derive a smaller graph around a set of seed nodes.
//!
//! Filtering never mutates the input graph; the result is always built with
//! [`BuildGraph::create`].

use crate::error::{BuildError, Result};
use crate::graph::{BuildGraph, Node};
use std::collections::VecDeque;

/// Seeds plus every node that transitively depends on a seed. Edges leaving
/// the retained set are pruned.
pub fn downstream(graph: &BuildGraph, seeds: &[&str]) -> Result<BuildGraph> {
    let start = seed_indices(graph, seeds)?;
    let reverse = graph.reverse_edges();
    let keep = walk(&start, graph.len(), |idx| reverse[idx].clone());
    Ok(materialize(graph, &keep))
}

/// Seeds, their transitive dependents, and every transitive prerequisite of
/// anything included by those two passes.
pub fn full(graph: &BuildGraph, seeds: &[&str]) -> Result<BuildGraph> {
    let start = seed_indices(graph, seeds)?;
    let reverse = graph.reverse_edges();

    let dependents = walk(&start, graph.len(), |idx| reverse[idx].clone());
    let included: Vec<usize> = (0..graph.len()).filter(|&i| dependents[i]).collect();
    let keep = walk(&included, graph.len(), |idx| graph.edge_indices(idx).collect());

    Ok(materialize(graph, &keep))
}

/// Seeds plus their transitive prerequisites only.
pub fn upstream(graph: &BuildGraph, seeds: &[&str]) -> Result<BuildGraph> {
    let start = seed_indices(graph, seeds)?;
    let keep = walk(&start, graph.len(), |idx| graph.edge_indices(idx).collect());
    Ok(materialize(graph, &keep))
}

fn seed_indices(graph: &BuildGraph, seeds: &[&str]) -> Result<Vec<usize>> {
    seeds
        .iter()
        .map(|name| {
            graph
                .position(name)
                .ok_or_else(|| BuildError::UnknownImage(name.to_string()))
        })
        .collect()
}

// Breadth-first reachability from `start` using `next` as the adjacency.
fn walk<F>(start: &[usize], count: usize, next: F) -> Vec<bool>
where
    F: Fn(usize) -> Vec<usize>,
{
    let mut seen = vec![false; count];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for &idx in start {
        if !seen[idx] {
            seen[idx] = true;
            queue.push_back(idx);
        }
    }

    while let Some(idx) = queue.pop_front() {
        for other in next(idx) {
            if !seen[other] {
                seen[other] = true;
                queue.push_back(other);
            }
        }
    }
    seen
}

fn materialize(graph: &BuildGraph, keep: &[bool]) -> BuildGraph {
    let nodes: Vec<Node> = graph
        .iter()
        .enumerate()
        .filter(|(idx, _)| keep[*idx])
        .map(|(_, node)| node.clone())
        .collect();
    // `create` drops the edges that point outside the kept set.
    BuildGraph::create(nodes)
}
