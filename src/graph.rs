use crate::error::{BuildError, Result};
use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Where a node comes from: an indexed image we can build, or a reference
/// we can only pull.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeOrigin {
    Local,
    Remote,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub origin: NodeOrigin,
    /// Names of the nodes this one needs before it can be built, in declaration order
    pub edges: Vec<String>,
}

impl Node {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: NodeOrigin::Local,
            edges: Vec::new(),
        }
    }

    pub fn remote(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: NodeOrigin::Remote,
            edges: Vec::new(),
        }
    }

    pub fn with_edges<I, S>(mut self, edges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for edge in edges {
            self.add_edge(edge);
        }
        self
    }

    /// Adds a prerequisite. Repeated edges are ignored.
    pub fn add_edge(&mut self, edge: impl Into<String>) {
        let edge = edge.into();
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == NodeOrigin::Local
    }
}

/// Image dependency graph.
///
/// Nodes keep their insertion order; every edge target is itself a node of the
/// graph. The local/remote partition is carried on each node, so the two
/// subsets are disjoint and together cover `nodes`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(from = "Vec<Node>", into = "Vec<Node>")]
pub struct BuildGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fresh graph from an explicit node list. Edges pointing at
    /// names outside the list are dropped so the result is self-consistent.
    pub fn create(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.insert(node);
        }

        let known: HashSet<String> = graph.index.keys().cloned().collect();
        for node in &mut graph.nodes {
            node.edges.retain(|edge| known.contains(edge));
        }
        graph
    }

    pub fn add_local(&mut self, mut node: Node) {
        node.origin = NodeOrigin::Local;
        self.insert(node);
    }

    pub fn add_remote(&mut self, mut node: Node) {
        node.origin = NodeOrigin::Remote;
        self.insert(node);
    }

    // Last write wins on a name collision; the slot keeps its position.
    fn insert(&mut self, node: Node) {
        match self.index.get(&node.name) {
            Some(&idx) => {
                tracing::warn!(node = %node.name, "Node registered twice, replacing the earlier one");
                self.nodes[idx] = node;
            }
            None => {
                self.index.insert(node.name.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Adds an edge `from -> to`; both ends must already be nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.index.contains_key(to) {
            return Err(BuildError::UnknownImage(to.to_string()));
        }
        let idx = *self
            .index
            .get(from)
            .ok_or_else(|| BuildError::UnknownImage(from.to_string()))?;
        self.nodes[idx].add_edge(to);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn local_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.origin == NodeOrigin::Local)
    }

    pub fn remote_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.origin == NodeOrigin::Remote)
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.get(name).is_some_and(Node::is_local)
    }

    /// Names of the nodes that declare `name` as a prerequisite.
    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.edges.iter().any(|e| e == name))
            .map(|n| n.name.as_str())
    }

    /// Reverse adjacency: node index -> indices of the nodes depending on it
    pub(crate) fn reverse_edges(&self) -> Vec<Vec<usize>> {
        let mut reverse = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for edge in &node.edges {
                if let Some(&dep) = self.index.get(edge) {
                    reverse[dep].push(i);
                }
            }
        }
        reverse
    }

    /// Forward adjacency by index
    pub(crate) fn edge_indices(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[idx]
            .edges
            .iter()
            .filter_map(|edge| self.index.get(edge).copied())
    }

    /// Renders the graph in Graphviz format, edges pointing from an image to
    /// its prerequisites. Remote nodes are drawn dashed.
    pub fn to_dot(&self) -> String {
        let mut dag: DiGraph<String, &str> = DiGraph::new();
        let handles: Vec<_> = self
            .nodes
            .iter()
            .map(|n| dag.add_node(n.name.clone()))
            .collect();

        for (i, _) in self.nodes.iter().enumerate() {
            for dep in self.edge_indices(i) {
                dag.add_edge(handles[i], handles[dep], "");
            }
        }

        let remote: HashSet<String> = self.remote_nodes().map(|n| n.name.clone()).collect();
        format!(
            "{}",
            Dot::with_attr_getters(
                &dag,
                &[Config::EdgeNoLabel],
                &|_, _| String::new(),
                &|_, (_, name)| {
                    if remote.contains(name) {
                        "style=dashed".to_string()
                    } else {
                        String::new()
                    }
                },
            )
        )
    }
}

impl From<Vec<Node>> for BuildGraph {
    fn from(nodes: Vec<Node>) -> Self {
        Self::create(nodes)
    }
}

impl From<BuildGraph> for Vec<Node> {
    fn from(graph: BuildGraph) -> Self {
        graph.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_disjoint() {
        let mut graph = BuildGraph::new();
        graph.add_local(Node::local("app").with_edges(["base", "alpine"]));
        graph.add_local(Node::local("base"));
        graph.add_remote(Node::remote("alpine"));

        let local: Vec<_> = graph.local_nodes().map(|n| n.name.as_str()).collect();
        let remote: Vec<_> = graph.remote_nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(local, vec!["app", "base"]);
        assert_eq!(remote, vec!["alpine"]);
        assert_eq!(local.len() + remote.len(), graph.len());
    }

    #[test]
    fn test_last_write_wins_keeps_position() {
        let mut graph = BuildGraph::new();
        graph.add_local(Node::local("a").with_edges(["x"]));
        graph.add_local(Node::local("b"));
        graph.add_remote(Node::remote("a"));

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.position("a"), Some(0));
        assert!(!graph.is_local("a"));
        assert!(graph.get("a").unwrap().edges.is_empty());
    }

    #[test]
    fn test_create_prunes_dangling_edges() {
        let graph = BuildGraph::create(vec![
            Node::local("a").with_edges(["b", "missing"]),
            Node::local("b"),
        ]);
        assert_eq!(graph.get("a").unwrap().edges, vec!["b".to_string()]);
    }

    #[test]
    fn test_add_edge_requires_both_ends() {
        let mut graph = BuildGraph::new();
        graph.add_local(Node::local("a"));
        assert!(graph.add_edge("a", "b").is_err());
        graph.add_remote(Node::remote("b"));
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("a", "b").unwrap();
        assert_eq!(graph.get("a").unwrap().edges.len(), 1);
    }

    #[test]
    fn test_dependents_of() {
        let graph = BuildGraph::create(vec![
            Node::local("d"),
            Node::local("b").with_edges(["d"]),
            Node::local("c").with_edges(["d"]),
        ]);
        let dependents: Vec<_> = graph.dependents_of("d").collect();
        assert_eq!(dependents, vec!["b", "c"]);
    }

    #[test]
    fn test_to_dot_marks_remote_nodes() {
        let graph = BuildGraph::create(vec![
            Node::local("app").with_edges(["alpine"]),
            Node::remote("alpine"),
        ]);
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("\"app\""));
        assert!(dot.contains("style=dashed"));
        assert!(dot.contains("0 -> 1"));
    }
}
