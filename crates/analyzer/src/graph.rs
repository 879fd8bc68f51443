//! Package-interface graph
//!
//! A precomputed, read-only description of third-party and standard-library modules: which
//! distribution provides a top-level package, what members each module and type has, type bases,
//! and the declared return type of functions. The analyzer never parses library source; anything
//! it knows about `os.path.join` comes from here.
//!
//! Paths are dotted (`os.path.join`). A member entry maps a name to the path of the node it
//! resolves to, so aliases such as `os.path -> posixpath` are plain members.

use indexmap::IndexMap;
use lantern_core::GraphError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Module,
    Type,
    Function,
    /// A module-level or class-level value of some type
    Instance,
}

/// Read-only queries the analyzer makes against an external package graph
pub trait PackageGraph: Send + Sync {
    /// Distributions providing the top-level package `top_level`
    fn distributions(&self, top_level: &str) -> Vec<String>;

    fn kind(&self, path: &str) -> Option<NodeKind>;

    /// Member names of a module or type
    fn children(&self, path: &str) -> Vec<String>;

    /// Path that `path.name` resolves to
    fn attr(&self, path: &str, name: &str) -> Option<String>;

    /// Direct bases of a type, in declaration order
    fn bases(&self, path: &str) -> Vec<String>;

    /// Return type of a function, or the type of an instance
    fn returns(&self, path: &str) -> Option<String>;

    /// Usage frequency; only consumers ranking completions look at this
    fn popularity(&self, path: &str) -> u64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub members: IndexMap<String, String>,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub popularity: u64,
}

impl GraphNode {
    fn new(kind: NodeKind) -> Self {
        GraphNode { kind, members: IndexMap::new(), bases: Vec::new(), returns: None, popularity: 0 }
    }
}

/// In-memory [`PackageGraph`] backed by a JSON document or built by hand
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryGraph {
    #[serde(default)]
    distributions: IndexMap<String, Vec<String>>,
    #[serde(default)]
    nodes: IndexMap<String, GraphNode>,
}

static BUNDLED: Lazy<Arc<MemoryGraph>> = Lazy::new(|| {
    let document = include_str!("../data/graph.json");
    match MemoryGraph::from_json(document) {
        Ok(graph) => Arc::new(graph),
        Err(e) => {
            tracing::warn!("Bundled package graph is unusable: {}", e);
            Arc::new(MemoryGraph::default())
        }
    }
});

impl MemoryGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Graph covering `builtins` and a slice of the standard library
    pub fn bundled() -> Arc<MemoryGraph> {
        BUNDLED.clone()
    }

    /// Load a graph document, rejecting references to undefined nodes
    pub fn from_json(document: &str) -> Result<MemoryGraph, GraphError> {
        let graph: MemoryGraph = serde_json::from_str(document)?;
        graph.validate()?;
        tracing::debug!("Loaded package graph with {} nodes", graph.nodes.len());
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn validate(&self) -> Result<(), GraphError> {
        for (path, node) in &self.nodes {
            let referenced = node.members.values().chain(node.bases.iter()).chain(node.returns.iter());
            for target in referenced {
                if !self.nodes.contains_key(target) {
                    return Err(GraphError::DanglingReference(format!("{target} (from {path})")));
                }
            }
        }
        Ok(())
    }
}

impl PackageGraph for MemoryGraph {
    fn distributions(&self, top_level: &str) -> Vec<String> {
        self.distributions.get(top_level).cloned().unwrap_or_default()
    }

    fn kind(&self, path: &str) -> Option<NodeKind> {
        self.nodes.get(path).map(|n| n.kind)
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.nodes.get(path).map(|n| n.members.keys().cloned().collect()).unwrap_or_default()
    }

    fn attr(&self, path: &str, name: &str) -> Option<String> {
        self.nodes.get(path).and_then(|n| n.members.get(name)).cloned()
    }

    fn bases(&self, path: &str) -> Vec<String> {
        self.nodes.get(path).map(|n| n.bases.clone()).unwrap_or_default()
    }

    fn returns(&self, path: &str) -> Option<String> {
        self.nodes.get(path).and_then(|n| n.returns.clone())
    }

    fn popularity(&self, path: &str) -> u64 {
        self.nodes.get(path).map(|n| n.popularity).unwrap_or(0)
    }
}

/// Incremental construction of a [`MemoryGraph`]
///
/// Parents are created on demand as modules, and every node is registered as a member of its
/// parent. Top-level modules are provided by a distribution of the same name unless one is
/// declared explicitly.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: MemoryGraph,
}

impl GraphBuilder {
    pub fn module(mut self, path: &str) -> Self {
        self.insert(path, GraphNode::new(NodeKind::Module));
        self
    }

    pub fn class(mut self, path: &str, bases: &[&str]) -> Self {
        let mut node = GraphNode::new(NodeKind::Type);
        node.bases = bases.iter().map(|b| b.to_string()).collect();
        self.insert(path, node);
        self
    }

    pub fn function(mut self, path: &str, returns: Option<&str>) -> Self {
        let mut node = GraphNode::new(NodeKind::Function);
        node.returns = returns.map(str::to_string);
        self.insert(path, node);
        self
    }

    pub fn instance(mut self, path: &str, type_path: &str) -> Self {
        let mut node = GraphNode::new(NodeKind::Instance);
        node.returns = Some(type_path.to_string());
        self.insert(path, node);
        self
    }

    /// Make `path` resolve to the existing node `target`
    pub fn alias(mut self, path: &str, target: &str) -> Self {
        if let Some((parent, name)) = path.rsplit_once('.') {
            self.ensure_module(parent);
            if let Some(node) = self.graph.nodes.get_mut(parent) {
                node.members.insert(name.to_string(), target.to_string());
            }
        }
        self
    }

    pub fn distribution(mut self, top_level: &str, distribution: &str) -> Self {
        let entry = self.graph.distributions.entry(top_level.to_string()).or_default();
        if !entry.iter().any(|d| d == distribution) {
            entry.push(distribution.to_string());
        }
        self
    }

    pub fn popularity(mut self, path: &str, count: u64) -> Self {
        if let Some(node) = self.graph.nodes.get_mut(path) {
            node.popularity = count;
        }
        self
    }

    pub fn build(self) -> MemoryGraph {
        self.graph
    }

    fn ensure_module(&mut self, path: &str) {
        if !self.graph.nodes.contains_key(path) {
            self.insert(path, GraphNode::new(NodeKind::Module));
        }
    }

    fn insert(&mut self, path: &str, node: GraphNode) {
        match path.rsplit_once('.') {
            Some((parent, name)) => {
                self.ensure_module(parent);
                if let Some(parent) = self.graph.nodes.get_mut(parent) {
                    parent.members.insert(name.to_string(), path.to_string());
                }
            }
            None => {
                self.graph.distributions.entry(path.to_string()).or_insert_with(|| vec![path.to_string()]);
            }
        }
        match self.graph.nodes.get_mut(path) {
            Some(existing) => {
                existing.kind = node.kind;
                existing.bases = node.bases;
                existing.returns = node.returns;
            }
            None => {
                self.graph.nodes.insert(path.to_string(), node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_registers_members() {
        let graph = MemoryGraph::builder()
            .class("requests.Session", &[])
            .function("requests.Session.get", Some("requests.Response"))
            .class("requests.Response", &[])
            .instance("requests.Response.status_code", "builtins.int")
            .build();

        assert_eq!(graph.kind("requests"), Some(NodeKind::Module));
        assert_eq!(graph.children("requests"), vec!["Session", "Response"]);
        assert_eq!(graph.attr("requests.Session", "get").as_deref(), Some("requests.Session.get"));
        assert_eq!(graph.returns("requests.Session.get").as_deref(), Some("requests.Response"));
        assert_eq!(graph.distributions("requests"), vec!["requests"]);
    }

    #[test]
    fn test_alias_member() {
        let graph = MemoryGraph::builder().module("posixpath").module("os").alias("os.path", "posixpath").build();
        assert_eq!(graph.attr("os", "path").as_deref(), Some("posixpath"));
    }

    #[test]
    fn test_from_json_rejects_dangling_reference() {
        let document = r#"{"nodes": {"m": {"kind": "module", "members": {"x": "m.x"}}}}"#;
        let err = MemoryGraph::from_json(document).unwrap_err();
        assert!(matches!(err, GraphError::DanglingReference(_)));
    }

    #[test]
    fn test_from_json_rejects_malformed_document() {
        assert!(matches!(MemoryGraph::from_json("{"), Err(GraphError::Json(_))));
    }

    #[test]
    fn test_json_round_trip_preserves_popularity() {
        let graph = MemoryGraph::builder().module("json").function("json.dumps", None).popularity("json.dumps", 7).build();
        let reloaded = MemoryGraph::from_json(&graph.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.popularity("json.dumps"), 7);
        assert_eq!(reloaded.popularity("json.loads"), 0);
    }

    #[test]
    fn test_bundled_graph_has_builtins() {
        let graph = MemoryGraph::bundled();
        assert_eq!(graph.kind("builtins"), Some(NodeKind::Module));
        assert_eq!(graph.kind("builtins.str"), Some(NodeKind::Type));
        assert_eq!(graph.attr("os", "path").as_deref(), Some("posixpath"));
        assert!(!graph.distributions("os").is_empty());
    }
}
