//! Static dependency graph over registered plugins
//!
//! Used when validating a plugin registry:
//! 1. Detect dependency cycles before a configuration goes live
//! 2. Provide a topological resolution order for diagnostics
//!
//! Resolution itself does not need the graph; it walks dependencies lazily
//! and guards against cycles through the resolution context.

use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// Graph-related errors
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// Circular dependency detected between plugins
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// Plugin id is duplicated
    #[error("Duplicate plugin id: {0}")]
    DuplicatePlugin(String),
}

#[derive(Debug, Clone)]
struct GraphNode {
    /// Declared dependencies, including ids that are not registered
    declared: Vec<String>,

    /// Dependencies that resolve to registered plugins
    dependencies: Vec<String>,
}

/// Dependency graph of plugin ids
///
/// Edges point from a plugin to the plugins it depends on, including its
/// failover connector. Dependencies naming unknown plugins are kept as
/// declared but do not become edges, matching resolution which ignores them.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, GraphNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin and its declared dependencies
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already present.
    pub fn add_plugin<I, S>(&mut self, id: &str, dependencies: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.nodes.contains_key(id) {
            return Err(GraphError::DuplicatePlugin(id.to_string()));
        }

        let mut declared: Vec<String> = Vec::new();
        for dependency in dependencies {
            let dependency = dependency.into();
            if !declared.contains(&dependency) {
                declared.push(dependency);
            }
        }

        self.nodes.insert(
            id.to_string(),
            GraphNode {
                declared,
                dependencies: Vec::new(),
            },
        );
        Ok(())
    }

    /// Link declared dependencies to registered plugins
    ///
    /// Must run after every plugin has been added.
    pub fn link(&mut self) {
        let known: Vec<String> = self.nodes.keys().cloned().collect();
        for node in self.nodes.values_mut() {
            node.dependencies = node
                .declared
                .iter()
                .filter(|dep| known.binary_search(*dep).is_ok())
                .cloned()
                .collect();
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registered dependencies of a plugin
    pub fn dependencies_of(&self, id: &str) -> Option<&[String]> {
        self.nodes.get(id).map(|node| node.dependencies.as_slice())
    }

    /// Declared dependencies that name no registered plugin
    pub fn dangling_dependencies(&self) -> Vec<(String, String)> {
        let mut dangling = Vec::new();
        for (id, node) in &self.nodes {
            for dep in &node.declared {
                if !node.dependencies.contains(dep) {
                    dangling.push((id.clone(), dep.clone()));
                }
            }
        }
        dangling
    }

    /// Topological order with dependencies first (Kahn's algorithm)
    ///
    /// # Errors
    ///
    /// Returns an error naming one cycle if the graph is not acyclic.
    pub fn resolve_order(&self) -> Result<Vec<String>, GraphError> {
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();

        for (id, node) in &self.nodes {
            dependents.entry(id.as_str()).or_default();
            *in_degree.entry(id.as_str()).or_insert(0) += node.dependencies.len();
            for dep in &node.dependencies {
                dependents.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(current) = queue.pop_front() {
            sorted.push(current.to_string());
            if let Some(waiting) = dependents.get(current) {
                for dependent in waiting {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return match self.detect_cycles() {
                Err(err) => Err(err),
                Ok(()) => Err(GraphError::CircularDependency(
                    "Unknown cycle detected".to_string(),
                )),
            };
        }

        Ok(sorted)
    }

    /// Depth-first search for the first cycle
    pub fn detect_cycles(&self) -> Result<(), GraphError> {
        // 0 = unvisited, 1 = on the DFS stack, 2 = done
        let mut state: BTreeMap<&str, u8> = self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        let mut path = Vec::new();

        for id in self.nodes.keys() {
            if state.get(id.as_str()) == Some(&0) {
                self.visit(id, &mut state, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        state: &mut BTreeMap<&'a str, u8>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), GraphError> {
        match state.get(id) {
            Some(1) => {
                let start = path.iter().position(|entry| *entry == id).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(id);
                return Err(GraphError::CircularDependency(cycle.join(" -> ")));
            }
            Some(2) => return Ok(()),
            _ => {}
        }

        state.insert(id, 1);
        path.push(id);

        if let Some(node) = self.nodes.get(id) {
            for dep in &node.dependencies {
                self.visit(dep, state, path)?;
            }
        }

        state.insert(id, 2);
        path.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (id, deps) in edges {
            graph.add_plugin(id, deps.iter().copied()).unwrap();
        }
        graph.link();
        graph
    }

    #[test]
    fn test_empty_graph() {
        assert_eq!(DependencyGraph::new().resolve_order().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_dependencies_come_first() {
        let graph = graph(&[
            ("mail", &["ldap"]),
            ("ldap", &[]),
            ("displayName", &["mail", "ldap"]),
        ]);

        let order = graph.resolve_order().unwrap();
        let pos = |id: &str| order.iter().position(|entry| entry == id).unwrap();
        assert!(pos("ldap") < pos("mail"));
        assert!(pos("mail") < pos("displayName"));
    }

    #[test]
    fn test_cycle_reports_path() {
        let graph = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let err = graph.resolve_order().unwrap_err();
        assert_eq!(err, GraphError::CircularDependency("a -> b -> c -> a".to_string()));
    }

    #[test]
    fn test_unknown_dependencies_are_not_edges() {
        let graph = graph(&[("mail", &["ldap", "nowhere"]), ("ldap", &[])]);
        assert_eq!(graph.dependencies_of("mail").unwrap(), &["ldap".to_string()]);
        assert_eq!(
            graph.dangling_dependencies(),
            vec![("mail".to_string(), "nowhere".to_string())]
        );
    }

    #[test]
    fn test_duplicate_plugin() {
        let mut graph = DependencyGraph::new();
        graph.add_plugin("ldap", Vec::<String>::new()).unwrap();
        assert_eq!(
            graph.add_plugin("ldap", Vec::<String>::new()),
            Err(GraphError::DuplicatePlugin("ldap".to_string()))
        );
    }
}
