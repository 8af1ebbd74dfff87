use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::analyzer::ScriptLanguage;

/// Node in the dependency graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub path: PathBuf,
}

/// Order in which scripts can be run safely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOrder {
    /// Every script, each after all the scripts it depends on.
    Ordered { scripts: Vec<PathBuf> },
    /// A cycle blocked the sort. `emitted` is the prefix that could be
    /// ordered, `blocked` the scripts that could not.
    Cycle {
        emitted: Vec<PathBuf>,
        blocked: Vec<PathBuf>,
    },
}

impl ExecutionOrder {
    pub fn is_cycle(&self) -> bool {
        matches!(self, ExecutionOrder::Cycle { .. })
    }

    /// The total order, if one exists.
    pub fn scripts(&self) -> Option<&[PathBuf]> {
        match self {
            ExecutionOrder::Ordered { scripts } => Some(scripts),
            ExecutionOrder::Cycle { .. } => None,
        }
    }
}

/// Directed "depends-on" graph over the discovered scripts.
///
/// Node indices follow insertion order, which is the discovery order.
/// An edge `a -> b` means script `a` depends on script `b`.
pub struct DependencyGraph {
    graph: DiGraph<GraphNode, ()>,
    index: HashMap<PathBuf, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Build the graph for `scripts`, keeping only edges between known scripts.
    pub fn build(scripts: &[PathBuf], language: &dyn ScriptLanguage) -> Self {
        let mut graph = Self::new();
        for script in scripts {
            graph.add_script(script);
        }
        for script in scripts {
            for dep in language.dependencies(script) {
                if !graph.contains(&dep) {
                    tracing::debug!(
                        script = %script.display(),
                        dependency = %dep.display(),
                        "dependency is outside the discovered scripts, ignoring"
                    );
                    continue;
                }
                graph.add_dependency(script, &dep);
            }
        }
        graph
    }

    /// Add a script as a node. Returns the node index.
    pub fn add_script(&mut self, path: &Path) -> NodeIndex {
        if let Some(&idx) = self.index.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(GraphNode {
            path: path.to_path_buf(),
        });
        self.index.insert(path.to_path_buf(), idx);
        idx
    }

    /// Record that `from` depends on `to`.
    ///
    /// Both scripts must already be nodes; unknown endpoints and
    /// self-dependencies are ignored. Returns whether an edge exists afterwards.
    pub fn add_dependency(&mut self, from: &Path, to: &Path) -> bool {
        let (Some(&from_idx), Some(&to_idx)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        if from_idx == to_idx {
            return false;
        }
        self.graph.update_edge(from_idx, to_idx, ());
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Scripts in discovery order.
    pub fn scripts(&self) -> Vec<PathBuf> {
        self.graph.node_weights().map(|n| n.path.clone()).collect()
    }

    /// Direct dependencies of `path`, in discovery order.
    pub fn dependencies_of(&self, path: &Path) -> Vec<PathBuf> {
        let Some(&idx) = self.index.get(path) else {
            return Vec::new();
        };
        let mut targets: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.target())
            .collect();
        targets.sort();
        targets
            .into_iter()
            .map(|t| self.graph[t].path.clone())
            .collect()
    }

    /// Dependency lists for every script, keyed by path.
    pub fn dependency_map(&self) -> BTreeMap<PathBuf, Vec<PathBuf>> {
        self.graph
            .node_weights()
            .map(|n| (n.path.clone(), self.dependencies_of(&n.path)))
            .collect()
    }

    /// Order scripts so every dependency precedes its dependents (Kahn's algorithm).
    ///
    /// Ties are broken by discovery order, so the result is stable for an
    /// unchanged file set. Returns [`ExecutionOrder::Cycle`] instead of a
    /// partial order when some scripts can never become ready.
    pub fn sort(&self) -> ExecutionOrder {
        let node_count = self.graph.node_count();

        // Unsatisfied prerequisites per node: its own outgoing depends-on edges.
        let mut pending: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.edges_directed(n, Direction::Outgoing).count())
            .collect();

        let mut ready: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| pending[n.index()] == 0)
            .collect();
        let mut processed: HashSet<NodeIndex> = HashSet::with_capacity(node_count);
        let mut emitted: Vec<NodeIndex> = Vec::with_capacity(node_count);

        while let Some(current) = ready.pop_front() {
            if !processed.insert(current) {
                continue;
            }
            emitted.push(current);

            let mut dependents: Vec<NodeIndex> = self
                .graph
                .edges_directed(current, Direction::Incoming)
                .map(|e| e.source())
                .filter(|n| !processed.contains(n))
                .collect();
            dependents.sort();

            for dependent in dependents {
                let count = &mut pending[dependent.index()];
                *count = count.saturating_sub(1);
                if *count == 0 && !ready.contains(&dependent) {
                    ready.push_back(dependent);
                }
            }
        }

        let to_paths = |nodes: &[NodeIndex]| -> Vec<PathBuf> {
            nodes.iter().map(|&n| self.graph[n].path.clone()).collect()
        };

        if emitted.len() < node_count {
            let blocked: Vec<NodeIndex> = self
                .graph
                .node_indices()
                .filter(|n| !processed.contains(n))
                .collect();
            return ExecutionOrder::Cycle {
                emitted: to_paths(&emitted),
                blocked: to_paths(&blocked),
            };
        }

        ExecutionOrder::Ordered {
            scripts: to_paths(&emitted),
        }
    }

    /// Find cycles via strongly connected components. Each group is in
    /// discovery order; groups are ordered by their first member.
    pub fn find_cycles(&self) -> Vec<Vec<PathBuf>> {
        let mut groups: Vec<Vec<NodeIndex>> = petgraph::algo::kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|mut scc| {
                scc.sort();
                scc
            })
            .collect();
        groups.sort();
        groups
            .into_iter()
            .map(|scc| scc.iter().map(|&idx| self.graph[idx].path.clone()).collect())
            .collect()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
