//! Task graph for dependency management.
//!
//! The TaskGraph holds the static pipeline declaration: which tasks exist,
//! which worker executes each one, and which upstream outputs each task
//! consumes. It validates the declaration and yields a deterministic
//! execution order.

use crate::core::task::TaskSpec;
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::Path;
use tracing::debug;

/// On-disk form of a pipeline declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineFile {
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskSpec>,
}

/// The pipeline's task dependency graph.
///
/// Tasks are kept in declaration order; the declaration index is the
/// tie-breaker whenever two tasks have no relative dependency.
#[derive(Clone, Default)]
pub struct TaskGraph {
    specs: Vec<TaskSpec>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    /// Create a new empty TaskGraph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a graph from specs in declaration order.
    pub fn from_specs(specs: Vec<TaskSpec>) -> Result<Self> {
        let mut graph = Self::new();
        for spec in specs {
            graph.add_task(spec)?;
        }
        graph.validate()?;
        Ok(graph)
    }

    /// The shipped snow-removal pipeline.
    ///
    /// planning -> weather -> traffic -> resources -> routing -> communication,
    /// with routing joining planning, weather and traffic, and communication
    /// joining planning, resources and routing.
    pub fn snow_removal() -> Self {
        let specs = vec![
            TaskSpec::new("planning", "planner").with_delegation(),
            TaskSpec::new("weather", "weather_monitor").depends_on(&["planning"]),
            TaskSpec::new("traffic", "traffic_analyst").depends_on(&["weather"]),
            TaskSpec::new("resources", "stock_manager").depends_on(&["traffic"]),
            TaskSpec::new("routing", "route_optimizer").depends_on(&[
                "planning",
                "weather",
                "traffic",
            ]),
            TaskSpec::new("communication", "notifier")
                .depends_on(&["planning", "resources", "routing"])
                .with_delegation(),
        ];
        Self::from_declared(specs)
    }

    /// Index specs whose ids are known to be distinct.
    fn from_declared(specs: Vec<TaskSpec>) -> Self {
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self { specs, index }
    }

    /// Load and validate a pipeline declared in TOML (`[[task]]` tables).
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading pipeline");
        let file: PipelineFile = toml::from_str(&std::fs::read_to_string(path)?)?;
        if file.tasks.is_empty() {
            return Err(Error::Configuration(format!(
                "Pipeline {} declares no tasks",
                path.display()
            )));
        }
        Self::from_specs(file.tasks)
    }

    /// Add a task. Dependencies are checked by `validate`, so tasks may be
    /// declared before the tasks they depend on.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<()> {
        if self.index.contains_key(&spec.id) {
            return Err(Error::DuplicateTask(spec.id));
        }
        self.index.insert(spec.id.clone(), self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Get a task declaration by id.
    pub fn get(&self, id: &str) -> Option<&TaskSpec> {
        self.index.get(id).map(|&i| &self.specs[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Tasks that list `id` among their dependencies, in declaration order.
    pub fn dependents(&self, id: &str) -> Vec<&TaskSpec> {
        self.specs
            .iter()
            .filter(|s| s.depends_on.iter().any(|d| d == id))
            .collect()
    }

    /// Check that every dependency exists and the relation is acyclic.
    ///
    /// # Errors
    /// - `UnknownDependency` for the first reference to an undeclared task
    /// - `Cycle` if any task depends on itself, directly or transitively
    pub fn validate(&self) -> Result<()> {
        self.build().map(|_| ())
    }

    /// Tasks in dependency order.
    ///
    /// Every task comes after all of its dependencies. Among tasks that are
    /// ready at the same time, the one declared first comes first, so the
    /// order is stable for a given declaration.
    pub fn topological_order(&self) -> Result<Vec<&TaskSpec>> {
        let graph = self.build()?;

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.specs.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(&self.specs[i]);
            for next in graph.neighbors_directed(NodeIndex::new(i), Direction::Outgoing) {
                let j = next.index();
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }
        Ok(order)
    }

    /// Ids of the tasks that come strictly before `id` in topological order.
    pub fn predecessors_in_order(&self, id: &str) -> Result<Vec<String>> {
        if !self.contains(id) {
            return Err(Error::NotFound(format!("task {}", id)));
        }
        Ok(self
            .topological_order()?
            .into_iter()
            .take_while(|s| s.id != id)
            .map(|s| s.id.clone())
            .collect())
    }

    /// Build the petgraph view. Node indices equal declaration indices and
    /// edges point from dependency to dependent. A task listing the same
    /// dependency twice gets a single edge.
    fn build(&self) -> Result<DiGraph<usize, ()>> {
        let mut graph = DiGraph::with_capacity(self.specs.len(), self.specs.len());
        for i in 0..self.specs.len() {
            graph.add_node(i);
        }

        for (i, spec) in self.specs.iter().enumerate() {
            for dep in &spec.depends_on {
                let &from = self.index.get(dep).ok_or_else(|| Error::UnknownDependency {
                    task_id: spec.id.clone(),
                    dependency: dep.clone(),
                })?;
                graph.update_edge(NodeIndex::new(from), NodeIndex::new(i), ());
            }
        }

        toposort(&graph, None).map_err(|cycle| Error::Cycle {
            task_id: self.specs[cycle.node_id().index()].id.clone(),
        })?;

        Ok(graph)
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.specs.len())
            .field(
                "dependencies",
                &self.specs.iter().map(|s| s.depends_on.len()).sum::<usize>(),
            )
            .finish()
    }
}
