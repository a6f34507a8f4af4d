// ABOUTME: Connection wiring and execution planning
// ABOUTME: Joins output and input ports on dataset type into a DAG, detects dangling inputs and cycles

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::dot::Dot;
use petgraph::graph::NodeIndex;
use petgraph::{Direction, Graph};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::debug;

use super::dataset::ExternalDatasets;
use super::resolve::ResolvedPipeline;
use crate::parser::ValidationError;
use crate::tasks::PortKind;

/// An edge of the graph: `producer` writes `dataset_type`, which `consumer` reads on `port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetFlow {
    pub dataset_type: String,
    pub producer: String,
    pub consumer: String,
    pub port: String,
}

impl fmt::Display for DatasetFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dataset_type)
    }
}

#[derive(Debug)]
pub struct ConnectionGraph {
    graph: Graph<String, DatasetFlow>,
    task_indices: HashMap<String, NodeIndex>,
    /// Tasks in document order.
    order: Vec<String>,
    /// Dataset type -> producing task.
    producers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub batches: Vec<Vec<String>>,
    pub total_tasks: usize,
}

impl ConnectionGraph {
    /// Wire a resolved pipeline, failing on the first problem found.
    pub fn build(
        pipeline: &ResolvedPipeline,
        externals: &ExternalDatasets,
    ) -> Result<Self, ValidationError> {
        let (graph, mut errors) = Self::analyze(pipeline, externals);
        if errors.is_empty() {
            Ok(graph)
        } else {
            Err(errors.remove(0))
        }
    }

    /// Wire a resolved pipeline and report every duplicate producer, dangling input and cycle.
    pub fn analyze(
        pipeline: &ResolvedPipeline,
        externals: &ExternalDatasets,
    ) -> (Self, Vec<ValidationError>) {
        let mut graph = Graph::new();
        let mut task_indices = HashMap::new();
        let mut producers: HashMap<String, String> = HashMap::new();
        let mut errors = Vec::new();

        for label in pipeline.tasks.keys() {
            let node_index = graph.add_node(label.clone());
            task_indices.insert(label.clone(), node_index);
        }

        for (label, task) in &pipeline.tasks {
            for port in task.outputs() {
                match producers.get(&port.dataset_type) {
                    Some(first) => errors.push(ValidationError::DuplicateProducer {
                        dataset_type: port.dataset_type.clone(),
                        first: first.clone(),
                        second: label.clone(),
                    }),
                    None => {
                        producers.insert(port.dataset_type.clone(), label.clone());
                    }
                }
            }
        }

        for (label, task) in &pipeline.tasks {
            let consumer = task_indices[label];

            for port in task.inputs() {
                // Prerequisites are always satisfied from outside the pipeline
                if port.kind == PortKind::PrerequisiteInput {
                    continue;
                }

                match producers.get(&port.dataset_type) {
                    Some(producer) => {
                        graph.add_edge(
                            task_indices[producer],
                            consumer,
                            DatasetFlow {
                                dataset_type: port.dataset_type.clone(),
                                producer: producer.clone(),
                                consumer: label.clone(),
                                port: port.name.clone(),
                            },
                        );
                    }
                    None if externals.contains(&port.dataset_type) => {
                        debug!(
                            "Input {}.{} reads external dataset type '{}'",
                            label, port.name, port.dataset_type
                        );
                    }
                    None => errors.push(ValidationError::DanglingConnection {
                        task: label.clone(),
                        port: port.name.clone(),
                        dataset_type: port.dataset_type.clone(),
                    }),
                }
            }
        }

        let wired = Self {
            graph,
            task_indices,
            order: pipeline.tasks.keys().cloned().collect(),
            producers,
        };

        errors.extend(wired.cycles().into_iter().map(|tasks| ValidationError::Cycle { tasks }));

        (wired, errors)
    }

    /// Every cycle in the graph, each named by its tasks in document order.
    fn cycles(&self) -> Vec<Vec<String>> {
        if toposort(&self.graph, None).is_ok() {
            return Vec::new();
        }

        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self
                        .graph
                        .find_edge(component[0], component[0])
                        .is_some()
            })
            .map(|component| {
                let members: HashSet<&String> =
                    component.iter().map(|&node| &self.graph[node]).collect();
                self.order
                    .iter()
                    .filter(|label| members.contains(label))
                    .cloned()
                    .collect()
            })
            .collect()
    }

    /// Batches of mutually independent tasks in dependency order.
    pub fn create_execution_plan(&self) -> Result<ExecutionPlan, ValidationError> {
        if let Some(tasks) = self.cycles().into_iter().next() {
            return Err(ValidationError::Cycle { tasks });
        }

        let mut batches = Vec::new();
        let mut completed: HashSet<NodeIndex> = HashSet::new();
        let mut remaining: Vec<NodeIndex> =
            self.order.iter().map(|label| self.task_indices[label]).collect();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<NodeIndex>, Vec<NodeIndex>) =
                remaining.into_iter().partition(|&node| {
                    self.graph
                        .neighbors_directed(node, Direction::Incoming)
                        .all(|dependency| completed.contains(&dependency))
                });

            if ready.is_empty() {
                // unreachable once the cycle check passed
                break;
            }

            completed.extend(ready.iter().copied());
            batches.push(ready.iter().map(|&node| self.graph[node].clone()).collect());
            remaining = blocked;
        }

        Ok(ExecutionPlan {
            batches,
            total_tasks: self.order.len(),
        })
    }

    /// Tasks producing `dataset_type` (at most one in a valid pipeline).
    pub fn producers_of(&self, dataset_type: &str) -> Vec<String> {
        self.producers.get(dataset_type).cloned().into_iter().collect()
    }

    /// `(task, port)` pairs reading `dataset_type` from a producer in the graph.
    pub fn consumers_of(&self, dataset_type: &str) -> Vec<(String, String)> {
        self.graph
            .edge_references()
            .map(|edge| edge.weight())
            .filter(|flow| flow.dataset_type == dataset_type)
            .map(|flow| (flow.consumer.clone(), flow.port.clone()))
            .collect()
    }

    pub fn flows(&self) -> Vec<&DatasetFlow> {
        self.graph.edge_references().map(|edge| edge.weight()).collect()
    }

    fn neighbors(&self, task: &str, direction: Direction) -> Vec<String> {
        let Some(&node) = self.task_indices.get(task) else {
            return Vec::new();
        };
        let found: HashSet<&String> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|neighbor| &self.graph[neighbor])
            .collect();
        self.order
            .iter()
            .filter(|label| found.contains(label))
            .cloned()
            .collect()
    }

    /// Tasks that `task` reads from.
    pub fn get_dependencies(&self, task: &str) -> Vec<String> {
        self.neighbors(task, Direction::Incoming)
    }

    /// Tasks that read from `task`.
    pub fn get_dependents(&self, task: &str) -> Vec<String> {
        self.neighbors(task, Direction::Outgoing)
    }

    /// Check whether `to_task` feeds `from_task`, directly or indirectly.
    pub fn has_dependency_path(&self, from_task: &str, to_task: &str) -> bool {
        let (Some(&from_node), Some(&to_node)) =
            (self.task_indices.get(from_task), self.task_indices.get(to_task))
        else {
            return false;
        };

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(to_node);
        visited.insert(to_node);

        while let Some(current) = queue.pop_front() {
            if current == from_node {
                return true;
            }
            for neighbor in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        false
    }

    /// Tasks with no upstream producers.
    pub fn root_tasks(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|label| self.get_dependencies(label).is_empty())
            .cloned()
            .collect()
    }

    /// Tasks whose outputs no other task reads.
    pub fn leaf_tasks(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|label| self.get_dependents(label).is_empty())
            .cloned()
            .collect()
    }

    /// Graphviz rendering with tasks as nodes and dataset types as edge labels.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }
}

impl ExecutionPlan {
    /// Largest batch size
    pub fn max_parallelism(&self) -> usize {
        self.batches.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Number of sequential batches
    pub fn execution_depth(&self) -> usize {
        self.batches.len()
    }

    pub fn contains_task(&self, task: &str) -> bool {
        self.get_task_batch_index(task).is_some()
    }

    pub fn get_task_batch_index(&self, task: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|label| label == task))
    }

    /// Tasks scheduled in batches after the one holding `task`.
    pub fn get_successors(&self, task: &str) -> Vec<String> {
        match self.get_task_batch_index(task) {
            Some(index) => self.batches.iter().skip(index + 1).flatten().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &String> {
        self.batches.iter().flatten()
    }
}
