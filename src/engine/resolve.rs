// ABOUTME: Configuration resolution from pipeline documents to runnable task descriptions
// ABOUTME: Applies class defaults, overrides, and parameter substitution, then binds ports to dataset types

use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::contract::ConfigSnapshot;
use crate::parser::task::CONNECTIONS_PREFIX;
use crate::parser::value::{assign, lookup, ConfigMap, ConfigValue};
use crate::parser::{ContractEntry, PipelineDocument, TaskSpec, ValidationError};
use crate::tasks::{PortKind, TaskImplementation, TaskRegistry};

const PARAMETER_PREFIX: &str = "parameters.";

/// A port bound to the dataset type it reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundPort {
    pub name: String,
    pub kind: PortKind,
    pub dataset_type: String,
    pub multiple: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTask {
    pub label: String,
    pub class: String,
    #[serde(skip)]
    pub implementation: Arc<dyn TaskImplementation>,
    pub config: ConfigMap,
    pub ports: Vec<BoundPort>,
}

impl ResolvedTask {
    pub fn inputs(&self) -> impl Iterator<Item = &BoundPort> {
        self.ports.iter().filter(|port| port.kind.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &BoundPort> {
        self.ports.iter().filter(|port| port.kind == PortKind::Output)
    }

    pub fn port(&self, name: &str) -> Option<&BoundPort> {
        self.ports.iter().find(|port| port.name == name)
    }
}

/// Which tasks of a pipeline to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TaskSelection {
    #[default]
    All,
    Subset(String),
    Labels(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPipeline {
    pub description: String,
    pub instrument: Option<String>,
    pub tasks: IndexMap<String, ResolvedTask>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contracts: Vec<ContractEntry>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub subsets: IndexMap<String, Vec<String>>,
}

fn invalid(task: &str, reason: String) -> ValidationError {
    ValidationError::InvalidTaskConfig {
        task: task.to_string(),
        reason,
    }
}

/// Replace every `parameters.<name>` string, inside lists and maps too,
/// with the parameter's value.
fn substitute(
    task: &str,
    value: &ConfigValue,
    parameters: &IndexMap<String, ConfigValue>,
) -> Result<ConfigValue, ValidationError> {
    match value {
        ConfigValue::String(text) => match text.strip_prefix(PARAMETER_PREFIX) {
            Some(name) => parameters.get(name).cloned().ok_or_else(|| {
                ValidationError::UnknownParameter {
                    task: task.to_string(),
                    parameter: name.to_string(),
                }
            }),
            None => Ok(value.clone()),
        },
        ConfigValue::List(items) => items
            .iter()
            .map(|item| substitute(task, item, parameters))
            .collect::<Result<Vec<_>, _>>()
            .map(ConfigValue::List),
        ConfigValue::Map(map) => map
            .iter()
            .map(|(key, item)| Ok((key.clone(), substitute(task, item, parameters)?)))
            .collect::<Result<ConfigMap, _>>()
            .map(ConfigValue::Map),
        _ => Ok(value.clone()),
    }
}

/// Resolve one task: class lookup, defaults, overrides, class checks, port binding.
pub fn resolve_task(
    label: &str,
    spec: &TaskSpec,
    parameters: &IndexMap<String, ConfigValue>,
    registry: &TaskRegistry,
) -> Result<ResolvedTask, ValidationError> {
    let implementation = registry.resolve(label, &spec.class)?;
    let mut config = implementation.defaults();

    for (key, raw) in &spec.config {
        let value = substitute(label, raw, parameters)?;

        if let Some(port) = key.strip_prefix(CONNECTIONS_PREFIX) {
            if value.as_str().map_or(true, |s| s.trim().is_empty()) {
                return Err(invalid(
                    label,
                    format!("connection '{}' must name a dataset type, got {}", port, value),
                ));
            }
            if assign(&mut config, key, value).is_none() {
                return Err(invalid(
                    label,
                    format!("{} has no connection named '{}'", implementation.class_name(), port),
                ));
            }
            continue;
        }

        let Some(default) = lookup(&config, key).cloned() else {
            return Err(invalid(
                label,
                format!("{} has no config field '{}'", implementation.class_name(), key),
            ));
        };
        if !value.is_compatible_with(&default) {
            return Err(invalid(
                label,
                format!(
                    "field '{}' expects {}, got {} ({})",
                    key,
                    default.type_name(),
                    value.type_name(),
                    value
                ),
            ));
        }
        let value = match (&value, &default) {
            (ConfigValue::Int(i), ConfigValue::Float(_)) => ConfigValue::Float(*i as f64),
            _ => value,
        };
        assign(&mut config, key, value);
    }

    implementation
        .validate_config(&config)
        .map_err(|reason| invalid(label, reason))?;

    let ports = implementation
        .connections(&config)
        .into_iter()
        .map(|port| {
            let dataset_type = lookup(&config, &format!("{}{}", CONNECTIONS_PREFIX, port.name))
                .and_then(ConfigValue::as_str)
                .unwrap_or(port.default_dataset_type)
                .to_string();
            BoundPort {
                name: port.name.to_string(),
                kind: port.kind,
                dataset_type,
                multiple: port.multiple,
            }
        })
        .collect();

    debug!("Resolved task '{}' as {}", label, implementation.class_name());

    Ok(ResolvedTask {
        label: label.to_string(),
        class: implementation.class_name().to_string(),
        implementation,
        config,
        ports,
    })
}

impl ResolvedPipeline {
    /// Resolve every task, stopping at the first error.
    pub fn resolve(
        document: &PipelineDocument,
        registry: &TaskRegistry,
    ) -> Result<Self, ValidationError> {
        let (pipeline, mut errors) = Self::resolve_all(document, registry);
        if errors.is_empty() {
            Ok(pipeline)
        } else {
            Err(errors.remove(0))
        }
    }

    /// Resolve every task, keeping those that succeed and collecting the errors.
    pub fn resolve_all(
        document: &PipelineDocument,
        registry: &TaskRegistry,
    ) -> (Self, Vec<ValidationError>) {
        let mut tasks = IndexMap::new();
        let mut errors = Vec::new();

        for (label, spec) in &document.tasks {
            match resolve_task(label, spec, &document.parameters, registry) {
                Ok(task) => {
                    tasks.insert(label.clone(), task);
                }
                Err(e) => errors.push(e),
            }
        }

        let pipeline = Self {
            description: document.description.clone(),
            instrument: document.instrument.clone(),
            tasks,
            contracts: document.contracts.clone(),
            subsets: document
                .subsets
                .iter()
                .map(|(name, subset)| (name.clone(), subset.labels().to_vec()))
                .collect(),
        };
        (pipeline, errors)
    }

    pub fn get(&self, label: &str) -> Option<&ResolvedTask> {
        self.tasks.get(label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    /// Restrict the pipeline to the selected tasks, keeping document order.
    pub fn select(&self, selection: &TaskSelection) -> Result<Self, ValidationError> {
        let wanted: Vec<String> = match selection {
            TaskSelection::All => return Ok(self.clone()),
            TaskSelection::Subset(name) => self
                .subsets
                .get(name)
                .cloned()
                .ok_or_else(|| ValidationError::UnknownSubset {
                    subset: name.clone(),
                })?,
            TaskSelection::Labels(labels) => labels.clone(),
        };

        if let Some(missing) = wanted.iter().find(|label| !self.tasks.contains_key(*label)) {
            return Err(ValidationError::UnknownTaskLabel {
                task: missing.clone(),
            });
        }

        let tasks = self
            .tasks
            .iter()
            .filter(|(label, _)| wanted.contains(*label))
            .map(|(label, task)| (label.clone(), task.clone()))
            .collect();

        Ok(Self {
            tasks,
            ..self.clone()
        })
    }

    /// Read-only view of every task's resolved configuration.
    pub fn config_snapshot(&self) -> ConfigSnapshot {
        self.tasks
            .iter()
            .map(|(label, task)| (label.clone(), task.config.clone()))
            .collect()
    }
}
