// ABOUTME: Task registry mapping class identifiers to task implementations
// ABOUTME: Defines the TaskImplementation trait, port declarations, and config helpers shared by built-ins

pub mod combine;
pub mod fringe;
pub mod isr;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::error::Result;
use crate::engine::{Dataset, ExecutionContext};
use crate::parser::value::{lookup, ConfigMap, ConfigValue};
use crate::parser::ValidationError;

/// Datasets handed to or returned from a task, keyed by port name.
pub type TaskInputs = IndexMap<String, Vec<Dataset>>;
pub type TaskOutputs = IndexMap<String, Vec<Dataset>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Input,
    PrerequisiteInput,
    Output,
}

impl PortKind {
    pub fn is_input(&self) -> bool {
        !matches!(self, PortKind::Output)
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Input => write!(f, "input"),
            PortKind::PrerequisiteInput => write!(f, "prerequisite"),
            PortKind::Output => write!(f, "output"),
        }
    }
}

/// A named connection declared by a task class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSpec {
    pub name: &'static str,
    pub kind: PortKind,
    pub default_dataset_type: &'static str,
    pub multiple: bool,
    pub doc: &'static str,
}

impl PortSpec {
    pub const fn input(name: &'static str, default_dataset_type: &'static str) -> Self {
        Self {
            name,
            kind: PortKind::Input,
            default_dataset_type,
            multiple: true,
            doc: "",
        }
    }

    pub const fn prerequisite(name: &'static str, default_dataset_type: &'static str) -> Self {
        Self {
            name,
            kind: PortKind::PrerequisiteInput,
            default_dataset_type,
            multiple: false,
            doc: "",
        }
    }

    pub const fn output(name: &'static str, default_dataset_type: &'static str) -> Self {
        Self {
            name,
            kind: PortKind::Output,
            default_dataset_type,
            multiple: true,
            doc: "",
        }
    }

    pub const fn single(mut self) -> Self {
        self.multiple = false;
        self
    }

    pub const fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = doc;
        self
    }
}

#[async_trait]
pub trait TaskImplementation: Send + Sync {
    /// Fully qualified class identifier.
    fn class_name(&self) -> &'static str;

    /// Other identifiers that resolve to this class.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Every port the class can declare.
    fn ports(&self) -> Vec<PortSpec>;

    /// Ports active under a resolved configuration.
    fn connections(&self, _config: &ConfigMap) -> Vec<PortSpec> {
        self.ports()
    }

    /// Class default options, excluding connections.
    fn default_config(&self) -> ConfigMap;

    /// Complete default tree: options plus a `connections` map of port defaults.
    fn defaults(&self) -> ConfigMap {
        let mut config = self.default_config();
        let connections: ConfigMap = self
            .ports()
            .into_iter()
            .map(|port| {
                (
                    port.name.to_string(),
                    ConfigValue::from(port.default_dataset_type),
                )
            })
            .collect();
        config.insert("connections".to_string(), ConfigValue::Map(connections));
        config
    }

    fn validate_config(&self, _config: &ConfigMap) -> std::result::Result<(), String> {
        Ok(())
    }

    async fn run(
        &self,
        task: &str,
        config: &ConfigMap,
        inputs: TaskInputs,
        context: &ExecutionContext,
    ) -> Result<TaskOutputs>;
}

impl fmt::Debug for dyn TaskImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskImplementation")
            .field("class", &self.class_name())
            .finish()
    }
}

pub struct TaskRegistry {
    implementations: HashMap<String, Arc<dyn TaskImplementation>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(isr::IsrTask));
        registry.register(Arc::new(fringe::CpFringeTask));
        registry.register(Arc::new(combine::CalibCombineTask));

        registry
    }

    pub fn empty() -> Self {
        Self {
            implementations: HashMap::new(),
        }
    }

    /// Register an implementation under its class name and every alias.
    pub fn register(&mut self, implementation: Arc<dyn TaskImplementation>) {
        for alias in implementation.aliases() {
            self.implementations
                .insert(alias.to_string(), Arc::clone(&implementation));
        }
        let class_name = implementation.class_name().to_string();
        self.implementations.insert(class_name, implementation);
    }

    pub fn get_implementation(&self, class: &str) -> Option<Arc<dyn TaskImplementation>> {
        self.implementations.get(class).cloned()
    }

    pub fn resolve(
        &self,
        task: &str,
        class: &str,
    ) -> std::result::Result<Arc<dyn TaskImplementation>, ValidationError> {
        self.get_implementation(class)
            .ok_or_else(|| ValidationError::UnknownTask {
                task: task.to_string(),
                class: class.to_string(),
            })
    }

    pub fn is_registered(&self, class: &str) -> bool {
        self.implementations.contains_key(class)
    }

    /// Distinct implementations sorted by class name.
    pub fn list_classes(&self) -> Vec<Arc<dyn TaskImplementation>> {
        let mut seen: IndexMap<&'static str, Arc<dyn TaskImplementation>> = IndexMap::new();
        for implementation in self.implementations.values() {
            seen.entry(implementation.class_name())
                .or_insert_with(|| Arc::clone(implementation));
        }
        let mut classes: Vec<_> = seen.into_values().collect();
        classes.sort_by_key(|imp| imp.class_name());
        classes
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn config_bool(config: &ConfigMap, key: &str) -> bool {
    lookup(config, key).is_some_and(ConfigValue::is_truthy)
}

pub(crate) fn config_str<'a>(config: &'a ConfigMap, key: &str) -> Option<&'a str> {
    lookup(config, key).and_then(ConfigValue::as_str)
}

/// Check that `key` holds one of `allowed`.
pub(crate) fn check_choice(
    config: &ConfigMap,
    key: &str,
    allowed: &[&str],
) -> std::result::Result<(), String> {
    match lookup(config, key) {
        Some(ConfigValue::String(value)) if allowed.contains(&value.as_str()) => Ok(()),
        Some(other) => Err(format!(
            "'{}' must be one of {}, got {}",
            key,
            allowed.join(", "),
            other
        )),
        None => Err(format!("'{}' is missing", key)),
    }
}

pub(crate) fn check_positive(config: &ConfigMap, key: &str) -> std::result::Result<(), String> {
    match lookup(config, key).and_then(ConfigValue::as_f64) {
        Some(value) if value > 0.0 => Ok(()),
        Some(value) => Err(format!("'{}' must be positive, got {}", key, value)),
        None => Err(format!("'{}' must be a number", key)),
    }
}

/// Take the datasets bound to `port`, failing when there are none.
pub(crate) fn take_port(
    inputs: &mut TaskInputs,
    task: &str,
    port: &str,
) -> Result<Vec<Dataset>> {
    match inputs.shift_remove(port) {
        Some(datasets) if !datasets.is_empty() => Ok(datasets),
        _ => Err(crate::engine::ExecutionError::TaskFailed {
            task: task.to_string(),
            message: format!("no datasets received on input '{}'", port),
        }),
    }
}
