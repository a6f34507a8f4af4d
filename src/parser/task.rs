// ABOUTME: Task specification structures for pipeline documents
// ABOUTME: Defines the class identifier, config overrides, and connection override helpers

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use super::value::{ConfigMap, ConfigValue};

/// Prefix of config keys that rebind a task port to a dataset type.
pub const CONNECTIONS_PREFIX: &str = "connections.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub class: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub config: ConfigMap,
}

impl TaskSpec {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            config: ConfigMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_connection(self, port: &str, dataset_type: &str) -> Self {
        self.with_config(format!("{}{}", CONNECTIONS_PREFIX, port), dataset_type)
    }

    /// Connection overrides as `(port, value)` pairs, in document order.
    pub fn connection_overrides(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.config.iter().filter_map(|(key, value)| {
            key.strip_prefix(CONNECTIONS_PREFIX)
                .map(|port| (port, value))
        })
    }

    /// Config overrides that are not connection overrides.
    pub fn option_overrides(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.config
            .iter()
            .filter(|(key, _)| !key.starts_with(CONNECTIONS_PREFIX))
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Structural checks that do not need the task registry.
    pub fn check_structure(&self, label: &str) -> std::result::Result<(), String> {
        if self.class.trim().is_empty() {
            return Err(format!("task '{}' has an empty class identifier", label));
        }

        for key in self.config.keys() {
            if key.split('.').any(|segment| segment.trim().is_empty()) {
                return Err(format!("task '{}' has malformed config key '{}'", label, key));
            }
        }

        for (port, value) in self.connection_overrides() {
            match value {
                ConfigValue::String(dataset_type) if !dataset_type.trim().is_empty() => {}
                other => {
                    return Err(format!(
                        "task '{}' connection '{}' must name a dataset type, got {}",
                        label, port, other
                    ))
                }
            }
        }

        Ok(())
    }
}

/// Whether `label` can be referenced from a contract path.
pub fn is_valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Deserialize the `tasks` mapping, accepting `label: <class>` shorthand.
pub(crate) fn deserialize_tasks<'de, D>(
    deserializer: D,
) -> std::result::Result<IndexMap<String, TaskSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, serde_yaml::Value> = IndexMap::deserialize(deserializer)?;
    let mut tasks = IndexMap::with_capacity(raw.len());

    for (label, value) in raw {
        let spec = match value {
            serde_yaml::Value::String(class) => TaskSpec::new(class),
            other => serde_yaml::from_value::<TaskSpec>(other)
                .map_err(|e| de::Error::custom(format!("task '{}': {}", label, e)))?,
        };
        tasks.insert(label, spec);
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_and_option_overrides_are_split() {
        let spec = TaskSpec::new("lsst.cp.pipe.cpFringeTask.CpFringeTask")
            .with_connection("inputExp", "cpFringeIsr")
            .with_config("doDetection", true)
            .with_connection("outputExp", "cpFringeProc");

        let connections: Vec<_> = spec.connection_overrides().map(|(p, _)| p).collect();
        assert_eq!(connections, vec!["inputExp", "outputExp"]);

        let options: Vec<_> = spec.option_overrides().map(|(k, _)| k).collect();
        assert_eq!(options, vec!["doDetection"]);
    }

    #[test]
    fn test_connection_values_must_be_strings() {
        let spec = TaskSpec::new("x.Y").with_config("connections.inputExp", 3i64);
        assert!(spec.check_structure("t").is_err());

        let spec = TaskSpec::new("x.Y").with_connection("inputExp", "raw");
        assert!(spec.check_structure("t").is_ok());

        let spec = TaskSpec::new("  ");
        assert!(spec.check_structure("t").is_err());
    }

    #[test]
    fn test_unknown_task_fields_are_rejected() {
        let yaml = "class: x.Y\nconfigs: {}\n";
        assert!(serde_yaml::from_str::<TaskSpec>(yaml).is_err());
    }

    #[test]
    fn test_label_rules() {
        assert!(is_valid_label("cpCombine"));
        assert!(is_valid_label("_isr2"));
        assert!(!is_valid_label("2isr"));
        assert!(!is_valid_label("cp.combine"));
        assert!(!is_valid_label(""));
    }
}
