// ABOUTME: Symbolic dataset records exchanged between tasks during a run
// ABOUTME: Tracks dataset type, data id, producer, provenance, and free-form metadata

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::resolve::ResolvedPipeline;
use crate::tasks::PortKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub dataset_type: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data_id: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provenance: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Dataset {
    /// A dataset supplied from outside the pipeline.
    pub fn external(dataset_type: impl Into<String>) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            data_id: IndexMap::new(),
            produced_by: None,
            provenance: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// A stand-in external exposure numbered `exposure`.
    pub fn synthetic(dataset_type: impl Into<String>, exposure: usize) -> Self {
        Self::external(dataset_type)
            .with_data_id("exposure", exposure.to_string())
            .with_data_id("detector", "0")
    }

    pub fn with_data_id(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data_id.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Derive a new dataset from this one, appending a processing step to its provenance.
    /// The type and producer are rebound by the executor once the task returns.
    pub fn derive(&self, step: impl Into<String>) -> Self {
        let mut derived = self.clone();
        derived.produced_by = None;
        derived.provenance.push(step.into());
        derived
    }

    pub(crate) fn rebind(mut self, dataset_type: &str, producer: &str) -> Self {
        self.dataset_type = dataset_type.to_string();
        self.produced_by = Some(producer.to_string());
        self
    }

    pub fn is_external(&self) -> bool {
        self.produced_by.is_none()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dataset_type)?;
        if !self.data_id.is_empty() {
            let parts: Vec<String> = self
                .data_id
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            write!(f, "{{{}}}", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Dataset types supplied from outside the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDatasets(BTreeSet<String>);

impl ExternalDatasets {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(types.into_iter().map(Into::into).collect())
    }

    pub fn insert(&mut self, dataset_type: impl Into<String>) {
        self.0.insert(dataset_type.into());
    }

    pub fn contains(&self, dataset_type: &str) -> bool {
        self.0.contains(dataset_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExternalDatasets {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Stand-in input datasets for a run: `exposures` records for every external
/// type consumed by an input port and one record per prerequisite type.
pub fn seed_datasets(
    pipeline: &ResolvedPipeline,
    externals: &ExternalDatasets,
    exposures: usize,
) -> Vec<Dataset> {
    let produced: BTreeSet<&str> = pipeline
        .tasks
        .values()
        .flat_map(|task| task.outputs())
        .map(|port| port.dataset_type.as_str())
        .collect();

    let mut seeded = BTreeSet::new();
    let mut datasets = Vec::new();

    for task in pipeline.tasks.values() {
        for port in &task.ports {
            let dataset_type = port.dataset_type.as_str();
            if produced.contains(dataset_type) || !seeded.insert(dataset_type.to_string()) {
                continue;
            }
            match port.kind {
                PortKind::Input if externals.contains(dataset_type) => {
                    datasets.extend(
                        (1..=exposures).map(|exposure| Dataset::synthetic(dataset_type, exposure)),
                    );
                }
                PortKind::PrerequisiteInput => {
                    datasets.push(
                        Dataset::external(dataset_type)
                            .with_data_id("detector", "0")
                            .with_metadata("calibration", serde_json::Value::Bool(true)),
                    );
                }
                _ => {
                    seeded.remove(dataset_type);
                }
            }
        }
    }

    datasets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_appends_provenance() {
        let raw = Dataset::synthetic("raw", 2);
        let derived = raw.derive("isr:bias").rebind("cpFringeIsr", "isr");

        assert_eq!(derived.dataset_type, "cpFringeIsr");
        assert_eq!(derived.produced_by.as_deref(), Some("isr"));
        assert_eq!(derived.data_id["exposure"], "2");
        assert_eq!(derived.provenance, vec!["isr:bias"]);
        assert!(raw.is_external());
        assert!(!derived.is_external());
    }

    #[test]
    fn test_display_includes_data_id() {
        let dataset = Dataset::synthetic("raw", 1);
        assert_eq!(dataset.to_string(), "raw{exposure=1, detector=0}");
    }

    #[test]
    fn test_external_set() {
        let externals: ExternalDatasets = ["raw", "bias"].into_iter().collect();
        assert!(externals.contains("raw"));
        assert!(!externals.contains("fringe"));
        assert_eq!(externals.iter().collect::<Vec<_>>(), vec!["bias", "raw"]);
    }
}
