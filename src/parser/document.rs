// ABOUTME: Core pipeline document structures and parsing functionality
// ABOUTME: Defines PipelineDocument, contracts, subsets, and the YAML loader

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use super::error::{ParserError, Result};
use super::inherit;
use super::task::{self, TaskSpec};
use super::value::ConfigValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDocument {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<InheritsRef>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ConfigValue>,
    #[serde(
        default,
        deserialize_with = "task::deserialize_tasks",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub tasks: IndexMap<String, TaskSpec>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub subsets: IndexMap<String, SubsetSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contracts: Vec<ContractEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InheritsRef {
    pub location: String,
}

/// A contract is either a bare expression or an expression with a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContractEntry {
    Expression(String),
    Described {
        contract: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubsetSpec {
    Labels(Vec<String>),
    Described {
        subset: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl ContractEntry {
    pub fn expression(&self) -> &str {
        match self {
            ContractEntry::Expression(expr) => expr,
            ContractEntry::Described { contract, .. } => contract,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ContractEntry::Expression(_) => None,
            ContractEntry::Described { msg, .. } => msg.as_deref(),
        }
    }
}

impl SubsetSpec {
    pub fn labels(&self) -> &[String] {
        match self {
            SubsetSpec::Labels(labels) => labels,
            SubsetSpec::Described { subset, .. } => subset,
        }
    }
}

impl PipelineDocument {
    /// Parse a pipeline document from a YAML file, without resolving inheritance
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ParserError::IoError)?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline document from a YAML string.
    ///
    /// A document that inherits is a fragment: it may omit `tasks` and its
    /// subsets may name parent tasks, so it is only fully checked once merged.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let document: PipelineDocument =
            serde_yaml::from_str(content).map_err(ParserError::YamlError)?;

        if document.inherits.is_some() {
            document.validate_fragment()?;
        } else {
            document.validate_structure()?;
        }

        Ok(document)
    }

    /// Checks that hold for a document on its own, before any merge
    fn validate_fragment(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(ParserError::MissingField("description".to_string()));
        }

        if let Some(ref inherits) = self.inherits {
            if inherits.location.trim().is_empty() {
                return Err(ParserError::MissingField("inherits.location".to_string()));
            }
        }

        for (label, spec) in &self.tasks {
            if !task::is_valid_label(label) {
                return Err(ParserError::InvalidFormat(format!(
                    "task label '{}' must start with a letter or underscore and contain only letters, digits, and underscores",
                    label
                )));
            }
            spec.check_structure(label)
                .map_err(ParserError::InvalidFormat)?;
        }

        Ok(())
    }

    /// Validate basic document structure
    pub(crate) fn validate_structure(&self) -> Result<()> {
        self.validate_fragment()?;

        if let Some(ref instrument) = self.instrument {
            if instrument.trim().is_empty() {
                return Err(ParserError::InvalidFormat(
                    "instrument cannot be empty".to_string(),
                ));
            }
        }

        if self.tasks.is_empty() {
            return Err(ParserError::EmptyPipeline);
        }

        for name in self.parameters.keys() {
            if !task::is_valid_label(name) {
                return Err(ParserError::InvalidFormat(format!(
                    "parameter name '{}' is not a valid identifier",
                    name
                )));
            }
        }

        for (name, subset) in &self.subsets {
            if self.tasks.contains_key(name) {
                return Err(ParserError::InvalidFormat(format!(
                    "subset '{}' has the same name as a task",
                    name
                )));
            }
            let mut seen = HashSet::new();
            for label in subset.labels() {
                if !self.tasks.contains_key(label) {
                    return Err(ParserError::InvalidFormat(format!(
                        "subset '{}' references unknown task '{}'",
                        name, label
                    )));
                }
                if !seen.insert(label) {
                    return Err(ParserError::InvalidFormat(format!(
                        "subset '{}' lists task '{}' more than once",
                        name, label
                    )));
                }
            }
        }

        for contract in &self.contracts {
            if contract.expression().trim().is_empty() {
                return Err(ParserError::InvalidFormat(
                    "contract expression cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Get all task labels in document order
    pub fn task_labels(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Get a task specification by label
    pub fn get_task(&self, label: &str) -> Option<&TaskSpec> {
        self.tasks.get(label)
    }

    /// Check if a task exists in the document
    pub fn has_task(&self, label: &str) -> bool {
        self.tasks.contains_key(label)
    }

    /// Labels of a named subset
    pub fn subset_labels(&self, name: &str) -> Option<&[String]> {
        self.subsets.get(name).map(|subset| subset.labels())
    }

    /// Convert the document back to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ParserError::YamlError)
    }

    /// Save the document to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(path.as_ref(), yaml).map_err(ParserError::IoError)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineParser;

impl PipelineParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a single file without following `inherits`
    pub async fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<PipelineDocument> {
        let content = fs::read_to_string(path.as_ref())
            .await
            .map_err(ParserError::IoError)?;
        self.parse_string(&content)
    }

    pub fn parse_string(&self, content: &str) -> Result<PipelineDocument> {
        PipelineDocument::from_yaml(content)
    }

    /// Parse a file and merge every document it inherits from
    pub async fn load<P: AsRef<Path>>(&self, path: P) -> Result<PipelineDocument> {
        let document = inherit::load_chain(path.as_ref()).await?;
        debug!(
            "Loaded pipeline '{}' with {} tasks",
            document.description,
            document.tasks.len()
        );
        Ok(document)
    }
}

impl Default for PipelineParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FRINGE: &str = r#"
description: cp_pipe FRINGE calibration construction
instrument: lsst.obs.lsst.LsstCam
tasks:
  isr:
    class: lsst.ip.isr.isrTask.IsrTask
    config:
      connections.ccdExposure: 'raw'
      connections.outputExposure: 'cpFringeIsr'
      doFringe: False
  cpFringe:
    class: lsst.cp.pipe.cpFringeTask.CpFringeTask
    config:
      connections.inputExp: 'cpFringeIsr'
      connections.outputExp: 'cpFringeProc'
  cpCombine:
    class: lsst.cp.pipe.cpCombine.CalibCombineTask
    config:
      connections.inputExps: 'cpFringeProc'
      connections.outputData: 'fringe'
      calibrationType: 'fringe'
      exposureScaling: "None"
      calibrationDimensions: ['physical_filter']
contracts:
  - isr.doFringe == False
  - contract: cpCombine.calibrationType == "fringe"
    msg: combine must build a fringe
"#;

    #[test]
    fn test_parse_fringe_document() {
        let document = PipelineDocument::from_yaml(FRINGE).unwrap();

        assert_eq!(document.instrument.as_deref(), Some("lsst.obs.lsst.LsstCam"));
        assert_eq!(document.task_labels(), vec!["isr", "cpFringe", "cpCombine"]);

        let isr = document.get_task("isr").unwrap();
        assert_eq!(isr.class, "lsst.ip.isr.isrTask.IsrTask");
        assert_eq!(isr.config["doFringe"], ConfigValue::Bool(false));

        let combine = document.get_task("cpCombine").unwrap();
        assert_eq!(combine.config["exposureScaling"], ConfigValue::from("None"));

        assert_eq!(document.contracts.len(), 2);
        assert_eq!(document.contracts[0].expression(), "isr.doFringe == False");
        assert_eq!(document.contracts[1].message(), Some("combine must build a fringe"));
    }

    #[test]
    fn test_shorthand_task_class() {
        let yaml = "description: d\ntasks:\n  isr: lsst.ip.isr.IsrTask\n";
        let document = PipelineDocument::from_yaml(yaml).unwrap();
        assert_eq!(document.get_task("isr").unwrap().class, "lsst.ip.isr.IsrTask");
        assert!(document.get_task("isr").unwrap().config.is_empty());
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let yaml = "description: d\ntasks:\n  isr: a.B\nsteps: []\n";
        assert!(matches!(
            PipelineDocument::from_yaml(yaml),
            Err(ParserError::YamlError(_))
        ));
    }

    #[test]
    fn test_empty_tasks_rejected() {
        let yaml = "description: d\ntasks: {}\n";
        assert!(matches!(
            PipelineDocument::from_yaml(yaml),
            Err(ParserError::EmptyPipeline)
        ));
    }

    #[test]
    fn test_inheriting_document_is_a_fragment() {
        let yaml = "description: d\ninherits:\n  location: base.yaml\nsubsets:\n  s: [isr]\n";
        let document = PipelineDocument::from_yaml(yaml).unwrap();
        assert!(document.tasks.is_empty());

        let blank = "description: d\ninherits:\n  location: ' '\n";
        assert!(matches!(
            PipelineDocument::from_yaml(blank),
            Err(ParserError::MissingField(_))
        ));
    }

    #[test]
    fn test_missing_description_rejected() {
        let yaml = "description: '  '\ntasks:\n  isr: a.B\n";
        assert!(matches!(
            PipelineDocument::from_yaml(yaml),
            Err(ParserError::MissingField(_))
        ));
    }

    #[test]
    fn test_subset_with_unknown_label_rejected() {
        let yaml = "description: d\ntasks:\n  isr: a.B\nsubsets:\n  front: [isr, missing]\n";
        assert!(matches!(
            PipelineDocument::from_yaml(yaml),
            Err(ParserError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_document_round_trip() {
        let document = PipelineDocument::from_yaml(FRINGE).unwrap();
        let yaml = document.to_yaml().unwrap();
        let reparsed = PipelineDocument::from_yaml(&yaml).unwrap();
        assert_eq!(reparsed, document);
    }

    #[test]
    fn test_document_file_operations() {
        let document = PipelineDocument::from_yaml(FRINGE).unwrap();

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(document.to_yaml().unwrap().as_bytes())
            .unwrap();

        let loaded = PipelineDocument::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded, document);
    }
}
