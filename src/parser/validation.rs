// ABOUTME: Whole-document pre-flight validation collecting every finding
// ABOUTME: Aggregates resolution, wiring, and contract problems into a single report

use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::document::PipelineDocument;
use super::error::ValidationError;
use super::value::ConfigValue;
use crate::contract::{ContractOutcome, ContractValidator};
use crate::engine::{ConnectionGraph, ExternalDatasets, ResolvedPipeline};
use crate::tasks::TaskRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub contracts: Vec<ContractOutcome>,
    pub is_valid: bool,
}

fn serialize_errors<S: Serializer>(
    errors: &[ValidationError],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

pub struct PipelineValidator {
    registry: Arc<TaskRegistry>,
    externals: ExternalDatasets,
}

impl PipelineValidator {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            externals: ExternalDatasets::new(["raw"]),
        }
    }

    pub fn with_externals(mut self, externals: ExternalDatasets) -> Self {
        self.externals = externals;
        self
    }

    /// Run every pre-flight check without stopping at the first problem.
    /// Wiring and contracts are only checked once every task resolves.
    pub fn validate(&self, document: &PipelineDocument) -> ValidationReport {
        let mut report = ValidationReport::new();

        let (pipeline, resolution_errors) = ResolvedPipeline::resolve_all(document, &self.registry);
        report.errors.extend(resolution_errors);

        let (contracts, contract_errors) = ContractValidator::collect(&document.contracts);
        report.errors.extend(contract_errors);

        if report.errors.is_empty() {
            let (_, wiring_errors) = ConnectionGraph::analyze(&pipeline, &self.externals);
            report.errors.extend(wiring_errors);

            for outcome in contracts.evaluate_all(&pipeline.config_snapshot()) {
                if let Some(error) = outcome.to_error() {
                    report.errors.push(error);
                }
                report.contracts.push(outcome);
            }
        }

        self.check_parameters(document, &mut report);

        if document.contracts.is_empty() {
            report
                .warnings
                .push("Pipeline declares no contracts".to_string());
        }

        debug!(
            "Validated '{}': {} errors, {} warnings",
            document.description,
            report.errors.len(),
            report.warnings.len()
        );

        report.is_valid = report.errors.is_empty();
        report
    }

    /// Warn about parameters no task refers to
    fn check_parameters(&self, document: &PipelineDocument, report: &mut ValidationReport) {
        let mut used = HashSet::new();
        for spec in document.tasks.values() {
            for value in spec.config.values() {
                collect_parameter_refs(value, &mut used);
            }
        }

        for name in document.parameters.keys() {
            if !used.contains(name.as_str()) {
                report
                    .warnings
                    .push(format!("Parameter '{}' is never used", name));
            }
        }
    }
}

fn collect_parameter_refs<'a>(value: &'a ConfigValue, used: &mut HashSet<&'a str>) {
    match value {
        ConfigValue::String(text) => {
            if let Some(name) = text.strip_prefix("parameters.") {
                used.insert(name);
            }
        }
        ConfigValue::List(items) => {
            for item in items {
                collect_parameter_refs(item, used);
            }
        }
        ConfigValue::Map(map) => {
            for item in map.values() {
                collect_parameter_refs(item, used);
            }
        }
        _ => {}
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            contracts: Vec::new(),
            is_valid: true,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(yaml: &str) -> ValidationReport {
        let document = PipelineDocument::from_yaml(yaml).unwrap();
        PipelineValidator::new(Arc::new(TaskRegistry::new())).validate(&document)
    }

    #[test]
    fn test_clean_pipeline_is_valid() {
        let report = validate(
            r#"
description: fringe
instrument: lsst.obs.lsst.LsstCam
tasks:
  isr:
    class: lsst.ip.isr.IsrTask
    config:
      doFringe: False
contracts:
  - isr.doFringe == False
"#,
        );
        assert!(report.is_valid, "{:?}", report.errors);
        assert_eq!(report.contracts.len(), 1);
        assert!(report.contracts[0].passed());
        assert!(!report.has_warnings());
    }

    #[test]
    fn test_collects_every_resolution_error() {
        let report = validate(
            r#"
description: broken
tasks:
  isr: lsst.ip.isr.NoSuchTask
  cpFringe:
    class: lsst.cp.pipe.CpFringeTask
    config:
      stats.stat: MODE
contracts:
  - "isr.doFringe =="
"#,
        );
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 3);
        assert!(matches!(report.errors[0], ValidationError::UnknownTask { .. }));
        assert!(matches!(
            report.errors[1],
            ValidationError::InvalidTaskConfig { .. }
        ));
        assert!(matches!(
            report.errors[2],
            ValidationError::InvalidContract { .. }
        ));
        // contracts are not evaluated against a partial pipeline
        assert!(report.contracts.is_empty());
    }

    #[test]
    fn test_reports_wiring_and_contract_failures_together() {
        let report = validate(
            r#"
description: fringe
tasks:
  cpFringe: lsst.cp.pipe.CpFringeTask
  cpCombine:
    class: lsst.cp.pipe.CalibCombineTask
    config:
      connections.inputExps: cpFringeRenamed
contracts:
  - cpCombine.calibrationType == 'fringe'
"#,
        );
        assert_eq!(report.errors.len(), 3);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::ContractViolation { .. })));
        assert_eq!(
            report
                .errors
                .iter()
                .filter(|e| matches!(e, ValidationError::DanglingConnection { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_warns_on_unused_parameter_and_missing_contracts() {
        let report = validate(
            r#"
description: params
parameters:
  threshold: 5.0
  unused: 1
tasks:
  cpFringe:
    class: lsst.cp.pipe.CpFringeTask
    config:
      detectionThreshold: parameters.threshold
      connections.inputExp: raw
"#,
        );
        assert!(report.is_valid, "{:?}", report.errors);
        assert_eq!(
            report.warnings,
            vec![
                "Parameter 'unused' is never used".to_string(),
                "Pipeline declares no contracts".to_string()
            ]
        );
    }
}
