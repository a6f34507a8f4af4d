// ABOUTME: Fringe preprocessing task stand-in
// ABOUTME: Normalizes each ISR-processed exposure and optionally masks detected sources

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{
    check_choice, check_positive, config_bool, config_str, take_port, PortSpec,
    TaskImplementation, TaskInputs, TaskOutputs,
};
use crate::engine::error::Result;
use crate::engine::ExecutionContext;
use crate::parser::value::{lookup, ConfigMap, ConfigValue};

pub struct CpFringeTask;

const STATISTICS: &[&str] = &["MEDIAN", "MEAN", "MEANCLIP"];

#[async_trait]
impl TaskImplementation for CpFringeTask {
    fn class_name(&self) -> &'static str {
        "lsst.cp.pipe.cpFringeTask.CpFringeTask"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["lsst.cp.pipe.CpFringeTask"]
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("inputExp", "cpFringeIsr").with_doc("ISR-processed exposures"),
            PortSpec::output("outputExp", "cpFringeProc")
                .with_doc("Normalized exposures with sources masked"),
        ]
    }

    fn default_config(&self) -> ConfigMap {
        let mut stats = ConfigMap::new();
        stats.insert("stat".to_string(), "MEDIAN".into());
        stats.insert("clip".to_string(), ConfigValue::Float(3.0));
        stats.insert("iterations".to_string(), ConfigValue::Int(3));

        let mut config = ConfigMap::new();
        config.insert("doDetection".to_string(), true.into());
        config.insert("detectionThreshold".to_string(), ConfigValue::Float(3.0));
        config.insert("subtractBackground".to_string(), false.into());
        config.insert("stats".to_string(), ConfigValue::Map(stats));
        config
    }

    fn validate_config(&self, config: &ConfigMap) -> std::result::Result<(), String> {
        check_choice(config, "stats.stat", STATISTICS)?;
        check_positive(config, "stats.clip")?;
        check_positive(config, "detectionThreshold")?;
        match lookup(config, "stats.iterations") {
            Some(ConfigValue::Int(n)) if *n >= 1 => Ok(()),
            other => Err(format!(
                "'stats.iterations' must be a positive integer, got {}",
                other.map(ToString::to_string).unwrap_or_else(|| "nothing".to_string())
            )),
        }
    }

    async fn run(
        &self,
        task: &str,
        config: &ConfigMap,
        mut inputs: TaskInputs,
        _context: &ExecutionContext,
    ) -> Result<TaskOutputs> {
        let exposures = take_port(&mut inputs, task, "inputExp")?;
        let stat = config_str(config, "stats.stat").unwrap_or("MEDIAN");
        let mask = config_bool(config, "doDetection");
        let background = config_bool(config, "subtractBackground");

        info!(
            "Normalizing {} exposures by {} (mask sources: {})",
            exposures.len(),
            stat,
            mask
        );

        let processed = exposures
            .iter()
            .map(|exposure| {
                let mut derived = exposure.derive(format!("{}:normalize", task));
                if background {
                    derived.provenance.push(format!("{}:background", task));
                }
                if mask {
                    derived.provenance.push(format!("{}:mask", task));
                }
                derived.with_metadata("normalized_by", json!(stat))
            })
            .collect();

        let mut outputs = TaskOutputs::new();
        outputs.insert("outputExp".to_string(), processed);
        Ok(outputs)
    }
}
