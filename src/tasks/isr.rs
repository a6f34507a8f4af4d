// ABOUTME: Instrument signature removal task stand-in
// ABOUTME: Declares ISR connections, gates prerequisite calibrations on do* flags, and records applied steps

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::{
    check_choice, config_bool, take_port, PortSpec, TaskImplementation, TaskInputs, TaskOutputs,
};
use crate::engine::error::{ExecutionError, Result};
use crate::engine::ExecutionContext;
use crate::parser::value::{ConfigMap, ConfigValue};

pub struct IsrTask;

/// Correction flags paired with the prerequisite port each one needs.
const GATED_PREREQUISITES: &[(&str, &str)] = &[
    ("doBias", "bias"),
    ("doDark", "dark"),
    ("doFlat", "flat"),
    ("doFringe", "fringes"),
];

const OVERSCAN_FIT_TYPES: &[&str] = &["MEDIAN", "MEAN", "POLY", "CHEB", "LEG", "NATURAL_SPLINE"];

impl IsrTask {
    /// Steps applied to each exposure under `config`, in processing order.
    pub fn enabled_steps(config: &ConfigMap) -> Vec<&'static str> {
        [
            ("doSaturation", "saturation"),
            ("doOverscan", "overscan"),
            ("doBias", "bias"),
            ("doDark", "dark"),
            ("doDefect", "defect"),
            ("doFlat", "flat"),
            ("doFringe", "fringe"),
        ]
        .into_iter()
        .filter(|(flag, _)| config_bool(config, flag))
        .map(|(_, step)| step)
        .collect()
    }
}

#[async_trait]
impl TaskImplementation for IsrTask {
    fn class_name(&self) -> &'static str {
        "lsst.ip.isr.isrTask.IsrTask"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["lsst.ip.isr.IsrTask"]
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("ccdExposure", "raw").with_doc("Input exposures to process"),
            PortSpec::prerequisite("bias", "bias").with_doc("Master bias"),
            PortSpec::prerequisite("dark", "dark").with_doc("Master dark"),
            PortSpec::prerequisite("flat", "flat").with_doc("Master flat"),
            PortSpec::prerequisite("fringes", "fringe").with_doc("Master fringe"),
            PortSpec::output("outputExposure", "postISRCCD")
                .with_doc("Exposures with instrument signature removed"),
        ]
    }

    fn connections(&self, config: &ConfigMap) -> Vec<PortSpec> {
        self.ports()
            .into_iter()
            .filter(|port| {
                GATED_PREREQUISITES
                    .iter()
                    .find(|(_, name)| *name == port.name)
                    .map_or(true, |(flag, _)| config_bool(config, flag))
            })
            .collect()
    }

    fn default_config(&self) -> ConfigMap {
        let mut overscan = ConfigMap::new();
        overscan.insert("fitType".to_string(), "MEDIAN".into());
        overscan.insert("order".to_string(), ConfigValue::Int(1));

        let mut config = ConfigMap::new();
        config.insert("doSaturation".to_string(), true.into());
        config.insert("doOverscan".to_string(), true.into());
        config.insert("doBias".to_string(), true.into());
        config.insert("doDark".to_string(), true.into());
        config.insert("doDefect".to_string(), true.into());
        config.insert("doFlat".to_string(), true.into());
        config.insert("doFringe".to_string(), true.into());
        config.insert("doWrite".to_string(), true.into());
        config.insert("saturation".to_string(), ConfigValue::Float(f64::from(u16::MAX)));
        config.insert("overscan".to_string(), ConfigValue::Map(overscan));
        config
    }

    fn validate_config(&self, config: &ConfigMap) -> std::result::Result<(), String> {
        check_choice(config, "overscan.fitType", OVERSCAN_FIT_TYPES)?;
        match crate::parser::value::lookup(config, "overscan.order") {
            Some(ConfigValue::Int(order)) if *order >= 0 => Ok(()),
            Some(other) => Err(format!(
                "'overscan.order' must be a non-negative integer, got {}",
                other
            )),
            None => Err("'overscan.order' is missing".to_string()),
        }
    }

    async fn run(
        &self,
        task: &str,
        config: &ConfigMap,
        mut inputs: TaskInputs,
        context: &ExecutionContext,
    ) -> Result<TaskOutputs> {
        let exposures = take_port(&mut inputs, task, "ccdExposure")?;
        let steps = Self::enabled_steps(config);

        for (flag, port) in GATED_PREREQUISITES {
            if config_bool(config, flag) && inputs.get(*port).map_or(true, Vec::is_empty) {
                return Err(ExecutionError::TaskFailed {
                    task: task.to_string(),
                    message: format!("{} is enabled but no '{}' calibration was provided", flag, port),
                });
            }
        }

        info!(
            "ISR on {} exposures for run {} (steps: {})",
            exposures.len(),
            context.run_id,
            steps.join(", ")
        );

        let processed: Vec<_> = exposures
            .iter()
            .map(|exposure| {
                let mut derived = exposure.derive(format!("{}:isr", task));
                derived.provenance.extend(steps.iter().map(|step| format!("{}:{}", task, step)));
                debug!("ISR processed {}", exposure);
                derived.with_metadata("isr_steps", json!(steps))
            })
            .collect();

        let mut outputs = TaskOutputs::new();
        outputs.insert("outputExposure".to_string(), processed);
        Ok(outputs)
    }
}
