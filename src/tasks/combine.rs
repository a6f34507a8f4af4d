// ABOUTME: Calibration combination task stand-in
// ABOUTME: Merges processed exposures into one calibration product described by its dimensions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::{debug, info};

use super::{
    check_choice, check_positive, config_str, take_port, PortSpec, TaskImplementation,
    TaskInputs, TaskOutputs,
};
use crate::engine::error::{ExecutionError, Result};
use crate::engine::{Dataset, ExecutionContext};
use crate::parser::value::{lookup, ConfigMap, ConfigValue};

pub struct CalibCombineTask;

/// How each input is scaled before combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureScaling {
    Unity,
    None,
    ExposureTime,
    DarkTime,
    MeanStats,
    InputList,
}

impl ExposureScaling {
    pub const ALL: &'static [&'static str] = &[
        "Unity",
        "None",
        "ExposureTime",
        "DarkTime",
        "MeanStats",
        "InputList",
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Unity" => Some(Self::Unity),
            "None" => Some(Self::None),
            "ExposureTime" => Some(Self::ExposureTime),
            "DarkTime" => Some(Self::DarkTime),
            "MeanStats" => Some(Self::MeanStats),
            "InputList" => Some(Self::InputList),
            _ => Option::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unity => "Unity",
            Self::None => "None",
            Self::ExposureTime => "ExposureTime",
            Self::DarkTime => "DarkTime",
            Self::MeanStats => "MeanStats",
            Self::InputList => "InputList",
        }
    }
}

impl fmt::Display for ExposureScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CombineStatistic {
    MeanClip,
    Mean,
    Median,
}

impl CombineStatistic {
    pub const ALL: &'static [&'static str] = &["MEANCLIP", "MEAN", "MEDIAN"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "MEANCLIP" => Some(Self::MeanClip),
            "MEAN" => Some(Self::Mean),
            "MEDIAN" => Some(Self::Median),
            _ => None,
        }
    }
}

impl fmt::Display for CombineStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MeanClip => write!(f, "MEANCLIP"),
            Self::Mean => write!(f, "MEAN"),
            Self::Median => write!(f, "MEDIAN"),
        }
    }
}

/// Values shared by every input for each dimension, in dimension order.
/// Dimensions absent from the inputs are left out; disagreement is an error.
fn common_dimensions(
    inputs: &[Dataset],
    dimensions: &[String],
) -> std::result::Result<Vec<(String, String)>, String> {
    let mut data_id = Vec::new();
    for dimension in dimensions {
        let mut values = inputs.iter().filter_map(|d| d.data_id.get(dimension));
        let Some(first) = values.next() else {
            debug!("No input carries dimension '{}'", dimension);
            continue;
        };
        if let Some(other) = values.find(|value| *value != first) {
            return Err(format!(
                "inputs disagree on dimension '{}' ({} vs {})",
                dimension, first, other
            ));
        }
        data_id.push((dimension.clone(), first.clone()));
    }
    Ok(data_id)
}

fn dimension_list(config: &ConfigMap) -> Vec<String> {
    lookup(config, "calibrationDimensions")
        .and_then(ConfigValue::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(ConfigValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl TaskImplementation for CalibCombineTask {
    fn class_name(&self) -> &'static str {
        "lsst.cp.pipe.cpCombine.CalibCombineTask"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["lsst.cp.pipe.CalibCombineTask"]
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("inputExps", "cpFringeProc").with_doc("Exposures to combine"),
            PortSpec::output("outputData", "fringe")
                .single()
                .with_doc("Combined calibration product"),
        ]
    }

    fn default_config(&self) -> ConfigMap {
        let mut config = ConfigMap::new();
        config.insert("calibrationType".to_string(), "calibration".into());
        config.insert("exposureScaling".to_string(), "Unity".into());
        config.insert("scalingLevel".to_string(), "DETECTOR".into());
        config.insert("calibrationDimensions".to_string(), ConfigValue::List(Vec::new()));
        config.insert("combine".to_string(), "MEANCLIP".into());
        config.insert("clip".to_string(), ConfigValue::Float(3.0));
        config.insert("nIter".to_string(), ConfigValue::Int(3));
        config.insert(
            "mask".to_string(),
            ConfigValue::from(vec!["SAT", "DETECTED", "INTRP"]),
        );
        config
    }

    fn validate_config(&self, config: &ConfigMap) -> std::result::Result<(), String> {
        match config_str(config, "calibrationType") {
            Some(kind) if !kind.trim().is_empty() => {}
            _ => return Err("'calibrationType' must be a non-empty string".to_string()),
        }
        check_choice(config, "exposureScaling", ExposureScaling::ALL)?;
        check_choice(config, "scalingLevel", &["DETECTOR", "AMP"])?;
        check_choice(config, "combine", CombineStatistic::ALL)?;
        check_positive(config, "clip")?;

        match lookup(config, "calibrationDimensions") {
            Some(ConfigValue::List(items)) if items.iter().all(|i| i.as_str().is_some()) => Ok(()),
            Some(other) => Err(format!(
                "'calibrationDimensions' must be a list of strings, got {}",
                other
            )),
            None => Err("'calibrationDimensions' is missing".to_string()),
        }
    }

    async fn run(
        &self,
        task: &str,
        config: &ConfigMap,
        mut inputs: TaskInputs,
        context: &ExecutionContext,
    ) -> Result<TaskOutputs> {
        let exposures = take_port(&mut inputs, task, "inputExps")?;

        let failed = |message: String| ExecutionError::TaskFailed {
            task: task.to_string(),
            message,
        };

        let calibration_type = config_str(config, "calibrationType").unwrap_or("calibration");
        let scaling = config_str(config, "exposureScaling")
            .and_then(ExposureScaling::parse)
            .ok_or_else(|| failed("invalid exposureScaling".to_string()))?;
        let statistic = config_str(config, "combine")
            .and_then(CombineStatistic::parse)
            .ok_or_else(|| failed("invalid combine statistic".to_string()))?;

        let dimensions = dimension_list(config);
        let data_id = common_dimensions(&exposures, &dimensions).map_err(failed)?;

        info!(
            "Combining {} exposures into '{}' ({}, scaling {})",
            exposures.len(),
            calibration_type,
            statistic,
            scaling
        );

        let mut combined = Dataset::external(calibration_type);
        if let Some(ref instrument) = context.instrument {
            combined = combined.with_data_id("instrument", instrument.clone());
        }
        for (dimension, value) in data_id {
            combined = combined.with_data_id(dimension, value);
        }
        combined
            .provenance
            .push(format!("{}:combine({})", task, exposures.len()));

        let sources: Vec<String> = exposures.iter().map(ToString::to_string).collect();
        let combined = combined
            .with_metadata("calibrationType", json!(calibration_type))
            .with_metadata("exposureScaling", json!(scaling.as_str()))
            .with_metadata("combine", json!(statistic.to_string()))
            .with_metadata("inputs", json!(sources));

        let mut outputs = TaskOutputs::new();
        outputs.insert("outputData".to_string(), vec![combined]);
        Ok(outputs)
    }
}
