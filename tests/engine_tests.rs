// ABOUTME: Integration tests for pipeline resolution, wiring, and execution
// ABOUTME: Tests task resolution errors, dataset-type wiring, batch planning, and runs of the fringe chain

use std::sync::Arc;

use calpipe::engine::{
    ConnectionGraph, ExecutionError, ExternalDatasets, PipelineExecutor, PipelineStatus,
    ResolvedPipeline, RunOptions, TaskSelection, TaskStatus,
};
use calpipe::parser::{ConfigValue, PipelineDocument, ValidationError};
use calpipe::tasks::{PortKind, TaskRegistry};

mod common;
use common::{fringe_document, run_options, selected_run_options, TestPipelineBuilder, TestTask};

fn raw_only() -> ExternalDatasets {
    ExternalDatasets::new(["raw"])
}

fn resolve(document: &PipelineDocument) -> Result<ResolvedPipeline, ValidationError> {
    ResolvedPipeline::resolve(document, &TaskRegistry::new())
}

#[test]
fn test_resolution_binds_overrides_and_defaults() {
    let pipeline = resolve(&fringe_document()).unwrap();
    assert_eq!(pipeline.labels(), vec!["isr", "cpFringe", "cpCombine"]);

    let isr = pipeline.get("isr").unwrap();
    assert_eq!(isr.class, "lsst.ip.isr.isrTask.IsrTask");
    assert_eq!(isr.config["doFringe"], ConfigValue::Bool(false));
    assert_eq!(isr.config["doBias"], ConfigValue::Bool(true));

    // doFringe off drops the fringe prerequisite
    assert!(isr.port("fringes").is_none());
    let output = isr.port("outputExposure").unwrap();
    assert_eq!(output.kind, PortKind::Output);
    assert_eq!(output.dataset_type, "cpFringeIsr");

    let combine = pipeline.get("cpCombine").unwrap();
    let input = combine.port("inputExps").unwrap();
    assert!(input.multiple);
    assert_eq!(input.dataset_type, "cpFringeProc");
    assert_eq!(combine.outputs().next().unwrap().dataset_type, "fringe");
}

#[test]
fn test_resolution_errors() {
    let unknown_class = TestPipelineBuilder::new("unknown")
        .with_task(TestTask::new("isr", "lsst.ip.isr.NoSuchTask"))
        .build();
    assert!(matches!(
        resolve(&unknown_class),
        Err(ValidationError::UnknownTask { task, class }) if task == "isr" && class == "lsst.ip.isr.NoSuchTask"
    ));

    let unknown_field = TestPipelineBuilder::new("field")
        .with_task(TestTask::new("isr", "lsst.ip.isr.IsrTask").with("doMagic", "True"))
        .build();
    assert!(matches!(
        resolve(&unknown_field),
        Err(ValidationError::InvalidTaskConfig { task, .. }) if task == "isr"
    ));

    let wrong_type = TestPipelineBuilder::new("type")
        .with_task(TestTask::new("isr", "lsst.ip.isr.IsrTask").with("doBias", "'yes'"))
        .build();
    assert!(matches!(
        resolve(&wrong_type),
        Err(ValidationError::InvalidTaskConfig { .. })
    ));

    let bad_choice = TestPipelineBuilder::new("choice")
        .with_task(
            TestTask::new("cpCombine", "lsst.cp.pipe.CalibCombineTask")
                .with("exposureScaling", "Sideways"),
        )
        .build();
    assert!(matches!(
        resolve(&bad_choice),
        Err(ValidationError::InvalidTaskConfig { task, .. }) if task == "cpCombine"
    ));
}

#[test]
fn test_parameters_substitute_into_config() {
    let document = PipelineDocument::from_yaml(
        r#"
description: parameterized
parameters:
  fringeType: fringe
tasks:
  cpCombine:
    class: lsst.cp.pipe.CalibCombineTask
    config:
      calibrationType: parameters.fringeType
"#,
    )
    .unwrap();
    let pipeline = resolve(&document).unwrap();
    assert_eq!(
        pipeline.get("cpCombine").unwrap().config["calibrationType"],
        ConfigValue::String("fringe".to_string())
    );

    let missing = PipelineDocument::from_yaml(
        "description: d\ntasks:\n  cpCombine:\n    class: lsst.cp.pipe.CalibCombineTask\n    config:\n      calibrationType: parameters.nope\n",
    )
    .unwrap();
    assert!(matches!(
        resolve(&missing),
        Err(ValidationError::UnknownParameter { parameter, .. }) if parameter == "nope"
    ));
}

#[test]
fn test_fringe_chain_wires_in_order() {
    let pipeline = resolve(&fringe_document()).unwrap();
    let graph = ConnectionGraph::build(&pipeline, &raw_only()).unwrap();

    assert_eq!(graph.root_tasks(), vec!["isr"]);
    assert_eq!(graph.leaf_tasks(), vec!["cpCombine"]);
    assert_eq!(graph.producers_of("cpFringeProc"), vec!["cpFringe"]);
    assert_eq!(
        graph.consumers_of("cpFringeIsr"),
        vec![("cpFringe".to_string(), "inputExp".to_string())]
    );
    assert!(graph.has_dependency_path("cpCombine", "isr"));
    assert!(!graph.has_dependency_path("isr", "cpCombine"));

    let plan = graph.create_execution_plan().unwrap();
    assert_eq!(
        plan.batches,
        vec![vec!["isr"], vec!["cpFringe"], vec!["cpCombine"]]
    );
    assert_eq!(plan.total_tasks, 3);
    assert!(plan.contains_task("cpFringe"));
    assert!(!plan.contains_task("fringe"));
    assert_eq!(plan.get_successors("isr"), vec!["cpFringe", "cpCombine"]);

    let dot = graph.to_dot();
    assert!(dot.contains("cpFringeIsr"));
    assert!(dot.contains("cpFringeProc"));
}

#[test]
fn test_independent_tasks_share_a_batch() {
    let document = TestPipelineBuilder::new("two detectors")
        .add_isr("isrA", "isrA")
        .add_isr("isrB", "isrB")
        .add_fringe("fringeA", "isrA", "procA")
        .add_fringe("fringeB", "isrB", "procB")
        .build();
    let pipeline = resolve(&document).unwrap();
    let plan = ConnectionGraph::build(&pipeline, &raw_only())
        .unwrap()
        .create_execution_plan()
        .unwrap();

    assert_eq!(
        plan.batches,
        vec![vec!["isrA", "isrB"], vec!["fringeA", "fringeB"]]
    );
    assert_eq!(plan.max_parallelism(), 2);
}

#[test]
fn test_wiring_errors() {
    // nothing produces cpFringeIsr
    let dangling = TestPipelineBuilder::new("dangling")
        .add_fringe("cpFringe", "cpFringeIsr", "cpFringeProc")
        .build();
    let pipeline = resolve(&dangling).unwrap();
    assert!(matches!(
        ConnectionGraph::build(&pipeline, &raw_only()),
        Err(ValidationError::DanglingConnection { task, port, dataset_type })
            if task == "cpFringe" && port == "inputExp" && dataset_type == "cpFringeIsr"
    ));

    // the same document is fine when the type is supplied from outside
    let externals = ExternalDatasets::new(["raw", "cpFringeIsr"]);
    assert!(ConnectionGraph::build(&pipeline, &externals).is_ok());

    let duplicate = TestPipelineBuilder::new("duplicate")
        .add_isr("isrA", "cpFringeIsr")
        .add_isr("isrB", "cpFringeIsr")
        .build();
    let pipeline = resolve(&duplicate).unwrap();
    assert!(matches!(
        ConnectionGraph::build(&pipeline, &raw_only()),
        Err(ValidationError::DuplicateProducer { first, second, .. })
            if first == "isrA" && second == "isrB"
    ));

    let cycle = TestPipelineBuilder::new("cycle")
        .add_fringe("first", "loopB", "loopA")
        .add_fringe("second", "loopA", "loopB")
        .build();
    let pipeline = resolve(&cycle).unwrap();
    match ConnectionGraph::build(&pipeline, &raw_only()) {
        Err(ValidationError::Cycle { tasks }) => assert_eq!(tasks, vec!["first", "second"]),
        Err(other) => panic!("expected a cycle, got {}", other),
        Ok(_) => panic!("expected a cycle"),
    }
}

#[test]
fn test_analyze_reports_every_problem() {
    let document = TestPipelineBuilder::new("broken")
        .add_isr("isrA", "cpFringeIsr")
        .add_isr("isrB", "cpFringeIsr")
        .add_fringe("cpFringe", "missingType", "cpFringeProc")
        .build();
    let pipeline = resolve(&document).unwrap();

    let (_, errors) = ConnectionGraph::analyze(&pipeline, &raw_only());
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::DuplicateProducer { .. })));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::DanglingConnection { .. })));
}

#[test]
fn test_selection() {
    let pipeline = resolve(&fringe_document()).unwrap();

    let subset = pipeline
        .select(&TaskSelection::Subset("fringeProcessing".to_string()))
        .unwrap();
    assert_eq!(subset.labels(), vec!["cpFringe", "cpCombine"]);

    assert!(matches!(
        pipeline.select(&TaskSelection::Subset("nope".to_string())),
        Err(ValidationError::UnknownSubset { .. })
    ));
    assert!(matches!(
        pipeline.select(&TaskSelection::Labels(vec!["flat".to_string()])),
        Err(ValidationError::UnknownTaskLabel { task }) if task == "flat"
    ));
}

#[tokio::test]
async fn test_executor_runs_fringe_chain() {
    let document = fringe_document();
    let executor = PipelineExecutor::with_registry(Arc::new(TaskRegistry::new()), 2);

    let result = executor
        .execute(&document, run_options(&document, 4))
        .await
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.instrument.as_deref(), Some("lsst.obs.lsst.LsstCam"));
    assert_eq!(result.summary.total_tasks, 3);
    assert_eq!(result.summary.successful_tasks, 3);
    assert!(result.duration.is_some());

    let names: Vec<&str> = result.tasks.iter().map(|t| t.task.as_str()).collect();
    assert_eq!(names, vec!["isr", "cpFringe", "cpCombine"]);

    assert_eq!(result.datasets_of("cpFringeIsr").len(), 4);
    assert_eq!(result.datasets_of("cpFringeProc").len(), 4);

    let fringe = result.datasets_of("fringe");
    assert_eq!(fringe.len(), 1);
    assert_eq!(fringe[0].produced_by.as_deref(), Some("cpCombine"));
    assert!(!fringe[0].provenance.is_empty());
}

#[tokio::test]
async fn test_executor_subset_run() {
    let document = fringe_document();
    let executor = PipelineExecutor::default();
    let options = selected_run_options(
        &document,
        TaskSelection::Subset("fringeProcessing".to_string()),
        &["raw", "cpFringeIsr"],
        2,
    );

    let result = executor.execute(&document, options).await.unwrap();

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.summary.total_tasks, 2);
    assert!(result.get_task_result("isr").is_none());
    assert_eq!(result.datasets_of("fringe").len(), 1);
}

#[tokio::test]
async fn test_executor_failure_skips_downstream() {
    let document = fringe_document();
    let executor = PipelineExecutor::default();

    let result = executor
        .execute(&document, RunOptions::new(raw_only()))
        .await
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.summary.failed_tasks, 1);
    assert_eq!(result.summary.skipped_tasks, 2);
    assert_eq!(
        result.get_task_result("cpFringe").unwrap().status,
        TaskStatus::Skipped
    );
    assert_eq!(result.failure.as_ref().unwrap().task, "isr");
    assert!(result.datasets_of("fringe").is_empty());

    let err = result.into_result().unwrap_err();
    assert!(!err.is_preflight());
    assert!(matches!(err, ExecutionError::TaskFailed { task, .. } if task == "isr"));
}

#[tokio::test]
async fn test_preflight_errors_surface_before_execution() {
    let executor = PipelineExecutor::default();
    let dangling = TestPipelineBuilder::new("dangling")
        .add_fringe("cpFringe", "cpFringeIsr", "cpFringeProc")
        .build();

    let err = executor
        .execute(&dangling, RunOptions::new(raw_only()))
        .await
        .unwrap_err();
    assert!(err.is_preflight());
    assert!(matches!(
        err,
        ExecutionError::Validation(ValidationError::DanglingConnection { .. })
    ));
}
