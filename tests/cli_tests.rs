// ABOUTME: Integration tests for the CLI application
// ABOUTME: Runs the calpipe binary against fringe pipelines and checks output and exit codes

use assert_cmd::Command;
use predicates::prelude::*;

mod common;
use common::{read_json_output, TestEnvironment, FRINGE_PIPELINE};

/// The binary run from inside the test environment, isolated from user config
fn calpipe(env: &TestEnvironment) -> Command {
    let mut cmd = Command::cargo_bin("calpipe").expect("calpipe binary builds");
    cmd.current_dir(env.path())
        .env("HOME", env.path())
        .env_remove("RUST_LOG")
        .env_remove("CALPIPE_EXTERNAL_DATASETS")
        .env_remove("CALPIPE_MAX_CONCURRENT");
    cmd
}

#[test]
fn test_cli_help_command() {
    let env = TestEnvironment::new();
    calpipe(&env)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibration pipelines"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_cli_version_command() {
    let env = TestEnvironment::new();
    calpipe(&env)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
async fn test_cli_run_writes_json_result() {
    let env = TestEnvironment::new();
    let pipeline = env.write_raw("cpFringe", FRINGE_PIPELINE).await;
    let output = env.output_file("cpFringe");

    calpipe(&env)
        .arg("run")
        .arg(&pipeline)
        .args(["--exposures", "2", "--format", "json", "--output"])
        .arg(&output)
        .assert()
        .success();

    let json = read_json_output(&output).await.unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["summary"]["total_tasks"], 3);
    assert_eq!(json["summary"]["successful_tasks"], 3);
}

#[tokio::test]
async fn test_cli_run_text_output() {
    let env = TestEnvironment::new();
    let pipeline = env.write_raw("cpFringe", FRINGE_PIPELINE).await;

    calpipe(&env)
        .arg("run")
        .arg(&pipeline)
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: success"))
        .stdout(predicate::str::contains("cpCombine"));
}

#[tokio::test]
async fn test_cli_dry_run_prints_batches() {
    let env = TestEnvironment::new();
    let pipeline = env.write_raw("cpFringe", FRINGE_PIPELINE).await;

    calpipe(&env)
        .arg("run")
        .arg(&pipeline)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("passed pre-flight checks"))
        .stdout(predicate::str::contains("Batch 1: isr"))
        .stdout(predicate::str::contains("Batch 3: cpCombine"))
        .stdout(predicate::str::contains("Contracts: 3"));
}

#[tokio::test]
async fn test_cli_subset_run_needs_external_isr_output() {
    let env = TestEnvironment::new();
    let pipeline = env.write_raw("cpFringe", FRINGE_PIPELINE).await;

    calpipe(&env)
        .arg("run")
        .arg(&pipeline)
        .args(["--subset", "fringeProcessing", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cpFringeIsr"));

    calpipe(&env)
        .arg("run")
        .arg(&pipeline)
        .args(["--subset", "fringeProcessing", "-e", "cpFringeIsr"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total tasks: 2"));
}

#[tokio::test]
async fn test_cli_validate() {
    let env = TestEnvironment::new();
    let valid = env.write_raw("cpFringe", FRINGE_PIPELINE).await;
    let invalid = env
        .write_raw(
            "fringeOn",
            &FRINGE_PIPELINE.replace("doFringe: False", "doFringe: True"),
        )
        .await;

    calpipe(&env)
        .arg("validate")
        .arg(&valid)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ isr.doFringe == False"))
        .stdout(predicate::str::contains("Pipeline is valid"));

    calpipe(&env)
        .arg("validate")
        .arg(&invalid)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Contract violated: isr.doFringe == False"))
        .stdout(predicate::str::contains("Pipeline is invalid: 1 error(s)"));
}

#[tokio::test]
async fn test_cli_validate_json_report() {
    let env = TestEnvironment::new();
    let pipeline = env.write_raw("cpFringe", FRINGE_PIPELINE).await;

    let assert = calpipe(&env)
        .arg("validate")
        .arg(&pipeline)
        .args(["--format", "json"])
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("report is json");
    assert_eq!(report["is_valid"], true);
    assert_eq!(report["contracts"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_cli_missing_pipeline_file() {
    let env = TestEnvironment::new();
    calpipe(&env)
        .args(["validate", "nonexistent.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load pipeline"));
}

#[tokio::test]
async fn test_cli_show() {
    let env = TestEnvironment::new();
    let pipeline = env.write_raw("cpFringe", FRINGE_PIPELINE).await;

    calpipe(&env)
        .arg("show")
        .arg(&pipeline)
        .assert()
        .success()
        .stdout(predicate::str::contains("fringeProcessing"));

    calpipe(&env)
        .arg("show")
        .arg(&pipeline)
        .args(["--resolved", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> outputExposure cpFringeIsr[]"))
        .stdout(predicate::str::contains("<= bias bias"))
        .stdout(predicate::str::contains("saturation"));

    calpipe(&env)
        .arg("show")
        .arg(&pipeline)
        .args(["--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Text format needs --resolved"));
}

#[tokio::test]
async fn test_cli_graph() {
    let env = TestEnvironment::new();
    let pipeline = env.write_raw("cpFringe", FRINGE_PIPELINE).await;

    calpipe(&env)
        .arg("graph")
        .arg(&pipeline)
        .assert()
        .success()
        .stdout(predicate::str::contains("isr --cpFringeIsr--> cpFringe.inputExp"))
        .stdout(predicate::str::contains("Leaves: cpCombine"));

    calpipe(&env)
        .arg("graph")
        .arg(&pipeline)
        .arg("--dot")
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph"))
        .stdout(predicate::str::contains("cpFringeProc"));
}

#[test]
fn test_cli_tasks() {
    let env = TestEnvironment::new();
    calpipe(&env)
        .arg("tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("lsst.ip.isr.isrTask.IsrTask"))
        .stdout(predicate::str::contains("lsst.cp.pipe.cpFringeTask.CpFringeTask"))
        .stdout(predicate::str::contains("lsst.cp.pipe.cpCombine.CalibCombineTask"));
}

#[tokio::test]
async fn test_cli_init_then_validate() {
    let env = TestEnvironment::new();

    calpipe(&env)
        .args(["init", "myFringe", "--output-dir", "pipelines"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created pipeline file"));

    let created = env.path().join("pipelines").join("myFringe.yaml");
    assert!(created.exists());

    calpipe(&env)
        .arg("validate")
        .arg(&created)
        .assert()
        .success();

    calpipe(&env)
        .args(["init", "myFringe", "--output-dir", "pipelines"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[tokio::test]
async fn test_cli_config_file_adds_externals() {
    let env = TestEnvironment::new();
    let pipeline = env.write_raw("cpFringe", FRINGE_PIPELINE).await;
    tokio::fs::write(
        env.path().join("calpipe.yaml"),
        "external_datasets: [raw, cpFringeIsr]\n",
    )
    .await
    .unwrap();

    calpipe(&env)
        .arg("run")
        .arg(&pipeline)
        .args(["--task", "cpFringe", "--task", "cpCombine", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Batch 1: cpFringe"));
}
