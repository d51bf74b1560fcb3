//! Tests for configuration validation

use std::path::PathBuf;

use nodequeue::config::{JobConfig, LaunchTemplate, MpiLauncher, QueueBudget};
use nodequeue::util::clock::now_ms;

fn job() -> JobConfig {
    JobConfig {
        nnodes: 2,
        mp_nprocs_max: 8,
        cpus_per_node: 48,
        gpus_per_node: 4,
        node_splittable: true,
        queue: None,
        launcher: LaunchTemplate::mpiexec(),
        worker_program: PathBuf::from("nodequeue-worker"),
    }
}

#[test]
fn test_job_config_validation() {
    assert!(job().validate().is_ok());
    assert!(JobConfig::default().validate().is_ok());
}

#[test]
fn test_job_config_invalid_nnodes() {
    let invalid = JobConfig { nnodes: 0, ..job() };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_job_config_invalid_workers() {
    let invalid = JobConfig { mp_nprocs_max: 0, ..job() };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_job_config_invalid_cpus() {
    let invalid = JobConfig { cpus_per_node: 0, ..job() };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_job_config_template_without_cmd() {
    let invalid = JobConfig {
        launcher: LaunchTemplate("mpiexec -n {nprocs}".to_string()),
        ..job()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_job_config_invalid_walltime() {
    let invalid = JobConfig {
        queue: Some(QueueBudget {
            walltime_mins: 0.0,
            started_at_ms: now_ms(),
        }),
        ..job()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_job_config_from_json() {
    let cfg = JobConfig::from_json_str(
        r#"{"nnodes": 4, "cpus_per_node": 64, "node_splittable": false, "launcher": "srun -n {nprocs} {cmd}"}"#,
    )
    .unwrap();
    assert_eq!(cfg.nnodes, 4);
    assert_eq!(cfg.cpus_per_node, 64);
    assert!(!cfg.node_splittable);
    assert!(!cfg.inqueue());
    assert_eq!(cfg.remaining(), None);
    assert_eq!(cfg.launcher.render("./a.out", 8, 1, 0), "srun -n 8 ./a.out");
}

#[test]
fn test_job_config_from_json_rejects_invalid() {
    assert!(JobConfig::from_json_str(r#"{"nnodes": 0}"#).is_err());
    assert!(JobConfig::from_json_str("not json").is_err());
}

#[test]
fn test_default_launcher_renders_mpiexec() {
    let rendered = LaunchTemplate::default().render("./solver", 4, 1, 0);
    assert_eq!(rendered, "mpiexec -n 4 ./solver");
    assert_eq!(LaunchTemplate::direct().render("./solver", 4, 1, 0), "./solver");
}

#[test]
fn test_queued_job_has_remaining_walltime() {
    let cfg = JobConfig {
        queue: Some(QueueBudget {
            walltime_mins: 30.0,
            started_at_ms: now_ms(),
        }),
        ..job()
    };
    assert!(cfg.inqueue());
    let left = cfg.remaining().unwrap().as_secs();
    assert!(left > 1790 && left <= 1800, "left = {left}");
}
