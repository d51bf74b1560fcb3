//! Tests for error types

use std::time::Duration;

use nodequeue::core::SchedulerError;

#[test]
fn test_non_zero_exit_error() {
    let err = SchedulerError::NonZeroExit {
        command: "mpiexec -n 4 ./solver".to_string(),
        code: Some(3),
    };
    assert_eq!(format!("{}", err), "mpiexec -n 4 ./solver\nexit code: 3");
}

#[test]
fn test_killed_by_signal_error() {
    let err = SchedulerError::NonZeroExit {
        command: "./solver".to_string(),
        code: None,
    };
    assert_eq!(format!("{}", err), "./solver\nexit code: signal");
}

#[test]
fn test_timeout_error() {
    let err = SchedulerError::Timeout(Duration::from_millis(100));
    assert_eq!(format!("{}", err), "task timed out after 100ms");
}

#[test]
fn test_gate_closed_error() {
    assert_eq!(format!("{}", SchedulerError::GateClosed), "admission gate closed");
}

#[test]
fn test_worker_failure_is_verbatim() {
    let err = SchedulerError::WorkerFailed("rank 2 failed\nCaused by: boom".to_string());
    assert_eq!(format!("{}", err), "rank 2 failed\nCaused by: boom");
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: SchedulerError = io.into();
    assert!(matches!(err, SchedulerError::Io(_)));
    assert_eq!(format!("{}", err), "io error: gone");
}
