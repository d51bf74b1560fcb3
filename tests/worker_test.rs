//! Worker bootstrap tests, run in-process with a test registry.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use async_trait::async_trait;
use nodequeue::core::AppResult;
use nodequeue::infra::npy::{self, NpyArray};
use nodequeue::infra::{ArtifactPaths, TaskArtifact, WorkerTarget};
use nodequeue::worker::bootstrap::report_failure;
use nodequeue::worker::{run, FunctionRegistry, RankPayload, WorkerArgs, WorkerContext, WorkerFunction};
use serde_json::{json, Value};

fn write_artifact(dir: &Path, name: &str, artifact: &TaskArtifact) -> WorkerArgs {
    let paths = ArtifactPaths::new(dir, name);
    paths.write_input(artifact).unwrap();
    WorkerArgs {
        artifact: paths.prefix().to_path_buf(),
        mp: None,
    }
}

fn function(name: &str, shared: Option<Value>, per_rank: Option<Vec<Vec<Value>>>) -> TaskArtifact {
    TaskArtifact {
        target: WorkerTarget::Function(name.into()),
        shared,
        per_rank,
    }
}

/// Adds the shared offset to each of the rank's items and stores the total.
fn offset_sum(ctx: &WorkerContext, args: Vec<Value>) -> AppResult<()> {
    let offset = args[0].as_i64().context("offset")?;
    let items = args[1].as_array().context("items")?;
    let total: i64 = items.iter().filter_map(Value::as_i64).map(|v| v + offset).sum();
    ctx.dump(&RankPayload::Value(json!(total)), ".")?;
    Ok(())
}

struct Double;

#[async_trait]
impl WorkerFunction for Double {
    async fn call(&self, ctx: &WorkerContext, _args: Vec<Value>) -> AppResult<()> {
        let RankPayload::Array(input) = ctx.load("inputs")? else {
            bail!("expected an array payload");
        };
        tokio::task::yield_now().await;
        let doubled = NpyArray {
            shape: input.shape,
            data: input.data.iter().map(|v| v * 2.0).collect(),
        };
        ctx.dump(&RankPayload::Array(doubled), "outputs")?;
        Ok(())
    }
}

#[tokio::test]
async fn test_pool_ranks_get_their_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = function(
        "offset_sum",
        Some(json!(10)),
        Some(vec![vec![json!(1), json!(2)], vec![json!(3)]]),
    );
    let args = WorkerArgs {
        mp: Some(2),
        ..write_artifact(dir.path(), "task", &artifact)
    };
    let registry = FunctionRegistry::new().register_fn("offset_sum", offset_sum);

    run(&args, &registry).await.unwrap();

    let read = |f: &str| fs::read_to_string(dir.path().join(f)).unwrap();
    assert_eq!(read("p0.json"), "23");
    assert_eq!(read("p1.json"), "13");
}

#[tokio::test]
async fn test_single_rank_async_function() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("inputs")).unwrap();
    fs::create_dir(dir.path().join("outputs")).unwrap();
    let input = npy::encode(&NpyArray::from_vec(vec![1.5, -4.0])).unwrap();
    fs::write(dir.path().join("inputs").join("p0.npy"), input).unwrap();

    let args = WorkerArgs {
        mp: Some(1),
        ..write_artifact(dir.path(), "double", &function("double", None, None))
    };
    let registry = FunctionRegistry::new().register("double", Double);

    run(&args, &registry).await.unwrap();

    let output = fs::read(dir.path().join("outputs").join("p0.npy")).unwrap();
    assert_eq!(npy::decode(&output).unwrap().data, vec![3.0, -8.0]);
}

#[tokio::test]
async fn test_shell_target_runs_in_artifact_dir() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = TaskArtifact {
        target: WorkerTarget::Shell("touch marker".into()),
        shared: None,
        per_rank: None,
    };
    let args = WorkerArgs {
        mp: Some(1),
        ..write_artifact(dir.path(), "touch", &artifact)
    };

    run(&args, &FunctionRegistry::new()).await.unwrap();
    assert!(dir.path().join("marker").is_file());
}

#[tokio::test]
async fn test_shell_target_failure() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = TaskArtifact {
        target: WorkerTarget::Shell("exit 7".into()),
        shared: None,
        per_rank: None,
    };
    let args = WorkerArgs {
        mp: Some(1),
        ..write_artifact(dir.path(), "fail", &artifact)
    };

    let err = run(&args, &FunctionRegistry::new()).await.unwrap_err();
    assert!(err.to_string().contains("exit 7"), "{err}");
}

#[tokio::test]
async fn test_failing_rank_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = function("picky", None, Some(vec![vec![json!("ok")], vec![json!("bad")], vec![json!("ok")]]));
    let args = WorkerArgs {
        mp: Some(3),
        ..write_artifact(dir.path(), "picky", &artifact)
    };
    let registry = FunctionRegistry::new().register_fn("picky", |ctx, args| {
        if args[0] == json!(["bad"]) {
            bail!("rank {} got a bad item", ctx.rank());
        }
        Ok(())
    });

    let err = run(&args, &registry).await.unwrap_err();
    assert_eq!(err.to_string(), "rank 1 got a bad item");

    report_failure(&args.artifact, &err);
    let trace = ArtifactPaths::new(dir.path(), "picky").read_error().unwrap().unwrap();
    assert!(trace.contains("rank 1 got a bad item"));
}

#[tokio::test]
async fn test_unknown_function() {
    let dir = tempfile::tempdir().unwrap();
    let args = WorkerArgs {
        mp: Some(1),
        ..write_artifact(dir.path(), "t", &function("nope", None, None))
    };
    let registry = FunctionRegistry::new().register_fn("known", |_, _| Ok(()));

    let err = run(&args, &registry).await.unwrap_err();
    assert_eq!(err.to_string(), "function `nope` is not registered (known: [\"known\"])");
}

#[tokio::test]
async fn test_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let args = WorkerArgs {
        artifact: dir.path().join("absent"),
        mp: Some(1),
    };
    assert!(run(&args, &FunctionRegistry::new()).await.is_err());
}

#[tokio::test]
async fn test_panicking_single_rank_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let args = WorkerArgs {
        mp: Some(1),
        ..write_artifact(dir.path(), "boom", &function("boom", None, None))
    };
    let registry = FunctionRegistry::new().register_fn("boom", |_, _| panic!("boom"));

    let err = run(&args, &registry).await.unwrap_err();
    assert_eq!(err.to_string(), "rank panicked: boom");

    report_failure(&args.artifact, &err);
    let trace = ArtifactPaths::new(dir.path(), "boom").read_error().unwrap().unwrap();
    assert!(trace.contains("rank panicked: boom"), "{trace}");
}

#[tokio::test]
async fn test_panicking_mpi_rank_is_returned() {
    struct Panics;

    #[async_trait]
    impl WorkerFunction for Panics {
        async fn call(&self, _ctx: &WorkerContext, _args: Vec<Value>) -> AppResult<()> {
            panic!("async boom");
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let args = write_artifact(dir.path(), "mpi", &function("panics", None, None));
    let registry = FunctionRegistry::new().register("panics", Panics);

    let err = run(&args, &registry).await.unwrap_err();
    assert_eq!(err.to_string(), "rank panicked: async boom");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_ranks_run_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let args = WorkerArgs {
        mp: Some(8),
        ..write_artifact(dir.path(), "busy", &function("busy", None, None))
    };
    let registry = FunctionRegistry::new().register_fn("busy", |_, _| {
        std::thread::sleep(Duration::from_millis(200));
        Ok(())
    });

    let started = Instant::now();
    run(&args, &registry).await.unwrap();

    // 8 ranks on 2 runtime threads would take 800ms if they shared them
    assert!(started.elapsed() < Duration::from_millis(600), "{:?}", started.elapsed());
}
