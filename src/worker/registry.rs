//! Named functions a worker process can run.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinError;

use super::WorkerContext;
use crate::core::AppResult;

/// A function invoked once per rank.
///
/// `args` holds the shared argument first (when present), then the rank's
/// chunk of per-rank arguments as a JSON array (when present).
///
/// # Example
///
/// ```rust,ignore
/// struct Smooth;
///
/// #[async_trait]
/// impl WorkerFunction for Smooth {
///     async fn call(&self, ctx: &WorkerContext, args: Vec<Value>) -> AppResult<()> {
///         let kernel = ctx.load("kernels")?;
///         // ...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait WorkerFunction: Send + Sync {
    /// Run for one rank.
    async fn call(&self, ctx: &WorkerContext, args: Vec<Value>) -> AppResult<()>;
}

/// Turn a failed rank task into an error, keeping the panic message.
pub(crate) fn join_failure(err: JoinError) -> anyhow::Error {
    match err.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            anyhow!("rank panicked: {message}")
        }
        Err(err) => anyhow!("rank task aborted: {err}"),
    }
}

/// Synchronous closure run on the blocking thread pool, one thread per rank.
struct SyncFunction<F>(Arc<F>);

#[async_trait]
impl<F> WorkerFunction for SyncFunction<F>
where
    F: Fn(&WorkerContext, Vec<Value>) -> AppResult<()> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &WorkerContext, args: Vec<Value>) -> AppResult<()> {
        let function = Arc::clone(&self.0);
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || function(&ctx, args))
            .await
            .map_err(join_failure)?
    }
}

/// Lookup table from task function names to implementations.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn WorkerFunction>>,
}

impl FunctionRegistry {
    /// Empty registry; shell targets need no registration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async function.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, function: impl WorkerFunction + 'static) -> Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Register a synchronous closure. Each call runs on its own blocking
    /// thread, so CPU-bound ranks of a pool run in parallel.
    #[must_use]
    pub fn register_fn<F>(self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&WorkerContext, Vec<Value>) -> AppResult<()> + Send + Sync + 'static,
    {
        self.register(name, SyncFunction(Arc::new(function)))
    }

    /// Function registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn WorkerFunction>> {
        self.functions.get(name).cloned()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
