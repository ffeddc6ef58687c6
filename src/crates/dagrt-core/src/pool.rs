//! Worker pools for `Blocking` node callables.
//!
//! There is no cross-process worker pool here, just a dedicated
//! blocking-thread pool for `process`-tagged callables, kept logically
//! distinct from the general one so that pool readiness can be checked
//! before dispatch: a scheduler built without a process pool fails fast on a
//! `Process`-tagged node instead of silently running it on the general pool.

use crate::node::NodeResult;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct WorkerPools {
    process_pool: Option<Arc<tokio::runtime::Runtime>>,
}

impl Default for WorkerPools {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPools {
    /// General thread pool only; no process pool. `Process`-tagged nodes
    /// will fail fast.
    pub fn new() -> Self {
        Self { process_pool: None }
    }

    /// Also stand up a dedicated multi-threaded runtime for `Process`-tagged
    /// callables.
    pub fn with_process_pool(worker_threads: usize) -> std::io::Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("dagrt-process-pool")
            .enable_all()
            .build()?;
        Ok(Self { process_pool: Some(Arc::new(rt)) })
    }

    pub fn has_thread_pool(&self) -> bool {
        true
    }

    pub fn has_process_pool(&self) -> bool {
        self.process_pool.is_some()
    }

    /// Run a blocking closure on the general thread pool.
    pub fn spawn_thread(&self, f: impl FnOnce() -> NodeResult + Send + 'static) -> JoinHandle<NodeResult> {
        tokio::task::spawn_blocking(f)
    }

    /// Run a blocking closure on the process pool, if present.
    pub fn spawn_process(&self, f: impl FnOnce() -> NodeResult + Send + 'static) -> Option<JoinHandle<NodeResult>> {
        self.process_pool.as_ref().map(|rt| rt.spawn_blocking(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pools_have_no_process_pool() {
        let pools = WorkerPools::new();
        assert!(pools.has_thread_pool());
        assert!(!pools.has_process_pool());
    }

    #[tokio::test]
    async fn with_process_pool_reports_readiness() {
        let pools = WorkerPools::with_process_pool(1).unwrap();
        assert!(pools.has_process_pool());
        let out = pools.spawn_process(|| Ok(crate::node::NodeOutcome::Value(serde_json::json!(1)))).unwrap();
        assert!(out.await.unwrap().is_ok());
    }
}
