//! Artifact store: the one pluggable persistence backend the core depends
//! on. The scheduler calls `save` after every node result is published
//! (unless the node is tagged `skip_store`); `load` is optional and unused
//! by the core itself.

use async_trait::async_trait;
use std::path::PathBuf;

/// What the scheduler persists per node: either the value itself, or the
/// error that was stored as the node's result, so consumers of the artifact
/// store can still observe it for best-effort debugging.
#[derive(Debug, Clone)]
pub enum ArtifactValue {
    Value(serde_json::Value),
    Error(String),
}

/// Save/load backend for per-node results. Failures are swallowed and
/// logged by the scheduler — they must never affect the pipeline result.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(&self, pipeline_id: &str, model_name: &str, node_id: &str, value: &ArtifactValue);

    async fn load(&self, _pipeline_id: &str, _model_name: &str, _node_id: &str) -> Option<ArtifactValue> {
        None
    }
}

/// Discards everything. The default for pipelines that don't need durable
/// artifacts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpArtifactStore;

#[async_trait]
impl ArtifactStore for NoOpArtifactStore {
    async fn save(&self, _pipeline_id: &str, _model_name: &str, _node_id: &str, _value: &ArtifactValue) {}
}

/// Writes `<root>/<model_name>/<pipeline_id>/<node_id>.json` per successful
/// node. The core is otherwise oblivious to this layout — it's a reference
/// implementation, not a contract the scheduler depends on.
#[derive(Debug, Clone)]
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run_dir(&self, model_name: &str, pipeline_id: &str) -> PathBuf {
        self.root.join(model_name).join(pipeline_id)
    }

    fn path(&self, model_name: &str, pipeline_id: &str, node_id: &str) -> PathBuf {
        self.run_dir(model_name, pipeline_id).join(format!("{node_id}.json"))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn save(&self, pipeline_id: &str, model_name: &str, node_id: &str, value: &ArtifactValue) {
        let dir = self.run_dir(model_name, pipeline_id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(pipeline_id, node_id, error = %e, "artifact store: failed to create run dir");
            return;
        }

        let body = match value {
            ArtifactValue::Value(v) => serde_json::to_vec_pretty(v),
            ArtifactValue::Error(msg) => serde_json::to_vec_pretty(&serde_json::json!({ "error": msg })),
        };
        let body = match body {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(pipeline_id, node_id, error = %e, "artifact store: failed to serialize result");
                return;
            }
        };

        let path = self.path(model_name, pipeline_id, node_id);
        if let Err(e) = tokio::fs::write(&path, body).await {
            tracing::warn!(pipeline_id, node_id, error = %e, path = %path.display(), "artifact store: failed to write");
        }
    }

    async fn load(&self, pipeline_id: &str, model_name: &str, node_id: &str) -> Option<ArtifactValue> {
        let path = self.path(model_name, pipeline_id, node_id);
        let bytes = tokio::fs::read(&path).await.ok()?;
        let v: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        Some(ArtifactValue::Value(v))
    }
}
