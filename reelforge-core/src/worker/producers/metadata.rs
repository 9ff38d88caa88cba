use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Extracts container/stream metadata via `ffprobe -print_format json`.
pub struct MetadataWorker;

#[async_trait]
impl ArtifactWorker for MetadataWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Metadata
    }

    fn validate(&self, params: &Value) -> Result<Value, WorkerError> {
        Ok(params.clone())
    }

    async fn run(
        &self,
        ctx: &WorkerContext,
        resolver: &Resolver,
        file: &MediaFile,
        _params: &Value,
    ) -> WorkerOutcome {
        let source = file.absolute(resolver.root());
        let args = vec![
            "-v".into(),
            "quiet".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            source.to_string_lossy().into_owned(),
        ];

        let stdout = subprocess::run_capturing_stdout("ffprobe", &args, &ctx.cancel_token(), ctx.timeout()).await?;

        ctx.report(1, 1, Some("probed".into()));

        let probed: Value = serde_json::from_slice(&stdout)
            .map_err(|e| WorkerError::new("worker-runtime", format!("ffprobe produced invalid json: {e}")))?;

        let temp_path = ctx.workspace_dir().join("metadata.json");
        std::fs::write(&temp_path, serde_json::to_vec_pretty(&probed).unwrap_or_default())
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        let final_path = &self.plan(resolver, file)[0];
        ctx.publish(&temp_path, final_path)
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        Ok(json!({ "sidecar": final_path }))
    }
}
