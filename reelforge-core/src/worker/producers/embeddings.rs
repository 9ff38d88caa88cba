use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Produces face embedding vectors from the detections already recorded in
/// the faces sidecar, via the same pluggable face-backend tool class.
/// Depends only on the faces sidecar existing; re-embedding does not
/// re-run detection.
pub struct EmbeddingsWorker;

fn backend_command(params: &Value) -> String {
    params
        .get("backend_command")
        .and_then(|v| v.as_str())
        .unwrap_or("reelforge-face-embed")
        .to_string()
}

#[async_trait]
impl ArtifactWorker for EmbeddingsWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Embeddings
    }

    fn validate(&self, params: &Value) -> Result<Value, WorkerError> {
        Ok(json!({ "backend_command": backend_command(params) }))
    }

    async fn run(
        &self,
        ctx: &WorkerContext,
        resolver: &Resolver,
        file: &MediaFile,
        params: &Value,
    ) -> WorkerOutcome {
        let command = backend_command(params);
        let faces_sidecar = resolver.resolve(&file.rel_path, ArtifactKind::Faces)[0].clone();
        if !faces_sidecar.exists() {
            return Err(WorkerError::new(
                "worker-runtime",
                "embeddings require the faces artifact to be generated first",
            ));
        }

        let temp_path = ctx.workspace_dir().join("embeddings.json");
        let args = vec![
            "--faces".into(),
            faces_sidecar.to_string_lossy().into_owned(),
            "--output".into(),
            temp_path.to_string_lossy().into_owned(),
        ];

        subprocess::run_checked(&command, &args, &ctx.cancel_token(), ctx.timeout()).await?;
        ctx.report(1, 1, Some("embedded".into()));

        let final_path = &self.plan(resolver, file)[0];
        ctx.publish(&temp_path, final_path)
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        Ok(json!({ "sidecar": final_path }))
    }
}
