use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Extracts a single representative still frame as a JPEG.
pub struct ThumbnailWorker;

#[async_trait]
impl ArtifactWorker for ThumbnailWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Thumbnail
    }

    fn validate(&self, params: &Value) -> Result<Value, WorkerError> {
        let offset_secs = params.get("offset_secs").and_then(|v| v.as_f64()).unwrap_or(10.0);
        if offset_secs < 0.0 {
            return Err(WorkerError::new("invalid-input", "offset_secs must be >= 0"));
        }
        Ok(json!({ "offset_secs": offset_secs }))
    }

    async fn run(
        &self,
        ctx: &WorkerContext,
        resolver: &Resolver,
        file: &MediaFile,
        params: &Value,
    ) -> WorkerOutcome {
        let offset = params.get("offset_secs").and_then(|v| v.as_f64()).unwrap_or(10.0);
        let source = file.absolute(resolver.root());
        let temp_path = ctx.workspace_dir().join("thumbnail.jpg");

        let args = vec![
            "-y".into(),
            "-ss".into(),
            offset.to_string(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-frames:v".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            temp_path.to_string_lossy().into_owned(),
        ];

        subprocess::run_checked("ffmpeg", &args, &ctx.cancel_token(), ctx.timeout()).await?;

        ctx.report(1, 1, None);

        let final_path = &self.plan(resolver, file)[0];
        ctx.publish(&temp_path, final_path)
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        Ok(json!({ "sidecar": final_path }))
    }
}
