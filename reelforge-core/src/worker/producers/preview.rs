use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Produces a short, silent, low-resolution hover-preview clip.
pub struct PreviewWorker;

#[async_trait]
impl ArtifactWorker for PreviewWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Preview
    }

    fn validate(&self, params: &Value) -> Result<Value, WorkerError> {
        let duration_secs = params.get("duration_secs").and_then(|v| v.as_f64()).unwrap_or(6.0);
        if !(0.5..=60.0).contains(&duration_secs) {
            return Err(WorkerError::new("invalid-input", "duration_secs must be in 0.5..=60.0"));
        }
        Ok(json!({ "duration_secs": duration_secs }))
    }

    async fn run(
        &self,
        ctx: &WorkerContext,
        resolver: &Resolver,
        file: &MediaFile,
        params: &Value,
    ) -> WorkerOutcome {
        let duration = params.get("duration_secs").and_then(|v| v.as_f64()).unwrap_or(6.0);
        let source = file.absolute(resolver.root());
        let temp_path = ctx.workspace_dir().join("preview.webm");

        let total_steps = 3u64;
        ctx.report(0, total_steps, Some("sampling clip".into()));

        let args = vec![
            "-y".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-t".into(),
            duration.to_string(),
            "-an".into(),
            "-vf".into(),
            "scale=320:-2".into(),
            "-c:v".into(),
            "libvpx-vp9".into(),
            temp_path.to_string_lossy().into_owned(),
        ];

        subprocess::run_checked("ffmpeg", &args, &ctx.cancel_token(), ctx.timeout()).await?;
        ctx.report(2, total_steps, Some("encoded".into()));

        let final_path = &self.plan(resolver, file)[0];
        ctx.publish(&temp_path, final_path)
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;
        ctx.report(total_steps, total_steps, Some("published".into()));

        Ok(json!({ "sidecar": final_path }))
    }
}
