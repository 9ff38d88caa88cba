use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Runs a pluggable face-detection backend over sampled frames, writing
/// bounding boxes + per-face crop references to the faces sidecar.
pub struct FacesWorker;

fn backend_command(params: &Value) -> String {
    params
        .get("backend_command")
        .and_then(|v| v.as_str())
        .unwrap_or("reelforge-face-detect")
        .to_string()
}

#[async_trait]
impl ArtifactWorker for FacesWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Faces
    }

    fn validate(&self, params: &Value) -> Result<Value, WorkerError> {
        let sample_interval_secs = params.get("sample_interval_secs").and_then(|v| v.as_f64()).unwrap_or(5.0);
        if sample_interval_secs <= 0.0 {
            return Err(WorkerError::new("invalid-input", "sample_interval_secs must be > 0"));
        }
        Ok(json!({
            "backend_command": backend_command(params),
            "sample_interval_secs": sample_interval_secs,
        }))
    }

    async fn run(
        &self,
        ctx: &WorkerContext,
        resolver: &Resolver,
        file: &MediaFile,
        params: &Value,
    ) -> WorkerOutcome {
        let command = backend_command(params);
        let interval = params.get("sample_interval_secs").and_then(|v| v.as_f64()).unwrap_or(5.0);
        let source = file.absolute(resolver.root());
        let temp_path = ctx.workspace_dir().join("faces.json");

        let args = vec![
            source.to_string_lossy().into_owned(),
            "--sample-interval".into(),
            interval.to_string(),
            "--output".into(),
            temp_path.to_string_lossy().into_owned(),
        ];

        subprocess::run_checked(&command, &args, &ctx.cancel_token(), ctx.timeout()).await?;
        ctx.report(1, 1, Some("faces detected".into()));

        let final_path = &self.plan(resolver, file)[0];
        ctx.publish(&temp_path, final_path)
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        Ok(json!({ "sidecar": final_path }))
    }
}
