use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Detects scene-cut timestamps via ffmpeg's scene-change filter and writes
/// them as the canonical markers sidecar, kept separate from the metadata
/// sidecar so either can be regenerated independently.
pub struct MarkersWorker;

#[async_trait]
impl ArtifactWorker for MarkersWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Markers
    }

    fn validate(&self, params: &Value) -> Result<Value, WorkerError> {
        let threshold = params.get("threshold").and_then(|v| v.as_f64()).unwrap_or(0.4);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(WorkerError::new("invalid-input", "threshold must be in 0.0..=1.0"));
        }
        Ok(json!({ "threshold": threshold }))
    }

    async fn run(
        &self,
        ctx: &WorkerContext,
        resolver: &Resolver,
        file: &MediaFile,
        params: &Value,
    ) -> WorkerOutcome {
        let threshold = params.get("threshold").and_then(|v| v.as_f64()).unwrap_or(0.4);
        let source = file.absolute(resolver.root());
        let log_path = ctx.workspace_dir().join("scenes.log");

        let args = vec![
            "-y".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-vf".into(),
            format!("select='gt(scene,{threshold})',metadata=print:file={}", log_path.to_string_lossy()),
            "-f".into(),
            "null".into(),
            "-".into(),
        ];

        subprocess::run_checked("ffmpeg", &args, &ctx.cancel_token(), ctx.timeout()).await?;

        let log = std::fs::read_to_string(&log_path).unwrap_or_default();
        let timestamps: Vec<f64> = log
            .lines()
            .filter(|l| l.contains("pts_time"))
            .filter_map(|l| l.split("pts_time:").nth(1)?.split_whitespace().next()?.parse().ok())
            .collect();
        ctx.report(1, 1, Some(format!("{} scenes", timestamps.len())));

        let temp_path = ctx.workspace_dir().join("markers.json");
        std::fs::write(
            &temp_path,
            serde_json::to_vec_pretty(&json!({ "threshold": threshold, "timestamps_secs": timestamps }))
                .unwrap_or_default(),
        )
        .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        let final_path = &self.plan(resolver, file)[0];
        ctx.publish(&temp_path, final_path)
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        Ok(json!({ "sidecar": final_path }))
    }
}
