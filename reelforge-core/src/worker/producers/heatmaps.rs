use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Computes per-second motion/brightness statistics and renders them as a
/// strip image alongside the raw JSON series.
pub struct HeatmapsWorker;

#[async_trait]
impl ArtifactWorker for HeatmapsWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Heatmaps
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
        let temp_data = ctx.workspace_dir().join("heatmaps.json");
        let temp_strip = ctx.workspace_dir().join("heatmaps.png");

        let stats_log = ctx.workspace_dir().join("signalstats.log");
        let args = vec![
            "-y".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-vf".into(),
            format!(
                "signalstats,metadata=print:file={}",
                stats_log.to_string_lossy()
            ),
            "-f".into(),
            "null".into(),
            "-".into(),
        ];

        subprocess::run_checked("ffmpeg", &args, &ctx.cancel_token(), ctx.timeout()).await?;
        ctx.report(1, 3, Some("signalstats collected".into()));

        let samples = std::fs::read_to_string(&stats_log).unwrap_or_default();
        let series: Vec<f64> = samples
            .lines()
            .filter_map(|l| l.split('=').nth(1)?.trim().parse().ok())
            .collect();
        let sample_count = series.len();
        std::fs::write(
            &temp_data,
            serde_json::to_vec_pretty(&json!({ "brightness": series })).unwrap_or_default(),
        )
        .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;
        ctx.report(2, 3, Some("series written".into()));

        let strip_args = vec![
            "-y".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-vf".into(),
            "fps=1,scale=1:64,tile=600x1".into(),
            "-frames:v".into(),
            "1".into(),
            temp_strip.to_string_lossy().into_owned(),
        ];
        subprocess::run_checked("ffmpeg", &strip_args, &ctx.cancel_token(), ctx.timeout()).await?;
        ctx.report(3, 3, Some("strip rendered".into()));

        let plan = self.plan(resolver, file);
        ctx.publish(&temp_data, &plan[0])
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;
        ctx.publish(&temp_strip, &plan[1])
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        Ok(json!({ "sidecars": plan, "samples": sample_count }))
    }
}
