use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Builds a tiled sprite sheet (for scrub-bar previews) plus its frame index.
pub struct SpritesWorker;

#[async_trait]
impl ArtifactWorker for SpritesWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Sprites
    }

    fn validate(&self, params: &Value) -> Result<Value, WorkerError> {
        let interval_secs = params.get("interval_secs").and_then(|v| v.as_f64()).unwrap_or(10.0);
        if interval_secs <= 0.0 {
            return Err(WorkerError::new("invalid-input", "interval_secs must be > 0"));
        }
        Ok(json!({ "interval_secs": interval_secs }))
    }

    async fn run(
        &self,
        ctx: &WorkerContext,
        resolver: &Resolver,
        file: &MediaFile,
        params: &Value,
    ) -> WorkerOutcome {
        let interval = params.get("interval_secs").and_then(|v| v.as_f64()).unwrap_or(10.0);
        let source = file.absolute(resolver.root());
        let temp_sheet = ctx.workspace_dir().join("sprites.jpg");
        let temp_index = ctx.workspace_dir().join("sprites.json");

        let args = vec![
            "-y".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-vf".into(),
            format!("fps=1/{interval},scale=160:-1,tile=10x10"),
            "-frames:v".into(),
            "1".into(),
            temp_sheet.to_string_lossy().into_owned(),
        ];

        subprocess::run_checked("ffmpeg", &args, &ctx.cancel_token(), ctx.timeout()).await?;
        ctx.report(1, 2, Some("sheet built".into()));

        let index = json!({
            "interval_secs": interval,
            "tile_cols": 10,
            "tile_rows": 10,
            "tile_width": 160,
        });
        std::fs::write(&temp_index, serde_json::to_vec_pretty(&index).unwrap_or_default())
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;
        ctx.report(2, 2, Some("index written".into()));

        let plan = self.plan(resolver, file);
        ctx.publish(&temp_sheet, &plan[0])
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;
        ctx.publish(&temp_index, &plan[1])
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        Ok(json!({ "sidecars": plan }))
    }
}
