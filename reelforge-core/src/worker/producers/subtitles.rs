use async_trait::async_trait;
use serde_json::{json, Value};

use crate::artifact::ArtifactKind;
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{subprocess, ArtifactWorker, WorkerContext, WorkerError, WorkerOutcome};

/// Transcribes speech to an SRT sidecar via a pluggable external backend
/// (e.g. a local whisper.cpp build). Which binary to invoke is a deployment
/// choice, not something this subsystem hardcodes — it is read from
/// `params.backend_command`, defaulting to `whisper`.
pub struct SubtitlesWorker;

fn backend_command(params: &Value) -> String {
    params
        .get("backend_command")
        .and_then(|v| v.as_str())
        .unwrap_or("whisper")
        .to_string()
}

#[async_trait]
impl ArtifactWorker for SubtitlesWorker {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Subtitles
    }

    fn validate(&self, params: &Value) -> Result<Value, WorkerError> {
        let language = params.get("language").and_then(|v| v.as_str()).unwrap_or("auto");
        Ok(json!({
            "backend_command": backend_command(params),
            "language": language,
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
        let language = params.get("language").and_then(|v| v.as_str()).unwrap_or("auto");
        let source = file.absolute(resolver.root());
        let temp_path = ctx.workspace_dir().join("subtitles.srt");

        let args = vec![
            source.to_string_lossy().into_owned(),
            "--language".into(),
            language.into(),
            "--output-format".into(),
            "srt".into(),
            "--output".into(),
            temp_path.to_string_lossy().into_owned(),
        ];

        subprocess::run_checked(&command, &args, &ctx.cancel_token(), ctx.timeout()).await?;
        ctx.report(1, 1, Some("transcribed".into()));

        let final_path = &self.plan(resolver, file)[0];
        ctx.publish(&temp_path, final_path)
            .map_err(|e| WorkerError::new("worker-runtime", e.to_string()))?;

        Ok(json!({ "sidecar": final_path, "language": language }))
    }
}
