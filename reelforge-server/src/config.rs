//! Layered configuration: defaults -> optional `reelforge.toml` ->
//! `REELFORGE_`-prefixed environment variables -> CLI flags. Mirrors the
//! teacher's config-loading order (`dotenvy` before `Args::parse()`, file
//! before env, env before explicit flags).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config as ConfigSource, Environment, File};
use reelforge_core::artifact::ToolClass;
use reelforge_core::config::RuntimeConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct FileSettings {
    media_root: Option<PathBuf>,
    bind_addr: Option<String>,
    state_dir: Option<PathBuf>,
    global_max_concurrency: Option<usize>,
    ffmpeg_concurrency: Option<usize>,
    ffprobe_concurrency: Option<usize>,
    subtitle_concurrency: Option<usize>,
    face_concurrency: Option<usize>,
    ffmpeg_timeout_secs: Option<u64>,
    ffprobe_timeout_secs: Option<u64>,
    status_cache_ttl_secs: Option<u64>,
    staleness_tolerance_secs: Option<u64>,
    orphan_confidence_floor: Option<f64>,
    event_bus_queue_depth: Option<usize>,
    shutdown_grace_secs: Option<u64>,
    cancel_grace_secs: Option<u64>,
    job_store_horizon_days: Option<i64>,
}

/// CLI surface. Every flag has a matching environment variable so the
/// container/systemd-unit path never has to pass arguments.
#[derive(Debug, Parser)]
#[command(name = "reelforge-server", about = "Media artifact generation and job orchestration server")]
pub struct Args {
    /// Root directory containing the media library to index.
    #[arg(long, env = "REELFORGE_MEDIA_ROOT")]
    pub media_root: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "REELFORGE_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Directory holding the job store snapshot and scheduler config.
    #[arg(long, env = "REELFORGE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Global concurrent-job cap (1-128).
    #[arg(long, env = "REELFORGE_GLOBAL_MAX_CONCURRENCY")]
    pub global_max_concurrency: Option<usize>,

    /// Path to an alternate config file (defaults to `./reelforge.toml`).
    #[arg(long, env = "REELFORGE_CONFIG")]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub media_root: PathBuf,
    pub bind_addr: SocketAddr,
    pub state_dir: PathBuf,
    pub job_store_horizon: chrono::Duration,
    pub runtime: RuntimeConfig,
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let args = Args::parse();

        let mut builder = ConfigSource::builder();
        let config_file = args.config_path.clone().unwrap_or_else(|| PathBuf::from("reelforge.toml"));
        builder = builder.add_source(File::from(config_file).required(false));
        builder = builder.add_source(Environment::with_prefix("REELFORGE").separator("__"));
        let file: FileSettings = builder.build()?.try_deserialize().unwrap_or_default();

        let media_root = args
            .media_root
            .or(file.media_root)
            .unwrap_or_else(|| PathBuf::from("."));

        let bind_addr_str = args
            .bind_addr
            .or(file.bind_addr)
            .unwrap_or_else(|| "0.0.0.0:4000".to_string());
        let bind_addr: SocketAddr = bind_addr_str
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address '{bind_addr_str}': {e}"))?;

        let state_dir = args
            .state_dir
            .or(file.state_dir)
            .unwrap_or_else(|| PathBuf::from("./.reelforge-state"));

        let mut runtime = RuntimeConfig::default();
        if let Some(n) = args.global_max_concurrency.or(file.global_max_concurrency) {
            runtime.global_max_concurrency = n.clamp(
                RuntimeConfig::MIN_GLOBAL_CONCURRENCY,
                RuntimeConfig::MAX_GLOBAL_CONCURRENCY,
            );
        }
        if let Some(n) = file.ffmpeg_concurrency {
            runtime.set_tool_cap(ToolClass::Ffmpeg, n);
        }
        if let Some(n) = file.ffprobe_concurrency {
            runtime.set_tool_cap(ToolClass::Ffprobe, n);
        }
        if let Some(n) = file.subtitle_concurrency {
            runtime.set_tool_cap(ToolClass::SubtitleBackend, n);
        }
        if let Some(n) = file.face_concurrency {
            runtime.set_tool_cap(ToolClass::FaceBackend, n);
        }
        if let Some(secs) = file.ffmpeg_timeout_secs {
            runtime.ffmpeg_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.ffprobe_timeout_secs {
            runtime.ffprobe_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.status_cache_ttl_secs {
            runtime.status_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = file.staleness_tolerance_secs {
            runtime.staleness_tolerance = Duration::from_secs(secs);
        }
        if let Some(floor) = file.orphan_confidence_floor {
            runtime.orphan_confidence_floor = floor;
        }
        if let Some(depth) = file.event_bus_queue_depth {
            runtime.event_bus_queue_depth = depth;
        }
        if let Some(secs) = file.shutdown_grace_secs {
            runtime.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = file.cancel_grace_secs {
            runtime.cancel_grace = Duration::from_secs(secs);
        }

        let job_store_horizon = chrono::Duration::days(file.job_store_horizon_days.unwrap_or(7));

        Ok(Self { media_root, bind_addr, state_dir, job_store_horizon, runtime })
    }

    pub fn job_store_path(&self) -> PathBuf {
        self.state_dir.join("jobs.json")
    }
}
