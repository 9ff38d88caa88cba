//! Runtime tuning knobs shared by the Scheduler, Status Cache, and workers.
//!
//! Separated from the HTTP-facing configuration layer (env/file/CLI
//! loading lives in the server crate) so the core crate stays usable as a
//! library with sane defaults on its own.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifact::ToolClass;

/// Concurrency and resource-limit defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Global cap on simultaneously running jobs, across all tool classes.
    pub global_max_concurrency: usize,
    /// Per-tool-class concurrency caps; absent entries fall back to
    /// [`default_tool_cap`].
    pub tool_caps: HashMap<ToolClass, usize>,
    pub ffmpeg_timeout: Duration,
    pub ffprobe_timeout: Duration,
    pub status_cache_ttl: Duration,
    pub staleness_tolerance: Duration,
    pub orphan_confidence_floor: f64,
    pub event_bus_queue_depth: usize,
    pub shutdown_grace: Duration,
    pub cancel_grace: Duration,
}

fn default_tool_cap(class: ToolClass) -> usize {
    match class {
        ToolClass::Ffmpeg => 4,
        ToolClass::Ffprobe => 4,
        ToolClass::SubtitleBackend => 1,
        ToolClass::FaceBackend => 1,
        ToolClass::Pure => 4,
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            global_max_concurrency: 4,
            tool_caps: ToolClass::ALL.iter().map(|c| (*c, default_tool_cap(*c))).collect(),
            ffmpeg_timeout: Duration::from_secs(600),
            ffprobe_timeout: Duration::from_secs(60),
            status_cache_ttl: Duration::from_secs(30),
            staleness_tolerance: Duration::from_secs(2),
            orphan_confidence_floor: 0.60,
            event_bus_queue_depth: 256,
            shutdown_grace: Duration::from_secs(15),
            cancel_grace: Duration::from_secs(10),
        }
    }
}

impl RuntimeConfig {
    /// Bounds applied when a client sets the global concurrency cap at
    /// runtime.
    pub const MIN_GLOBAL_CONCURRENCY: usize = 1;
    pub const MAX_GLOBAL_CONCURRENCY: usize = 128;

    pub fn tool_cap(&self, class: ToolClass) -> usize {
        self.tool_caps.get(&class).copied().unwrap_or_else(|| default_tool_cap(class))
    }

    pub fn set_tool_cap(&mut self, class: ToolClass, cap: usize) {
        self.tool_caps.insert(class, cap.max(1));
    }

    pub fn set_global_max_concurrency(&mut self, n: usize) -> crate::error::Result<()> {
        if !(Self::MIN_GLOBAL_CONCURRENCY..=Self::MAX_GLOBAL_CONCURRENCY).contains(&n) {
            return Err(crate::error::CoreError::invalid_input(format!(
                "global concurrency must be between {} and {}",
                Self::MIN_GLOBAL_CONCURRENCY,
                Self::MAX_GLOBAL_CONCURRENCY
            )));
        }
        self.global_max_concurrency = n;
        Ok(())
    }

    pub fn timeout_for(&self, class: ToolClass) -> Option<Duration> {
        match class {
            ToolClass::Ffmpeg => Some(self.ffmpeg_timeout),
            ToolClass::Ffprobe => Some(self.ffprobe_timeout),
            ToolClass::SubtitleBackend | ToolClass::FaceBackend | ToolClass::Pure => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tool_caps_are_populated_for_every_class() {
        let cfg = RuntimeConfig::default();
        for class in ToolClass::ALL {
            assert!(cfg.tool_cap(class) >= 1);
        }
    }

    #[test]
    fn global_concurrency_rejects_out_of_range() {
        let mut cfg = RuntimeConfig::default();
        assert!(cfg.set_global_max_concurrency(0).is_err());
        assert!(cfg.set_global_max_concurrency(129).is_err());
        assert!(cfg.set_global_max_concurrency(8).is_ok());
        assert_eq!(cfg.global_max_concurrency, 8);
    }
}
