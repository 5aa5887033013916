use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    export::RenderOptions,
    link::{DEFAULT_BASE_LINK, StaticLinkHost},
    time::DEFAULT_STEPS_PER_BEAT,
};

pub const CONFIG_FILE_NAME: &str = "beatlink.config.toml";
pub const CONFIG_PATH_ENV: &str = "BEATLINK_CONFIG_PATH";
pub const DEFAULT_LOG_FILTER: &str = "info,beatlink_core=trace";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub transport: TransportConfig,
    pub samples: SamplesConfig,
    pub render: RenderConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub base_link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub steps_per_beat: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplesConfig {
    pub directory: PathBuf,
    pub preload_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub sample_rate: u32,
    pub loops: u32,
    pub tail_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub logs_dir: PathBuf,
    pub console: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_link: DEFAULT_BASE_LINK.to_string(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            steps_per_beat: DEFAULT_STEPS_PER_BEAT,
        }
    }
}

impl Default for SamplesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            preload_timeout_ms: 5_000,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            loops: 1,
            tail_seconds: 1.0,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: "beatlink".to_string(),
            logs_dir: PathBuf::from("logs"),
            console: true,
        }
    }
}

impl AppConfig {
    pub fn load_or_default() -> Result<Self> {
        match discover_config_path()? {
            Some(path) => Self::from_path(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    #[must_use]
    pub fn link_host(&self) -> StaticLinkHost {
        StaticLinkHost::new(self.link.base_link.clone())
    }

    #[must_use]
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            loops: self.render.loops,
            steps_per_beat: self.transport.steps_per_beat,
            tail_seconds: self.render.tail_seconds,
            preload_timeout: Duration::from_millis(self.samples.preload_timeout_ms),
        }
    }
}

fn discover_config_path() -> Result<Option<PathBuf>> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];
    Ok(candidates.into_iter().find(|path| path.is_file()))
}
