//! Orchestrator configuration.
//!
//! Sources in increasing precedence: built-in defaults, an optional YAML file,
//! `LISTENER_*` environment variables, CLI flags.

use crate::event_store::file_store::default_log_path;
use crate::orchestration::SchedulerConfig;
use crate::stream::ReconnectPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8765";
pub const DEFAULT_INITIATOR_SUFFIX: &str =
    " IMPORTANT! Save any output to the .output directory.";

/// How stream events are read from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    #[default]
    Sse,
    Poll,
}

impl FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sse" => Ok(Self::Sse),
            "poll" => Ok(Self::Poll),
            other => Err(format!("expected 'sse' or 'poll', got '{}'", other)),
        }
    }
}

/// Where agent lifecycle events are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Routed into the local aggregates.
    #[default]
    Local,
    /// Posted to the event API.
    Api,
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "api" => Ok(Self::Api),
            other => Err(format!("expected 'local' or 'api', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    pub api_url: String,
    pub poll_interval_secs: f64,
    /// Retries of a failed event emission against the API.
    pub max_retries: u32,
    pub handler_timeout_secs: u64,
    pub work_queue_check_interval_secs: f64,
    pub verbosity: u8,
    pub claude_binary: String,
    pub shutdown_timeout_secs: u64,
    pub project_root: PathBuf,
    pub max_concurrent: usize,
    pub initiator_timeout_secs: u64,
    pub skip_permissions: bool,
    pub dedup_capacity: usize,
    pub reconnect_base_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub circuit_breaker_threshold: u32,
    pub stream_mode: StreamMode,
    pub lifecycle_sink: SinkKind,
    /// Route every streamed event into the local aggregates.
    pub project_stream_events: bool,
    pub event_log_path: Option<PathBuf>,
    /// Audit log directory; no audit log when unset.
    pub log_dir: Option<PathBuf>,
    pub initiator_prompt_suffix: String,
    pub placeholder_delay_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval_secs: 2.0,
            max_retries: 3,
            handler_timeout_secs: 300,
            work_queue_check_interval_secs: 2.0,
            verbosity: 0,
            claude_binary: "claude".to_string(),
            shutdown_timeout_secs: 30,
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_concurrent: 2,
            initiator_timeout_secs: 36_000,
            skip_permissions: true,
            dedup_capacity: 10_000,
            reconnect_base_delay_secs: 5,
            reconnect_max_delay_secs: 60,
            circuit_breaker_threshold: 10,
            stream_mode: StreamMode::Sse,
            lifecycle_sink: SinkKind::Local,
            project_stream_events: true,
            event_log_path: None,
            log_dir: None,
            initiator_prompt_suffix: DEFAULT_INITIATOR_SUFFIX.to_string(),
            placeholder_delay_ms: 1000,
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub project_root: Option<PathBuf>,
    /// `-v` count; zero keeps the configured verbosity.
    pub verbosity: u8,
}

impl OrchestratorConfig {
    /// Builds the effective configuration from every source and validates it.
    pub fn load(config_file: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))
    }

    /// Applies `LISTENER_*` variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let env = EnvReader { lookup };
        env.string("LISTENER_API_URL", &mut self.api_url);
        env.parse("LISTENER_POLL_INTERVAL", &mut self.poll_interval_secs)?;
        env.parse("LISTENER_MAX_RETRIES", &mut self.max_retries)?;
        env.parse("LISTENER_HANDLER_TIMEOUT", &mut self.handler_timeout_secs)?;
        env.parse(
            "LISTENER_WORK_QUEUE_INTERVAL",
            &mut self.work_queue_check_interval_secs,
        )?;
        env.parse("LISTENER_VERBOSITY", &mut self.verbosity)?;
        env.string("LISTENER_CLAUDE_BINARY", &mut self.claude_binary);
        env.parse("LISTENER_SHUTDOWN_TIMEOUT", &mut self.shutdown_timeout_secs)?;
        env.parse("LISTENER_PROJECT_ROOT", &mut self.project_root)?;
        env.parse("LISTENER_MAX_CONCURRENT", &mut self.max_concurrent)?;
        env.parse("LISTENER_INITIATOR_TIMEOUT", &mut self.initiator_timeout_secs)?;
        env.flag("LISTENER_SKIP_PERMISSIONS", &mut self.skip_permissions)?;
        env.parse("LISTENER_DEDUP_CAPACITY", &mut self.dedup_capacity)?;
        env.parse(
            "LISTENER_RECONNECT_BASE_DELAY",
            &mut self.reconnect_base_delay_secs,
        )?;
        env.parse(
            "LISTENER_RECONNECT_MAX_DELAY",
            &mut self.reconnect_max_delay_secs,
        )?;
        env.parse(
            "LISTENER_CIRCUIT_BREAKER_THRESHOLD",
            &mut self.circuit_breaker_threshold,
        )?;
        env.parse("LISTENER_STREAM_MODE", &mut self.stream_mode)?;
        env.parse("LISTENER_LIFECYCLE_SINK", &mut self.lifecycle_sink)?;
        env.flag("LISTENER_PROJECT_EVENTS", &mut self.project_stream_events)?;
        env.optional_path("LISTENER_EVENT_LOG", &mut self.event_log_path);
        env.optional_path("LISTENER_LOG_DIR", &mut self.log_dir);
        if let Some(suffix) = (env.lookup)("LISTENER_INITIATOR_SUFFIX") {
            self.initiator_prompt_suffix = suffix;
        }
        env.parse(
            "LISTENER_PLACEHOLDER_DELAY_MS",
            &mut self.placeholder_delay_ms,
        )?;
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(api_url) = &cli.api_url {
            self.api_url = api_url.clone();
        }
        if let Some(project_root) = &cli.project_root {
            self.project_root = project_root.clone();
        }
        if cli.verbosity > 0 {
            self.verbosity = cli.verbosity;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            anyhow::bail!("api_url must not be empty");
        }
        if self.max_concurrent == 0 {
            anyhow::bail!("max_concurrent must be at least 1");
        }
        if self.dedup_capacity == 0 {
            anyhow::bail!("dedup_capacity must be at least 1");
        }
        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            (
                "work_queue_check_interval_secs",
                self.work_queue_check_interval_secs,
            ),
        ] {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("{} must be a positive number of seconds, got {}", name, value);
            }
        }
        for (name, value) in [
            ("handler_timeout_secs", self.handler_timeout_secs),
            ("initiator_timeout_secs", self.initiator_timeout_secs),
            ("reconnect_base_delay_secs", self.reconnect_base_delay_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be positive", name);
            }
        }
        if self.reconnect_max_delay_secs < self.reconnect_base_delay_secs {
            anyhow::bail!(
                "reconnect_max_delay_secs ({}) must not be below reconnect_base_delay_secs ({})",
                self.reconnect_max_delay_secs,
                self.reconnect_base_delay_secs
            );
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn initiator_timeout(&self) -> Duration {
        Duration::from_secs(self.initiator_timeout_secs)
    }

    pub fn placeholder_delay(&self) -> Duration {
        Duration::from_millis(self.placeholder_delay_ms)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs_f64(self.work_queue_check_interval_secs),
            max_concurrent: self.max_concurrent,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_secs(self.reconnect_base_delay_secs),
            max_delay: Duration::from_secs(self.reconnect_max_delay_secs),
            circuit_breaker_threshold: self.circuit_breaker_threshold,
        }
    }

    /// Configured event log, or `~/.event-orchestrator/events.jsonl`.
    pub fn event_log_path(&self) -> Result<PathBuf> {
        match &self.event_log_path {
            Some(path) => Ok(path.clone()),
            None => default_log_path().context("Could not determine home directory"),
        }
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    /// Non-blank value of `name`.
    fn value(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, name: &str, target: &mut String) {
        if let Some(value) = self.value(name) {
            *target = value;
        }
    }

    fn optional_path(&self, name: &str, target: &mut Option<PathBuf>) {
        if let Some(value) = self.value(name) {
            *target = Some(PathBuf::from(value));
        }
    }

    fn parse<T>(&self, name: &str, target: &mut T) -> Result<()>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some(value) = self.value(name) {
            *target = value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", value, name, e))?;
        }
        Ok(())
    }

    fn flag(&self, name: &str, target: &mut bool) -> Result<()> {
        if let Some(value) = self.value(name) {
            *target = parse_flag(&value)
                .with_context(|| format!("Invalid value '{}' for {}", value, name))?;
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
