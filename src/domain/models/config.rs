use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::metrics::DEFAULT_SAMPLE_WINDOW;
use super::task::DEFAULT_TASK_TIMEOUT_SECS;

/// Main configuration structure for convoy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Message bus behavior
    #[serde(default)]
    pub bus: BusConfig,

    /// Performance monitor sampling and thresholds
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Orchestrator background loop and waiting
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".convoy/convoy.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// `sqlx` connection URL for the configured path.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Message bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BusConfig {
    /// Lease length for consumed tasks. Unset keeps at-most-once delivery:
    /// a consumed task is never handed out again, even by a later process
    /// opening the same store.
    #[serde(default)]
    pub visibility_timeout_secs: Option<u64>,

    /// Execution timeout given to tasks submitted without one
    #[serde(default = "default_task_timeout_secs")]
    pub default_task_timeout_secs: u64,
}

const fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: None,
            default_task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

impl BusConfig {
    pub fn visibility_timeout(&self) -> Option<Duration> {
        self.visibility_timeout_secs.map(Duration::from_secs)
    }
}

/// A queue-based bottleneck tier: fires when depth and average wait both exceed the limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueThreshold {
    pub min_queue_depth: usize,
    pub min_avg_wait_secs: f64,
}

impl QueueThreshold {
    pub const fn new(min_queue_depth: usize, min_avg_wait_secs: f64) -> Self {
        Self {
            min_queue_depth,
            min_avg_wait_secs,
        }
    }

    /// Strictly-greater comparison on both axes.
    pub fn matches(&self, depth: usize, avg_wait_secs: f64) -> bool {
        depth > self.min_queue_depth && avg_wait_secs > self.min_avg_wait_secs
    }
}

/// Bottleneck thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BottleneckThresholds {
    /// Disabled unless configured
    #[serde(default)]
    pub critical: Option<QueueThreshold>,

    #[serde(default = "default_high_threshold")]
    pub high: QueueThreshold,

    #[serde(default = "default_medium_threshold")]
    pub medium: QueueThreshold,

    /// LOW fires when p95 response time exceeds this many seconds
    #[serde(default = "default_low_p95_secs")]
    pub low_p95_response_secs: f64,
}

const fn default_high_threshold() -> QueueThreshold {
    QueueThreshold::new(5, 300.0)
}

const fn default_medium_threshold() -> QueueThreshold {
    QueueThreshold::new(3, 180.0)
}

const fn default_low_p95_secs() -> f64 {
    600.0
}

impl Default for BottleneckThresholds {
    fn default() -> Self {
        Self {
            critical: None,
            high: default_high_threshold(),
            medium: default_medium_threshold(),
            low_p95_response_secs: default_low_p95_secs(),
        }
    }
}

/// Performance monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Number of response-time and queue-wait samples retained per agent type
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,

    /// Duration estimate for agent types with no completed tasks
    #[serde(default = "default_estimate_secs")]
    pub default_estimate_secs: f64,

    #[serde(default)]
    pub thresholds: BottleneckThresholds,
}

const fn default_sample_window() -> usize {
    DEFAULT_SAMPLE_WINDOW
}

const fn default_estimate_secs() -> f64 {
    60.0
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_window: default_sample_window(),
            default_estimate_secs: default_estimate_secs(),
            thresholds: BottleneckThresholds::default(),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Interval between background bottleneck scans
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Poll interval used by `wait_for_task`
    #[serde(default = "default_wait_poll_interval_ms")]
    pub wait_poll_interval_ms: u64,
}

const fn default_scan_interval_secs() -> u64 {
    30
}

const fn default_wait_poll_interval_ms() -> u64 {
    250
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            wait_poll_interval_ms: default_wait_poll_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }
}
