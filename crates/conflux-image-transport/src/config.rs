//! Configuration passed through to the underlying transport and to the
//! synchronized pair subscription.

use eyre::{Result, WrapErr, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

use crate::raw::RAW_TRANSPORT;

/// Default number of messages kept per channel by the pair synchronizer.
pub const DEFAULT_QUEUE_SIZE: usize = 10;

/// Quality-of-service profile. Opaque to this crate: it is handed verbatim
/// to the execution context when channels are opened.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QosProfile {
    #[serde(default)]
    pub reliability: Reliability,

    #[serde(default)]
    pub durability: Durability,

    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    #[serde(default, with = "humantime_serde")]
    pub deadline: Option<Duration>,
}

impl Default for QosProfile {
    fn default() -> Self {
        Self {
            reliability: Reliability::Reliable,
            durability: Durability::Volatile,
            history_depth: default_history_depth(),
            deadline: None,
        }
    }
}

impl QosProfile {
    /// Best-effort profile for high-rate sensor streams.
    pub fn sensor_data() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            history_depth: 5,
            deadline: None,
        }
    }

    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

fn default_history_depth() -> usize {
    10
}

/// QoS reliability setting.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    #[default]
    Reliable,
    BestEffort,
}

/// QoS durability setting.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    #[default]
    Volatile,
    TransientLocal,
}

/// Additional publisher/subscriber options, passed through untouched.
pub type ChannelOptions = IndexMap<String, String>;

/// Parameters of the synchronized pair subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// The maximum number of messages kept for each channel.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Two stamps closer than this may form a pair.
    #[serde(default = "default_tolerance", with = "humantime_serde")]
    pub tolerance: Duration,

    /// Period of the synchronization health check.
    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            tolerance: default_tolerance(),
            check_interval: default_check_interval(),
        }
    }
}

impl SyncConfig {
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.queue_size > 0, "sync.queue_size must be greater than zero");
        ensure!(
            !self.check_interval.is_zero(),
            "sync.check_interval must be greater than zero"
        );
        Ok(())
    }
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_tolerance() -> Duration {
    Duration::from_millis(10)
}

fn default_check_interval() -> Duration {
    Duration::from_secs(1)
}

/// Root configuration of a camera stream.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base image topic, resolved under the node's namespace.
    pub image_topic: String,

    /// Transport used for the image channel.
    #[serde(default = "default_transport")]
    pub transport: String,

    #[serde(default)]
    pub qos: QosProfile,

    #[serde(default)]
    pub sync: SyncConfig,

    /// Extra options forwarded to the underlying channels.
    #[serde(default)]
    pub options: ChannelOptions,
}

fn default_transport() -> String {
    RAW_TRANSPORT.to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .wrap_err_with(|| format!("Failed to load config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(contents).wrap_err("Failed to parse camera configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.image_topic.is_empty(), "image_topic cannot be empty");
        ensure!(
            !self.image_topic.ends_with('/'),
            "image_topic must not end with '/'"
        );
        ensure!(!self.transport.is_empty(), "transport cannot be empty");
        ensure!(
            !self.transport.contains('/'),
            "transport '{}' must be a single name segment",
            self.transport
        );
        ensure!(
            self.qos.history_depth > 0,
            "qos.history_depth must be greater than zero"
        );
        self.sync.validate()
    }
}
