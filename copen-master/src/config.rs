use std::{path::Path, time::Duration};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

/// Error returned when loading a master configuration
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// The file could not be read
    #[snafu(display("IO error loading {path}: {source:?}"))]
    Io {
        /// The path which failed to load
        path: String,
        /// The underlying error
        source: std::io::Error,
    },
    /// The content is not a valid configuration
    #[snafu(display("Error parsing TOML: {source}"))]
    TomlDeserialization {
        /// The underlying error
        source: toml::de::Error,
    },
}

/// Runtime configuration of a [`Master`](crate::Master)
///
/// Every field may be omitted from a TOML file, in which case the default is used.
///
/// ```toml
/// max_workers = 2
/// job_queue_size = 40
///
/// [defaults]
/// sdo_timeout_ms = 100
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct MasterConfig {
    /// The number of buses which may have a session at the same time
    pub max_workers: usize,
    /// Capacity of each worker's job queue
    pub job_queue_size: usize,
    /// Capacity of each async client's completion queue
    pub client_queue_size: usize,
    /// Capacity of the queue between the frame router and the dispatch thread
    pub rx_queue_size: usize,
    /// Pause between a failed try and the next one, in milliseconds
    pub retry_delay_ms: u64,
    /// Default timeouts and retry counts for jobs built by a client
    pub defaults: JobDefaults,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            job_queue_size: 20,
            client_queue_size: 20,
            rx_queue_size: 100,
            retry_delay_ms: 10,
            defaults: JobDefaults::default(),
        }
    }
}

impl MasterConfig {
    /// Read a configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<MasterConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(IoSnafu {
            path: path.to_string_lossy(),
        })?;
        Self::load_from_str(&content)
    }

    /// Read a configuration from a string
    pub fn load_from_str(s: &str) -> Result<MasterConfig, ConfigError> {
        toml::from_str(s).context(TomlDeserializationSnafu)
    }

    /// The pause between tries
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Default response timeouts and try counts per job kind
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct JobDefaults {
    /// Time to wait for the heartbeat confirming an NMT command
    pub nmt_timeout_ms: u64,
    /// Number of times an NMT command is sent before giving up
    pub nmt_max_tries: u8,
    /// Time to wait for a heartbeat
    pub heartbeat_timeout_ms: u64,
    /// Number of heartbeat periods to wait
    pub heartbeat_max_tries: u8,
    /// Time to wait for each SDO response
    pub sdo_timeout_ms: u64,
    /// Number of times each SDO request is sent before giving up
    pub sdo_max_tries: u8,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            nmt_timeout_ms: 1000,
            nmt_max_tries: 3,
            heartbeat_timeout_ms: 1000,
            heartbeat_max_tries: 1,
            sdo_timeout_ms: 50,
            sdo_max_tries: 3,
        }
    }
}

impl JobDefaults {
    /// NMT response timeout
    pub fn nmt_timeout(&self) -> Duration {
        Duration::from_millis(self.nmt_timeout_ms)
    }

    /// Heartbeat wait timeout
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// SDO response timeout
    pub fn sdo_timeout(&self) -> Duration {
        Duration::from_millis(self.sdo_timeout_ms)
    }
}
