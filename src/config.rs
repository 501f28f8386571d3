//! Configuration for the federation layer.
//!
//! The configuration file is YAML and follows the layout of a Prometheus
//! configuration: a `global` section with the external labels, a list of
//! `remote_read` endpoints, plus options for the local storage and the
//! admin server.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::model::Label;

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "tsdb-federation")]
#[command(about = "Local TSDB with remote read federation")]
pub struct CliArgs {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "FEDERATION_CONFIG_FILE")]
    pub config: Option<String>,

    /// Port for the admin HTTP server, overrides `admin.port`
    #[arg(short, long, env = "FEDERATION_ADMIN_PORT")]
    pub port: Option<u16>,
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FederationConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub storage: StorageOptions,
    #[serde(default)]
    pub remote_read: Vec<RemoteReadConfig>,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Process wide settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// Labels identifying this process to remote backends.
    #[serde(default)]
    pub external_labels: ExternalLabels,
}

/// Options of the local storage engine.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StorageOptions {
    /// The interval at which the write ahead log is flushed to disk.
    #[serde(
        default = "default_wal_flush_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub wal_flush_interval: Duration,

    /// The timestamp range of head blocks after which they get persisted.
    /// Samples older than half of it behind the newest sample are rejected.
    #[serde(
        default = "default_min_block_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub min_block_duration: Duration,

    /// The maximum timestamp range of compacted blocks.
    #[serde(
        default = "default_max_block_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub max_block_duration: Duration,

    /// How long to retain data. Zero disables retention.
    #[serde(default = "default_retention", deserialize_with = "deserialize_duration")]
    pub retention: Duration,

    /// Disable creation and consideration of a lock file.
    #[serde(default)]
    pub no_lockfile: bool,
}

fn default_wal_flush_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_min_block_duration() -> Duration {
    Duration::from_secs(2 * 3600)
}

fn default_max_block_duration() -> Duration {
    Duration::from_secs(36 * 3600)
}

fn default_retention() -> Duration {
    Duration::from_secs(15 * 86400)
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            wal_flush_interval: default_wal_flush_interval(),
            min_block_duration: default_min_block_duration(),
            max_block_duration: default_max_block_duration(),
            retention: default_retention(),
            no_lockfile: false,
        }
    }
}

/// A remote read endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteReadConfig {
    pub url: String,

    /// Timeout for a single read request.
    #[serde(
        default = "default_remote_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub remote_timeout: Duration,

    /// Whether to also query the remote for ranges the local storage covers.
    #[serde(default)]
    pub read_recent: bool,
}

fn default_remote_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Admin HTTP server settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AdminConfig {
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

fn default_admin_port() -> u16 {
    9091
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            port: default_admin_port(),
        }
    }
}

/// Labels that identify this process to the outside world.
///
/// They are not stored with the samples. Remote backends are assumed to
/// hold them, so queries against a remote inject matchers for them and strip
/// them from the results. Immutable once constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>")]
pub struct ExternalLabels(BTreeMap<String, String>);

impl ExternalLabels {
    /// Creates a validated external label set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an invalid label name or an
    /// empty value.
    pub fn new(labels: BTreeMap<String, String>) -> Result<Self> {
        for (name, value) in &labels {
            if !is_valid_label_name(name) {
                return Err(Error::Configuration(format!(
                    "invalid external label name {:?}",
                    name
                )));
            }
            if value.is_empty() {
                return Err(Error::Configuration(format!(
                    "external label {:?} has an empty value",
                    name
                )));
            }
        }
        Ok(Self(labels))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the labels in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }

    pub fn to_labels(&self) -> Vec<Label> {
        self.iter().map(|(k, v)| Label::new(k, v)).collect()
    }

    pub(crate) fn remove(&mut self, name: &str) {
        self.0.remove(name);
    }
}

impl TryFrom<BTreeMap<String, String>> for ExternalLabels {
    type Error = Error;

    fn try_from(labels: BTreeMap<String, String>) -> Result<Self> {
        Self::new(labels)
    }
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Load the configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FederationConfig> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::Configuration(format!("Failed to read config file: {}", e)))?;
    parse_config(&contents)
}

/// Parse the configuration from a YAML string.
pub fn parse_config(contents: &str) -> Result<FederationConfig> {
    serde_yaml::from_str(contents)
        .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Parse a Prometheus-style duration string (e.g., "15s", "1m", "2h", "15d").
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Configuration("Empty duration string".to_string()));
    }

    // Find where the numeric part ends
    let num_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());

    if num_end == 0 {
        return Err(Error::Configuration(
            "Duration must start with a number".to_string(),
        ));
    }

    let value: f64 = s[..num_end]
        .parse()
        .map_err(|_| Error::Configuration(format!("Invalid duration number: {}", s)))?;
    let unit = &s[num_end..];

    let multiplier = match unit {
        "ms" => 0.001,
        "s" | "" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        "d" => 86400.0,
        "w" => 7.0 * 86400.0,
        "y" => 365.0 * 86400.0,
        _ => {
            return Err(Error::Configuration(format!(
                "Unknown duration unit: {}",
                unit
            )));
        }
    };

    Duration::try_from_secs_f64(value * multiplier)
        .map_err(|e| Error::Configuration(format!("Duration out of range: {}: {}", s, e)))
}
