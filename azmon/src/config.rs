//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.
use std::{
    collections::BTreeMap,
    env, fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use tracing::debug;

/// Environment variable whose contents, when set, replace the configuration
/// file.
pub const CONFIG_ENV: &str = "AZMON_CONFIG";

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// The poll interval is zero.
    #[error("interval_seconds must be greater than zero")]
    ZeroInterval,
    /// An `inputs` entry is not a map with exactly one key.
    #[error("Input entry {0} must be a map with exactly one key, the input name")]
    MalformedInput(usize),
}

fn default_interval_seconds() -> u64 {
    60
}

/// Main configuration struct for this program
///
/// Built from YAML through [`FromStr`] or [`Config::load`].
#[derive(Debug, PartialEq)]
pub struct Config {
    /// Time between two polls of the same input.
    pub interval: Duration,
    /// The method by which to express self-telemetry, if any.
    pub telemetry: Option<Telemetry>,
    /// Where samples are written.
    pub output: Output,
    inputs: Vec<InputConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_interval_seconds")]
    interval_seconds: u64,
    telemetry: Option<Telemetry>,
    #[serde(default)]
    output: Output,
    #[serde(default)]
    inputs: Vec<serde_yaml::Value>,
}

/// Defines the manner of self-telemetry.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum Telemetry {
    /// In prometheus mode azmon will emit its internal telemetry for
    /// scraping at a prometheus poll endpoint.
    Prometheus {
        /// Address and port for prometheus exporter
        addr: SocketAddr,
        /// Additional labels to include in every metric
        #[serde(default)]
        global_labels: BTreeMap<String, String>,
    },
}

/// Defines where samples end up.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    /// One JSON document per sample.
    Jsonl {
        /// File samples are appended to. Standard output when absent.
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Republish float fields as gauges through the self-telemetry exporter.
    Gauges {},
}

impl Default for Output {
    fn default() -> Self {
        Self::Jsonl { path: None }
    }
}

/// One configured input: its registered name and its options.
#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    /// Name the input is registered under.
    pub name: String,
    /// Options handed to the input's factory.
    pub options: serde_yaml::Value,
}

impl TryFrom<RawConfig> for Config {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        if raw.interval_seconds == 0 {
            return Err(Error::ZeroInterval);
        }

        let inputs = raw
            .inputs
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| match entry {
                serde_yaml::Value::Mapping(map) if map.len() == 1 => map
                    .into_iter()
                    .next()
                    .and_then(|(name, options)| {
                        name.as_str().map(|name| InputConfig {
                            name: name.to_string(),
                            options,
                        })
                    })
                    .ok_or(Error::MalformedInput(idx)),
                _ => Err(Error::MalformedInput(idx)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            interval: Duration::from_secs(raw.interval_seconds),
            telemetry: raw.telemetry,
            output: raw.output,
            inputs,
        })
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let raw: RawConfig = serde_yaml::from_str(contents)?;
        Config::try_from(raw)
    }
}

impl Config {
    /// Load the configuration at `path`
    ///
    /// If [`CONFIG_ENV`] is set its contents are used instead and `path` is
    /// not read.
    ///
    /// # Errors
    ///
    /// Function will return an error if the file cannot be read or its
    /// contents are not a valid configuration.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = if let Ok(contents) = env::var(CONFIG_ENV) {
            debug!("Using config from env var '{CONFIG_ENV}'");
            contents
        } else {
            debug!("Attempting to open configuration file at: {}", path.display());
            fs::read_to_string(path).map_err(|source| Error::ReadFile {
                path: path.to_path_buf(),
                source: Box::new(source),
            })?
        };
        contents.parse()
    }

    /// The configured inputs, in configuration order.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &serde_yaml::Value)> {
        self.inputs
            .iter()
            .map(|input| (input.name.as_str(), &input.options))
    }
}
