//! Loading and validating the dump directory and destination rules.
//!
//! Configuration is read from YAML by default, or from TOML when the file
//! name ends in `.toml`. Both formats share one schema:
//!
//! ```yaml
//! dump_directory: ~/Downloads
//! debounce_seconds: 5
//! destinations:
//!   - path: ~/archive
//!     prefix: report_
//!   - path: ~/csv
//!     suffix: .csv
//! ```
//!
//! Destinations are matched top to bottom and the first match wins. A leading
//! `~` in any path is expanded to the home directory.

use crate::rules::DestinationRule;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Name of the configuration file looked up in the home directory.
pub const DEFAULT_CONFIG_FILE: &str = ".prefix.yaml";

/// Quiet period used when the configuration does not set one.
pub const DEFAULT_DEBOUNCE_SECONDS: u64 = 5;

const TEMPLATE: &str = r#"# dumpsort configuration
#
# dump_directory is watched for new files. Each file is moved to the first
# destination whose prefix and/or suffix matches its name.
dump_directory: ""
debounce_seconds: 5
destinations: []
#  - path: ~/Documents/reports
#    prefix: report_
#  - path: ~/Documents/csv
#    suffix: .csv
"#;

/// Errors that can occur while loading configuration. All of them are fatal
/// at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(
        "created a new configuration file at {}; \
         add the dump directory and destinations, then restart",
        .0.display()
    )]
    Created(PathBuf),

    #[error("could not determine the home directory")]
    NoHomeDirectory,

    #[error("IO error on configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Validated configuration: one dump directory and an ordered rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub dump_directory: PathBuf,

    /// Quiet period, in seconds, before a pass runs after the last change.
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,

    #[serde(default)]
    pub destinations: Vec<DestinationRule>,
}

fn default_debounce_seconds() -> u64 {
    DEFAULT_DEBOUNCE_SECONDS
}

impl Config {
    /// Path of the configuration file in the user's home directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_CONFIG_FILE))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    /// Loads configuration from `config_path`, or from `~/.prefix.yaml` when
    /// no path is given.
    ///
    /// If the default file does not exist a commented template is written in
    /// its place and [`ConfigError::Created`] is returned.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if an explicit path does not exist,
    /// `ConfigError::Parse` on malformed content and `ConfigError::Invalid`
    /// when validation fails.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let path = Self::default_path()?;
        if !path.exists() {
            fs::write(&path, TEMPLATE).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            info!(path = %path.display(), "wrote configuration template");
            return Err(ConfigError::Created(path));
        }

        Self::load_from_file(&path)
    }

    /// Loads, expands and validates a specific configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            toml::from_str::<Self>(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str::<Self>(&content).map_err(|e| e.to_string())
        };
        let config = parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        let config = config.expand_home(dirs::home_dir().as_deref());
        config.validate()?;

        for (index, rule) in config.inert_rules() {
            warn!(
                rule = index,
                path = %rule.path.display(),
                "destination has neither prefix nor suffix and will never match"
            );
        }

        Ok(config)
    }

    /// Checks the invariants a watch run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dump_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "dump_directory must be set".to_string(),
            ));
        }
        if self.debounce_seconds == 0 {
            return Err(ConfigError::Invalid(
                "debounce_seconds must be greater than zero".to_string(),
            ));
        }
        if let Some(index) = self
            .destinations
            .iter()
            .position(|rule| rule.path.as_os_str().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "destination #{} has an empty path",
                index + 1
            )));
        }
        Ok(())
    }

    /// Destinations that can never match, with their position in the list.
    pub fn inert_rules(&self) -> impl Iterator<Item = (usize, &DestinationRule)> {
        self.destinations
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.is_inert())
    }

    /// Quiet period before an organize pass runs.
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_secs(self.debounce_seconds)
    }

    /// Replaces a leading `~` in every configured path with `home`.
    pub fn expand_home(mut self, home: Option<&Path>) -> Self {
        if let Some(home) = home {
            self.dump_directory = expand_tilde(&self.dump_directory, home);
            for rule in &mut self.destinations {
                rule.path = expand_tilde(&rule.path, home);
            }
        }
        self
    }
}

fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
