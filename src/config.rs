//! Configuration management for warden.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_CHILD_EXECUTABLE, DEFAULT_DESCRIPTION,
    DEFAULT_DISPLAY_NAME, DEFAULT_SERVICE_NAME,
};
use crate::error::ConfigError;

/// Represents the structure of `warden.yaml`.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// OS service registration details.
    pub service: ServiceConfig,
    /// The supervised child.
    pub child: ChildConfig,
    /// Logger configuration.
    pub logging: LoggingConfig,
}

/// How the supervisor registers itself with the OS service manager.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    /// Unit/label name.
    pub name: String,
    /// Human readable name.
    pub display_name: String,
    /// One-line description.
    pub description: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

/// The child executable kept alive by the supervisor.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChildConfig {
    /// Executable path; relative paths resolve against the root directory.
    pub executable: String,
    /// Whether stdout/stderr are piped into the logger or discarded.
    pub capture_output: bool,
}

impl Default for ChildConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_CHILD_EXECUTABLE.to_string(),
            capture_output: true,
        }
    }
}

impl ChildConfig {
    /// Resolves the executable against `root` when it is not absolute.
    pub fn executable_path(&self, root: &Path) -> PathBuf {
        let path = Path::new(&self.executable);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

/// Logger settings.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level name or `EnvFilter` directive.
    pub level: Option<String>,
    /// Optional log file; relative paths resolve against the root directory.
    pub file: Option<String>,
    /// Whether to emit ANSI colours. Ignored when writing to a file.
    pub ansi: bool,
}

impl LoggingConfig {
    /// Resolves the log file against `root` when it is not absolute.
    pub fn file_path(&self, root: &Path) -> Option<PathBuf> {
        self.file.as_ref().map(|f| {
            let path = Path::new(f);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            }
        })
    }
}

/// Expands `$VAR` and `${VAR}` references from the process environment.
///
/// Whole-line YAML comments are left untouched. A reference after a value on the same
/// line (`key: x # $VAR`) is still expanded.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?")
        .expect("env var pattern is valid");

    let mut expanded = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            expanded.push_str(line);
            continue;
        }

        if let Some(missing) = re
            .captures_iter(line)
            .map(|caps| caps[1].to_string())
            .find(|name| env::var(name).is_err())
        {
            return Err(ConfigError::MissingEnvVar(missing));
        }

        let replaced = re.replace_all(line, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        });
        expanded.push_str(&replaced);
    }
    Ok(expanded)
}

/// Path of the configuration file for a given root directory.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Loads `warden.yaml` from the root directory.
pub fn load_config(root: &Path) -> Result<Config, ConfigError> {
    load_config_from(&config_path(root))
}

/// Loads and parses a configuration file, expanding environment variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let expanded = expand_env_vars(&content)?;

    // An empty document deserialises to `None`; treat it as all defaults.
    let config: Option<Config> = serde_yaml::from_str(&expanded)?;
    Ok(config.unwrap_or_default())
}
