//! Run configuration: a TOML file merged with command-line overrides.
//!
//! The builder only ever sees the merged [`RunOptions`]; command-line values
//! always take precedence over the file.

use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_LOG_LEVEL};
use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What to do when two definitions produce the same image name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep the later definition and log a warning
    #[default]
    Warn,
    /// Fail indexing
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreSection {
    pub push: Option<bool>,
    pub downstream: Option<bool>,
    pub fail_fast: Option<bool>,
    pub abort_on_pull_failure: Option<bool>,
    pub duplicates: Option<DuplicatePolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub json: Option<bool>,
}

/// Contents of `dockbuild.toml`.
///
/// ```toml
/// directories = ["images"]
/// registries = ["registry.example.com"]
///
/// [core]
/// push = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub directories: Vec<PathBuf>,
    pub registries: Vec<String>,
    pub images: Vec<String>,
    pub exclude: Vec<String>,
    pub core: CoreSection,
    pub logging: LoggingSection,
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the config file. An explicitly named file must exist; without
    /// one, `dockbuild.toml` in the working directory is used if present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) if !path.is_file() => {
                return Err(BuildError::Configuration(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    tracing::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let config = Self::parse(&fs::read_to_string(&path)?)?;
        tracing::debug!(path = %path.display(), config = ?config, "Parsed config file");
        Ok(config)
    }
}

/// Values given on the command line. `None` / empty means "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub directories: Vec<PathBuf>,
    pub registries: Vec<String>,
    pub images: Vec<String>,
    pub exclude: Vec<String>,
    pub push: Option<bool>,
    pub downstream: Option<bool>,
    pub fail_fast: Option<bool>,
    pub abort_on_pull_failure: Option<bool>,
    pub strict_duplicates: Option<bool>,
    pub log_level: Option<String>,
    pub json_logs: Option<bool>,
}

/// Fully merged options for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOptions {
    pub directories: Vec<PathBuf>,
    pub registries: Vec<String>,
    /// Images to build; empty means every indexed image
    pub images: Vec<String>,
    pub exclude: Vec<String>,
    pub push: bool,
    pub downstream: bool,
    /// Abort the run on the first failed build or push
    pub fail_fast: bool,
    pub abort_on_pull_failure: bool,
    pub duplicates: DuplicatePolicy,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            registries: Vec::new(),
            images: Vec::new(),
            exclude: Vec::new(),
            push: false,
            downstream: false,
            fail_fast: false,
            abort_on_pull_failure: false,
            duplicates: DuplicatePolicy::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

fn pick<T>(cli: Vec<T>, file: Vec<T>) -> Vec<T> {
    if cli.is_empty() {
        file
    } else {
        cli
    }
}

impl RunOptions {
    pub fn merge(file: FileConfig, cli: CliOverrides) -> Self {
        let defaults = Self::default();
        let duplicates = match cli.strict_duplicates {
            Some(true) => DuplicatePolicy::Error,
            Some(false) => DuplicatePolicy::Warn,
            None => file.core.duplicates.unwrap_or(defaults.duplicates),
        };

        let options = Self {
            directories: pick(cli.directories, file.directories),
            registries: pick(cli.registries, file.registries),
            images: pick(cli.images, file.images),
            exclude: pick(cli.exclude, file.exclude),
            push: cli.push.or(file.core.push).unwrap_or(defaults.push),
            downstream: cli
                .downstream
                .or(file.core.downstream)
                .unwrap_or(defaults.downstream),
            fail_fast: cli
                .fail_fast
                .or(file.core.fail_fast)
                .unwrap_or(defaults.fail_fast),
            abort_on_pull_failure: cli
                .abort_on_pull_failure
                .or(file.core.abort_on_pull_failure)
                .unwrap_or(defaults.abort_on_pull_failure),
            duplicates,
            log_level: cli
                .log_level
                .or(file.logging.level)
                .unwrap_or(defaults.log_level),
            json_logs: cli
                .json_logs
                .or(file.logging.json)
                .unwrap_or(defaults.json_logs),
        };

        tracing::debug!(options = ?options, "Merged run options");
        options
    }

    /// Checks the options before anything is indexed or built.
    pub fn validate(&self) -> Result<()> {
        if self.directories.is_empty() {
            return Err(BuildError::Configuration(
                "no scan directories configured".to_string(),
            ));
        }
        if self.push && self.registries.is_empty() {
            return Err(BuildError::Configuration(
                "push is enabled but no registries are configured".to_string(),
            ));
        }
        if self.downstream && self.images.is_empty() {
            tracing::warn!("Downstream mode has no effect without selected images");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
directories = ["images", "vendor-images"]
registries = ["registry.example.com"]

[core]
push = true
duplicates = "error"

[logging]
level = "debug"
"#;

    #[test]
    fn test_parse_file_config() {
        let config = FileConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.directories.len(), 2);
        assert_eq!(config.core.push, Some(true));
        assert_eq!(config.core.duplicates, Some(DuplicatePolicy::Error));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert!(config.images.is_empty());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(matches!(
            FileConfig::parse("[core]\npsuh = true\n"),
            Err(BuildError::Toml(_))
        ));
    }

    #[test]
    fn test_cli_takes_precedence() {
        let file = FileConfig::parse(SAMPLE).unwrap();
        let cli = CliOverrides {
            directories: vec![PathBuf::from("other")],
            push: Some(false),
            strict_duplicates: Some(false),
            log_level: Some("warn".to_string()),
            ..Default::default()
        };
        let options = RunOptions::merge(file, cli);
        assert_eq!(options.directories, vec![PathBuf::from("other")]);
        assert_eq!(options.registries, vec!["registry.example.com".to_string()]);
        assert!(!options.push);
        assert_eq!(options.duplicates, DuplicatePolicy::Warn);
        assert_eq!(options.log_level, "warn");
    }

    #[test]
    fn test_file_values_used_when_cli_is_silent() {
        let options = RunOptions::merge(FileConfig::parse(SAMPLE).unwrap(), CliOverrides::default());
        assert!(options.push);
        assert_eq!(options.duplicates, DuplicatePolicy::Error);
        assert!(!options.fail_fast);
    }

    #[test]
    fn test_push_without_registries_is_invalid() {
        let options = RunOptions {
            directories: vec![PathBuf::from("images")],
            push: true,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(BuildError::Configuration(_))));
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let result = FileConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(BuildError::Configuration(_))));
    }
}
