//! Hierarchical configuration: CLI arguments > `formbridge.toml` > defaults.
//!
//! Configuration is resolved once at startup into an immutable [`Config`];
//! nothing later in the run consults the environment or the working
//! directory. Each value tracks the layer it came from for `--verbose`
//! diagnostics.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "formbridge.toml";
pub const CONFIG_PATH_ENV: &str = "FORMBRIDGE_CONFIG";

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_TASKS_DIR: &str = ".claude/tasks";
pub const DEFAULT_AGENT_BINARY: &str = "claude";
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Unreadable { path: Utf8PathBuf, reason: String },

    #[error("invalid config file {path}: {reason}")]
    InvalidFile { path: Utf8PathBuf, reason: String },

    #[error("{CONFIG_PATH_ENV} points at {path}, which does not exist")]
    EnvPathMissing { path: Utf8PathBuf },
}

/// Which layer supplied a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    File,
    Default,
}

impl ConfigSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::File => "config",
            Self::Default => "default",
        }
    }
}

/// `[defaults]` section of `formbridge.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileDefaults {
    pub output_dir: Option<Utf8PathBuf>,
    pub tasks_dir: Option<Utf8PathBuf>,
    pub stage_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
}

/// `[agent]` section: how the external agent CLI is invoked. The settings
/// and MCP config files are passed through to the agent unexamined.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileAgent {
    pub binary: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub settings_file: Option<Utf8PathBuf>,
    pub mcp_config: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub defaults: FileDefaults,
    #[serde(default)]
    pub agent: FileAgent,
}

/// Values supplied on the command line, overriding everything else.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_dir: Option<Utf8PathBuf>,
    pub tasks_dir: Option<Utf8PathBuf>,
    pub agent_binary: Option<String>,
    pub stage_timeout_secs: Option<u64>,
    pub verbose: bool,
}

/// Agent invocation settings, fully resolved.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub binary: String,
    pub model: Option<String>,
    pub extra_args: Vec<String>,
    pub settings_file: Option<Utf8PathBuf>,
    pub mcp_config: Option<Utf8PathBuf>,
}

/// Resolved, immutable configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub output_root: Utf8PathBuf,
    pub tasks_dir: Utf8PathBuf,
    pub stage_timeout: Duration,
    pub verbose: bool,
    pub agent: AgentConfig,
    /// Layer that supplied each top-level setting, keyed by setting name.
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    /// Resolve configuration with CLI-like discovery: `$FORMBRIDGE_CONFIG`
    /// if set, otherwise `formbridge.toml` searched upward from the current
    /// directory, otherwise built-in defaults.
    pub fn discover(overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let file = match find_config_file()? {
            Some(path) => load_file(&path)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(&file, overrides))
    }

    /// Merge the layers with CLI > file > default precedence.
    #[must_use]
    pub fn resolve(file: &FileConfig, overrides: &CliOverrides) -> Self {
        let mut sources = HashMap::new();
        let mut pick = |name: &str, cli: Option<ConfigSource>, from_file: bool| {
            let source = cli.unwrap_or(if from_file {
                ConfigSource::File
            } else {
                ConfigSource::Default
            });
            sources.insert(name.to_string(), source);
            source
        };

        let output_root = match (&overrides.output_dir, &file.defaults.output_dir) {
            (Some(cli), _) => {
                pick("output_dir", Some(ConfigSource::Cli), false);
                cli.clone()
            }
            (None, Some(f)) => {
                pick("output_dir", None, true);
                f.clone()
            }
            (None, None) => {
                pick("output_dir", None, false);
                Utf8PathBuf::from(DEFAULT_OUTPUT_DIR)
            }
        };

        let tasks_dir = match (&overrides.tasks_dir, &file.defaults.tasks_dir) {
            (Some(cli), _) => {
                pick("tasks_dir", Some(ConfigSource::Cli), false);
                cli.clone()
            }
            (None, Some(f)) => {
                pick("tasks_dir", None, true);
                f.clone()
            }
            (None, None) => {
                pick("tasks_dir", None, false);
                Utf8PathBuf::from(DEFAULT_TASKS_DIR)
            }
        };

        let stage_timeout_secs = match (
            overrides.stage_timeout_secs,
            file.defaults.stage_timeout_secs,
        ) {
            (Some(cli), _) => {
                pick("stage_timeout_secs", Some(ConfigSource::Cli), false);
                cli
            }
            (None, Some(f)) => {
                pick("stage_timeout_secs", None, true);
                f
            }
            (None, None) => {
                pick("stage_timeout_secs", None, false);
                DEFAULT_STAGE_TIMEOUT_SECS
            }
        };

        let agent_binary = match (&overrides.agent_binary, &file.agent.binary) {
            (Some(cli), _) => {
                pick("agent_binary", Some(ConfigSource::Cli), false);
                cli.clone()
            }
            (None, Some(f)) => {
                pick("agent_binary", None, true);
                f.clone()
            }
            (None, None) => {
                pick("agent_binary", None, false);
                DEFAULT_AGENT_BINARY.to_string()
            }
        };

        let verbose = overrides.verbose || file.defaults.verbose.unwrap_or(false);

        Self {
            output_root,
            tasks_dir,
            stage_timeout: Duration::from_secs(stage_timeout_secs),
            verbose,
            agent: AgentConfig {
                binary: agent_binary,
                model: file.agent.model.clone(),
                extra_args: file.agent.args.clone(),
                settings_file: file.agent.settings_file.clone(),
                mcp_config: file.agent.mcp_config.clone(),
            },
            source_attribution: sources,
        }
    }
}

/// Parse one TOML config file.
pub fn load_file(path: &Utf8Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|e| ConfigError::Unreadable {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::InvalidFile {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// Locate the config file: explicit env override first, then an upward
/// search from the current directory. `Ok(None)` means "use defaults".
fn find_config_file() -> Result<Option<Utf8PathBuf>, ConfigError> {
    if let Ok(explicit) = env::var(CONFIG_PATH_ENV) {
        let path = Utf8PathBuf::from(explicit);
        if !path.as_std_path().is_file() {
            return Err(ConfigError::EnvPathMissing { path });
        }
        return Ok(Some(path));
    }

    let Ok(cwd) = env::current_dir() else {
        return Ok(None);
    };
    let Some(mut dir) = Utf8PathBuf::from_path_buf(cwd).ok() else {
        return Ok(None);
    };
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.as_std_path().is_file() {
            return Ok(Some(candidate));
        }
        if !dir.pop() {
            return Ok(None);
        }
    }
}
