// src/config.rs
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ValidationError};

/// Default name of the API entry point inside the project root.
pub const DEFAULT_API: &str = "api.raml";

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "previewcast.toml";

/// Prefix of the environment variables merged into the configuration.
pub const ENV_PREFIX: &str = "PREVIEWCAST_";

/// Command-line arguments for the application.
#[derive(Parser, Debug, Default)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// API project folder to watch (defaults to the current directory)
    #[clap(help = "API project folder to watch (defaults to the current directory)")]
    pub project_root: Option<PathBuf>,

    /// API entry point relative to the project root
    #[clap(
        short,
        long,
        value_parser,
        help = "API entry point relative to the project root (default: api.raml)"
    )]
    pub api: Option<String>,

    /// Fixed port for the WebSocket server
    #[clap(
        short,
        long,
        value_parser,
        help = "Fixed port for the WebSocket server (default: first free port in 49152-65535)"
    )]
    pub port: Option<u16>,

    /// Bind address for the WebSocket server
    #[clap(
        long,
        value_parser,
        help = "Bind address for the WebSocket server (default: 127.0.0.1)"
    )]
    pub host: Option<String>,

    /// Print debug output
    #[clap(short, long, help = "Print debug output")]
    pub verbose: bool,

    /// Path to a configuration file (e.g., previewcast.toml)
    #[clap(
        short,
        long,
        value_parser,
        help = "Path to a configuration file (e.g., previewcast.toml)"
    )]
    pub config: Option<PathBuf>,

    /// External program turning the entry point into JSON on stdout
    #[clap(
        short,
        long,
        value_parser,
        help = "External program turning the entry point into JSON on stdout"
    )]
    pub transformer: Option<String>,

    /// Extra argument for the transformer, placed before the entry point path
    #[clap(
        long = "transformer-arg",
        value_parser,
        allow_hyphen_values = true,
        help = "Extra argument for the transformer (repeatable)"
    )]
    pub transformer_args: Vec<String>,
}

impl CliArgs {
    /// Options given on the command line, highest precedence layer.
    fn overrides(&self) -> RawOptions {
        RawOptions {
            api: self.api.clone(),
            port: self.port,
            host: self.host.clone(),
            project_root: self
                .project_root
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            verbose: self.verbose.then_some(true),
        }
    }
}

/// Options as they appear in the config file, environment or CLI.
///
/// Unknown keys are rejected at deserialization time.
#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RawOptions {
    /// API entry point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// Fixed port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Bind address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Project folder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,
    /// Verbose output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

/// Primitive type expected for a recognized option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKind {
    String,
    Integer,
    Boolean,
}

impl OptionKind {
    fn of_key(key: &str) -> Option<Self> {
        match key {
            "api" | "host" | "projectRoot" => Some(OptionKind::String),
            "port" => Some(OptionKind::Integer),
            "verbose" => Some(OptionKind::Boolean),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            OptionKind::String => "string",
            OptionKind::Integer => "integer",
            OptionKind::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            OptionKind::String => value.is_string(),
            OptionKind::Integer => value.is_i64() || value.is_u64(),
            OptionKind::Boolean => value.is_boolean(),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Checks user options against the recognized keys and their types.
///
/// Returns every problem found; an empty list means the options are valid.
pub fn validate(options: &Map<String, Value>) -> Vec<ValidationError> {
    let mut unknown = Vec::new();
    let mut errors = Vec::new();

    for (key, value) in options {
        let Some(kind) = OptionKind::of_key(key) else {
            unknown.push(key.clone());
            continue;
        };
        if !kind.matches(value) {
            errors.push(ValidationError::InvalidType {
                property: key.clone(),
                expected: kind.name(),
                given: value_kind(value),
            });
            continue;
        }
        if let ("port", Value::Number(port)) = (key.as_str(), value) {
            let in_range = port
                .as_u64()
                .is_some_and(|port| (1..=u64::from(u16::MAX)).contains(&port));
            if !in_range {
                errors.push(ValidationError::PortOutOfRange(port.clone()));
            }
        }
    }

    if !unknown.is_empty() {
        errors.insert(0, ValidationError::UnknownOptions(unknown));
    }
    errors
}

/// Final, validated run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOptions {
    /// API entry point relative to `project_root`. Empty disables generation.
    pub api: String,
    /// Fixed port; `None` scans the dynamic port range.
    pub port: Option<u16>,
    /// Bind address; `None` means loopback.
    pub host: Option<String>,
    /// Absolute path of the watched project folder.
    pub project_root: PathBuf,
    /// Debug level logging.
    pub verbose: bool,
}

impl ProviderOptions {
    /// Loads options by merging the config file, environment and CLI.
    ///
    /// The merged key set is validated as a whole, so an unknown key in any
    /// layer rejects the configuration.
    pub fn load(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let config_file_path = cli_args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let fig = Figment::new()
            .merge(Toml::file(config_file_path))
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| env_key(key.as_str()).into())
                    .lowercase(false),
            )
            .merge(Serialized::globals(cli_args.overrides()));

        let merged: Map<String, Value> = fig.extract()?;
        Self::from_map(merged)
    }

    /// Builds options from a JSON object, e.g. `{"api": "api.raml", "port": 8080}`.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::Null => Self::from_map(Map::new()),
            other => Err(ConfigError::Invalid(vec![ValidationError::InvalidType {
                property: "options".to_string(),
                expected: "object",
                given: value_kind(&other),
            }])),
        }
    }

    /// Validates a flat option map and fills in defaults.
    pub fn from_map(options: Map<String, Value>) -> Result<Self, ConfigError> {
        let errors = validate(&options);
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        let raw: RawOptions = serde_json::from_value(Value::Object(options))
            .map_err(|e| ConfigError::Invalid(vec![ValidationError::Malformed(e.to_string())]))?;
        Self::from_raw(raw)
    }

    /// Options for `project_root` with every other field at its default.
    pub fn for_project(project_root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_raw(RawOptions {
            project_root: Some(project_root.as_ref().to_string_lossy().into_owned()),
            ..Default::default()
        })
    }

    fn from_raw(raw: RawOptions) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::ProjectRoot)?;
        let project_root = match raw.project_root {
            Some(root) if Path::new(&root).is_absolute() => PathBuf::from(root),
            // Relative roots are resolved once, the watcher needs an absolute path.
            Some(root) => cwd.join(root),
            None => cwd,
        };

        Ok(ProviderOptions {
            api: raw.api.unwrap_or_else(|| DEFAULT_API.to_string()),
            port: raw.port,
            host: raw.host,
            project_root,
            verbose: raw.verbose.unwrap_or(false),
        })
    }

    /// Absolute location of the API entry point, `None` when `api` is empty.
    pub fn source_path(&self) -> Option<PathBuf> {
        if self.api.is_empty() {
            None
        } else {
            Some(self.project_root.join(&self.api))
        }
    }

    /// Default tracing filter directive for these options.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

/// Maps an environment key (prefix stripped) to its option name.
///
/// Keys are lowercased here; figment's own lowercasing is turned off so the
/// camelCase `projectRoot` survives.
fn env_key(key: &str) -> String {
    match key.to_ascii_lowercase().as_str() {
        "project_root" | "projectroot" => "projectRoot".to_string(),
        other => other.to_string(),
    }
}
