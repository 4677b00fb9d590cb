use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::constants::{
    CONFIG_FILE, DEFAULT_BASE_PACKAGE, DEFAULT_PYTHON, DEFAULT_REQUIREMENTS, DEFAULT_VENV_FOLDER,
    KEY_BASE_PACKAGE, KEY_LOOK_UP, KEY_PIP_ARGS, KEY_PYTHON, KEY_REQUIREMENTS, KEY_VENV_FOLDER,
};
use crate::runtime::{Environment, Profile};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable '{var}' not found (referenced by config key '{key}')")]
    MissingEnvironmentVariable { key: String, var: String },
    #[error("failed to read config file: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML config: {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("config key '{key}' expects one of true/false, got '{value}'")]
    InvalidBool { key: String, value: String },
    #[error("config key '{key}' must be a string, boolean or number")]
    UnsupportedValue { key: String },
    #[error("config key '{key}' is not a valid argument list")]
    InvalidArgs {
        key: String,
        #[source]
        source: shell_words::ParseError,
    },
}

/// On-disk shape of `buildenv.toml`: one table of scalars per profile.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    local: HashMap<String, toml::Value>,
    #[serde(default)]
    ci: HashMap<String, toml::Value>,
}

impl ConfigFile {
    fn table(&self, profile: Profile) -> &HashMap<String, toml::Value> {
        match profile {
            Profile::Local => &self.local,
            Profile::Ci => &self.ci,
        }
    }
}

/// Profile-aware configuration for one invocation.
///
/// The file is read on the first lookup and never again; a missing file
/// behaves like an empty one.
#[derive(Debug)]
pub struct Config {
    path: PathBuf,
    env: Environment,
    file: OnceCell<Option<ConfigFile>>,
}

impl Config {
    pub fn new(project: &Path, env: Environment) -> Self {
        Self::from_path(project.join(CONFIG_FILE), env)
    }

    pub fn from_path(path: PathBuf, env: Environment) -> Self {
        Self {
            path,
            env,
            file: OnceCell::new(),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    fn file(&self) -> Result<Option<&ConfigFile>, ConfigError> {
        let file = self.file.get_or_try_init(|| {
            if !self.path.is_file() {
                debug!("no config file at {}", self.path.display());
                return Ok(None);
            }
            let text = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
                path: self.path.clone(),
                source,
            })?;
            let parsed = toml::from_str::<ConfigFile>(&text).map_err(|source| {
                ConfigError::Parse {
                    path: self.path.clone(),
                    source,
                }
            })?;
            debug!("loaded config file {}", self.path.display());
            Ok(Some(parsed))
        })?;
        Ok(file.as_ref())
    }

    /// Resolves `key` through the active profiles, falling back to `default`.
    ///
    /// # Errors
    /// Fails when the found value references an unset `${VAR}`, or when an
    /// existing config file cannot be read or parsed.
    pub fn resolve(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        let found = match self.file()? {
            Some(file) => self
                .env
                .profiles()
                .iter()
                .find_map(|profile| file.table(*profile).get(key)),
            None => None,
        };

        match found {
            Some(value) => interpolate(key, &scalar_text(key, value)?, &self.env),
            None => Ok(default.to_string()),
        }
    }

    pub fn resolve_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let value = self.resolve(key, if default { "true" } else { "false" })?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn resolve_args(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        let value = self.resolve(key, "")?;
        shell_words::split(&value).map_err(|source| ConfigError::InvalidArgs {
            key: key.to_string(),
            source,
        })
    }

    pub fn venv_folder(&self) -> Result<String, ConfigError> {
        self.resolve(KEY_VENV_FOLDER, DEFAULT_VENV_FOLDER)
    }

    pub fn requirements_pattern(&self) -> Result<String, ConfigError> {
        self.resolve(KEY_REQUIREMENTS, DEFAULT_REQUIREMENTS)
    }

    pub fn pip_args(&self) -> Result<Vec<String>, ConfigError> {
        self.resolve_args(KEY_PIP_ARGS)
    }

    pub fn look_up(&self) -> Result<bool, ConfigError> {
        self.resolve_bool(KEY_LOOK_UP, true)
    }

    pub fn python(&self) -> Result<String, ConfigError> {
        self.resolve(KEY_PYTHON, DEFAULT_PYTHON)
    }

    pub fn base_package(&self) -> Result<String, ConfigError> {
        self.resolve(KEY_BASE_PACKAGE, DEFAULT_BASE_PACKAGE)
    }
}

/// Textual form of a scalar value; arrays and tables are rejected.
fn scalar_text(key: &str, value: &toml::Value) -> Result<String, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => Err(ConfigError::UnsupportedValue {
            key: key.to_string(),
        }),
    }
}

fn interpolate(key: &str, raw: &str, env: &Environment) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(raw) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = env
            .var(name.as_str())
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                key: key.to_string(),
                var: name.as_str().to_string(),
            })?;
        out.push_str(&raw[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&raw[last..]);
    Ok(out)
}
