//! Environment-driven settings, validated before any task runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use posfact_bucket::{BucketError, BucketStore, LocalBucketStore, S3BucketStore, S3Config};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, Level};

use crate::transform::transform_for;

pub const DEFAULT_BATCH_SIZE: usize = 3;
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to load credentials from {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },
    #[error("unknown fact '{0}' in FACT_TASKS")]
    UnknownFact(String),
    #[error("failed to build object store: {0}")]
    Store(#[from] BucketError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    S3 {
        region: String,
        endpoint: Option<String>,
        force_path_style: bool,
    },
    Local {
        root: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub bucket_name: String,
    pub batch_size: usize,
    pub credentials_path: Option<PathBuf>,
    pub log_level: Level,
    pub store: StoreSettings,
    /// Facts to run, in the order given. `None` runs every registered fact.
    pub fact_filter: Option<Vec<String>>,
}

/// Static access keys read from `CREDENTIALS_PATH`.
#[derive(Clone, Deserialize)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl StaticCredentials {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let credentials_error = |reason: String| ConfigError::Credentials {
            path: path.to_path_buf(),
            reason,
        };

        let contents =
            std::fs::read_to_string(path).map_err(|err| credentials_error(err.to_string()))?;
        let credentials: Self =
            toml::from_str(&contents).map_err(|err| credentials_error(err.to_string()))?;

        if credentials.access_key_id.trim().is_empty()
            || credentials.secret_access_key.trim().is_empty()
        {
            return Err(credentials_error("access keys must not be empty".into()));
        }
        Ok(credentials)
    }
}

impl PipelineSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bucket_name = get("BUCKET_NAME").ok_or(ConfigError::Missing("BUCKET_NAME"))?;

        let batch_size = match get("PROCESSING_BATCH_SIZE") {
            None => DEFAULT_BATCH_SIZE,
            Some(raw) => match raw.parse::<usize>() {
                Ok(size) if size >= 1 => size,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "PROCESSING_BATCH_SIZE",
                        value: raw,
                        reason: "expected an integer of at least 1".into(),
                    })
                }
            },
        };

        let log_level = match get("LOG_LEVEL") {
            None => Level::INFO,
            Some(raw) => parse_level(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "LOG_LEVEL",
                value: raw.clone(),
                reason: "expected one of TRACE, DEBUG, INFO, WARN, ERROR".into(),
            })?,
        };

        let store = match get("OBJECT_STORE_KIND").as_deref().map(str::to_ascii_lowercase) {
            None => s3_settings(&get)?,
            Some(kind) if kind == "s3" => s3_settings(&get)?,
            Some(kind) if kind == "local" => StoreSettings::Local {
                root: get("OBJECT_STORE_ROOT")
                    .map(PathBuf::from)
                    .ok_or(ConfigError::Missing("OBJECT_STORE_ROOT"))?,
            },
            Some(kind) => {
                return Err(ConfigError::Invalid {
                    var: "OBJECT_STORE_KIND",
                    value: kind,
                    reason: "expected 's3' or 'local'".into(),
                })
            }
        };

        let fact_filter = match get("FACT_TASKS") {
            None => None,
            Some(raw) => {
                let mut names: Vec<String> = Vec::new();
                for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
                    if transform_for(name).is_none() {
                        return Err(ConfigError::UnknownFact(name.to_string()));
                    }
                    if !names.iter().any(|existing| existing == name) {
                        names.push(name.to_string());
                    }
                }
                if names.is_empty() {
                    return Err(ConfigError::Invalid {
                        var: "FACT_TASKS",
                        value: raw,
                        reason: "expected at least one fact name".into(),
                    });
                }
                Some(names)
            }
        };

        Ok(Self {
            bucket_name,
            batch_size,
            credentials_path: get("CREDENTIALS_PATH").map(PathBuf::from),
            log_level,
            store,
            fact_filter,
        })
    }

    pub fn load_credentials(&self) -> Result<Option<StaticCredentials>, ConfigError> {
        self.credentials_path
            .as_deref()
            .map(StaticCredentials::load)
            .transpose()
    }
}

fn s3_settings(get: &impl Fn(&str) -> Option<String>) -> Result<StoreSettings, ConfigError> {
    let force_path_style = match get("BUCKET_FORCE_PATH_STYLE") {
        None => false,
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => {
                return Err(ConfigError::Invalid {
                    var: "BUCKET_FORCE_PATH_STYLE",
                    value: raw,
                    reason: "expected true or false".into(),
                })
            }
        },
    };

    Ok(StoreSettings::S3 {
        region: get("BUCKET_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
        endpoint: get("BUCKET_ENDPOINT"),
        force_path_style,
    })
}

/// Accepts the usual level names plus `WARNING` and `CRITICAL`.
fn parse_level(raw: &str) -> Option<Level> {
    match raw.to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

/// Constructs the configured backend once; callers share the returned handle.
pub async fn build_store(settings: &PipelineSettings) -> Result<Arc<dyn BucketStore>, ConfigError> {
    match &settings.store {
        StoreSettings::S3 {
            region,
            endpoint,
            force_path_style,
        } => {
            let credentials = settings.load_credentials()?;
            let config = S3Config {
                bucket: settings.bucket_name.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                access_key_id: credentials.as_ref().map(|c| c.access_key_id.clone()),
                secret_access_key: credentials.as_ref().map(|c| c.secret_access_key.clone()),
                session_token: credentials.and_then(|c| c.session_token),
                force_path_style: *force_path_style,
            };
            let store = S3BucketStore::new(config).await?;
            info!(bucket = %settings.bucket_name, region = %region, "using S3 object store");
            Ok(Arc::new(store))
        }
        StoreSettings::Local { root } => {
            let store = LocalBucketStore::new(root.clone(), settings.bucket_name.clone())?;
            info!(bucket = %settings.bucket_name, root = %root.display(), "using local object store");
            Ok(Arc::new(store))
        }
    }
}
