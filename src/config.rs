use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::services::retry::RetryPolicy;
use crate::services::routing::PersonIndexPolicy;
use crate::services::throttle::ThrottleConfig;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    S3,
    Memory,
}

impl FromStr for BlobBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(BlobBackend::S3),
            "memory" => Ok(BlobBackend::Memory),
            other => Err(format!("expected `s3` or `memory`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub backend: BlobBackend,
    pub bucket_name: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Overrides the URL prefix returned to clients, e.g. a CDN in front of the bucket.
    pub public_base_url: Option<String>,
}

/// Limits applied by the upload orchestrator before anything is stored.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_file_size: usize,
    pub allowed_mime_types: Vec<String>,
    pub person_index_policy: PersonIndexPolicy,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            person_index_policy: PersonIndexPolicy::FallbackToPrimary,
        }
    }
}

impl UploadSettings {
    pub fn allows(&self, mime_type: &str) -> bool {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_mime_types.iter().any(|m| *m == essence)
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// No key means notifications are only logged.
    pub api_key: Option<String>,
    pub api_base: String,
    pub from: String,
    pub notify_to: String,
    pub throttle: ThrottleConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub blob: BlobConfig,
    pub upload: UploadSettings,
    pub storage_retry: RetryPolicy,
    pub mail: Option<MailConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let database_url = vars.required("DATABASE_URL")?;
        let bind_addr = vars.get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());

        let backend = vars.parse_or("BLOB_BACKEND", BlobBackend::S3)?;
        let bucket_name = match backend {
            BlobBackend::S3 => vars.required("S3_BUCKET_NAME")?,
            BlobBackend::Memory => vars
                .get("S3_BUCKET_NAME")
                .unwrap_or_else(|| "intake".to_string()),
        };
        let blob = BlobConfig {
            backend,
            bucket_name,
            region: vars.get("AWS_REGION").unwrap_or_else(|| "eu-west-3".to_string()),
            endpoint: vars.get("S3_ENDPOINT"),
            access_key_id: vars.get("AWS_ACCESS_KEY_ID"),
            secret_access_key: vars.get("AWS_SECRET_ACCESS_KEY"),
            public_base_url: vars.get("BLOB_PUBLIC_BASE_URL"),
        };

        let defaults = UploadSettings::default();
        let upload = UploadSettings {
            max_file_size: vars.parse_or("MAX_UPLOAD_BYTES", defaults.max_file_size)?,
            allowed_mime_types: vars
                .get("ALLOWED_MIME_TYPES")
                .map(|list| {
                    list.split(',')
                        .map(|m| m.trim().to_ascii_lowercase())
                        .filter(|m| !m.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.allowed_mime_types),
            person_index_policy: vars
                .parse_or("PERSON_INDEX_POLICY", defaults.person_index_policy)?,
        };

        let retry_defaults = RetryPolicy::default();
        let storage_retry = RetryPolicy {
            max_retries: vars.parse_or("STORAGE_RETRY_MAX", retry_defaults.max_retries)?,
            initial_interval: Duration::from_millis(vars.parse_or(
                "STORAGE_RETRY_INITIAL_MS",
                retry_defaults.initial_interval.as_millis() as u64,
            )?),
            ..retry_defaults
        };

        let mail = match vars.get("NOTIFY_EMAIL") {
            None => None,
            Some(notify_to) => {
                let throttle_defaults = ThrottleConfig::default();
                Some(MailConfig {
                    api_key: vars.get("RESEND_API_KEY"),
                    api_base: vars
                        .get("RESEND_API_BASE")
                        .unwrap_or_else(|| "https://api.resend.com".to_string()),
                    from: vars.required("MAIL_FROM")?,
                    notify_to,
                    throttle: ThrottleConfig {
                        min_interval: Duration::from_millis(vars.parse_or(
                            "MAIL_MIN_INTERVAL_MS",
                            throttle_defaults.min_interval.as_millis() as u64,
                        )?),
                        retry: RetryPolicy {
                            max_retries: vars
                                .parse_or("MAIL_MAX_RETRIES", throttle_defaults.retry.max_retries)?,
                            max_elapsed: Duration::from_secs(vars.parse_or(
                                "MAIL_MAX_ELAPSED_SECS",
                                throttle_defaults.retry.max_elapsed.as_secs(),
                            )?),
                            ..throttle_defaults.retry
                        },
                    },
                })
            }
        };

        Ok(Self {
            database_url,
            bind_addr,
            blob,
            upload,
            storage_retry,
            mail,
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }
}
