use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::acl::{Permission, PermissionSet, TenantPolicy};
use common::quota::DEFAULT_TOTAL_SPACE;

use crate::api::DEFAULT_UPLOAD_TIMEOUT;

pub const DEFAULT_TENANT: &str = "default";
pub const DEFAULT_ADMIN: &str = "root";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// one of error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// directory for daily rolling log files,
    ///  if not set then logs only go to stdout
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// where snapshots and content blobs are persisted,
    ///  if not set then a temporary directory will be used
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// capacity of tenants without an explicit quota
    #[serde(default = "default_quota_bytes")]
    pub default_quota_bytes: u64,
    /// bound on queued sync passes, unbounded if not set
    #[serde(default)]
    pub sync_queue_size: Option<usize>,
    /// seconds an unfinished chunked upload may sit idle before it is dropped
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_tenants")]
    pub tenants: Vec<TenantConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub name: String,
    /// overrides `default_quota_bytes` for this tenant
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    #[serde(default)]
    pub admins: BTreeSet<String>,
    #[serde(default)]
    pub admin_roles: BTreeSet<String>,
    /// what every member holds on resources they do not own
    #[serde(default)]
    pub default_permissions: Vec<Permission>,
    /// what every member holds on the tenant root
    #[serde(default = "default_root_permissions")]
    pub root_permissions: Vec<Permission>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_quota_bytes() -> u64 {
    DEFAULT_TOTAL_SPACE
}

fn default_upload_timeout_secs() -> u64 {
    DEFAULT_UPLOAD_TIMEOUT.as_secs()
}

fn default_root_permissions() -> Vec<Permission> {
    vec![Permission::Read, Permission::Write]
}

fn default_tenants() -> Vec<TenantConfig> {
    vec![TenantConfig {
        name: DEFAULT_TENANT.to_string(),
        quota_bytes: None,
        admins: BTreeSet::from([DEFAULT_ADMIN.to_string()]),
        admin_roles: BTreeSet::new(),
        default_permissions: Vec::new(),
        root_permissions: default_root_permissions(),
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            snapshot_path: None,
            default_quota_bytes: default_quota_bytes(),
            sync_queue_size: None,
            upload_timeout_secs: default_upload_timeout_secs(),
            tenants: default_tenants(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.log_level()?;
        let mut seen = BTreeSet::new();
        for tenant in &self.tenants {
            if tenant.name.is_empty() {
                return Err(ConfigError::EmptyTenantName);
            }
            if !seen.insert(tenant.name.as_str()) {
                return Err(ConfigError::DuplicateTenant(tenant.name.clone()));
            }
        }
        if self.sync_queue_size == Some(0) {
            return Err(ConfigError::ZeroQueueSize);
        }
        if self.upload_timeout_secs == 0 {
            return Err(ConfigError::ZeroUploadTimeout);
        }
        Ok(())
    }
}

impl TenantConfig {
    pub fn policy(&self) -> TenantPolicy {
        TenantPolicy {
            admins: self.admins.clone(),
            admin_roles: self.admin_roles.clone(),
            owner: PermissionSet::all(),
            default: self.default_permissions.iter().copied().collect(),
            root: self.root_permissions.iter().copied().collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("tenant name must not be empty")]
    EmptyTenantName,
    #[error("tenant {0} is configured twice")]
    DuplicateTenant(String),
    #[error("sync queue size must be at least 1")]
    ZeroQueueSize,
    #[error("upload timeout must be at least 1 second")]
    ZeroUploadTimeout,
}
