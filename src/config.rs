//! Driver configuration loaded via `ortho-config`.
//!
//! Values merge defaults, `ceph-rbd.toml` discovered on disk and
//! `CEPH_RBD_*` environment variables.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::cluster::ClusterSettings;

/// Default location of the cluster configuration file.
pub const DEFAULT_CONF_PATH: &str = "/etc/ceph/ceph.conf";

/// Default pool holding driver images.
pub const DEFAULT_STORAGE_POOL: &str = "rbd";

/// Settings for connecting to the cluster and invoking the host tools.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CEPH_RBD",
    discovery(
        app_name = "ceph-rbd",
        env_var = "CEPH_RBD_CONFIG_PATH",
        config_file_name = "ceph-rbd.toml",
        dotfile_name = ".ceph-rbd.toml",
        project_file_name = "ceph-rbd.toml"
    )
)]
pub struct DriverConfig {
    /// Cluster name; empty selects the default cluster.
    #[ortho_config(default = String::new())]
    pub cluster_name: String,
    /// Identity to authenticate as, without the `client.` prefix.
    #[ortho_config(default = "admin".to_owned())]
    pub user_id: String,
    /// Path to the cluster configuration file.
    #[ortho_config(default = DEFAULT_CONF_PATH.to_owned())]
    pub conf_path: String,
    /// Pool in which volumes are created.
    #[ortho_config(default = DEFAULT_STORAGE_POOL.to_owned())]
    pub storage_pool: String,
    /// Path to the `rbd` executable.
    #[ortho_config(default = "rbd".to_owned())]
    pub rbd_bin: String,
    /// Path to the `ceph` executable.
    #[ortho_config(default = "ceph".to_owned())]
    pub ceph_bin: String,
    /// Path to the `hostname` executable.
    #[ortho_config(default = "hostname".to_owned())]
    pub hostname_bin: String,
}

struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl DriverConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to ceph-rbd.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ceph-rbd-driver")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects blank values. Only `cluster_name` may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and TOML key that would supply the missing value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (
                &self.user_id,
                FieldMetadata::new("cluster user id", "CEPH_RBD_USER_ID", "user_id"),
            ),
            (
                &self.conf_path,
                FieldMetadata::new(
                    "cluster configuration path",
                    "CEPH_RBD_CONF_PATH",
                    "conf_path",
                ),
            ),
            (
                &self.storage_pool,
                FieldMetadata::new("storage pool", "CEPH_RBD_STORAGE_POOL", "storage_pool"),
            ),
            (
                &self.rbd_bin,
                FieldMetadata::new("rbd executable", "CEPH_RBD_RBD_BIN", "rbd_bin"),
            ),
            (
                &self.ceph_bin,
                FieldMetadata::new("ceph executable", "CEPH_RBD_CEPH_BIN", "ceph_bin"),
            ),
            (
                &self.hostname_bin,
                FieldMetadata::new(
                    "hostname executable",
                    "CEPH_RBD_HOSTNAME_BIN",
                    "hostname_bin",
                ),
            ),
        ];
        for (value, metadata) in &required {
            Self::require_field(value, metadata)?;
        }
        Ok(())
    }

    /// Returns the connection settings for [`crate::cluster::ClusterSession`].
    #[must_use]
    pub fn settings(&self) -> ClusterSettings {
        ClusterSettings {
            cluster_name: self.cluster_name.clone(),
            user_id: self.user_id.clone(),
            conf_path: Utf8PathBuf::from(&self.conf_path),
            pool: self.storage_pool.clone(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
