//! Loader configuration, read from a TOML file
//!
//! Every field has a default, so an empty file (or no file at all) is a valid configuration.
//!
//! ```toml
//! log_level = "debug"
//!
//! [storage]
//! enabled = true
//! queue_capacity = 8192
//! priority = "normal"
//!
//! [device]
//! backend = "soft"
//! bc_compression = false
//! ```

use crate::storage::{Priority, MAX_QUEUE_CAPACITY};
use anyhow::{anyhow, Context};
use log::LevelFilter;
use serde::Deserialize;
use std::{fs, path::Path, str::FromStr};
use texstream_utils::AnyResult;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub storage: StorageConfig,
    pub device: DeviceConfig,
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            storage: Default::default(),
            device: Default::default(),
            log_level: String::from("info"),
        }
    }
}

impl LoaderConfig {
    /// Reads the configuration file, or returns the default configuration if there's no path.
    pub fn load(path: Option<&Path>) -> AnyResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = fs::read_to_string(path)
            .with_context(|| format!("couldn't read the configuration file {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("couldn't parse the configuration file {}", path.display()))
    }

    pub fn parse(text: &str) -> AnyResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn level_filter(&self) -> AnyResult<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| anyhow!("invalid log level `{}`", self.log_level))
    }
}

/// Settings of the accelerated storage channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// If disabled, all loads go through synchronous file reads.
    pub enabled: bool,
    pub queue_capacity: u16,
    /// Advisory, see [`Priority`].
    pub priority: Priority,
    /// Name of the storage worker thread.
    pub worker_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: MAX_QUEUE_CAPACITY,
            priority: Priority::Normal,
            worker_name: String::from("Storage Worker"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// CPU reference device.
    #[default]
    Soft,
    Wgpu,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub backend: Backend,
    /// Whether the device accepts storage queue requests.
    pub direct_storage: bool,
    /// Specifies whether BC/DXT compression is allowed.
    pub bc_compression: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Soft,
            direct_storage: true,
            bc_compression: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn empty_config_is_default() {
        let config = LoaderConfig::parse("").unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert!(config.storage.enabled);
        assert_eq!(config.storage.queue_capacity, MAX_QUEUE_CAPACITY);
        assert_eq!(config.device.backend, Backend::Soft);
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Info);
    }

    #[test]
    pub fn partial_sections() {
        let config = LoaderConfig::parse(
            r#"
            log_level = "trace"

            [storage]
            enabled = false
            priority = "high"

            [device]
            backend = "wgpu"
            "#,
        )
        .unwrap();

        assert!(!config.storage.enabled);
        assert_eq!(config.storage.priority, Priority::High);
        assert_eq!(config.storage.worker_name, StorageConfig::default().worker_name);
        assert_eq!(config.device.backend, Backend::Wgpu);
        assert!(config.device.bc_compression);
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Trace);
    }

    #[test]
    pub fn bad_values_are_rejected() {
        assert!(LoaderConfig::parse("[device]\nbackend = \"vulkan\"").is_err());
        assert!(LoaderConfig::parse("[storage]\ncapacity = 5").is_err());

        let config = LoaderConfig::parse("log_level = \"loud\"").unwrap();
        assert!(config.level_filter().is_err());
    }

    #[test]
    pub fn loading_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texstream.toml");
        std::fs::write(&path, "[storage]\nqueue_capacity = 256\n").unwrap();

        let config = LoaderConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.storage.queue_capacity, 256);

        assert_eq!(LoaderConfig::load(None).unwrap(), LoaderConfig::default());
        assert!(LoaderConfig::load(Some(dir.path().join("missing.toml").as_path())).is_err());
    }
}
