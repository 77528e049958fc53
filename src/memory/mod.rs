use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::{Config, ProviderKind};
use crate::error::ProviderError;

pub mod fixed;
pub mod nvidia;

/// Stable, provider-issued device identifier (the GPU UUID for NVIDIA).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        DeviceId::new(id)
    }
}

/// Per-device metadata that does not change while the process runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub path: String,
    pub total_memory: u64, // bytes
}

/// One device's usage as last observed by the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUsage {
    pub id: DeviceId,
    pub used_memory: u64, // bytes
}

/// Static info overlaid with the memory currently considered free
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAvailability {
    pub id: DeviceId,
    pub name: String,
    pub path: String,
    pub total_memory: u64,
    pub available_memory: u64,
}

/// Source of raw device state.
/// Both calls may block (subprocesses, slow monitors); async callers should
/// wrap them in `tokio::task::spawn_blocking`. Entries are expected in a
/// stable order, but consumers key by [`DeviceId`] rather than position.
pub trait DeviceInfoProvider: Send + Sync {
    fn fetch_static_info(&self) -> Result<Vec<StaticDeviceInfo>, ProviderError>;
    fn fetch_usage(&self) -> Result<Vec<DeviceUsage>, ProviderError>;
}

/// Pick the provider named by the configuration (runs at startup, blocking is fine)
pub fn detect_provider(config: &Config) -> Result<Arc<dyn DeviceInfoProvider>, ProviderError> {
    match config.provider {
        ProviderKind::NvidiaSmi => {
            let p = nvidia::NvidiaSmiProvider::detect()?;
            tracing::info!("Using nvidia-smi at {}", p.binary().display());
            Ok(Arc::new(p))
        }
        ProviderKind::Fixed => {
            let devices = fixed::parse_device_list(&config.fixed_devices)?;
            tracing::info!("Using fixed device list ({} device(s))", devices.len());
            Ok(Arc::new(fixed::FixedProvider::new(devices)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_fixed_provider_from_config() {
        let config = Config {
            provider: ProviderKind::Fixed,
            fixed_devices: "GPU-0:Tesla T4:/dev/nvidia0:1000".into(),
            ..Config::default()
        };
        let provider = detect_provider(&config).unwrap();
        let devices = provider.fetch_static_info().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, DeviceId::from("GPU-0"));
        assert_eq!(provider.fetch_usage().unwrap()[0].used_memory, 0);
    }

    #[test]
    fn bad_fixed_device_list_fails_detection() {
        let config = Config {
            provider: ProviderKind::Fixed,
            fixed_devices: "GPU-0".into(),
            ..Config::default()
        };
        assert!(matches!(detect_provider(&config), Err(ProviderError::Parse(_))));
    }
}
