use std::sync::{Mutex, MutexGuard};

use super::{DeviceId, DeviceInfoProvider, DeviceUsage, StaticDeviceInfo};
use crate::error::ProviderError;

/// In-memory provider with a fixed device list.
/// Usage can be changed at runtime and failures injected, which makes it the
/// stand-in monitor for tests and for running the server without GPUs.
pub struct FixedProvider {
    devices: Vec<StaticDeviceInfo>,
    state: Mutex<FixedState>,
}

struct FixedState {
    usage: Vec<DeviceUsage>,
    failure: Option<String>,
    static_calls: usize,
    usage_calls: usize,
}

impl FixedProvider {
    /// Every device starts out with nothing in use
    pub fn new(devices: Vec<StaticDeviceInfo>) -> Self {
        let usage = devices
            .iter()
            .map(|d| DeviceUsage {
                id: d.id.clone(),
                used_memory: 0,
            })
            .collect();
        FixedProvider {
            devices,
            state: Mutex::new(FixedState {
                usage,
                failure: None,
                static_calls: 0,
                usage_calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FixedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the used memory reported for one device. Unknown ids are ignored.
    pub fn set_used(&self, id: &DeviceId, used_memory: u64) {
        if let Some(u) = self.state().usage.iter_mut().find(|u| &u.id == id) {
            u.used_memory = used_memory;
        }
    }

    /// Replace the whole usage snapshot, including its order and device set
    pub fn set_usage(&self, usage: Vec<DeviceUsage>) {
        self.state().usage = usage;
    }

    /// Fail every call until [`clear_failure`](Self::clear_failure)
    pub fn fail_with(&self, message: impl Into<String>) {
        self.state().failure = Some(message.into());
    }

    pub fn clear_failure(&self) {
        self.state().failure = None;
    }

    pub fn static_calls(&self) -> usize {
        self.state().static_calls
    }

    pub fn usage_calls(&self) -> usize {
        self.state().usage_calls
    }
}

impl DeviceInfoProvider for FixedProvider {
    fn fetch_static_info(&self) -> Result<Vec<StaticDeviceInfo>, ProviderError> {
        let mut state = self.state();
        state.static_calls += 1;
        if let Some(msg) = &state.failure {
            return Err(ProviderError::Unavailable(msg.clone()));
        }
        Ok(self.devices.clone())
    }

    fn fetch_usage(&self) -> Result<Vec<DeviceUsage>, ProviderError> {
        let mut state = self.state();
        state.usage_calls += 1;
        if let Some(msg) = &state.failure {
            return Err(ProviderError::Unavailable(msg.clone()));
        }
        Ok(state.usage.clone())
    }
}

/// Parses `id:name:path:total_bytes` entries separated by `;`
pub fn parse_device_list(list: &str) -> Result<Vec<StaticDeviceInfo>, ProviderError> {
    list.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [id, name, path, total] = parts[..] else {
                return Err(ProviderError::Parse(format!(
                    "expected id:name:path:total_bytes, got {entry:?}"
                )));
            };
            let total_memory = total
                .parse::<u64>()
                .map_err(|_| ProviderError::Parse(format!("bad total memory in {entry:?}")))?;
            Ok(StaticDeviceInfo {
                id: DeviceId::new(id),
                name: name.to_string(),
                path: path.to_string(),
                total_memory,
            })
        })
        .collect()
}
