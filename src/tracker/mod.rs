//! Buffered GPU availability.
//!
//! The monitor behind a [`DeviceInfoProvider`] lags behind placement
//! decisions made in this process. Every decision is recorded here as a
//! reservation and subtracted from the monitor's free-memory figure until it
//! is older than the configured window, by which point the monitor is
//! assumed to have caught up.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::memory::{DeviceAvailability, DeviceId, DeviceInfoProvider, StaticDeviceInfo};

mod buffer;
mod clock;

use buffer::DeviceBuffer;
pub use clock::{Clock, ManualClock, SystemClock};

pub struct GpuAvailabilityTracker {
    provider: Arc<dyn DeviceInfoProvider>,
    clock: Arc<dyn Clock>,
    window: Duration,
    /// Captured once; position is the public device index
    static_info: Vec<StaticDeviceInfo>,
    positions: HashMap<DeviceId, usize>,
    /// One buffer per device, allocated up front
    buffers: Mutex<HashMap<DeviceId, DeviceBuffer>>,
}

impl GpuAvailabilityTracker {
    pub fn new(provider: Arc<dyn DeviceInfoProvider>) -> Result<Self> {
        Self::with_config(provider, &TrackerConfig::default())
    }

    pub fn with_config(provider: Arc<dyn DeviceInfoProvider>, config: &TrackerConfig) -> Result<Self> {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    /// Captures static device info from the provider. Fails without building
    /// anything if the provider errors or reports an unusable device list.
    pub fn with_clock(
        provider: Arc<dyn DeviceInfoProvider>,
        config: &TrackerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let static_info = provider
            .fetch_static_info()
            .map_err(TrackerError::Initialization)?;

        if static_info.is_empty() {
            return Err(TrackerError::InvalidStaticInfo("provider reported no devices".into()));
        }

        let mut positions = HashMap::with_capacity(static_info.len());
        for (i, device) in static_info.iter().enumerate() {
            if device.id.as_str().is_empty() {
                return Err(TrackerError::InvalidStaticInfo(format!(
                    "device {} ({}) has no id",
                    i, device.path
                )));
            }
            if positions.insert(device.id.clone(), i).is_some() {
                return Err(TrackerError::InvalidStaticInfo(format!(
                    "duplicate device id {}",
                    device.id
                )));
            }
        }

        let buffers = static_info
            .iter()
            .map(|d| (d.id.clone(), DeviceBuffer::default()))
            .collect();

        tracing::info!(
            "Tracking {} GPU(s) with a {:?} request window",
            static_info.len(),
            config.window
        );

        Ok(GpuAvailabilityTracker {
            provider,
            clock,
            window: config.window,
            static_info,
            positions,
            buffers: Mutex::new(buffers),
        })
    }

    pub fn devices(&self) -> &[StaticDeviceInfo] {
        &self.static_info
    }

    pub fn device_count(&self) -> usize {
        self.static_info.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock_buffers(&self) -> MutexGuard<'_, HashMap<DeviceId, DeviceBuffer>> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raw availability: total minus what the provider reports as used.
    /// Output follows the provider's order.
    pub fn availability(&self) -> Result<Vec<DeviceAvailability>> {
        let usage = self.provider.fetch_usage()?;

        if usage.len() != self.static_info.len() {
            return Err(TrackerError::DeviceSetChanged(format!(
                "expected {} device(s), provider reported {}",
                self.static_info.len(),
                usage.len()
            )));
        }

        let mut seen = HashSet::with_capacity(usage.len());
        usage
            .into_iter()
            .map(|u| {
                let info = self
                    .positions
                    .get(&u.id)
                    .map(|&i| &self.static_info[i])
                    .ok_or_else(|| {
                        TrackerError::DeviceSetChanged(format!("unknown device {}", u.id))
                    })?;
                if !seen.insert(u.id.clone()) {
                    return Err(TrackerError::DeviceSetChanged(format!(
                        "device {} reported twice",
                        u.id
                    )));
                }
                Ok(DeviceAvailability {
                    id: u.id,
                    name: info.name.clone(),
                    path: info.path.clone(),
                    total_memory: info.total_memory,
                    available_memory: info.total_memory.saturating_sub(u.used_memory),
                })
            })
            .collect()
    }

    /// Raw availability minus reservations still inside the window, floored at zero.
    /// Expired reservations are dropped as a side effect.
    pub fn buffered_availability(&self) -> Result<Vec<DeviceAvailability>> {
        let now = self.clock.now();
        // provider call stays outside the lock
        let mut devices = self.availability()?;

        let mut buffers = self.lock_buffers();
        let expired: usize = buffers
            .values_mut()
            .map(|b| b.sweep(now, self.window))
            .sum();
        if expired > 0 {
            tracing::debug!("Dropped {} expired GPU reservation(s)", expired);
        }

        for device in &mut devices {
            let pending = buffers.get(&device.id).map_or(0, DeviceBuffer::running_sum);
            device.available_memory = device.available_memory.saturating_sub(pending);
        }
        Ok(devices)
    }

    /// Record `amount` bytes as about to be used on the device at `index`.
    /// No capacity check is made.
    pub fn add_request(&self, index: usize, amount: u64) -> Result<()> {
        let device = self
            .static_info
            .get(index)
            .ok_or(TrackerError::IndexOutOfRange {
                index,
                count: self.static_info.len(),
            })?;
        self.record(&device.id, amount)
    }

    pub fn add_request_for(&self, id: &DeviceId, amount: u64) -> Result<()> {
        self.record(id, amount)
    }

    fn record(&self, id: &DeviceId, amount: u64) -> Result<()> {
        let mut buffers = self.lock_buffers();
        let buffer = buffers
            .get_mut(id)
            .ok_or_else(|| TrackerError::UnknownDevice(id.clone()))?;
        buffer.record(amount, self.clock.now());
        tracing::debug!(
            "Reserved {} bytes on GPU {} ({} pending in {} request(s))",
            amount,
            id,
            buffer.running_sum(),
            buffer.len()
        );
        Ok(())
    }

    /// Sum of reservations currently held for a device. Does not sweep, so
    /// this can include reservations the next buffered query will drop.
    pub fn pending(&self, index: usize) -> Result<u64> {
        let device = self
            .static_info
            .get(index)
            .ok_or(TrackerError::IndexOutOfRange {
                index,
                count: self.static_info.len(),
            })?;
        Ok(self
            .lock_buffers()
            .get(&device.id)
            .map_or(0, DeviceBuffer::running_sum))
    }

    /// Running sums for every device in device-index order, read under one lock
    pub fn pending_by_device(&self) -> Vec<u64> {
        let buffers = self.lock_buffers();
        self.static_info
            .iter()
            .map(|d| buffers.get(&d.id).map_or(0, DeviceBuffer::running_sum))
            .collect()
    }

    pub fn pending_total(&self) -> u64 {
        self.lock_buffers()
            .values()
            .fold(0u64, |acc, b| acc.saturating_add(b.running_sum()))
    }
}
