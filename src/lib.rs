//! Tracks how much GPU memory on this machine is actually free.
//!
//! A [`GpuAvailabilityTracker`] combines what the device monitor reports with
//! reservations recorded locally since the monitor last looked, so placement
//! decisions made in quick succession do not all see the same stale figure.

pub mod admission;
pub mod api;
pub mod config;
pub mod error;
pub mod memory;
pub mod resources;
pub mod tracker;

pub use error::{ProviderError, TrackerError};
pub use memory::{DeviceAvailability, DeviceId, DeviceInfoProvider, DeviceUsage, StaticDeviceInfo};
pub use tracker::GpuAvailabilityTracker;
