use thiserror::Error;

use crate::memory::DeviceId;

/// Failures reported by a [`DeviceInfoProvider`](crate::memory::DeviceInfoProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The monitor could not be reached or reported nothing usable
    #[error("device monitor unavailable: {0}")]
    Unavailable(String),

    /// A probe command ran but exited unsuccessfully
    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    /// The monitor answered with something we could not interpret
    #[error("malformed device data: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`GpuAvailabilityTracker`](crate::tracker::GpuAvailabilityTracker).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Static device info could not be fetched at construction
    #[error("failed to capture static GPU info: {0}")]
    Initialization(#[source] ProviderError),

    /// Static device info was fetched but is unusable
    #[error("invalid static GPU info: {0}")]
    InvalidStaticInfo(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("device index {index} out of range: {count} device(s) tracked")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    /// The provider's device set no longer matches the one captured at construction
    #[error("device set changed since construction: {0}")]
    DeviceSetChanged(String),
}

impl TrackerError {
    /// True for both construction failure kinds.
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            TrackerError::Initialization(_) | TrackerError::InvalidStaticInfo(_)
        )
    }
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;
