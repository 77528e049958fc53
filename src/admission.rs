use serde::Serialize;
use thiserror::Error;

use crate::error::TrackerError;
use crate::memory::DeviceId;
use crate::resources::ResourceList;
use crate::tracker::GpuAvailabilityTracker;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("no tracked GPU at {0}")]
    UnknownDevicePath(String),

    #[error("GPU {device} has {available} bytes available, {requested} requested")]
    Insufficient {
        device: DeviceId,
        requested: u64,
        available: u64,
    },
}

/// GPU memory reserved for an admitted workload on one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub device_index: usize,
    pub device_id: DeviceId,
    pub path: String,
    pub amount: u64,
}

/// Admit a workload whose requests name GPU memory per device path.
///
/// Reads buffered availability once; if every requested device has room,
/// records one reservation per device and returns them. Otherwise nothing is
/// recorded. Two concurrent admissions can both pass the check: the tracker
/// only keeps the second one from seeing stale numbers once the first has
/// been recorded.
pub fn admit(
    tracker: &GpuAvailabilityTracker,
    requests: &ResourceList,
) -> Result<Vec<Placement>, AdmissionError> {
    let mut placements = Vec::new();
    for (path, amount) in requests.memory_of_each_nvidia_gpu() {
        let (device_index, device) = tracker
            .devices()
            .iter()
            .enumerate()
            .find(|(_, d)| d.path == path)
            .ok_or_else(|| AdmissionError::UnknownDevicePath(path.to_string()))?;
        placements.push(Placement {
            device_index,
            device_id: device.id.clone(),
            path: path.to_string(),
            amount,
        });
    }

    if placements.is_empty() {
        return Ok(placements);
    }

    let snapshot = tracker.buffered_availability()?;
    for p in &placements {
        let available = snapshot
            .iter()
            .find(|d| d.id == p.device_id)
            .map_or(0, |d| d.available_memory);
        if available < p.amount {
            return Err(AdmissionError::Insufficient {
                device: p.device_id.clone(),
                requested: p.amount,
                available,
            });
        }
    }

    for p in &placements {
        tracker.add_request_for(&p.device_id, p.amount)?;
    }
    tracing::info!(
        "Admitted workload on {} GPU(s), {} bytes reserved",
        placements.len(),
        placements.iter().map(|p| p.amount).sum::<u64>()
    );
    Ok(placements)
}
