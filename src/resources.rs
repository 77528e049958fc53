//! Container and pod resource accounting.
//!
//! Quantities are plain integers: millicores for `cpu`, bytes for memory
//! kinds, counts for everything else. Per-device GPU memory is requested
//! under the device path (`/dev/nvidia0`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const PODS: &str = "pods";
pub const NVIDIA_GPU: &str = "nvidia.com/gpu";
pub const NVIDIA_GPU_MEMORY: &str = "nvidia.com/gpu-memory";
pub const NVIDIA_DEVICE_PREFIX: &str = "/dev/nvidia";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceList(BTreeMap<String, u64>);

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, quantity: u64) -> Self {
        self.0.insert(name.into(), quantity);
        self
    }

    /// Quantity for `name`, 0 if not specified
    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn cpu(&self) -> u64 {
        self.get(CPU)
    }

    pub fn memory(&self) -> u64 {
        self.get(MEMORY)
    }

    pub fn pods(&self) -> u64 {
        self.get(PODS)
    }

    pub fn nvidia_gpu(&self) -> u64 {
        self.get(NVIDIA_GPU)
    }

    pub fn nvidia_gpu_memory(&self) -> u64 {
        self.get(NVIDIA_GPU_MEMORY)
    }

    /// `(device path, bytes)` for every per-device GPU memory entry, in path order
    pub fn memory_of_each_nvidia_gpu(&self) -> Vec<(&str, u64)> {
        self.0
            .iter()
            .filter(|(name, _)| name.starts_with(NVIDIA_DEVICE_PREFIX))
            .map(|(name, &q)| (name.as_str(), q))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn add(&mut self, name: &str, quantity: u64) {
        let entry = self.0.entry(name.to_string()).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    fn raise_to(&mut self, name: &str, quantity: u64) {
        let entry = self.0.entry(name.to_string()).or_insert(0);
        *entry = (*entry).max(quantity);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

/// Requests and limits of a whole pod.
/// Regular containers run together, so their quantities add up. Init
/// containers run one at a time before them, so each only raises a resource
/// to its own quantity when that is larger.
pub fn pod_requests_and_limits(
    containers: &[Container],
    init_containers: &[Container],
) -> (ResourceList, ResourceList) {
    let mut requests = ResourceList::new();
    let mut limits = ResourceList::new();

    for c in containers {
        for (name, q) in c.resources.requests.iter() {
            requests.add(name, q);
        }
        for (name, q) in c.resources.limits.iter() {
            limits.add(name, q);
        }
    }

    for c in init_containers {
        for (name, q) in c.resources.requests.iter() {
            requests.raise_to(name, q);
        }
        for (name, q) in c.resources.limits.iter() {
            limits.raise_to(name, q);
        }
    }

    (requests, limits)
}
