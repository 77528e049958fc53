use std::path::{Path, PathBuf};
use std::process::Command;

use which::which;

use super::{DeviceId, DeviceInfoProvider, DeviceUsage, StaticDeviceInfo};
use crate::error::ProviderError;

const MIB: u64 = 1024 * 1024;

/// NVIDIA GPUs via nvidia-smi subprocess
pub struct NvidiaSmiProvider {
    binary: PathBuf,
}

impl NvidiaSmiProvider {
    pub fn detect() -> Result<Self, ProviderError> {
        let binary = which("nvidia-smi")
            .map_err(|_| ProviderError::Unavailable("nvidia-smi not found in PATH".into()))?;
        Ok(NvidiaSmiProvider { binary })
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        NvidiaSmiProvider {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn query(&self, fields: &str) -> Result<String, ProviderError> {
        let output = Command::new(&self.binary)
            .arg(format!("--query-gpu={fields}"))
            .arg("--format=csv,noheader,nounits")
            .output()?;

        if !output.status.success() {
            return Err(ProviderError::Command {
                command: format!("nvidia-smi --query-gpu={fields}"),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DeviceInfoProvider for NvidiaSmiProvider {
    fn fetch_static_info(&self) -> Result<Vec<StaticDeviceInfo>, ProviderError> {
        parse_static_info(&self.query("index,uuid,name,memory.total")?)
    }

    fn fetch_usage(&self) -> Result<Vec<DeviceUsage>, ProviderError> {
        parse_usage(&self.query("uuid,memory.used")?)
    }
}

fn split_fields(line: &str, expected: usize) -> Result<Vec<&str>, ProviderError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != expected {
        return Err(ProviderError::Parse(format!(
            "expected {expected} fields, got {}: {line:?}",
            fields.len()
        )));
    }
    Ok(fields)
}

fn parse_mib(field: &str) -> Result<u64, ProviderError> {
    let mib = field
        .parse::<u64>()
        .map_err(|_| ProviderError::Parse(format!("not a MiB value: {field:?}")))?;
    mib.checked_mul(MIB)
        .ok_or_else(|| ProviderError::Parse(format!("MiB value out of range: {field:?}")))
}

/// Parses `index, uuid, name, memory.total` rows
pub(crate) fn parse_static_info(stdout: &str) -> Result<Vec<StaticDeviceInfo>, ProviderError> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            // GPU names never contain commas, so a plain split is enough
            let f = split_fields(line, 4)?;
            Ok(StaticDeviceInfo {
                id: DeviceId::new(f[1]),
                name: f[2].to_string(),
                path: format!("/dev/nvidia{}", f[0]),
                total_memory: parse_mib(f[3])?,
            })
        })
        .collect()
}

/// Parses `uuid, memory.used` rows
pub(crate) fn parse_usage(stdout: &str) -> Result<Vec<DeviceUsage>, ProviderError> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let f = split_fields(line, 2)?;
            Ok(DeviceUsage {
                id: DeviceId::new(f[0]),
                used_memory: parse_mib(f[1])?,
            })
        })
        .collect()
}
