use std::time::Duration;

/// How long a locally recorded reservation is trusted to be invisible to the monitor
pub const DEFAULT_REQUEST_WINDOW: Duration = Duration::from_secs(10);
const DEFAULT_PORT: u16 = 8090;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    NvidiaSmi,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub window: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            window: DEFAULT_REQUEST_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub provider: ProviderKind,
    /// `id:name:path:total_bytes;...`, only read by the fixed provider
    pub fixed_devices: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tracker: TrackerConfig::default(),
            provider: ProviderKind::NvidiaSmi,
            fixed_devices: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or invalid values keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();

        if let Some(raw) = lookup("GPU_REQUEST_WINDOW_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.tracker.window = Duration::from_secs(secs),
                Err(_) => tracing::warn!(
                    "Ignoring GPU_REQUEST_WINDOW_SECS={:?}, using {:?}",
                    raw,
                    config.tracker.window
                ),
            }
        }

        if let Some(raw) = lookup("GPU_PROVIDER") {
            match raw.trim() {
                "nvidia-smi" | "nvidia" => config.provider = ProviderKind::NvidiaSmi,
                "fixed" => config.provider = ProviderKind::Fixed,
                other => tracing::warn!("Unknown GPU_PROVIDER {:?}, using nvidia-smi", other),
            }
        }

        if let Some(raw) = lookup("GPU_FIXED_DEVICES") {
            config.fixed_devices = raw;
        }

        if let Some(raw) = lookup("PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!("Ignoring PORT={:?}, using {}", raw, config.port),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.tracker.window, Duration::from_secs(10));
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("GPU_REQUEST_WINDOW_SECS", "30"),
            ("GPU_PROVIDER", "fixed"),
            ("GPU_FIXED_DEVICES", "GPU-0:K80:/dev/nvidia0:1000"),
            ("PORT", "9000"),
        ]));
        assert_eq!(config.tracker.window, Duration::from_secs(30));
        assert_eq!(config.provider, ProviderKind::Fixed);
        assert_eq!(config.fixed_devices, "GPU-0:K80:/dev/nvidia0:1000");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("GPU_REQUEST_WINDOW_SECS", "ten"),
            ("GPU_PROVIDER", "amd"),
            ("PORT", "99999"),
        ]));
        assert_eq!(config, Config::default());
    }
}
