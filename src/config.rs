//! Counter source configuration.

use crate::error::{Result, SystemError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Locations of the kernel counter sources and sensor candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Aggregate and per-core time counters
    pub proc_stat_path: PathBuf,
    /// Memory totals
    pub meminfo_path: PathBuf,
    /// CPU topology root containing `cpu<N>` entries
    pub cpu_root: PathBuf,
    /// Frequency file relative to each `cpu<N>` directory
    pub frequency_suffix: PathBuf,
    /// Hardware-monitoring tree containing `hwmon<N>` subsystems
    pub hwmon_root: PathBuf,
    /// Temperature subsystem names, most preferred first
    pub temperature_subsystems: Vec<String>,
    /// Temperature field names, most preferred first
    pub temperature_fields: Vec<String>,
    /// Polling interval in milliseconds
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            proc_stat_path: PathBuf::from("/proc/stat"),
            meminfo_path: PathBuf::from("/proc/meminfo"),
            cpu_root: PathBuf::from("/sys/devices/system/cpu"),
            frequency_suffix: PathBuf::from("cpufreq/scaling_cur_freq"),
            hwmon_root: PathBuf::from("/sys/class/hwmon"),
            temperature_subsystems: ["k10temp", "coretemp", "cpu_thermal", "zenpower"]
                .into_iter()
                .map(String::from)
                .collect(),
            temperature_fields: vec!["temp1_input".to_string()],
            interval_ms: crate::DEFAULT_INTERVAL_MS,
        }
    }
}

impl MonitorConfig {
    /// Create a configuration reading every source below `root` instead of `/`.
    ///
    /// Useful for replaying captured trees or for tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let defaults = Self::default();
        Self {
            proc_stat_path: root.join("proc/stat"),
            meminfo_path: root.join("proc/meminfo"),
            cpu_root: root.join("sys/devices/system/cpu"),
            hwmon_root: root.join("sys/class/hwmon"),
            ..defaults
        }
    }

    /// Set the time-counter source path.
    pub fn with_proc_stat_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_stat_path = path.into();
        self
    }

    /// Set the meminfo source path.
    pub fn with_meminfo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.meminfo_path = path.into();
        self
    }

    /// Set the CPU topology root.
    pub fn with_cpu_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.cpu_root = path.into();
        self
    }

    /// Set the hardware-monitoring root.
    pub fn with_hwmon_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.hwmon_root = path.into();
        self
    }

    /// Replace the temperature subsystem candidates.
    pub fn with_temperature_subsystems<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.temperature_subsystems = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the temperature field candidates.
    pub fn with_temperature_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.temperature_fields = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the polling interval.
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Check the configuration before discovery.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(SystemError::config_error("polling interval must be non-zero"));
        }
        if self.temperature_subsystems.is_empty() {
            return Err(SystemError::config_error(
                "at least one temperature subsystem candidate is required",
            ));
        }
        if self.temperature_fields.is_empty() {
            return Err(SystemError::config_error(
                "at least one temperature field candidate is required",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_rebases_sources() {
        let config = MonitorConfig::with_root("/tmp/capture");
        assert_eq!(config.proc_stat_path, PathBuf::from("/tmp/capture/proc/stat"));
        assert_eq!(
            config.cpu_root,
            PathBuf::from("/tmp/capture/sys/devices/system/cpu")
        );
        assert_eq!(config.frequency_suffix, PathBuf::from("cpufreq/scaling_cur_freq"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = MonitorConfig::default().with_interval_ms(0);
        assert!(matches!(config.validate(), Err(SystemError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_candidates() {
        let empty: [&str; 0] = [];
        let config = MonitorConfig::default().with_temperature_fields(empty);
        assert!(config.validate().is_err());
        assert!(MonitorConfig::default().validate().is_ok());
    }
}
