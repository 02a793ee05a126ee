//! Data structures for sampled counters and derived metrics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable 0-based position of a logical core in the discovered topology.
pub type CoreIndex = usize;

/// One CPU accounting record from the time-counter source.
///
/// All values are cumulative clock ticks (USER_HZ, usually 1/100 s) since
/// boot, for one core or for the system aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreTimes {
    /// Normal processing in user mode
    pub user: u64,
    /// Niced processes in user mode
    pub nice: u64,
    /// Kernel mode
    pub system: u64,
    /// Idle
    pub idle: u64,
    /// Waiting for I/O to complete, counted as idle
    pub iowait: u64,
    /// Servicing hardware interrupts
    pub irq: u64,
    /// Servicing software interrupts
    pub softirq: u64,
    /// Stolen by other systems in a virtualized environment
    pub steal: u64,
    /// Running a guest under the control of the kernel
    pub guest: u64,
}

impl CoreTimes {
    /// Ticks spent idle, including I/O wait.
    pub fn idle_time(&self) -> u64 {
        self.idle.wrapping_add(self.iowait)
    }

    /// Ticks spent doing work. Guest time is already folded into `user`.
    pub fn non_idle_time(&self) -> u64 {
        self.user
            .wrapping_add(self.nice)
            .wrapping_add(self.system)
            .wrapping_add(self.irq)
            .wrapping_add(self.softirq)
            .wrapping_add(self.steal)
    }

    /// All accounted ticks.
    pub fn total_time(&self) -> u64 {
        self.idle_time().wrapping_add(self.non_idle_time())
    }
}

/// Utilization ratios for one poll interval, nominally in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageDetails {
    /// Share of the interval not spent idle
    pub total: f32,
    /// I/O wait share
    pub io: f32,
    /// User mode share
    pub user: f32,
    /// Kernel mode share
    pub system: f32,
    /// Software interrupt share
    pub soft_irq: f32,
    /// Hardware interrupt share
    pub hard_irq: f32,
}

impl UsageDetails {
    /// Value reported when the interval carries no usable information.
    pub const INDETERMINATE: UsageDetails = UsageDetails {
        total: 0.0,
        io: 0.0,
        user: 0.0,
        system: 0.0,
        soft_irq: 0.0,
        hard_irq: 0.0,
    };

    /// Sum of the busy categories broken out individually.
    ///
    /// Nice and steal time count toward `total` but are not tracked here, so
    /// this never exceeds `total` for monotonic counters.
    pub fn tracked_busy(&self) -> f32 {
        self.user + self.system + self.hard_irq + self.soft_irq
    }
}

/// Two-state value: nothing read yet, or the last value read successfully.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Sampled<T> {
    NotSampled,
    Known(T),
}

impl<T> Default for Sampled<T> {
    fn default() -> Self {
        Sampled::NotSampled
    }
}

impl<T> Sampled<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Sampled::Known(value) => Some(value),
            Sampled::NotSampled => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Sampled::Known(_))
    }
}

/// A reported field: its last-known value and whether the latest tick
/// failed to refresh it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading<T> {
    pub value: Sampled<T>,
    pub stale: bool,
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Self {
            value: Sampled::NotSampled,
            stale: false,
        }
    }
}

impl<T> Reading<T> {
    /// Record a successful read.
    pub fn update(&mut self, value: T) {
        self.value = Sampled::Known(value);
        self.stale = false;
    }

    /// Keep the last-known value and flag it.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn known(&self) -> Option<&T> {
        self.value.known()
    }
}

/// Single-value scalar lines of the time-counter source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelCounters {
    /// Context switches since boot
    pub context_switches: Reading<u64>,
    /// Boot time, seconds since the Unix epoch
    pub boot_time: Reading<u64>,
    /// Processes (forks) created since boot
    pub processes_created: Reading<u64>,
    /// Processes currently runnable
    pub processes_running: Reading<u64>,
    /// Processes currently blocked on I/O
    pub processes_blocked: Reading<u64>,
}

/// CPU utilization and frequency for the aggregate and every core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuInfo {
    /// Number of logical cores fixed at discovery
    pub cores: u32,
    /// Kernel core ids, in `CoreIndex` order
    pub core_ids: Vec<u32>,
    /// System-wide utilization
    pub aggregate: Reading<UsageDetails>,
    /// Per-core utilization, indexed by `CoreIndex`
    pub core_usage: Vec<Reading<UsageDetails>>,
    /// Per-core current frequency in kHz, 0 when unknown
    pub frequency_khz: Vec<u64>,
}

impl CpuInfo {
    /// Frequency of `core` in MHz, or `None` if unknown.
    pub fn frequency_mhz(&self, core: CoreIndex) -> Option<f64> {
        match self.frequency_khz.get(core) {
            Some(&khz) if khz > 0 => Some(khz as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Memory totals in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
}

/// Temperature sensor reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemperatureInfo {
    /// `subsystem/field` of the resolved sensor, `None` if unavailable
    pub sensor: Option<String>,
    /// CPU temperature in Celsius
    pub cpu_celsius: Reading<f32>,
}

/// A per-tick problem that did not abort the poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// A source could not be read or parsed; its fields kept their last value.
    TransientRead { source: String, reason: String },
    /// The counter difference for `slot` was zero or negative.
    Arithmetic { slot: String, reason: String },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::TransientRead { source, reason } => {
                write!(f, "read of {} failed: {}", source, reason)
            }
            Anomaly::Arithmetic { slot, reason } => write!(f, "{}: {}", slot, reason),
        }
    }
}

/// Everything derived from one poll tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// When this snapshot was taken (Unix timestamp in milliseconds)
    pub timestamp: u64,
    /// 1-based tick counter; tick 1 only establishes the baseline
    pub tick: u64,
    pub cpu: CpuInfo,
    pub temperature: TemperatureInfo,
    pub memory: Reading<MemoryInfo>,
    pub counters: KernelCounters,
    /// Problems encountered during this tick
    pub anomalies: Vec<Anomaly>,
}

impl SystemSnapshot {
    /// Create an empty snapshot stamped with the current time.
    pub fn new() -> Self {
        Self {
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_times_sums() {
        let times = CoreTimes {
            user: 100,
            nice: 5,
            system: 50,
            idle: 800,
            iowait: 50,
            irq: 3,
            softirq: 2,
            steal: 1,
            guest: 40,
        };
        assert_eq!(times.idle_time(), 850);
        assert_eq!(times.non_idle_time(), 161);
        assert_eq!(times.total_time(), 1011);
    }

    #[test]
    fn test_reading_retains_value_when_stale() {
        let mut reading = Reading::default();
        assert_eq!(reading.known(), None);

        reading.update(42u64);
        reading.mark_stale();
        assert_eq!(reading.known(), Some(&42));
        assert!(reading.stale);

        reading.update(43);
        assert!(!reading.stale);
    }

    #[test]
    fn test_sampled_serialization() {
        let json = serde_json::to_string(&Sampled::Known(7u64)).unwrap();
        assert_eq!(json, r#"{"state":"known","value":7}"#);
        let json = serde_json::to_string(&Sampled::<u64>::NotSampled).unwrap();
        assert_eq!(json, r#"{"state":"not_sampled"}"#);
    }

    #[test]
    fn test_frequency_mhz() {
        let cpu = CpuInfo {
            frequency_khz: vec![3_600_000, 0],
            ..Default::default()
        };
        assert_eq!(cpu.frequency_mhz(0), Some(3600.0));
        assert_eq!(cpu.frequency_mhz(1), None);
        assert_eq!(cpu.frequency_mhz(5), None);
    }
}
