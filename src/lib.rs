//! # cpu_vitals - Linux CPU counter sampling
//!
//! Samples the kernel's CPU time counters, per-core clock frequency and
//! thermal sensors on a fixed interval and derives normalized utilization
//! ratios from successive samples.
//!
//! ## Features
//!
//! - **Delta-based utilization**: total, user, system, I/O wait and
//!   interrupt shares for the aggregate and every logical core
//! - **Topology discovery**: contiguous core indices from the CPU sysfs tree
//! - **Sensor discovery**: hwmon subsystems matched by declared name across
//!   driver variants (`k10temp`, `coretemp`, `cpu_thermal`, ...)
//! - **Fault isolation**: a failed read keeps the last-known value, flags it
//!   stale and reports an anomaly without aborting the tick
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cpu_vitals::{MetricsProvider, MonitorConfig, SystemCollector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut collector = SystemCollector::new(&MonitorConfig::default())?;
//!
//!     // The first poll only establishes the baseline.
//!     collector.poll();
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!
//!     let snapshot = collector.poll();
//!     if let Some(usage) = snapshot.cpu.aggregate.known() {
//!         println!("CPU: {:.1}%", usage.total * 100.0);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;

// Re-export public API
pub use config::MonitorConfig;
pub use error::{Result, SystemError};
pub use metrics::{
    collector::{discover, Discovery, SystemCollector},
    data::{
        Anomaly, CoreIndex, CoreTimes, CpuInfo, KernelCounters, MemoryInfo, Reading, Sampled,
        SystemSnapshot, TemperatureInfo, UsageDetails,
    },
    hwmon::{SensorDiscovery, SensorHandle},
    topology::Topology,
    traits::MetricsProvider,
    usage::{calculate_usage, ArithmeticAnomaly},
};

/// The default polling interval in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 1000;
