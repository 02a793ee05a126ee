//! Core system metrics collection implementation.

use crate::config::MonitorConfig;
use crate::error::{Result, SystemError};
use crate::metrics::{
    data::{Anomaly, SystemSnapshot},
    hwmon::{SensorDiscovery, SensorHandle},
    reader::{CounterReader, StatSample, SCALAR_RECORDS},
    store::{SampleStore, Slot},
    topology::Topology,
    traits::MetricsProvider,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Everything resolved once at startup.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub topology: Topology,
    /// `None` when no candidate sensor exists on this machine
    pub temperature: Option<SensorHandle>,
}

/// Resolve the core topology and sensors.
///
/// A missing topology root is fatal; a missing sensor is logged and
/// reported as absent for the rest of the run.
pub fn discover(config: &MonitorConfig) -> Result<Discovery> {
    config.validate()?;
    let topology = Topology::scan(&config.cpu_root)?;

    let temperature = match SensorDiscovery::new(&config.hwmon_root)
        .resolve(&config.temperature_subsystems, &config.temperature_fields)
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("CPU temperature will not be reported: {}", e);
            None
        }
    };

    Ok(Discovery {
        topology,
        temperature,
    })
}

/// Describe a failed read of `source` without repeating the path.
fn transient(source: &str, err: SystemError) -> Anomaly {
    let reason = match err {
        SystemError::TransientRead { reason, .. } => reason,
        other => other.to_string(),
    };
    Anomaly::TransientRead {
        source: source.to_string(),
        reason,
    }
}

/// Polls the kernel counter sources and keeps the state needed for deltas.
pub struct SystemCollector {
    reader: CounterReader,
    topology: Topology,
    temperature: Option<SensorHandle>,
    store: SampleStore,
    tick: u64,
    /// Sources whose last read failed, so repeats are not re-logged.
    failing: HashSet<String>,
}

impl SystemCollector {
    /// Run discovery and create a collector with an empty store.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let discovery = discover(config)?;
        Ok(Self::with_discovery(config, discovery))
    }

    /// Create a collector from an existing discovery result.
    pub fn with_discovery(config: &MonitorConfig, discovery: Discovery) -> Self {
        let Discovery {
            topology,
            temperature,
        } = discovery;
        Self {
            reader: CounterReader::new(config, &topology),
            store: SampleStore::new(topology.core_count()),
            topology,
            temperature,
            tick: 0,
            failing: HashSet::new(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn temperature_sensor(&self) -> Option<&SensorHandle> {
        self.temperature.as_ref()
    }

    /// Number of completed polls.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Record the outcome of one source for this tick.
    fn settle(&mut self, key: String, anomaly: Option<Anomaly>, anomalies: &mut Vec<Anomaly>) {
        match anomaly {
            Some(anomaly) => {
                if self.failing.insert(key) {
                    warn!("{}", anomaly);
                } else {
                    debug!("Still failing: {}", anomaly);
                }
                anomalies.push(anomaly);
            }
            None => {
                if self.failing.remove(&key) {
                    info!("{} recovered", key);
                }
            }
        }
    }

    fn record_name(&self, slot: Slot) -> String {
        match slot {
            Slot::Aggregate => "cpu".to_string(),
            Slot::Core(index) => format!("cpu{}", self.topology.core_ids()[index]),
        }
    }

    fn poll_times(&mut self, anomalies: &mut Vec<Anomaly>) {
        let stat = self.reader.stat_path().display().to_string();

        let sample = match self.reader.read_times() {
            Ok(sample) => {
                self.settle(stat.clone(), None, anomalies);
                sample
            }
            Err(e) => {
                let anomaly = transient(&stat, e);
                self.settle(stat, Some(anomaly), anomalies);
                self.store.mark_stale(Slot::Aggregate);
                for index in 0..self.store.core_count() {
                    self.store.mark_stale(Slot::Core(index));
                }
                self.store.mark_scalars_stale();
                return;
            }
        };

        let StatSample {
            aggregate,
            cores,
            scalars,
            malformed,
        } = sample;
        let malformed: HashMap<String, String> = malformed
            .into_iter()
            .map(|m| (m.record, m.reason))
            .collect();

        let slots = std::iter::once((Slot::Aggregate, aggregate))
            .chain(cores.into_iter().enumerate().map(|(i, t)| (Slot::Core(i), t)));
        for (slot, times) in slots {
            let record = self.record_name(slot);
            let key = format!("{}:{}", stat, record);
            let anomaly = match times {
                Some(times) => match self.store.advance(slot, times) {
                    Ok(_) => None,
                    Err(e) => Some(Anomaly::Arithmetic {
                        slot: record,
                        reason: e.to_string(),
                    }),
                },
                None => {
                    self.store.mark_stale(slot);
                    let reason = malformed
                        .get(&record)
                        .cloned()
                        .unwrap_or_else(|| "record unavailable".to_string());
                    Some(Anomaly::TransientRead {
                        source: key.clone(),
                        reason,
                    })
                }
            };
            self.settle(key, anomaly, anomalies);
        }

        self.store.apply_scalars(&scalars);
        for record in SCALAR_RECORDS {
            let key = format!("{}:{}", stat, record);
            let anomaly = malformed.get(record).map(|reason| Anomaly::TransientRead {
                source: key.clone(),
                reason: reason.clone(),
            });
            self.settle(key, anomaly, anomalies);
        }
    }

    fn poll_frequencies(&mut self, anomalies: &mut Vec<Anomaly>) {
        let mut frequencies = Vec::with_capacity(self.topology.core_count());
        for core in 0..self.topology.core_count() {
            let key = self
                .reader
                .frequency_path(core)
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| format!("frequency of core {}", core));
            match self.reader.read_core_frequency(core) {
                Ok(khz) => {
                    frequencies.push(khz);
                    self.settle(key, None, anomalies);
                }
                Err(e) => {
                    frequencies.push(0);
                    let anomaly = transient(&key, e);
                    self.settle(key, Some(anomaly), anomalies);
                }
            }
        }
        self.store.set_frequencies(frequencies);
    }

    fn poll_temperature(&mut self, anomalies: &mut Vec<Anomaly>) {
        let Some((key, reading)) = self
            .temperature
            .as_ref()
            .map(|handle| (handle.path.display().to_string(), handle.read_celsius()))
        else {
            return;
        };

        match reading {
            Ok(celsius) => {
                self.store.temperature_mut().update(celsius);
                self.settle(key, None, anomalies);
            }
            Err(e) => {
                self.store.temperature_mut().mark_stale();
                let anomaly = transient(&key, e);
                self.settle(key, Some(anomaly), anomalies);
            }
        }
    }

    fn poll_memory(&mut self, anomalies: &mut Vec<Anomaly>) {
        let key = self.reader.meminfo_path().display().to_string();
        match self.reader.read_memory() {
            Ok(memory) => {
                self.store.memory_mut().update(memory);
                self.settle(key, None, anomalies);
            }
            Err(e) => {
                self.store.memory_mut().mark_stale();
                let anomaly = transient(&key, e);
                self.settle(key, Some(anomaly), anomalies);
            }
        }
    }
}

impl MetricsProvider for SystemCollector {
    fn poll(&mut self) -> SystemSnapshot {
        self.tick += 1;
        let mut anomalies = Vec::new();

        self.poll_times(&mut anomalies);
        self.poll_frequencies(&mut anomalies);
        self.poll_temperature(&mut anomalies);
        self.poll_memory(&mut anomalies);

        let mut snapshot = self.store.to_snapshot();
        snapshot.tick = self.tick;
        snapshot.cpu.core_ids = self.topology.core_ids().to_vec();
        snapshot.temperature.sensor = self.temperature.as_ref().map(SensorHandle::label);
        snapshot.anomalies = anomalies;

        debug!(
            "Tick {} complete with {} anomalies",
            snapshot.tick,
            snapshot.anomalies.len()
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::Sampled;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const STAT_1: &str = "\
cpu  100 0 50 800 50 0 0 0 0 0
cpu0 60 0 30 400 20 0 0 0 0 0
cpu1 40 0 20 400 30 0 0 0 0 0
intr 1 2 3
ctxt 1000
btime 1700000000
processes 50
procs_running 2
procs_blocked 0
";

    const STAT_2: &str = "\
cpu  150 0 70 850 60 0 0 0 0 0
cpu0 90 0 40 420 25 0 0 0 0 0
cpu1 60 0 30 430 35 0 0 0 0 0
intr 1 2 3
ctxt 1500
btime 1700000000
processes 55
procs_running 1
procs_blocked 1
";

    fn fixture(root: &Path) -> MonitorConfig {
        let config = MonitorConfig::with_root(root);
        fs::create_dir_all(root.join("proc")).unwrap();
        fs::write(&config.proc_stat_path, STAT_1).unwrap();
        fs::write(
            &config.meminfo_path,
            "MemTotal: 1000 kB\nMemFree: 200 kB\nMemAvailable: 500 kB\n",
        )
        .unwrap();
        for (id, khz) in [(0, "2400000\n"), (1, "1800000\n")] {
            let dir = config.cpu_root.join(format!("cpu{}/cpufreq", id));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("scaling_cur_freq"), khz).unwrap();
        }
        let hwmon = config.hwmon_root.join("hwmon0");
        fs::create_dir_all(&hwmon).unwrap();
        fs::write(hwmon.join("name"), "coretemp\n").unwrap();
        fs::write(hwmon.join("temp1_input"), "48500\n").unwrap();
        config
    }

    #[test]
    fn test_first_tick_is_baseline_only() {
        let tmp = tempdir().unwrap();
        let config = fixture(tmp.path());
        let mut collector = SystemCollector::new(&config).unwrap();

        let snapshot = collector.poll();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.cpu.aggregate.value, Sampled::NotSampled);
        assert!(snapshot.anomalies.is_empty(), "{:?}", snapshot.anomalies);
        assert_eq!(snapshot.cpu.frequency_khz, vec![2_400_000, 1_800_000]);
        assert_eq!(snapshot.temperature.sensor.as_deref(), Some("coretemp/temp1_input"));
        assert_eq!(snapshot.temperature.cpu_celsius.known(), Some(&48.5));
        assert_eq!(snapshot.counters.context_switches.known(), Some(&1000));
    }

    #[test]
    fn test_second_tick_reports_usage() {
        let tmp = tempdir().unwrap();
        let config = fixture(tmp.path());
        let mut collector = SystemCollector::new(&config).unwrap();
        collector.poll();

        fs::write(&config.proc_stat_path, STAT_2).unwrap();
        let snapshot = collector.poll();

        let total = snapshot.cpu.aggregate.known().unwrap().total;
        assert!((total - 70.0 / 130.0).abs() < 1e-6);
        let core0 = snapshot.cpu.core_usage[0].known().unwrap();
        // 30 user + 10 system busy out of 65 ticks
        assert!((core0.total - 40.0 / 65.0).abs() < 1e-6);
        assert_eq!(snapshot.counters.processes_blocked.known(), Some(&1));
    }

    #[test]
    fn test_unreadable_sources_keep_last_values() {
        let tmp = tempdir().unwrap();
        let config = fixture(tmp.path());
        let mut collector = SystemCollector::new(&config).unwrap();
        collector.poll();
        fs::write(&config.proc_stat_path, STAT_2).unwrap();
        let before = collector.poll();

        fs::remove_file(&config.proc_stat_path).unwrap();
        fs::remove_file(tmp.path().join("sys/class/hwmon/hwmon0/temp1_input")).unwrap();
        let after = collector.poll();

        assert_eq!(after.cpu.aggregate.value, before.cpu.aggregate.value);
        assert!(after.cpu.aggregate.stale);
        assert!(after.cpu.core_usage.iter().all(|r| r.stale));
        assert_eq!(after.temperature.cpu_celsius.known(), Some(&48.5));
        assert!(after.temperature.cpu_celsius.stale);
        assert_eq!(after.anomalies.len(), 2);
        assert!(after
            .anomalies
            .iter()
            .all(|a| matches!(a, Anomaly::TransientRead { .. })));
    }

    #[test]
    fn test_missing_sensor_is_not_fatal() {
        let tmp = tempdir().unwrap();
        let config = fixture(tmp.path()).with_temperature_subsystems(["k10temp"]);
        let mut collector = SystemCollector::new(&config).unwrap();
        assert!(collector.temperature_sensor().is_none());

        let snapshot = collector.poll();
        assert_eq!(snapshot.temperature.sensor, None);
        assert_eq!(snapshot.temperature.cpu_celsius.value, Sampled::NotSampled);
    }

    #[test]
    fn test_missing_topology_is_fatal() {
        let tmp = tempdir().unwrap();
        let config = MonitorConfig::with_root(tmp.path());
        assert!(SystemCollector::new(&config).is_err());
    }
}
