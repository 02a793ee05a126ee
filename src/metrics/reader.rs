//! Readers for the kernel's text counter sources.
//!
//! Every read opens the source fresh: procfs and sysfs regenerate their
//! content on each open, so a long-lived handle would keep returning the
//! first snapshot.

use crate::config::MonitorConfig;
use crate::error::{Result, SystemError};
use crate::metrics::data::{CoreIndex, CoreTimes, MemoryInfo};
use crate::metrics::topology::{parse_core_id, Topology};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Minimum tokens in a CPU line: the name plus nine counters.
const CPU_LINE_MIN_FIELDS: usize = 10;

/// Single-value lines of the time-counter source. `None` means the line was
/// missing or its value was not numeric this tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalarSample {
    pub context_switches: Option<u64>,
    pub boot_time: Option<u64>,
    pub processes_created: Option<u64>,
    pub processes_running: Option<u64>,
    pub processes_blocked: Option<u64>,
}

/// A record that could not be used this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    /// Record name, e.g. `cpu3` or `ctxt`
    pub record: String,
    pub reason: String,
}

/// One parse of the time-counter source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatSample {
    /// System-wide counters, `None` if the line was unusable
    pub aggregate: Option<CoreTimes>,
    /// Per-core counters indexed by `CoreIndex`, `None` where unusable
    pub cores: Vec<Option<CoreTimes>>,
    pub scalars: ScalarSample,
    pub malformed: Vec<MalformedRecord>,
}

impl ScalarSample {
    /// Field values in `SCALAR_RECORDS` order.
    fn values(&self) -> [Option<u64>; 5] {
        [
            self.context_switches,
            self.boot_time,
            self.processes_created,
            self.processes_running,
            self.processes_blocked,
        ]
    }

    fn slot_mut(&mut self, record: &str) -> Option<&mut Option<u64>> {
        match record {
            "ctxt" => Some(&mut self.context_switches),
            "btime" => Some(&mut self.boot_time),
            "processes" => Some(&mut self.processes_created),
            "procs_running" => Some(&mut self.processes_running),
            "procs_blocked" => Some(&mut self.processes_blocked),
            _ => None,
        }
    }
}

impl StatSample {
    fn reject(&mut self, record: &str, reason: impl Into<String>) {
        self.malformed.push(MalformedRecord {
            record: record.to_string(),
            reason: reason.into(),
        });
    }
}

/// Parse a `cpu` or `cpuN` line.
///
/// Lines with fewer than ten tokens, or a non-numeric counter, yield `None`.
/// Trailing counters newer kernels append (`guest_nice`) are ignored.
pub fn parse_core_times(line: &str) -> Option<CoreTimes> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < CPU_LINE_MIN_FIELDS {
        return None;
    }

    let mut values = [0u64; 9];
    for (value, field) in values.iter_mut().zip(&fields[1..CPU_LINE_MIN_FIELDS]) {
        *value = field.parse().ok()?;
    }
    let [user, nice, system, idle, iowait, irq, softirq, steal, guest] = values;

    Some(CoreTimes {
        user,
        nice,
        system,
        idle,
        iowait,
        irq,
        softirq,
        steal,
        guest,
    })
}

/// Record names of the scalar lines, in source order.
pub const SCALAR_RECORDS: [&str; 5] = ["ctxt", "btime", "processes", "procs_running", "procs_blocked"];

/// Parse the whole time-counter source against a fixed topology.
///
/// Per-core lines are matched to `CoreIndex` by their kernel id. The
/// interrupt and softirq lines are skipped. Problems are collected in
/// `malformed` instead of failing the parse.
pub fn parse_stat(content: &str, topology: &Topology) -> StatSample {
    let mut sample = StatSample {
        cores: vec![None; topology.core_count()],
        ..Default::default()
    };

    for line in content.lines() {
        let Some(name) = line.split_whitespace().next() else {
            continue;
        };

        if name == "cpu" {
            sample.aggregate = parse_core_times(line);
            if sample.aggregate.is_none() {
                sample.reject(name, "expected at least 10 numeric fields");
            }
            continue;
        }

        if let Some(id) = parse_core_id(name) {
            match topology.index_of(id) {
                Some(index) => {
                    sample.cores[index] = parse_core_times(line);
                    if sample.cores[index].is_none() {
                        sample.reject(name, "expected at least 10 numeric fields");
                    }
                }
                None => debug!("Ignoring {} which was not present at discovery", name),
            }
            continue;
        }

        let value = line
            .split_whitespace()
            .nth(1)
            .and_then(|v| v.parse::<u64>().ok());
        let Some(slot) = sample.scalars.slot_mut(name) else {
            continue;
        };
        *slot = value;
        if value.is_none() {
            sample.reject(name, "expected a single numeric value");
        }
    }

    if sample.aggregate.is_none() && !sample.malformed.iter().any(|m| m.record == "cpu") {
        sample.reject("cpu", "aggregate line missing");
    }
    for (index, id) in topology.core_ids().iter().enumerate() {
        let record = format!("cpu{}", id);
        if sample.cores[index].is_none() && !sample.malformed.iter().any(|m| m.record == record) {
            sample.reject(&record, "core line missing");
        }
    }
    for (record, value) in SCALAR_RECORDS.into_iter().zip(sample.scalars.values()) {
        if value.is_none() && !sample.malformed.iter().any(|m| m.record == record) {
            sample.reject(record, "line missing");
        }
    }

    sample
}

/// Parse `MemTotal`, `MemFree` and `MemAvailable` (kB) from meminfo content.
pub fn parse_meminfo(content: &str) -> Result<MemoryInfo> {
    let mut total = None;
    let mut free = None;
    let mut available = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key {
            "MemTotal" => &mut total,
            "MemFree" => &mut free,
            "MemAvailable" => &mut available,
            _ => continue,
        };
        *slot = value
            .split_whitespace()
            .next()
            .and_then(|kb| kb.parse::<u64>().ok());
    }

    match (total, free, available) {
        (Some(total_kb), Some(free_kb), Some(available_kb)) => Ok(MemoryInfo {
            total_kb,
            free_kb,
            available_kb,
        }),
        _ => Err(SystemError::parse_error(
            "meminfo is missing MemTotal, MemFree or MemAvailable",
        )),
    }
}

/// Read a small value file and drop its trailing line terminator.
pub(crate) fn read_value_file(path: &Path) -> io::Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .trim_end_matches(|c| c == '\n' || c == '\r')
        .to_string())
}

/// Reads the per-tick counter sources located at discovery.
#[derive(Debug, Clone)]
pub struct CounterReader {
    stat_path: PathBuf,
    meminfo_path: PathBuf,
    frequency_files: Vec<PathBuf>,
    topology: Topology,
}

impl CounterReader {
    pub fn new(config: &MonitorConfig, topology: &Topology) -> Self {
        let frequency_files = (0..topology.core_count())
            .filter_map(|index| topology.core_dir(index))
            .map(|dir| dir.join(&config.frequency_suffix))
            .collect();

        Self {
            stat_path: config.proc_stat_path.clone(),
            meminfo_path: config.meminfo_path.clone(),
            frequency_files,
            topology: topology.clone(),
        }
    }

    /// Read aggregate and per-core time counters plus the scalar lines.
    ///
    /// Only a failure to read the source at all is an error; malformed lines
    /// are reported in [`StatSample::malformed`].
    pub fn read_times(&self) -> Result<StatSample> {
        let content = fs::read_to_string(&self.stat_path)
            .map_err(|e| SystemError::transient_read(&self.stat_path, e))?;
        Ok(parse_stat(&content, &self.topology))
    }

    /// Current frequency of `core` in kHz.
    pub fn read_core_frequency(&self, core: CoreIndex) -> Result<u64> {
        let path = self
            .frequency_files
            .get(core)
            .ok_or_else(|| SystemError::parse_error(format!("no core with index {}", core)))?;
        let raw = read_value_file(path).map_err(|e| SystemError::transient_read(path, e))?;
        raw.trim().parse::<u64>().map_err(|_| {
            SystemError::transient_read(path, format!("non-numeric frequency {:?}", raw))
        })
    }

    /// Current frequency of every core in kHz, 0 for cores that could not be read.
    pub fn read_core_frequencies(&self) -> Vec<u64> {
        (0..self.frequency_files.len())
            .map(|core| self.read_core_frequency(core).unwrap_or(0))
            .collect()
    }

    pub fn read_memory(&self) -> Result<MemoryInfo> {
        let content = fs::read_to_string(&self.meminfo_path)
            .map_err(|e| SystemError::transient_read(&self.meminfo_path, e))?;
        parse_meminfo(&content)
            .map_err(|e| SystemError::transient_read(&self.meminfo_path, e))
    }

    pub fn stat_path(&self) -> &Path {
        &self.stat_path
    }

    pub fn meminfo_path(&self) -> &Path {
        &self.meminfo_path
    }

    /// Frequency file for `core`, if the core exists.
    pub fn frequency_path(&self, core: CoreIndex) -> Option<&Path> {
        self.frequency_files.get(core).map(PathBuf::as_path)
    }
}
