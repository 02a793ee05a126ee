//! Previous raw samples and last-known derived values across ticks.

use crate::metrics::data::{
    CoreIndex, CoreTimes, CpuInfo, KernelCounters, MemoryInfo, Reading, SystemSnapshot,
    TemperatureInfo, UsageDetails,
};
use crate::metrics::reader::ScalarSample;
use crate::metrics::usage::{calculate_usage, ArithmeticAnomaly};
use std::fmt;

/// Which usage record a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Aggregate,
    Core(CoreIndex),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Aggregate => write!(f, "cpu"),
            Slot::Core(index) => write!(f, "core {}", index),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct UsageSlot {
    /// Baseline for the next diff; zero until the first sample arrives.
    previous: CoreTimes,
    advances: u64,
    usage: Reading<UsageDetails>,
}

/// Mutable state carried between ticks.
///
/// A derived usage value is only published once it comes from a diff of two
/// real samples; the first `advance` for a slot diffs against the zero
/// baseline and is kept private.
#[derive(Debug, Clone)]
pub struct SampleStore {
    aggregate: UsageSlot,
    cores: Vec<UsageSlot>,
    counters: KernelCounters,
    memory: Reading<MemoryInfo>,
    temperature: Reading<f32>,
    frequency_khz: Vec<u64>,
}

impl SampleStore {
    /// Create an empty store for a fixed number of cores.
    pub fn new(core_count: usize) -> Self {
        Self {
            aggregate: UsageSlot::default(),
            cores: vec![UsageSlot::default(); core_count],
            counters: KernelCounters::default(),
            memory: Reading::default(),
            temperature: Reading::default(),
            frequency_khz: vec![0; core_count],
        }
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut UsageSlot {
        match slot {
            Slot::Aggregate => &mut self.aggregate,
            Slot::Core(index) => &mut self.cores[index],
        }
    }

    fn slot(&self, slot: Slot) -> Option<&UsageSlot> {
        match slot {
            Slot::Aggregate => Some(&self.aggregate),
            Slot::Core(index) => self.cores.get(index),
        }
    }

    /// Diff `sample` against the stored baseline, then make it the new baseline.
    ///
    /// On an arithmetic anomaly the published value becomes
    /// [`UsageDetails::INDETERMINATE`] flagged stale, and the anomaly is
    /// returned so the caller can report it.
    ///
    /// # Panics
    ///
    /// Panics if `slot` names a core outside the discovered topology.
    pub fn advance(
        &mut self,
        slot: Slot,
        sample: CoreTimes,
    ) -> Result<UsageDetails, ArithmeticAnomaly> {
        let entry = self.slot_mut(slot);
        let outcome = calculate_usage(&entry.previous, &sample);
        entry.previous = sample;
        entry.advances += 1;

        if entry.advances > 1 {
            entry.usage.update(outcome.unwrap_or(UsageDetails::INDETERMINATE));
            if outcome.is_err() {
                entry.usage.mark_stale();
            }
        }
        outcome
    }

    /// Keep the slot's last-known usage but flag it as not refreshed.
    pub fn mark_stale(&mut self, slot: Slot) {
        self.slot_mut(slot).usage.mark_stale();
    }

    /// Published usage for `slot`.
    pub fn usage(&self, slot: Slot) -> Option<&Reading<UsageDetails>> {
        self.slot(slot).map(|s| &s.usage)
    }

    /// Update scalar counters; fields missing from `scalars` keep their value.
    pub fn apply_scalars(&mut self, scalars: &ScalarSample) {
        let fields = [
            (&mut self.counters.context_switches, scalars.context_switches),
            (&mut self.counters.boot_time, scalars.boot_time),
            (&mut self.counters.processes_created, scalars.processes_created),
            (&mut self.counters.processes_running, scalars.processes_running),
            (&mut self.counters.processes_blocked, scalars.processes_blocked),
        ];
        for (reading, value) in fields {
            match value {
                Some(value) => reading.update(value),
                None => reading.mark_stale(),
            }
        }
    }

    /// Flag every scalar counter as not refreshed.
    pub fn mark_scalars_stale(&mut self) {
        self.apply_scalars(&ScalarSample::default());
    }

    pub fn counters(&self) -> &KernelCounters {
        &self.counters
    }

    pub fn memory_mut(&mut self) -> &mut Reading<MemoryInfo> {
        &mut self.memory
    }

    pub fn temperature_mut(&mut self) -> &mut Reading<f32> {
        &mut self.temperature
    }

    /// Store one tick of frequency readings, 0 for unknown.
    pub fn set_frequencies(&mut self, frequency_khz: Vec<u64>) {
        self.frequency_khz = frequency_khz;
    }

    /// Copy the current state into a fresh snapshot.
    pub fn to_snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            cpu: CpuInfo {
                cores: self.cores.len() as u32,
                aggregate: self.aggregate.usage,
                core_usage: self.cores.iter().map(|slot| slot.usage).collect(),
                frequency_khz: self.frequency_khz.clone(),
                ..Default::default()
            },
            temperature: TemperatureInfo {
                sensor: None,
                cpu_celsius: self.temperature,
            },
            memory: self.memory,
            counters: self.counters.clone(),
            ..SystemSnapshot::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::Sampled;

    fn times(user: u64, idle: u64) -> CoreTimes {
        CoreTimes {
            user,
            idle,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_advance_is_not_published() {
        let mut store = SampleStore::new(1);
        assert!(store.advance(Slot::Core(0), times(100, 900)).is_ok());
        assert_eq!(
            store.usage(Slot::Core(0)).unwrap().value,
            Sampled::NotSampled
        );

        let usage = store.advance(Slot::Core(0), times(150, 950)).unwrap();
        assert!((usage.total - 0.5).abs() < 1e-6);
        assert_eq!(
            store.usage(Slot::Core(0)).unwrap().known(),
            Some(&usage)
        );
    }

    #[test]
    fn test_anomaly_publishes_indeterminate() {
        let mut store = SampleStore::new(0);
        store.advance(Slot::Aggregate, times(100, 900)).unwrap();
        store.advance(Slot::Aggregate, times(150, 950)).unwrap();

        let outcome = store.advance(Slot::Aggregate, times(150, 950));
        assert_eq!(outcome, Err(ArithmeticAnomaly::ZeroElapsed));
        let reading = store.usage(Slot::Aggregate).unwrap();
        assert_eq!(reading.known(), Some(&UsageDetails::INDETERMINATE));
        assert!(reading.stale);

        // the reset sample becomes the new baseline
        assert!(store.advance(Slot::Aggregate, times(10, 20)).is_err());
        let usage = store.advance(Slot::Aggregate, times(20, 30)).unwrap();
        assert!((usage.total - 0.5).abs() < 1e-6);
        assert!(!store.usage(Slot::Aggregate).unwrap().stale);
    }

    #[test]
    fn test_stale_slot_keeps_value() {
        let mut store = SampleStore::new(2);
        store.advance(Slot::Core(1), times(0, 0)).unwrap_err();
        let usage = store.advance(Slot::Core(1), times(10, 30)).unwrap();

        store.mark_stale(Slot::Core(1));
        let reading = store.usage(Slot::Core(1)).unwrap();
        assert_eq!(reading.known(), Some(&usage));
        assert!(reading.stale);
        assert!(store.usage(Slot::Core(2)).is_none());
    }

    #[test]
    fn test_apply_scalars_retains_missing_fields() {
        let mut store = SampleStore::new(0);
        store.apply_scalars(&ScalarSample {
            context_switches: Some(10),
            boot_time: Some(1_700_000_000),
            processes_created: Some(5),
            processes_running: Some(1),
            processes_blocked: Some(0),
        });
        store.apply_scalars(&ScalarSample {
            context_switches: None,
            processes_created: Some(6),
            ..Default::default()
        });

        let counters = store.counters();
        assert_eq!(counters.context_switches.known(), Some(&10));
        assert!(counters.context_switches.stale);
        assert_eq!(counters.processes_created.known(), Some(&6));
        assert!(!counters.processes_created.stale);
    }

    #[test]
    fn test_snapshot_shape() {
        let mut store = SampleStore::new(3);
        store.set_frequencies(vec![1_000, 0, 2_000]);
        let snapshot = store.to_snapshot();
        assert_eq!(snapshot.cpu.cores, 3);
        assert_eq!(snapshot.cpu.core_usage.len(), 3);
        assert_eq!(snapshot.cpu.frequency_khz, vec![1_000, 0, 2_000]);
        assert!(snapshot.timestamp > 0);
    }
}
