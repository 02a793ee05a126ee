//! Delta-based utilization from two successive `CoreTimes` samples.

use crate::metrics::data::{CoreTimes, UsageDetails};

/// The counter difference between two samples cannot yield a ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArithmeticAnomaly {
    /// No ticks were accounted between the samples.
    #[error("no time elapsed between samples")]
    ZeroElapsed,
    /// A counter went backwards, usually after a counter reset.
    #[error("counter `{field}` went backwards by {} ticks", .delta.unsigned_abs())]
    CounterRegression { field: &'static str, delta: i64 },
}

/// Signed difference of two cumulative counters.
///
/// A counter that wrapped past `u64::MAX` still yields the small positive
/// difference; a counter that was reset yields a negative one.
fn delta(current: u64, previous: u64) -> i64 {
    current.wrapping_sub(previous) as i64
}

/// Compute utilization ratios for the interval between `previous` and `current`.
///
/// Pure: no I/O, same inputs give the same output. Returns
/// `ArithmeticAnomaly::ZeroElapsed` when the interval accounted no ticks and
/// `ArithmeticAnomaly::CounterRegression` when any counter decreased; callers
/// substitute [`UsageDetails::INDETERMINATE`] in both cases.
pub fn calculate_usage(
    previous: &CoreTimes,
    current: &CoreTimes,
) -> Result<UsageDetails, ArithmeticAnomaly> {
    let fields = [
        ("user", current.user, previous.user),
        ("nice", current.nice, previous.nice),
        ("system", current.system, previous.system),
        ("idle", current.idle, previous.idle),
        ("iowait", current.iowait, previous.iowait),
        ("irq", current.irq, previous.irq),
        ("softirq", current.softirq, previous.softirq),
        ("steal", current.steal, previous.steal),
    ];
    for (field, cur, prev) in fields {
        let d = delta(cur, prev);
        if d < 0 {
            return Err(ArithmeticAnomaly::CounterRegression { field, delta: d });
        }
    }

    let total_delta = delta(current.total_time(), previous.total_time());
    let idle_delta = delta(current.idle_time(), previous.idle_time());
    if total_delta == 0 {
        return Err(ArithmeticAnomaly::ZeroElapsed);
    }

    let total = total_delta as f64;
    let ratio = |d: i64| (d as f64 / total) as f32;

    Ok(UsageDetails {
        total: ratio(total_delta - idle_delta),
        io: ratio(delta(current.iowait, previous.iowait)),
        user: ratio(delta(current.user, previous.user)),
        system: ratio(delta(current.system, previous.system)),
        soft_irq: ratio(delta(current.softirq, previous.softirq)),
        hard_irq: ratio(delta(current.irq, previous.irq)),
    })
}
