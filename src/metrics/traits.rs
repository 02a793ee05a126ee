//! Traits for system metrics collection.

use crate::metrics::data::SystemSnapshot;
use futures_util::stream::BoxStream;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

/// Pull-based source of system snapshots.
///
/// Implementations own all state carried between ticks; `poll` is called
/// once per tick by a single caller.
pub trait MetricsProvider {
    /// Read every source once and return the derived snapshot.
    ///
    /// Per-source failures are reported in [`SystemSnapshot::anomalies`]
    /// and never abort the poll.
    fn poll(&mut self) -> SystemSnapshot;

    /// Poll on a fixed interval, starting immediately.
    ///
    /// Must be called from within a Tokio runtime. Dropping the stream
    /// between items cancels at the sleep boundary, never mid-poll.
    fn start_stream(self, interval_ms: u64) -> BoxStream<'static, SystemSnapshot>
    where
        Self: Sized + Send + 'static,
    {
        let mut interval = time::interval(Duration::from_millis(interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut provider = self;
        Box::pin(IntervalStream::new(interval).map(move |_| provider.poll()))
    }
}
