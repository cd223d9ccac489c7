use std::ops::Deref;

use tandem_core::Correlation;

use crate::correlated::CorrelatedClock;
use crate::graph::Clock;

/// A free-running clock that can be nudged: compatibility surface over
/// [`CorrelatedClock`].
///
/// Starts at a caller-chosen tick value "now" and advances at its own
/// tick rate. `adjust_ticks` steps the reading; `set_slew_ppm` trims the
/// rate relative to the parent in parts-per-million.
#[derive(Clone)]
pub struct TunableClock {
    inner: CorrelatedClock,
}

impl TunableClock {
    pub fn new(parent: &Clock, tick_rate: f64, start_ticks: f64) -> Self {
        let correlation = Correlation::new(parent.ticks(), start_ticks);
        Self {
            inner: CorrelatedClock::new(parent, tick_rate, correlation),
        }
    }

    /// Step the clock's current reading by `delta` ticks.
    pub fn adjust_ticks(&self, delta: f64) {
        let correlation = self.inner.correlation();
        self.inner
            .set_correlation(correlation.with_child_ticks(correlation.child_ticks + delta));
    }

    /// Trim the rate: +ppm runs fast, -ppm runs slow, 0 restores
    /// nominal.
    pub fn set_slew_ppm(&self, ppm: f64) {
        self.inner.set_speed(1.0 + ppm * 1e-6);
    }

    pub fn slew_ppm(&self) -> f64 {
        (self.inner.speed() - 1.0) * 1e6
    }

    pub fn as_clock(&self) -> &Clock {
        self.inner.as_clock()
    }
}

impl Deref for TunableClock {
    type Target = Clock;

    fn deref(&self) -> &Clock {
        self.inner.as_clock()
    }
}
