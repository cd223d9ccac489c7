use std::ops::Deref;
use std::sync::Arc;

use tandem_core::ticks_from_nanos;

use crate::graph::{Clock, ClockGraph};
use crate::monotonic;

const PRECISION_SAMPLES: usize = 1000;

/// Leaf of every clock graph: monotonic process time scaled to a tick
/// rate.
///
/// `ticks = monotonic_nanos × rate / 10⁹`. The configured maximum
/// frequency error (ppm) is the initial dispersion-growth figure the
/// wall-clock algorithms fold into correlations they install further
/// down the graph.
#[derive(Clone)]
pub struct SystemClock {
    clock: Clock,
}

impl SystemClock {
    /// Create a system clock, measuring its read precision on the spot.
    pub fn new(graph: &Arc<ClockGraph>, tick_rate: f64, max_freq_error_ppm: f64) -> Self {
        let precision = monotonic::measure_precision(
            || ticks_from_nanos(monotonic::now_nanos(), tick_rate),
            tick_rate,
            PRECISION_SAMPLES,
        );
        Self::with_precision(graph, tick_rate, max_freq_error_ppm, precision)
    }

    /// Create a system clock with an externally supplied precision
    /// figure (seconds).
    pub fn with_precision(
        graph: &Arc<ClockGraph>,
        tick_rate: f64,
        max_freq_error_ppm: f64,
        precision_secs: f64,
    ) -> Self {
        let clock = graph.add_node(
            crate::graph::NodeKind::System {
                tick_rate,
                max_freq_error_ppm,
                precision_secs,
            },
            None,
        );
        Self { clock }
    }

    pub fn max_freq_error_ppm(&self) -> f64 {
        self.clock.root_max_freq_error_ppm()
    }

    pub fn precision_secs(&self) -> f64 {
        self.clock.root_precision_secs()
    }

    pub fn as_clock(&self) -> &Clock {
        &self.clock
    }
}

impl Deref for SystemClock {
    type Target = Clock;

    fn deref(&self) -> &Clock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_track_monotonic_nanos() {
        let graph = ClockGraph::new();
        let sys = SystemClock::new(&graph, 1e9, 500.0);

        let before = monotonic::now_nanos() as f64;
        let ticks = sys.ticks();
        let after = monotonic::now_nanos() as f64;

        assert!(ticks >= before);
        assert!(ticks <= after);
    }

    #[test]
    fn test_reads_never_decrease() {
        let graph = ClockGraph::new();
        let sys = SystemClock::new(&graph, 1_000_000.0, 500.0);

        let mut prev = sys.ticks();
        for _ in 0..1000 {
            let next = sys.ticks();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn test_dispersion_is_measured_precision() {
        let graph = ClockGraph::new();
        let sys = SystemClock::with_precision(&graph, 1e9, 500.0, 5e-8);

        assert_eq!(sys.dispersion_at_ticks(0.0), 5e-8);
        assert_eq!(sys.dispersion_at_ticks(1e12), 5e-8);
        assert_eq!(sys.max_freq_error_ppm(), 500.0);
    }

    #[test]
    fn test_root_is_self() {
        let graph = ClockGraph::new();
        let sys = SystemClock::new(&graph, 1e9, 500.0);
        assert_eq!(sys.root(), *sys.as_clock());
        assert!(sys.parent().is_none());
    }

    #[test]
    fn test_parent_conversions_are_identity_at_the_root() {
        let graph = ClockGraph::new();
        let sys = SystemClock::with_precision(&graph, 1e9, 500.0, 1e-8);

        assert_eq!(sys.to_parent_ticks(5000.0), 5000.0);
        assert_eq!(sys.from_parent_ticks(5000.0), 5000.0);
        assert_eq!(sys.to_root_ticks(5000.0), 5000.0);
        assert_eq!(sys.from_root_ticks(5000.0), 5000.0);
    }
}
