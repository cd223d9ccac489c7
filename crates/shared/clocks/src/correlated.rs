use std::ops::Deref;

use tandem_core::Correlation;
use tandem_ports::{ChangeMask, ClockResult};

use crate::graph::{Clock, NodeKind};

/// A clock derived linearly from its parent through one [`Correlation`],
/// adjusted for a speed multiplier.
///
/// This is the workhorse of the graph: the wall clock a WC client
/// steers, and the content timeline a TS client steers, are both
/// correlated clocks. `speed`, `tick_rate` and the correlation are
/// mutable; each mutation notifies dependents once.
#[derive(Clone)]
pub struct CorrelatedClock {
    clock: Clock,
}

impl CorrelatedClock {
    pub fn new(parent: &Clock, tick_rate: f64, correlation: Correlation) -> Self {
        let clock = parent.graph().add_node(
            NodeKind::Correlated {
                tick_rate,
                speed: 1.0,
                correlation,
            },
            Some(parent.id()),
        );
        Self { clock }
    }

    pub fn correlation(&self) -> Correlation {
        self.clock.with_kind(|kind| match kind {
            NodeKind::Correlated { correlation, .. } => *correlation,
            _ => unreachable!("correlated handle on non-correlated node"),
        })
    }

    pub fn set_correlation(&self, correlation: Correlation) {
        let id = self.clock.id();
        self.clock.mutate_node(move |g| {
            if let NodeKind::Correlated {
                correlation: current,
                ..
            } = g.kind_mut(id)
            {
                *current = correlation;
            }
            ChangeMask::correlation()
        });
    }

    pub fn set_speed(&self, speed: f64) {
        let id = self.clock.id();
        self.clock.mutate_node(move |g| {
            if let NodeKind::Correlated { speed: current, .. } = g.kind_mut(id) {
                *current = speed;
            }
            ChangeMask::speed()
        });
    }

    pub fn set_tick_rate(&self, tick_rate: f64) {
        let id = self.clock.id();
        self.clock.mutate_node(move |g| {
            if let NodeKind::Correlated {
                tick_rate: current, ..
            } = g.kind_mut(id)
            {
                *current = tick_rate;
            }
            ChangeMask::tick_rate()
        });
    }

    /// Install a correlation and speed together as one atomic change
    /// with a single notification, for timestamp-driven adjustment
    /// where the two must land at the same instant.
    pub fn set_correlation_and_speed(&self, correlation: Correlation, speed: f64) {
        let id = self.clock.id();
        self.clock.mutate_node(move |g| {
            if let NodeKind::Correlated {
                correlation: current_corr,
                speed: current_speed,
                ..
            } = g.kind_mut(id)
            {
                *current_corr = correlation;
                *current_speed = speed;
            }
            ChangeMask::correlation().union(ChangeMask::speed())
        });
    }

    /// Move this clock under a different parent, rejecting cycles.
    pub fn set_parent(&self, new_parent: &Clock) -> ClockResult<()> {
        self.clock.reparent(new_parent)
    }

    pub fn as_clock(&self) -> &Clock {
        &self.clock
    }
}

impl Deref for CorrelatedClock {
    type Target = Clock;

    fn deref(&self) -> &Clock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tandem_ports::{ClockError, ClockId, ClockObserver};

    use super::*;
    use crate::graph::ClockGraph;
    use crate::system::SystemClock;

    fn graph_with_system() -> (Arc<ClockGraph>, SystemClock) {
        let graph = ClockGraph::new();
        let sys = SystemClock::with_precision(&graph, 1e9, 500.0, 1e-8);
        (graph, sys)
    }

    #[test]
    fn test_from_root_conversion() {
        let (_graph, sys) = graph_with_system();
        let c1 = CorrelatedClock::new(&sys, 1000.0, Correlation::new(10_000_000_000.0, 0.0));

        assert_eq!(c1.from_root_ticks(15_000_000_000.0), 5000.0);
        assert_eq!(c1.to_root_ticks(5000.0), 15_000_000_000.0);
    }

    #[test]
    fn test_round_trip_through_sibling() {
        let (_graph, sys) = graph_with_system();
        let a = CorrelatedClock::new(&sys, 1000.0, Correlation::new(1_000_000_000.0, 50.0));
        let b = CorrelatedClock::new(&sys, 90_000.0, Correlation::new(2_000_000_000.0, 0.0));

        let t = 7500.0;
        let on_b = a.to_other_clock_ticks(&b, t).unwrap();
        let back = b.to_other_clock_ticks(&a, on_b).unwrap();
        assert!((back - t).abs() < 1e-6);
    }

    #[test]
    fn test_zero_speed_blocks_inversion() {
        let (_graph, sys) = graph_with_system();
        let c1 = CorrelatedClock::new(&sys, 1000.0, Correlation::new(0.0, 0.0));
        c1.set_speed(0.0);

        assert!(c1.to_parent_ticks(5000.0).is_nan());
        assert!(c1.calc_when(5000.0).is_nan());
        // Reading forward still works: the clock is pinned.
        assert_eq!(c1.from_parent_ticks(123_456_789.0), 0.0);
    }

    #[test]
    fn test_nan_propagates_through_descendants() {
        let (_graph, sys) = graph_with_system();
        let stopped = CorrelatedClock::new(&sys, 1000.0, Correlation::new(0.0, 0.0));
        let child = CorrelatedClock::new(&stopped, 1000.0, Correlation::new(0.0, 0.0));
        stopped.set_speed(0.0);

        assert!(child.calc_when(1.0).is_nan());
        assert!(child.to_root_ticks(1.0).is_nan());
    }

    #[test]
    fn test_dispersion_sums_along_path() {
        let (_graph, sys) = graph_with_system();
        let c1 = CorrelatedClock::new(
            &sys,
            1000.0,
            Correlation::with_errors(0.0, 0.0, 0.5, 0.001),
        );

        // At the correlation point only the initial error and the root
        // precision contribute.
        assert!((c1.dispersion_at_ticks(0.0) - (0.5 + 1e-8)).abs() < 1e-12);
        // 100 ticks out the growth rate has added 0.1 s.
        assert!((c1.dispersion_at_ticks(100.0) - (0.6 + 1e-8)).abs() < 1e-12);
    }

    #[test]
    fn test_dispersion_monotonic_from_anchor() {
        let (_graph, sys) = graph_with_system();
        let c1 = CorrelatedClock::new(
            &sys,
            1000.0,
            Correlation::with_errors(0.0, 1000.0, 0.2, 0.01),
        );

        let d1 = c1.dispersion_at_ticks(1100.0);
        let d2 = c1.dispersion_at_ticks(1200.0);
        let d3 = c1.dispersion_at_ticks(1300.0);
        assert!(d1 <= d2 && d2 <= d3);
    }

    #[test]
    fn test_availability_conjunction() {
        let (_graph, sys) = graph_with_system();
        let parent = CorrelatedClock::new(&sys, 1000.0, Correlation::new(0.0, 0.0));
        let child = CorrelatedClock::new(&parent, 90_000.0, Correlation::new(0.0, 0.0));

        assert!(child.is_available());
        parent.set_availability(false);
        assert!(!child.is_available());
        assert!(child.same_graph(parent.as_clock()));

        // Restoring the ancestor restores the child only if its own
        // flag is still set.
        child.set_availability(false);
        parent.set_availability(true);
        assert!(!child.is_available());
        child.set_availability(true);
        assert!(child.is_available());
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let (_graph, sys) = graph_with_system();
        let a = CorrelatedClock::new(&sys, 1000.0, Correlation::new(0.0, 0.0));
        let b = CorrelatedClock::new(&a, 1000.0, Correlation::new(0.0, 0.0));
        let c = CorrelatedClock::new(&b, 1000.0, Correlation::new(0.0, 0.0));

        assert_eq!(a.set_parent(&c), Err(ClockError::WouldCreateCycle));
        // Moving a leaf is fine.
        assert_eq!(c.set_parent(sys.as_clock()), Ok(()));
        assert_eq!(c.parent().unwrap(), *sys.as_clock());
    }

    struct CountingObserver {
        calls: AtomicUsize,
    }

    impl ClockObserver for CountingObserver {
        fn clock_changed(&self, _clock: ClockId, _mask: ChangeMask) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_single_notification_per_atomic_change() {
        let (_graph, sys) = graph_with_system();
        let c1 = CorrelatedClock::new(&sys, 1000.0, Correlation::new(0.0, 0.0));

        let observer = Arc::new(CountingObserver {
            calls: AtomicUsize::new(0),
        });
        let as_dyn: Arc<dyn ClockObserver> = observer.clone();
        c1.bind(&as_dyn);

        c1.set_correlation_and_speed(Correlation::new(10.0, 20.0), 2.0);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);

        c1.set_speed(1.0);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 2);

        // Redundant availability writes do not notify.
        c1.set_availability(true);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ancestor_mutation_notifies_descendant_observer() {
        let (_graph, sys) = graph_with_system();
        let parent = CorrelatedClock::new(&sys, 1000.0, Correlation::new(0.0, 0.0));
        let child = CorrelatedClock::new(&parent, 1000.0, Correlation::new(0.0, 0.0));

        let observer = Arc::new(CountingObserver {
            calls: AtomicUsize::new(0),
        });
        let as_dyn: Arc<dyn ClockObserver> = observer.clone();
        let sub = child.bind(&as_dyn);

        parent.set_speed(2.0);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);

        child.unbind(sub);
        parent.set_speed(1.0);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_effective_speed_is_product() {
        let (_graph, sys) = graph_with_system();
        let parent = CorrelatedClock::new(&sys, 1000.0, Correlation::new(0.0, 0.0));
        let child = CorrelatedClock::new(&parent, 1000.0, Correlation::new(0.0, 0.0));

        parent.set_speed(2.0);
        child.set_speed(0.5);
        assert_eq!(child.effective_speed(), 1.0);
        assert_eq!(parent.effective_speed(), 2.0);
    }
}
