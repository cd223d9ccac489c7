use std::ops::Deref;

use tandem_core::Correlation;
use tandem_ports::{ChangeMask, ClockResult};

use crate::graph::{Clock, NodeKind};

/// A clock defined by two correlation points instead of one.
///
/// The two points fix a line through parent/child tick space; the tick
/// rate is whatever slope that line implies. Useful when a protocol
/// hands over two (wall time, content time) pairs rather than a rate.
#[derive(Clone)]
pub struct RangeCorrelatedClock {
    clock: Clock,
}

impl RangeCorrelatedClock {
    pub fn new(parent: &Clock, correlation_a: Correlation, correlation_b: Correlation) -> Self {
        let clock = parent.graph().add_node(
            NodeKind::RangeCorrelated {
                correlation_a,
                correlation_b,
            },
            Some(parent.id()),
        );
        Self { clock }
    }

    pub fn correlations(&self) -> (Correlation, Correlation) {
        self.clock.with_kind(|kind| match kind {
            NodeKind::RangeCorrelated {
                correlation_a,
                correlation_b,
            } => (*correlation_a, *correlation_b),
            _ => unreachable!("range handle on non-range node"),
        })
    }

    pub fn set_correlations(&self, correlation_a: Correlation, correlation_b: Correlation) {
        let id = self.clock.id();
        self.clock.mutate_node(move |g| {
            if let NodeKind::RangeCorrelated {
                correlation_a: a,
                correlation_b: b,
            } = g.kind_mut(id)
            {
                *a = correlation_a;
                *b = correlation_b;
            }
            ChangeMask::correlation()
        });
    }

    pub fn set_parent(&self, new_parent: &Clock) -> ClockResult<()> {
        self.clock.reparent(new_parent)
    }

    pub fn as_clock(&self) -> &Clock {
        &self.clock
    }
}

impl Deref for RangeCorrelatedClock {
    type Target = Clock;

    fn deref(&self) -> &Clock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ClockGraph;
    use crate::system::SystemClock;

    #[test]
    fn test_rate_implied_by_slope() {
        let graph = ClockGraph::new();
        let sys = SystemClock::with_precision(&graph, 1e9, 500.0, 1e-8);
        // 1000 child ticks per second of parent time.
        let clock = RangeCorrelatedClock::new(
            &sys,
            Correlation::new(0.0, 0.0),
            Correlation::new(1_000_000_000.0, 1000.0),
        );

        assert!((clock.tick_rate() - 1000.0).abs() < 1e-9);
        assert_eq!(clock.from_parent_ticks(500_000_000.0), 500.0);
        assert_eq!(clock.to_parent_ticks(250.0), 250_000_000.0);
    }

    #[test]
    fn test_dispersion_uses_nearer_correlation() {
        let graph = ClockGraph::new();
        let sys = SystemClock::with_precision(&graph, 1e9, 500.0, 0.0);
        let clock = RangeCorrelatedClock::new(
            &sys,
            Correlation::with_errors(0.0, 0.0, 0.1, 0.001),
            Correlation::with_errors(1_000_000_000.0, 1000.0, 0.3, 0.001),
        );

        // Near the first anchor the cheaper error bound applies.
        assert!((clock.dispersion_at_ticks(10.0) - (0.1 + 0.01)).abs() < 1e-9);
        // Near the second anchor the second bound applies.
        assert!((clock.dispersion_at_ticks(990.0) - (0.3 + 0.01)).abs() < 1e-9);
    }
}
