use std::sync::Arc;

use parking_lot::Mutex;
use tandem_clocks::{Clock, CorrelatedClock};
use tandem_core::nanos_from_ticks;
use tandem_ports::{ChangeMask, ClockId, ClockObserver, TimelineSource, TimelineState};
use tokio::sync::Notify;

/// Timeline source backed by a correlated clock.
///
/// Availability mirrors the clock's availability; the reported state is
/// the clock's current correlation against the wall clock (a point on
/// the line, not a fresh reading, so unchanged clocks report unchanged
/// states). Clock mutations poke every bound change notification.
pub struct SimpleClockTimelineSource {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    selector: String,
    clock: CorrelatedClock,
    wall_clock: Clock,
    notifies: Mutex<Vec<Arc<Notify>>>,
}

impl ClockObserver for SourceInner {
    fn clock_changed(&self, _clock: ClockId, _mask: ChangeMask) {
        for notify in self.notifies.lock().iter() {
            notify.notify_one();
        }
    }
}

impl SimpleClockTimelineSource {
    /// `clock` carries the timeline; `wall_clock` must be one of its
    /// ancestors and is the reference the timestamps are expressed
    /// against.
    pub fn new(selector: impl Into<String>, clock: &CorrelatedClock, wall_clock: &Clock) -> Self {
        let inner = Arc::new(SourceInner {
            selector: selector.into(),
            clock: clock.clone(),
            wall_clock: wall_clock.clone(),
            notifies: Mutex::new(Vec::new()),
        });
        let observer: Arc<dyn ClockObserver> = inner.clone();
        clock.bind(&observer);
        Self { inner }
    }
}

impl TimelineSource for SimpleClockTimelineSource {
    fn recognises_timeline_selector(&self, selector: &str) -> bool {
        selector == self.inner.selector
    }

    fn timeline_state(&self, selector: &str) -> TimelineState {
        if !self.recognises_timeline_selector(selector) {
            return TimelineState::Unavailable;
        }
        let clock = &self.inner.clock;
        if !clock.is_available() {
            return TimelineState::Unavailable;
        }

        let correlation = clock.correlation();
        let parent = clock.parent().expect("correlated clock has a parent");
        let Ok(wall_ticks) = parent.to_other_clock_ticks(&self.inner.wall_clock, correlation.parent_ticks)
        else {
            return TimelineState::Unavailable;
        };
        if wall_ticks.is_nan() {
            return TimelineState::Unavailable;
        }
        let wall_nanos = nanos_from_ticks(wall_ticks, self.inner.wall_clock.tick_rate());

        // Speed relative to the wall clock: ancestors above it cancel.
        let wall_speed = self.inner.wall_clock.effective_speed();
        let speed = if wall_speed == 0.0 {
            0.0
        } else {
            clock.effective_speed() / wall_speed
        };

        TimelineState::Available {
            content_ticks: correlation.child_ticks,
            wall_nanos: wall_nanos.round() as i64,
            speed,
            tick_rate: clock.tick_rate(),
        }
    }

    fn bind_change_notification(&self, notify: Arc<Notify>) {
        self.inner.notifies.lock().push(notify);
    }
}

#[cfg(test)]
mod tests {
    use tandem_clocks::{ClockGraph, SystemClock};
    use tandem_core::Correlation;

    use super::*;

    const PTS: &str = "urn:dvb:css:timeline:pts";

    fn fixture() -> (SystemClock, CorrelatedClock, CorrelatedClock) {
        let graph = ClockGraph::new();
        let sys = SystemClock::with_precision(&graph, 1e9, 500.0, 1e-8);
        let wall = CorrelatedClock::new(&sys, 1e9, Correlation::new(0.0, 0.0));
        // 90 kHz PTS timeline: tick 900_000 at wall nanosecond 2e9.
        let timeline =
            CorrelatedClock::new(&wall, 90_000.0, Correlation::new(2_000_000_000.0, 900_000.0));
        (sys, wall, timeline)
    }

    #[test]
    fn test_recognises_only_its_selector() {
        let (_sys, wall, timeline) = fixture();
        let source = SimpleClockTimelineSource::new(PTS, &timeline, wall.as_clock());

        assert!(source.recognises_timeline_selector(PTS));
        assert!(!source.recognises_timeline_selector("urn:dvb:css:timeline:temi:1:1"));
        assert_eq!(
            source.timeline_state("urn:dvb:css:timeline:temi:1:1"),
            TimelineState::Unavailable
        );
    }

    #[test]
    fn test_state_reports_the_correlation_point() {
        let (_sys, wall, timeline) = fixture();
        let source = SimpleClockTimelineSource::new(PTS, &timeline, wall.as_clock());

        match source.timeline_state(PTS) {
            TimelineState::Available {
                content_ticks,
                wall_nanos,
                speed,
                tick_rate,
            } => {
                assert_eq!(content_ticks, 900_000.0);
                assert_eq!(wall_nanos, 2_000_000_000);
                assert_eq!(speed, 1.0);
                assert_eq!(tick_rate, 90_000.0);
            }
            TimelineState::Unavailable => panic!("expected available"),
        }

        // Same correlation, same state: no spurious changes.
        let again = source.timeline_state(PTS);
        assert_eq!(again, source.timeline_state(PTS));
    }

    #[test]
    fn test_unavailable_clock_is_unavailable() {
        let (_sys, wall, timeline) = fixture();
        let source = SimpleClockTimelineSource::new(PTS, &timeline, wall.as_clock());

        timeline.set_availability(false);
        assert_eq!(source.timeline_state(PTS), TimelineState::Unavailable);
    }

    #[tokio::test]
    async fn test_clock_change_pokes_notification() {
        let (_sys, wall, timeline) = fixture();
        let source = SimpleClockTimelineSource::new(PTS, &timeline, wall.as_clock());

        let notify = Arc::new(Notify::new());
        source.bind_change_notification(Arc::clone(&notify));

        timeline.set_speed(2.0);
        tokio::time::timeout(std::time::Duration::from_millis(500), notify.notified())
            .await
            .expect("clock change never poked the notification");
    }
}
