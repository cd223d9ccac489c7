use std::sync::Arc;

use tandem_core::Nanos;
use tokio::sync::Notify;

/// A snapshot of one timeline's relationship to the wall clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineState {
    /// The source cannot currently describe this timeline.
    Unavailable,
    /// At wall-clock time `wall_nanos` the timeline read `content_ticks`,
    /// progressing at `speed` × `tick_rate` ticks per wall-clock second.
    Available {
        content_ticks: f64,
        wall_nanos: Nanos,
        speed: f64,
        tick_rate: f64,
    },
}

impl TimelineState {
    pub fn is_available(&self) -> bool {
        matches!(self, TimelineState::Available { .. })
    }
}

/// Provider of timeline state for the timeline-synchronisation service.
///
/// A server consults its registered sources on every re-evaluation; the
/// first source that recognises a session's timeline selector supplies
/// the state for that session.
pub trait TimelineSource: Send + Sync {
    /// Whether this source can describe the named timeline.
    fn recognises_timeline_selector(&self, selector: &str) -> bool;

    /// Fresh state for the named timeline.
    fn timeline_state(&self, selector: &str) -> TimelineState;

    /// Register a wake-up the source pokes whenever its state changes.
    fn bind_change_notification(&self, notify: Arc<Notify>);

    /// Whether the difference between two states justifies re-emitting a
    /// timestamp. The default treats any difference as meaningful.
    fn is_meaningful_change(&self, new: &TimelineState, old: &TimelineState) -> bool {
        new != old
    }
}
