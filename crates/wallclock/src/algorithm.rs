use std::time::Duration;

use log::debug;
use tandem_clocks::{CorrelatedClock, monotonic};
use tandem_core::{Correlation, Nanos, nanos_to_secs, ppm_to_growth_per_tick, ticks_from_nanos};
use tandem_protocol::Candidate;

/// Strategy a wall-clock client uses to turn candidate measurements
/// into clock adjustments.
pub trait WallClockAlgorithm: Send {
    /// Feed one successful round trip. A returned correlation is
    /// installed on the target clock by the client.
    fn on_candidate(&mut self, candidate: &Candidate) -> Option<Correlation>;

    /// How long to wait before the next request round.
    fn current_interval(&self) -> Duration;
}

/// Build the correlation a candidate implies for `clock`.
///
/// The correlation maps the parent-clock reading at arrival time `t4`
/// to the estimated server time then. Initial error is half the round
/// trip plus both ends' precisions; it grows with both ends' maximum
/// frequency error.
pub fn correlation_from_candidate(
    clock: &CorrelatedClock,
    candidate: &Candidate,
    local_precision_secs: f64,
    local_max_freq_error_ppm: f64,
) -> Correlation {
    let parent = clock.parent().expect("wall clock has a measurement parent");
    let parent_ticks = ticks_from_nanos(candidate.t4, parent.tick_rate());
    let child_ticks = ticks_from_nanos(
        candidate.t4 + candidate.offset_nanos(),
        clock.tick_rate(),
    );
    let initial_error = nanos_to_secs(candidate.rtt_nanos()) / 2.0
        + candidate.precision_secs
        + local_precision_secs;
    let growth = ppm_to_growth_per_tick(
        local_max_freq_error_ppm + candidate.max_freq_error_ppm,
        clock.tick_rate(),
    );
    Correlation::with_errors(parent_ticks, child_ticks, initial_error, growth)
}

/// Local measurement figures, defaulted from the clock's system-clock
/// ancestor unless overridden.
#[derive(Debug, Clone, Copy)]
struct LocalFigures {
    precision_secs: f64,
    max_freq_error_ppm: f64,
}

impl LocalFigures {
    fn from_clock(clock: &CorrelatedClock) -> Self {
        Self {
            precision_secs: clock.root_precision_secs(),
            max_freq_error_ppm: clock.root_max_freq_error_ppm(),
        }
    }
}

/// Keep whichever candidate currently has the lowest dispersion.
///
/// A candidate's quality is `rtt/2 + accumulated frequency error ×
/// age`; older measurements decay, so a fresher but slightly slower
/// round trip eventually replaces a stale fast one.
pub struct LowestDispersion {
    clock: CorrelatedClock,
    local: LocalFigures,
    repeat: Duration,
    best: Option<Candidate>,
}

impl LowestDispersion {
    pub fn new(clock: &CorrelatedClock, repeat: Duration) -> Self {
        Self {
            clock: clock.clone(),
            local: LocalFigures::from_clock(clock),
            repeat,
            best: None,
        }
    }

    /// Override the local precision/frequency-error figures instead of
    /// reading them from the system-clock ancestor.
    pub fn with_local_figures(mut self, precision_secs: f64, max_freq_error_ppm: f64) -> Self {
        self.local = LocalFigures {
            precision_secs,
            max_freq_error_ppm,
        };
        self
    }

    fn quality(&self, candidate: &Candidate, now: Nanos) -> f64 {
        let age = nanos_to_secs((now - candidate.t4).max(0));
        nanos_to_secs(candidate.rtt_nanos()) / 2.0
            + (self.local.max_freq_error_ppm + candidate.max_freq_error_ppm) * 1e-6 * age
    }
}

impl WallClockAlgorithm for LowestDispersion {
    fn on_candidate(&mut self, candidate: &Candidate) -> Option<Correlation> {
        let now = monotonic::now_nanos();
        let quality = self.quality(candidate, now);
        let improves = match &self.best {
            None => true,
            Some(best) => quality < self.quality(best, now),
        };

        if improves {
            debug!(
                "candidate accepted: offset {} ns, rtt {} ns, quality {:.9} s",
                candidate.offset_nanos(),
                candidate.rtt_nanos(),
                quality
            );
            self.best = Some(*candidate);
            Some(correlation_from_candidate(
                &self.clock,
                candidate,
                self.local.precision_secs,
                self.local.max_freq_error_ppm,
            ))
        } else {
            debug!(
                "candidate rejected: offset {} ns, rtt {} ns, quality {:.9} s",
                candidate.offset_nanos(),
                candidate.rtt_nanos(),
                quality
            );
            None
        }
    }

    fn current_interval(&self) -> Duration {
        self.repeat
    }
}

/// Predicate deciding whether a candidate survives into prediction.
pub trait CandidateFilter: Send {
    fn check(&mut self, candidate: &Candidate) -> bool;
}

/// Drop candidates whose round trip exceeds a threshold.
pub struct RttThreshold {
    max_rtt: Duration,
}

impl RttThreshold {
    pub fn new(max_rtt: Duration) -> Self {
        Self { max_rtt }
    }
}

impl CandidateFilter for RttThreshold {
    fn check(&mut self, candidate: &Candidate) -> bool {
        candidate.rtt_nanos() <= self.max_rtt.as_nanos() as i64
    }
}

/// Drop candidates that do not improve on the best initial dispersion
/// seen so far.
pub struct LowestDispersionSoFar {
    local_precision_secs: f64,
    best: Option<f64>,
}

impl LowestDispersionSoFar {
    pub fn new(local_precision_secs: f64) -> Self {
        Self {
            local_precision_secs,
            best: None,
        }
    }
}

impl CandidateFilter for LowestDispersionSoFar {
    fn check(&mut self, candidate: &Candidate) -> bool {
        let dispersion = nanos_to_secs(candidate.rtt_nanos()) / 2.0
            + candidate.precision_secs
            + self.local_precision_secs;
        match self.best {
            Some(best) if dispersion >= best => false,
            _ => {
                self.best = Some(dispersion);
                true
            }
        }
    }
}

/// Chooses which surviving candidate the clock should follow.
pub trait CandidatePredictor: Send {
    fn predict(&mut self, candidate: &Candidate) -> Option<Candidate>;
}

/// The simple predictor: follow the latest surviving candidate.
#[derive(Default)]
pub struct MostRecent;

impl CandidatePredictor for MostRecent {
    fn predict(&mut self, candidate: &Candidate) -> Option<Candidate> {
        Some(*candidate)
    }
}

/// Composable pipeline: zero or more filters, then a predictor.
pub struct FilterAndPredict {
    clock: CorrelatedClock,
    local: LocalFigures,
    repeat: Duration,
    filters: Vec<Box<dyn CandidateFilter>>,
    predictor: Box<dyn CandidatePredictor>,
}

impl FilterAndPredict {
    pub fn new(
        clock: &CorrelatedClock,
        repeat: Duration,
        filters: Vec<Box<dyn CandidateFilter>>,
        predictor: Box<dyn CandidatePredictor>,
    ) -> Self {
        Self {
            clock: clock.clone(),
            local: LocalFigures::from_clock(clock),
            repeat,
            filters,
            predictor,
        }
    }
}

impl WallClockAlgorithm for FilterAndPredict {
    fn on_candidate(&mut self, candidate: &Candidate) -> Option<Correlation> {
        for filter in &mut self.filters {
            if !filter.check(candidate) {
                debug!(
                    "candidate filtered out: offset {} ns, rtt {} ns",
                    candidate.offset_nanos(),
                    candidate.rtt_nanos()
                );
                return None;
            }
        }
        let predicted = self.predictor.predict(candidate)?;
        Some(correlation_from_candidate(
            &self.clock,
            &predicted,
            self.local.precision_secs,
            self.local.max_freq_error_ppm,
        ))
    }

    fn current_interval(&self) -> Duration {
        self.repeat
    }
}
