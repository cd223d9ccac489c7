use serde::{Deserialize, Serialize};

/// A point mapping between a parent clock and a child clock, with error
/// bounds.
///
/// States that at parent tick value `parent_ticks` the child clock reads
/// `child_ticks`, known to within `initial_error` seconds, and that the
/// uncertainty widens by `error_growth_rate` seconds for every tick of
/// child-clock separation from the correlation point.
///
/// Correlations are immutable; the `with_*` methods produce modified
/// copies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub parent_ticks: f64,
    pub child_ticks: f64,
    pub initial_error: f64,
    pub error_growth_rate: f64,
}

impl Correlation {
    /// Correlation with zero error bounds.
    pub fn new(parent_ticks: f64, child_ticks: f64) -> Self {
        Self {
            parent_ticks,
            child_ticks,
            initial_error: 0.0,
            error_growth_rate: 0.0,
        }
    }

    pub fn with_errors(
        parent_ticks: f64,
        child_ticks: f64,
        initial_error: f64,
        error_growth_rate: f64,
    ) -> Self {
        Self {
            parent_ticks,
            child_ticks,
            initial_error,
            error_growth_rate,
        }
    }

    pub fn with_parent_ticks(self, parent_ticks: f64) -> Self {
        Self {
            parent_ticks,
            ..self
        }
    }

    pub fn with_child_ticks(self, child_ticks: f64) -> Self {
        Self {
            child_ticks,
            ..self
        }
    }

    pub fn with_initial_error(self, initial_error: f64) -> Self {
        Self {
            initial_error,
            ..self
        }
    }

    pub fn with_error_growth_rate(self, error_growth_rate: f64) -> Self {
        Self {
            error_growth_rate,
            ..self
        }
    }

    /// Uncertainty, in seconds, of a child-clock reading `child_ticks`
    /// away from this correlation point.
    pub fn error_at(&self, child_ticks: f64) -> f64 {
        self.initial_error + self.error_growth_rate * (child_ticks - self.child_ticks).abs()
    }
}
