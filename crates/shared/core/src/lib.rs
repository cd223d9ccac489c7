//! Core domain types for the tandem synchronisation protocols.
//!
//! Everything here is plain data: nanosecond time arithmetic and the
//! [`Correlation`] tuple that relates a child clock to its parent. The
//! clock graph, scheduler and protocol crates all build on these types.

mod correlation;
mod time;

pub use correlation::Correlation;
pub use time::{
    NANOS_PER_SEC, Nanos, nanos_from_ticks, nanos_to_secs, ppm_to_growth_per_tick,
    ticks_from_nanos,
};
