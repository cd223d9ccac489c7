//! Tandem Clock Graph
//!
//! A directed tree of logical clocks rooted at the monotonic system
//! time source, with dispersion (error) tracking and correlation-based
//! parent/child relationships:
//!
//! ```text
//! SystemClock (monotonic nanoseconds × tick rate)
//!     │
//!     ├── CorrelatedClock (wall clock, steered by the WC client)
//!     │       │
//!     │       └── CorrelatedClock (content timeline, steered by TS)
//!     │
//!     └── TunableClock (free-running, slew-adjustable)
//! ```
//!
//! Every clock in a graph shares one mutex; mutations notify observers
//! exactly once per atomic change, after the lock is released. Tick
//! values are `f64`; a conversion blocked by a zero-speed ancestor
//! yields `f64::NAN`, which propagates through all further conversions.
//!
//! ## Usage
//!
//! ```ignore
//! use tandem_clocks::{ClockGraph, CorrelatedClock, SystemClock};
//! use tandem_core::Correlation;
//!
//! let graph = ClockGraph::new();
//! let sys = SystemClock::new(&graph, 1e9, 500.0);
//! let wall = CorrelatedClock::new(&sys, 1e9, Correlation::new(0.0, 0.0));
//!
//! wall.set_correlation(Correlation::new(sys.ticks(), 0.0));
//! let when = wall.calc_when(5_000_000_000.0); // root nanos at wall tick 5e9
//! ```

mod correlated;
mod graph;
pub mod monotonic;
mod range;
mod system;
mod tunable;

pub use correlated::CorrelatedClock;
pub use graph::{Clock, ClockGraph};
pub use range::RangeCorrelatedClock;
pub use system::SystemClock;
pub use tunable::TunableClock;

// Re-export the observer contract for convenience
pub use tandem_ports::{ChangeMask, ClockError, ClockId, ClockObserver, SubscriptionId};
