//! Wall-clock protocol client and server.
//!
//! The connectionless request/response protocol that gives every
//! companion device a shared time reference:
//!
//! ```text
//!  client                      server
//!    │  t1 ──── request ────▶ t2  │
//!    │                            │  stamps receive/transmit
//!    │  t4 ◀─── response ──── t3  │
//! ```
//!
//! Each exchange yields a [`Candidate`](tandem_protocol::Candidate)
//! measurement; a pluggable [`WallClockAlgorithm`] filters candidates
//! and installs correlations on the client's wall clock, converging it
//! to the server's clock despite network noise.

mod algorithm;
mod client;
mod config;
mod server;

pub use algorithm::{
    CandidateFilter, CandidatePredictor, FilterAndPredict, LowestDispersion,
    LowestDispersionSoFar, MostRecent, RttThreshold, WallClockAlgorithm,
    correlation_from_candidate,
};
pub use client::{WallClockClient, WallClockClientHandle};
pub use config::{DEFAULT_WALL_CLOCK_PORT, WallClockClientConfig, WallClockServerConfig};
pub use server::WallClockServer;
