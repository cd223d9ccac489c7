//! Timeline synchronisation service.
//!
//! The server correlates content timelines with the shared wall clock
//! and pushes [`ControlTimestamp`](tandem_protocol::ControlTimestamp)s
//! to interested companions:
//!
//! ```text
//! client ── SetupData {stem, selector} ──▶ server
//! client ◀── ControlTimestamp ──────────── server   (on change)
//! client ── AptEptLpt ───────────────────▶ server   (optional)
//! ```
//!
//! A session is available when its content-id stem matches the
//! server's current content id at a URI component boundary and a
//! registered [`TimelineSource`](tandem_ports::TimelineSource) claims
//! its timeline selector. Availability flips and meaningful timeline
//! changes each push exactly one fresh timestamp.
//!
//! The client installs received correlations on a correlated clock
//! whose parent is the local estimate of the wall clock, so the whole
//! clock graph downstream of it tracks the presentation timeline.

mod client;
mod config;
mod server;
mod source;
mod stem;

pub use client::{TsClient, TsClientEvent};
pub use config::{DEFAULT_TS_PATH, TsServerConfig};
pub use server::{TsServer, TsServerEvent};
pub use source::SimpleClockTimelineSource;
pub use stem::ci_matches_stem;
