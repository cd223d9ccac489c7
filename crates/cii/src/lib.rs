//! Content identification push service.
//!
//! The server owns one current [`Cii`](tandem_protocol::Cii) record.
//! Every newly-connected client first receives the full non-omitted
//! state; after that, each committed mutation broadcasts only the diff.
//! The client folds those diffs into a cumulative record and reports
//! which fields changed, once per inbound message.

mod client;
mod config;
mod server;

pub use client::{CiiClient, CiiClientEvent};
pub use config::{CiiServerConfig, DEFAULT_CII_PATH};
pub use server::CiiServer;
