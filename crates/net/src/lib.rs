//! Text-message endpoint plumbing for the tandem push protocols.
//!
//! Both push channels (content identification and timeline
//! synchronisation) speak JSON text frames over an HTTP-upgraded
//! full-duplex connection. This crate owns the shared connection
//! management so the two services only deal in events:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                 Service (CII / TS)                    │
//! │   consumes EndpointEvent, talks via MessageSender     │
//! └───────────────────────────┬───────────────────────────┘
//!                             │
//! ┌───────────────────────────▼───────────────────────────┐
//! │                      tandem-net                       │
//! │  WsServer: accept loop + path check + per-connection  │
//! │            read/write pumps                           │
//! │  ConnectionRegistry: id → sender, broadcast snapshot, │
//! │            idempotent close accounting                │
//! │  connect_text: client side                            │
//! └───────────────────────────────────────────────────────┘
//! ```

mod client;
mod connection;
mod error;
mod server;

pub use client::{ClientEvent, connect_text};
pub use connection::{ConnectionId, ConnectionRegistry, EndpointEvent, MessageSender};
pub use error::NetError;
pub use server::WsServer;
