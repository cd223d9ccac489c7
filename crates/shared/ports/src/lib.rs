//! Port definitions for the tandem synchronisation stack.
//!
//! Traits that decouple the protocol services from their collaborators:
//! clock-change observation, timeline state providers, and the datagram
//! seam the wall-clock protocol sends through.

mod clock;
mod error;
mod timeline;
mod transport;

pub use clock::{ChangeMask, ClockId, ClockObserver, SubscriptionId};
pub use error::{ClockError, ClockResult};
pub use timeline::{TimelineSource, TimelineState};
pub use transport::Datagram;
