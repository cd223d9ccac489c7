//! Wire-level message codecs for the tandem synchronisation protocols.
//!
//! Two families live here:
//!
//! - The fixed-layout 32-byte binary wall-clock message
//!   ([`WallClockMessage`]) and the [`Candidate`] measurements built
//!   from request/response timestamp quadruples.
//! - The JSON message schemas for the content-identification and
//!   timeline-synchronisation channels: [`Cii`], [`TimelineOption`],
//!   [`SetupData`], [`Timestamp`], [`ControlTimestamp`], [`AptEptLpt`].
//!
//! JSON optional fields use the three-state [`Field`] type: wire-absent
//! (`Omitted`), wire-`null` (`Null`) and present (`Value`) mean
//! different things in these protocols and must not be conflated.
//! Tick and nanosecond values travel as decimal ASCII integer strings.

mod cii;
mod error;
mod field;
mod setup;
mod timestamps;
mod wallclock;

pub use cii::{Cii, ContentIdStatus, PresentationStatus, TimelineOption, CII_PROTOCOL_VERSION};
pub use error::ProtocolError;
pub use field::Field;
pub use setup::SetupData;
pub use timestamps::{
    AptEptLpt, ControlTimestamp, OpenEndedTimestamp, Timestamp, WallTime,
    is_control_timestamp_changed,
};
pub use wallclock::{Candidate, WallClockMessage, WallClockMessageType};
