use thiserror::Error;

/// Domain-level errors for clock graph operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("Reparenting would create a cycle")]
    WouldCreateCycle,

    #[error("Clocks belong to different graphs")]
    DifferentGraphs,
}

pub type ClockResult<T> = std::result::Result<T, ClockError>;
