use chrono::NaiveTime;

use crate::model::{BookingId, RoomId};

use super::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// The candidate overlaps this booking in the same room and date.
    Conflict(BookingId),
    NotFound(BookingId),
    RoomNotFound(RoomId),
    InvalidInterval {
        start: NaiveTime,
        end: NaiveTime,
    },
    LimitExceeded(&'static str),
    Storage(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Conflict(id) => {
                write!(f, "room not available at this time: conflicts with booking {id}")
            }
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval: start {start} must be before end {end}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Storage(e)
    }
}
