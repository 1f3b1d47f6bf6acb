use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

pub type BookingId = Ulid;
pub type RoomId = Ulid;

/// Half-open time-of-day interval `[start, end)` on a single date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Slot start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: NaiveTime, end: NaiveTime) -> Result<Self, EngineError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(EngineError::InvalidInterval { start, end })
        }
    }

    /// `[00:00, 23:59:59.999999999)`, the widest slot a `NaiveTime` pair can express.
    pub fn whole_day() -> Self {
        let last = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
            .expect("23:59:59.999999999 is a valid time");
        Self::new(NaiveTime::MIN, last)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The part of `self` inside `window`, if any.
    pub fn clamp_to(&self, window: &Slot) -> Option<Slot> {
        self.overlaps(window)
            .then(|| Slot::new(self.start.max(window.start), self.end.min(window.end)))
    }
}

/// Conflict scope: overlap only matters between bookings of one room on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub room_id: RoomId,
    pub date: NaiveDate,
}

impl Scope {
    pub fn new(room_id: RoomId, date: NaiveDate) -> Self {
        Self { room_id, date }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub slot: Slot,
}

impl Booking {
    pub fn scope(&self) -> Scope {
        Scope::new(self.room_id, self.date)
    }

    pub fn fields(&self) -> BookingFields {
        BookingFields {
            room_id: self.room_id,
            date: self.date,
            slot: self.slot,
        }
    }
}

/// The mutable part of a booking: everything except its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFields {
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub slot: Slot,
}

impl BookingFields {
    pub fn scope(&self) -> Scope {
        Scope::new(self.room_id, self.date)
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomAdded {
        id: RoomId,
        name: String,
    },
    BookingCreated {
        id: BookingId,
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
    },
    BookingUpdated {
        id: BookingId,
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
    },
    BookingDeleted {
        id: BookingId,
    },
}

impl Event {
    pub fn created(booking: &Booking) -> Self {
        Event::BookingCreated {
            id: booking.id,
            room_id: booking.room_id,
            date: booking.date,
            slot: booking.slot,
        }
    }
}
