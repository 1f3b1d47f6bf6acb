use chrono::{Duration, NaiveDate};

use crate::model::*;

use super::availability::free_slots;
use super::conflict::{find_conflict, validate_slot};
use super::{Engine, EngineError};

impl Engine {
    /// True iff no other booking of the room on that date overlaps `slot`.
    /// Pass the booking's own id as `exclude_id` when checking a move.
    pub async fn is_available(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
        exclude_id: Option<BookingId>,
    ) -> Result<bool, EngineError> {
        Ok(self
            .find_conflict(room_id, date, slot, exclude_id)
            .await?
            .is_none())
    }

    /// The booking that would block `slot`, if any.
    pub async fn find_conflict(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
        exclude_id: Option<BookingId>,
    ) -> Result<Option<Booking>, EngineError> {
        validate_slot(&slot)?;
        let scope = self.store.list_by_room_and_date(room_id, date).await?;
        Ok(find_conflict(&scope, &slot, exclude_id).cloned())
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_bookings(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        Ok(self.store.list_by_room_and_date(room_id, date).await?)
    }

    pub async fn list_all_bookings(&self) -> Result<Vec<Booking>, EngineError> {
        Ok(self.store.list_all().await?)
    }

    /// Unbooked time of a room on a date, within `window` (whole day if `None`).
    /// Gaps shorter than `min_duration` are dropped.
    pub async fn free_slots(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        window: Option<Slot>,
        min_duration: Option<Duration>,
    ) -> Result<Vec<Slot>, EngineError> {
        let window = window.unwrap_or_else(Slot::whole_day);
        validate_slot(&window)?;
        self.require_room(room_id).await?;

        let bookings = self.store.list_by_room_and_date(room_id, date).await?;
        let mut free = free_slots(&bookings, &window);
        if let Some(min) = min_duration {
            free.retain(|s| s.duration() >= min);
        }
        Ok(free)
    }

    pub async fn get_room(&self, id: RoomId) -> Result<Room, EngineError> {
        self.require_room(id).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, EngineError> {
        Ok(self.store.list_rooms().await?)
    }
}
