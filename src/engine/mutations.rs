use chrono::NaiveDate;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;

use super::conflict::{check_no_conflict, validate_slot};
use super::{Engine, EngineError};

fn count_conflict(e: &EngineError) {
    if let EngineError::Conflict(existing) = e {
        metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
        debug!("rejected candidate: overlaps booking {existing}");
    }
}

impl Engine {
    pub async fn add_room(&self, name: impl Into<String>) -> Result<Room, EngineError> {
        let name = name.into();
        if name.len() > MAX_ROOM_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
        if self.store.room_count().await? >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        let room = self.store.insert_room(Room { id: Ulid::new(), name }).await?;
        info!("added room {} ({})", room.id, room.name);
        Ok(room)
    }

    /// Add each named room unless the store already has rooms. Returns what was added.
    pub async fn seed_rooms(&self, names: &[String]) -> Result<Vec<Room>, EngineError> {
        if self.store.room_count().await? > 0 {
            return Ok(Vec::new());
        }
        let mut added = Vec::with_capacity(names.len());
        for name in names {
            added.push(self.add_room(name.clone()).await?);
        }
        Ok(added)
    }

    pub async fn create_booking(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
    ) -> Result<Booking, EngineError> {
        validate_slot(&slot)?;
        self.require_room(room_id).await?;

        let _guard = self.lock_scope(Scope::new(room_id, date)).await;
        let existing = self.store.list_by_room_and_date(room_id, date).await?;
        if existing.len() >= MAX_BOOKINGS_PER_SCOPE {
            return Err(EngineError::LimitExceeded("too many bookings for room and date"));
        }
        check_no_conflict(&existing, &slot, None).inspect_err(count_conflict)?;

        let booking = Booking {
            id: Ulid::new(),
            room_id,
            date,
            slot,
        };
        let booking = self.store.insert(booking).await?;
        metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            "booked {} for room {} on {} [{}, {})",
            booking.id, room_id, date, slot.start, slot.end
        );
        Ok(booking)
    }

    /// Move a booking to a new room, date or slot. The booking is excluded from
    /// its own conflict check, so re-saving unchanged values always succeeds.
    pub async fn update_booking(
        &self,
        id: BookingId,
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
    ) -> Result<Booking, EngineError> {
        validate_slot(&slot)?;
        let mut seen = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        self.require_room(room_id).await?;
        let target = Scope::new(room_id, date);

        loop {
            let _guards = self.lock_scopes(seen.scope(), target).await;

            // A concurrent move may have taken it out of the scope we locked.
            match self.store.get_by_id(id).await? {
                None => return Err(EngineError::NotFound(id)),
                Some(current) if current.scope() != seen.scope() => {
                    seen = current;
                    continue;
                }
                Some(_) => {}
            }

            let existing = self.store.list_by_room_and_date(room_id, date).await?;
            if target != seen.scope() && existing.len() >= MAX_BOOKINGS_PER_SCOPE {
                return Err(EngineError::LimitExceeded("too many bookings for room and date"));
            }
            check_no_conflict(&existing, &slot, Some(id)).inspect_err(count_conflict)?;

            let fields = BookingFields { room_id, date, slot };
            let updated = self
                .store
                .update_by_id(id, fields)
                .await?
                .ok_or(EngineError::NotFound(id))?;
            metrics::counter!(BOOKINGS_UPDATED_TOTAL).increment(1);
            info!(
                "moved booking {id} to room {room_id} on {date} [{}, {})",
                slot.start, slot.end
            );
            return Ok(updated);
        }
    }

    pub async fn delete_booking(&self, id: BookingId) -> Result<(), EngineError> {
        loop {
            let seen = self
                .store
                .get_by_id(id)
                .await?
                .ok_or(EngineError::NotFound(id))?;
            let _guard = self.lock_scope(seen.scope()).await;

            match self.store.get_by_id(id).await? {
                None => return Err(EngineError::NotFound(id)),
                Some(current) if current.scope() != seen.scope() => continue,
                Some(_) => {}
            }

            if !self.store.delete_by_id(id).await? {
                return Err(EngineError::NotFound(id));
            }
            metrics::counter!(BOOKINGS_DELETED_TOTAL).increment(1);
            info!("deleted booking {id}");
            return Ok(());
        }
    }
}
