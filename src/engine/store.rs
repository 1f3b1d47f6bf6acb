use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    Wal(String),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
            StoreError::Backend(e) => write!(f, "backend error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence contract the engine is written against.
///
/// Implementations only have to be consistent per call; the engine serializes
/// every write that touches a `(room, date)` scope, so a store never sees two
/// concurrent writers for the same booking.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Bookings of one room on one date, ordered by start time.
    async fn list_by_room_and_date(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError>;

    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn get_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Replace room/date/slot. `Ok(None)` if the booking does not exist.
    async fn update_by_id(
        &self,
        id: BookingId,
        fields: BookingFields,
    ) -> Result<Option<Booking>, StoreError>;

    /// `Ok(false)` if the booking does not exist.
    async fn delete_by_id(&self, id: BookingId) -> Result<bool, StoreError>;

    async fn insert_room(&self, room: Room) -> Result<Room, StoreError>;

    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;

    async fn room_count(&self) -> Result<usize, StoreError>;
}

/// Process-local store. Also the materialized state behind [`super::WalStore`].
pub struct InMemoryStore {
    bookings: DashMap<BookingId, Booking>,
    /// Scope index: which bookings live in each `(room, date)`.
    scopes: DashMap<Scope, Vec<BookingId>>,
    rooms: DashMap<RoomId, Room>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            scopes: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    // ── Scope index ──────────────────────────────────────────

    fn index(&self, scope: Scope, id: BookingId) {
        self.scopes.entry(scope).or_default().push(id);
    }

    fn unindex(&self, scope: Scope, id: BookingId) {
        if let Some(mut ids) = self.scopes.get_mut(&scope) {
            ids.retain(|b| *b != id);
        }
        self.scopes.remove_if(&scope, |_, ids| ids.is_empty());
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn scope_bookings(&self, scope: Scope) -> Vec<Booking> {
        let ids = self
            .scopes
            .get(&scope)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out: Vec<Booking> = ids
            .iter()
            .filter_map(|id| self.bookings.get(id).map(|b| b.value().clone()))
            .filter(|b| b.scope() == scope)
            .collect();
        out.sort_by_key(|b| b.slot.start);
        out
    }

    pub fn all_bookings(&self) -> Vec<Booking> {
        let mut out: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| {
            (a.date, a.room_id, a.slot.start).cmp(&(b.date, b.room_id, b.slot.start))
        });
        out
    }

    pub fn booking(&self, id: &BookingId) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn contains_booking(&self, id: &BookingId) -> bool {
        self.bookings.contains_key(id)
    }

    /// Insert or overwrite a booking, keeping the scope index in step.
    pub fn put_booking(&self, booking: Booking) {
        let id = booking.id;
        let scope = booking.scope();
        match self.bookings.insert(id, booking) {
            Some(old) if old.scope() == scope => {}
            Some(old) => {
                self.unindex(old.scope(), id);
                self.index(scope, id);
            }
            None => self.index(scope, id),
        }
    }

    pub fn replace_fields(&self, id: BookingId, fields: BookingFields) -> Option<Booking> {
        let (old_scope, updated) = {
            let mut entry = self.bookings.get_mut(&id)?;
            let old_scope = entry.scope();
            entry.room_id = fields.room_id;
            entry.date = fields.date;
            entry.slot = fields.slot;
            (old_scope, entry.clone())
        };
        if old_scope != updated.scope() {
            self.unindex(old_scope, id);
            self.index(updated.scope(), id);
        }
        Some(updated)
    }

    pub fn remove_booking(&self, id: &BookingId) -> Option<Booking> {
        let (_, old) = self.bookings.remove(id)?;
        self.unindex(old.scope(), old.id);
        Some(old)
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn put_room(&self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    pub fn rooms_len(&self) -> usize {
        self.rooms.len()
    }

    pub fn room(&self, id: &RoomId) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// Rooms in creation order (ULIDs sort by timestamp).
    pub fn all_rooms(&self) -> Vec<Room> {
        let mut out: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|r| r.id);
        out
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::RoomAdded { id, name } => self.put_room(Room {
                id: *id,
                name: name.clone(),
            }),
            Event::BookingCreated {
                id,
                room_id,
                date,
                slot,
            } => self.put_booking(Booking {
                id: *id,
                room_id: *room_id,
                date: *date,
                slot: *slot,
            }),
            Event::BookingUpdated {
                id,
                room_id,
                date,
                slot,
            } => {
                let fields = BookingFields {
                    room_id: *room_id,
                    date: *date,
                    slot: *slot,
                };
                self.replace_fields(*id, fields);
            }
            Event::BookingDeleted { id } => {
                self.remove_booking(id);
            }
        }
    }

    /// Minimal event list that recreates the current state: rooms first, then bookings.
    pub fn snapshot(&self) -> Vec<Event> {
        let rooms = self.all_rooms();
        let bookings = self.all_bookings();
        let mut events = Vec::with_capacity(rooms.len() + bookings.len());
        events.extend(rooms.into_iter().map(|r| Event::RoomAdded {
            id: r.id,
            name: r.name,
        }));
        events.extend(bookings.iter().map(Event::created));
        events
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn list_by_room_and_date(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.scope_bookings(Scope::new(room_id, date)))
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.all_bookings())
    }

    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError> {
        self.put_booking(booking.clone());
        Ok(booking)
    }

    async fn get_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.booking(&id))
    }

    async fn update_by_id(
        &self,
        id: BookingId,
        fields: BookingFields,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self.replace_fields(id, fields))
    }

    async fn delete_by_id(&self, id: BookingId) -> Result<bool, StoreError> {
        Ok(self.remove_booking(&id).is_some())
    }

    async fn insert_room(&self, room: Room) -> Result<Room, StoreError> {
        self.put_room(room.clone());
        Ok(room)
    }

    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.room(&id))
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.all_rooms())
    }

    async fn room_count(&self) -> Result<usize, StoreError> {
        Ok(self.rooms_len())
    }
}
