use std::io;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::model::*;
use crate::wal::Wal;

use super::store::{BookingStore, InMemoryStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Waits for one append, drains whatever else is already queued,
/// then commits the whole batch with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;

        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Commit what we have before compacting or reporting counters.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    // All or nothing: a failed batch must not replay on the next open.
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        tracing::error!("WAL batch of {} failed: {e}", batch.len());
        if let Err(e) = wal.discard_unsynced() {
            tracing::error!("could not roll back failed WAL batch, refusing appends: {e}");
        }
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Durable [`BookingStore`]: every mutation is journaled before it becomes
/// visible in the in-memory state. Must be opened inside a tokio runtime.
pub struct WalStore {
    memory: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared from append to apply; compaction holds it exclusively.
    compaction_gate: RwLock<()>,
}

impl WalStore {
    /// Replay the log at `path` (if any) and start the background writer.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let memory = InMemoryStore::new();
        for event in &events {
            memory.apply_event(event);
        }
        tracing::info!(
            "replayed {} events from {}: {} rooms, {} bookings",
            events.len(),
            path.display(),
            memory.rooms_len(),
            memory.booking_count()
        );

        Ok(Self {
            memory,
            wal_tx,
            compaction_gate: RwLock::new(()),
        })
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// Journal, then apply.
    async fn persist_and_apply(&self, event: &Event) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        self.wal_append(event).await?;
        self.memory.apply_event(event);
        Ok(())
    }

    /// Rewrite the log with only the events needed to rebuild the current state.
    /// Mutations wait until the swap is done.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.write().await;
        let events = self.memory.snapshot();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl BookingStore for WalStore {
    async fn list_by_room_and_date(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.memory.scope_bookings(Scope::new(room_id, date)))
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.memory.all_bookings())
    }

    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError> {
        self.persist_and_apply(&Event::created(&booking)).await?;
        Ok(booking)
    }

    async fn get_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.memory.booking(&id))
    }

    async fn update_by_id(
        &self,
        id: BookingId,
        fields: BookingFields,
    ) -> Result<Option<Booking>, StoreError> {
        if !self.memory.contains_booking(&id) {
            return Ok(None);
        }
        let event = Event::BookingUpdated {
            id,
            room_id: fields.room_id,
            date: fields.date,
            slot: fields.slot,
        };
        self.persist_and_apply(&event).await?;
        Ok(self.memory.booking(&id))
    }

    async fn delete_by_id(&self, id: BookingId) -> Result<bool, StoreError> {
        if !self.memory.contains_booking(&id) {
            return Ok(false);
        }
        self.persist_and_apply(&Event::BookingDeleted { id }).await?;
        Ok(true)
    }

    async fn insert_room(&self, room: Room) -> Result<Room, StoreError> {
        let event = Event::RoomAdded {
            id: room.id,
            name: room.name.clone(),
        };
        self.persist_and_apply(&event).await?;
        Ok(room)
    }

    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.memory.room(&id))
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.memory.all_rooms())
    }

    async fn room_count(&self) -> Result<usize, StoreError> {
        Ok(self.memory.rooms_len())
    }
}
