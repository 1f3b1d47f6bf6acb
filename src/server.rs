use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveTime};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

use crate::command::{parse_line, Command, TIME_FORMAT};
use crate::engine::{Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability::*;

pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

// ── Response shapes ──────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub id: BookingId,
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
}

impl From<&Booking> for BookingView {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            room_id: b.room_id,
            date: b.date,
            start_time: hhmm(b.slot.start),
            end_time: hhmm(b.slot.end),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub start_time: String,
    pub end_time: String,
}

impl From<&Slot> for SlotView {
    fn from(s: &Slot) -> Self {
        Self {
            start_time: hhmm(s.start),
            end_time: hhmm(s.end),
        }
    }
}

/// Minutes precision; the whole-day window therefore ends at "23:59".
fn hhmm(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn bookings_json(bookings: &[Booking]) -> Vec<BookingView> {
    bookings.iter().map(BookingView::from).collect()
}

pub fn error_kind(e: &EngineError) -> &'static str {
    match e {
        EngineError::Conflict(_) => "conflict",
        EngineError::NotFound(_) => "not_found",
        EngineError::RoomNotFound(_) => "room_not_found",
        EngineError::InvalidInterval { .. } => "invalid_interval",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::Storage(_) => "storage",
    }
}

fn error_body(kind: &str, message: String) -> Value {
    json!({ "ok": false, "error": kind, "message": message })
}

fn engine_error_body(e: &EngineError) -> Value {
    let mut body = error_body(error_kind(e), e.to_string());
    if let EngineError::Conflict(existing) = e {
        body["conflicting_id"] = json!(existing);
    }
    body
}

// ── Command execution ────────────────────────────────────

async fn execute(engine: &Engine, cmd: Command) -> Result<Value, EngineError> {
    match cmd {
        Command::ListRooms => {
            let rooms = engine.list_rooms().await?;
            Ok(json!({ "rooms": rooms }))
        }
        Command::AddRoom { name } => {
            let room = engine.add_room(name).await?;
            Ok(json!({ "room": room }))
        }
        Command::Book { room_id, date, slot } => {
            let booking = engine.create_booking(room_id, date, slot).await?;
            Ok(json!({ "booking": BookingView::from(&booking) }))
        }
        Command::Move {
            id,
            room_id,
            date,
            slot,
        } => {
            let booking = engine.update_booking(id, room_id, date, slot).await?;
            Ok(json!({ "booking": BookingView::from(&booking) }))
        }
        Command::Cancel { id } => {
            engine.delete_booking(id).await?;
            Ok(json!({ "deleted": id }))
        }
        Command::Get { id } => {
            let booking = engine.get_booking(id).await?;
            Ok(json!({ "booking": BookingView::from(&booking) }))
        }
        Command::Check {
            room_id,
            date,
            slot,
            exclude_id,
        } => {
            let conflict = engine.find_conflict(room_id, date, slot, exclude_id).await?;
            Ok(json!({
                "available": conflict.is_none(),
                "conflict": conflict.as_ref().map(BookingView::from),
            }))
        }
        Command::ListAll => {
            let bookings = engine.list_all_bookings().await?;
            Ok(json!({ "bookings": bookings_json(&bookings) }))
        }
        Command::List { room_id, date } => {
            let bookings = engine.list_bookings(room_id, date).await?;
            Ok(json!({ "bookings": bookings_json(&bookings) }))
        }
        Command::Free {
            room_id,
            date,
            min_duration,
        } => {
            let free = engine.free_slots(room_id, date, None, min_duration).await?;
            let free: Vec<SlotView> = free.iter().map(SlotView::from).collect();
            Ok(json!({ "free": free }))
        }
    }
}

/// Parse and run one protocol line, returning the JSON response object.
pub async fn handle_line(engine: &Engine, line: &str) -> Value {
    let cmd = match parse_line(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            metrics::counter!(COMMANDS_TOTAL, "command" => "invalid", "status" => "error").increment(1);
            return error_body("bad_request", e.to_string());
        }
    };

    let label = command_label(&cmd);
    let started = Instant::now();
    let result = execute(engine, cmd).await;
    metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => label)
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(mut body) => {
            metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => "ok").increment(1);
            body["ok"] = json!(true);
            body
        }
        Err(e) => {
            metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => "error").increment(1);
            if matches!(e, EngineError::Storage(_)) {
                error!("{label} failed: {e}");
            } else {
                debug!("{label} rejected: {e}");
            }
            engine_error_body(&e)
        }
    }
}

// ── Connections ──────────────────────────────────────────

/// Serve one client: one command per line in, one JSON object per line out.
pub async fn process_connection<S>(socket: S, engine: Arc<Engine>) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(line) = framed.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let body = error_body("bad_request", format!("line longer than {MAX_LINE_LEN} bytes"));
                framed.send(body.to_string()).await?;
                debug!("closing connection after oversized line");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&engine, &line).await;
        framed.send(response.to_string()).await?;
    }
    Ok(())
}

/// Accept loop. Stops accepting when `shutdown` resolves, then waits up to
/// [`DRAIN_TIMEOUT`] for open connections to finish.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<Engine>,
    max_connections: usize,
    shutdown: impl Future<Output = ()>,
) {
    let semaphore = Arc::new(Semaphore::new(max_connections));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
                let engine = engine.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = process_connection(socket, engine).await {
                        error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(DRAIN_TIMEOUT);
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn engine_with_room() -> (Arc<Engine>, RoomId) {
        let engine = Engine::in_memory();
        let room = engine.add_room("Room 1").await.unwrap();
        (Arc::new(engine), room.id)
    }

    #[tokio::test]
    async fn book_returns_wire_shape() {
        let (engine, room) = engine_with_room().await;
        let resp = handle_line(&engine, &format!("BOOK {room} 2024-05-06 09:00 10:00")).await;

        assert_eq!(resp["ok"], true);
        let booking = &resp["booking"];
        assert_eq!(booking["room_id"], room.to_string());
        assert_eq!(booking["date"], "2024-05-06");
        assert_eq!(booking["start_time"], "09:00");
        assert_eq!(booking["end_time"], "10:00");
        assert!(booking["id"].is_string());
    }

    #[tokio::test]
    async fn conflict_reports_blocking_booking() {
        let (engine, room) = engine_with_room().await;
        let first = handle_line(&engine, &format!("BOOK {room} 2024-05-06 09:00 10:00")).await;
        let resp = handle_line(&engine, &format!("BOOK {room} 2024-05-06 09:30 11:00")).await;

        assert_eq!(resp["ok"], false);
        assert_eq!(resp["error"], "conflict");
        assert_eq!(resp["conflicting_id"], first["booking"]["id"]);
        assert!(resp["message"].as_str().unwrap().contains("room not available at this time"));
    }

    #[tokio::test]
    async fn error_kinds_map_engine_errors() {
        let (engine, room) = engine_with_room().await;
        let ghost = ulid::Ulid::new();

        let resp = handle_line(&engine, &format!("BOOK {room} 2024-05-06 10:00 09:00")).await;
        assert_eq!(resp["error"], "invalid_interval");
        let resp = handle_line(&engine, &format!("BOOK {ghost} 2024-05-06 09:00 10:00")).await;
        assert_eq!(resp["error"], "room_not_found");
        let resp = handle_line(&engine, &format!("CANCEL {ghost}")).await;
        assert_eq!(resp["error"], "not_found");
        let resp = handle_line(&engine, "BOOK nonsense").await;
        assert_eq!(resp["error"], "bad_request");
    }

    #[tokio::test]
    async fn check_and_free() {
        let (engine, room) = engine_with_room().await;
        handle_line(&engine, &format!("BOOK {room} 2024-05-06 09:00 10:00")).await;

        let resp = handle_line(&engine, &format!("CHECK {room} 2024-05-06 10:00 11:00")).await;
        assert_eq!(resp["available"], true);
        assert!(resp["conflict"].is_null());

        let resp = handle_line(&engine, &format!("CHECK {room} 2024-05-06 09:59 11:00")).await;
        assert_eq!(resp["available"], false);
        assert_eq!(resp["conflict"]["start_time"], "09:00");

        let resp = handle_line(&engine, &format!("FREE {room} 2024-05-06")).await;
        let free = resp["free"].as_array().unwrap();
        assert_eq!(free.len(), 2);
        assert_eq!(free[0]["start_time"], "00:00");
        assert_eq!(free[0]["end_time"], "09:00");
        assert_eq!(free[1]["start_time"], "10:00");
        assert_eq!(free[1]["end_time"], "23:59");
    }

    #[tokio::test]
    async fn connection_speaks_json_lines() {
        let (engine, room) = engine_with_room().await;
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(process_connection(server, engine));

        let (read, mut write) = tokio::io::split(client);
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"ROOMS\n\n").await.unwrap();
        let resp: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["rooms"][0]["id"], room.to_string());
        assert_eq!(resp["rooms"][0]["name"], "Room 1");

        write.write_all(b"LIST\r\n").await.unwrap();
        let resp: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["bookings"], json!([]));

        drop(write);
        drop(lines);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_line_closes_connection() {
        let (engine, _) = engine_with_room().await;
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(process_connection(server, engine));

        let (read, mut write) = tokio::io::split(client);
        let mut lines = BufReader::new(read).lines();

        let long = "X".repeat(MAX_LINE_LEN + 10);
        write.write_all(format!("{long}\n").as_bytes()).await.unwrap();
        let resp: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(resp["error"], "bad_request");
        assert!(lines.next_line().await.unwrap().is_none());
        task.await.unwrap().unwrap();
    }
}
