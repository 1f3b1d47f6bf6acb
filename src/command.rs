use chrono::{Duration, NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::*;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Parsed command from one protocol line.
#[derive(Debug, PartialEq)]
pub enum Command {
    ListRooms,
    AddRoom {
        name: String,
    },
    Book {
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
    },
    Move {
        id: BookingId,
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
    },
    Cancel {
        id: BookingId,
    },
    Get {
        id: BookingId,
    },
    Check {
        room_id: RoomId,
        date: NaiveDate,
        slot: Slot,
        exclude_id: Option<BookingId>,
    },
    ListAll,
    List {
        room_id: RoomId,
        date: NaiveDate,
    },
    Free {
        room_id: RoomId,
        date: NaiveDate,
        min_duration: Option<Duration>,
    },
}

const USAGE_ROOM: &str = "ROOM <name>";
const USAGE_BOOK: &str = "BOOK <room_id> <YYYY-MM-DD> <HH:MM> <HH:MM>";
const USAGE_MOVE: &str = "MOVE <booking_id> <room_id> <YYYY-MM-DD> <HH:MM> <HH:MM>";
const USAGE_CANCEL: &str = "CANCEL <booking_id>";
const USAGE_GET: &str = "GET <booking_id>";
const USAGE_CHECK: &str = "CHECK <room_id> <YYYY-MM-DD> <HH:MM> <HH:MM> [<exclude_id>]";
const USAGE_LIST: &str = "LIST [<room_id> <YYYY-MM-DD>]";
const USAGE_FREE: &str = "FREE <room_id> <YYYY-MM-DD> [<min_minutes>]";

pub fn parse_line(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    if verb.is_empty() {
        return Err(CommandError::Empty);
    }
    let args: Vec<&str> = rest.split_whitespace().collect();

    match verb.to_ascii_uppercase().as_str() {
        "ROOMS" => match args[..] {
            [] => Ok(Command::ListRooms),
            _ => Err(CommandError::Usage("ROOMS")),
        },
        "ROOM" => {
            if rest.is_empty() {
                return Err(CommandError::Usage(USAGE_ROOM));
            }
            Ok(Command::AddRoom {
                name: rest.to_string(),
            })
        }
        "BOOK" => match args[..] {
            [room, date, start, end] => Ok(Command::Book {
                room_id: parse_ulid(room)?,
                date: parse_date(date)?,
                slot: parse_slot(start, end)?,
            }),
            _ => Err(CommandError::Usage(USAGE_BOOK)),
        },
        "MOVE" => match args[..] {
            [id, room, date, start, end] => Ok(Command::Move {
                id: parse_ulid(id)?,
                room_id: parse_ulid(room)?,
                date: parse_date(date)?,
                slot: parse_slot(start, end)?,
            }),
            _ => Err(CommandError::Usage(USAGE_MOVE)),
        },
        "CANCEL" => match args[..] {
            [id] => Ok(Command::Cancel { id: parse_ulid(id)? }),
            _ => Err(CommandError::Usage(USAGE_CANCEL)),
        },
        "GET" => match args[..] {
            [id] => Ok(Command::Get { id: parse_ulid(id)? }),
            _ => Err(CommandError::Usage(USAGE_GET)),
        },
        "CHECK" => {
            let (room, date, start, end, exclude) = match args[..] {
                [room, date, start, end] => (room, date, start, end, None),
                [room, date, start, end, exclude] => (room, date, start, end, Some(exclude)),
                _ => return Err(CommandError::Usage(USAGE_CHECK)),
            };
            Ok(Command::Check {
                room_id: parse_ulid(room)?,
                date: parse_date(date)?,
                slot: parse_slot(start, end)?,
                exclude_id: exclude.map(parse_ulid).transpose()?,
            })
        }
        "LIST" => match args[..] {
            [] => Ok(Command::ListAll),
            [room, date] => Ok(Command::List {
                room_id: parse_ulid(room)?,
                date: parse_date(date)?,
            }),
            _ => Err(CommandError::Usage(USAGE_LIST)),
        },
        "FREE" => {
            let (room, date, min) = match args[..] {
                [room, date] => (room, date, None),
                [room, date, min] => (room, date, Some(min)),
                _ => return Err(CommandError::Usage(USAGE_FREE)),
            };
            Ok(Command::Free {
                room_id: parse_ulid(room)?,
                date: parse_date(date)?,
                min_duration: min.map(parse_minutes).transpose()?,
            })
        }
        _ => Err(CommandError::UnknownCommand(verb.to_string())),
    }
}

fn parse_ulid(s: &str) -> Result<Ulid, CommandError> {
    Ulid::from_string(s).map_err(|e| CommandError::Parse(format!("bad id {s:?}: {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| CommandError::Parse(format!("bad date {s:?}: {e}")))
}

fn parse_time(s: &str) -> Result<NaiveTime, CommandError> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|e| CommandError::Parse(format!("bad time {s:?}: {e}")))
}

/// Ordering is not checked here; the engine rejects `start >= end`.
fn parse_slot(start: &str, end: &str) -> Result<Slot, CommandError> {
    Ok(Slot {
        start: parse_time(start)?,
        end: parse_time(end)?,
    })
}

fn parse_minutes(s: &str) -> Result<Duration, CommandError> {
    let minutes: u32 = s
        .parse()
        .map_err(|e| CommandError::Parse(format!("bad minute count {s:?}: {e}")))?;
    Ok(Duration::minutes(minutes.into()))
}

#[derive(Debug, PartialEq)]
pub enum CommandError {
    Empty,
    UnknownCommand(String),
    Usage(&'static str),
    Parse(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::UnknownCommand(c) => write!(f, "unknown command: {c}"),
            CommandError::Usage(u) => write!(f, "usage: {u}"),
            CommandError::Parse(s) => write!(f, "parse error: {s}"),
        }
    }
}

impl std::error::Error for CommandError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const BOOKING: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parse_book() {
        let cmd = parse_line(&format!("BOOK {ROOM} 2024-05-06 09:00 10:30")).unwrap();
        match cmd {
            Command::Book { room_id, date, slot } => {
                assert_eq!(room_id.to_string(), ROOM);
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
                assert_eq!(slot, Slot::new(t(9, 0), t(10, 30)));
            }
            _ => panic!("expected Book, got {cmd:?}"),
        }
    }

    #[test]
    fn verbs_are_case_insensitive_and_whitespace_tolerant() {
        let cmd = parse_line(&format!("  book\t{ROOM}   2024-05-06 09:00  10:00  ")).unwrap();
        assert!(matches!(cmd, Command::Book { .. }));
        assert_eq!(parse_line("rooms").unwrap(), Command::ListRooms);
    }

    #[test]
    fn parse_move() {
        let cmd = parse_line(&format!("MOVE {BOOKING} {ROOM} 2024-05-07 14:00 15:00")).unwrap();
        match cmd {
            Command::Move { id, room_id, date, slot } => {
                assert_eq!(id.to_string(), BOOKING);
                assert_eq!(room_id.to_string(), ROOM);
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 7).unwrap());
                assert_eq!(slot.start, t(14, 0));
                assert_eq!(slot.end, t(15, 0));
            }
            _ => panic!("expected Move, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_cancel_and_get() {
        let id = Ulid::from_string(BOOKING).unwrap();
        assert_eq!(parse_line(&format!("CANCEL {BOOKING}")).unwrap(), Command::Cancel { id });
        assert_eq!(parse_line(&format!("GET {BOOKING}")).unwrap(), Command::Get { id });
    }

    #[test]
    fn parse_check_with_and_without_exclusion() {
        let cmd = parse_line(&format!("CHECK {ROOM} 2024-05-06 09:00 10:00")).unwrap();
        assert!(matches!(cmd, Command::Check { exclude_id: None, .. }));

        let cmd = parse_line(&format!("CHECK {ROOM} 2024-05-06 09:00 10:00 {BOOKING}")).unwrap();
        match cmd {
            Command::Check { exclude_id, .. } => {
                assert_eq!(exclude_id, Some(Ulid::from_string(BOOKING).unwrap()));
            }
            _ => panic!("expected Check, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_list_forms() {
        assert_eq!(parse_line("LIST").unwrap(), Command::ListAll);
        let cmd = parse_line(&format!("LIST {ROOM} 2024-05-06")).unwrap();
        assert!(matches!(cmd, Command::List { .. }));
        assert_eq!(
            parse_line(&format!("LIST {ROOM}")),
            Err(CommandError::Usage(USAGE_LIST))
        );
    }

    #[test]
    fn parse_free_min_duration() {
        let cmd = parse_line(&format!("FREE {ROOM} 2024-05-06 45")).unwrap();
        match cmd {
            Command::Free { min_duration, .. } => assert_eq!(min_duration, Some(Duration::minutes(45))),
            _ => panic!("expected Free, got {cmd:?}"),
        }
        let cmd = parse_line(&format!("FREE {ROOM} 2024-05-06")).unwrap();
        assert!(matches!(cmd, Command::Free { min_duration: None, .. }));
        assert!(matches!(
            parse_line(&format!("FREE {ROOM} 2024-05-06 -5")),
            Err(CommandError::Parse(_))
        ));
    }

    #[test]
    fn room_name_keeps_inner_spaces() {
        assert_eq!(
            parse_line("ROOM  Board Room  East ").unwrap(),
            Command::AddRoom {
                name: "Board Room  East".into()
            }
        );
        assert_eq!(parse_line("ROOM"), Err(CommandError::Usage(USAGE_ROOM)));
    }

    #[test]
    fn reversed_slot_is_left_to_the_engine() {
        let cmd = parse_line(&format!("BOOK {ROOM} 2024-05-06 10:00 09:00")).unwrap();
        match cmd {
            Command::Book { slot, .. } => assert!(slot.start > slot.end),
            _ => panic!("expected Book, got {cmd:?}"),
        }
    }

    #[test]
    fn bad_input_errors() {
        assert_eq!(parse_line("   "), Err(CommandError::Empty));
        assert_eq!(
            parse_line("RESERVE x"),
            Err(CommandError::UnknownCommand("RESERVE".into()))
        );
        assert_eq!(parse_line("BOOK a b"), Err(CommandError::Usage(USAGE_BOOK)));
        assert!(matches!(
            parse_line("BOOK not-a-ulid 2024-05-06 09:00 10:00"),
            Err(CommandError::Parse(_))
        ));
        assert!(matches!(
            parse_line(&format!("BOOK {ROOM} 2024-13-01 09:00 10:00")),
            Err(CommandError::Parse(_))
        ));
        assert!(matches!(
            parse_line(&format!("BOOK {ROOM} 2024-05-06 9am 10:00")),
            Err(CommandError::Parse(_))
        ));
        assert_eq!(parse_line("ROOMS extra"), Err(CommandError::Usage("ROOMS")));
    }
}
