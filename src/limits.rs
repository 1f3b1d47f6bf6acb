/// Max rooms a single store may hold.
pub const MAX_ROOMS: usize = 10_000;

/// Max bookings in one `(room, date)` scope.
pub const MAX_BOOKINGS_PER_SCOPE: usize = 1_440;

/// Max room display-name length in bytes.
pub const MAX_ROOM_NAME_LEN: usize = 256;

/// Max length of one line on the command surface.
pub const MAX_LINE_LEN: usize = 4_096;
