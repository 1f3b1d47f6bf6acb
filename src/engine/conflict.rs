use crate::model::*;

use super::EngineError;

pub(crate) fn validate_slot(slot: &Slot) -> Result<(), EngineError> {
    if slot.start >= slot.end {
        return Err(EngineError::InvalidInterval {
            start: slot.start,
            end: slot.end,
        });
    }
    Ok(())
}

/// First booking of a scope that overlaps `slot`, ignoring `exclude_id`.
///
/// `scope` must already be narrowed to one room and date. Overlap is the
/// half-open test `slot.start < b.end && slot.end > b.start`, so a booking that
/// ends exactly when the candidate starts is not a conflict.
pub fn find_conflict<'a>(
    scope: &'a [Booking],
    slot: &Slot,
    exclude_id: Option<BookingId>,
) -> Option<&'a Booking> {
    scope
        .iter()
        .filter(|b| Some(b.id) != exclude_id)
        .find(|b| b.slot.overlaps(slot))
}

pub(crate) fn check_no_conflict(
    scope: &[Booking],
    slot: &Slot,
    exclude_id: Option<BookingId>,
) -> Result<(), EngineError> {
    match find_conflict(scope, slot, exclude_id) {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
