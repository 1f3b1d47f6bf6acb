use crate::model::*;

// ── Free-time computation ─────────────────────────────────────────

/// Free slots of one scope inside `window`. `bookings` need not be sorted.
pub fn free_slots(bookings: &[Booking], window: &Slot) -> Vec<Slot> {
    gaps(window, &busy_periods(bookings, window))
}

/// The parts of `window` covered by at least one booking, sorted and disjoint.
/// Touching bookings coalesce into one period.
pub fn busy_periods(bookings: &[Booking], window: &Slot) -> Vec<Slot> {
    let mut clipped: Vec<Slot> = bookings
        .iter()
        .filter_map(|b| b.slot.clamp_to(window))
        .collect();
    clipped.sort_unstable_by_key(|s| s.start);

    clipped.into_iter().fold(Vec::new(), |mut periods: Vec<Slot>, next| {
        match periods.last_mut() {
            Some(open) if next.start <= open.end => open.end = open.end.max(next.end),
            _ => periods.push(next),
        }
        periods
    })
}

/// `window` minus `busy`, which must be sorted, disjoint and inside `window`.
pub fn gaps(window: &Slot, busy: &[Slot]) -> Vec<Slot> {
    let mut free_from = window.start;
    let mut free: Vec<Slot> = busy
        .iter()
        .filter_map(|period| {
            let gap = (period.start > free_from).then(|| Slot::new(free_from, period.start));
            free_from = free_from.max(period.end);
            gap
        })
        .collect();
    if free_from < window.end {
        free.push(Slot::new(free_from, window.end));
    }
    free
}
