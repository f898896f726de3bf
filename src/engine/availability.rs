use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

// ── Availability Checker ─────────────────────────────────────────

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

const MS_PER_DAY: Ms = 86_400_000;

pub(crate) fn today() -> Day {
    now_ms() / MS_PER_DAY
}

pub(crate) fn validate_slot(slot: &TimeSlot) -> Result<(), EngineError> {
    if slot.date < MIN_VALID_DAY || slot.date > MAX_VALID_DAY {
        return Err(EngineError::InvalidInput("reservation date out of range"));
    }
    if slot.start < 0 || slot.end > MINUTES_PER_DAY {
        return Err(EngineError::InvalidInput("slot outside the day"));
    }
    if slot.start >= slot.end {
        return Err(EngineError::InvalidInput("slot start must be before end"));
    }
    Ok(())
}

pub(crate) fn validate_range(range: &DayRange) -> Result<(), EngineError> {
    if range.start < MIN_VALID_DAY || range.end > MAX_VALID_DAY {
        return Err(EngineError::InvalidInput("borrowing dates out of range"));
    }
    if range.start > range.end {
        return Err(EngineError::InvalidInput("return date before borrow date"));
    }
    if range.days() > MAX_RANGE_DAYS {
        return Err(EngineError::InvalidInput("borrowing window too long"));
    }
    Ok(())
}

/// Facility interval check: first active reservation whose half-open slot
/// overlaps `slot`, if any. Active means PENDING or APPROVED. `exclude`
/// skips the record being re-validated so it never conflicts with itself.
///
/// Read-only — the caller decides how to react to a hit.
pub fn find_slot_conflict(
    fs: &FacilityState,
    slot: &TimeSlot,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    fs.on_date(slot.date)
        .filter(|r| r.status.is_active())
        .filter(|r| exclude != Some(r.id))
        .find(|r| r.slot.overlaps(slot))
        .map(|r| r.id)
}

/// Equipment overlap-quantity check: sum of quantities over borrowings with
/// status APPROVED or BORROWED whose closed range overlaps `range`. Returns
/// 0 when nothing overlaps. `exclude` subtracts the record being
/// re-validated (an APPROVED borrowing moving to BORROWED is already in the
/// sum and must not be counted twice).
pub fn overlapping_quantity(es: &EquipmentState, range: &DayRange, exclude: Option<Ulid>) -> u32 {
    es.overlapping(range)
        .filter(|b| b.status.consumes_stock())
        .filter(|b| exclude != Some(b.id))
        .map(|b| b.quantity)
        .sum()
}

/// Reject unless `overlapping + requested <= quantity_total`.
pub fn check_capacity(
    es: &EquipmentState,
    range: &DayRange,
    requested: u32,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let taken = overlapping_quantity(es, range, exclude);
    let total = es.info.quantity_total;
    if taken + requested > total {
        return Err(EngineError::CapacityExceeded {
            requested,
            available: total.saturating_sub(taken),
        });
    }
    Ok(())
}

/// Derived availability for a window: stock minus the overlap sum.
pub fn available_quantity(es: &EquipmentState, range: &DayRange) -> u32 {
    es.info
        .quantity_total
        .saturating_sub(overlapping_quantity(es, range, None))
}

/// Gaps between active reservations on `date`, inside the opening window
/// `[open, close)`. Interval subtraction over the sorted slot list: walk the
/// active slots in start order, advancing a cursor through the window.
pub fn free_windows(fs: &FacilityState, date: Day, open: Minutes, close: Minutes) -> Vec<FreeWindow> {
    let mut result = Vec::new();
    if open >= close {
        return result;
    }

    let mut cursor = open;
    for r in fs.on_date(date).filter(|r| r.status.is_active()) {
        if r.slot.end <= cursor {
            continue;
        }
        if r.slot.start >= close {
            break;
        }
        if r.slot.start > cursor {
            result.push(FreeWindow {
                start: cursor,
                end: r.slot.start.min(close),
            });
        }
        cursor = cursor.max(r.slot.end);
        if cursor >= close {
            return result;
        }
    }

    if cursor < close {
        result.push(FreeWindow {
            start: cursor,
            end: close,
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facility() -> FacilityState {
        FacilityState::new(Facility {
            id: Ulid::new(),
            name: "Conference Room 2".into(),
            kind: FacilityKind::ConferenceRoom,
            building: "West".into(),
            floor: 2,
            capacity: 12,
            status: ResourceStatus::Available,
        })
    }

    fn equipment(total: u32) -> EquipmentState {
        EquipmentState::new(Equipment {
            id: Ulid::new(),
            name: "Wireless Mic".into(),
            category: EquipmentCategory::Microphone,
            quantity_total: total,
            status: ResourceStatus::Available,
        })
    }

    fn reservation(date: Day, start: Minutes, end: Minutes, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            requester: Ulid::new(),
            slot: TimeSlot::new(date, start, end),
            purpose: "test".into(),
            status,
            admin_notes: None,
            decided_by: None,
            decided_at: None,
            created_at: 0,
        }
    }

    fn borrowing(start: Day, end: Day, quantity: u32, status: BorrowingStatus) -> Borrowing {
        Borrowing {
            id: Ulid::new(),
            requester: Ulid::new(),
            quantity,
            range: DayRange::new(start, end),
            purpose: "test".into(),
            status,
            admin_notes: None,
            decided_by: None,
            decided_at: None,
            actual_return_day: None,
            created_at: 0,
        }
    }

    // ── facility slot conflicts ───────────────────────────

    #[test]
    fn conflict_on_overlap() {
        let mut fs = facility();
        fs.insert_reservation(reservation(200, 540, 600, ReservationStatus::Approved));
        let hit = find_slot_conflict(&fs, &TimeSlot::new(200, 570, 630), None);
        assert!(hit.is_some());
    }

    #[test]
    fn back_to_back_is_not_a_conflict() {
        let mut fs = facility();
        // 09:00-10:00 approved; 10:00-11:00 requested
        fs.insert_reservation(reservation(200, 540, 600, ReservationStatus::Approved));
        let hit = find_slot_conflict(&fs, &TimeSlot::new(200, 600, 660), None);
        assert!(hit.is_none());
    }

    #[test]
    fn pending_counts_toward_conflicts() {
        let mut fs = facility();
        fs.insert_reservation(reservation(200, 540, 600, ReservationStatus::Pending));
        let hit = find_slot_conflict(&fs, &TimeSlot::new(200, 550, 610), None);
        assert!(hit.is_some());
    }

    #[test]
    fn cancelled_and_rejected_do_not_conflict() {
        let mut fs = facility();
        fs.insert_reservation(reservation(200, 540, 600, ReservationStatus::Cancelled));
        fs.insert_reservation(reservation(200, 540, 600, ReservationStatus::Rejected));
        let hit = find_slot_conflict(&fs, &TimeSlot::new(200, 540, 600), None);
        assert!(hit.is_none());
    }

    #[test]
    fn other_dates_do_not_conflict() {
        let mut fs = facility();
        fs.insert_reservation(reservation(200, 540, 600, ReservationStatus::Approved));
        let hit = find_slot_conflict(&fs, &TimeSlot::new(201, 540, 600), None);
        assert!(hit.is_none());
    }

    #[test]
    fn exclude_skips_self() {
        let mut fs = facility();
        let r = reservation(200, 540, 600, ReservationStatus::Pending);
        let id = r.id;
        fs.insert_reservation(r);
        // re-validating its own slot must not see itself
        assert!(find_slot_conflict(&fs, &TimeSlot::new(200, 540, 600), Some(id)).is_none());
        assert!(find_slot_conflict(&fs, &TimeSlot::new(200, 540, 600), None).is_some());
    }

    // ── equipment overlap quantity ────────────────────────

    #[test]
    fn overlap_sum_empty_is_zero() {
        let es = equipment(3);
        assert_eq!(overlapping_quantity(&es, &DayRange::new(100, 110), None), 0);
    }

    #[test]
    fn overlap_sum_counts_approved_and_borrowed() {
        let mut es = equipment(10);
        es.insert_borrowing(borrowing(100, 105, 2, BorrowingStatus::Approved));
        es.insert_borrowing(borrowing(103, 108, 3, BorrowingStatus::Borrowed));
        es.insert_borrowing(borrowing(100, 105, 4, BorrowingStatus::Pending));
        es.insert_borrowing(borrowing(100, 105, 4, BorrowingStatus::Returned));
        assert_eq!(overlapping_quantity(&es, &DayRange::new(104, 110), None), 5);
    }

    #[test]
    fn overlap_sum_boundary_day_inclusive() {
        let mut es = equipment(3);
        // ends on day 110; a request starting day 110 still overlaps
        es.insert_borrowing(borrowing(100, 110, 2, BorrowingStatus::Approved));
        assert_eq!(overlapping_quantity(&es, &DayRange::new(110, 115), None), 2);
        assert_eq!(overlapping_quantity(&es, &DayRange::new(111, 115), None), 0);
    }

    #[test]
    fn overlap_sum_excludes_given_id() {
        let mut es = equipment(3);
        let b = borrowing(100, 110, 2, BorrowingStatus::Approved);
        let id = b.id;
        es.insert_borrowing(b);
        assert_eq!(overlapping_quantity(&es, &DayRange::new(100, 110), Some(id)), 0);
    }

    #[test]
    fn capacity_check_scenario() {
        // Stock 3. A holds 2 units over [1, 5].
        let mut es = equipment(3);
        es.insert_borrowing(borrowing(1, 5, 2, BorrowingStatus::Approved));

        // B wants 2 over [3, 7]: 2 + 2 > 3 — refused.
        let err = check_capacity(&es, &DayRange::new(3, 7), 2, None).unwrap_err();
        match err {
            EngineError::CapacityExceeded { requested, available } => {
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }

        // C wants 1 over [3, 7]: 2 + 1 <= 3 — fine.
        check_capacity(&es, &DayRange::new(3, 7), 1, None).unwrap();
    }

    #[test]
    fn available_quantity_derived() {
        let mut es = equipment(5);
        es.insert_borrowing(borrowing(10, 20, 3, BorrowingStatus::Borrowed));
        assert_eq!(available_quantity(&es, &DayRange::new(15, 25)), 2);
        assert_eq!(available_quantity(&es, &DayRange::new(21, 25)), 5);
    }

    // ── free windows ──────────────────────────────────────

    #[test]
    fn free_windows_basic() {
        let mut fs = facility();
        fs.insert_reservation(reservation(200, 600, 630, ReservationStatus::Approved));
        // open 09:00, close 12:00, booked 10:00-10:30
        let free = free_windows(&fs, 200, 540, 720);
        assert_eq!(
            free,
            vec![
                FreeWindow { start: 540, end: 600 },
                FreeWindow { start: 630, end: 720 },
            ]
        );
    }

    #[test]
    fn free_windows_empty_day_is_whole_window() {
        let fs = facility();
        let free = free_windows(&fs, 200, 540, 720);
        assert_eq!(free, vec![FreeWindow { start: 540, end: 720 }]);
    }

    #[test]
    fn free_windows_ignores_inactive() {
        let mut fs = facility();
        fs.insert_reservation(reservation(200, 600, 660, ReservationStatus::Cancelled));
        let free = free_windows(&fs, 200, 540, 720);
        assert_eq!(free, vec![FreeWindow { start: 540, end: 720 }]);
    }

    #[test]
    fn free_windows_fully_booked() {
        let mut fs = facility();
        fs.insert_reservation(reservation(200, 500, 800, ReservationStatus::Approved));
        let free = free_windows(&fs, 200, 540, 720);
        assert!(free.is_empty());
    }

    #[test]
    fn free_windows_clamps_to_opening() {
        let mut fs = facility();
        // booking spills past close
        fs.insert_reservation(reservation(200, 700, 780, ReservationStatus::Approved));
        let free = free_windows(&fs, 200, 540, 720);
        assert_eq!(free, vec![FreeWindow { start: 540, end: 700 }]);
    }

    #[test]
    fn free_windows_adjacent_bookings_merge_nothing() {
        let mut fs = facility();
        fs.insert_reservation(reservation(200, 540, 600, ReservationStatus::Approved));
        fs.insert_reservation(reservation(200, 600, 660, ReservationStatus::Approved));
        let free = free_windows(&fs, 200, 540, 720);
        assert_eq!(free, vec![FreeWindow { start: 660, end: 720 }]);
    }

    // ── validation ────────────────────────────────────────

    #[test]
    fn validate_slot_rejects_inverted() {
        let slot = TimeSlot { date: 200, start: 600, end: 600 };
        assert!(matches!(
            validate_slot(&slot),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_slot_rejects_out_of_day() {
        let slot = TimeSlot { date: 200, start: 1400, end: 1500 };
        assert!(validate_slot(&slot).is_err());
    }

    #[test]
    fn validate_range_rejects_inverted() {
        let range = DayRange { start: 10, end: 9 };
        assert!(validate_range(&range).is_err());
    }

    #[test]
    fn validate_range_rejects_too_long() {
        let range = DayRange::new(0, MAX_RANGE_DAYS + 10);
        assert!(matches!(
            validate_range(&range),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
