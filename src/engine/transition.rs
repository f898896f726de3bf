use crate::model::{BorrowingStatus, ReservationStatus};

use super::EngineError;

/// Legal reservation transitions. Everything else — including re-applying a
/// terminal status — is refused, so compensating side effects can never be
/// emitted twice.
pub(super) fn reservation_step(
    from: ReservationStatus,
    to: ReservationStatus,
) -> Result<(), EngineError> {
    use ReservationStatus::*;
    let ok = matches!(
        (from, to),
        (Pending, Approved)
            | (Pending, Rejected)
            | (Pending, Cancelled)
            | (Approved, Cancelled)
            | (Approved, Rejected)
            | (Approved, Completed)
    );
    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// Legal borrowing transitions. OVERDUE is entered only by the sweeper;
/// APPROVED → RETURNED covers the requester handing the item back before
/// pickup was recorded.
pub(super) fn borrowing_step(
    from: BorrowingStatus,
    to: BorrowingStatus,
) -> Result<(), EngineError> {
    use BorrowingStatus::*;
    let ok = matches!(
        (from, to),
        (Pending, Approved)
            | (Pending, Rejected)
            | (Pending, Cancelled)
            | (Approved, Borrowed)
            | (Approved, Cancelled)
            | (Approved, Rejected)
            | (Approved, Returned)
            | (Borrowed, Returned)
            | (Borrowed, Overdue)
            | (Overdue, Returned)
    );
    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// Statuses an admin may set directly. CANCELLED belongs to the owner,
/// COMPLETED and OVERDUE to the sweeper.
pub(super) fn admin_may_set_reservation(to: ReservationStatus) -> bool {
    matches!(to, ReservationStatus::Approved | ReservationStatus::Rejected)
}

pub(super) fn admin_may_set_borrowing(to: BorrowingStatus) -> bool {
    matches!(
        to,
        BorrowingStatus::Approved
            | BorrowingStatus::Rejected
            | BorrowingStatus::Borrowed
            | BorrowingStatus::Returned
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BorrowingStatus::*, ReservationStatus};

    #[test]
    fn reservation_legal_paths() {
        use ReservationStatus::*;
        reservation_step(Pending, Approved).unwrap();
        reservation_step(Pending, Rejected).unwrap();
        reservation_step(Pending, Cancelled).unwrap();
        reservation_step(Approved, Cancelled).unwrap();
        reservation_step(Approved, Rejected).unwrap();
        reservation_step(Approved, Completed).unwrap();
    }

    #[test]
    fn reservation_terminal_is_final() {
        use ReservationStatus::*;
        for from in [Rejected, Cancelled, Completed] {
            for to in [Pending, Approved, Rejected, Cancelled, Completed] {
                assert!(
                    reservation_step(from, to).is_err(),
                    "{from:?} -> {to:?} should be refused"
                );
            }
        }
    }

    #[test]
    fn reservation_reapplying_terminal_is_refused() {
        use ReservationStatus::*;
        assert!(matches!(
            reservation_step(Rejected, Rejected),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn borrowing_legal_paths() {
        borrowing_step(Pending, Approved).unwrap();
        borrowing_step(Approved, Borrowed).unwrap();
        borrowing_step(Borrowed, Returned).unwrap();
        borrowing_step(Borrowed, Overdue).unwrap();
        borrowing_step(Overdue, Returned).unwrap();
        borrowing_step(Approved, Returned).unwrap();
        borrowing_step(Approved, Rejected).unwrap();
    }

    #[test]
    fn borrowing_illegal_paths() {
        assert!(borrowing_step(Pending, Borrowed).is_err());
        assert!(borrowing_step(Pending, Returned).is_err());
        assert!(borrowing_step(Returned, Borrowed).is_err());
        assert!(borrowing_step(Cancelled, Approved).is_err());
        assert!(borrowing_step(Rejected, Rejected).is_err());
        assert!(borrowing_step(Overdue, Cancelled).is_err());
    }

    #[test]
    fn admin_settable_statuses() {
        assert!(admin_may_set_reservation(ReservationStatus::Approved));
        assert!(!admin_may_set_reservation(ReservationStatus::Cancelled));
        assert!(!admin_may_set_reservation(ReservationStatus::Completed));
        assert!(admin_may_set_borrowing(Borrowed));
        assert!(admin_may_set_borrowing(Returned));
        assert!(!admin_may_set_borrowing(Overdue));
        assert!(!admin_may_set_borrowing(Cancelled));
    }
}
