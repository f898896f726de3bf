use ulid::Ulid;

use crate::model::*;

use super::availability;
use super::{Engine, EngineError};

impl Engine {
    /// Derived availability for a window: stock minus the overlap sum of
    /// active borrowings. Never consults a counter.
    pub async fn available_quantity(
        &self,
        equipment_id: Ulid,
        range: DayRange,
    ) -> Result<(u32, u32), EngineError> {
        availability::validate_range(&range)?;
        let es = self
            .get_equipment(&equipment_id)
            .ok_or(EngineError::NotFound(equipment_id))?;
        let guard = es.read().await;
        let taken = availability::overlapping_quantity(&guard, &range, None);
        Ok((guard.info.quantity_total, guard.info.quantity_total.saturating_sub(taken)))
    }

    /// Active reservations on a facility's date, in start order.
    pub async fn day_schedule(
        &self,
        facility_id: Ulid,
        date: Day,
    ) -> Result<Vec<ReservationInfo>, EngineError> {
        let fs = self
            .get_facility(&facility_id)
            .ok_or(EngineError::NotFound(facility_id))?;
        let guard = fs.read().await;
        Ok(guard
            .on_date(date)
            .filter(|r| r.status.is_active())
            .map(|r| reservation_info(facility_id, r))
            .collect())
    }

    /// Gaps between active reservations inside `[open, close)` on `date`.
    pub async fn free_windows(
        &self,
        facility_id: Ulid,
        date: Day,
        open: Minutes,
        close: Minutes,
    ) -> Result<Vec<FreeWindow>, EngineError> {
        let fs = self
            .get_facility(&facility_id)
            .ok_or(EngineError::NotFound(facility_id))?;
        let guard = fs.read().await;
        Ok(availability::free_windows(&guard, date, open, close))
    }

    /// All facilities, name order.
    pub async fn list_facilities(&self) -> Vec<Facility> {
        let mut out = Vec::new();
        for entry in self.facilities.iter() {
            let fs = entry.value().clone();
            let guard = fs.read().await;
            out.push(guard.info.clone());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// All equipment items, name order.
    pub async fn list_equipment(&self) -> Vec<Equipment> {
        let mut out = Vec::new();
        for entry in self.equipment.iter() {
            let es = entry.value().clone();
            let guard = es.read().await;
            out.push(guard.info.clone());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Reservations, optionally filtered by requester and/or status.
    pub async fn list_reservations(
        &self,
        requester: Option<Ulid>,
        status: Option<ReservationStatus>,
    ) -> Vec<ReservationInfo> {
        let mut out = Vec::new();
        for entry in self.facilities.iter() {
            let fs = entry.value().clone();
            let guard = fs.read().await;
            for r in &guard.reservations {
                if requester.is_some_and(|u| u != r.requester) {
                    continue;
                }
                if status.is_some_and(|s| s != r.status) {
                    continue;
                }
                out.push(reservation_info(guard.info.id, r));
            }
        }
        out.sort_by_key(|r| (r.slot.date, r.slot.start));
        out
    }

    /// Borrowings, optionally filtered by requester and/or status.
    pub async fn list_borrowings(
        &self,
        requester: Option<Ulid>,
        status: Option<BorrowingStatus>,
    ) -> Vec<BorrowingInfo> {
        let mut out = Vec::new();
        for entry in self.equipment.iter() {
            let es = entry.value().clone();
            let guard = es.read().await;
            for b in &guard.borrowings {
                if requester.is_some_and(|u| u != b.requester) {
                    continue;
                }
                if status.is_some_and(|s| s != b.status) {
                    continue;
                }
                out.push(borrowing_info(guard.info.id, b));
            }
        }
        out.sort_by_key(|b| b.range.start);
        out
    }

    /// A user's notification feed, newest first.
    pub fn notifications_for_user(&self, user_id: Ulid, unread_only: bool) -> Vec<Notification> {
        let mut out: Vec<Notification> = self
            .feeds
            .get(&user_id)
            .map(|feed| {
                feed.iter()
                    .filter(|n| !unread_only || !n.read)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.reverse();
        out
    }

    pub fn unread_count(&self, user_id: Ulid) -> u64 {
        self.feeds
            .get(&user_id)
            .map(|feed| feed.iter().filter(|n| !n.read).count() as u64)
            .unwrap_or(0)
    }

    // ── Reporting rollups ────────────────────────────────

    pub async fn facility_usage(&self) -> Vec<FacilityUsage> {
        let mut out = Vec::new();
        for entry in self.facilities.iter() {
            let fs = entry.value().clone();
            let guard = fs.read().await;
            let mut row = FacilityUsage {
                facility_id: guard.info.id,
                name: guard.info.name.clone(),
                total: 0,
                approved: 0,
                pending: 0,
                rejected: 0,
            };
            for r in &guard.reservations {
                row.total += 1;
                match r.status {
                    ReservationStatus::Approved => row.approved += 1,
                    ReservationStatus::Pending => row.pending += 1,
                    ReservationStatus::Rejected => row.rejected += 1,
                    _ => {}
                }
            }
            out.push(row);
        }
        out.sort_by(|a, b| b.total.cmp(&a.total));
        out
    }

    pub async fn equipment_usage(&self) -> Vec<EquipmentUsage> {
        let mut out = Vec::new();
        for entry in self.equipment.iter() {
            let es = entry.value().clone();
            let guard = es.read().await;
            let out_now = guard
                .borrowings
                .iter()
                .filter(|b| {
                    matches!(b.status, BorrowingStatus::Borrowed | BorrowingStatus::Overdue)
                })
                .map(|b| b.quantity as u64)
                .sum();
            out.push(EquipmentUsage {
                equipment_id: guard.info.id,
                name: guard.info.name.clone(),
                quantity_total: guard.info.quantity_total,
                total_requests: guard.borrowings.len() as u64,
                out_now,
            });
        }
        out.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));
        out
    }

    pub async fn dashboard_stats(&self, today: Day) -> DashboardStats {
        let mut stats = DashboardStats::default();
        for entry in self.facilities.iter() {
            let fs = entry.value().clone();
            let guard = fs.read().await;
            for r in &guard.reservations {
                if r.status == ReservationStatus::Pending {
                    stats.pending_reservations += 1;
                }
                if r.status.is_active() {
                    stats.active_reservations += 1;
                }
                if r.slot.date == today {
                    stats.reservations_today += 1;
                }
            }
        }
        for entry in self.equipment.iter() {
            let es = entry.value().clone();
            let guard = es.read().await;
            for b in &guard.borrowings {
                if b.status == BorrowingStatus::Pending {
                    stats.pending_borrowings += 1;
                }
                if b.status.consumes_stock() {
                    stats.active_borrowings += 1;
                }
                if b.range.start == today {
                    stats.borrowings_starting_today += 1;
                }
            }
        }
        stats
    }
}

fn reservation_info(facility_id: Ulid, r: &Reservation) -> ReservationInfo {
    ReservationInfo {
        id: r.id,
        facility_id,
        requester: r.requester,
        slot: r.slot,
        purpose: r.purpose.clone(),
        status: r.status,
        admin_notes: r.admin_notes.clone(),
    }
}

fn borrowing_info(equipment_id: Ulid, b: &Borrowing) -> BorrowingInfo {
    BorrowingInfo {
        id: b.id,
        equipment_id,
        requester: b.requester,
        quantity: b.quantity,
        range: b.range,
        purpose: b.purpose.clone(),
        status: b.status,
        admin_notes: b.admin_notes.clone(),
        actual_return_day: b.actual_return_day,
    }
}
