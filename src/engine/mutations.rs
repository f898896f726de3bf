use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{check_capacity, find_slot_conflict, now_ms, today, validate_range, validate_slot};
use super::transition::{
    admin_may_set_borrowing, admin_may_set_reservation, borrowing_step, reservation_step,
};
use super::{Engine, EngineError, WalCommand};

// ── Notification builders ────────────────────────────────────────

fn submitted_notification(
    user_id: Ulid,
    kind: RequestKind,
    resource_name: &str,
    reference: Ulid,
    at: Ms,
) -> Event {
    let (what, title) = match kind {
        RequestKind::Reservation => ("reservation", "Reservation Request Submitted"),
        RequestKind::Borrowing => ("borrowing request", "Borrowing Request Submitted"),
    };
    Event::NotificationRecorded {
        id: Ulid::new(),
        user_id,
        kind,
        title: title.into(),
        message: format!(
            "Your {what} for {resource_name} has been submitted and is pending approval."
        ),
        reference,
        at,
    }
}

fn status_notification(
    user_id: Ulid,
    kind: RequestKind,
    resource_name: &str,
    reference: Ulid,
    status: &str,
    at: Ms,
) -> Event {
    let what = match kind {
        RequestKind::Reservation => "reservation",
        RequestKind::Borrowing => "borrowing request",
    };
    let label = match kind {
        RequestKind::Reservation => "Reservation",
        RequestKind::Borrowing => "Borrowing",
    };
    Event::NotificationRecorded {
        id: Ulid::new(),
        user_id,
        kind,
        title: format!("{label} {status}"),
        message: format!(
            "Your {what} for {resource_name} has been {}.",
            status.to_lowercase()
        ),
        reference,
        at,
    }
}

impl Engine {
    // ── Actor resolution ─────────────────────────────────

    fn require_active_user(&self, id: Ulid) -> Result<User, EngineError> {
        let user = self.get_user(&id).ok_or(EngineError::NotFound(id))?;
        if !user.active {
            return Err(EngineError::Unauthorized("user is deactivated"));
        }
        Ok(user)
    }

    fn require_requester(&self, id: Ulid) -> Result<User, EngineError> {
        let user = self.require_active_user(id)?;
        if !user.role.can_request() {
            return Err(EngineError::Unauthorized("role may not submit requests"));
        }
        Ok(user)
    }

    // ── Users ────────────────────────────────────────────

    pub async fn register_user(&self, id: Ulid, name: String, role: Role) -> Result<(), EngineError> {
        if self.users.len() >= MAX_USERS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("bad user name"));
        }
        if self.users.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::UserRegistered { id, name: name.clone(), role };
        self.wal_append(std::slice::from_ref(&event)).await?;
        self.users.insert(id, User { id, name, role, active: true });
        Ok(())
    }

    pub async fn deactivate_user(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.users.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::UserDeactivated { id };
        self.wal_append(std::slice::from_ref(&event)).await?;
        if let Some(mut u) = self.users.get_mut(&id) {
            u.active = false;
        }
        self.notify.remove(&id);
        Ok(())
    }

    // ── Facilities ───────────────────────────────────────

    pub async fn add_facility(
        &self,
        id: Ulid,
        name: String,
        kind: FacilityKind,
        building: String,
        floor: i32,
        capacity: u32,
    ) -> Result<(), EngineError> {
        if self.facilities.len() >= MAX_FACILITIES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many facilities"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN || building.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("bad facility name"));
        }
        if self.facilities.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::FacilityAdded {
            id,
            name: name.clone(),
            kind,
            building: building.clone(),
            floor,
            capacity,
        };
        self.wal_append(std::slice::from_ref(&event)).await?;
        let fs = FacilityState::new(Facility {
            id,
            name,
            kind,
            building,
            floor,
            capacity,
            status: ResourceStatus::Available,
        });
        self.facilities.insert(id, Arc::new(RwLock::new(fs)));
        Ok(())
    }

    pub async fn update_facility(
        &self,
        id: Ulid,
        name: String,
        capacity: u32,
        status: ResourceStatus,
    ) -> Result<(), EngineError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("bad facility name"));
        }
        let fs = self.get_facility(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = fs.write().await;
        let event = Event::FacilityUpdated { id, name, capacity, status };
        self.persist_and_apply_facility(&mut guard, std::slice::from_ref(&event))
            .await
    }

    pub async fn remove_facility(&self, id: Ulid) -> Result<(), EngineError> {
        let fs = self.get_facility(&id).ok_or(EngineError::NotFound(id))?;
        let guard = fs.write().await;
        if guard.reservations.iter().any(|r| !r.status.is_terminal()) {
            return Err(EngineError::ResourceInUse(id));
        }
        let request_ids: Vec<Ulid> = guard.reservations.iter().map(|r| r.id).collect();
        drop(guard);

        let event = Event::FacilityRemoved { id };
        self.wal_append(std::slice::from_ref(&event)).await?;
        self.facilities.remove(&id);
        for rid in request_ids {
            self.request_index.remove(&rid);
        }
        Ok(())
    }

    // ── Equipment ────────────────────────────────────────

    pub async fn add_equipment(
        &self,
        id: Ulid,
        name: String,
        category: EquipmentCategory,
        quantity_total: u32,
    ) -> Result<(), EngineError> {
        if self.equipment.len() >= MAX_EQUIPMENT_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many equipment items"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("bad equipment name"));
        }
        if quantity_total == 0 || quantity_total > MAX_QUANTITY {
            return Err(EngineError::InvalidInput("bad stock quantity"));
        }
        if self.equipment.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::EquipmentAdded {
            id,
            name: name.clone(),
            category,
            quantity_total,
        };
        self.wal_append(std::slice::from_ref(&event)).await?;
        let es = EquipmentState::new(Equipment {
            id,
            name,
            category,
            quantity_total,
            status: ResourceStatus::Available,
        });
        self.equipment.insert(id, Arc::new(RwLock::new(es)));
        Ok(())
    }

    pub async fn update_equipment(
        &self,
        id: Ulid,
        name: String,
        quantity_total: u32,
        status: ResourceStatus,
    ) -> Result<(), EngineError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("bad equipment name"));
        }
        if quantity_total == 0 || quantity_total > MAX_QUANTITY {
            return Err(EngineError::InvalidInput("bad stock quantity"));
        }
        let es = self.get_equipment(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = es.write().await;
        let event = Event::EquipmentUpdated { id, name, quantity_total, status };
        self.persist_and_apply_equipment(&mut guard, std::slice::from_ref(&event))
            .await
    }

    pub async fn remove_equipment(&self, id: Ulid) -> Result<(), EngineError> {
        let es = self.get_equipment(&id).ok_or(EngineError::NotFound(id))?;
        let guard = es.write().await;
        if guard.borrowings.iter().any(|b| !b.status.is_terminal()) {
            return Err(EngineError::ResourceInUse(id));
        }
        let request_ids: Vec<Ulid> = guard.borrowings.iter().map(|b| b.id).collect();
        drop(guard);

        let event = Event::EquipmentRemoved { id };
        self.wal_append(std::slice::from_ref(&event)).await?;
        self.equipment.remove(&id);
        for bid in request_ids {
            self.request_index.remove(&bid);
        }
        Ok(())
    }

    // ── Create requests ──────────────────────────────────

    /// Submit a facility reservation. Checks the slot against all active
    /// reservations before anything is written; a conflict writes nothing.
    pub async fn request_reservation(
        &self,
        id: Ulid,
        facility_id: Ulid,
        requester_id: Ulid,
        slot: TimeSlot,
        purpose: String,
    ) -> Result<(), EngineError> {
        validate_slot(&slot)?;
        if purpose.len() > MAX_PURPOSE_LEN {
            return Err(EngineError::InvalidInput("purpose too long"));
        }
        let requester = self.require_requester(requester_id)?;
        if self.request_index.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let fs = self
            .get_facility(&facility_id)
            .ok_or(EngineError::NotFound(facility_id))?;
        let mut guard = fs.write().await;
        if guard.reservations.len() >= MAX_REQUESTS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on facility"));
        }

        if let Some(existing) = find_slot_conflict(&guard, &slot, None) {
            return Err(EngineError::SlotConflict(existing));
        }

        let at = now_ms();
        let events = [
            Event::ReservationRequested {
                id,
                facility_id,
                requester: requester.id,
                slot,
                purpose,
                at,
            },
            submitted_notification(requester.id, RequestKind::Reservation, &guard.info.name, id, at),
        ];
        self.persist_and_apply_facility(&mut guard, &events).await
    }

    /// Submit an equipment borrowing request. The overlap-quantity sum plus
    /// the requested quantity must fit in the stock.
    pub async fn request_borrowing(
        &self,
        id: Ulid,
        equipment_id: Ulid,
        requester_id: Ulid,
        quantity: u32,
        range: DayRange,
        purpose: String,
    ) -> Result<(), EngineError> {
        validate_range(&range)?;
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(EngineError::InvalidInput("quantity must be positive"));
        }
        if purpose.len() > MAX_PURPOSE_LEN {
            return Err(EngineError::InvalidInput("purpose too long"));
        }
        let requester = self.require_requester(requester_id)?;
        if self.request_index.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let es = self
            .get_equipment(&equipment_id)
            .ok_or(EngineError::NotFound(equipment_id))?;
        let mut guard = es.write().await;
        if guard.borrowings.len() >= MAX_REQUESTS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many borrowings on equipment"));
        }

        check_capacity(&guard, &range, quantity, None)?;

        let at = now_ms();
        let events = [
            Event::BorrowingRequested {
                id,
                equipment_id,
                requester: requester.id,
                quantity,
                range,
                purpose,
                at,
            },
            submitted_notification(requester.id, RequestKind::Borrowing, &guard.info.name, id, at),
        ];
        self.persist_and_apply_equipment(&mut guard, &events).await
    }

    // ── Reservation transitions ──────────────────────────

    /// Change a reservation's status. Admins may approve or reject; the
    /// owning requester may cancel. Approval re-checks the slot against the
    /// other active reservations — requests approved since creation may have
    /// taken it.
    pub async fn set_reservation_status(
        &self,
        id: Ulid,
        actor_id: Ulid,
        status: ReservationStatus,
        notes: Option<String>,
    ) -> Result<(), EngineError> {
        if notes.as_deref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(EngineError::InvalidInput("notes too long"));
        }
        let actor = self.require_active_user(actor_id)?;
        let (facility_id, mut guard) = self.resolve_reservation_write(&id).await?;

        let (from, requester, slot) = {
            let r = guard.reservation(id).ok_or(EngineError::NotFound(id))?;
            (r.status, r.requester, r.slot)
        };

        if status == ReservationStatus::Cancelled {
            if requester != actor.id {
                return Err(EngineError::Unauthorized("only the requester may cancel"));
            }
        } else {
            if !actor.role.can_approve() {
                return Err(EngineError::Unauthorized("admin role required"));
            }
            if !admin_may_set_reservation(status) {
                return Err(EngineError::Unauthorized("status not settable directly"));
            }
        }

        reservation_step(from, status)?;

        if status == ReservationStatus::Approved
            && let Some(existing) = find_slot_conflict(&guard, &slot, Some(id)) {
                return Err(EngineError::SlotConflict(existing));
            }

        let at = now_ms();
        let events = [
            Event::ReservationStatusChanged {
                id,
                facility_id,
                status,
                actor: Some(actor.id),
                notes,
                at,
            },
            status_notification(
                requester,
                RequestKind::Reservation,
                &guard.info.name,
                id,
                status.as_str(),
                at,
            ),
        ];
        self.persist_and_apply_facility(&mut guard, &events).await
    }

    /// Owner cancellation; legal only from PENDING or APPROVED.
    pub async fn cancel_reservation(&self, id: Ulid, requester_id: Ulid) -> Result<(), EngineError> {
        self.set_reservation_status(id, requester_id, ReservationStatus::Cancelled, None)
            .await
    }

    /// Sweeper transition once the reservation date has passed. Quiet — no
    /// notification for routine completion.
    pub(crate) async fn complete_reservation(&self, id: Ulid) -> Result<(), EngineError> {
        let (facility_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let from = guard
            .reservation(id)
            .ok_or(EngineError::NotFound(id))?
            .status;
        reservation_step(from, ReservationStatus::Completed)?;

        let event = Event::ReservationStatusChanged {
            id,
            facility_id,
            status: ReservationStatus::Completed,
            actor: None,
            notes: None,
            at: now_ms(),
        };
        self.persist_and_apply_facility(&mut guard, std::slice::from_ref(&event))
            .await
    }

    // ── Borrowing transitions ────────────────────────────

    /// Change a borrowing's status. Admins may approve/reject/hand out/take
    /// back; the owning requester may cancel or self-return. Approval and
    /// hand-out re-check capacity — concurrent approvals may have consumed
    /// it since creation. The hand-out check excludes this borrowing's own
    /// APPROVED contribution so it is not counted twice.
    pub async fn set_borrowing_status(
        &self,
        id: Ulid,
        actor_id: Ulid,
        status: BorrowingStatus,
        notes: Option<String>,
        actual_return_day: Option<Day>,
    ) -> Result<(), EngineError> {
        if notes.as_deref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(EngineError::InvalidInput("notes too long"));
        }
        let actor = self.require_active_user(actor_id)?;
        let (equipment_id, mut guard) = self.resolve_borrowing_write(&id).await?;

        let (from, requester, quantity, range) = {
            let b = guard.borrowing(id).ok_or(EngineError::NotFound(id))?;
            (b.status, b.requester, b.quantity, b.range)
        };

        let owner_action = requester == actor.id
            && matches!(status, BorrowingStatus::Cancelled | BorrowingStatus::Returned);
        if !owner_action {
            if status == BorrowingStatus::Cancelled {
                return Err(EngineError::Unauthorized("only the requester may cancel"));
            }
            if !actor.role.can_approve() {
                return Err(EngineError::Unauthorized("admin role required"));
            }
            if !admin_may_set_borrowing(status) {
                return Err(EngineError::Unauthorized("status not settable directly"));
            }
        }

        borrowing_step(from, status)?;

        match status {
            // This request is PENDING and not in the sum yet.
            BorrowingStatus::Approved => check_capacity(&guard, &range, quantity, None)?,
            // Its own APPROVED quantity is already counted — exclude it.
            BorrowingStatus::Borrowed => check_capacity(&guard, &range, quantity, Some(id))?,
            _ => {}
        }

        let returned_on = match status {
            BorrowingStatus::Returned => Some(actual_return_day.unwrap_or_else(today)),
            _ => None,
        };

        let at = now_ms();
        let events = [
            Event::BorrowingStatusChanged {
                id,
                equipment_id,
                status,
                actor: Some(actor.id),
                notes,
                returned_on,
                at,
            },
            status_notification(
                requester,
                RequestKind::Borrowing,
                &guard.info.name,
                id,
                status.as_str(),
                at,
            ),
        ];
        self.persist_and_apply_equipment(&mut guard, &events).await
    }

    /// Owner cancellation; legal only from PENDING or APPROVED.
    pub async fn cancel_borrowing(&self, id: Ulid, requester_id: Ulid) -> Result<(), EngineError> {
        self.set_borrowing_status(id, requester_id, BorrowingStatus::Cancelled, None, None)
            .await
    }

    /// Requester hands the item back: RETURNED with today's date.
    pub async fn mark_returned(&self, id: Ulid, requester_id: Ulid) -> Result<(), EngineError> {
        self.set_borrowing_status(id, requester_id, BorrowingStatus::Returned, None, None)
            .await
    }

    /// Sweeper transition: BORROWED past its expected return day.
    pub(crate) async fn mark_overdue(&self, id: Ulid) -> Result<(), EngineError> {
        let (equipment_id, mut guard) = self.resolve_borrowing_write(&id).await?;
        let (from, requester) = {
            let b = guard.borrowing(id).ok_or(EngineError::NotFound(id))?;
            (b.status, b.requester)
        };
        borrowing_step(from, BorrowingStatus::Overdue)?;

        let at = now_ms();
        let events = [
            Event::BorrowingStatusChanged {
                id,
                equipment_id,
                status: BorrowingStatus::Overdue,
                actor: None,
                notes: None,
                returned_on: None,
                at,
            },
            status_notification(
                requester,
                RequestKind::Borrowing,
                &guard.info.name,
                id,
                BorrowingStatus::Overdue.as_str(),
                at,
            ),
        ];
        self.persist_and_apply_equipment(&mut guard, &events).await
    }

    // ── Notifications ────────────────────────────────────

    pub async fn mark_notification_read(&self, id: Ulid, user_id: Ulid) -> Result<(), EngineError> {
        let known = self
            .feeds
            .get(&user_id)
            .is_some_and(|feed| feed.iter().any(|n| n.id == id));
        if !known {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::NotificationRead { id, user_id };
        self.wal_append(std::slice::from_ref(&event)).await?;
        self.apply_feed_event(&event);
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self, user_id: Ulid) -> Result<(), EngineError> {
        if !self.users.contains_key(&user_id) {
            return Err(EngineError::NotFound(user_id));
        }
        let event = Event::AllNotificationsRead { user_id };
        self.wal_append(std::slice::from_ref(&event)).await?;
        self.apply_feed_event(&event);
        Ok(())
    }

    // ── Sweep collectors ─────────────────────────────────

    /// BORROWED borrowings whose expected return day has passed.
    pub fn collect_overdue(&self, today: Day) -> Vec<Ulid> {
        let mut due = Vec::new();
        for entry in self.equipment.iter() {
            let es = entry.value().clone();
            if let Ok(guard) = es.try_read() {
                for b in &guard.borrowings {
                    if b.status == BorrowingStatus::Borrowed && b.range.end < today {
                        due.push(b.id);
                    }
                }
            }
        }
        due
    }

    /// APPROVED reservations whose date has passed.
    pub fn collect_elapsed(&self, today: Day) -> Vec<Ulid> {
        let mut done = Vec::new();
        for entry in self.facilities.iter() {
            let fs = entry.value().clone();
            if let Ok(guard) = fs.try_read() {
                for r in &guard.reservations {
                    if r.status == ReservationStatus::Approved && r.slot.date < today {
                        done.push(r.id);
                    }
                }
            }
        }
        done
    }

    // ── Compaction ───────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for entry in self.users.iter() {
            let u = entry.value();
            events.push(Event::UserRegistered {
                id: u.id,
                name: u.name.clone(),
                role: u.role,
            });
            if !u.active {
                events.push(Event::UserDeactivated { id: u.id });
            }
        }

        for entry in self.facilities.iter() {
            let fs = entry.value().clone();
            let guard = fs.try_read().expect("compact: uncontended read");
            events.push(Event::FacilityAdded {
                id: guard.info.id,
                name: guard.info.name.clone(),
                kind: guard.info.kind,
                building: guard.info.building.clone(),
                floor: guard.info.floor,
                capacity: guard.info.capacity,
            });
            if guard.info.status != ResourceStatus::Available {
                events.push(Event::FacilityUpdated {
                    id: guard.info.id,
                    name: guard.info.name.clone(),
                    capacity: guard.info.capacity,
                    status: guard.info.status,
                });
            }
            for r in &guard.reservations {
                events.push(Event::ReservationRequested {
                    id: r.id,
                    facility_id: guard.info.id,
                    requester: r.requester,
                    slot: r.slot,
                    purpose: r.purpose.clone(),
                    at: r.created_at,
                });
                if r.status != ReservationStatus::Pending {
                    events.push(Event::ReservationStatusChanged {
                        id: r.id,
                        facility_id: guard.info.id,
                        status: r.status,
                        actor: r.decided_by,
                        notes: r.admin_notes.clone(),
                        at: r.decided_at.unwrap_or(r.created_at),
                    });
                }
            }
        }

        for entry in self.equipment.iter() {
            let es = entry.value().clone();
            let guard = es.try_read().expect("compact: uncontended read");
            events.push(Event::EquipmentAdded {
                id: guard.info.id,
                name: guard.info.name.clone(),
                category: guard.info.category,
                quantity_total: guard.info.quantity_total,
            });
            if guard.info.status != ResourceStatus::Available {
                events.push(Event::EquipmentUpdated {
                    id: guard.info.id,
                    name: guard.info.name.clone(),
                    quantity_total: guard.info.quantity_total,
                    status: guard.info.status,
                });
            }
            for b in &guard.borrowings {
                events.push(Event::BorrowingRequested {
                    id: b.id,
                    equipment_id: guard.info.id,
                    requester: b.requester,
                    quantity: b.quantity,
                    range: b.range,
                    purpose: b.purpose.clone(),
                    at: b.created_at,
                });
                if b.status != BorrowingStatus::Pending {
                    events.push(Event::BorrowingStatusChanged {
                        id: b.id,
                        equipment_id: guard.info.id,
                        status: b.status,
                        actor: b.decided_by,
                        notes: b.admin_notes.clone(),
                        returned_on: b.actual_return_day,
                        at: b.decided_at.unwrap_or(b.created_at),
                    });
                }
            }
        }

        for entry in self.feeds.iter() {
            for n in entry.value() {
                events.push(Event::NotificationRecorded {
                    id: n.id,
                    user_id: n.user_id,
                    kind: n.kind,
                    title: n.title.clone(),
                    message: n.message.clone(),
                    reference: n.reference,
                    at: n.created_at,
                });
                if n.read {
                    events.push(Event::NotificationRead {
                        id: n.id,
                        user_id: n.user_id,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
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
