mod availability;
mod error;
mod mutations;
mod queries;
mod transition;

pub use availability::{available_quantity, find_slot_conflict, free_windows, overlapping_quantity};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::limits::MAX_FEED_LEN;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedFacilityState = Arc<RwLock<FacilityState>>;
pub type SharedEquipmentState = Arc<RwLock<EquipmentState>>;

/// What a request id points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRef {
    /// Reservation on this facility.
    Reservation(Ulid),
    /// Borrowing of this equipment.
    Borrowing(Ulid),
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    /// One operation's events, committed together: a transition and the
    /// notification it emits share a single fsync.
    Append {
        events: Vec<Event>,
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

type AppendBatch = Vec<(Vec<Event>, oneshot::Sender<io::Result<()>>)>;

fn flush_and_respond(wal: &mut Wal, batch: &mut AppendBatch) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &mut AppendBatch) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    'outer: for (events, _) in batch.iter() {
        for event in events {
            if let Err(e) = wal.append_buffered(event) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
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
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub users: DashMap<Ulid, User>,
    pub facilities: DashMap<Ulid, SharedFacilityState>,
    pub equipment: DashMap<Ulid, SharedEquipmentState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation/borrowing id → owning resource.
    pub(super) request_index: DashMap<Ulid, RequestRef>,
    /// Per-user notification feeds, oldest first.
    pub(super) feeds: DashMap<Ulid, Vec<Notification>>,
}

/// Apply a reservation event to a FacilityState (no locking — caller holds
/// the lock).
fn apply_to_facility(fs: &mut FacilityState, event: &Event, index: &DashMap<Ulid, RequestRef>) {
    match event {
        Event::ReservationRequested {
            id,
            facility_id,
            requester,
            slot,
            purpose,
            at,
        } => {
            fs.insert_reservation(Reservation {
                id: *id,
                requester: *requester,
                slot: *slot,
                purpose: purpose.clone(),
                status: ReservationStatus::Pending,
                admin_notes: None,
                decided_by: None,
                decided_at: None,
                created_at: *at,
            });
            index.insert(*id, RequestRef::Reservation(*facility_id));
        }
        Event::ReservationStatusChanged {
            id,
            status,
            actor,
            notes,
            at,
            ..
        } => {
            if let Some(r) = fs.reservation_mut(*id) {
                r.status = *status;
                if notes.is_some() {
                    r.admin_notes = notes.clone();
                }
                r.decided_by = *actor;
                r.decided_at = Some(*at);
            }
        }
        Event::FacilityUpdated {
            name,
            capacity,
            status,
            ..
        } => {
            fs.info.name = name.clone();
            fs.info.capacity = *capacity;
            fs.info.status = *status;
        }
        _ => {}
    }
}

/// Apply a borrowing event to an EquipmentState (caller holds the lock).
fn apply_to_equipment(es: &mut EquipmentState, event: &Event, index: &DashMap<Ulid, RequestRef>) {
    match event {
        Event::BorrowingRequested {
            id,
            equipment_id,
            requester,
            quantity,
            range,
            purpose,
            at,
        } => {
            es.insert_borrowing(Borrowing {
                id: *id,
                requester: *requester,
                quantity: *quantity,
                range: *range,
                purpose: purpose.clone(),
                status: BorrowingStatus::Pending,
                admin_notes: None,
                decided_by: None,
                decided_at: None,
                actual_return_day: None,
                created_at: *at,
            });
            index.insert(*id, RequestRef::Borrowing(*equipment_id));
        }
        Event::BorrowingStatusChanged {
            id,
            status,
            actor,
            notes,
            returned_on,
            at,
            ..
        } => {
            if let Some(b) = es.borrowing_mut(*id) {
                b.status = *status;
                if notes.is_some() {
                    b.admin_notes = notes.clone();
                }
                b.decided_by = *actor;
                b.decided_at = Some(*at);
                if *status == BorrowingStatus::Returned {
                    b.actual_return_day = *returned_on;
                }
            }
        }
        Event::EquipmentUpdated {
            name,
            quantity_total,
            status,
            ..
        } => {
            es.info.name = name.clone();
            es.info.quantity_total = *quantity_total;
            es.info.status = *status;
        }
        _ => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            users: DashMap::new(),
            facilities: DashMap::new(),
            equipment: DashMap::new(),
            wal_tx,
            notify,
            request_index: DashMap::new(),
            feeds: DashMap::new(),
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because this may run inside an async context (lazy tenant creation).
        for event in &events {
            engine.replay_event(event);
        }

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::UserRegistered { id, name, role } => {
                self.users.insert(
                    *id,
                    User {
                        id: *id,
                        name: name.clone(),
                        role: *role,
                        active: true,
                    },
                );
            }
            Event::UserDeactivated { id } => {
                if let Some(mut u) = self.users.get_mut(id) {
                    u.active = false;
                }
            }
            Event::FacilityAdded {
                id,
                name,
                kind,
                building,
                floor,
                capacity,
            } => {
                let fs = FacilityState::new(Facility {
                    id: *id,
                    name: name.clone(),
                    kind: *kind,
                    building: building.clone(),
                    floor: *floor,
                    capacity: *capacity,
                    status: ResourceStatus::Available,
                });
                self.facilities.insert(*id, Arc::new(RwLock::new(fs)));
            }
            Event::FacilityRemoved { id } => {
                if let Some((_, fs)) = self.facilities.remove(id) {
                    let guard = fs.try_read().expect("replay: uncontended read");
                    for r in &guard.reservations {
                        self.request_index.remove(&r.id);
                    }
                }
            }
            Event::EquipmentAdded {
                id,
                name,
                category,
                quantity_total,
            } => {
                let es = EquipmentState::new(Equipment {
                    id: *id,
                    name: name.clone(),
                    category: *category,
                    quantity_total: *quantity_total,
                    status: ResourceStatus::Available,
                });
                self.equipment.insert(*id, Arc::new(RwLock::new(es)));
            }
            Event::EquipmentRemoved { id } => {
                if let Some((_, es)) = self.equipment.remove(id) {
                    let guard = es.try_read().expect("replay: uncontended read");
                    for b in &guard.borrowings {
                        self.request_index.remove(&b.id);
                    }
                }
            }
            Event::ReservationRequested { facility_id, .. }
            | Event::ReservationStatusChanged { facility_id, .. } => {
                if let Some(entry) = self.facilities.get(facility_id) {
                    let fs = entry.value().clone();
                    let mut guard = fs.try_write().expect("replay: uncontended write");
                    apply_to_facility(&mut guard, event, &self.request_index);
                }
            }
            Event::BorrowingRequested { equipment_id, .. }
            | Event::BorrowingStatusChanged { equipment_id, .. } => {
                if let Some(entry) = self.equipment.get(equipment_id) {
                    let es = entry.value().clone();
                    let mut guard = es.try_write().expect("replay: uncontended write");
                    apply_to_equipment(&mut guard, event, &self.request_index);
                }
            }
            Event::FacilityUpdated { id, .. } => {
                if let Some(entry) = self.facilities.get(id) {
                    let fs = entry.value().clone();
                    let mut guard = fs.try_write().expect("replay: uncontended write");
                    apply_to_facility(&mut guard, event, &self.request_index);
                }
            }
            Event::EquipmentUpdated { id, .. } => {
                if let Some(entry) = self.equipment.get(id) {
                    let es = entry.value().clone();
                    let mut guard = es.try_write().expect("replay: uncontended write");
                    apply_to_equipment(&mut guard, event, &self.request_index);
                }
            }
            Event::NotificationRecorded { .. }
            | Event::NotificationRead { .. }
            | Event::AllNotificationsRead { .. } => {
                self.apply_feed_event(event);
            }
        }
    }

    /// Apply a notification event to the per-user feed and fan out to live
    /// listeners.
    pub(super) fn apply_feed_event(&self, event: &Event) {
        match event {
            Event::NotificationRecorded {
                id,
                user_id,
                kind,
                title,
                message,
                reference,
                at,
            } => {
                let n = Notification {
                    id: *id,
                    user_id: *user_id,
                    kind: *kind,
                    title: title.clone(),
                    message: message.clone(),
                    reference: *reference,
                    created_at: *at,
                    read: false,
                };
                let mut feed = self.feeds.entry(*user_id).or_default();
                if feed.len() >= MAX_FEED_LEN {
                    feed.remove(0);
                }
                feed.push(n.clone());
                drop(feed);
                self.notify.send(&n);
            }
            Event::NotificationRead { id, user_id } => {
                if let Some(mut feed) = self.feeds.get_mut(user_id)
                    && let Some(n) = feed.iter_mut().find(|n| n.id == *id) {
                        n.read = true;
                    }
            }
            Event::AllNotificationsRead { user_id } => {
                if let Some(mut feed) = self.feeds.get_mut(user_id) {
                    for n in feed.iter_mut() {
                        n.read = true;
                    }
                }
            }
            _ => {}
        }
    }

    /// Write an operation's events to the WAL via the background
    /// group-commit writer. All-or-nothing within one flush.
    pub(super) async fn wal_append(&self, events: &[Event]) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events: events.to_vec(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_facility(&self, id: &Ulid) -> Option<SharedFacilityState> {
        self.facilities.get(id).map(|e| e.value().clone())
    }

    pub fn get_equipment(&self, id: &Ulid) -> Option<SharedEquipmentState> {
        self.equipment.get(id).map(|e| e.value().clone())
    }

    pub fn get_user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    /// WAL-append + apply in one call, with the facility write lock held by
    /// the caller. Reservation events go to the facility; notification
    /// events go to the feed.
    pub(super) async fn persist_and_apply_facility(
        &self,
        fs: &mut FacilityState,
        events: &[Event],
    ) -> Result<(), EngineError> {
        self.wal_append(events).await?;
        for event in events {
            match event {
                Event::ReservationRequested { .. }
                | Event::ReservationStatusChanged { .. }
                | Event::FacilityUpdated { .. } => {
                    apply_to_facility(fs, event, &self.request_index)
                }
                _ => self.apply_feed_event(event),
            }
        }
        Ok(())
    }

    /// Same, for equipment.
    pub(super) async fn persist_and_apply_equipment(
        &self,
        es: &mut EquipmentState,
        events: &[Event],
    ) -> Result<(), EngineError> {
        self.wal_append(events).await?;
        for event in events {
            match event {
                Event::BorrowingRequested { .. }
                | Event::BorrowingStatusChanged { .. }
                | Event::EquipmentUpdated { .. } => {
                    apply_to_equipment(es, event, &self.request_index)
                }
                _ => self.apply_feed_event(event),
            }
        }
        Ok(())
    }

    /// Lookup reservation id → facility, acquire the facility write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<FacilityState>), EngineError> {
        let facility_id = match self.request_index.get(id).map(|e| *e.value()) {
            Some(RequestRef::Reservation(fid)) => fid,
            _ => return Err(EngineError::NotFound(*id)),
        };
        let fs = self
            .get_facility(&facility_id)
            .ok_or(EngineError::NotFound(facility_id))?;
        let guard = fs.write_owned().await;
        Ok((facility_id, guard))
    }

    /// Lookup borrowing id → equipment, acquire the equipment write lock.
    pub(super) async fn resolve_borrowing_write(
        &self,
        id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<EquipmentState>), EngineError> {
        let equipment_id = match self.request_index.get(id).map(|e| *e.value()) {
            Some(RequestRef::Borrowing(eid)) => eid,
            _ => return Err(EngineError::NotFound(*id)),
        };
        let es = self
            .get_equipment(&equipment_id)
            .ok_or(EngineError::NotFound(equipment_id))?;
        let guard = es.write_owned().await;
        Ok((equipment_id, guard))
    }
}
