use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only wall-clock type.
pub type Ms = i64;

/// Days since the Unix epoch — the only calendar type.
pub type Day = i64;

/// Minutes since midnight.
pub type Minutes = i32;

/// A facility booking slot: one calendar date, half-open `[start, end)`
/// minutes-of-day. Slots on different dates never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub date: Day,
    pub start: Minutes,
    pub end: Minutes,
}

impl TimeSlot {
    pub fn new(date: Day, start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "TimeSlot start must be before end");
        Self { date, start, end }
    }

    /// Strict half-open overlap: a slot ending exactly when another starts
    /// does not conflict.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }
}

/// A borrowing window: closed interval of days, both boundary days included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRange {
    pub start: Day,
    pub end: Day,
}

impl DayRange {
    pub fn new(start: Day, end: Day) -> Self {
        debug_assert!(start <= end, "DayRange start must not be after end");
        Self { start, end }
    }

    /// Closed-interval overlap: ranges sharing a boundary day do overlap.
    /// Negated-disjoint form, matching the ledger query it replaces.
    pub fn overlaps(&self, other: &DayRange) -> bool {
        !(self.end < other.start || self.start > other.end)
    }

    pub fn days(&self) -> i64 {
        self.end - self.start + 1
    }
}

// ── Actors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Student,
    Organization,
    Admin,
    SuperAdmin,
}

impl Role {
    /// May submit reservation/borrowing requests.
    pub fn can_request(&self) -> bool {
        matches!(self, Role::Student | Role::Organization)
    }

    /// May approve, reject, and process requests.
    pub fn can_approve(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Organization => "ORGANIZATION",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.to_uppercase().as_str() {
            "STUDENT" => Some(Role::Student),
            "ORGANIZATION" | "CAMPUS_ORGANIZATION" => Some(Role::Organization),
            "ADMIN" => Some(Role::Admin),
            "SUPER_ADMIN" => Some(Role::SuperAdmin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub role: Role,
    pub active: bool,
}

// ── Resources ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacilityKind {
    Auditorium,
    ConferenceRoom,
    Classroom,
    Lab,
    Gymnasium,
    Other,
}

impl FacilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityKind::Auditorium => "AUDITORIUM",
            FacilityKind::ConferenceRoom => "CONFERENCE_ROOM",
            FacilityKind::Classroom => "CLASSROOM",
            FacilityKind::Lab => "LAB",
            FacilityKind::Gymnasium => "GYMNASIUM",
            FacilityKind::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<FacilityKind> {
        match s.to_uppercase().as_str() {
            "AUDITORIUM" => Some(FacilityKind::Auditorium),
            "CONFERENCE_ROOM" => Some(FacilityKind::ConferenceRoom),
            "CLASSROOM" => Some(FacilityKind::Classroom),
            "LAB" => Some(FacilityKind::Lab),
            "GYMNASIUM" => Some(FacilityKind::Gymnasium),
            "OTHER" => Some(FacilityKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipmentCategory {
    Audio,
    Video,
    Computer,
    Projector,
    Microphone,
    Speaker,
    Other,
}

impl EquipmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentCategory::Audio => "AUDIO",
            EquipmentCategory::Video => "VIDEO",
            EquipmentCategory::Computer => "COMPUTER",
            EquipmentCategory::Projector => "PROJECTOR",
            EquipmentCategory::Microphone => "MICROPHONE",
            EquipmentCategory::Speaker => "SPEAKER",
            EquipmentCategory::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<EquipmentCategory> {
        match s.to_uppercase().as_str() {
            "AUDIO" => Some(EquipmentCategory::Audio),
            "VIDEO" => Some(EquipmentCategory::Video),
            "COMPUTER" => Some(EquipmentCategory::Computer),
            "PROJECTOR" => Some(EquipmentCategory::Projector),
            "MICROPHONE" => Some(EquipmentCategory::Microphone),
            "SPEAKER" => Some(EquipmentCategory::Speaker),
            "OTHER" => Some(EquipmentCategory::Other),
            _ => None,
        }
    }
}

/// Informational resource status — not derived from the request ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Available,
    Reserved,
    Maintenance,
    Unavailable,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Available => "AVAILABLE",
            ResourceStatus::Reserved => "RESERVED",
            ResourceStatus::Maintenance => "MAINTENANCE",
            ResourceStatus::Unavailable => "UNAVAILABLE",
        }
    }

    pub fn parse(s: &str) -> Option<ResourceStatus> {
        match s.to_uppercase().as_str() {
            "AVAILABLE" => Some(ResourceStatus::Available),
            "RESERVED" => Some(ResourceStatus::Reserved),
            "MAINTENANCE" => Some(ResourceStatus::Maintenance),
            "UNAVAILABLE" => Some(ResourceStatus::Unavailable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facility {
    pub id: Ulid,
    pub name: String,
    pub kind: FacilityKind,
    pub building: String,
    pub floor: i32,
    pub capacity: u32,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equipment {
    pub id: Ulid,
    pub name: String,
    pub category: EquipmentCategory,
    /// Fixed stock. Availability for a window is always derived from the
    /// ledger of active borrowings — there is no live counter.
    pub quantity_total: u32,
    pub status: ResourceStatus,
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Counts toward slot conflicts.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Rejected | ReservationStatus::Cancelled | ReservationStatus::Completed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Approved => "APPROVED",
            ReservationStatus::Rejected => "REJECTED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<ReservationStatus> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(ReservationStatus::Pending),
            "APPROVED" => Some(ReservationStatus::Approved),
            "REJECTED" => Some(ReservationStatus::Rejected),
            "CANCELLED" => Some(ReservationStatus::Cancelled),
            "COMPLETED" => Some(ReservationStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorrowingStatus {
    Pending,
    Approved,
    Borrowed,
    Returned,
    Rejected,
    Cancelled,
    Overdue,
}

impl BorrowingStatus {
    /// Counts toward the overlap-quantity sum.
    pub fn consumes_stock(&self) -> bool {
        matches!(self, BorrowingStatus::Approved | BorrowingStatus::Borrowed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BorrowingStatus::Returned | BorrowingStatus::Rejected | BorrowingStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Pending => "PENDING",
            BorrowingStatus::Approved => "APPROVED",
            BorrowingStatus::Borrowed => "BORROWED",
            BorrowingStatus::Returned => "RETURNED",
            BorrowingStatus::Rejected => "REJECTED",
            BorrowingStatus::Cancelled => "CANCELLED",
            BorrowingStatus::Overdue => "OVERDUE",
        }
    }

    pub fn parse(s: &str) -> Option<BorrowingStatus> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(BorrowingStatus::Pending),
            "APPROVED" => Some(BorrowingStatus::Approved),
            "BORROWED" => Some(BorrowingStatus::Borrowed),
            "RETURNED" => Some(BorrowingStatus::Returned),
            "REJECTED" => Some(BorrowingStatus::Rejected),
            "CANCELLED" => Some(BorrowingStatus::Cancelled),
            "OVERDUE" => Some(BorrowingStatus::Overdue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Ulid,
    pub requester: Ulid,
    pub slot: TimeSlot,
    pub purpose: String,
    pub status: ReservationStatus,
    pub admin_notes: Option<String>,
    /// Who performed the last status transition, and when.
    pub decided_by: Option<Ulid>,
    pub decided_at: Option<Ms>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Borrowing {
    pub id: Ulid,
    pub requester: Ulid,
    pub quantity: u32,
    pub range: DayRange,
    pub purpose: String,
    pub status: BorrowingStatus,
    pub admin_notes: Option<String>,
    pub decided_by: Option<Ulid>,
    pub decided_at: Option<Ms>,
    pub actual_return_day: Option<Day>,
    pub created_at: Ms,
}

// ── Per-resource state ───────────────────────────────────────────

/// A facility and its reservation ledger, sorted by `(date, start)`.
#[derive(Debug, Clone)]
pub struct FacilityState {
    pub info: Facility,
    pub reservations: Vec<Reservation>,
}

impl FacilityState {
    pub fn new(info: Facility) -> Self {
        Self {
            info,
            reservations: Vec::new(),
        }
    }

    /// Insert keeping `(date, start)` order.
    pub fn insert_reservation(&mut self, r: Reservation) {
        let key = (r.slot.date, r.slot.start);
        let pos = self
            .reservations
            .binary_search_by_key(&key, |x| (x.slot.date, x.slot.start))
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, r);
    }

    pub fn reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations on one date, in start order. Binary search skips the
    /// earlier dates; the tail is cut by `take_while`.
    pub fn on_date(&self, date: Day) -> impl Iterator<Item = &Reservation> {
        let lo = self.reservations.partition_point(|r| r.slot.date < date);
        self.reservations[lo..]
            .iter()
            .take_while(move |r| r.slot.date == date)
    }
}

/// An equipment item and its borrowing ledger, sorted by range start.
#[derive(Debug, Clone)]
pub struct EquipmentState {
    pub info: Equipment,
    pub borrowings: Vec<Borrowing>,
}

impl EquipmentState {
    pub fn new(info: Equipment) -> Self {
        Self {
            info,
            borrowings: Vec::new(),
        }
    }

    /// Insert keeping range-start order.
    pub fn insert_borrowing(&mut self, b: Borrowing) {
        let pos = self
            .borrowings
            .binary_search_by_key(&b.range.start, |x| x.range.start)
            .unwrap_or_else(|e| e);
        self.borrowings.insert(pos, b);
    }

    pub fn borrowing(&self, id: Ulid) -> Option<&Borrowing> {
        self.borrowings.iter().find(|b| b.id == id)
    }

    pub fn borrowing_mut(&mut self, id: Ulid) -> Option<&mut Borrowing> {
        self.borrowings.iter_mut().find(|b| b.id == id)
    }

    /// Borrowings whose closed range overlaps `range`. Everything starting
    /// after `range.end` is skipped via binary search.
    pub fn overlapping(&self, range: &DayRange) -> impl Iterator<Item = &Borrowing> {
        let hi = self.borrowings.partition_point(|b| b.range.start <= range.end);
        self.borrowings[..hi]
            .iter()
            .filter(move |b| b.range.end >= range.start)
    }
}

// ── Notifications ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Reservation,
    Borrowing,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Reservation => "RESERVATION",
            RequestKind::Borrowing => "BORROWING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Ulid,
    pub user_id: Ulid,
    pub kind: RequestKind,
    pub title: String,
    pub message: String,
    /// The reservation/borrowing this message is about.
    pub reference: Ulid,
    pub created_at: Ms,
    pub read: bool,
}

// ── Events ───────────────────────────────────────────────────────

/// The event types — flat, no nesting. This is the WAL record format.
/// Timestamps live in the events so replay is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        id: Ulid,
        name: String,
        role: Role,
    },
    UserDeactivated {
        id: Ulid,
    },
    FacilityAdded {
        id: Ulid,
        name: String,
        kind: FacilityKind,
        building: String,
        floor: i32,
        capacity: u32,
    },
    FacilityUpdated {
        id: Ulid,
        name: String,
        capacity: u32,
        status: ResourceStatus,
    },
    FacilityRemoved {
        id: Ulid,
    },
    EquipmentAdded {
        id: Ulid,
        name: String,
        category: EquipmentCategory,
        quantity_total: u32,
    },
    EquipmentUpdated {
        id: Ulid,
        name: String,
        quantity_total: u32,
        status: ResourceStatus,
    },
    EquipmentRemoved {
        id: Ulid,
    },
    ReservationRequested {
        id: Ulid,
        facility_id: Ulid,
        requester: Ulid,
        slot: TimeSlot,
        purpose: String,
        at: Ms,
    },
    ReservationStatusChanged {
        id: Ulid,
        facility_id: Ulid,
        status: ReservationStatus,
        /// `None` for sweeper-driven transitions.
        actor: Option<Ulid>,
        notes: Option<String>,
        at: Ms,
    },
    BorrowingRequested {
        id: Ulid,
        equipment_id: Ulid,
        requester: Ulid,
        quantity: u32,
        range: DayRange,
        purpose: String,
        at: Ms,
    },
    BorrowingStatusChanged {
        id: Ulid,
        equipment_id: Ulid,
        status: BorrowingStatus,
        actor: Option<Ulid>,
        notes: Option<String>,
        returned_on: Option<Day>,
        at: Ms,
    },
    NotificationRecorded {
        id: Ulid,
        user_id: Ulid,
        kind: RequestKind,
        title: String,
        message: String,
        reference: Ulid,
        at: Ms,
    },
    NotificationRead {
        id: Ulid,
        user_id: Ulid,
    },
    AllNotificationsRead {
        user_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub requester: Ulid,
    pub slot: TimeSlot,
    pub purpose: String,
    pub status: ReservationStatus,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowingInfo {
    pub id: Ulid,
    pub equipment_id: Ulid,
    pub requester: Ulid,
    pub quantity: u32,
    pub range: DayRange,
    pub purpose: String,
    pub status: BorrowingStatus,
    pub admin_notes: Option<String>,
    pub actual_return_day: Option<Day>,
}

/// A gap between active reservations inside an opening window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeWindow {
    pub start: Minutes,
    pub end: Minutes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityUsage {
    pub facility_id: Ulid,
    pub name: String,
    pub total: u64,
    pub approved: u64,
    pub pending: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentUsage {
    pub equipment_id: Ulid,
    pub name: String,
    pub quantity_total: u32,
    pub total_requests: u64,
    /// Sum of quantities currently out (BORROWED or OVERDUE).
    pub out_now: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub pending_reservations: u64,
    pub pending_borrowings: u64,
    pub active_reservations: u64,
    pub active_borrowings: u64,
    pub reservations_today: u64,
    pub borrowings_starting_today: u64,
}
