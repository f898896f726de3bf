use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The requested facility slot overlaps an active reservation.
    SlotConflict(Ulid),
    /// The overlap-quantity sum would exceed the equipment's stock.
    CapacityExceeded {
        requested: u32,
        available: u32,
    },
    Unauthorized(&'static str),
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    InvalidInput(&'static str),
    /// Facility/equipment still has active requests and cannot be removed.
    ResourceInUse(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::SlotConflict(id) => {
                write!(f, "time slot is already reserved (conflicts with {id})")
            }
            EngineError::CapacityExceeded { requested, available } => {
                write!(
                    f,
                    "not enough stock for the requested dates: requested {requested}, available {available}"
                )
            }
            EngineError::Unauthorized(reason) => write!(f, "unauthorized: {reason}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid transition: {from} -> {to}")
            }
            EngineError::InvalidInput(reason) => write!(f, "invalid input: {reason}"),
            EngineError::ResourceInUse(id) => {
                write!(f, "cannot remove {id}: active requests exist")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
