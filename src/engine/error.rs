use ulid::Ulid;

use crate::model::Status;

#[derive(Debug)]
pub enum EngineError {
    /// The exact `scheduled_at` instant is already booked.
    SlotConflict(Ulid),
    /// The driver already holds a pending or late appointment.
    DriverUnavailable { driver_id: String, holder: Ulid },
    NotFound(Ulid),
    InvalidTransition {
        from: Status,
        to: Status,
        reason: &'static str,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SlotConflict(id) => {
                write!(f, "slot already booked by appointment {id}")
            }
            EngineError::DriverUnavailable { driver_id, holder } => {
                write!(
                    f,
                    "driver {driver_id} already holds active appointment {holder}"
                )
            }
            EngineError::NotFound(id) => write!(f, "appointment not found: {id}"),
            EngineError::InvalidTransition { from, to, reason } => {
                write!(f, "invalid transition {from} -> {to}: {reason}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
