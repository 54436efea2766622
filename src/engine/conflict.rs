use crate::limits::*;
use crate::model::*;

use super::store::AppointmentStore;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_new(req: &NewAppointment) -> Result<(), EngineError> {
    if req.scheduled_at < MIN_VALID_TIMESTAMP_MS || req.scheduled_at > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("scheduled_at out of range"));
    }
    if req.contract_number.len() > MAX_CONTRACT_LEN {
        return Err(EngineError::LimitExceeded("contract number too long"));
    }
    if req.driver_name.len() > MAX_DRIVER_NAME_LEN {
        return Err(EngineError::LimitExceeded("driver name too long"));
    }
    if req.driver_id.is_empty() || req.driver_id.len() > MAX_DRIVER_ID_LEN {
        return Err(EngineError::LimitExceeded("driver id empty or too long"));
    }
    if req.truck_plate.len() > MAX_PLATE_LEN {
        return Err(EngineError::LimitExceeded("truck plate too long"));
    }
    Ok(())
}

/// Strict slot rule: no two appointments share the identical instant.
pub(crate) fn check_slot_free(
    store: &AppointmentStore,
    scheduled_at: Ms,
) -> Result<(), EngineError> {
    match store.slot_holder(scheduled_at) {
        Some(holder) => Err(EngineError::SlotConflict(holder)),
        None => Ok(()),
    }
}

/// Availability rule: a driver holds at most one pending/late appointment.
/// Deliberately unscoped in time — a driver with any open appointment may
/// not book another, no matter how far apart the slots are.
pub(crate) fn check_driver_free(
    store: &AppointmentStore,
    driver_id: &str,
) -> Result<(), EngineError> {
    match store.active_for_driver(driver_id) {
        Some(holder) => Err(EngineError::DriverUnavailable {
            driver_id: driver_id.to_string(),
            holder,
        }),
        None => Ok(()),
    }
}

/// Status state machine. Two rules, checked in order:
/// cancelled appointments are immutable, and completed ones cannot be
/// cancelled. Everything else — including same-status no-op writes and
/// reopening a completed appointment — is allowed.
pub(crate) fn check_transition(from: Status, to: Status) -> Result<(), EngineError> {
    if from == Status::Cancelled {
        return Err(EngineError::InvalidTransition {
            from,
            to,
            reason: "cancelled appointments are immutable",
        });
    }
    if from == Status::Completed && to == Status::Cancelled {
        return Err(EngineError::InvalidTransition {
            from,
            to,
            reason: "completed appointments cannot be cancelled",
        });
    }
    Ok(())
}
