use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::DAY_MS;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// UTC epoch day of an instant. All calendar-day comparisons go through
/// this, so the reference time zone is UTC everywhere.
pub fn utc_day(t: Ms) -> i64 {
    t.div_euclid(DAY_MS)
}

/// Appointment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Completed,
    Late,
    Cancelled,
}

impl Status {
    /// Pending and Late appointments count against driver availability.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Pending | Status::Late)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
            Status::Late => "late",
            Status::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "completed" => Ok(Status::Completed),
            "late" => Ok(Status::Late),
            "cancelled" => Ok(Status::Cancelled),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// A reserved delivery slot for a driver+truck against a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    /// The slot instant being reserved. Unique across all appointments.
    pub scheduled_at: Ms,
    pub contract_number: String,
    pub driver_name: String,
    pub driver_id: String,
    pub truck_plate: String,
    pub status: Status,
    /// Set once at creation; drives retention purging, never scheduling.
    pub created_at: Ms,
}

/// Caller-supplied fields for creation. `id`, `status` and `created_at`
/// are always assigned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub scheduled_at: Ms,
    pub contract_number: String,
    pub driver_name: String,
    pub driver_id: String,
    pub truck_plate: String,
}

/// Conjunctive listing filter. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Any instant within the wanted UTC calendar day.
    pub day: Option<Ms>,
    pub status: Option<Status>,
    pub driver_id: Option<String>,
}

impl Filter {
    pub fn matches(&self, appt: &Appointment) -> bool {
        if let Some(day) = self.day
            && utc_day(appt.scheduled_at) != utc_day(day) {
                return false;
            }
        if let Some(status) = self.status
            && appt.status != status {
                return false;
            }
        if let Some(ref driver_id) = self.driver_id
            && appt.driver_id != *driver_id {
                return false;
            }
        true
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
///
/// `AppointmentCreated` carries the full entity (including status) so that
/// compaction can emit one event per live appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentCreated {
        id: Ulid,
        scheduled_at: Ms,
        contract_number: String,
        driver_name: String,
        driver_id: String,
        truck_plate: String,
        status: Status,
        created_at: Ms,
    },
    StatusChanged {
        id: Ulid,
        status: Status,
    },
    AppointmentDeleted {
        id: Ulid,
    },
}

impl Event {
    pub fn created(appt: &Appointment) -> Self {
        Event::AppointmentCreated {
            id: appt.id,
            scheduled_at: appt.scheduled_at,
            contract_number: appt.contract_number.clone(),
            driver_name: appt.driver_name.clone(),
            driver_id: appt.driver_id.clone(),
            truck_plate: appt.truck_plate.clone(),
            status: appt.status,
            created_at: appt.created_at,
        }
    }

    /// Reverse of [`Event::created`]. Returns `None` for other variants.
    pub fn into_appointment(self) -> Option<Appointment> {
        match self {
            Event::AppointmentCreated {
                id,
                scheduled_at,
                contract_number,
                driver_name,
                driver_id,
                truck_plate,
                status,
                created_at,
            } => Some(Appointment {
                id,
                scheduled_at,
                contract_number,
                driver_name,
                driver_id,
                truck_plate,
                status,
                created_at,
            }),
            _ => None,
        }
    }
}
