use ulid::Ulid;

use crate::limits::MAX_APPOINTMENTS_PER_TENANT;
use crate::model::*;

use super::conflict::{
    check_driver_free, check_slot_free, check_transition, now_ms, validate_new,
};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Create a new appointment. Validation order: input limits, then the
    /// slot-conflict rule, then the driver-availability rule; first failure
    /// wins and nothing is written. The store write guard is held across
    /// both checks and the write.
    pub async fn create_appointment(
        &self,
        req: NewAppointment,
    ) -> Result<Appointment, EngineError> {
        validate_new(&req)?;

        let mut store = self.store_write().await;
        if store.len() >= MAX_APPOINTMENTS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many appointments"));
        }
        check_slot_free(&store, req.scheduled_at)?;
        check_driver_free(&store, &req.driver_id)?;

        let appt = Appointment {
            id: Ulid::new(),
            scheduled_at: req.scheduled_at,
            contract_number: req.contract_number,
            driver_name: req.driver_name,
            driver_id: req.driver_id,
            truck_plate: req.truck_plate,
            status: Status::Pending,
            created_at: now_ms(),
        };
        let event = Event::created(&appt);
        self.persist_and_apply(&mut store, &appt.driver_id, &event)
            .await?;
        Ok(appt)
    }

    /// Move an appointment to `status`, subject to the state machine.
    /// Same-status writes are accepted and persisted as no-ops.
    pub async fn change_status(
        &self,
        id: Ulid,
        status: Status,
    ) -> Result<Appointment, EngineError> {
        let mut store = self.store_write().await;
        let current = store.get(&id).ok_or(EngineError::NotFound(id))?;
        check_transition(current.status, status)?;
        let driver_id = current.driver_id.clone();

        let event = Event::StatusChanged { id, status };
        self.persist_and_apply(&mut store, &driver_id, &event).await?;
        Ok(store.get(&id).cloned().expect("updated appointment present"))
    }

    /// Explicit deletion path. Distinct from the retention purge.
    pub async fn delete_appointment(&self, id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store_write().await;
        let appt = store.get(&id).ok_or(EngineError::NotFound(id))?;
        let driver_id = appt.driver_id.clone();

        let event = Event::AppointmentDeleted { id };
        self.persist_and_apply(&mut store, &driver_id, &event).await
    }

    /// Delete every appointment whose `created_at` is older than the
    /// retention window. Returns the number removed. Selection is by record
    /// age, never by slot time.
    pub async fn purge_stale(&self) -> Result<usize, EngineError> {
        self.purge_stale_at(now_ms()).await
    }

    /// Purge with an explicit clock, so retention is testable.
    pub async fn purge_stale_at(&self, now: Ms) -> Result<usize, EngineError> {
        let cutoff = now - self.retention_ms();
        let mut store = self.store_write().await;
        let stale = store.stale(cutoff);
        for id in &stale {
            let driver_id = match store.get(id) {
                Some(a) => a.driver_id.clone(),
                None => continue,
            };
            let event = Event::AppointmentDeleted { id: *id };
            self.persist_and_apply(&mut store, &driver_id, &event).await?;
        }
        Ok(stale.len())
    }

    /// Rewrite the WAL with one creation event per live appointment.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let events: Vec<Event> = {
            let store = self.store_read().await;
            store.iter().map(Event::created).collect()
        };

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
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
