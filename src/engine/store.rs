use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

/// In-memory appointment table with the two unique indexes the conflict
/// rules rely on. All invariant-bearing bookkeeping lives here so that
/// every mutation path maintains the indexes the same way.
///
/// Not internally synchronized — the engine wraps it in an `RwLock` and
/// holds the write guard across check-then-write sequences.
#[derive(Debug, Default)]
pub struct AppointmentStore {
    by_id: HashMap<Ulid, Appointment>,
    /// Unique index: exact slot instant → appointment.
    by_slot: HashMap<Ms, Ulid>,
    /// Unique index: driver with an active (pending/late) appointment.
    active_driver: HashMap<String, Ulid>,
    /// Insertion order, drives listing order.
    order: Vec<Ulid>,
}

impl AppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<&Appointment> {
        self.by_id.get(id)
    }

    /// Appointment currently occupying the exact slot instant, if any.
    pub fn slot_holder(&self, scheduled_at: Ms) -> Option<Ulid> {
        self.by_slot.get(&scheduled_at).copied()
    }

    /// The driver's active (pending/late) appointment, if any.
    pub fn active_for_driver(&self, driver_id: &str) -> Option<Ulid> {
        self.active_driver.get(driver_id).copied()
    }

    /// Insertion-order iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Appointment> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn insert(&mut self, appt: Appointment) {
        self.by_slot.insert(appt.scheduled_at, appt.id);
        if appt.status.is_active() {
            self.active_driver.insert(appt.driver_id.clone(), appt.id);
        }
        self.order.push(appt.id);
        self.by_id.insert(appt.id, appt);
    }

    /// Rewrite an appointment's status, keeping the active-driver index in
    /// step. Unknown ids are ignored (replay may carry events for records
    /// purged later in the log).
    ///
    /// Reopening a completed appointment can leave a driver with more than
    /// one active appointment, so the index entry is never overwritten or
    /// removed blindly; deactivation recomputes the driver's entry from
    /// whatever active appointments remain.
    pub fn set_status(&mut self, id: Ulid, status: Status) -> Option<&Appointment> {
        let appt = self.by_id.get_mut(&id)?;
        let was_active = appt.status.is_active();
        let driver_id = appt.driver_id.clone();
        appt.status = status;
        match (was_active, status.is_active()) {
            (true, false) => {
                self.reindex_driver(&driver_id);
            }
            (false, true) => {
                self.active_driver.entry(driver_id).or_insert(id);
            }
            _ => {}
        }
        Some(&self.by_id[&id])
    }

    pub fn remove(&mut self, id: &Ulid) -> Option<Appointment> {
        let appt = self.by_id.remove(id)?;
        self.by_slot.remove(&appt.scheduled_at);
        self.order.retain(|o| o != id);
        if appt.status.is_active() {
            self.reindex_driver(&appt.driver_id);
        }
        Some(appt)
    }

    /// Point the driver's index entry at one of their remaining active
    /// appointments (first in insertion order), or clear it.
    fn reindex_driver(&mut self, driver_id: &str) {
        let next = self
            .order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .find(|a| a.driver_id == driver_id && a.status.is_active())
            .map(|a| a.id);
        match next {
            Some(id) => {
                self.active_driver.insert(driver_id.to_string(), id);
            }
            None => {
                self.active_driver.remove(driver_id);
            }
        }
    }

    /// Ids of appointments whose `created_at` predates the cutoff,
    /// in insertion order.
    pub fn stale(&self, cutoff: Ms) -> Vec<Ulid> {
        self.iter()
            .filter(|a| a.created_at < cutoff)
            .map(|a| a.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::DAY_MS;

    fn appt(scheduled_at: Ms, driver_id: &str, status: Status, created_at: Ms) -> Appointment {
        Appointment {
            id: Ulid::new(),
            scheduled_at,
            contract_number: "CT-1".into(),
            driver_name: "Ana".into(),
            driver_id: driver_id.into(),
            truck_plate: "ABC1D23".into(),
            status,
            created_at,
        }
    }

    #[test]
    fn indexes_track_insert_and_remove() {
        let mut store = AppointmentStore::new();
        let a = appt(1000, "111", Status::Pending, 0);
        let id = a.id;
        store.insert(a);

        assert_eq!(store.slot_holder(1000), Some(id));
        assert_eq!(store.active_for_driver("111"), Some(id));

        store.remove(&id).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.slot_holder(1000), None);
        assert_eq!(store.active_for_driver("111"), None);
    }

    #[test]
    fn completed_driver_leaves_active_index() {
        let mut store = AppointmentStore::new();
        let a = appt(1000, "111", Status::Pending, 0);
        let id = a.id;
        store.insert(a);

        store.set_status(id, Status::Completed).unwrap();
        assert_eq!(store.active_for_driver("111"), None);
        // the slot stays taken regardless of status
        assert_eq!(store.slot_holder(1000), Some(id));

        // reactivation puts the driver back
        store.set_status(id, Status::Late).unwrap();
        assert_eq!(store.active_for_driver("111"), Some(id));
    }

    #[test]
    fn index_survives_reopen_with_two_active() {
        let mut store = AppointmentStore::new();
        let a = appt(1000, "111", Status::Pending, 0);
        let a_id = a.id;
        store.insert(a);
        store.set_status(a_id, Status::Completed).unwrap();

        let b = appt(2000, "111", Status::Pending, 0);
        let b_id = b.id;
        store.insert(b);

        // reopening A must not clobber B's index entry
        store.set_status(a_id, Status::Late).unwrap();
        assert_eq!(store.active_for_driver("111"), Some(b_id));

        // completing B falls back to A, which is still Late
        store.set_status(b_id, Status::Completed).unwrap();
        assert_eq!(store.active_for_driver("111"), Some(a_id));

        store.set_status(a_id, Status::Completed).unwrap();
        assert_eq!(store.active_for_driver("111"), None);
    }

    #[test]
    fn remove_falls_back_to_other_active_appointment() {
        let mut store = AppointmentStore::new();
        let a = appt(1000, "111", Status::Pending, 0);
        let a_id = a.id;
        store.insert(a);
        store.set_status(a_id, Status::Completed).unwrap();

        let b = appt(2000, "111", Status::Pending, 0);
        let b_id = b.id;
        store.insert(b);
        store.set_status(a_id, Status::Pending).unwrap();

        // both A and B are active; deleting the indexed one keeps the driver busy
        store.remove(&b_id).unwrap();
        assert_eq!(store.active_for_driver("111"), Some(a_id));
    }

    #[test]
    fn set_status_unknown_id_is_none() {
        let mut store = AppointmentStore::new();
        assert!(store.set_status(Ulid::new(), Status::Late).is_none());
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut store = AppointmentStore::new();
        let ids: Vec<Ulid> = (0..3)
            .map(|i| {
                let a = appt(i * 1000, &format!("d{i}"), Status::Pending, 0);
                let id = a.id;
                store.insert(a);
                id
            })
            .collect();

        store.remove(&ids[1]).unwrap();
        let seen: Vec<Ulid> = store.iter().map(|a| a.id).collect();
        assert_eq!(seen, vec![ids[0], ids[2]]);
    }

    #[test]
    fn stale_selects_by_created_at_only() {
        let mut store = AppointmentStore::new();
        let now = 10 * DAY_MS;
        // scheduled far in the future but created 4 days ago — still stale
        let old = appt(100 * DAY_MS, "111", Status::Pending, now - 4 * DAY_MS);
        let old_id = old.id;
        store.insert(old);
        store.insert(appt(1000, "222", Status::Pending, now - 2 * DAY_MS));
        store.insert(appt(2000, "333", Status::Pending, now));

        let cutoff = now - 3 * DAY_MS;
        assert_eq!(store.stale(cutoff), vec![old_id]);
    }
}
