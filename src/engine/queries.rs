use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    /// All appointments matching the filter, in insertion order.
    /// Filter fields combine conjunctively; an empty filter returns
    /// everything.
    pub async fn list_appointments(&self, filter: &Filter) -> Vec<Appointment> {
        let store = self.store_read().await;
        store.iter().filter(|a| filter.matches(a)).cloned().collect()
    }

    pub async fn get_appointment(&self, id: Ulid) -> Option<Appointment> {
        let store = self.store_read().await;
        store.get(&id).cloned()
    }

    pub async fn appointment_count(&self) -> usize {
        let store = self.store_read().await;
        store.len()
    }
}
