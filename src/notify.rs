use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-driver event channels. Every committed engine
/// event is published under the appointment's `driver_id`, so a dispatcher
/// can follow one driver's schedule without polling.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a driver. Creates the channel if needed.
    pub fn subscribe(&self, driver_id: &str) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(driver_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an event. No-op if nobody is listening on that driver.
    pub fn send(&self, driver_id: &str, event: &Event) {
        if let Some(sender) = self.channels.get(driver_id) {
            let _ = sender.send(event.clone());
        }
    }
}
