mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use store::AppointmentStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::limits::DEFAULT_RETENTION_MS;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
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
/// 4. Single sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
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

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
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

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut buffer_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.buffer(event) {
            buffer_err = Some(e);
            break;
        }
    }
    // Always sync — even on buffer error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let sync_err = wal.sync().err();
    if let Some(e) = buffer_err {
        return Err(e);
    }
    if let Some(e) = sync_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::stage_compaction(wal.path(), &events)
                .and_then(|()| wal.commit_compaction());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The Scheduling Engine. All decision logic lives here; durable state is
/// the WAL, queryable state is the in-memory [`AppointmentStore`].
///
/// The store sits behind a single `RwLock`. Creation holds the write guard
/// across its conflict checks and the write, so two concurrent creations
/// targeting the same slot or the same driver cannot both succeed.
pub struct Engine {
    store: RwLock<AppointmentStore>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    retention_ms: Ms,
}

/// Apply an event to the store. Used by replay and by every mutation after
/// its WAL append succeeds — the two paths must stay identical.
fn apply(store: &mut AppointmentStore, event: &Event) {
    match event {
        Event::AppointmentCreated { .. } => {
            if let Some(appt) = event.clone().into_appointment() {
                store.insert(appt);
            }
        }
        Event::StatusChanged { id, status } => {
            store.set_status(*id, *status);
        }
        Event::AppointmentDeleted { id } => {
            store.remove(id);
        }
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_retention(wal_path, notify, DEFAULT_RETENTION_MS)
    }

    pub fn with_retention(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        retention_ms: Ms,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut store = AppointmentStore::new();
        for event in &events {
            apply(&mut store, event);
        }

        Ok(Self {
            store: RwLock::new(store),
            wal_tx,
            notify,
            retention_ms,
        })
    }

    pub fn retention_ms(&self) -> Ms {
        self.retention_ms
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply + notify in one call, under the caller's write
    /// guard. The in-memory state only moves once the event is durable.
    pub(super) async fn persist_and_apply(
        &self,
        store: &mut AppointmentStore,
        driver_id: &str,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply(store, event);
        self.notify.send(driver_id, event);
        Ok(())
    }

    pub(super) async fn store_read(
        &self,
    ) -> tokio::sync::RwLockReadGuard<'_, AppointmentStore> {
        self.store.read().await
    }

    pub(super) async fn store_write(
        &self,
    ) -> tokio::sync::RwLockWriteGuard<'_, AppointmentStore> {
        self.store.write().await
    }
}
