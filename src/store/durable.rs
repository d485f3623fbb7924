use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::model::*;
use crate::wal::Wal;

use super::{BookingIdGen, Durability, MemoryStore, SlotStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
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
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until a command arrives.
/// 2. For an Append, drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
/// 4. A non-append command that ended the batch runs after the flush.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (first, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                if handle_non_append(&mut wal, other) {
                    return;
                }
                continue;
            }
        };

        let mut batch: Vec<PendingAppend> = vec![(first, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(cmd) = deferred
            && handle_non_append(&mut wal, cmd)
        {
            return;
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partial bytes don't leak into the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// Returns true when the loop should stop.
fn handle_non_append(wal: &mut Wal, cmd: WalCommand) -> bool {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
            false
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
            false
        }
        WalCommand::Shutdown { response } => {
            if let Err(e) = wal.flush_sync() {
                warn!("final WAL flush failed: {e}");
            }
            let _ = response.send(());
            true
        }
        WalCommand::Append { .. } => false,
    }
}

/// Slot store backed by a write-ahead log.
///
/// Each write is applied to the in-memory tables first and then appended
/// through the group-commit writer. If the append fails the write stays
/// applied and the caller gets [`Durability::Unconfirmed`].
pub struct WalStore {
    mem: MemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Shared by writers across apply + append; exclusive for compaction so a
    /// snapshot never misses an event whose append is still queued.
    gate: RwLock<()>,
    /// Held across apply + enqueue so the log receives events in the order
    /// they were applied in memory.
    order: Mutex<()>,
}

impl WalStore {
    /// Replay the log at `path` and start its writer task. Must be called
    /// inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::open_with(path, MemoryStore::new())
    }

    pub fn open_with_id_gen(path: &Path, id_gen: BookingIdGen) -> io::Result<Self> {
        Self::open_with(path, MemoryStore::with_id_gen(id_gen))
    }

    fn open_with(path: &Path, mem: MemoryStore) -> io::Result<Self> {
        let events = Wal::recover(path)?;
        let mut skipped = 0usize;
        for event in &events {
            if let Err(e) = mem.apply(event) {
                debug!("replay skipped event: {e}");
                skipped += 1;
            }
        }
        info!(
            "replayed {} events from {} ({skipped} skipped): {} slots, {} bookings",
            events.len(),
            path.display(),
            mem.slot_count(),
            mem.booking_count()
        );

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            mem,
            wal_tx,
            gate: RwLock::new(()),
            order: Mutex::new(()),
        })
    }

    async fn enqueue(&self, event: Event) -> Result<oneshot::Receiver<io::Result<()>>, String> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| "WAL writer shut down".to_string())?;
        Ok(rx)
    }

    async fn commit(&self, event: Event) -> Result<Durability, StoreError> {
        let _gate = self.gate.read().await;
        let queued = {
            let _order = self.order.lock().await;
            self.mem.apply(&event)?;
            self.enqueue(event).await
        };
        let appended = match queued {
            Ok(rx) => rx
                .await
                .map_err(|_| "WAL writer dropped response".to_string())
                .and_then(|r| r.map_err(|e| e.to_string())),
            Err(reason) => Err(reason),
        };
        match appended {
            Ok(()) => Ok(Durability::Committed),
            Err(reason) => {
                warn!("WAL append failed, write not durable: {reason}");
                metrics::counter!(crate::observability::UNCONFIRMED_WRITES_TOTAL).increment(1);
                Ok(Durability::Unconfirmed(reason))
            }
        }
    }

    /// Rewrite the log with the minimal event set for the current state.
    pub async fn compact(&self) -> io::Result<()> {
        let _gate = self.gate.write().await;
        let events = self.mem.snapshot();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| io::Error::other("WAL writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("WAL writer dropped response"))?
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
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

    /// Flush and stop the writer. Later writes still apply in memory but
    /// come back `Unconfirmed`.
    pub async fn shutdown(&self) {
        let _gate = self.gate.write().await;
        let (tx, rx) = oneshot::channel();
        if self.wal_tx.send(WalCommand::Shutdown { response: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

#[async_trait]
impl SlotStore for WalStore {
    async fn get_status(&self, slot_id: &SlotId) -> Option<bool> {
        self.mem.get_status(slot_id).await
    }

    async fn set_status(&self, slot_id: &SlotId, available: bool) -> Result<Durability, StoreError> {
        self.commit(Event::SlotStatusSet { slot_id: slot_id.clone(), available, at: now_ms() })
            .await
    }

    async fn create_booking(
        &self,
        slot_id: &SlotId,
        user_name: &str,
    ) -> Result<(BookingId, Durability), StoreError> {
        let (booking_id, event) = self.mem.booking_created(slot_id, user_name)?;
        let durability = self.commit(event).await?;
        Ok((booking_id, durability))
    }

    async fn get_active_booking(&self, booking_id: &BookingId) -> Option<(SlotId, String)> {
        self.mem.get_active_booking(booking_id).await
    }

    async fn set_booking_status(
        &self,
        booking_id: &BookingId,
        status: BookingStatus,
    ) -> Result<Durability, StoreError> {
        self.commit(Event::BookingStatusSet { booking_id: booking_id.clone(), status })
            .await
    }

    async fn active_booking_for_slot(&self, slot_id: &SlotId) -> Option<BookingId> {
        self.mem.active_booking_for_slot(slot_id).await
    }

    async fn list_slots(&self) -> Vec<SlotInfo> {
        self.mem.list_slots().await
    }

    async fn list_bookings(&self) -> Vec<BookingRecord> {
        self.mem.list_bookings().await
    }

    async fn insert_slot(&self, slot_id: &SlotId) -> Result<Durability, StoreError> {
        self.commit(self.mem.slot_added(slot_id)).await
    }

    async fn delete_slot(&self, slot_id: &SlotId) -> Result<Durability, StoreError> {
        self.commit(Event::SlotRemoved { slot_id: slot_id.clone() }).await
    }
}
