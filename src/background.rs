//! Background maintenance for the store: periodic `sync` and segment
//! compaction on a timer, so callers don't have to drive `rehash`/`compact`
//! by hand.
//!
//! Shape grounded on the usual background-task-manager pattern: an
//! `AtomicBool` run flag, a `tokio::spawn`ed interval loop per task, and a
//! `Drop` impl that aborts outstanding tasks. Earlier storage engines in
//! this lineage ran a checkpoint task, a GC task and a log-maintenance task
//! side by side; this store only needs one periodic pass (`sync` +
//! `compact`), since the controller already drives splits inline on every
//! write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Runs periodic `sync` + `compact` passes against a [`Store`] on a timer.
pub struct BackgroundTaskManager {
    running: Arc<AtomicBool>,
    store: Store,
    interval_ms: u64,
    task_handle: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BackgroundTaskManager {
    pub fn new(store: Store, interval_ms: u64) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            store,
            interval_ms,
            task_handle: parking_lot::Mutex::new(None),
        }
    }

    /// Start the maintenance task. Errors if already running.
    pub fn start(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StoreError::internal(
                "background maintenance is already running",
            ));
        }

        log::info!(
            "starting background maintenance, interval={}ms",
            self.interval_ms
        );

        let running = self.running.clone();
        let store = self.store.clone();
        let interval_ms = self.interval_ms;

        let handle = tokio::spawn(async move {
            let mut tick = interval(Duration::from_millis(interval_ms));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while running.load(Ordering::Acquire) {
                tick.tick().await;
                if !running.load(Ordering::Acquire) {
                    break;
                }
                Self::perform_maintenance(&store);
            }

            log::info!("background maintenance task stopped");
        });

        *self.task_handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop the maintenance task, waiting for the in-flight tick (if any)
    /// to finish. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let handle = self.task_handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn perform_maintenance(store: &Store) {
        if let Err(err) = store.sync() {
            log::warn!("background sync failed: {err}");
            return;
        }
        match store.compact() {
            Ok(stats) if stats.segments_compacted > 0 => {
                log::debug!(
                    "background compaction reclaimed {} segments, relocated {} records",
                    stats.segments_compacted,
                    stats.records_relocated
                );
            }
            Ok(_) => {}
            Err(err) => log::warn!("background compaction failed: {err}"),
        }
    }

    pub fn stats(&self) -> BackgroundTaskStats {
        BackgroundTaskStats {
            is_running: self.is_running(),
            interval_ms: self.interval_ms,
        }
    }
}

impl Drop for BackgroundTaskManager {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::AcqRel)
            && let Some(handle) = self.task_handle.lock().take()
        {
            handle.abort();
        }
    }
}

/// Snapshot of background maintenance status.
#[derive(Debug, Clone)]
pub struct BackgroundTaskStats {
    pub is_running: bool,
    pub interval_ms: u64,
}
