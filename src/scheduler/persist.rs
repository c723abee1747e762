//! Debounced persistence of the configuration set.

use crate::db::{save_config_set, DbError, SlotStore};

use super::Monitor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Writes the configuration set to its slot after changes settle.
pub struct Persister {
    monitor: Arc<Monitor>,
    slots: Arc<dyn SlotStore>,
    key: String,
    debounce: Duration,
    stop: Mutex<Option<broadcast::Sender<()>>>,
}

impl Persister {
    pub fn new(
        monitor: Arc<Monitor>,
        slots: Arc<dyn SlotStore>,
        key: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            monitor,
            slots,
            key: key.into(),
            debounce,
            stop: Mutex::new(None),
        }
    }

    /// Start the persister background task.
    pub fn start(&self) {
        let (tx, mut rx) = broadcast::channel(1);
        if let Ok(mut stop) = self.stop.lock() {
            *stop = Some(tx);
        }

        let mut changes = self.monitor.subscribe();
        let monitor = self.monitor.clone();
        let slots = self.slots.clone();
        let key = self.key.clone();
        let debounce = self.debounce;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }

                        // Let a burst of edits settle into one write
                        tokio::select! {
                            _ = rx.recv() => break,
                            _ = tokio::time::sleep(debounce) => {}
                        }
                        changes.borrow_and_update();

                        if let Err(e) = persist(&monitor, slots.as_ref(), &key) {
                            tracing::error!("Persister: Failed to save {}: {}", key, e);
                        }
                    }
                }
            }
        });
    }

    /// Stop the persister. Pending changes are left for [`Persister::flush`].
    pub fn stop(&self) {
        if let Some(tx) = self.stop.lock().ok().and_then(|mut stop| stop.take()) {
            let _ = tx.send(());
        }
    }

    /// Save the current configuration set immediately.
    pub fn flush(&self) -> Result<(), DbError> {
        persist(&self.monitor, self.slots.as_ref(), &self.key)
    }
}

fn persist(monitor: &Monitor, slots: &dyn SlotStore, key: &str) -> Result<(), DbError> {
    let snapshot = monitor.snapshot();
    save_config_set(slots, key, &snapshot)?;
    tracing::debug!("Persister: Saved {} targets to {}", snapshot.len(), key);
    Ok(())
}
