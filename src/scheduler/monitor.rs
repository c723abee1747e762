//! Single owner of the configuration set and the status cache.

use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::cache::{CheckStatus, StatusStore};
use crate::db::{ConfigSet, TargetConfig};
use crate::probe::{CheckSuite, FetchError, FetchHandle, Fetched, Fetcher};

struct Completion {
    id: Uuid,
    ticket: u64,
    outcome: Result<Fetched, FetchError>,
}

struct InFlight {
    ticket: u64,
    handle: FetchHandle,
}

#[derive(Default)]
struct MonitorState {
    configs: ConfigSet,
    statuses: StatusStore,
    in_flight: HashMap<Uuid, Vec<InFlight>>,
    next_ticket: u64,
}

impl MonitorState {
    fn is_checking(&self, id: &Uuid) -> bool {
        self.in_flight.get(id).is_some_and(|flights| !flights.is_empty())
    }
}

/// Owns targets, cached statuses and in-flight fetches.
///
/// All state sits behind one lock that is never held across an await.
/// Fetch outcomes are applied by a single writer task fed over a channel,
/// so the cache holds whichever fetch for a target completed last.
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
    fetcher: Fetcher,
    completions: mpsc::UnboundedSender<Completion>,
    revision: Arc<watch::Sender<u64>>,
}

impl Monitor {
    /// Create a monitor over `configs`. Must be called within a Tokio runtime.
    pub fn new(configs: ConfigSet, fetcher: Fetcher) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (revision, _) = watch::channel(0);
        let revision = Arc::new(revision);
        let state = Arc::new(Mutex::new(MonitorState {
            configs,
            ..Default::default()
        }));

        tokio::spawn(run_completion_writer(rx, state.clone(), revision.clone()));

        Self {
            state,
            fetcher,
            completions: tx,
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        lock_state(&self.state)
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Receive a new revision number after every configuration change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // --- Reads ---

    pub fn list_targets(&self) -> Vec<TargetConfig> {
        self.lock().configs.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> ConfigSet {
        self.lock().configs.clone()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().configs.contains(&id)
    }

    pub fn get_target(&self, id: Uuid) -> TargetConfig {
        self.lock().configs.get_or_default(&id)
    }

    /// Cached status for `id`; `None` for unknown ids or targets never checked.
    pub fn get_status(&self, id: Uuid) -> Option<CheckStatus> {
        let mut state = self.lock();
        match state.statuses.status(&id) {
            Some(status) => Some(status),
            None if state.is_checking(&id) => Some(CheckStatus::Pending),
            None => None,
        }
    }

    pub fn read_raw(&self, id: Uuid) -> Option<Bytes> {
        self.lock().statuses.read(&id)
    }

    pub fn is_checking(&self, id: Uuid) -> bool {
        self.lock().is_checking(&id)
    }

    // --- Mutations ---

    pub fn add_target(&self, config: TargetConfig) -> bool {
        let added = self.lock().configs.add(config);
        if added {
            self.bump();
        }
        added
    }

    /// Remove targets, cancelling their fetches and dropping their statuses.
    pub fn remove_targets(&self, ids: &HashSet<Uuid>) -> usize {
        let removed = {
            let mut state = self.lock();
            for id in ids {
                for flight in state.in_flight.remove(id).unwrap_or_default() {
                    flight.handle.cancel();
                }
            }
            state.statuses.remove(ids);
            state.configs.remove(ids)
        };

        if removed > 0 {
            tracing::info!("Monitor: Removed {} targets", removed);
            self.bump();
        }
        removed
    }

    /// Reorder targets. Returns false when the order is unchanged.
    pub fn move_targets(&self, from: &[usize], to: usize) -> bool {
        let moved = self.lock().configs.move_targets(from, to);
        if moved {
            self.bump();
        }
        moved
    }

    /// Replace the target at `id`. Unknown ids are a no-op returning false.
    pub fn update_target(&self, id: Uuid, config: TargetConfig) -> bool {
        let updated = self.lock().configs.update(id, config);
        if updated {
            self.bump();
        }
        updated
    }

    /// Replace the editable fields of `id`, keeping its mirrored status.
    pub fn edit_target(&self, id: Uuid, mut config: TargetConfig) -> bool {
        let updated = {
            let mut state = self.lock();
            let Some(current) = state.configs.get(&id) else {
                return false;
            };
            config.status = current.status.clone();
            state.configs.update(id, config)
        };
        if updated {
            self.bump();
        }
        updated
    }

    // --- Checks ---

    /// Clear the cached status for `id` and start a fetch for it.
    pub fn check_now(&self, id: Uuid) -> Result<(), FetchError> {
        let mut state = self.lock();
        let target = match state.configs.get(&id) {
            Some(target) if target.is_fetchable() => target.clone(),
            _ => return Err(FetchError::NotFetchable),
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.statuses.start_check(id);

        let completions = self.completions.clone();
        let handle = self.fetcher.fetch(&target, move |outcome| {
            // Closed only while the monitor is being dropped
            let _ = completions.send(Completion {
                id,
                ticket,
                outcome,
            });
        })?;

        tracing::debug!("Monitor: Checking {}", target.display_title());
        state
            .in_flight
            .entry(id)
            .or_default()
            .push(InFlight { ticket, handle });
        Ok(())
    }

    /// Start a fetch for every enabled, fetchable target.
    ///
    /// Returns how many fetches were started.
    pub fn check_all(&self) -> usize {
        let ids: Vec<Uuid> = self
            .lock()
            .configs
            .iter()
            .filter(|c| c.enabled_defaulted() && c.is_fetchable())
            .map(|c| c.id())
            .collect();

        let mut started = 0;
        for id in ids {
            match self.check_now(id) {
                Ok(()) => started += 1,
                Err(e) => tracing::warn!("Monitor: Could not check {}: {}", id, e),
            }
        }
        started
    }

    /// Cancel pending fetches for `id`. Returns false if none was pending.
    pub fn cancel_check(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        let Some(flights) = state.in_flight.get_mut(&id) else {
            return false;
        };

        let before = flights.len();
        // Completed fetches stay tracked until the writer applies them
        flights.retain(|flight| !flight.handle.cancel());
        let cancelled = before - flights.len();

        if flights.is_empty() {
            state.in_flight.remove(&id);
        }
        cancelled > 0
    }
}

fn lock_state(state: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply fetch outcomes to the cache in completion order.
async fn run_completion_writer(
    mut rx: mpsc::UnboundedReceiver<Completion>,
    state: Arc<Mutex<MonitorState>>,
    revision: Arc<watch::Sender<u64>>,
) {
    while let Some(completion) = rx.recv().await {
        let changed = apply_completion(&mut lock_state(&state), completion);
        if changed {
            revision.send_modify(|r| *r += 1);
        }
    }
}

/// Returns true when the target's mirrored status changed.
fn apply_completion(state: &mut MonitorState, completion: Completion) -> bool {
    let Completion { id, ticket, outcome } = completion;

    if let Some(flights) = state.in_flight.get_mut(&id) {
        flights.retain(|flight| flight.ticket != ticket);
        if flights.is_empty() {
            state.in_flight.remove(&id);
        }
    }

    if !state.configs.contains(&id) {
        tracing::debug!("Monitor: Dropping result for removed target {}", id);
        return false;
    }

    match outcome {
        Ok(fetched) => {
            tracing::info!(
                "Monitor: {} returned {} suites ({:?}) in {:?}",
                fetched.meta.url,
                fetched.report.total_count,
                fetched.report.summary(),
                fetched.meta.elapsed
            );
            let latest = fetched.report.latest().cloned();
            state.statuses.complete_check(id, fetched.body);
            mirror_status(state, id, latest)
        }
        Err(FetchError::Decode { source, body }) => {
            tracing::warn!("Monitor: Bad response for {}: {}", id, source);
            state.statuses.complete_check(id, body);
            false
        }
        Err(e) => {
            tracing::warn!("Monitor: Check for {} failed: {}", id, e);
            state.statuses.fail_check(id, e);
            false
        }
    }
}

fn mirror_status(state: &mut MonitorState, id: Uuid, latest: Option<CheckSuite>) -> bool {
    let mut config = state.configs.get_or_default(&id);
    if config.status == latest {
        return false;
    }
    config.status = latest;
    state.configs.update(id, config)
}
