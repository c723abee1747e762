//! Scheduler module for polling targets on their check intervals.

mod cache;
mod monitor;
mod persist;

pub use cache::*;
pub use monitor::*;
pub use persist::*;

use crate::db::{TargetConfig, MIN_CHECK_INTERVAL};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// What a running loop was started with; a change restarts the loop.
#[derive(Debug, Clone, PartialEq)]
struct LoopSignature {
    interval: f64,
    org: Option<String>,
    repo: Option<String>,
    branch: Option<String>,
}

impl LoopSignature {
    fn of(target: &TargetConfig) -> Self {
        Self {
            interval: target.check_interval_defaulted(),
            org: target.org.clone(),
            repo: target.repo.clone(),
            branch: target.branch.clone(),
        }
    }
}

struct PollLoop {
    signature: LoopSignature,
    stop_tx: broadcast::Sender<()>,
}

/// Runs one poll loop per enabled, fetchable target.
pub struct Scheduler {
    monitor: Arc<Monitor>,
    loops: Arc<RwLock<HashMap<Uuid, PollLoop>>>,
    stop: Mutex<Option<broadcast::Sender<()>>>,
}

impl Scheduler {
    /// Create a new scheduler driving checks on the given monitor.
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            loops: Arc::new(RwLock::new(HashMap::new())),
            stop: Mutex::new(None),
        }
    }

    /// Start polling and follow configuration changes until stopped.
    pub async fn start(&self) {
        let mut changes = self.monitor.subscribe();
        self.sync().await;

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        if let Ok(mut stop) = self.stop.lock() {
            *stop = Some(stop_tx);
        }

        let monitor = self.monitor.clone();
        let loops = self.loops.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        sync_loops(&monitor, &loops).await;
                    }
                }
            }
        });
    }

    /// Reconcile running loops with the current targets.
    pub async fn sync(&self) {
        sync_loops(&self.monitor, &self.loops).await;
    }

    /// Stop following changes and stop every poll loop.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().ok().and_then(|mut stop| stop.take()) {
            let _ = tx.send(());
        }

        let mut loops = self.loops.write().await;
        for (_, poll) in loops.drain() {
            let _ = poll.stop_tx.send(());
        }
        tracing::info!("Scheduler: Stopped");
    }

    /// Targets that currently have a poll loop.
    pub async fn running(&self) -> Vec<Uuid> {
        self.loops.read().await.keys().copied().collect()
    }
}

async fn sync_loops(monitor: &Arc<Monitor>, loops: &RwLock<HashMap<Uuid, PollLoop>>) {
    let wanted: HashMap<Uuid, LoopSignature> = monitor
        .list_targets()
        .iter()
        .filter(|t| t.enabled_defaulted() && t.is_fetchable())
        .map(|t| (t.id(), LoopSignature::of(t)))
        .collect();

    let mut loops = loops.write().await;

    loops.retain(|id, poll| {
        let keep = wanted.get(id) == Some(&poll.signature);
        if !keep {
            let _ = poll.stop_tx.send(());
            tracing::info!("Scheduler: Stopped polling {}", id);
        }
        keep
    });

    for (id, signature) in wanted {
        if loops.contains_key(&id) {
            continue;
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        tracing::info!(
            "Scheduler: Polling {} every {}s",
            id,
            signature.interval
        );
        let period = Duration::try_from_secs_f64(signature.interval).unwrap_or_else(|e| {
            tracing::warn!("Scheduler: Bad interval {} for {}: {}", signature.interval, id, e);
            Duration::from_secs_f64(MIN_CHECK_INTERVAL)
        });
        tokio::spawn(run_poll_loop(monitor.clone(), id, period, stop_rx));
        loops.insert(id, PollLoop { signature, stop_tx });
    }
}

/// Run the poll loop for a single target.
async fn run_poll_loop(
    monitor: Arc<Monitor>,
    id: Uuid,
    period: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    // Add jitter to avoid thundering herd
    let jitter = Duration::from_millis(rand::random::<u64>() % 1000);

    let mut interval = tokio::time::interval_at(Instant::now() + jitter, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            _ = interval.tick() => {
                if monitor.is_checking(id) {
                    tracing::warn!("Scheduler: Skipping check for {}, previous check still running", id);
                    continue;
                }

                if let Err(e) = monitor.check_now(id) {
                    tracing::error!("Scheduler: Check for {} failed to start: {}", id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{decode_value, ConfigSet, MAX_CHECK_INTERVAL};
    use crate::probe::testing::{suites_url, wait_until, ScriptedTransport, SUCCESS_BODY};
    use crate::probe::{Fetcher, DEFAULT_API_BASE};
    use reqwest::Url;

    fn target(org: Option<&str>, enabled: bool) -> TargetConfig {
        let mut config = TargetConfig::new();
        if let Some(org) = org {
            config.set_org(org);
        }
        config.set_enabled_defaulted(enabled);
        config
    }

    fn monitor_with(transport: Arc<ScriptedTransport>, targets: Vec<TargetConfig>) -> Arc<Monitor> {
        let fetcher = Fetcher::new(transport, Url::parse(DEFAULT_API_BASE).unwrap());
        Arc::new(Monitor::new(targets.into_iter().collect(), fetcher))
    }

    #[tokio::test]
    async fn test_only_enabled_fetchable_targets_poll() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(&suites_url("a"), 200, SUCCESS_BODY);
        let enabled = target(Some("a"), true);
        let enabled_id = enabled.id();
        let monitor = monitor_with(
            transport,
            vec![enabled, target(Some("b"), false), target(None, true)],
        );

        let scheduler = Scheduler::new(monitor.clone());
        scheduler.start().await;
        assert_eq!(scheduler.running().await, [enabled_id]);

        // First tick fires after the jitter
        wait_until(|| monitor.read_raw(enabled_id).is_some()).await;

        scheduler.stop().await;
        assert!(scheduler.running().await.is_empty());
    }

    #[tokio::test]
    async fn test_loops_follow_configuration_changes() {
        let transport = Arc::new(ScriptedTransport::new());
        let first = target(Some("a"), true);
        let first_id = first.id();
        let monitor = monitor_with(transport, vec![first]);

        let scheduler = Scheduler::new(monitor.clone());
        scheduler.start().await;
        assert_eq!(scheduler.running().await.len(), 1);

        let second = target(Some("b"), true);
        let second_id = second.id();
        monitor.add_target(second);

        let mut disabled = monitor.get_target(first_id);
        disabled.set_enabled_defaulted(false);
        monitor.update_target(first_id, disabled);

        for _ in 0..200 {
            if scheduler.running().await == [second_id] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(scheduler.running().await, [second_id]);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_oversized_stored_interval_still_schedules() {
        let transport = Arc::new(ScriptedTransport::new());
        let json = format!(
            r#"{{"configs":[{{"id":"{}","enabled":true,"org":"a","checkInterval":1e300}}]}}"#,
            Uuid::new_v4()
        );
        let configs: ConfigSet = decode_value(&json).unwrap();
        let id = configs.iter().next().unwrap().id();
        let fetcher = Fetcher::new(transport, Url::parse(DEFAULT_API_BASE).unwrap());
        let monitor = Arc::new(Monitor::new(configs, fetcher));

        let scheduler = Scheduler::new(monitor);
        scheduler.start().await;

        assert_eq!(scheduler.running().await, [id]);
        let signature = scheduler.loops.read().await[&id].signature.clone();
        assert_eq!(signature.interval, MAX_CHECK_INTERVAL);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_interval_change_restarts_loop() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = target(Some("a"), true);
        let id = config.id();
        let monitor = monitor_with(transport, vec![config]);

        let scheduler = Scheduler::new(monitor.clone());
        scheduler.sync().await;
        let before = scheduler.loops.read().await[&id].signature.clone();
        assert_eq!(before.interval, 30.0);

        let mut edited = monitor.get_target(id);
        edited.set_check_interval_defaulted(600.0);
        monitor.update_target(id, edited);
        scheduler.sync().await;

        let after = scheduler.loops.read().await[&id].signature.clone();
        assert_eq!(after.interval, 600.0);
        scheduler.stop().await;
    }
}
