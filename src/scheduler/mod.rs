//! Scheduler module for running one polling loop per target.

mod writer;

pub use writer::*;

use crate::db::Target;
use crate::probe::{HttpProbe, Outcome, Probe, ProbeError};
use crate::tsdb::TimeSeriesStore;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

/// Identifies one running polling loop. The same URL registered twice gets
/// two ids.
pub type LoopId = u64;

/// Builds the probe a new loop will own for its whole lifetime.
pub type ProbeFactory = Arc<dyn Fn() -> Result<Box<dyn Probe>, ProbeError> + Send + Sync>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("target {0} has no positive collection interval")]
    InvalidInterval(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

struct RunningLoop {
    target: Target,
    stop_tx: broadcast::Sender<()>,
}

/// The scheduler that owns every polling loop.
pub struct Scheduler {
    store: Arc<dyn TimeSeriesStore>,
    new_probe: ProbeFactory,
    loops: Arc<RwLock<HashMap<LoopId, RunningLoop>>>,
    next_id: AtomicU64,
}

impl Scheduler {
    /// Create a scheduler whose loops probe over HTTP with the given deadline.
    pub fn new(store: Arc<dyn TimeSeriesStore>, probe_timeout: Duration) -> Self {
        let factory: ProbeFactory = Arc::new(move || {
            let probe = HttpProbe::new(probe_timeout)?;
            Ok(Box::new(probe) as Box<dyn Probe>)
        });
        Self::with_probe_factory(store, factory)
    }

    pub fn with_probe_factory(store: Arc<dyn TimeSeriesStore>, new_probe: ProbeFactory) -> Self {
        Self {
            store,
            new_probe,
            loops: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start polling `target`. Returns as soon as the loop is spawned; the
    /// first probe fires one full interval later.
    pub async fn register(&self, target: Target) -> Result<LoopId, SchedulerError> {
        let interval = target
            .interval()
            .ok_or_else(|| SchedulerError::InvalidInterval(target.url.clone()))?;
        let probe = (self.new_probe)()?;
        let writer = SampleWriter::new(self.store.clone());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = broadcast::channel(1);

        self.loops.write().await.insert(
            id,
            RunningLoop {
                target: target.clone(),
                stop_tx,
            },
        );

        tracing::info!(
            "Scheduler: Checking target {} every {}s",
            target.url,
            target.collection_interval
        );

        let loops = self.loops.clone();
        tokio::spawn(async move {
            run_target_loop(target, interval, probe, writer, stop_rx).await;

            // Clean up when done
            loops.write().await.remove(&id);
        });

        Ok(id)
    }

    /// Start a loop for every target, skipping the ones that cannot be
    /// scheduled. Returns how many loops were started.
    pub async fn register_all(&self, targets: Vec<Target>) -> usize {
        let mut started = 0;
        for target in targets {
            let url = target.url.clone();
            match self.register(target).await {
                Ok(_) => started += 1,
                Err(e) => tracing::warn!("Scheduler: Skipping target {}: {}", url, e),
            }
        }
        started
    }

    /// Stop one loop. Returns false if no such loop is running.
    pub async fn stop(&self, id: LoopId) -> bool {
        match self.loops.write().await.remove(&id) {
            Some(running) => {
                let _ = running.stop_tx.send(());
                tracing::info!("Scheduler: Stopped loop {} for {}", id, running.target.url);
                true
            }
            None => false,
        }
    }

    /// Stop every loop.
    pub async fn shutdown(&self) {
        let mut loops = self.loops.write().await;
        for (_, running) in loops.drain() {
            let _ = running.stop_tx.send(());
        }
        tracing::info!("Scheduler: All loops stopped");
    }

    /// Snapshot of the running loops, ordered by id.
    pub async fn running(&self) -> Vec<(LoopId, Target)> {
        let loops = self.loops.read().await;
        let mut running: Vec<_> = loops
            .iter()
            .map(|(id, l)| (*id, l.target.clone()))
            .collect();
        running.sort_by_key(|(id, _)| *id);
        running
    }
}

/// Run the polling loop for a single target until told to stop.
async fn run_target_loop(
    target: Target,
    period: Duration,
    probe: Box<dyn Probe>,
    mut writer: SampleWriter,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    // An overrunning probe pushes this loop's schedule back; no catch-up burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            _ = ticker.tick() => {
                let outcome = probe.run(&target.url).await;
                log_outcome(&outcome);
                writer.write(&outcome).await;
            }
        }
    }
}

fn log_outcome(outcome: &Outcome) {
    match (outcome.response_time_ms(), outcome.status_code()) {
        (Some(elapsed), Some(code)) if !outcome.healthy() => tracing::warn!(
            "Target {} is unhealthy: status {} in {:.0} ms",
            outcome.target,
            code,
            elapsed
        ),
        (Some(elapsed), Some(_)) => tracing::info!(
            "Target {} is healthy and responded in {:.0} ms",
            outcome.target,
            elapsed
        ),
        _ => tracing::warn!("Target {} is not healthy", outcome.target),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tsdb::testing::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Probe double recording when and what it was asked to check.
    pub(crate) struct RecordingProbe {
        calls: Arc<Mutex<Vec<(String, Instant)>>>,
        reachable: bool,
    }

    #[async_trait]
    impl Probe for RecordingProbe {
        async fn run(&self, url: &str) -> Outcome {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), Instant::now()));
            if self.reachable {
                Outcome::responded(url, 5.0, 200)
            } else {
                Outcome::failed(url)
            }
        }
    }

    pub(crate) type Calls = Arc<Mutex<Vec<(String, Instant)>>>;

    pub(crate) fn recording_factory(reachable: bool) -> (ProbeFactory, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let shared = calls.clone();
        let factory: ProbeFactory = Arc::new(move || {
            Ok(Box::new(RecordingProbe {
                calls: shared.clone(),
                reachable,
            }) as Box<dyn Probe>)
        });
        (factory, calls)
    }

    fn ticks_for(calls: &Calls, url: &str, origin: Instant) -> Vec<u64> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| at.duration_since(origin).as_secs())
            .collect()
    }

    async fn advance_to(origin: Instant, secs: f64) {
        tokio::time::sleep_until(origin + Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_waits_one_interval() {
        let store = Arc::new(MemoryStore::default());
        let (factory, calls) = recording_factory(true);
        let scheduler = Scheduler::with_probe_factory(store.clone(), factory);

        let origin = Instant::now();
        scheduler
            .register(Target::new("http://a.test", 5))
            .await
            .unwrap();

        advance_to(origin, 4.9).await;
        assert!(calls.lock().unwrap().is_empty());

        advance_to(origin, 15.5).await;
        assert_eq!(ticks_for(&calls, "http://a.test", origin), vec![5, 10, 15]);
        assert_eq!(store.written().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_target_keeps_ticking() {
        let store = Arc::new(MemoryStore::default());
        let (factory, calls) = recording_factory(false);
        let scheduler = Scheduler::with_probe_factory(store.clone(), factory);

        let origin = Instant::now();
        scheduler
            .register(Target::new("http://down.test", 2))
            .await
            .unwrap();

        advance_to(origin, 10.5).await;
        assert_eq!(calls.lock().unwrap().len(), 5);
        let written = store.written();
        assert_eq!(written.len(), 5);
        assert!(written.iter().all(|s| s.status() == 0 && s.response.is_none()));
        assert_eq!(scheduler.running().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failures_do_not_stop_loop() {
        let store = Arc::new(MemoryStore {
            fail_writes: true,
            ..Default::default()
        });
        let (factory, calls) = recording_factory(true);
        let scheduler = Scheduler::with_probe_factory(store, factory);

        let origin = Instant::now();
        scheduler
            .register(Target::new("http://a.test", 1))
            .await
            .unwrap();

        advance_to(origin, 3.5).await;
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registering_does_not_disturb_existing_loops() {
        let store = Arc::new(MemoryStore::default());
        let (factory, calls) = recording_factory(true);
        let scheduler = Scheduler::with_probe_factory(store, factory);

        let origin = Instant::now();
        scheduler
            .register(Target::new("http://a.test", 3))
            .await
            .unwrap();

        advance_to(origin, 1.0).await;
        scheduler
            .register(Target::new("http://b.test", 2))
            .await
            .unwrap();

        advance_to(origin, 9.5).await;
        assert_eq!(ticks_for(&calls, "http://a.test", origin), vec![3, 6, 9]);
        assert_eq!(ticks_for(&calls, "http://b.test", origin), vec![3, 5, 7, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_targets_get_independent_loops() {
        let store = Arc::new(MemoryStore::default());
        let (factory, calls) = recording_factory(true);
        let scheduler = Scheduler::with_probe_factory(store, factory);

        let origin = Instant::now();
        let first = scheduler
            .register(Target::new("http://a.test", 4))
            .await
            .unwrap();
        let second = scheduler
            .register(Target::new("http://a.test", 4))
            .await
            .unwrap();
        assert_ne!(first, second);

        advance_to(origin, 4.5).await;
        assert_eq!(ticks_for(&calls, "http://a.test", origin), vec![4, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_all_skips_unschedulable_targets() {
        let store = Arc::new(MemoryStore::default());
        let (factory, _calls) = recording_factory(true);
        let scheduler = Scheduler::with_probe_factory(store, factory);

        let started = scheduler
            .register_all(vec![
                Target::new("http://a.test", 30),
                Target::new("http://zero.test", 0),
                Target::new("http://b.test", 60),
            ])
            .await;

        assert_eq!(started, 2);
        let urls: Vec<_> = scheduler
            .running()
            .await
            .into_iter()
            .map(|(_, t)| t.url)
            .collect();
        assert_eq!(urls, vec!["http://a.test", "http://b.test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_shutdown() {
        let store = Arc::new(MemoryStore::default());
        let (factory, calls) = recording_factory(true);
        let scheduler = Scheduler::with_probe_factory(store, factory);

        let origin = Instant::now();
        let a = scheduler
            .register(Target::new("http://a.test", 2))
            .await
            .unwrap();
        scheduler
            .register(Target::new("http://b.test", 2))
            .await
            .unwrap();

        advance_to(origin, 2.5).await;
        assert!(scheduler.stop(a).await);
        assert!(!scheduler.stop(a).await);

        advance_to(origin, 4.5).await;
        assert_eq!(ticks_for(&calls, "http://a.test", origin), vec![2]);
        assert_eq!(ticks_for(&calls, "http://b.test", origin), vec![2, 4]);

        scheduler.shutdown().await;
        advance_to(origin, 10.5).await;
        assert_eq!(ticks_for(&calls, "http://b.test", origin), vec![2, 4]);
        assert!(scheduler.running().await.is_empty());
    }
}
