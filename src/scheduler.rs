//! Monitor scheduler
//!
//! Owns one recurring task per registered creditor. Every cycle runs in its
//! own spawned task so an error or panic in one creditor's cycle is caught,
//! logged, and counted without touching any other creditor's timer.
//!
//! Cancellation (`unregister`, `shutdown`) only stops future ticks. A cycle
//! already in flight always runs to completion.

use crate::error::{MonitorError, Result};
use crate::monitor::{CycleReport, MonitorPipeline};
use crate::types::Creditor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Scheduler events for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Creditor registered and scheduled
    Registered { creditor_id: String },
    /// Creditor unregistered; no further ticks
    Unregistered { creditor_id: String },
    /// Cycle started
    CycleStarted { creditor_id: String },
    /// Cycle completed
    CycleCompleted {
        creditor_id: String,
        snapshot_id: String,
        changed: bool,
    },
    /// Cycle produced a change
    ChangeDetected {
        creditor_id: String,
        change_id: String,
        violations: usize,
    },
    /// Cycle failed (error or panic)
    CycleFailed { creditor_id: String, error: String },
}

/// Aggregate counters across all creditors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub changes_detected: u64,
    pub escalations_run: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

struct MonitorHandle {
    creditor: Creditor,
    cancel: CancellationToken,
    /// Serializes scheduled ticks and manual runs
    cycle_lock: Arc<Mutex<()>>,
    task: Option<JoinHandle<()>>,
}

/// State shared between the scheduler and its creditor tasks
struct CycleRunner {
    pipeline: Arc<MonitorPipeline>,
    stats: RwLock<SchedulerStats>,
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl CycleRunner {
    async fn run_cycle(&self, creditor: &Creditor, cycle_lock: &Mutex<()>) -> Result<CycleReport> {
        let _guard = cycle_lock.lock().await;

        let _ = self.event_tx.send(SchedulerEvent::CycleStarted {
            creditor_id: creditor.id.clone(),
        });

        let pipeline = self.pipeline.clone();
        let target = creditor.clone();
        let result = match tokio::spawn(async move { pipeline.run_cycle(&target).await }).await {
            Ok(result) => result,
            Err(e) => Err(MonitorError::CycleAborted {
                creditor: creditor.id.clone(),
                reason: if e.is_panic() {
                    "cycle panicked".to_string()
                } else {
                    e.to_string()
                },
            }),
        };

        let mut stats = self.stats.write().await;
        stats.last_cycle_at = Some(Utc::now());
        match &result {
            Ok(report) => {
                stats.cycles_completed += 1;
                if let Some(change) = &report.change {
                    stats.changes_detected += 1;
                    let _ = self.event_tx.send(SchedulerEvent::ChangeDetected {
                        creditor_id: creditor.id.clone(),
                        change_id: change.id.clone(),
                        violations: change.violations.len(),
                    });
                }
                if !report.escalations.is_empty() {
                    stats.escalations_run += 1;
                }
                let _ = self.event_tx.send(SchedulerEvent::CycleCompleted {
                    creditor_id: creditor.id.clone(),
                    snapshot_id: report.snapshot_id.clone(),
                    changed: report.changed(),
                });
            }
            Err(e) => {
                stats.cycles_failed += 1;
                tracing::warn!(creditor = %creditor.id, error = %e, "Monitoring cycle failed");
                let _ = self.event_tx.send(SchedulerEvent::CycleFailed {
                    creditor_id: creditor.id.clone(),
                    error: e.to_string(),
                });
            }
        }

        result
    }
}

/// Scheduler owning one cancellable recurring task per creditor
pub struct MonitorScheduler {
    runner: Arc<CycleRunner>,
    monitors: RwLock<HashMap<String, MonitorHandle>>,
    root: CancellationToken,
}

impl MonitorScheduler {
    pub fn new(pipeline: Arc<MonitorPipeline>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            runner: Arc::new(CycleRunner {
                pipeline,
                stats: RwLock::new(SchedulerStats::default()),
                event_tx,
            }),
            monitors: RwLock::new(HashMap::new()),
            root: CancellationToken::new(),
        }
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.runner.event_tx.subscribe()
    }

    /// Register a creditor: run a baseline cycle, then tick every
    /// `check_interval`
    ///
    /// A failed baseline is logged; the next tick retries it.
    pub async fn register(&self, creditor: Creditor) -> Result<()> {
        if creditor.check_interval_ms == 0 {
            return Err(MonitorError::Config(format!(
                "Creditor '{}' has a zero check interval",
                creditor.id
            )));
        }

        let cancel = self.root.child_token();
        let cycle_lock = Arc::new(Mutex::new(()));
        {
            let mut monitors = self.monitors.write().await;
            if monitors.contains_key(&creditor.id) {
                return Err(MonitorError::AlreadyRegistered(creditor.id));
            }
            monitors.insert(
                creditor.id.clone(),
                MonitorHandle {
                    creditor: creditor.clone(),
                    cancel: cancel.clone(),
                    cycle_lock: cycle_lock.clone(),
                    task: None,
                },
            );
        }

        tracing::info!(
            creditor = %creditor.id,
            url = %creditor.document_url,
            interval_ms = creditor.check_interval_ms,
            "Registered creditor"
        );
        let _ = self.runner.event_tx.send(SchedulerEvent::Registered {
            creditor_id: creditor.id.clone(),
        });

        if let Err(e) = self.runner.run_cycle(&creditor, &cycle_lock).await {
            tracing::warn!(
                creditor = %creditor.id,
                error = %e,
                "Baseline capture failed; next tick will retry"
            );
        }

        let mut monitors = self.monitors.write().await;
        match monitors.get_mut(&creditor.id) {
            // Unregistered while the baseline was running
            None => {}
            // Unregistered and registered again; that registration owns the slot
            Some(handle) if !Arc::ptr_eq(&handle.cycle_lock, &cycle_lock) => {}
            Some(handle) if handle.cancel.is_cancelled() => {}
            Some(handle) => {
                handle.task = Some(spawn_monitor(
                    self.runner.clone(),
                    creditor,
                    cancel,
                    cycle_lock,
                ));
            }
        }
        Ok(())
    }

    /// Stop future ticks for a creditor; stored evidence is kept
    pub async fn unregister(&self, creditor_id: &str) -> Result<()> {
        let handle = self
            .monitors
            .write()
            .await
            .remove(creditor_id)
            .ok_or_else(|| MonitorError::NotRegistered(creditor_id.to_string()))?;

        handle.cancel.cancel();

        tracing::info!(creditor = %creditor_id, "Unregistered creditor");
        let _ = self.runner.event_tx.send(SchedulerEvent::Unregistered {
            creditor_id: creditor_id.to_string(),
        });
        Ok(())
    }

    /// Run one cycle immediately, serialized with scheduled ticks
    pub async fn run_now(&self, creditor_id: &str) -> Result<CycleReport> {
        let (creditor, cycle_lock) = {
            let monitors = self.monitors.read().await;
            let handle = monitors
                .get(creditor_id)
                .ok_or_else(|| MonitorError::NotRegistered(creditor_id.to_string()))?;
            (handle.creditor.clone(), handle.cycle_lock.clone())
        };

        self.runner.run_cycle(&creditor, &cycle_lock).await
    }

    /// Registered creditors, sorted by id
    pub async fn registered(&self) -> Vec<Creditor> {
        let monitors = self.monitors.read().await;
        let mut creditors: Vec<Creditor> = monitors.values().map(|h| h.creditor.clone()).collect();
        creditors.sort_by(|a, b| a.id.cmp(&b.id));
        creditors
    }

    pub async fn is_registered(&self, creditor_id: &str) -> bool {
        self.monitors.read().await.contains_key(creditor_id)
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.runner.stats.read().await.clone()
    }

    /// Cancel every creditor task and wait for in-flight cycles to finish
    pub async fn shutdown(&self) {
        let handles: Vec<MonitorHandle> = self
            .monitors
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        self.root.cancel();
        for handle in handles {
            if let Some(task) = handle.task {
                if let Err(e) = task.await {
                    tracing::warn!(
                        creditor = %handle.creditor.id,
                        error = %e,
                        "Monitor task ended abnormally"
                    );
                }
            }
        }
        tracing::info!("Monitor scheduler stopped");
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

fn spawn_monitor(
    runner: Arc<CycleRunner>,
    creditor: Creditor,
    cancel: CancellationToken,
    cycle_lock: Arc<Mutex<()>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = creditor.check_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Errors are counted and logged by the runner
            let _ = runner.run_cycle(&creditor, &cycle_lock).await;
        }

        tracing::debug!(creditor = %creditor.id, "Monitor task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DocumentFetcher, SnapshotCapturer};
    use crate::detect::ChangeDetector;
    use crate::escalation::ResponseOrchestrator;
    use crate::evidence::{EvidenceLog, MemoryEvidenceLog};
    use crate::rules::RuleTable;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Serves different content on every fetch; panics for "panic" URLs
    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentFetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> crate::error::Result<Bytes> {
            if url.contains("panic") {
                panic!("fetcher exploded");
            }
            if url.contains("down") {
                return Err(MonitorError::fetch(url, "connection refused"));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(format!("terms revision {}", n)))
        }
    }

    fn scheduler(log: Arc<MemoryEvidenceLog>) -> MonitorScheduler {
        let capturer = SnapshotCapturer::new(Arc::new(CountingFetcher::default()));
        let detector = ChangeDetector::new(Arc::new(RuleTable::default()));
        let orchestrator = ResponseOrchestrator::new(log.clone());
        let pipeline = MonitorPipeline::new(capturer, detector, log, orchestrator);
        MonitorScheduler::new(Arc::new(pipeline))
    }

    fn creditor(id: &str, url: &str, interval_ms: u64) -> Creditor {
        Creditor::new(id, format!("{} AS", id), url).with_check_interval(interval_ms)
    }

    #[tokio::test]
    async fn test_register_runs_baseline() {
        let log = Arc::new(MemoryEvidenceLog::new());
        let scheduler = scheduler(log.clone());

        scheduler
            .register(creditor("c1", "https://c1.example/terms", 3_600_000))
            .await
            .unwrap();

        assert!(scheduler.is_registered("c1").await);
        assert_eq!(log.snapshot_count().await, 1);
        let stats = scheduler.stats().await;
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.changes_detected, 0);
        assert!(stats.last_cycle_at.is_some());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown() {
        let log = Arc::new(MemoryEvidenceLog::new());
        let scheduler = scheduler(log);
        let c = creditor("c1", "https://c1.example/terms", 3_600_000);

        scheduler.register(c.clone()).await.unwrap();
        assert!(matches!(
            scheduler.register(c).await,
            Err(MonitorError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            scheduler.unregister("nope").await,
            Err(MonitorError::NotRegistered(_))
        ));
        assert!(matches!(
            scheduler.run_now("nope").await,
            Err(MonitorError::NotRegistered(_))
        ));
        assert!(matches!(
            scheduler.register(creditor("c2", "https://c2.example", 0)).await,
            Err(MonitorError::Config(_))
        ));

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_now_detects_change() {
        let log = Arc::new(MemoryEvidenceLog::new());
        let scheduler = scheduler(log.clone());
        scheduler
            .register(creditor("c1", "https://c1.example/terms", 3_600_000))
            .await
            .unwrap();

        let report = scheduler.run_now("c1").await.unwrap();
        assert!(report.changed());
        assert!(!report.escalations.is_empty());

        let stats = scheduler.stats().await;
        assert_eq!(stats.changes_detected, 1);
        assert_eq!(stats.escalations_run, 1);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_baseline_is_not_fatal() {
        let log = Arc::new(MemoryEvidenceLog::new());
        let scheduler = scheduler(log.clone());
        let mut events = scheduler.subscribe();

        scheduler
            .register(creditor("c1", "https://down.example/terms", 3_600_000))
            .await
            .unwrap();

        assert!(scheduler.is_registered("c1").await);
        assert_eq!(log.snapshot_count().await, 0);
        assert_eq!(scheduler.stats().await.cycles_failed, 1);

        assert_eq!(
            events.recv().await.unwrap(),
            SchedulerEvent::Registered { creditor_id: "c1".to_string() }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SchedulerEvent::CycleStarted { creditor_id: "c1".to_string() }
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            SchedulerEvent::CycleFailed { .. }
        ));

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_unregister_stops_ticks_and_keeps_evidence() {
        let log = Arc::new(MemoryEvidenceLog::new());
        let scheduler = scheduler(log.clone());

        scheduler
            .register(creditor("c1", "https://c1.example/terms", 20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.unregister("c1").await.unwrap();

        // Let any in-flight cycle finish
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = log.snapshots("c1", usize::MAX).await.unwrap().len();
        assert!(stored >= 2);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(log.snapshots("c1", usize::MAX).await.unwrap().len(), stored);
        assert!(!scheduler.is_registered("c1").await);
    }

    #[tokio::test]
    async fn test_panicking_creditor_is_isolated() {
        let log = Arc::new(MemoryEvidenceLog::new());
        let scheduler = scheduler(log.clone());

        scheduler
            .register(creditor("bad", "https://panic.example/terms", 20))
            .await
            .unwrap();
        scheduler
            .register(creditor("good", "https://good.example/terms", 20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        let good = log.snapshots("good", usize::MAX).await.unwrap();
        assert!(good.len() >= 2);
        assert!(log.snapshots("bad", usize::MAX).await.unwrap().is_empty());

        let stats = scheduler.stats().await;
        assert!(stats.cycles_failed >= 2);
        assert!(scheduler.is_registered("bad").await);

        scheduler.shutdown().await;
        assert!(scheduler.registered().await.is_empty());
    }

    /// Holds the first fetch until released
    #[derive(Default)]
    struct GatedFetcher {
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DocumentFetcher for GatedFetcher {
        async fn fetch(&self, _url: &str) -> crate::error::Result<Bytes> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(Bytes::from(format!("terms revision {}", n)))
        }
    }

    #[tokio::test]
    async fn test_reregister_during_baseline_keeps_new_task() {
        let fetcher = Arc::new(GatedFetcher::default());
        let log = Arc::new(MemoryEvidenceLog::new());
        let pipeline = MonitorPipeline::new(
            SnapshotCapturer::new(fetcher.clone()),
            ChangeDetector::new(Arc::new(RuleTable::default())),
            log.clone(),
            ResponseOrchestrator::new(log.clone()),
        );
        let scheduler = Arc::new(MonitorScheduler::new(Arc::new(pipeline)));
        let c = creditor("c1", "https://c1.example/terms", 3_600_000);

        let first = {
            let scheduler = scheduler.clone();
            let c = c.clone();
            tokio::spawn(async move { scheduler.register(c).await })
        };
        fetcher.entered.notified().await;

        scheduler.unregister("c1").await.unwrap();
        scheduler.register(c).await.unwrap();

        fetcher.release.notify_one();
        first.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let monitors = scheduler.monitors.read().await;
            let handle = monitors.get("c1").unwrap();
            assert!(!handle.cancel.is_cancelled());
            assert!(!handle.task.as_ref().unwrap().is_finished());
        }

        scheduler.shutdown().await;
    }
}
