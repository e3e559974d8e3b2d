//! Print Worker
//!
//! Polls the job store on a timer, prints pending jobs on every matching
//! printer and reports the outcome back to the store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::executor::PrintExecutor;
use crate::models::{PrintJob, PrinterConfig, StoreConfig};
use crate::store::{Heartbeat, JobStore, PrintLogEntry};

/// How long a job is ignored after an attempt, covering store read-after-write lag
pub const RETRY_WINDOW: Duration = Duration::from_secs(30);

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive heartbeat failures before it is logged as a warning
const HEARTBEAT_WARN_AFTER: u32 = 3;

/// Running counters, shared with whoever wants to report them
#[derive(Debug, Default)]
pub struct PrintStats {
    printed: AtomicU64,
    failed: AtomicU64,
    stuck: AtomicU64,
    cycles: AtomicU64,
    pending: AtomicU64,
    printers: AtomicU64,
    printing: AtomicBool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrintStatsSnapshot {
    pub printed: u64,
    pub failed: u64,
    /// Jobs currently waiting with no matching printer
    pub stuck: u64,
    pub cycles: u64,
    /// Pending jobs seen by the last poll
    pub pending: u64,
    /// Active printers in the loaded configuration
    pub printers: u64,
    pub printing: bool,
}

impl PrintStats {
    pub fn snapshot(&self) -> PrintStatsSnapshot {
        PrintStatsSnapshot {
            printed: self.printed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stuck: self.stuck.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            printers: self.printers.load(Ordering::Relaxed),
            printing: self.printing.load(Ordering::Relaxed),
        }
    }
}

/// What one poll cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub printed: Vec<String>,
    pub failed: Vec<String>,
    pub stuck: Vec<String>,
    /// Pending jobs skipped because they were attempted recently
    pub deferred: usize,
}

/// Print worker
///
/// One loop, so cycles never overlap. Jobs inside a cycle print
/// concurrently; each job goes to every active printer it routes to.
pub struct PrintWorker {
    store: Arc<dyn JobStore>,
    executor: Arc<PrintExecutor>,
    restaurant_id: String,
    client_id: String,
    poll_interval: Duration,
    config_refresh: Duration,
    retry_window: Duration,
    heartbeat_interval: Duration,
    stats: Arc<PrintStats>,

    config: Option<Arc<StoreConfig>>,
    config_loaded_at: Option<Instant>,
    recent: HashMap<String, Instant>,
    stuck_warned: HashSet<String>,
}

impl PrintWorker {
    pub fn new(store: Arc<dyn JobStore>, executor: Arc<PrintExecutor>, restaurant_id: &str) -> Self {
        Self {
            store,
            executor,
            restaurant_id: restaurant_id.to_string(),
            client_id: "print-agent".to_string(),
            poll_interval: Duration::from_secs(5),
            config_refresh: Duration::from_secs(60),
            retry_window: RETRY_WINDOW,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            stats: Arc::new(PrintStats::default()),
            config: None,
            config_loaded_at: None,
            recent: HashMap::new(),
            stuck_warned: HashSet::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_config_refresh(mut self, interval: Duration) -> Self {
        self.config_refresh = interval;
        self
    }

    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    /// Zero disables heartbeats
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Identifies this agent in heartbeats
    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_string();
        self
    }

    pub fn stats(&self) -> Arc<PrintStats> {
        self.stats.clone()
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            restaurant_id = %self.restaurant_id,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Print worker started"
        );

        let heartbeat = if self.restaurant_id.is_empty() || self.heartbeat_interval.is_zero() {
            None
        } else {
            Some(tokio::spawn(heartbeat_loop(
                self.store.clone(),
                self.stats.clone(),
                self.restaurant_id.clone(),
                self.client_id.clone(),
                self.heartbeat_interval,
                shutdown.child_token(),
            )))
        };

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Print worker received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        if let Some(handle) = heartbeat {
            let _ = handle.await;
        }

        let stats = self.stats.snapshot();
        info!(
            printed = stats.printed,
            failed = stats.failed,
            cycles = stats.cycles,
            "Print worker stopped"
        );
    }

    /// One poll cycle
    pub async fn poll_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        if self.restaurant_id.is_empty() {
            debug!("No restaurant configured, skipping poll");
            return report;
        }

        self.refresh_config().await;
        let Some(config) = self.config.clone() else {
            warn!("No printer configuration yet, skipping poll");
            return report;
        };

        let jobs = match self.store.list_pending(&self.restaurant_id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "Failed to fetch pending jobs");
                return report;
            }
        };
        self.stats
            .pending
            .store(jobs.len() as u64, Ordering::Relaxed);

        let now = Instant::now();
        let window = self.retry_window;
        self.recent.retain(|_, at| now.duration_since(*at) < window);

        // Resolve printers; jobs without any stay pending
        let mut planned: Vec<(PrintJob, Vec<&PrinterConfig>)> = Vec::new();
        for job in jobs {
            if self.recent.contains_key(&job.id) {
                report.deferred += 1;
                continue;
            }

            let printers: Vec<&PrinterConfig> =
                config.printers.iter().filter(|p| p.accepts(&job)).collect();
            if printers.is_empty() {
                if self.stuck_warned.insert(job.id.clone()) {
                    warn!(
                        job_id = %job.id,
                        order = %job.label(),
                        order_type = ?job.order_type,
                        "No active printer for job, leaving it pending"
                    );
                }
                report.stuck.push(job.id.clone());
                continue;
            }

            self.stuck_warned.remove(&job.id);
            self.recent.insert(job.id.clone(), now);
            planned.push((job, printers));
        }

        // Forget warnings for jobs that left the queue
        self.stuck_warned.retain(|id| report.stuck.contains(id));
        self.stats
            .stuck
            .store(report.stuck.len() as u64, Ordering::Relaxed);

        if planned.is_empty() {
            return report;
        }
        info!(count = planned.len(), "Printing pending jobs");
        self.stats.printing.store(true, Ordering::Relaxed);

        let executor = &self.executor;
        let layout = &config.layout;
        let outcomes = join_all(planned.iter().map(|(job, printers)| async move {
            let mut attempts = Vec::with_capacity(printers.len());
            for printer in printers {
                let result = executor.print_job(job, printer, layout).await;
                attempts.push((printer.display_name.as_str(), result.err().map(|e| e.to_string())));
            }
            (job, attempts)
        }))
        .await;

        let mut failures = Vec::new();
        for (job, attempts) in outcomes {
            let mut errors = Vec::new();
            for (printer_name, error) in attempts {
                if let Some(e) = &error {
                    errors.push(format!("{}: {}", printer_name, e));
                }
                let entry = PrintLogEntry::auto_print(&self.restaurant_id, job, printer_name, error);
                if let Err(e) = self.store.log_print(&entry).await {
                    debug!(job_id = %job.id, error = %e, "Could not write print log");
                }
            }

            if errors.is_empty() {
                report.printed.push(job.id.clone());
            } else {
                failures.push((job.id.clone(), errors.join("; ")));
            }
        }

        let marked = self.mark_printed(&report.printed).await;
        self.stats.printed.fetch_add(marked, Ordering::Relaxed);

        for (job_id, reason) in failures {
            error!(job_id = %job_id, reason = %reason, "Print job failed");
            if let Err(e) = self.store.mark_failed(&job_id, &reason).await {
                error!(job_id = %job_id, error = %e, "Could not mark job as failed");
            }
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            report.failed.push(job_id);
        }

        self.stats.printing.store(false, Ordering::Relaxed);
        report
    }

    /// Report printed jobs in one batch, one by one if the batch is refused
    ///
    /// Returns how many the store accepted.
    async fn mark_printed(&self, job_ids: &[String]) -> u64 {
        if job_ids.is_empty() {
            return 0;
        }

        let Err(e) = self.store.mark_printed(job_ids).await else {
            return job_ids.len() as u64;
        };
        if job_ids.len() == 1 {
            error!(error = %e, job_id = %job_ids[0], "Printed but could not mark job as printed");
            return 0;
        }

        warn!(error = %e, count = job_ids.len(), "Batch mark failed, marking jobs one by one");
        let mut marked = 0;
        for id in job_ids {
            match self.store.mark_printed(std::slice::from_ref(id)).await {
                Ok(()) => marked += 1,
                Err(e) => error!(job_id = %id, error = %e, "Printed but could not mark job as printed"),
            }
        }
        marked
    }

    async fn refresh_config(&mut self) {
        let fresh = self
            .config_loaded_at
            .is_some_and(|at| at.elapsed() < self.config_refresh);
        if fresh && self.config.is_some() {
            return;
        }

        match self.store.fetch_config(&self.restaurant_id).await {
            Ok(config) => {
                debug!(printers = config.printers.len(), "Printer configuration loaded");
                let active = config.printers.iter().filter(|p| p.is_active).count();
                self.stats.printers.store(active as u64, Ordering::Relaxed);
                self.config = Some(Arc::new(config));
                self.config_loaded_at = Some(Instant::now());
            }
            Err(e) => {
                // Keep printing with the last known configuration
                warn!(error = %e, "Failed to refresh printer configuration");
            }
        }
    }
}

/// Heartbeat built from the worker's current counters
pub fn heartbeat_from_stats(restaurant_id: &str, client_id: &str, stats: &PrintStats) -> Heartbeat {
    let snapshot = stats.snapshot();
    Heartbeat {
        restaurant_id: restaurant_id.to_string(),
        client_id: client_id.to_string(),
        client_name: "print-agent".to_string(),
        client_version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        printers_count: snapshot.printers as usize,
        is_printing: snapshot.printing,
        pending_orders: snapshot.pending as usize,
        sent_at: Utc::now(),
    }
}

async fn heartbeat_loop(
    store: Arc<dyn JobStore>,
    stats: Arc<PrintStats>,
    restaurant_id: String,
    client_id: String,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let beat = heartbeat_from_stats(&restaurant_id, &client_id, &stats);
                match store.heartbeat(&beat).await {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        if failures >= HEARTBEAT_WARN_AFTER {
                            warn!(error = %e, failures, "Heartbeat failing");
                        } else {
                            debug!(error = %e, "Heartbeat failed");
                        }
                    }
                }
            }
        }
    }
}
