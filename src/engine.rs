//! Concurrent analysis engine.
//!
//! A fixed-width pool of tokio tasks pulls file paths from a shared atomic
//! cursor. Each worker owns a [`PartialAggregate`]; the only shared state is
//! the dedup registry and the progress counters, both short critical
//! sections. Partials merge once after all workers join, so totals never
//! depend on scheduling order.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use futures::future::try_join_all;
use tokio::sync::mpsc;

use crate::aggregate::{Aggregate, PartialAggregate, ProcessingOutcome};
use crate::classifier::classify;
use crate::dedup::UuidRegistry;
use crate::error::{AnalyzeError, Result};
use crate::file_discovery::FileDiscovery;
use crate::model::TaxpayerProfile;
use crate::parser::parse_voucher;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Worker pool width
    pub concurrency: usize,
    /// Whether Ignored(ReceiverMismatch) vouchers leave data-quality references
    pub count_unclassified: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            count_unclassified: true,
        }
    }
}

/// Cooperative cancellation flag. Workers check it before claiming the next
/// file; in-flight files always finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cumulative counters delivered after every completed file.
///
/// Snapshots are built inside the counter lock, so consumers always observe
/// `accepted + invalid + duplicate == processed` and monotonic counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub total: usize,
    pub processed: usize,
    pub accepted: usize,
    pub invalid: usize,
    pub duplicate: usize,
    pub legacy_version: usize,
}

/// Progress callback type, invoked from a detached forwarder task so a slow
/// consumer never blocks a worker.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Debug, Default)]
struct ProgressCounters {
    processed: usize,
    accepted: usize,
    invalid: usize,
    duplicate: usize,
    legacy_version: usize,
}

struct ProgressTracker {
    total: usize,
    counters: Mutex<ProgressCounters>,
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressTracker {
    fn new(total: usize, tx: Option<mpsc::UnboundedSender<ProgressUpdate>>) -> Self {
        Self {
            total,
            counters: Mutex::new(ProgressCounters::default()),
            tx,
        }
    }

    /// Bump the counters for one outcome and push a consistent snapshot.
    /// The send happens inside the lock so snapshots arrive monotonically.
    fn record(&self, outcome: &ProcessingOutcome) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        counters.processed += 1;
        match outcome {
            ProcessingOutcome::Accepted { .. } => {
                counters.accepted += 1;
                if outcome.legacy_warning() {
                    counters.legacy_version += 1;
                }
            }
            ProcessingOutcome::Duplicate { .. } => counters.duplicate += 1,
            ProcessingOutcome::Invalid { .. } => counters.invalid += 1,
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressUpdate {
                total: self.total,
                processed: counters.processed,
                accepted: counters.accepted,
                invalid: counters.invalid,
                duplicate: counters.duplicate,
                legacy_version: counters.legacy_version,
            });
        }
    }
}

/// Batch orchestrator: discovery, worker fan-out, progress, cancellation,
/// and the final merge.
pub struct AnalysisEngine {
    config: EngineConfig,
}

impl AnalysisEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a batch without progress reporting or cancellation.
    pub async fn run(
        &self,
        paths: &[PathBuf],
        profile: &TaxpayerProfile,
        discovery: &FileDiscovery,
    ) -> Result<Aggregate> {
        self.run_with_progress(paths, profile, discovery, None, None)
            .await
    }

    /// Run a batch: discover, dispatch to the worker pool, merge partials,
    /// finalize. Per-file failures never abort the run; the only fatal paths
    /// are an unreadable root and an empty discovery set, both raised before
    /// any work is dispatched.
    pub async fn run_with_progress(
        &self,
        paths: &[PathBuf],
        profile: &TaxpayerProfile,
        discovery: &FileDiscovery,
        progress: Option<ProgressCallback>,
        cancel: Option<CancelToken>,
    ) -> Result<Aggregate> {
        let started = Instant::now();

        let files = discovery.discover_all(paths).await?;
        if files.is_empty() {
            return Err(AnalyzeError::NoInputFiles);
        }
        let total_files = files.len();

        // Detached forwarder decouples callback latency from the workers
        let (tx, forwarder) = match progress {
            Some(callback) => {
                let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
                let handle = tokio::spawn(async move {
                    while let Some(update) = rx.recv().await {
                        callback(update);
                    }
                });
                (Some(tx), Some(handle))
            }
            None => (None, None),
        };

        let files = Arc::new(files);
        let cursor = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(UuidRegistry::new());
        let tracker = Arc::new(ProgressTracker::new(total_files, tx));
        let cancel = cancel.unwrap_or_default();

        let width = self.config.concurrency.max(1).min(total_files);
        let workers: Vec<_> = (0..width)
            .map(|_| {
                let files = Arc::clone(&files);
                let cursor = Arc::clone(&cursor);
                let registry = Arc::clone(&registry);
                let tracker = Arc::clone(&tracker);
                let cancel = cancel.clone();
                let profile = profile.clone();
                let count_unclassified = self.config.count_unclassified;

                tokio::spawn(async move {
                    let mut partial =
                        PartialAggregate::with_unclassified_tracking(count_unclassified);
                    loop {
                        // Cooperative: no new file is claimed once cancelled
                        if cancel.is_cancelled() {
                            break;
                        }
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        if index >= files.len() {
                            break;
                        }
                        let outcome = process_file(&files[index], &profile, &registry).await;
                        tracker.record(&outcome);
                        partial.record(outcome);
                    }
                    partial
                })
            })
            .collect();

        let partials = try_join_all(workers)
            .await
            .map_err(|e| AnalyzeError::Concurrency {
                details: format!("worker join error: {}", e),
            })?;

        // Flush remaining progress updates before returning
        drop(tracker);
        if let Some(handle) = forwarder {
            let _ = handle.await;
        }

        let merged = partials
            .into_iter()
            .fold(None::<PartialAggregate>, |acc, partial| match acc {
                Some(acc) => Some(acc.merge(partial)),
                None => Some(partial),
            })
            .unwrap_or_default();

        Ok(merged.finalize(total_files, cancel.is_cancelled(), started.elapsed()))
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// The per-file pipeline: read, parse, admit, classify. Read and parse
/// failures become `Invalid` outcomes local to this file.
async fn process_file(
    path: &PathBuf,
    profile: &TaxpayerProfile,
    registry: &UuidRegistry,
) -> ProcessingOutcome {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ProcessingOutcome::Invalid {
                path: path.clone(),
                detail: e.to_string(),
            };
        }
    };

    let voucher = match parse_voucher(&bytes) {
        Ok(voucher) => voucher,
        Err(e) => {
            return ProcessingOutcome::Invalid {
                path: path.clone(),
                detail: e.to_string(),
            };
        }
    };

    if !registry.admit(&voucher.uuid) {
        return ProcessingOutcome::Duplicate {
            uuid: voucher.uuid,
        };
    }

    let bucket = classify(&voucher, profile);
    ProcessingOutcome::Accepted { voucher, bucket }
}
