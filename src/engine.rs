//! Job Orchestrator
//!
//! Runs the analysis pipeline for submitted sequences on a fixed pool of
//! worker threads and keeps the status of every job until it is evicted.
//!
//! # Pipeline
//! ```text
//! payload -> validate (25) -> align (50) -> call mutations (75)
//!         -> match lineage + evaluate rules (90) -> Succeeded (100)
//! ```
//!
//! Every job reads one [`ReferenceModel`] snapshot, captured when the job
//! starts. [`Engine::reload`] swaps the snapshot for jobs started afterwards;
//! running jobs keep theirs. Cancellation is checked at every stage boundary.
//!
//! # Examples
//! ```no_run
//! use covar::config::EngineConfig;
//! use covar::engine::Engine;
//! use covar::reference::ReferenceModel;
//! use std::time::Duration;
//!
//! let config = EngineConfig::default();
//! let model = ReferenceModel::from_json_file("data/catalog.json", None, config.matcher.kmer_size)?;
//! let engine = Engine::new(model, config)?;
//! let job = engine.submit_analysis(std::fs::read("sample.fasta")?);
//! let status = engine.wait(job, Duration::from_secs(60));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::aligner;
use crate::caller;
use crate::config::EngineConfig;
use crate::error::{AnalysisError, ConfigError, Result};
use crate::job::{JobId, JobSlot, JobStatus};
use crate::kmer_index::{self, LineageMatch};
use crate::mutation::DetectedMutation;
use crate::reference::ReferenceModel;
use crate::rules::{self, SatisfiedRule};
use crate::validate::{self, SequenceSummary};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// Result Types
// ============================================================================

/// Outcome of a successful analysis.
///
/// Holds no timestamps or other run-dependent values, so the same input and
/// snapshot always serialize to the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub query: SequenceSummary,
    /// `None` when no catalog lineage reaches the similarity threshold.
    pub identified_lineage: Option<LineageMatch>,
    pub confidence: f64,
    pub detected_mutations: Vec<DetectedMutation>,
    pub satisfied_rules: Vec<SatisfiedRule>,
    pub aligned_coverage: f64,
    pub top_matches: Vec<LineageMatch>,
    pub summary: ResultSummary,
    pub reference: ReferenceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub identified_lineage: Option<String>,
    pub who_label: Option<String>,
    pub confidence: f64,
    pub mutations_found: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceInfo {
    pub accession: String,
    pub snapshot_version: String,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Pipeline stage boundaries, with the progress reported on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validated,
    Aligned,
    MutationsCalled,
    Matched,
}

impl Stage {
    pub fn progress(self) -> u8 {
        match self {
            Stage::Validated => 25,
            Stage::Aligned => 50,
            Stage::MutationsCalled => 75,
            Stage::Matched => 90,
        }
    }
}

/// Receives stage checkpoints; returning an error aborts the pipeline.
trait Checkpoint {
    fn reached(&self, stage: Stage) -> Result<()>;
}

struct NoCheckpoint;

impl Checkpoint for NoCheckpoint {
    fn reached(&self, _stage: Stage) -> Result<()> {
        Ok(())
    }
}

impl Checkpoint for JobSlot {
    fn reached(&self, stage: Stage) -> Result<()> {
        if self.is_cancel_requested() {
            return Err(AnalysisError::Cancelled);
        }
        self.advance(stage.progress());
        Ok(())
    }
}

/// Runs the full pipeline synchronously on a single-record FASTA payload.
pub fn analyze(model: &ReferenceModel, config: &EngineConfig, payload: &[u8]) -> Result<AnalysisResult> {
    run_pipeline(model, config, payload, &NoCheckpoint)
}

fn run_pipeline(
    model: &ReferenceModel,
    config: &EngineConfig,
    payload: &[u8],
    checkpoint: &dyn Checkpoint,
) -> Result<AnalysisResult> {
    let mut records = validate::load_sequences(payload, &config.validator)?;
    if records.len() != 1 {
        return Err(AnalysisError::Format(format!(
            "payload holds {} records; submit one record per job",
            records.len()
        )));
    }
    let query = records.remove(0);
    checkpoint.reached(Stage::Validated)?;

    let alignment = aligner::align(&model.reference().seq, &query.seq, &config.aligner)?;
    debug!(
        "{}: {}/{} seeds anchored, coverage {:.4}",
        query.id,
        alignment.anchors.len(),
        alignment.seeds_total,
        alignment.coverage
    );
    checkpoint.reached(Stage::Aligned)?;

    let detected_mutations = caller::call_mutations(model, &alignment.map, &query.seq);
    let notations: Vec<String> = detected_mutations.iter().map(|m| m.notation.clone()).collect();
    checkpoint.reached(Stage::MutationsCalled)?;

    let matched = kmer_index::match_lineage(model, &notations, alignment.coverage, &config.matcher);
    let satisfied_rules = rules::evaluate(model.rules(), &notations);
    checkpoint.reached(Stage::Matched)?;

    let summary = ResultSummary {
        identified_lineage: matched.identified.as_ref().map(|m| m.lineage.clone()),
        who_label: matched.identified.as_ref().and_then(|m| m.who_label.clone()),
        confidence: matched.confidence,
        mutations_found: detected_mutations.len(),
    };

    Ok(AnalysisResult {
        query: query.summary(),
        identified_lineage: matched.identified,
        confidence: matched.confidence,
        detected_mutations,
        satisfied_rules,
        aligned_coverage: alignment.coverage,
        top_matches: matched.top_matches,
        summary,
        reference: ReferenceInfo {
            accession: model.reference().accession.clone(),
            snapshot_version: model.version().to_string(),
        },
    })
}

// ============================================================================
// Engine
// ============================================================================

struct Task {
    slot: Arc<JobSlot>,
    payload: Vec<u8>,
}

struct Shared {
    model: RwLock<Arc<ReferenceModel>>,
    config: EngineConfig,
}

/// Concurrent analysis service over a shared reference snapshot.
pub struct Engine {
    shared: Arc<Shared>,
    jobs: RwLock<FxHashMap<JobId, Arc<JobSlot>>>,
    next_id: AtomicU64,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Starts the worker pool.
    ///
    /// Fails if the configuration is invalid or names a k-mer size other
    /// than the one the snapshot was indexed with.
    pub fn new(model: ReferenceModel, config: EngineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        check_kmer_size(&config, &model)?;
        let n_workers = config.effective_workers();

        let shared = Arc::new(Shared {
            model: RwLock::new(Arc::new(model)),
            config,
        });

        let (sender, receiver) = unbounded::<Task>();
        let workers = (0..n_workers)
            .map(|_| {
                let rx = receiver.clone();
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(rx, shared))
            })
            .collect();

        info!("Engine started with {} workers", n_workers);

        Ok(Self {
            shared,
            jobs: RwLock::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Snapshot new jobs will start with.
    pub fn model(&self) -> Arc<ReferenceModel> {
        self.shared.model.read().clone()
    }

    /// Queues one FASTA record for analysis.
    pub fn submit_analysis(&self, payload: Vec<u8>) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(JobSlot::new(id));
        self.jobs.write().insert(id, Arc::clone(&slot));

        let sent = match self.sender.lock().as_ref() {
            Some(tx) => tx
                .send(Task {
                    slot: Arc::clone(&slot),
                    payload,
                })
                .is_ok(),
            None => false,
        };
        if !sent {
            slot.fail(&AnalysisError::Internal("engine is shut down".to_string()));
        }

        debug!("Submitted {}", id);
        id
    }

    /// Latest published status, `None` for unknown or evicted jobs.
    pub fn job_status(&self, id: JobId) -> Option<Arc<JobStatus>> {
        self.jobs.read().get(&id).map(|slot| slot.snapshot())
    }

    /// Requests cancellation. Returns false if the job is unknown or finished.
    pub fn cancel(&self, id: JobId) -> bool {
        let slot = self.jobs.read().get(&id).cloned();
        match slot {
            Some(slot) => slot.request_cancel(),
            None => false,
        }
    }

    /// Blocks until the job is terminal or `timeout` elapses, returning the
    /// last status seen.
    pub fn wait(&self, id: JobId, timeout: Duration) -> Option<Arc<JobStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.job_status(id)?;
            if status.state.is_terminal() || Instant::now() >= deadline {
                return Some(status);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Drops a finished job from the status table.
    pub fn evict(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.write();
        let finished = jobs
            .get(&id)
            .map(|slot| slot.snapshot().state.is_terminal())
            .unwrap_or(false);
        if finished {
            jobs.remove(&id);
        }
        finished
    }

    /// Replaces the reference snapshot for jobs that start from now on.
    pub fn reload(&self, model: ReferenceModel) -> std::result::Result<(), ConfigError> {
        check_kmer_size(&self.shared.config, &model)?;
        let version = model.version().to_string();
        let previous = std::mem::replace(&mut *self.shared.model.write(), Arc::new(model));
        info!("Reference snapshot {} replaced by {}", previous.version(), version);
        Ok(())
    }

    /// Stops accepting jobs, lets queued jobs finish and joins the workers.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("Worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_kmer_size(config: &EngineConfig, model: &ReferenceModel) -> std::result::Result<(), ConfigError> {
    let index = model.kmer_index().k();
    if config.matcher.kmer_size != index {
        return Err(ConfigError::KmerMismatch {
            config: config.matcher.kmer_size,
            index,
        });
    }
    Ok(())
}

fn worker_loop(rx: Receiver<Task>, shared: Arc<Shared>) {
    while let Ok(task) = rx.recv() {
        run_job(&shared, task);
    }
}

fn run_job(shared: &Shared, task: Task) {
    let Task { slot, payload } = task;
    if !slot.start() {
        debug!("{} cancelled before start", slot.snapshot().job_id);
        return;
    }

    let model = shared.model.read().clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run_pipeline(&model, &shared.config, &payload, &*slot)
    }));

    let id = slot.snapshot().job_id;
    match outcome {
        Ok(Ok(result)) => {
            info!(
                "{} succeeded: lineage {}, {} mutations, {} rules",
                id,
                result.summary.identified_lineage.as_deref().unwrap_or("none"),
                result.detected_mutations.len(),
                result.satisfied_rules.len()
            );
            slot.succeed(result);
        }
        Ok(Err(err)) => {
            info!("{} failed: {}", id, err);
            slot.fail(&err);
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("{} panicked: {}", id, detail);
            slot.fail(&AnalysisError::Internal(detail));
        }
    }
}
