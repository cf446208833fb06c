//! Pairwise comparison orchestration.
//!
//! Every unordered pair of loaded images is sent to a [`VisionBackend`]
//! once. Failures are recorded against their pair and never stop the batch.
//! Work runs on a dedicated rayon pool sized by
//! [`CompareOptions::concurrency`]; the indexed `collect` keeps results in
//! pair order no matter which comparison finishes first.

mod report;

pub use report::{
    render_report, write_report, ComparisonOutcome, ComparisonReport, ComparisonResult,
    ReportFormat,
};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::client::VisionBackend;
use crate::error::{ComparisonError, FormdiffError};
use crate::pairs::{generate_pairs, ImagePair};
use crate::response::{validate_count, ItemRange};
use crate::source::{self, DocumentImage, SourceOptions};

/// Orchestrator options.
#[derive(Clone, Debug)]
pub struct CompareOptions {
    /// Maximum number of requests in flight at once.
    pub concurrency: usize,
    /// When set, answers outside this item count are recorded as failures.
    pub expect_items: Option<ItemRange>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            expect_items: None,
        }
    }
}

/// Lifecycle of one pair within a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PairState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl PairState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PairState::Succeeded | PairState::Failed)
    }

    fn can_advance_to(self, next: PairState) -> bool {
        matches!(
            (self, next),
            (PairState::Pending, PairState::InFlight)
                | (PairState::Pending, PairState::Failed)
                | (PairState::InFlight, PairState::Succeeded)
                | (PairState::InFlight, PairState::Failed)
        )
    }
}

/// Number of pairs in each state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl PairCounts {
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_flight + self.finished()
    }
}

/// Per-pair state table shared by the workers.
#[derive(Debug)]
pub struct PairTracker {
    states: Mutex<Vec<PairState>>,
}

impl PairTracker {
    pub fn new(pairs: usize) -> Self {
        Self {
            states: Mutex::new(vec![PairState::Pending; pairs]),
        }
    }

    /// Move pair `index` to `next`. Backward or skipping moves are refused.
    pub fn advance(&self, index: usize, next: PairState) -> bool {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        match states.get_mut(index) {
            Some(state) if state.can_advance_to(next) => {
                tracing::trace!(pair = index, from = ?*state, to = ?next, "pair state changed");
                *state = next;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, index: usize) -> Option<PairState> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(index)
            .copied()
    }

    pub fn counts(&self) -> PairCounts {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.iter().fold(PairCounts::default(), |mut counts, state| {
            match state {
                PairState::Pending => counts.pending += 1,
                PairState::InFlight => counts.in_flight += 1,
                PairState::Succeeded => counts.succeeded += 1,
                PairState::Failed => counts.failed += 1,
            }
            counts
        })
    }

    pub fn snapshot(&self) -> Vec<PairState> {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Cooperative cancellation shared between a batch and its caller.
///
/// Once cancelled, no further pairs are started. Pairs already in flight run
/// to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Enumerate, load and compare the images in `dir`.
///
/// Images that cannot be read stay in the batch; every pair involving one is
/// recorded as failed.
pub fn compare_directory<B>(
    dir: &Path,
    source_opts: &SourceOptions,
    backend: &B,
    opts: &CompareOptions,
    cancel: &CancelFlag,
) -> Result<ComparisonReport, FormdiffError>
where
    B: VisionBackend + ?Sized,
{
    let paths = source::enumerate_images(dir, source_opts)?;
    let images = source::load_images(&paths, source_opts);
    Ok(compare_images(&images, backend, opts, cancel))
}

/// Compare every unordered pair of `images`.
///
/// Returns one result per pair, in pair-generation order.
pub fn compare_images<B>(
    images: &[DocumentImage],
    backend: &B,
    opts: &CompareOptions,
    cancel: &CancelFlag,
) -> ComparisonReport
where
    B: VisionBackend + ?Sized,
{
    let pairs = generate_pairs(images.len());
    let tracker = PairTracker::new(pairs.len());
    let workers = opts.concurrency.clamp(1, pairs.len().max(1));

    tracing::info!(
        images = images.len(),
        pairs = pairs.len(),
        workers,
        model = backend.model(),
        "starting comparison batch"
    );

    let run = || -> Vec<Option<ComparisonOutcome>> {
        pairs
            .par_iter()
            .map(|pair| {
                if cancel.is_cancelled() {
                    return None;
                }
                tracker.advance(pair.index, PairState::InFlight);
                let outcome = run_pair(images, pair, backend, opts);
                let state = match outcome {
                    ComparisonOutcome::Succeeded { .. } => PairState::Succeeded,
                    ComparisonOutcome::Failed { .. } => PairState::Failed,
                };
                tracker.advance(pair.index, state);

                let counts = tracker.counts();
                tracing::info!(
                    finished = counts.finished(),
                    total = counts.total(),
                    in_flight = counts.in_flight,
                    failed = counts.failed,
                    "batch progress"
                );
                Some(outcome)
            })
            .collect()
    };

    let outcomes = match ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(run),
        Err(err) => {
            tracing::warn!(error = %err, "could not build worker pool, using the global pool");
            run()
        }
    };

    let results: Vec<ComparisonResult> = pairs
        .iter()
        .zip(outcomes)
        .map(|(pair, outcome)| {
            let outcome = outcome.unwrap_or_else(|| {
                tracker.advance(pair.index, PairState::Failed);
                ComparisonOutcome::Failed {
                    error: ComparisonError::Cancelled,
                }
            });
            ComparisonResult {
                pair: *pair,
                first_id: images[pair.first].id.clone(),
                second_id: images[pair.second].id.clone(),
                outcome,
            }
        })
        .collect();

    let counts = tracker.counts();
    debug_assert_eq!(counts.finished(), pairs.len());
    let cancelled = results.iter().any(|r| {
        r.outcome
            == ComparisonOutcome::Failed {
                error: ComparisonError::Cancelled,
            }
    });

    let report = ComparisonReport {
        model: backend.model().to_string(),
        cancelled,
        results,
    };

    tracing::info!(
        succeeded = counts.succeeded,
        failed = counts.failed,
        cancelled,
        "comparison batch finished"
    );
    report
}

fn run_pair<B>(
    images: &[DocumentImage],
    pair: &ImagePair,
    backend: &B,
    opts: &CompareOptions,
) -> ComparisonOutcome
where
    B: VisionBackend + ?Sized,
{
    let (first, second) = (&images[pair.first], &images[pair.second]);
    tracing::info!(pair = pair.index, "Comparing {} and {}...", first.id, second.id);

    let checked = first
        .encoded()
        .and(second.encoded())
        .and_then(|_| backend.compare(first, second))
        .and_then(|response| {
            if let Some(range) = opts.expect_items {
                validate_count(&response, range)?;
            }
            Ok(response)
        });

    match checked {
        Ok(response) => ComparisonOutcome::Succeeded { response },
        Err(error) => {
            tracing::warn!(
                pair = pair.index,
                first = %first.id,
                second = %second.id,
                %error,
                "comparison failed"
            );
            ComparisonOutcome::Failed { error }
        }
    }
}
