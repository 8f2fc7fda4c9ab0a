//! Test scheduling and distribution across editor processes.
//!
//! Four modes, one per packing combination:
//!
//! | Mode | Editors | Tests per editor |
//! |------|---------|------------------|
//! | single | 1 | 1 |
//! | batched | 1 | all, serial |
//! | parallel | up to P at once | 1 each, in rounds |
//! | parallel-batched | P at once | a contiguous slice each |
//!
//! Parallel workers each own a fresh editor instance (run id = worker
//! ordinal + 1, which partitions the crash slots) and report
//! `(worker_index, result_map)` over a channel; the main task merges in
//! ordinal order after the scoped join. There is no other inter-worker
//! synchronization. A worker that fails before producing results is
//! converted into Unknown verdicts for its share, so every scheduled spec
//! still ends up with exactly one result.

use std::collections::HashMap;

use tracing::{error, warn};

use crate::outcome::TestResult;
use crate::runner::{EditorRunner, RunnerError};
use crate::spec::TestSpec;

/// Distributes specs across parallel editors.
pub struct Scheduler {
    parallel_editors: usize,
}

impl Scheduler {
    /// Create a new scheduler with the given parallelism limit.
    pub fn new(parallel_editors: usize) -> Self {
        if parallel_editors == 0 {
            warn!("expected 1 or more parallel editors, found 0; setting to 1");
        }
        Self {
            parallel_editors: parallel_editors.max(1),
        }
    }

    pub fn parallel_editors(&self) -> usize {
        self.parallel_editors
    }

    /// Slices specs into exactly `p` contiguous batches of at most
    /// `ceil(n / p)` each. Trailing batches may be empty; concatenating the
    /// slices reproduces the input order.
    pub fn slice_batches(tests: &[TestSpec], p: usize) -> Vec<Vec<TestSpec>> {
        let p = p.max(1);
        let batch_size = tests.len().div_ceil(p).max(1);
        (0..p)
            .map(|i| {
                tests
                    .iter()
                    .skip(i * batch_size)
                    .take(batch_size)
                    .cloned()
                    .collect()
            })
            .collect()
    }

    /// Splits specs into sequential rounds of at most `p` for the parallel
    /// mode: each round runs up to `p` editors with one spec each.
    pub fn rounds(tests: &[TestSpec], p: usize) -> Vec<Vec<TestSpec>> {
        tests.chunks(p.max(1)).map(|c| c.to_vec()).collect()
    }

    /// Runs one spec in one editor.
    pub async fn run_single(
        &self,
        runner: &EditorRunner<'_>,
        spec: &TestSpec,
        extra_cmdline_args: &[String],
    ) -> Result<HashMap<String, TestResult>, RunnerError> {
        runner.exec_single_test(1, spec, extra_cmdline_args).await
    }

    /// Runs the whole list serially inside one editor.
    pub async fn run_batched(
        &self,
        runner: &EditorRunner<'_>,
        tests: &[TestSpec],
        extra_cmdline_args: &[String],
    ) -> Result<HashMap<String, TestResult>, RunnerError> {
        runner.exec_multitest(1, tests, extra_cmdline_args).await
    }

    /// Runs every spec in its own editor, at most P editors at a time.
    /// Rounds are fully joined before the next one starts.
    pub async fn run_parallel(
        &self,
        runner: &EditorRunner<'_>,
        tests: &[TestSpec],
        extra_cmdline_args: &[String],
    ) -> HashMap<String, TestResult> {
        let mut merged = HashMap::new();
        for round in Self::rounds(tests, self.parallel_editors) {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            tokio_scoped::scope(|scope| {
                for (index, spec) in round.iter().enumerate() {
                    let tx = tx.clone();
                    scope.spawn(async move {
                        let result = runner
                            .exec_single_test((index + 1) as u32, spec, extra_cmdline_args)
                            .await;
                        let _ = tx.send((index, std::slice::from_ref(spec), result));
                    });
                }
            });
            drop(tx);

            let mut slots: Vec<Option<_>> = (0..round.len()).map(|_| None).collect();
            while let Ok((index, share, result)) = rx.try_recv() {
                slots[index] = Some((share, result));
            }
            for slot in slots.into_iter().flatten() {
                Self::merge_worker(&mut merged, slot.0, slot.1);
            }
        }
        merged
    }

    /// Runs P editors at once, each owning a contiguous slice of the list.
    pub async fn run_parallel_batched(
        &self,
        runner: &EditorRunner<'_>,
        tests: &[TestSpec],
        extra_cmdline_args: &[String],
    ) -> HashMap<String, TestResult> {
        let slices = Self::slice_batches(tests, self.parallel_editors);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tokio_scoped::scope(|scope| {
            for (index, slice) in slices.iter().enumerate() {
                if slice.is_empty() {
                    continue;
                }
                let tx = tx.clone();
                scope.spawn(async move {
                    let result = runner
                        .exec_multitest((index + 1) as u32, slice, extra_cmdline_args)
                        .await;
                    let _ = tx.send((index, slice.as_slice(), result));
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<_>> = (0..slices.len()).map(|_| None).collect();
        while let Ok((index, share, result)) = rx.try_recv() {
            slots[index] = Some((share, result));
        }
        let mut merged = HashMap::new();
        for slot in slots.into_iter().flatten() {
            Self::merge_worker(&mut merged, slot.0, slot.1);
        }
        merged
    }

    /// Folds one worker's outcome into the merged map. A worker that died
    /// before producing results yields Unknown verdicts naming the failure,
    /// preserving the one-result-per-spec invariant.
    fn merge_worker(
        merged: &mut HashMap<String, TestResult>,
        share: &[TestSpec],
        result: Result<HashMap<String, TestResult>, RunnerError>,
    ) {
        match result {
            Ok(results) => merged.extend(results),
            Err(err) => {
                error!("editor runner failed: {err}");
                for spec in share {
                    merged.insert(
                        spec.name.clone(),
                        TestResult::unknown(
                            spec.clone(),
                            None,
                            Some(format!("editor runner failed before reporting: {err}")),
                            None,
                        ),
                    );
                }
            }
        }
    }
}
