//! Session execution and result aggregation.
//!
//! A [`Session`] ties the pieces together the way the plan dictates:
//! collect each configured suite, walk the ordered plan items, drive the
//! scheduler for runner items, and resolve reporter items against the
//! shared [`SuiteData`]. Suite-wide state (the result map and an optionally
//! owned asset processor) lives exactly as long as one suite's run.
//!
//! # Execution Flow
//!
//! 1. **Collect**: build a [`SessionPlan`] per suite
//! 2. **Prepare**: ensure the asset processor, sweep leftover processes
//! 3. **Execute**: runner items spawn editors and populate results
//! 4. **Report**: reporter items read results and pass or fail
//! 5. **Aggregate**: totals per verdict roll up into a [`RunResult`]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{error, info, warn};

use crate::asset_processor::{self, AssetProcessor};
use crate::collector::{CollectOptions, ExecMode, PlanItem, SessionPlan, collect};
use crate::config::Config;
use crate::editor::EditorLauncher;
use crate::outcome::{TestResult, Verdict};
use crate::report::Reporter;
use crate::runner::EditorRunner;
use crate::scheduler::Scheduler;
use crate::spec::{HookContext, TestSuite};

/// Per-suite run context: the shared result map and the asset processor
/// handle when the suite owns one.
#[derive(Default)]
pub struct SuiteData {
    pub results: HashMap<String, TestResult>,
    pub asset_processor: Option<AssetProcessor>,
}

impl SuiteData {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Session-level failures distinct from test verdicts.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A reporter item found no entry for its spec: the editor shut down
    /// before the test could run.
    #[error(
        "no results found for {test}; the editor may have shut down before \
         this test could run, check for failures earlier in its batch"
    )]
    MissingResult { test: String },
}

/// Resolved CLI options for one session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub collect: CollectOptions,
    /// Overrides every suite's parallel editor count.
    pub editors_parallel: Option<usize>,
    /// Appended verbatim to every editor invocation.
    pub extra_cmdline_args: Vec<String>,
}

/// Aggregated results of an entire session.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    /// Number of logical tests the session reported on.
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub crashed: usize,
    pub timed_out: usize,
    pub unknown: usize,
    /// Tests whose runner never produced a result (editor died early).
    pub not_run: Vec<String>,
    /// Wall-clock duration of the whole session.
    pub duration: Duration,
    /// Individual results, in report order.
    pub results: Vec<TestResult>,
}

impl RunResult {
    /// True when every reported test passed and nothing was left unrun.
    pub fn success(&self) -> bool {
        self.failed == 0
            && self.crashed == 0
            && self.timed_out == 0
            && self.unknown == 0
            && self.not_run.is_empty()
    }

    /// Process exit code: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

/// Drives configured suites through collection, scheduling, and reporting.
pub struct Session<R> {
    config: Config,
    options: SessionOptions,
    reporter: R,
}

impl<R: Reporter> Session<R> {
    pub fn new(config: Config, options: SessionOptions, reporter: R) -> Self {
        Self {
            config,
            options,
            reporter,
        }
    }

    /// Runs every configured suite and returns the aggregated results.
    pub async fn run(&self) -> anyhow::Result<RunResult> {
        let start = Instant::now();
        let suites = self.config.build_suites();
        if suites.is_empty() {
            warn!("no suites declared in configuration");
        }

        let mut aggregate = RunResult::default();
        for suite in &suites {
            let plan = collect(suite, &self.options.collect)
                .with_context(|| format!("collecting suite '{}'", suite.name))?;
            info!(
                "suite '{}': {} tests selected",
                plan.suite_name,
                plan.selected_test_count()
            );
            self.reporter.on_collection_complete(&plan).await;
            self.run_suite(suite, &plan, &mut aggregate).await?;
        }

        aggregate.duration = start.elapsed();
        self.reporter.on_run_complete(&aggregate).await;
        Ok(aggregate)
    }

    async fn run_suite(
        &self,
        suite: &TestSuite,
        plan: &SessionPlan,
        aggregate: &mut RunResult,
    ) -> anyhow::Result<()> {
        let mut data = SuiteData::new();
        let launcher = EditorLauncher::new(&self.config.editor);
        let runner = EditorRunner::new(&suite.settings, &launcher);
        let parallel = suite
            .settings
            .resolved_parallel_editors(self.options.editors_parallel);
        let scheduler = Scheduler::new(parallel);

        let outcome = self
            .execute_items(suite, plan, &scheduler, &runner, &mut data, aggregate)
            .await;

        // Suite teardown: an owned asset processor is stopped and every
        // engine process swept; an external one is left alone.
        if let Some(mut ap) = data.asset_processor.take() {
            ap.stop().await;
            asset_processor::kill_engine_processes(&self.config.asset_processor, true).await;
        } else {
            asset_processor::kill_engine_processes(&self.config.asset_processor, false).await;
        }

        outcome
    }

    async fn execute_items(
        &self,
        suite: &TestSuite,
        plan: &SessionPlan,
        scheduler: &Scheduler,
        runner: &EditorRunner<'_>,
        data: &mut SuiteData,
        aggregate: &mut RunResult,
    ) -> anyhow::Result<()> {
        let extra = &self.options.extra_cmdline_args;

        for item in &plan.items {
            match item {
                PlanItem::RunSingle { test } => {
                    self.prepare(data).await?;
                    self.reporter.on_test_start(&test.name).await;

                    let hooks = test
                        .single_options()
                        .map(|o| o.hooks.clone())
                        .unwrap_or_default();
                    let mut ctx = HookContext {
                        suite: suite.name.clone(),
                        test: test.name.clone(),
                        values: HashMap::new(),
                    };
                    if let Some(hook) = &hooks.before {
                        hook(&mut ctx);
                    }
                    if let Some(hook) = &hooks.setup {
                        hook(&mut ctx);
                    }

                    match scheduler.run_single(runner, test, extra).await {
                        Ok(results) => data.results.extend(results),
                        Err(err) => {
                            error!("runner for single test '{}' failed: {err}", test.name);
                            data.results.insert(
                                test.name.clone(),
                                TestResult::unknown(
                                    test.clone(),
                                    None,
                                    Some(format!("editor runner failed before reporting: {err}")),
                                    None,
                                ),
                            );
                        }
                    }

                    if let Some(hook) = &hooks.teardown {
                        hook(&mut ctx);
                    }
                    if let Some(hook) = &hooks.after {
                        hook(&mut ctx);
                    }

                    self.report_one(data, &test.name, aggregate).await;
                }
                PlanItem::RunShared { runner: index } => {
                    let group = &plan.runners[*index];
                    self.prepare(data).await?;
                    info!(
                        "running {} ({} tests, {})",
                        group.name,
                        group.tests.len(),
                        group.mode.as_str()
                    );
                    match group.mode {
                        ExecMode::Batched => {
                            match scheduler.run_batched(runner, &group.tests, extra).await {
                                Ok(results) => data.results.extend(results),
                                // Reporter items surface the gap as
                                // missing results, one per test.
                                Err(err) => error!("batched runner failed: {err}"),
                            }
                        }
                        ExecMode::Parallel => {
                            let results = scheduler.run_parallel(runner, &group.tests, extra).await;
                            data.results.extend(results);
                        }
                        ExecMode::ParallelBatched => {
                            let results = scheduler
                                .run_parallel_batched(runner, &group.tests, extra)
                                .await;
                            data.results.extend(results);
                        }
                    }
                }
                PlanItem::Report { test, .. } => {
                    self.reporter.on_test_start(test).await;
                    self.report_one(data, test, aggregate).await;
                }
            }
        }
        Ok(())
    }

    async fn prepare(&self, data: &mut SuiteData) -> anyhow::Result<()> {
        asset_processor::prepare(&self.config.asset_processor, &mut data.asset_processor)
            .await
            .context("asset processor setup failed")?;
        Ok(())
    }

    async fn report_one(&self, data: &SuiteData, test: &str, aggregate: &mut RunResult) {
        aggregate.total_tests += 1;
        match data.results.get(test) {
            None => {
                let err = SessionError::MissingResult {
                    test: test.to_string(),
                };
                error!("{err}");
                aggregate.not_run.push(test.to_string());
                self.reporter.on_test_missing(test).await;
            }
            Some(result) => {
                match &result.verdict {
                    Verdict::Pass => aggregate.passed += 1,
                    Verdict::Fail => aggregate.failed += 1,
                    Verdict::Crash { .. } => aggregate.crashed += 1,
                    Verdict::Timeout { .. } => aggregate.timed_out += 1,
                    Verdict::Unknown { .. } => aggregate.unknown += 1,
                }
                self.reporter.on_test_complete(result).await;
                aggregate.results.push(result.clone());
            }
        }
    }
}
