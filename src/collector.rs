//! Session planning: from a suite registry to an ordered item list.
//!
//! The collector partitions a suite's specs into scheduling groups, applies
//! the CLI demotions and the name filter, and emits a [`SessionPlan`]: the
//! ordered list of items the session executes. Two explicit tables replace
//! collection-time magic:
//!
//! - the **runner table** ([`SessionPlan::runners`]): one [`RunnerGroup`]
//!   per non-empty shared group, holding its spec list and mode;
//! - the **reporter items**: one [`PlanItem::Report`] per shared spec, each
//!   carrying the index of its runner as an explicit dependency edge.
//!
//! Runner items are plumbing: the name filter selects tests, never runners.
//! A runner whose spec list is emptied by the filter is dropped, and every
//! reporter item is emitted directly after its runner, so a reporter can
//! rely on its runner having executed in the same session.

use crate::spec::{SpecKind, TestSpec, TestSuite};

/// How a shared group is driven through editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// All tests serial in one editor.
    Batched,
    /// One test per editor, many editors.
    Parallel,
    /// Many editors, each running a contiguous batch.
    ParallelBatched,
}

impl ExecMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecMode::Batched => "batched",
            ExecMode::Parallel => "parallel",
            ExecMode::ParallelBatched => "parallel_batched",
        }
    }
}

/// One shared group scheduled through a single runner invocation.
#[derive(Debug, Clone)]
pub struct RunnerGroup {
    pub name: String,
    pub mode: ExecMode,
    pub tests: Vec<TestSpec>,
}

/// One executable step of a session.
#[derive(Debug, Clone)]
pub enum PlanItem {
    /// Run one test alone and report it inline.
    RunSingle { test: TestSpec },
    /// Drive a whole runner group through editors, populating results.
    RunShared { runner: usize },
    /// Look up and report one shared test's result. Always follows the
    /// `RunShared` item of the same runner index.
    Report { runner: usize, test: String },
}

/// CLI-driven collection options.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Demote parallel groups: parallel runs become single, parallel-batched
    /// become batched.
    pub no_parallel: bool,
    /// Demote batched groups: batched runs become single, parallel-batched
    /// become parallel.
    pub no_batch: bool,
    /// Substring filter on test names; non-matching tests are deselected.
    pub filter: Option<String>,
}

impl CollectOptions {
    fn selects(&self, name: &str) -> bool {
        match &self.filter {
            Some(needle) => name.contains(needle.as_str()),
            None => true,
        }
    }
}

/// The ordered execution plan for one suite.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub suite_name: String,
    pub items: Vec<PlanItem>,
    pub runners: Vec<RunnerGroup>,
}

impl SessionPlan {
    /// Number of logical tests this plan will report on.
    pub fn selected_test_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, PlanItem::RunSingle { .. } | PlanItem::Report { .. }))
            .count()
    }

    /// Names of all selected tests, in execution order.
    pub fn selected_test_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                PlanItem::RunSingle { test } => Some(test.name.as_str()),
                PlanItem::Report { test, .. } => Some(test.as_str()),
                PlanItem::RunShared { .. } => None,
            })
            .collect()
    }
}

/// Problems in the suite registry that make a plan unbuildable.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("duplicate test name '{0}' in suite")]
    DuplicateName(String),

    #[error("test '{0}' has an empty module path")]
    MissingModule(String),
}

/// Builds the ordered session plan for a suite.
pub fn collect(suite: &TestSuite, options: &CollectOptions) -> Result<SessionPlan, CollectError> {
    let mut seen = std::collections::HashSet::new();
    for test in &suite.tests {
        if !seen.insert(test.name.as_str()) {
            return Err(CollectError::DuplicateName(test.name.clone()));
        }
        if test.module.as_os_str().is_empty() {
            return Err(CollectError::MissingModule(test.name.clone()));
        }
    }

    let mut singles: Vec<TestSpec> = Vec::new();
    let mut batched: Vec<TestSpec> = Vec::new();
    let mut parallel: Vec<TestSpec> = Vec::new();
    let mut parallel_batched: Vec<TestSpec> = Vec::new();

    for test in &suite.tests {
        match test.kind {
            SpecKind::Single(_) => singles.push(test.clone()),
            SpecKind::Shared {
                batchable: true,
                parallelizable: false,
            } => batched.push(test.clone()),
            SpecKind::Shared {
                batchable: false,
                parallelizable: true,
            } => parallel.push(test.clone()),
            SpecKind::Shared {
                batchable: true,
                parallelizable: true,
            } => parallel_batched.push(test.clone()),
            // A shared test that allows neither packing can only run alone.
            SpecKind::Shared {
                batchable: false,
                parallelizable: false,
            } => singles.push(test.clone()),
        }
    }

    if options.no_parallel {
        singles.append(&mut parallel);
        batched.append(&mut parallel_batched);
    }
    if options.no_batch {
        singles.append(&mut batched);
        parallel.append(&mut parallel_batched);
    }

    let mut items: Vec<PlanItem> = Vec::new();
    let mut runners: Vec<RunnerGroup> = Vec::new();

    for test in singles {
        if options.selects(&test.name) {
            items.push(PlanItem::RunSingle { test });
        }
    }

    let groups = [
        ("run_batched_tests", ExecMode::Batched, batched),
        ("run_parallel_tests", ExecMode::Parallel, parallel),
        (
            "run_parallel_batched_tests",
            ExecMode::ParallelBatched,
            parallel_batched,
        ),
    ];

    for (name, mode, tests) in groups {
        let selected: Vec<TestSpec> = tests
            .into_iter()
            .filter(|t| options.selects(&t.name))
            .collect();
        if selected.is_empty() {
            continue;
        }
        let runner_index = runners.len();
        items.push(PlanItem::RunShared {
            runner: runner_index,
        });
        for test in &selected {
            items.push(PlanItem::Report {
                runner: runner_index,
                test: test.name.clone(),
            });
        }
        runners.push(RunnerGroup {
            name: name.to_string(),
            mode,
            tests: selected,
        });
    }

    Ok(SessionPlan {
        suite_name: suite.name.clone(),
        items,
        runners,
    })
}
