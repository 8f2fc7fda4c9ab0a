//! Session reporting and output generation.

pub mod junit;

use async_trait::async_trait;

use crate::collector::SessionPlan;
use crate::outcome::TestResult;
use crate::session::RunResult;

pub use junit::JUnitReporter;

/// A reporter receives events during session execution.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called once per suite after its plan is built.
    async fn on_collection_complete(&self, plan: &SessionPlan);

    /// Called when a test is about to be reported on.
    async fn on_test_start(&self, test: &str);

    /// Called with a test's classified result.
    async fn on_test_complete(&self, result: &TestResult);

    /// Called when a test's runner never produced a result for it.
    async fn on_test_missing(&self, test: &str);

    /// Called when all suites have completed.
    async fn on_run_complete(&self, result: &RunResult);
}

/// A reporter that does nothing (for embedding and tests).
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_collection_complete(&self, _plan: &SessionPlan) {}
    async fn on_test_start(&self, _test: &str) {}
    async fn on_test_complete(&self, _result: &TestResult) {}
    async fn on_test_missing(&self, _test: &str) {}
    async fn on_run_complete(&self, _result: &RunResult) {}
}

/// A reporter that fans out to multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl Default for MultiReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn on_collection_complete(&self, plan: &SessionPlan) {
        for reporter in &self.reporters {
            reporter.on_collection_complete(plan).await;
        }
    }

    async fn on_test_start(&self, test: &str) {
        for reporter in &self.reporters {
            reporter.on_test_start(test).await;
        }
    }

    async fn on_test_complete(&self, result: &TestResult) {
        for reporter in &self.reporters {
            reporter.on_test_complete(result).await;
        }
    }

    async fn on_test_missing(&self, test: &str) {
        for reporter in &self.reporters {
            reporter.on_test_missing(test).await;
        }
    }

    async fn on_run_complete(&self, result: &RunResult) {
        for reporter in &self.reporters {
            reporter.on_run_complete(result).await;
        }
    }
}

/// Console reporter that shows progress in the terminal.
pub struct ConsoleReporter {
    progress: std::sync::Mutex<Option<indicatif::ProgressBar>>,
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            progress: std::sync::Mutex::new(None),
            verbose,
        }
    }

    fn verdict_tag(result: &TestResult) -> console::StyledObject<&'static str> {
        use crate::outcome::Verdict;
        match &result.verdict {
            Verdict::Pass => console::style("PASS").green(),
            Verdict::Fail => console::style("FAIL").red(),
            Verdict::Crash { .. } => console::style("CRSH").red().bold(),
            Verdict::Timeout { .. } => console::style("HANG").red().bold(),
            Verdict::Unknown { .. } => console::style("UNKN").yellow(),
        }
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_collection_complete(&self, plan: &SessionPlan) {
        let count = plan.selected_test_count();
        println!("Suite '{}': {} tests selected", plan.suite_name, count);

        let pb = indicatif::ProgressBar::new(count as u64);
        pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        *self.progress.lock().unwrap() = Some(pb);
    }

    async fn on_test_start(&self, test: &str) {
        if self.verbose {
            println!("Running: {test}");
        }
    }

    async fn on_test_complete(&self, result: &TestResult) {
        if let Some(pb) = self.progress.lock().unwrap().as_ref() {
            pb.inc(1);
            if self.verbose || !result.is_pass() {
                pb.println(format!("{} {}", Self::verdict_tag(result), result.name()));
            }
        }
    }

    async fn on_test_missing(&self, test: &str) {
        if let Some(pb) = self.progress.lock().unwrap().as_ref() {
            pb.inc(1);
            pb.println(format!("{} {test} (no result recorded)", console::style("MISS").red().bold()));
        }
    }

    async fn on_run_complete(&self, result: &RunResult) {
        if let Some(pb) = self.progress.lock().unwrap().take() {
            pb.finish_and_clear();
        }

        println!();
        println!("Test Results:");
        println!("  Total:    {}", result.total_tests);
        println!("  Passed:   {}", console::style(result.passed).green());
        println!("  Failed:   {}", console::style(result.failed).red());
        println!("  Crashed:  {}", console::style(result.crashed).red());
        println!("  Hung:     {}", console::style(result.timed_out).red());
        println!("  Unknown:  {}", console::style(result.unknown).yellow());

        if !result.not_run.is_empty() {
            println!(
                "  Not Run:  {}",
                console::style(result.not_run.len()).red().bold()
            );
        }

        println!("  Duration: {:?}", result.duration);

        if result.success() {
            println!();
            println!("{}", console::style("All tests passed!").green().bold());
            return;
        }

        println!();
        println!("{}", console::style("Some tests failed.").red().bold());
        println!();
        println!("Failed tests:");
        for r in &result.results {
            if r.is_pass() {
                continue;
            }
            println!("  - {}", r.name());
            for line in r.to_string().lines() {
                println!("    {line}");
            }
        }
        for test in &result.not_run {
            println!("  - {test}: no result recorded (editor shut down early?)");
        }
    }
}
