//! Test result model.
//!
//! Every scheduled spec ends up with exactly one [`TestResult`], carrying
//! its [`Verdict`], the captured editor stdout, and the per-test slice of
//! the editor log. The `Display` implementation renders the full report
//! block that is surfaced as the failure message for any non-Pass verdict.

use crate::spec::TestSpec;
use std::fmt;

/// Sentinel shown when a test produced no captured output.
pub const NO_OUTPUT: &str = "-- No output --";

/// Sentinel shown when no editor log was found for a test.
pub const NO_LOG: &str = "-- No log found --";

/// How one test concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The test reported success.
    Pass,
    /// The test ran and reported failure.
    Fail,
    /// The editor process exited with an unexpected code while this test
    /// was the presumed foreground test.
    Crash {
        ret_code: i32,
        stacktrace: Option<String>,
    },
    /// The editor was killed after exceeding its allotted time.
    Timeout { time_secs: u64 },
    /// The framework could not observe an outcome for this test.
    Unknown { extra_info: Option<String> },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// The outcome of one spec, with captured output and log excerpt.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub spec: TestSpec,
    pub verdict: Verdict,
    pub output: Option<String>,
    pub log_output: Option<String>,
}

impl TestResult {
    pub fn pass(spec: TestSpec, output: Option<String>, log_output: Option<String>) -> Self {
        Self {
            spec,
            verdict: Verdict::Pass,
            output,
            log_output,
        }
    }

    pub fn fail(spec: TestSpec, output: Option<String>, log_output: Option<String>) -> Self {
        Self {
            spec,
            verdict: Verdict::Fail,
            output,
            log_output,
        }
    }

    pub fn crash(
        spec: TestSpec,
        output: Option<String>,
        ret_code: i32,
        stacktrace: Option<String>,
        log_output: Option<String>,
    ) -> Self {
        Self {
            spec,
            verdict: Verdict::Crash {
                ret_code,
                stacktrace,
            },
            output,
            log_output,
        }
    }

    pub fn timeout(
        spec: TestSpec,
        output: Option<String>,
        time_secs: u64,
        log_output: Option<String>,
    ) -> Self {
        Self {
            spec,
            verdict: Verdict::Timeout { time_secs },
            output,
            log_output,
        }
    }

    pub fn unknown(
        spec: TestSpec,
        output: Option<String>,
        extra_info: Option<String>,
        log_output: Option<String>,
    ) -> Self {
        Self {
            spec,
            verdict: Verdict::Unknown { extra_info },
            output,
            log_output,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_pass(&self) -> bool {
        self.verdict.is_pass()
    }

    /// The captured test output, or a sentinel when none was recorded.
    pub fn get_output_str(&self) -> &str {
        match self.output.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => NO_OUTPUT,
        }
    }

    /// The per-test editor log excerpt, or a sentinel when none was found.
    pub fn get_log_str(&self) -> &str {
        match self.log_output.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => NO_LOG,
        }
    }

    fn write_output_section(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "------------")?;
        writeln!(f, "|  Output  |")?;
        writeln!(f, "------------")?;
        writeln!(f, "{}", self.get_output_str())
    }

    fn write_log_section(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "----------------------------------------------------")?;
        writeln!(f, "| Editor log |")?;
        writeln!(f, "----------------------------------------------------")?;
        writeln!(f, "{}", self.get_log_str())
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verdict {
            Verdict::Pass => {
                writeln!(f, "Test Passed")?;
                self.write_output_section(f)
            }
            Verdict::Fail => {
                writeln!(f, "Test FAILED")?;
                self.write_output_section(f)?;
                self.write_log_section(f)
            }
            Verdict::Crash {
                ret_code,
                stacktrace,
            } => {
                writeln!(f, "Test CRASHED, return code {:#x}", *ret_code as u32)?;
                writeln!(f, "---------------")?;
                writeln!(f, "|  Stacktrace |")?;
                writeln!(f, "---------------")?;
                match stacktrace.as_deref() {
                    Some(s) if !s.is_empty() => writeln!(f, "{s}")?,
                    _ => writeln!(f, "-- No stacktrace data found --")?,
                }
                self.write_output_section(f)?;
                self.write_log_section(f)
            }
            Verdict::Timeout { time_secs } => {
                writeln!(
                    f,
                    "Test ABORTED after not completing within {time_secs} seconds"
                )?;
                self.write_output_section(f)?;
                self.write_log_section(f)
            }
            Verdict::Unknown { extra_info } => {
                writeln!(
                    f,
                    "Indeterminate test result interpreted as failure, possible cause: {}",
                    extra_info.as_deref().unwrap_or("unknown")
                )?;
                self.write_output_section(f)?;
                self.write_log_section(f)
            }
        }
    }
}
