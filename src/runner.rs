//! Editor runner: one editor invocation, one classified result per spec.
//!
//! The runner assembles the host command line, launches one editor through
//! an [`EditorLauncher`], waits with the applicable timeout, and turns the
//! raw exit into per-test verdicts:
//!
//! - exit 0: every spec passed, no scraping needed;
//! - the reserved test-failure code: the marker protocol decides Pass/Fail
//!   per test, anything unobserved stays Unknown;
//! - any other exit: a crash; the first spec without a marker is the
//!   crasher (or the last spec, when every marker arrived), later pending
//!   specs are annotated with the offender's name;
//! - timeout: the editor is killed and the same logic applies with Timeout
//!   in place of Crash.
//!
//! The runner never retries; one attempt per test.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::crash::{cycle_crash_report, read_editor_log, retrieve_crash_output, run_log_dir};
use crate::editor::{EditorError, EditorLauncher, WaitOutcome};
use crate::outcome::{TestResult, Verdict};
use crate::parser::parse_test_output;
use crate::spec::{SuiteSettings, TestSpec, join_module_paths};

/// Errors from one editor invocation.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The `--runpythontest` wire format joins modules with `;`; a path
    /// containing the separator cannot be carried and is rejected up front.
    #[error("module path '{0}' contains ';', which the host command line cannot carry")]
    SeparatorInPath(String),

    /// The parser must produce exactly one result per spec; a mismatch
    /// means duplicate spec names or a parser bug.
    #[error("marker parsing produced {got} results for {expected} specs")]
    ResultCountMismatch { got: usize, expected: usize },

    #[error(transparent)]
    Editor(#[from] EditorError),
}

/// Runs batches of specs inside single editor invocations.
pub struct EditorRunner<'a> {
    settings: &'a SuiteSettings,
    launcher: &'a EditorLauncher,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

impl<'a> EditorRunner<'a> {
    pub fn new(settings: &'a SuiteSettings, launcher: &'a EditorLauncher) -> Self {
        Self { settings, launcher }
    }

    fn validate_modules(specs: &[TestSpec]) -> Result<(), RunnerError> {
        for spec in specs {
            let module = spec.module.to_string_lossy();
            if module.contains(';') {
                return Err(RunnerError::SeparatorInPath(module.into_owned()));
            }
        }
        Ok(())
    }

    fn effective_null_renderer(&self, specs: &[TestSpec]) -> bool {
        specs
            .iter()
            .find_map(|s| s.single_options().and_then(|o| o.use_null_renderer))
            .unwrap_or(self.settings.use_null_renderer)
    }

    /// Assembles the host command line for one invocation, in the fixed
    /// order the host expects.
    pub fn build_cmdline(
        &self,
        specs: &[TestSpec],
        run_id: u32,
        extra_cmdline_args: &[String],
    ) -> Result<Vec<String>, RunnerError> {
        Self::validate_modules(specs)?;

        let mut args = self.settings.global_cmdline_args.clone();
        if self.effective_null_renderer(specs) {
            args.push("-rhi=null".to_string());
        }
        if specs.iter().any(|s| s.attach_debugger) {
            args.push("--attach-debugger".to_string());
        }
        if specs.iter().any(|s| s.wait_for_debugger) {
            args.push("--wait-for-debugger".to_string());
        }
        args.extend(self.launcher.regset_args());
        args.push("--runpythontest".to_string());
        args.push(join_module_paths(specs.iter().map(|s| s.module.as_path())));
        args.push("-logfile".to_string());
        args.push(format!("@log@/{}", self.launcher.log_name()));
        args.push("-project-log-path".to_string());
        args.push(
            run_log_dir(self.launcher.project_log_root(), run_id)
                .to_string_lossy()
                .into_owned(),
        );
        for spec in specs {
            if let Some(opts) = spec.single_options() {
                args.extend(opts.extra_cmdline_args.iter().cloned());
            }
        }
        args.extend(extra_cmdline_args.iter().cloned());
        Ok(args)
    }

    /// Runs one spec alone in one editor and returns its classified result.
    pub async fn exec_single_test(
        &self,
        run_id: u32,
        spec: &TestSpec,
        extra_cmdline_args: &[String],
    ) -> Result<HashMap<String, TestResult>, RunnerError> {
        let specs = std::slice::from_ref(spec);
        let args = self.build_cmdline(specs, run_id, extra_cmdline_args)?;
        let root = self.launcher.project_log_root().to_path_buf();
        let log_name = self.launcher.log_name().to_string();

        cycle_crash_report(&root, run_id);
        let mut editor = self.launcher.for_run(run_id);
        editor.start(&args)?;

        info!("running test {} (run {run_id})", spec.name);
        let outcome = editor.wait(spec.timeout).await?;
        let (output, log_content, direct) = match outcome {
            WaitOutcome::Exited(code) => {
                let output = editor.take_output().await;
                let log = read_editor_log(&root, run_id, &log_name);
                debug!("editor for {} exited with code {code:#x}", spec.name);
                let direct = if code == 0 {
                    TestResult::pass(spec.clone(), Some(output.clone()), Some(log.clone()))
                } else if code == self.settings.test_fail_ret_code {
                    TestResult::fail(spec.clone(), Some(output.clone()), Some(log.clone()))
                } else {
                    let stacktrace =
                        retrieve_crash_output(&root, run_id, self.settings.crash_dump_timeout)
                            .await;
                    cycle_crash_report(&root, run_id);
                    TestResult::crash(
                        spec.clone(),
                        Some(output.clone()),
                        code,
                        non_empty(stacktrace),
                        Some(log.clone()),
                    )
                };
                (output, log, direct)
            }
            WaitOutcome::TimedOut => {
                editor.stop().await;
                let output = editor.take_output().await;
                let log = read_editor_log(&root, run_id, &log_name);
                let direct = TestResult::timeout(
                    spec.clone(),
                    Some(output.clone()),
                    spec.timeout.as_secs(),
                    Some(log.clone()),
                );
                (output, log, direct)
            }
        };

        let mut results = parse_test_output(specs, &output, &log_content);
        results.insert(spec.name.clone(), direct);
        cycle_crash_report(&root, run_id);
        Ok(results)
    }

    /// Runs a batch of specs serially inside one editor and classifies
    /// every spec, including the ones the editor never reached.
    pub async fn exec_multitest(
        &self,
        run_id: u32,
        specs: &[TestSpec],
        extra_cmdline_args: &[String],
    ) -> Result<HashMap<String, TestResult>, RunnerError> {
        if specs.is_empty() {
            return Ok(HashMap::new());
        }

        let args = self.build_cmdline(specs, run_id, extra_cmdline_args)?;
        let root = self.launcher.project_log_root().to_path_buf();
        let log_name = self.launcher.log_name().to_string();

        cycle_crash_report(&root, run_id);
        let mut editor = self.launcher.for_run(run_id);
        editor.start(&args)?;

        info!("running {} batched tests (run {run_id})", specs.len());
        let timeout = self.settings.shared_test_timeout;
        let results = match editor.wait(timeout).await? {
            WaitOutcome::Exited(code) => {
                let output = editor.take_output().await;
                let log = read_editor_log(&root, run_id, &log_name);
                debug!("batched editor (run {run_id}) exited with code {code:#x}");
                if code == 0 {
                    // Everything passed; no need to scrape the output.
                    specs
                        .iter()
                        .map(|spec| {
                            (
                                spec.name.clone(),
                                TestResult::pass(
                                    spec.clone(),
                                    Some(output.clone()),
                                    Some(log.clone()),
                                ),
                            )
                        })
                        .collect()
                } else {
                    let mut results = parse_test_output(specs, &output, &log);
                    if results.len() != specs.len() {
                        return Err(RunnerError::ResultCountMismatch {
                            got: results.len(),
                            expected: specs.len(),
                        });
                    }
                    if code != self.settings.test_fail_ret_code {
                        self.mark_crashed(specs, &mut results, code, run_id, &output)
                            .await;
                    }
                    results
                }
            }
            WaitOutcome::TimedOut => {
                editor.stop().await;
                let output = editor.take_output().await;
                let log = read_editor_log(&root, run_id, &log_name);
                let mut results = parse_test_output(specs, &output, &log);
                if results.len() != specs.len() {
                    return Err(RunnerError::ResultCountMismatch {
                        got: results.len(),
                        expected: specs.len(),
                    });
                }
                Self::mark_timed_out(specs, &mut results, timeout.as_secs());
                results
            }
        };

        cycle_crash_report(&root, run_id);
        Ok(results)
    }

    /// Re-classifies results after a crash exit: the first spec without a
    /// marker becomes the crasher, later pending specs are annotated, and
    /// when every marker arrived the last spec takes the blame.
    async fn mark_crashed(
        &self,
        specs: &[TestSpec],
        results: &mut HashMap<String, TestResult>,
        ret_code: i32,
        run_id: u32,
        output: &str,
    ) {
        let root = self.launcher.project_log_root().to_path_buf();
        let pending: Vec<&TestSpec> = specs
            .iter()
            .filter(|s| {
                matches!(
                    results.get(&s.name).map(|r| &r.verdict),
                    Some(Verdict::Unknown { .. })
                )
            })
            .collect();

        let crasher = match pending.split_first() {
            Some((first, rest)) => {
                for spec in rest {
                    if let Some(entry) = results.get_mut(&spec.name) {
                        if let Verdict::Unknown { extra_info } = &mut entry.verdict {
                            *extra_info = Some(format!(
                                "This test has an unknown result, test '{}' crashed before this test could be executed",
                                first.name
                            ));
                        }
                    }
                }
                *first
            }
            // Every marker arrived; by convention the last test executed
            // is the one that took the editor down.
            None => match specs.last() {
                Some(last) => last,
                None => return,
            },
        };

        let stacktrace =
            retrieve_crash_output(&root, run_id, self.settings.crash_dump_timeout).await;
        cycle_crash_report(&root, run_id);
        if let Some(entry) = results.get_mut(&crasher.name) {
            let log_output = entry.log_output.clone();
            *entry = TestResult::crash(
                crasher.clone(),
                Some(output.to_string()),
                ret_code,
                non_empty(stacktrace),
                log_output,
            );
        }
    }

    /// Re-classifies results after a timeout, mirroring the crash logic
    /// with Timeout in place of Crash.
    fn mark_timed_out(specs: &[TestSpec], results: &mut HashMap<String, TestResult>, secs: u64) {
        let pending: Vec<&TestSpec> = specs
            .iter()
            .filter(|s| {
                matches!(
                    results.get(&s.name).map(|r| &r.verdict),
                    Some(Verdict::Unknown { .. })
                )
            })
            .collect();

        let culprit = match pending.split_first() {
            Some((first, rest)) => {
                for spec in rest {
                    if let Some(entry) = results.get_mut(&spec.name) {
                        if let Verdict::Unknown { extra_info } = &mut entry.verdict {
                            *extra_info = Some(format!(
                                "This test has an unknown result, test '{}' timed out before this test could be executed",
                                first.name
                            ));
                        }
                    }
                }
                *first
            }
            // All markers arrived, so the last test kept the editor open.
            None => match specs.last() {
                Some(last) => last,
                None => return,
            },
        };

        if let Some(entry) = results.get_mut(&culprit.name) {
            let output = entry.output.clone();
            let log_output = entry.log_output.clone();
            *entry = TestResult::timeout(culprit.clone(), output, secs, log_output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::parser::format_marker;
    use std::time::Duration;

    fn launcher() -> EditorLauncher {
        EditorLauncher::new(&EditorConfig {
            executable: "/opt/engine/bin/Editor".to_string(),
            project_log_root: "/logs".to_string(),
            log_name: "editor_test.log".to_string(),
            regset: vec!["/Automation/EnableScripts=true".to_string()],
        })
    }

    fn settings() -> SuiteSettings {
        let mut settings = SuiteSettings::default();
        settings.crash_dump_timeout = Duration::from_millis(1);
        settings
    }

    fn specs(names: &[&str]) -> Vec<TestSpec> {
        names
            .iter()
            .map(|n| TestSpec::shared(n.to_uppercase(), format!("tests/{n}.py")))
            .collect()
    }

    #[test]
    fn cmdline_assembly_order() {
        let settings = settings();
        let launcher = launcher();
        let runner = EditorRunner::new(&settings, &launcher);
        let specs = specs(&["a", "b"]);

        let args = runner
            .build_cmdline(&specs, 2, &["--extra-flag".to_string()])
            .unwrap();

        let joined = args.join(" ");
        assert!(joined.starts_with("-BatchMode -autotest_mode -rhi=null"));
        let runpython = args
            .iter()
            .position(|a| a == "--runpythontest")
            .expect("missing --runpythontest");
        assert_eq!(args[runpython + 1], "tests/a.py;tests/b.py");
        assert!(args.contains(&"-logfile".to_string()));
        assert!(args.contains(&"@log@/editor_test.log".to_string()));
        assert!(args.contains(&"-project-log-path".to_string()));
        assert!(args.contains(&"/logs/2".to_string()));
        assert_eq!(args.last().unwrap(), "--extra-flag");
        // Registry overrides come before the test list.
        let regset = args
            .iter()
            .position(|a| a.starts_with("--regset="))
            .unwrap();
        assert!(regset < runpython);
    }

    #[test]
    fn cmdline_includes_debugger_flags_when_any_spec_asks() {
        let settings = settings();
        let launcher = launcher();
        let runner = EditorRunner::new(&settings, &launcher);
        let specs = vec![
            TestSpec::batched("A", "a.py"),
            TestSpec::batched("B", "b.py").with_attach_debugger(),
        ];
        let args = runner.build_cmdline(&specs, 1, &[]).unwrap();
        assert!(args.contains(&"--attach-debugger".to_string()));
        assert!(!args.contains(&"--wait-for-debugger".to_string()));
    }

    #[test]
    fn single_null_renderer_override_wins() {
        let mut suite_settings = settings();
        suite_settings.use_null_renderer = true;
        let launcher = launcher();
        let runner = EditorRunner::new(&suite_settings, &launcher);

        let spec = TestSpec::single("A", "a.py").with_null_renderer(false);
        let args = runner
            .build_cmdline(std::slice::from_ref(&spec), 1, &[])
            .unwrap();
        assert!(!args.contains(&"-rhi=null".to_string()));
    }

    #[test]
    fn module_with_separator_is_rejected() {
        let settings = settings();
        let launcher = launcher();
        let runner = EditorRunner::new(&settings, &launcher);
        let specs = vec![TestSpec::batched("A", "evil;path.py")];
        assert!(matches!(
            runner.build_cmdline(&specs, 1, &[]),
            Err(RunnerError::SeparatorInPath(_))
        ));
    }

    #[tokio::test]
    async fn mark_crashed_blames_first_pending_and_annotates_rest() {
        let suite_settings = settings();
        let launcher = launcher();
        let runner = EditorRunner::new(&suite_settings, &launcher);
        let specs = specs(&["a", "b", "c"]);

        // Marker for a only; b and c never ran.
        let output = format_marker("a", true, "okA");
        let mut results = parse_test_output(&specs, &output, "");
        runner
            .mark_crashed(&specs, &mut results, 0x8000_0003_u32 as i32, 99, &output)
            .await;

        assert!(matches!(results["A"].verdict, Verdict::Pass));
        assert!(
            matches!(results["B"].verdict, Verdict::Crash { ret_code, .. } if ret_code == 0x8000_0003_u32 as i32)
        );
        match &results["C"].verdict {
            Verdict::Unknown { extra_info } => {
                assert!(extra_info.as_deref().unwrap().contains("'B' crashed"));
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mark_crashed_blames_last_when_all_markers_present() {
        let suite_settings = settings();
        let launcher = launcher();
        let runner = EditorRunner::new(&suite_settings, &launcher);
        let specs = specs(&["a", "b"]);

        let output = format!(
            "{}\n{}",
            format_marker("a", true, "okA"),
            format_marker("b", true, "okB")
        );
        let mut results = parse_test_output(&specs, &output, "");
        runner.mark_crashed(&specs, &mut results, 3, 99, &output).await;

        assert!(matches!(results["A"].verdict, Verdict::Pass));
        assert!(matches!(results["B"].verdict, Verdict::Crash { ret_code, .. } if ret_code == 3));
    }

    #[test]
    fn mark_timed_out_blames_first_pending() {
        let specs = specs(&["a", "b", "c"]);
        let output = format_marker("a", true, "okA");
        let mut results = parse_test_output(&specs, &output, "");
        EditorRunner::mark_timed_out(&specs, &mut results, 30);

        assert!(matches!(results["A"].verdict, Verdict::Pass));
        assert!(
            matches!(results["B"].verdict, Verdict::Timeout { time_secs } if time_secs == 30)
        );
        match &results["C"].verdict {
            Verdict::Unknown { extra_info } => {
                assert!(extra_info.as_deref().unwrap().contains("timed out"));
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn mark_timed_out_blames_last_when_all_markers_present() {
        let specs = specs(&["a", "b"]);
        let output = format!(
            "{}\n{}",
            format_marker("a", true, "okA"),
            format_marker("b", true, "okB")
        );
        let mut results = parse_test_output(&specs, &output, "");
        EditorRunner::mark_timed_out(&specs, &mut results, 45);

        assert!(matches!(results["A"].verdict, Verdict::Pass));
        assert!(
            matches!(results["B"].verdict, Verdict::Timeout { time_secs } if time_secs == 45)
        );
    }
}
