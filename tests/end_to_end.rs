//! End-to-end scenarios against a scripted fake editor.
//!
//! The fake editor honors the real host contract: it reads the module list
//! from `--runpythontest`, prints one marker per module on stdout, mirrors
//! the markers into the per-run log file, and exits 0 / 15 (the reserved
//! failure code) / something else depending on what the modules ask for.
//! Module names drive its behavior: `*fail*` reports failure, `*quiet*`
//! prints no marker, `*hang*` sleeps until killed, `*crash*` exits with a
//! non-reserved code after its module is processed.

#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use volley::config::{
    AssetProcessorConfig, Config, EditorConfig, HarnessConfig, ReportConfig, SuiteConfig,
    TestConfig, TestKind,
};
use volley::editor::EditorLauncher;
use volley::outcome::Verdict;
use volley::report::NullReporter;
use volley::runner::EditorRunner;
use volley::scheduler::Scheduler;
use volley::session::{Session, SessionOptions};
use volley::spec::{SuiteSettings, TestSpec};

const FAKE_EDITOR: &str = r#"#!/bin/sh
mods=""
logdir=""
logname=""
prev=""
for a in "$@"; do
  case "$prev" in
    --runpythontest) mods="$a" ;;
    -project-log-path) logdir="$a" ;;
    -logfile) logname="$a" ;;
  esac
  prev="$a"
done
logname="${logname#@log@/}"
logfile=""
if [ -n "$logdir" ] && [ -n "$logname" ]; then
  mkdir -p "$logdir"
  logfile="$logdir/$logname"
  : > "$logfile"
fi

emit() {
  line="JSON_START({\"name\":\"$1\",\"success\":$2,\"output\":\"$3\"})JSON_END"
  echo "$line"
  if [ -n "$logfile" ]; then
    echo "log-for-$1" >> "$logfile"
    echo "$line" >> "$logfile"
  fi
}

exit_code=0
OLDIFS="$IFS"
IFS=';'
set -- $mods
IFS="$OLDIFS"
for m in "$@"; do
  n=$(basename "$m")
  n="${n%.py}"
  case "$n" in
    *quiet*) ;;
    *hang*) sleep 600 </dev/null >/dev/null 2>&1 ;;
    *fail*) emit "$n" false "boom-$n"; exit_code=15 ;;
    *) emit "$n" true "ok-$n" ;;
  esac
  case "$n" in
    *crash*) exit 3 ;;
  esac
done
exit $exit_code
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    script: PathBuf,
    log_root: PathBuf,
}

fn fixture() -> Fixture {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake_editor.sh");
    std::fs::write(&script, FAKE_EDITOR).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let log_root = dir.path().join("logs");
    std::fs::create_dir_all(&log_root).unwrap();
    Fixture {
        script,
        log_root,
        _dir: dir,
    }
}

fn launcher(fixture: &Fixture) -> EditorLauncher {
    EditorLauncher::new(&EditorConfig {
        executable: fixture.script.to_string_lossy().into_owned(),
        project_log_root: fixture.log_root.to_string_lossy().into_owned(),
        log_name: "editor_test.log".to_string(),
        regset: Vec::new(),
    })
}

fn settings(shared_timeout: Duration) -> SuiteSettings {
    SuiteSettings {
        shared_test_timeout: shared_timeout,
        crash_dump_timeout: Duration::from_millis(50),
        ..SuiteSettings::default()
    }
}

fn batched_specs(modules: &[(&str, &str)]) -> Vec<TestSpec> {
    modules
        .iter()
        .map(|(name, module)| TestSpec::batched(*name, format!("tests/{module}.py")))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batched_run_all_passing() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(30));
    let runner = EditorRunner::new(&settings, &launcher);
    let specs = batched_specs(&[("A", "alpha"), ("B", "beta")]);

    let results = runner.exec_multitest(1, &specs, &[]).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results["A"].verdict, Verdict::Pass);
    assert_eq!(results["B"].verdict, Verdict::Pass);
    // Clean exit: full stdout and log attached to every result.
    assert!(results["A"].output.as_deref().unwrap().contains("ok-alpha"));
    assert!(results["A"].log_output.as_deref().unwrap().contains("log-for-alpha"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batched_run_classifies_fail_and_unknown() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(30));
    let runner = EditorRunner::new(&settings, &launcher);
    let specs = batched_specs(&[("A", "alpha"), ("B", "beta_fail"), ("C", "charlie_quiet")]);

    let results = runner.exec_multitest(1, &specs, &[]).await.unwrap();

    assert_eq!(results["A"].verdict, Verdict::Pass);
    assert_eq!(results["A"].output.as_deref(), Some("ok-alpha"));
    assert_eq!(results["B"].verdict, Verdict::Fail);
    assert_eq!(results["B"].output.as_deref(), Some("boom-beta_fail"));
    // Reserved failure exit code: unobserved tests stay Unknown.
    assert!(matches!(results["C"].verdict, Verdict::Unknown { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crash_mid_batch_blames_first_silent_test() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(30));
    let runner = EditorRunner::new(&settings, &launcher);
    let specs = batched_specs(&[
        ("A", "alpha"),
        ("B", "beta_fail"),
        ("C", "charlie_quiet_crash"),
    ]);

    let results = runner.exec_multitest(1, &specs, &[]).await.unwrap();

    assert_eq!(results["A"].verdict, Verdict::Pass);
    assert_eq!(results["B"].verdict, Verdict::Fail);
    match &results["C"].verdict {
        Verdict::Crash { ret_code, .. } => assert_eq!(*ret_code, 3),
        other => panic!("expected Crash, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crash_after_all_markers_blames_last_test() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(30));
    let runner = EditorRunner::new(&settings, &launcher);
    let specs = batched_specs(&[("A", "alpha"), ("B", "omega_crash")]);

    let results = runner.exec_multitest(1, &specs, &[]).await.unwrap();

    assert_eq!(results["A"].verdict, Verdict::Pass);
    match &results["B"].verdict {
        Verdict::Crash { ret_code, .. } => assert_eq!(*ret_code, 3),
        other => panic!("expected Crash, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timeout_kills_editor_and_classifies_partial_output() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(2));
    let runner = EditorRunner::new(&settings, &launcher);
    let specs = batched_specs(&[("A", "alpha"), ("B", "bravo_hang")]);

    let results = runner.exec_multitest(1, &specs, &[]).await.unwrap();

    assert_eq!(results["A"].verdict, Verdict::Pass);
    assert_eq!(results["A"].output.as_deref(), Some("ok-alpha"));
    assert_eq!(results["B"].verdict, Verdict::Timeout { time_secs: 2 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_run_passes_with_full_output() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(30));
    let runner = EditorRunner::new(&settings, &launcher);
    let spec = TestSpec::single("Solo", "tests/solo.py");

    let results = runner.exec_single_test(1, &spec, &[]).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results["Solo"].verdict, Verdict::Pass);
    assert!(results["Solo"].output.as_deref().unwrap().contains("ok-solo"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_run_failure_code_maps_to_fail() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(30));
    let runner = EditorRunner::new(&settings, &launcher);
    let spec = TestSpec::single("Solo", "tests/solo_fail.py");

    let results = runner.exec_single_test(1, &spec, &[]).await.unwrap();
    assert_eq!(results["Solo"].verdict, Verdict::Fail);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_distribution_runs_in_rounds() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(30));
    let runner = EditorRunner::new(&settings, &launcher);
    let specs: Vec<TestSpec> = (0..6)
        .map(|i| TestSpec::parallel(format!("P{i}"), format!("tests/par{i}.py")))
        .collect();

    let scheduler = Scheduler::new(4);
    let results = scheduler.run_parallel(&runner, &specs, &[]).await;

    assert_eq!(results.len(), 6);
    for spec in &specs {
        assert_eq!(results[&spec.name].verdict, Verdict::Pass, "{}", spec.name);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_batched_distribution_covers_all_specs() {
    let fixture = fixture();
    let launcher = launcher(&fixture);
    let settings = settings(Duration::from_secs(30));
    let runner = EditorRunner::new(&settings, &launcher);
    let specs: Vec<TestSpec> = (0..4)
        .map(|i| TestSpec::shared(format!("S{i}"), format!("tests/shared{i}.py")))
        .collect();

    let scheduler = Scheduler::new(2);
    let results = scheduler.run_parallel_batched(&runner, &specs, &[]).await;

    assert_eq!(results.len(), 4);
    for spec in &specs {
        assert_eq!(results[&spec.name].verdict, Verdict::Pass, "{}", spec.name);
    }
}

fn session_config(fixture: &Fixture, tests: Vec<TestConfig>) -> Config {
    Config {
        harness: HarnessConfig::default(),
        editor: EditorConfig {
            executable: fixture.script.to_string_lossy().into_owned(),
            project_log_root: fixture.log_root.to_string_lossy().into_owned(),
            log_name: "editor_test.log".to_string(),
            regset: Vec::new(),
        },
        asset_processor: AssetProcessorConfig {
            enabled: false,
            executable: None,
            args: Vec::new(),
            process_name: "volley-test-no-ap".to_string(),
            engine_process_names: Vec::new(),
        },
        report: ReportConfig::default(),
        suites: vec![SuiteConfig {
            name: "smoke".to_string(),
            global_cmdline_args: None,
            use_null_renderer: None,
            shared_test_timeout_secs: Some(30),
            parallel_editors: Some(2),
            tests,
        }],
    }
}

fn batched_test_config(name: &str, module: &str) -> TestConfig {
    TestConfig {
        name: name.to_string(),
        module: format!("tests/{module}.py"),
        kind: TestKind::Shared,
        batchable: true,
        parallelizable: false,
        timeout_secs: None,
        extra_args: Vec::new(),
        attach_debugger: false,
        wait_for_debugger: false,
        use_null_renderer: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn selective_session_runs_only_filtered_test() {
    let fixture = fixture();
    let config = session_config(
        &fixture,
        vec![
            batched_test_config("AlphaTest", "alpha"),
            batched_test_config("BetaTest", "beta"),
            batched_test_config("GammaTest", "gamma"),
        ],
    );

    let options = SessionOptions {
        collect: volley::collector::CollectOptions {
            filter: Some("Beta".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let session = Session::new(config, options, NullReporter);
    let result = session.run().await.unwrap();

    assert_eq!(result.total_tests, 1);
    assert_eq!(result.passed, 1);
    assert!(result.success());
    assert_eq!(result.results[0].name(), "BetaTest");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_session_aggregates_mixed_verdicts() {
    let fixture = fixture();
    let config = session_config(
        &fixture,
        vec![
            batched_test_config("AlphaTest", "alpha"),
            batched_test_config("FailTest", "beta_fail"),
            batched_test_config("QuietTest", "charlie_quiet"),
        ],
    );

    let session = Session::new(config, SessionOptions::default(), NullReporter);
    let result = session.run().await.unwrap();

    assert_eq!(result.total_tests, 3);
    assert_eq!(result.passed, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.unknown, 1);
    assert!(!result.success());
    assert_eq!(result.exit_code(), 1);
}
