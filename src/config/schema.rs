//! Configuration schema definitions for volley.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── HarnessConfig         - Core settings (parallelism, timeouts, exit codes)
//! ├── EditorConfig          - Host editor executable, log layout, regset flags
//! ├── AssetProcessorConfig  - Managed asset processor and process sweeps
//! ├── ReportConfig          - Output and reporting settings
//! └── [[suites]]            - Declarative suites with [[suites.tests]] entries
//! ```
//!
//! # Example
//!
//! ```
//! use volley::config::load_config_str;
//!
//! let config = load_config_str(r#"
//!     [harness]
//!     parallel_editors = 4
//!
//!     [editor]
//!     executable = "/opt/engine/bin/Editor"
//!     project_log_root = "/opt/project/user/log"
//!
//!     [[suites]]
//!     name = "smoke"
//!
//!     [[suites.tests]]
//!     name = "MeshLoad"
//!     module = "tests/mesh_load.py"
//! "#).unwrap();
//!
//! assert_eq!(config.harness.parallel_editors, 4);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::spec::{SingleOptions, SpecKind, SuiteSettings, TestSpec, TestSuite};

/// Root configuration structure, one TOML file per project.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Core harness settings (parallelism, timeouts, exit-code contract).
    pub harness: HarnessConfig,

    /// Host editor executable and log layout.
    pub editor: EditorConfig,

    /// Asset processor management (optional, disabled by default).
    #[serde(default)]
    pub asset_processor: AssetProcessorConfig,

    /// Report output settings (optional, has defaults).
    #[serde(default)]
    pub report: ReportConfig,

    /// Declarative test suites.
    #[serde(default)]
    pub suites: Vec<SuiteConfig>,
}

impl Config {
    /// Materializes the declared suites into registry form.
    pub fn build_suites(&self) -> Vec<TestSuite> {
        self.suites
            .iter()
            .map(|s| s.to_suite(&self.harness))
            .collect()
    }

    /// Checks the configuration for problems a run would only hit later:
    /// missing executable, duplicate names, and module paths the host
    /// command line cannot carry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.editor.executable.trim().is_empty() {
            return Err(ConfigError::MissingEditorExecutable);
        }
        let mut suite_names = std::collections::HashSet::new();
        for suite in &self.suites {
            if !suite_names.insert(suite.name.as_str()) {
                return Err(ConfigError::DuplicateSuite(suite.name.clone()));
            }
            let mut test_names = std::collections::HashSet::new();
            for test in &suite.tests {
                if !test_names.insert(test.name.as_str()) {
                    return Err(ConfigError::DuplicateTest {
                        suite: suite.name.clone(),
                        test: test.name.clone(),
                    });
                }
                if test.module.trim().is_empty() {
                    return Err(ConfigError::MissingModule {
                        suite: suite.name.clone(),
                        test: test.name.clone(),
                    });
                }
                if test.module.contains(';') {
                    return Err(ConfigError::SeparatorInModule {
                        suite: suite.name.clone(),
                        module: test.module.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Problems detected by [`Config::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("editor.executable is not set")]
    MissingEditorExecutable,

    #[error("duplicate suite name '{0}'")]
    DuplicateSuite(String),

    #[error("duplicate test name '{test}' in suite '{suite}'")]
    DuplicateTest { suite: String, test: String },

    #[error("test '{test}' in suite '{suite}' has no module path")]
    MissingModule { suite: String, test: String },

    #[error("module path '{module}' in suite '{suite}' contains ';', which the host command line cannot carry")]
    SeparatorInModule { suite: String, module: String },
}

/// Core harness execution settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `parallel_editors` | 0 (auto: half the CPU count) |
/// | `shared_test_timeout_secs` | 300 |
/// | `single_test_timeout_secs` | 180 |
/// | `test_fail_ret_code` | 15 (`0x0F`) |
/// | `crash_dump_timeout_secs` | 20 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarnessConfig {
    /// Editors to run concurrently in parallel modes. 0 means auto.
    #[serde(default)]
    pub parallel_editors: usize,

    /// Maximum lifetime of one editor process across a shared batch.
    #[serde(default = "default_shared_test_timeout")]
    pub shared_test_timeout_secs: u64,

    /// Default per-test timeout when a test does not set its own.
    #[serde(default = "default_single_test_timeout")]
    pub single_test_timeout_secs: u64,

    /// Host exit code meaning "a test failed" rather than "the host crashed".
    /// TOML has no hex literals; 15 is `0x0F`.
    #[serde(default = "default_test_fail_ret_code")]
    pub test_fail_ret_code: i32,

    /// Bounded wait for a crash dump to finish flushing to disk.
    #[serde(default = "default_crash_dump_timeout")]
    pub crash_dump_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            parallel_editors: 0,
            shared_test_timeout_secs: default_shared_test_timeout(),
            single_test_timeout_secs: default_single_test_timeout(),
            test_fail_ret_code: default_test_fail_ret_code(),
            crash_dump_timeout_secs: default_crash_dump_timeout(),
        }
    }
}

fn default_shared_test_timeout() -> u64 {
    300
}

fn default_single_test_timeout() -> u64 {
    180
}

fn default_test_fail_ret_code() -> i32 {
    0x0F
}

fn default_crash_dump_timeout() -> u64 {
    20
}

/// Host editor executable and log layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditorConfig {
    /// Path to the editor binary. `~` is expanded.
    pub executable: String,

    /// Directory under which each run id gets its own log directory.
    /// `~` is expanded.
    pub project_log_root: String,

    /// Editor log file name inside the per-run log directory.
    #[serde(default = "default_log_name")]
    pub log_name: String,

    /// Feature-flag registry overrides, each emitted as one
    /// `--regset=<entry>` argument (e.g. `"/Automation/EnableScripts=true"`).
    #[serde(default)]
    pub regset: Vec<String>,
}

fn default_log_name() -> String {
    "editor_test.log".to_string()
}

impl EditorConfig {
    pub fn expanded_executable(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.executable).into_owned())
    }

    pub fn expanded_log_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.project_log_root).into_owned())
    }
}

/// Asset processor management.
///
/// When `enabled`, the suite owns an asset processor for the duration of the
/// run unless an external one is already up. The process name lists drive
/// the between-run sweeps of leftover engine processes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetProcessorConfig {
    /// Manage an asset processor for the suite.
    #[serde(default)]
    pub enabled: bool,

    /// Asset processor binary. Required when `enabled`.
    #[serde(default)]
    pub executable: Option<String>,

    /// Arguments passed to the managed asset processor.
    #[serde(default)]
    pub args: Vec<String>,

    /// Process name used to detect an externally-owned instance.
    #[serde(default = "default_ap_process_name")]
    pub process_name: String,

    /// Other engine process names swept between runs. Leave empty to
    /// disable sweeping.
    #[serde(default = "default_engine_process_names")]
    pub engine_process_names: Vec<String>,
}

impl Default for AssetProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            executable: None,
            args: Vec::new(),
            process_name: default_ap_process_name(),
            engine_process_names: default_engine_process_names(),
        }
    }
}

fn default_ap_process_name() -> String {
    "AssetProcessor".to_string()
}

fn default_engine_process_names() -> Vec<String> {
    vec!["Editor".to_string(), "AssetBuilder".to_string()]
}

/// Report output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Directory for run artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// JUnit XML output path, when set.
    #[serde(default)]
    pub junit: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            junit: None,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("test-results")
}

/// One declarative suite.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuiteConfig {
    pub name: String,

    /// Arguments prepended to every editor invocation of this suite.
    /// Defaults to the stock automation flags.
    #[serde(default)]
    pub global_cmdline_args: Option<Vec<String>>,

    /// Run editors without a renderer. Defaults to true.
    #[serde(default)]
    pub use_null_renderer: Option<bool>,

    /// Per-suite override of the shared batch timeout.
    #[serde(default)]
    pub shared_test_timeout_secs: Option<u64>,

    /// Per-suite override of the parallel editor count.
    #[serde(default)]
    pub parallel_editors: Option<usize>,

    #[serde(default)]
    pub tests: Vec<TestConfig>,
}

impl SuiteConfig {
    pub fn to_suite(&self, harness: &HarnessConfig) -> TestSuite {
        let defaults = SuiteSettings::default();
        let settings = SuiteSettings {
            global_cmdline_args: self
                .global_cmdline_args
                .clone()
                .unwrap_or(defaults.global_cmdline_args),
            use_null_renderer: self.use_null_renderer.unwrap_or(defaults.use_null_renderer),
            shared_test_timeout: Duration::from_secs(
                self.shared_test_timeout_secs
                    .unwrap_or(harness.shared_test_timeout_secs),
            ),
            parallel_editors: self.parallel_editors.unwrap_or(harness.parallel_editors),
            test_fail_ret_code: harness.test_fail_ret_code,
            crash_dump_timeout: Duration::from_secs(harness.crash_dump_timeout_secs),
        };
        let mut suite = TestSuite::new(&self.name).with_settings(settings);
        for test in &self.tests {
            suite.push(test.to_spec(harness));
        }
        suite
    }
}

/// How a declared test may be packed into editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    /// Runs alone in one editor.
    Single,
    /// May share editors, subject to `batchable`/`parallelizable`.
    Shared,
}

/// One declarative test entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestConfig {
    /// Unique (per suite) test name.
    pub name: String,

    /// Script module executed inside the editor.
    pub module: String,

    #[serde(default = "default_test_kind")]
    pub kind: TestKind,

    /// Whether this shared test may run serially batched with others.
    #[serde(default = "default_true")]
    pub batchable: bool,

    /// Whether this shared test may run in a parallel editor.
    #[serde(default = "default_true")]
    pub parallelizable: bool,

    /// Per-test timeout; falls back to `harness.single_test_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Extra editor arguments. Only honored for single tests.
    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default)]
    pub attach_debugger: bool,

    #[serde(default)]
    pub wait_for_debugger: bool,

    /// Null-renderer override. Only honored for single tests.
    #[serde(default)]
    pub use_null_renderer: Option<bool>,
}

fn default_test_kind() -> TestKind {
    TestKind::Shared
}

fn default_true() -> bool {
    true
}

impl TestConfig {
    pub fn to_spec(&self, harness: &HarnessConfig) -> TestSpec {
        let kind = match self.kind {
            TestKind::Single => SpecKind::Single(SingleOptions {
                extra_cmdline_args: self.extra_args.clone(),
                use_null_renderer: self.use_null_renderer,
                hooks: Default::default(),
            }),
            TestKind::Shared => SpecKind::Shared {
                batchable: self.batchable,
                parallelizable: self.parallelizable,
            },
        };
        TestSpec {
            name: self.name.clone(),
            module: PathBuf::from(&self.module),
            timeout: Duration::from_secs(
                self.timeout_secs
                    .unwrap_or(harness.single_test_timeout_secs),
            ),
            attach_debugger: self.attach_debugger,
            wait_for_debugger: self.wait_for_debugger,
            kind,
        }
    }
}
