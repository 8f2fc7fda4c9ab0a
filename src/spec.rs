//! Test specification descriptors and the suite registry.
//!
//! A [`TestSpec`] describes one logical test: the Python module the host
//! editor executes, its timeout, debugger flags, and how it may be packed
//! into editor processes. Specs are registered into a [`TestSuite`], which
//! the collector later partitions into scheduling groups.
//!
//! # Spec kinds
//!
//! | Kind | Editor processes | Tests per editor |
//! |------|------------------|------------------|
//! | `Single` | one | one (with hooks) |
//! | `Shared { batchable: true, parallelizable: false }` | one | many, serial |
//! | `Shared { batchable: false, parallelizable: true }` | many | one each |
//! | `Shared { batchable: true, parallelizable: true }` | many | many each |
//!
//! # Example
//!
//! ```
//! use volley::spec::{TestSpec, TestSuite};
//!
//! let suite = TestSuite::new("atom_render")
//!     .register(TestSpec::single("LightCreation", "tests/light_creation.py"))
//!     .register(TestSpec::shared("MeshLoad", "tests/mesh_load.py"))
//!     .register(TestSpec::batched("MaterialEdit", "tests/material_edit.py"));
//!
//! assert_eq!(suite.tests.len(), 3);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default per-test timeout before the containing editor process is killed.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Default maximum lifetime of one editor process across a shared batch.
pub const DEFAULT_SHARED_TEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bounded wait for a crash dump to finish flushing to disk.
pub const DEFAULT_CRASH_DUMP_TIMEOUT: Duration = Duration::from_secs(20);

/// Reserved host exit code meaning "a test reported failure, no crash".
pub const DEFAULT_TEST_FAIL_RET_CODE: i32 = 0x0F;

/// A user-supplied callback invoked around a single test run.
pub type Hook = Arc<dyn Fn(&mut HookContext) + Send + Sync>;

/// Opaque context shared by all hooks of one single-test run.
///
/// The `values` map is a scratchpad: whatever `before` stores, `after` can
/// read back. The framework never interprets it.
#[derive(Debug, Default, Clone)]
pub struct HookContext {
    pub suite: String,
    pub test: String,
    pub values: HashMap<String, String>,
}

/// Pre/post callbacks for a single test.
///
/// `before`/`after` bracket the whole run (the pair replaces a wrap-around
/// generator); `setup`/`teardown` bracket only the editor invocation.
/// Execution order: `before`, `setup`, run, `teardown`, `after`.
#[derive(Clone, Default)]
pub struct RunHooks {
    pub before: Option<Hook>,
    pub setup: Option<Hook>,
    pub teardown: Option<Hook>,
    pub after: Option<Hook>,
}

impl fmt::Debug for RunHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHooks")
            .field("before", &self.before.is_some())
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// Options that only apply to tests running alone in one editor.
#[derive(Debug, Clone, Default)]
pub struct SingleOptions {
    /// Extra command-line arguments appended for this test's editor.
    pub extra_cmdline_args: Vec<String>,
    /// Overrides the suite-wide null-renderer setting when set.
    pub use_null_renderer: Option<bool>,
    /// Callbacks around the run. Shared tests demoted to single execution
    /// do not get hooks; only true single specs carry them.
    pub hooks: RunHooks,
}

/// How a spec may be packed into editor processes.
#[derive(Debug, Clone)]
pub enum SpecKind {
    /// Runs alone in one editor, with optional hooks.
    Single(SingleOptions),
    /// May share editors with other tests.
    Shared { batchable: bool, parallelizable: bool },
}

/// One logical test: a script module plus scheduling metadata.
#[derive(Debug, Clone)]
pub struct TestSpec {
    /// Unique (per suite) user-addressable name.
    pub name: String,
    /// Script executed inside the host editor.
    pub module: PathBuf,
    /// Maximum run time before the editor process is killed.
    pub timeout: Duration,
    /// Attach a debugger to the editor process.
    pub attach_debugger: bool,
    /// Hold the editor at startup until a debugger attaches.
    pub wait_for_debugger: bool,
    pub kind: SpecKind,
}

impl TestSpec {
    fn base(name: impl Into<String>, module: impl Into<PathBuf>, kind: SpecKind) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            timeout: DEFAULT_TEST_TIMEOUT,
            attach_debugger: false,
            wait_for_debugger: false,
            kind,
        }
    }

    /// A test that runs alone in one editor process.
    pub fn single(name: impl Into<String>, module: impl Into<PathBuf>) -> Self {
        Self::base(name, module, SpecKind::Single(SingleOptions::default()))
    }

    /// A test that may be both batched and parallelized.
    pub fn shared(name: impl Into<String>, module: impl Into<PathBuf>) -> Self {
        Self::base(
            name,
            module,
            SpecKind::Shared {
                batchable: true,
                parallelizable: true,
            },
        )
    }

    /// A shared test that runs serially batched with others in one editor.
    pub fn batched(name: impl Into<String>, module: impl Into<PathBuf>) -> Self {
        Self::base(
            name,
            module,
            SpecKind::Shared {
                batchable: true,
                parallelizable: false,
            },
        )
    }

    /// A shared test that runs in its own editor, many editors at once.
    pub fn parallel(name: impl Into<String>, module: impl Into<PathBuf>) -> Self {
        Self::base(
            name,
            module,
            SpecKind::Shared {
                batchable: false,
                parallelizable: true,
            },
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_attach_debugger(mut self) -> Self {
        self.attach_debugger = true;
        self
    }

    pub fn with_wait_for_debugger(mut self) -> Self {
        self.wait_for_debugger = true;
        self
    }

    /// Sets extra editor arguments. Only meaningful for single specs.
    pub fn with_extra_cmdline_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let SpecKind::Single(opts) = &mut self.kind {
            opts.extra_cmdline_args = args.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Overrides the suite-wide null-renderer setting for this single test.
    pub fn with_null_renderer(mut self, enabled: bool) -> Self {
        if let SpecKind::Single(opts) = &mut self.kind {
            opts.use_null_renderer = Some(enabled);
        }
        self
    }

    /// Sets the run hooks. Only meaningful for single specs.
    pub fn with_hooks(mut self, hooks: RunHooks) -> Self {
        if let SpecKind::Single(opts) = &mut self.kind {
            opts.hooks = hooks;
        }
        self
    }

    /// The marker name the host reports for this spec: the module file
    /// name without its extension.
    pub fn module_stem(&self) -> String {
        self.module
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_single(&self) -> bool {
        matches!(self.kind, SpecKind::Single(_))
    }

    pub fn single_options(&self) -> Option<&SingleOptions> {
        match &self.kind {
            SpecKind::Single(opts) => Some(opts),
            SpecKind::Shared { .. } => None,
        }
    }
}

/// Suite-wide execution settings.
///
/// These mirror the attributes a suite author would override: the baseline
/// editor arguments, renderer policy, timeouts, and the host's reserved
/// exit-code contract.
#[derive(Debug, Clone)]
pub struct SuiteSettings {
    /// Arguments prepended to every editor invocation of this suite.
    pub global_cmdline_args: Vec<String>,
    /// Run editors without a renderer unless a single test overrides it.
    pub use_null_renderer: bool,
    /// Maximum lifetime of one editor across a shared batch.
    pub shared_test_timeout: Duration,
    /// Editors to run concurrently in parallel modes. 0 means auto
    /// (half the CPU count, at least one).
    pub parallel_editors: usize,
    /// Host exit code that means test-level failure rather than crash.
    pub test_fail_ret_code: i32,
    /// Bounded wait for a crash dump to appear after a crash exit.
    pub crash_dump_timeout: Duration,
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            global_cmdline_args: vec!["-BatchMode".to_string(), "-autotest_mode".to_string()],
            use_null_renderer: true,
            shared_test_timeout: DEFAULT_SHARED_TEST_TIMEOUT,
            parallel_editors: 0,
            test_fail_ret_code: DEFAULT_TEST_FAIL_RET_CODE,
            crash_dump_timeout: DEFAULT_CRASH_DUMP_TIMEOUT,
        }
    }
}

/// Number of parallel editors to use when the suite does not pin one.
///
/// Schedules on half the cores since the editor itself runs multithreaded,
/// which also compensates for hyperthreaded cores inflating the count.
pub fn default_parallel_editors() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

impl SuiteSettings {
    /// The effective parallel editor count, honoring a CLI override first,
    /// then the suite setting, then the auto default.
    pub fn resolved_parallel_editors(&self, cli_override: Option<usize>) -> usize {
        cli_override
            .filter(|n| *n > 0)
            .or(Some(self.parallel_editors).filter(|n| *n > 0))
            .unwrap_or_else(default_parallel_editors)
    }
}

/// An ordered registry of test specs plus suite-wide settings.
#[derive(Debug, Clone)]
pub struct TestSuite {
    pub name: String,
    pub settings: SuiteSettings,
    pub tests: Vec<TestSpec>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: SuiteSettings::default(),
            tests: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: SuiteSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Registers a spec. Registration order is the scheduling order within
    /// each group.
    pub fn register(mut self, spec: TestSpec) -> Self {
        self.tests.push(spec);
        self
    }

    pub fn push(&mut self, spec: TestSpec) {
        self.tests.push(spec);
    }

    /// All single specs, in registration order.
    pub fn single_tests(&self) -> Vec<&TestSpec> {
        self.tests.iter().filter(|t| t.is_single()).collect()
    }

    /// All shared specs, in registration order.
    pub fn shared_tests(&self) -> Vec<&TestSpec> {
        self.tests.iter().filter(|t| !t.is_single()).collect()
    }

    /// Shared specs whose packing flags exactly match the given pair.
    pub fn filter_shared_tests(&self, batchable: bool, parallelizable: bool) -> Vec<&TestSpec> {
        self.tests
            .iter()
            .filter(|t| match t.kind {
                SpecKind::Shared {
                    batchable: b,
                    parallelizable: p,
                } => b == batchable && p == parallelizable,
                SpecKind::Single(_) => false,
            })
            .collect()
    }
}

/// Joins module paths with the host's `;` separator, normalizing path
/// separators the way the host expects.
pub fn join_module_paths<'a>(modules: impl IntoIterator<Item = &'a Path>) -> String {
    modules
        .into_iter()
        .map(|m| m.to_string_lossy().replace('\\', "/"))
        .collect::<Vec<_>>()
        .join(";")
}
