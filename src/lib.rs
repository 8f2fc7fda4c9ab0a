//! volley: a parallel test orchestrator for scripted editor tests.
//!
//! This crate drives a heavyweight host application (a game-engine editor)
//! through automated Python test scripts: it launches many editor processes
//! concurrently, dispatches batches of test modules to each, scrapes a
//! marker protocol out of interleaved stdout and the shared editor log, and
//! classifies every test as Pass, Fail, Crash, Timeout, or Unknown, even
//! when the host died mid-batch.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Spec registry** ([`spec`]): declarative test descriptors and suites
//! - **Collector** ([`collector`]): grouping, demotion, filtering, and the
//!   ordered session plan with explicit runner/reporter tables
//! - **Scheduler** ([`scheduler`]): distributes specs across a bounded pool
//!   of editor processes
//! - **Runner** ([`runner`]): one editor invocation, one classified result
//!   per spec
//! - **Parser** ([`parser`]): the `JSON_START(...)JSON_END` marker protocol
//! - **Session** ([`session`]): executes the plan and aggregates results
//! - **Report** ([`report`]): console and JUnit XML reporters
//!
//! # Example
//!
//! ```no_run
//! use volley::config::load_config;
//! use volley::report::NullReporter;
//! use volley::session::{Session, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("volley.toml"))?;
//!     let session = Session::new(config, SessionOptions::default(), NullReporter);
//!     let result = session.run().await?;
//!     std::process::exit(result.exit_code());
//! }
//! ```

pub mod asset_processor;
pub mod collector;
pub mod config;
pub mod crash;
pub mod editor;
pub mod outcome;
pub mod parser;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod spec;

// Re-export commonly used types
pub use config::{Config, load_config, load_config_str};
pub use outcome::{TestResult, Verdict};
pub use report::Reporter;
pub use scheduler::Scheduler;
pub use session::{RunResult, Session, SessionOptions};
pub use spec::{TestSpec, TestSuite};
