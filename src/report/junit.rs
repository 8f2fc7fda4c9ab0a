//! JUnit XML report generation.
//!
//! Generates JUnit-format test reports for CI systems (Jenkins, GitLab CI,
//! GitHub Actions). One `<testcase>` per reported test; non-Pass verdicts
//! become `<failure>` elements carrying the full result report, and tests
//! whose runner never produced a result become `<error>` elements.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::{info, warn};

use super::Reporter;
use crate::collector::SessionPlan;
use crate::outcome::{TestResult, Verdict};
use crate::session::RunResult;

/// Reporter that writes a JUnit XML file when the session completes.
pub struct JUnitReporter {
    output_path: PathBuf,
    testsuite_name: String,
    missing: Mutex<Vec<String>>,
}

impl JUnitReporter {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            output_path,
            testsuite_name: "volley".to_string(),
            missing: Mutex::new(Vec::new()),
        }
    }

    /// Sets the test suite name in the XML output.
    pub fn with_testsuite_name(mut self, name: impl Into<String>) -> Self {
        self.testsuite_name = name.into();
        self
    }

    fn verdict_kind(result: &TestResult) -> Option<&'static str> {
        match &result.verdict {
            Verdict::Pass => None,
            Verdict::Fail => Some("failure"),
            Verdict::Crash { .. } => Some("crash"),
            Verdict::Timeout { .. } => Some("timeout"),
            Verdict::Unknown { .. } => Some("unknown"),
        }
    }

    fn generate_xml(&self, run_result: &RunResult) -> anyhow::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let missing = self.missing.lock().unwrap();
        let tests = run_result.results.len() + missing.len();
        let failures = run_result.results.iter().filter(|r| !r.is_pass()).count();
        let errors = missing.len();
        let time = run_result.duration.as_secs_f64();
        let timestamp = chrono::Utc::now().to_rfc3339();

        let mut testsuites = BytesStart::new("testsuites");
        testsuites.push_attribute(("tests", tests.to_string().as_str()));
        testsuites.push_attribute(("failures", failures.to_string().as_str()));
        testsuites.push_attribute(("errors", errors.to_string().as_str()));
        testsuites.push_attribute(("time", format!("{time:.3}").as_str()));
        writer.write_event(Event::Start(testsuites))?;

        let mut testsuite = BytesStart::new("testsuite");
        testsuite.push_attribute(("name", self.testsuite_name.as_str()));
        testsuite.push_attribute(("tests", tests.to_string().as_str()));
        testsuite.push_attribute(("failures", failures.to_string().as_str()));
        testsuite.push_attribute(("errors", errors.to_string().as_str()));
        testsuite.push_attribute(("time", format!("{time:.3}").as_str()));
        testsuite.push_attribute(("timestamp", timestamp.as_str()));
        writer.write_event(Event::Start(testsuite))?;

        for result in &run_result.results {
            let mut testcase = BytesStart::new("testcase");
            testcase.push_attribute(("classname", self.testsuite_name.as_str()));
            testcase.push_attribute(("name", result.name()));

            match Self::verdict_kind(result) {
                None => {
                    writer.write_event(Event::Empty(testcase))?;
                }
                Some(kind) => {
                    writer.write_event(Event::Start(testcase))?;
                    let mut failure = BytesStart::new("failure");
                    failure.push_attribute(("type", kind));
                    writer.write_event(Event::Start(failure))?;
                    writer.write_event(Event::Text(BytesText::new(&result.to_string())))?;
                    writer.write_event(Event::End(BytesEnd::new("failure")))?;
                    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
                }
            }
        }

        for test in missing.iter() {
            let mut testcase = BytesStart::new("testcase");
            testcase.push_attribute(("classname", self.testsuite_name.as_str()));
            testcase.push_attribute(("name", test.as_str()));
            writer.write_event(Event::Start(testcase))?;
            let mut error = BytesStart::new("error");
            error.push_attribute(("message", "no result recorded for this test"));
            writer.write_event(Event::Empty(error))?;
            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
        writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

        Ok(String::from_utf8(writer.into_inner())?)
    }
}

#[async_trait]
impl Reporter for JUnitReporter {
    async fn on_collection_complete(&self, _plan: &SessionPlan) {}

    async fn on_test_start(&self, _test: &str) {}

    async fn on_test_complete(&self, _result: &TestResult) {}

    async fn on_test_missing(&self, test: &str) {
        self.missing.lock().unwrap().push(test.to_string());
    }

    async fn on_run_complete(&self, result: &RunResult) {
        let xml = match self.generate_xml(result) {
            Ok(xml) => xml,
            Err(err) => {
                warn!("failed to generate JUnit XML: {err}");
                return;
            }
        };
        if let Some(parent) = self.output_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("failed to create JUnit output directory: {err}");
                return;
            }
        }
        match std::fs::write(&self.output_path, xml) {
            Ok(()) => info!("wrote JUnit report to {}", self.output_path.display()),
            Err(err) => warn!(
                "failed to write JUnit report to {}: {err}",
                self.output_path.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TestSpec;
    use std::time::Duration;

    fn sample_run() -> RunResult {
        let pass = TestResult::pass(
            TestSpec::shared("MeshLoad", "tests/mesh_load.py"),
            Some("ok".to_string()),
            None,
        );
        let fail = TestResult::fail(
            TestSpec::shared("LightCreation", "tests/light_creation.py"),
            Some("assertion failed".to_string()),
            None,
        );
        RunResult {
            total_tests: 2,
            passed: 1,
            failed: 1,
            duration: Duration::from_millis(1234),
            results: vec![pass, fail],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn xml_contains_testcases_and_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("junit.xml");
        let reporter = JUnitReporter::new(path.clone()).with_testsuite_name("editor-tests");

        reporter.on_run_complete(&sample_run()).await;

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains(r#"<testsuite name="editor-tests""#));
        assert!(xml.contains(r#"name="MeshLoad""#));
        assert!(xml.contains(r#"name="LightCreation""#));
        assert!(xml.contains(r#"<failure type="failure""#));
        assert!(xml.contains("assertion failed"));
    }

    #[tokio::test]
    async fn missing_results_become_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("junit.xml");
        let reporter = JUnitReporter::new(path.clone());

        reporter.on_test_missing("GhostTest").await;
        reporter.on_run_complete(&RunResult::default()).await;

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains(r#"name="GhostTest""#));
        assert!(xml.contains(r#"errors="1""#));
        assert!(xml.contains("no result recorded"));
    }
}
