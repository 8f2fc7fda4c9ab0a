//! Marker-protocol scraping of editor output.
//!
//! Each test script running inside the host editor announces its outcome by
//! printing one marker line:
//!
//! ```text
//! JSON_START({"name": "mesh_load", "success": true, "output": "..."})JSON_END
//! ```
//!
//! `name` is the script's file name without extension, `success` the
//! verdict, `output` the per-test captured output. Additional fields are
//! ignored. Markers may arrive in any order, interleaved with arbitrary
//! editor chatter, on stdout and again in the editor log. The log copies
//! are only used for their byte positions, which let us cut the shared log
//! into per-test excerpts.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::outcome::TestResult;
use crate::spec::TestSpec;

/// The marker framing around the per-test JSON record.
pub const MARKER_PATTERN: &str = r"JSON_START\((.+?)\)JSON_END";

#[derive(Debug, Deserialize)]
struct Marker {
    name: String,
    success: bool,
    #[serde(default)]
    output: String,
}

struct FoundMarker {
    marker: Marker,
    /// Byte offset just past this marker's copy in the log, when present.
    log_end: Option<usize>,
}

/// Maps each spec to a tentative result by scraping `output` and `log_output`.
///
/// Specs are resolved in input order. A spec with no stdout marker becomes
/// `Unknown`; otherwise `success` decides Pass or Fail, with the log sliced
/// so each result carries only what the editor wrote for that test. Two
/// markers with the same name resolve last-wins. Malformed JSON inside a
/// marker is logged and skipped, which downstream reads as a missing marker.
pub fn parse_test_output(
    specs: &[TestSpec],
    output: &str,
    log_output: &str,
) -> HashMap<String, TestResult> {
    let pattern = Regex::new(MARKER_PATTERN).unwrap();

    let mut found: HashMap<String, FoundMarker> = HashMap::new();
    for cap in pattern.captures_iter(output) {
        match serde_json::from_str::<Marker>(&cap[1]) {
            Ok(marker) => {
                found.insert(
                    marker.name.clone(),
                    FoundMarker {
                        marker,
                        log_end: None,
                    },
                );
            }
            Err(err) => warn!("error reading result JSON from test output: {err}"),
        }
    }

    for cap in pattern.captures_iter(log_output) {
        match serde_json::from_str::<Marker>(&cap[1]) {
            Ok(marker) => {
                if let Some(entry) = found.get_mut(&marker.name) {
                    entry.log_end = Some(cap.get(0).map(|m| m.end()).unwrap_or(0));
                }
            }
            Err(err) => warn!("error reading result JSON from editor log: {err}"),
        }
    }

    let mut results = HashMap::new();
    let mut log_start = 0usize;
    let last_idx = specs.len().saturating_sub(1);

    for (idx, spec) in specs.iter().enumerate() {
        let name = spec.module_stem();
        match found.get(&name) {
            None => {
                results.insert(
                    spec.name.clone(),
                    TestResult::unknown(
                        spec.clone(),
                        Some(output.to_string()),
                        Some(format!(
                            "Found no test run information on stdout for {name} in the test output"
                        )),
                        Some(log_output.to_string()),
                    ),
                );
            }
            Some(entry) => {
                // Cut the log so the result only carries this test's portion.
                // The last spec always gets the remaining tail; a spec whose
                // marker never reached the log falls back to the tail without
                // advancing the cursor.
                let (end, advance) = if idx == last_idx {
                    (log_output.len(), true)
                } else if let Some(end) = entry.log_end {
                    (end, true)
                } else {
                    (log_output.len(), false)
                };
                let cur_log = log_output.get(log_start..end).unwrap_or("").to_string();
                if advance {
                    log_start = end;
                }

                let result = if entry.marker.success {
                    TestResult::pass(
                        spec.clone(),
                        Some(entry.marker.output.clone()),
                        Some(cur_log),
                    )
                } else {
                    TestResult::fail(
                        spec.clone(),
                        Some(entry.marker.output.clone()),
                        Some(cur_log),
                    )
                };
                results.insert(spec.name.clone(), result);
            }
        }
    }

    results
}

/// Renders a marker line for a given record, the exact framing the host
/// emits. Useful for fixtures and for the protocol round-trip tests.
pub fn format_marker(name: &str, success: bool, output: &str) -> String {
    format!(
        "JSON_START({})JSON_END",
        serde_json::json!({ "name": name, "success": success, "output": output })
    )
}
