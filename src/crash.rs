//! Crash-report rotation and per-run editor log access.
//!
//! Every editor invocation gets its own log directory,
//! `<project-log-root>/<run_id>/`, so concurrent editors never share a
//! crash slot. The host drops `error.log` (and on some platforms
//! `error.dmp`) into that directory when it crashes; we rotate stale copies
//! aside before a run and read the fresh one afterwards, waiting a bounded
//! time for the dump to finish flushing.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Crash report file name the host writes on abnormal exit.
pub const CRASH_REPORT_FILE: &str = "error.log";

/// Minidump file name, produced on Windows hosts only.
pub const CRASH_DUMP_FILE: &str = "error.dmp";

const CRASH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The log directory for one editor invocation.
pub fn run_log_dir(project_log_root: &Path, run_id: u32) -> PathBuf {
    project_log_root.join(run_id.to_string())
}

/// Reads the editor log for a run, returning an empty string when the log
/// does not exist (the editor may have died before opening it).
pub fn read_editor_log(project_log_root: &Path, run_id: u32, log_name: &str) -> String {
    let path = run_log_dir(project_log_root, run_id).join(log_name);
    match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            warn!("could not read editor log {}: {err}", path.display());
            String::new()
        }
    }
}

/// Moves any crash report or dump left in the run's slot to a sidelined
/// name keyed by the run id, leaving the slot clean for the next editor.
pub fn cycle_crash_report(project_log_root: &Path, run_id: u32) {
    let dir = run_log_dir(project_log_root, run_id);
    for file_name in [CRASH_REPORT_FILE, CRASH_DUMP_FILE] {
        let path = dir.join(file_name);
        if !path.exists() {
            continue;
        }
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (file_name, ""),
        };
        for attempt in 1u32.. {
            let sidelined = dir.join(format!("{stem}.run{run_id}.{attempt}.{ext}"));
            if sidelined.exists() {
                continue;
            }
            match std::fs::rename(&path, &sidelined) {
                Ok(()) => debug!(
                    "cycled crash artifact {} -> {}",
                    path.display(),
                    sidelined.display()
                ),
                Err(err) => warn!("could not cycle crash artifact {}: {err}", path.display()),
            }
            break;
        }
    }
}

/// Polls for the run's crash report for up to `timeout`, returning its text
/// or an empty string if it never appears. Crash handlers flush the report
/// asynchronously, so a short wait after a crash exit is expected.
pub async fn retrieve_crash_output(
    project_log_root: &Path,
    run_id: u32,
    timeout: Duration,
) -> String {
    let path = run_log_dir(project_log_root, run_id).join(CRASH_REPORT_FILE);
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(content) = std::fs::read_to_string(&path) {
            if !content.is_empty() {
                return content;
            }
        }
        if Instant::now() >= deadline {
            warn!(
                "no crash report appeared at {} within {timeout:?}",
                path.display()
            );
            return String::new();
        }
        tokio::time::sleep(CRASH_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_log_dir_is_keyed_by_run_id() {
        let dir = run_log_dir(Path::new("/logs"), 3);
        assert_eq!(dir, PathBuf::from("/logs/3"));
    }

    #[test]
    fn read_editor_log_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let content = read_editor_log(tmp.path(), 1, "editor_test.log");
        assert_eq!(content, "");
    }

    #[test]
    fn read_editor_log_returns_content() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = run_log_dir(tmp.path(), 2);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("editor_test.log"), "hello log").unwrap();
        assert_eq!(read_editor_log(tmp.path(), 2, "editor_test.log"), "hello log");
    }

    #[test]
    fn cycle_moves_crash_report_aside() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = run_log_dir(tmp.path(), 1);
        std::fs::create_dir_all(&dir).unwrap();
        let slot = dir.join(CRASH_REPORT_FILE);
        std::fs::write(&slot, "stale crash").unwrap();

        cycle_crash_report(tmp.path(), 1);
        assert!(!slot.exists());
        assert!(dir.join("error.run1.1.log").exists());

        // A second stale report gets the next free sidelined name.
        std::fs::write(&slot, "another crash").unwrap();
        cycle_crash_report(tmp.path(), 1);
        assert!(!slot.exists());
        assert!(dir.join("error.run1.2.log").exists());
    }

    #[test]
    fn cycle_without_artifacts_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        cycle_crash_report(tmp.path(), 7);
        assert!(!run_log_dir(tmp.path(), 7).exists());
    }

    #[tokio::test]
    async fn retrieve_crash_output_reads_report() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = run_log_dir(tmp.path(), 1);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CRASH_REPORT_FILE), "Assert at frame 10").unwrap();

        let text = retrieve_crash_output(tmp.path(), 1, Duration::from_secs(1)).await;
        assert_eq!(text, "Assert at frame 10");
    }

    #[tokio::test]
    async fn retrieve_crash_output_times_out_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let text = retrieve_crash_output(tmp.path(), 1, Duration::from_millis(10)).await;
        assert_eq!(text, "");
    }
}
