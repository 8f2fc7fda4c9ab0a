//! Host editor process handles.
//!
//! An [`EditorLauncher`] is the suite-provided prototype: the executable
//! path and log layout shared by every invocation. Each runner clones it
//! into an [`EditorInstance`] bound to one run id, which owns exactly one
//! editor subprocess for the duration of one batch.
//!
//! Waiting never raises on a hang: [`EditorInstance::wait`] returns a
//! [`WaitOutcome`] and the caller decides whether to kill. Output is
//! drained concurrently with the wait so a chatty editor can never stall
//! on a full pipe.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EditorConfig;

/// Errors from launching or managing an editor process.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("failed to launch editor {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("editor process was not started")]
    NotStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a bounded wait on the editor concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The process exited with the given code (-1 when killed by signal).
    Exited(i32),
    /// The timeout elapsed; the process is still running.
    TimedOut,
}

/// The suite-wide editor prototype.
#[derive(Debug, Clone)]
pub struct EditorLauncher {
    executable: PathBuf,
    project_log_root: PathBuf,
    log_name: String,
    regset: Vec<String>,
}

impl EditorLauncher {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            executable: config.expanded_executable(),
            project_log_root: config.expanded_log_root(),
            log_name: config.log_name.clone(),
            regset: config.regset.clone(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn project_log_root(&self) -> &Path {
        &self.project_log_root
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// Feature-flag registry overrides applied to every invocation.
    pub fn regset_args(&self) -> Vec<String> {
        self.regset
            .iter()
            .map(|entry| format!("--regset={entry}"))
            .collect()
    }

    /// Clones the prototype into an instance bound to one run id.
    pub fn for_run(&self, run_id: u32) -> EditorInstance {
        EditorInstance {
            executable: self.executable.clone(),
            run_id,
            child: None,
            output_task: None,
        }
    }
}

/// One editor subprocess, alive for at most one batch.
pub struct EditorInstance {
    executable: PathBuf,
    run_id: u32,
    child: Option<Child>,
    output_task: Option<JoinHandle<String>>,
}

impl EditorInstance {
    pub fn run_id(&self) -> u32 {
        self.run_id
    }

    /// Spawns the editor with the given arguments, stdout and stderr piped.
    pub fn start(&mut self, args: &[String]) -> Result<(), EditorError> {
        debug!(
            "starting editor (run {}): {} {}",
            self.run_id,
            self.executable.display(),
            args.join(" ")
        );

        let mut command = Command::new(&self.executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| EditorError::Spawn {
            path: self.executable.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain both pipes off-thread so the editor can never block on a
        // full pipe while we wait on it. stderr is appended after stdout;
        // markers only ever appear on stdout.
        self.output_task = Some(tokio::spawn(async move {
            let mut out_buf = String::new();
            let mut err_buf = String::new();
            let read_out = async {
                if let Some(mut stdout) = stdout {
                    let _ = stdout.read_to_string(&mut out_buf).await;
                }
            };
            let read_err = async {
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut err_buf).await;
                }
            };
            tokio::join!(read_out, read_err);
            out_buf.push_str(&err_buf);
            out_buf
        }));

        self.child = Some(child);
        Ok(())
    }

    /// Waits up to `timeout` for the editor to exit.
    pub async fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome, EditorError> {
        let child = self.child.as_mut().ok_or(EditorError::NotStarted)?;
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => Ok(WaitOutcome::Exited(status?.code().unwrap_or(-1))),
            Err(_) => Ok(WaitOutcome::TimedOut),
        }
    }

    /// Kills the editor process. Used on timeout; the host gets no chance
    /// to clean up.
    pub async fn stop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(err) = child.kill().await {
                warn!("failed to kill editor process (run {}): {err}", self.run_id);
            }
        }
    }

    /// Collects everything the editor wrote, blocking until the pipes hit
    /// EOF (immediate once the process has exited or been killed).
    pub async fn take_output(&mut self) -> String {
        match self.output_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;

    fn sh_launcher() -> EditorLauncher {
        EditorLauncher::new(&EditorConfig {
            executable: "/bin/sh".to_string(),
            project_log_root: "/tmp".to_string(),
            log_name: "editor_test.log".to_string(),
            regset: vec!["/Automation/EnableScripts=true".to_string()],
        })
    }

    #[test]
    fn regset_args_are_prefixed() {
        let launcher = sh_launcher();
        assert_eq!(
            launcher.regset_args(),
            vec!["--regset=/Automation/EnableScripts=true".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wait_reports_exit_code_and_output() {
        let mut editor = sh_launcher().for_run(1);
        editor
            .start(&[
                "-c".to_string(),
                "echo marker-line; exit 7".to_string(),
            ])
            .unwrap();

        let outcome = editor.wait(Duration::from_secs(10)).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Exited(7));
        let output = editor.take_output().await;
        assert!(output.contains("marker-line"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wait_times_out_and_stop_kills() {
        let mut editor = sh_launcher().for_run(2);
        editor
            .start(&["-c".to_string(), "echo early; exec sleep 600".to_string()])
            .unwrap();

        let outcome = editor.wait(Duration::from_millis(200)).await.unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);

        editor.stop().await;
        let output = editor.take_output().await;
        assert!(output.contains("early"));
    }

    #[tokio::test]
    async fn wait_without_start_errors() {
        let mut editor = sh_launcher().for_run(3);
        assert!(matches!(
            editor.wait(Duration::from_millis(10)).await,
            Err(EditorError::NotStarted)
        ));
    }
}
