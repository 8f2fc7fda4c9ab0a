//! Asset processor lifecycle and engine process sweeps.
//!
//! Editor tests need an asset processor up before any editor launches. The
//! suite either manages its own instance (started here, stopped at suite
//! teardown) or leaves an externally-owned one alone. Between runs, leftover
//! engine processes from earlier batches are swept so they cannot hold locks
//! the next editor needs.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::AssetProcessorConfig;

/// Errors from managing the asset processor.
#[derive(Debug, thiserror::Error)]
pub enum ApError {
    #[error("asset processor is enabled but no executable is configured")]
    NotConfigured,

    #[error("failed to start asset processor {path}: {source}")]
    Start {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A suite-managed asset processor child process.
pub struct AssetProcessor {
    executable: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
}

impl AssetProcessor {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            child: None,
        }
    }

    pub fn start(&mut self) -> Result<(), ApError> {
        info!("starting asset processor: {}", self.executable.display());
        let child = Command::new(&self.executable)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ApError::Start {
                path: self.executable.clone(),
                source,
            })?;
        self.child = Some(child);
        Ok(())
    }

    /// Whether the managed child is still alive.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("stopping asset processor");
            if let Err(err) = child.kill().await {
                warn!("failed to stop asset processor: {err}");
            }
        }
    }
}

/// Whether a process with the configured asset processor name is running
/// outside our management.
pub async fn external_instance_running(process_name: &str) -> bool {
    #[cfg(unix)]
    {
        Command::new("pgrep")
            .arg("-x")
            .arg(process_name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
    #[cfg(windows)]
    {
        let image = format!("{process_name}.exe");
        let filter = format!("IMAGENAME eq {image}");
        match Command::new("tasklist")
            .args(["/FI", filter.as_str()])
            .output()
            .await
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&image),
            Err(_) => false,
        }
    }
}

/// Kills leftover engine processes by name. The asset processor itself is
/// spared unless `include_asset_processor` is set.
pub async fn kill_engine_processes(config: &AssetProcessorConfig, include_asset_processor: bool) {
    let mut names: Vec<&str> = config
        .engine_process_names
        .iter()
        .map(String::as_str)
        .collect();
    if include_asset_processor {
        names.push(config.process_name.as_str());
    }

    for name in names {
        debug!("sweeping leftover process: {name}");
        #[cfg(unix)]
        let status = Command::new("pkill")
            .args(["-9", "-x", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        #[cfg(windows)]
        let status = {
            let image = format!("{name}.exe");
            Command::new("taskkill")
                .args(["/F", "/IM", image.as_str()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
        };
        if let Err(err) = status {
            warn!("process sweep for {name} failed: {err}");
        }
    }
}

/// Ensures an asset processor is available before a runner invocation,
/// following the ownership policy:
///
/// 1. A managed instance that died is restarted.
/// 2. An externally-owned instance is left alone.
/// 3. Otherwise stragglers are swept and a fresh managed instance started.
///
/// Always finishes by sweeping non-AP engine processes. Failures abort the
/// suite; a dead asset processor poisons every subsequent result.
pub async fn prepare(
    config: &AssetProcessorConfig,
    slot: &mut Option<AssetProcessor>,
) -> Result<(), ApError> {
    if !config.enabled {
        kill_engine_processes(config, false).await;
        return Ok(());
    }

    if let Some(ap) = slot.as_mut() {
        if !ap.is_running() {
            warn!("managed asset processor died, restarting");
            ap.start()?;
        }
        kill_engine_processes(config, false).await;
        return Ok(());
    }

    if external_instance_running(&config.process_name).await {
        debug!("external asset processor detected, leaving it alone");
        kill_engine_processes(config, false).await;
        return Ok(());
    }

    // No asset processor anywhere: clear stragglers, then own a fresh one.
    kill_engine_processes(config, true).await;
    let executable = config.executable.as_ref().ok_or(ApError::NotConfigured)?;
    let mut ap = AssetProcessor::new(
        shellexpand::tilde(executable).into_owned(),
        config.args.clone(),
    );
    ap.start()?;
    *slot = Some(ap);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> AssetProcessorConfig {
        AssetProcessorConfig {
            enabled: false,
            executable: None,
            args: Vec::new(),
            process_name: "volley-nonexistent-ap".to_string(),
            engine_process_names: Vec::new(),
        }
    }

    #[tokio::test]
    async fn disabled_prepare_leaves_slot_empty() {
        let mut slot = None;
        prepare(&quiet_config(), &mut slot).await.unwrap();
        assert!(slot.is_none());
    }

    #[tokio::test]
    async fn enabled_without_executable_errors() {
        let mut config = quiet_config();
        config.enabled = true;
        let mut slot = None;
        assert!(matches!(
            prepare(&config, &mut slot).await,
            Err(ApError::NotConfigured)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn managed_instance_lifecycle() {
        let mut ap = AssetProcessor::new("/bin/sleep", vec!["60".to_string()]);
        assert!(!ap.is_running());
        ap.start().unwrap();
        assert!(ap.is_running());
        ap.stop().await;
        assert!(!ap.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn enabled_prepare_starts_and_owns_instance() {
        let mut config = quiet_config();
        config.enabled = true;
        config.executable = Some("/bin/sleep".to_string());
        config.args = vec!["60".to_string()];

        let mut slot = None;
        prepare(&config, &mut slot).await.unwrap();
        let ap = slot.as_mut().unwrap();
        assert!(ap.is_running());
        ap.stop().await;
        assert!(!ap.is_running());
    }
}
