//! Post-download hook and artifact generator.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    NotConfigured,
    Succeeded,
    /// The hook ran (or failed to start); the sync itself still succeeds.
    Failed(String),
}

/// Run the record's `script` with `sh -c` in the city directory.
pub fn run_post_script(script: Option<&str>, city_dir: &Path) -> HookOutcome {
    let Some(script) = script.filter(|s| !s.trim().is_empty()) else {
        return HookOutcome::NotConfigured;
    };
    tracing::info!("running post script: {script}");
    let output = Command::new("sh")
        .arg("-c")
        .arg(script)
        .current_dir(city_dir)
        .stdin(Stdio::null())
        .output();
    match output {
        Ok(output) if output.status.success() => {
            tracing::debug!("post script stdout: {}", String::from_utf8_lossy(&output.stdout).trim());
            HookOutcome::Succeeded
        }
        Ok(output) => {
            let reason = format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            tracing::warn!("post script failed: {reason}");
            HookOutcome::Failed(reason)
        }
        Err(err) => {
            tracing::warn!("post script could not start: {err}");
            HookOutcome::Failed(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Builds are switched off for this run.
    Disabled,
    /// No feed changed and the artifact exists.
    UpToDate,
    Built,
}

/// The artifact is rebuilt when a feed changed or when it does not exist.
pub fn should_build(any_changed: bool, artifact: &Path) -> bool {
    any_changed || !artifact.exists()
}

/// Invoke `<generator> -d <data_dir> -o <artifact> -v`.
pub fn run_generator(generator: &Path, data_dir: &Path, artifact: &Path) -> Result<(), SyncError> {
    let command = format!(
        "{} -d {} -o {} -v",
        generator.display(),
        data_dir.display(),
        artifact.display()
    );
    tracing::info!("building: {command}");
    let status = Command::new(generator)
        .arg("-d")
        .arg(data_dir)
        .arg("-o")
        .arg(artifact)
        .arg("-v")
        .stdin(Stdio::null())
        .status()
        .map_err(|source| SyncError::CommandSpawn {
            command: command.clone(),
            source,
        })?;
    if !status.success() {
        return Err(SyncError::CommandFailed {
            command,
            reason: status.to_string(),
        });
    }
    Ok(())
}
