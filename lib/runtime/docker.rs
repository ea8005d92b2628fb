//! Docker CLI adapter.

use std::{process::Stdio, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};

use crate::{
    validate::{validate_args, validate_command, validate_container_name},
    LudocoreError, LudocoreResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long a freshly started container gets to either stabilize or crash
/// before we decide the start succeeded.
const LIVENESS_GRACE: Duration = Duration::from_secs(2);

/// How many log lines to capture from a container that died on start.
const CRASH_LOG_TAIL: &str = "50";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Options for starting one container.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Container name.
    pub name: String,

    /// Image tag to run.
    pub image: String,

    /// Command override; `None` uses the image entrypoint.
    pub command: Option<String>,

    /// Arguments for the command override.
    pub args: Vec<String>,
}

/// Thin adapter over the `docker` command-line client. Stateless; every
/// method shells out and interprets the exit status.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerCli;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerCli {
    /// Creates the adapter.
    pub fn new() -> Self {
        Self
    }

    /// Verifies the runtime is installed and the daemon is reachable.
    pub async fn check_installed(&self) -> LudocoreResult<()> {
        let status = Command::new("docker")
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(LudocoreError::Unavailable(
                "docker is not installed or the daemon is not running".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns whether an image with the given tag exists locally.
    pub async fn image_exists(&self, tag: &str) -> bool {
        let output = Command::new("docker")
            .args(["images", "-q", tag])
            .output()
            .await;

        matches!(output, Ok(out) if out.status.success() && !out.stdout.is_empty())
    }

    /// Builds an image from the given recipe text, streaming build output to
    /// the daemon log. The recipe is written to a temporary file and built
    /// with the staging directory as context.
    pub async fn build_image(&self, tag: &str, recipe_text: &str) -> LudocoreResult<()> {
        let recipe_file = tempfile::NamedTempFile::new()?;
        std::fs::write(recipe_file.path(), recipe_text)?;

        let context_dir = crate::utils::ludocore_home_path();

        let mut child = Command::new("docker")
            .args(["build", "-t", tag, "-f"])
            .arg(recipe_file.path())
            .arg(&context_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut captured = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(target: "ludocore::build", "{}", line);
                captured.push_str(&line);
                captured.push('\n');
            }
            captured
        });

        let mut captured = String::new();
        let mut stdout_lines = BufReader::new(stdout).lines();
        while let Some(line) = stdout_lines.next_line().await? {
            tracing::info!(target: "ludocore::build", "{}", line);
            captured.push_str(&line);
            captured.push('\n');
        }
        captured.push_str(&stderr_task.await.unwrap_or_default());

        let status = child.wait().await?;
        if !status.success() {
            return Err(LudocoreError::Build(captured));
        }
        Ok(())
    }

    /// Starts a container in the background on the host network and waits
    /// through a short liveness window. If the container exits during the
    /// window it is cleaned up and the captured logs are returned in the
    /// error.
    pub async fn run(&self, cfg: &RunConfig) -> LudocoreResult<()> {
        validate_container_name(&cfg.name)?;
        if let Some(command) = &cfg.command {
            validate_command(command)?;
        }
        validate_args(&cfg.args)?;

        let mut command = Command::new("docker");
        command
            .args(["run", "-d", "--network", "host", "--name"])
            .arg(&cfg.name)
            .arg(&cfg.image);
        if let Some(cmd) = &cfg.command {
            command.arg(cmd);
            command.args(&cfg.args);
        }

        let output = command.output().await?;
        if !output.status.success() {
            return Err(LudocoreError::Runtime(format!(
                "failed to start container: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // Give the container a moment to either stabilize or crash.
        tokio::time::sleep(LIVENESS_GRACE).await;

        let (running, logs) = self.is_running(&cfg.name).await;
        if !running {
            let _ = Command::new("docker")
                .args(["rm", "-f"])
                .arg(&cfg.name)
                .output()
                .await;

            if logs.is_empty() {
                return Err(LudocoreError::Runtime(
                    "container exited immediately; no logs available".to_string(),
                ));
            }
            return Err(LudocoreError::Runtime(format!(
                "container exited immediately; logs:\n{}",
                logs
            )));
        }

        Ok(())
    }

    /// Returns whether a container is running; when it is not, also returns
    /// whatever recent logs could be recovered from the stopped container.
    pub async fn is_running(&self, name: &str) -> (bool, String) {
        let output = Command::new("docker")
            .args(["inspect", "-f", "{{.State.Running}}", name])
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let running = String::from_utf8_lossy(&out.stdout).trim() == "true";
                if running {
                    (true, String::new())
                } else {
                    (false, self.recent_logs(name).await)
                }
            }
            _ => (false, self.recent_logs(name).await),
        }
    }

    /// Stops and removes a container. Idempotent with respect to containers
    /// that are already gone.
    pub async fn stop(&self, name: &str) -> LudocoreResult<()> {
        validate_container_name(name)?;

        let output = Command::new("docker").args(["stop", name]).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("No such container") {
                return Err(LudocoreError::Runtime(format!(
                    "failed to stop container {}: {}",
                    name,
                    stderr.trim()
                )));
            }
        }

        // Container might already be removed.
        let _ = Command::new("docker").args(["rm", name]).output().await;
        Ok(())
    }

    /// Returns the bridge-network IPv4 address of a running container.
    pub async fn inspect_address(&self, name: &str) -> LudocoreResult<String> {
        validate_container_name(name)?;

        let output = Command::new("docker")
            .args(["inspect", "-f", "{{.NetworkSettings.IPAddress}}", name])
            .output()
            .await?;

        if !output.status.success() {
            return Err(LudocoreError::Runtime(format!(
                "docker inspect failed for {}",
                name
            )));
        }

        let ip = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if ip.is_empty() {
            return Err(LudocoreError::Runtime(format!(
                "container {} has no bridge address yet",
                name
            )));
        }
        Ok(ip)
    }

    /// Returns container logs emitted since the given duration expression
    /// (e.g. `5m`).
    pub async fn logs_since(&self, name: &str, since: &str) -> LudocoreResult<String> {
        validate_container_name(name)?;

        let output = Command::new("docker")
            .args(["logs", "--since", since, name])
            .output()
            .await?;

        if !output.status.success() {
            return Err(LudocoreError::Runtime(format!(
                "failed to get logs for {}: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    /// Removes an image tag so the next start triggers a rebuild.
    pub async fn remove_image(&self, tag: &str) -> LudocoreResult<()> {
        let _ = Command::new("docker")
            .args(["rmi", "-f", tag])
            .output()
            .await?;
        Ok(())
    }

    async fn recent_logs(&self, name: &str) -> String {
        let output = Command::new("docker")
            .args(["logs", "--tail", CRASH_LOG_TAIL, name])
            .output()
            .await;

        match output {
            Ok(out) => {
                let mut logs = String::from_utf8_lossy(&out.stdout).into_owned();
                logs.push_str(&String::from_utf8_lossy(&out.stderr));
                logs
            }
            Err(e) => format!("(could not retrieve logs: {})", e),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_rejects_unsanitized_input() {
        let docker = DockerCli::new();

        let bad_name = RunConfig {
            name: "-bad".to_string(),
            image: "ludocore-server".to_string(),
            command: None,
            args: vec![],
        };
        assert!(docker.run(&bad_name).await.is_err());

        let bad_command = RunConfig {
            name: "shadow-dragon".to_string(),
            image: "ludocore-server".to_string(),
            command: Some("/app/run; rm -rf /".to_string()),
            args: vec![],
        };
        assert!(docker.run(&bad_command).await.is_err());

        let bad_arg = RunConfig {
            name: "shadow-dragon".to_string(),
            image: "ludocore-server".to_string(),
            command: Some("/app/server".to_string()),
            args: vec!["$(id)".to_string()],
        };
        assert!(docker.run(&bad_arg).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_rejects_unsanitized_name() {
        let docker = DockerCli::new();
        assert!(docker.stop("a;b").await.is_err());
        assert!(docker.inspect_address("a|b").await.is_err());
        assert!(docker.logs_since("..", "5m").await.is_err());
    }
}
