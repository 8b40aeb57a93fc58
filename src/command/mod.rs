use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::PlayerConfig;
use crate::error::DeckError;
use crate::models::MediaCommand;

/// Runs the media-control executable and hands back its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[&str]) -> Result<String, DeckError>;

    async fn send(&self, command: MediaCommand) -> Result<(), DeckError> {
        self.run(&[command.subcommand()]).await?;
        Ok(())
    }
}

/// `playerctl`, or anything that speaks its subcommands.
pub struct Playerctl {
    executable: String,
    player: Option<String>,
}

impl Playerctl {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            player: config.player.clone(),
        }
    }

    pub fn check_installed(&self) -> Result<(), DeckError> {
        std::process::Command::new(&self.executable)
            .arg("--version")
            .output()
            .map_err(|e| {
                DeckError::Command(format!(
                    "{} is not installed or not executable: {e}",
                    self.executable
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for Playerctl {
    async fn run(&self, args: &[&str]) -> Result<String, DeckError> {
        let mut command = Command::new(&self.executable);
        if let Some(player) = &self.player {
            command.arg("--player").arg(player);
        }
        command.args(args);

        debug!("Running {} {}", self.executable, args.join(" "));

        let output = command
            .output()
            .await
            .map_err(|e| DeckError::Command(format!("Failed to run {}: {e}", self.executable)))?;

        check_output(&output.status, &output.stdout, &output.stderr)
    }
}

/// Anything on stderr counts as failure, even with a zero exit status.
fn check_output(
    status: &std::process::ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<String, DeckError> {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();

    if !status.success() {
        let detail = if stderr.is_empty() {
            format!("exited with {status}")
        } else {
            stderr.to_string()
        };
        return Err(DeckError::Command(detail));
    }

    if !stderr.is_empty() {
        return Err(DeckError::Command(stderr.to_string()));
    }

    Ok(String::from_utf8_lossy(stdout).trim().to_string())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    #[test]
    fn test_check_output_trims_stdout() {
        let ok = ExitStatus::from_raw(0);
        assert_eq!(
            check_output(&ok, b"  Daft Punk\n", b"").unwrap(),
            "Daft Punk"
        );
    }

    #[test]
    fn test_check_output_stderr_is_failure() {
        let ok = ExitStatus::from_raw(0);
        let err = check_output(&ok, b"", b"No players found\n").unwrap_err();
        assert!(matches!(err, DeckError::Command(msg) if msg == "No players found"));
    }

    #[test]
    fn test_check_output_nonzero_exit_is_failure() {
        // Raw wait status: exit code 1
        let failed = ExitStatus::from_raw(1 << 8);
        assert!(matches!(
            check_output(&failed, b"out", b""),
            Err(DeckError::Command(_))
        ));
    }

    #[tokio::test]
    async fn test_playerctl_passes_player_filter() {
        let runner = Playerctl::new(&PlayerConfig {
            executable: "echo".to_string(),
            player: Some("spotify".to_string()),
        });
        let out = runner.run(&["metadata", "title"]).await.unwrap();
        assert_eq!(out, "--player spotify metadata title");
    }

    #[tokio::test]
    async fn test_missing_executable_is_command_error() {
        let runner = Playerctl::new(&PlayerConfig {
            executable: "/nonexistent/deckplay-playerctl".to_string(),
            player: None,
        });
        assert!(matches!(
            runner.send(MediaCommand::Next).await,
            Err(DeckError::Command(_))
        ));
    }

    #[tokio::test]
    async fn test_send_maps_subcommands() {
        let runner = testing::FakeRunner::default();
        runner.send(MediaCommand::PlayPause).await.unwrap();
        runner.send(MediaCommand::Previous).await.unwrap();
        assert_eq!(runner.count("play-pause"), 1);
        assert_eq!(runner.count("previous"), 1);
    }
}
