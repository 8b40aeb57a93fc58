use anyhow::{Context, Result};
use interprocess::TryClone;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::models::{MediaCommand, StatusReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonCommand {
    Media { command: MediaCommand },
    Refresh,
    GetStatus,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonResponse {
    Ok,
    Status(StatusReport),
    Error(String),
}

pub struct DaemonClient {
    socket_path: std::path::PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn is_daemon_running(&self) -> bool {
        self.socket_path.exists() && self.send_command(DaemonCommand::GetStatus).is_ok()
    }

    pub fn send_command(&self, command: DaemonCommand) -> Result<DaemonResponse> {
        use interprocess::local_socket::GenericFilePath;
        use interprocess::local_socket::prelude::*;

        let path = self.socket_path.as_os_str();
        let name = path
            .to_fs_name::<GenericFilePath>()
            .with_context(|| "Invalid socket path")?;

        let conn = interprocess::local_socket::Stream::connect(name).with_context(|| {
            format!(
                "Failed to connect to daemon at {}",
                self.socket_path.display()
            )
        })?;

        let mut writer = conn;
        let mut reader = BufReader::new(writer.try_clone()?);

        let msg = serde_json::to_string(&command)?;
        writeln!(writer, "{msg}")?;
        writer.flush()?;

        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;

        let response: DaemonResponse = serde_json::from_str(&response_line)
            .with_context(|| "Failed to parse daemon response")?;

        Ok(response)
    }

    pub fn media(&self, command: MediaCommand) -> Result<DaemonResponse> {
        self.send_command(DaemonCommand::Media { command })
    }

    pub fn refresh(&self) -> Result<DaemonResponse> {
        self.send_command(DaemonCommand::Refresh)
    }

    pub fn get_status(&self) -> Result<StatusReport> {
        match self.send_command(DaemonCommand::GetStatus)? {
            DaemonResponse::Status(status) => Ok(status),
            DaemonResponse::Error(e) => anyhow::bail!("{e}"),
            _ => anyhow::bail!("Unexpected response"),
        }
    }

    pub fn shutdown(&self) -> Result<DaemonResponse> {
        self.send_command(DaemonCommand::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_socket_means_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let client = DaemonClient::new(dir.path().join("deckplay.sock"));
        assert!(!client.is_daemon_running());
        assert!(client.refresh().is_err());
    }

    #[test]
    fn test_command_is_one_json_line() {
        let line = serde_json::to_string(&DaemonCommand::Media {
            command: MediaCommand::PlayPause,
        })
        .unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(line, r#"{"Media":{"command":"PlayPause"}}"#);
    }
}
