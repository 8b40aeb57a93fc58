use anyhow::{Result, bail};

use crate::command::{CommandRunner, Playerctl};
use crate::config::Config;
use crate::daemon::Daemon;
use crate::device;
use crate::ipc::{DaemonClient, DaemonResponse};
use crate::models::{MediaCommand, StatusReport, format_ms};

pub struct App {
    pub config: Config,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        config.ensure_dirs()?;

        Ok(Self { config })
    }

    fn client(&self) -> DaemonClient {
        DaemonClient::new(self.config.socket_path())
    }

    fn ensure_daemon(&self) -> Result<DaemonClient> {
        let client = self.client();
        if !client.is_daemon_running() {
            if self.config.daemon.auto_start {
                println!("Starting daemon...");
                Daemon::start_detached(&self.config)?;
            } else {
                bail!("Daemon is not running. Start it with: deckplay daemon start");
            }
        }
        Ok(client)
    }

    // Command implementations

    /// Goes through the daemon when it is up, otherwise runs the player
    /// command directly.
    pub fn media(&self, command: MediaCommand) -> Result<()> {
        let client = self.client();

        if client.is_daemon_running() {
            if let DaemonResponse::Error(e) = client.media(command)? {
                bail!("{e}");
            }
        } else {
            let runner = Playerctl::new(&self.config.player);
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(runner.send(command))?;
        }

        println!("Sent {}", command.subcommand());
        Ok(())
    }

    pub fn refresh(&self) -> Result<()> {
        let client = self.ensure_daemon()?;
        match client.refresh()? {
            DaemonResponse::Error(e) => bail!("{e}"),
            _ => println!("Refreshed"),
        }
        Ok(())
    }

    pub fn status(&self) -> Result<()> {
        let client = self.client();

        if !client.is_daemon_running() {
            println!("Daemon is not running.");
            return Ok(());
        }

        let status = client.get_status()?;
        print_status(&status);

        Ok(())
    }

    pub fn devices(&self) -> Result<()> {
        let devices = device::list()?;

        if devices.is_empty() {
            println!("No Stream Decks found.");
            return Ok(());
        }

        println!("{} device(s):\n", devices.len());
        for (i, d) in devices.iter().enumerate() {
            let marker = if self.config.device.serial.as_deref() == Some(d.serial.as_str()) {
                " [configured]"
            } else {
                ""
            };
            println!("{:3}. {} ({}){}", i + 1, d.kind, d.serial, marker);
        }

        Ok(())
    }

    pub fn login(&self) -> Result<()> {
        let spotify = &self.config.spotify;
        if !spotify.enabled {
            bail!(
                "Spotify is not enabled. Set [spotify] enabled = true in {}",
                Config::config_path().display()
            );
        }
        if spotify.client_id.is_empty() || spotify.client_secret.is_empty() {
            bail!("Spotify client_id and client_secret must be set");
        }

        self.ensure_daemon()?;
        println!("Open {} in your browser to log in.", spotify.login_url());
        Ok(())
    }

    pub fn show_config(&self) -> Result<()> {
        println!("# {}", Config::config_path().display());
        print!("{}", self.config.to_toml()?);
        Ok(())
    }

    pub fn daemon_start(&self) -> Result<()> {
        if Daemon::is_running(&self.config) {
            println!("Daemon is already running.");
            return Ok(());
        }

        Daemon::start_detached(&self.config)?;
        println!("Daemon started.");

        Ok(())
    }

    pub fn daemon_stop(&self) -> Result<()> {
        if !Daemon::is_running(&self.config) {
            println!("Daemon is not running.");
            return Ok(());
        }

        Daemon::stop(&self.config)?;
        println!("Daemon stopped.");

        Ok(())
    }

    pub fn daemon_status(&self) -> Result<()> {
        if Daemon::is_running(&self.config) {
            println!("Daemon is running.");
        } else {
            println!("Daemon is not running.");
        }

        Ok(())
    }

    pub fn daemon_run(&self) -> Result<()> {
        let daemon = Daemon::new(self.config.clone())?;
        daemon.run()
    }
}

fn print_status(status: &StatusReport) {
    println!("Device: {}", status.device);

    match &status.snapshot {
        Some(snapshot) => {
            println!("Now playing: {}", snapshot.display_name());
            if let Some(progress) = snapshot.format_progress() {
                println!("Progress: {progress}");
            } else if snapshot.progress_ms > 0 {
                println!("Progress: {}", format_ms(snapshot.progress_ms));
            }
        }
        None => println!("Nothing rendered yet"),
    }

    if let Some(at) = status.last_render {
        println!("Last render: {}", at.format("%H:%M:%S"));
    }
    println!("Ticks: {}, failures: {}", status.ticks, status.failures);
    if let Some(e) = &status.last_error {
        println!("Last error: {e}");
    }
    if status.streaming_enabled {
        let auth = if status.authenticated {
            "logged in"
        } else {
            "not logged in"
        };
        println!("Spotify: {auth}");
    }
}
