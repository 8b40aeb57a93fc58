mod keys;
mod poll;

pub use keys::KeyMap;
pub use poll::{ControlRequest, PollLoop};

use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::command::{CommandRunner, Playerctl};
use crate::config::Config;
use crate::device::{self, DeckSession};
use crate::ipc::{DaemonCommand, DaemonResponse};
use crate::metadata::PlayerMetadata;
use crate::presence::LogPresence;
use crate::render::{Layout, Renderer, load_font};
use crate::spotify::auth::AuthServer;
use crate::spotify::{PlaybackQuery, SpotifyClient, TokenStore};

/// Strip size used for rendering when the device has no LCD strip
const FALLBACK_STRIP: (u32, u32) = (800, 100);

pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn run(&self) -> Result<()> {
        let runtime = tokio::runtime::Runtime::new().with_context(|| "Failed to start runtime")?;
        runtime.block_on(self.run_async())
    }

    async fn run_async(&self) -> Result<()> {
        use interprocess::local_socket::prelude::*;
        use interprocess::local_socket::{GenericFilePath, ListenerOptions};

        // No device is the one failure that stops startup
        let (session, key_rx) = device::open(&self.config.device)
            .await
            .with_context(|| "Failed to open Stream Deck")?;
        let session: Arc<dyn DeckSession> = Arc::new(session);

        let playerctl = Playerctl::new(&self.config.player);
        if let Err(e) = playerctl.check_installed() {
            warn!("{e}");
        }
        let runner: Arc<dyn CommandRunner> = Arc::new(playerctl);

        let tokens = self.config.spotify.enabled.then(TokenStore::new);
        let playback = tokens.as_ref().map(|store| {
            Arc::new(SpotifyClient::new(Arc::new(store.clone()))) as Arc<dyn PlaybackQuery>
        });

        if let Some(store) = &tokens {
            let server = AuthServer::new(self.config.spotify.clone(), store.clone());
            tokio::spawn(async move {
                if let Err(e) = server.serve().await {
                    error!("{e:#}");
                }
            });
        }

        let layout = Layout {
            icon: session.icon_size(),
            strip: session.strip_size().unwrap_or(FALLBACK_STRIP),
        };
        let renderer = Renderer::new(layout, load_font(self.config.render.font_path.as_deref()))
            .with_formats(self.config.device.icon_format, self.config.device.strip_format);

        let source = Arc::new(PlayerMetadata::new(Arc::clone(&runner), playback));
        let mut poll = PollLoop::new(
            source,
            runner,
            session,
            renderer,
            KeyMap::new(&self.config.keys.bindings),
            self.config.device.icon_slot,
        );
        if self.config.presence.enabled {
            poll = poll.with_presence(Arc::new(LogPresence::new()));
        }
        if let Some(store) = tokens {
            poll = poll.with_tokens(store);
        }

        let socket_path = self.config.socket_path();

        // Remove stale socket
        if socket_path.exists() {
            fs::remove_file(&socket_path)?;
        }

        let pid_path = self.config.pid_path();
        fs::write(&pid_path, std::process::id().to_string())?;

        let name = socket_path.as_os_str().to_fs_name::<GenericFilePath>()?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_sync()
            .with_context(|| "Failed to create socket listener")?;

        info!("Daemon started, listening on {}", socket_path.display());

        let (control_tx, control_rx) = mpsc::channel(8);
        thread::spawn(move || accept_control(listener, control_tx));

        let interval = Duration::from_millis(self.config.render.interval_ms.max(1));
        poll.run(interval, key_rx, control_rx).await;

        let _ = fs::remove_file(&socket_path);
        let _ = fs::remove_file(&pid_path);

        info!("Daemon stopped");
        Ok(())
    }

    pub fn start_detached(config: &Config) -> Result<()> {
        use std::process::{Command, Stdio};

        let socket_path = config.socket_path();
        if socket_path.exists() {
            let client = crate::ipc::DaemonClient::new(&socket_path);
            if client.is_daemon_running() {
                anyhow::bail!("Daemon is already running");
            }
            fs::remove_file(&socket_path)?;
        }

        let exe = std::env::current_exe()?;
        let log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.log_path())
            .with_context(|| format!("Failed to open {}", config.log_path().display()))?;

        let mut command = Command::new(&exe);
        command
            .arg("daemon")
            .arg("run")
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command
            .spawn()
            .with_context(|| "Failed to start daemon")?;

        for _ in 0..50 {
            if socket_path.exists() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }

        anyhow::bail!(
            "Daemon failed to start, see {}",
            config.log_path().display()
        )
    }

    pub fn stop(config: &Config) -> Result<()> {
        let client = crate::ipc::DaemonClient::new(config.socket_path());
        if client.is_daemon_running() {
            client.shutdown()?;
            for _ in 0..50 {
                if !config.socket_path().exists() {
                    return Ok(());
                }
                thread::sleep(Duration::from_millis(100));
            }
        }
        Ok(())
    }

    pub fn is_running(config: &Config) -> bool {
        let client = crate::ipc::DaemonClient::new(config.socket_path());
        client.is_daemon_running()
    }
}

/// Blocking accept loop; each request is answered by the poll loop.
fn accept_control(
    listener: interprocess::local_socket::Listener,
    control: mpsc::Sender<ControlRequest>,
) {
    use interprocess::local_socket::prelude::*;

    while !control.is_closed() {
        match listener.accept() {
            Ok(conn) => {
                if let Err(e) = handle_connection(conn, &control) {
                    error!("Connection error: {e}");
                }
            }
            Err(e) => error!("Accept error: {e}"),
        }
    }
}

fn handle_connection(
    conn: interprocess::local_socket::Stream,
    control: &mpsc::Sender<ControlRequest>,
) -> Result<()> {
    let mut reader = BufReader::new(&conn);
    let mut writer = &conn;

    let mut line = String::new();
    reader.read_line(&mut line)?;

    let command: DaemonCommand = serde_json::from_str(&line)?;
    let (reply, answer) = oneshot::channel();

    let response = if control
        .blocking_send(ControlRequest { command, reply })
        .is_ok()
    {
        answer
            .blocking_recv()
            .unwrap_or_else(|_| DaemonResponse::Error("Daemon is shutting down".to_string()))
    } else {
        DaemonResponse::Error("Daemon is shutting down".to_string())
    };

    let response_json = serde_json::to_string(&response)?;
    writeln!(writer, "{response_json}")?;
    writer.flush()?;

    Ok(())
}
