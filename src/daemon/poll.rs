use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::keys::KeyMap;
use crate::command::CommandRunner;
use crate::device::DeckSession;
use crate::error::DeckError;
use crate::ipc::{DaemonCommand, DaemonResponse};
use crate::metadata::MetadataSource;
use crate::models::{PlaybackSnapshot, StatusReport};
use crate::presence::PresenceSink;
use crate::render::{ArtworkLoader, Renderer};
use crate::spotify::TokenStore;

/// A control-socket command waiting for the loop to answer it.
pub struct ControlRequest {
    pub command: DaemonCommand,
    pub reply: oneshot::Sender<DaemonResponse>,
}

/// Everything one tick needs, owned by the daemon's main task.
///
/// Ticks run one at a time: a timer tick that comes due while another tick
/// is still pushing is skipped, key presses wait on their channel.
pub struct PollLoop {
    source: Arc<dyn MetadataSource>,
    runner: Arc<dyn CommandRunner>,
    device: Arc<dyn DeckSession>,
    renderer: Renderer,
    artwork: ArtworkLoader,
    presence: Option<Arc<dyn PresenceSink>>,
    tokens: Option<TokenStore>,
    keys: KeyMap,
    icon_slot: u8,
    status: StatusReport,
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        runner: Arc<dyn CommandRunner>,
        device: Arc<dyn DeckSession>,
        renderer: Renderer,
        keys: KeyMap,
        icon_slot: u8,
    ) -> Self {
        let status = StatusReport {
            device: device.describe(),
            ..StatusReport::default()
        };

        Self {
            source,
            runner,
            device,
            renderer,
            artwork: ArtworkLoader::new(),
            presence: None,
            tokens: None,
            keys,
            icon_slot,
            status,
        }
    }

    pub fn with_presence(mut self, presence: Arc<dyn PresenceSink>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn with_tokens(mut self, tokens: TokenStore) -> Self {
        self.status.streaming_enabled = true;
        self.tokens = Some(tokens);
        self
    }

    pub async fn run(
        self,
        interval: Duration,
        keys: mpsc::Receiver<u8>,
        control: mpsc::Receiver<ControlRequest>,
    ) {
        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            info!("Interrupted");
        };
        self.run_until(interval, keys, control, interrupted).await;
    }

    /// Runs until `shutdown` resolves or a `Shutdown` request arrives.
    /// `shutdown` lives across iterations, so a signal that lands mid-tick
    /// ends the loop as soon as that tick returns.
    pub async fn run_until(
        mut self,
        interval: Duration,
        mut keys: mpsc::Receiver<u8>,
        mut control: mpsc::Receiver<ControlRequest>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Polling every {}ms", interval.as_millis());

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,
                Some(request) = control.recv() => {
                    let stop = matches!(request.command, DaemonCommand::Shutdown);
                    let response = self.handle_control(request.command).await;
                    let _ = request.reply.send(response);
                    if stop {
                        info!("Shutdown requested");
                        break;
                    }
                }
                Some(index) = keys.recv() => self.handle_key(index).await,
                _ = timer.tick() => self.run_tick().await,
            }
        }
    }

    /// Fetch, render and push once. The first failure ends the tick.
    pub async fn tick(&mut self) -> Result<(), DeckError> {
        let snapshot = self.source.fetch_snapshot().await?;

        if let Some(presence) = &self.presence {
            presence.publish(&snapshot).await;
        }

        let artwork = self.load_artwork(&snapshot).await;
        let frame = self.renderer.render_frame(&snapshot, artwork.as_deref());

        self.device.push_icon(self.icon_slot, &frame.icon).await?;
        if self.device.strip_size().is_some() {
            self.device.push_status_strip(&frame.bar).await?;
        }

        debug!("Rendered {}", snapshot.display_name());
        self.status.snapshot = Some(snapshot);
        self.status.last_render = Some(Utc::now());
        Ok(())
    }

    /// A missing or broken image leaves the icon black; it does not end the tick.
    async fn load_artwork(&mut self, snapshot: &PlaybackSnapshot) -> Option<Arc<image::RgbaImage>> {
        let reference = snapshot.artwork.as_deref()?;
        match self.artwork.load(reference).await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    pub async fn run_tick(&mut self) {
        self.status.ticks += 1;
        if let Err(e) = self.tick().await {
            self.record_failure("Update", &e);
        }
    }

    pub async fn handle_key(&mut self, index: u8) {
        let Some(action) = self.keys.action(index) else {
            debug!("Key {index} is not bound");
            return;
        };

        info!("Key {index}: {action}");
        match action.media_command() {
            Some(command) => {
                if let Err(e) = self.runner.send(command).await {
                    self.record_failure(&format!("Key {index} ({action})"), &e);
                }
            }
            None => self.run_tick().await,
        }
    }

    pub async fn handle_control(&mut self, command: DaemonCommand) -> DaemonResponse {
        match command {
            DaemonCommand::Media { command } => match self.runner.send(command).await {
                Ok(()) => DaemonResponse::Ok,
                Err(e) => DaemonResponse::Error(e.to_string()),
            },
            DaemonCommand::Refresh => {
                self.status.ticks += 1;
                match self.tick().await {
                    Ok(()) => DaemonResponse::Ok,
                    Err(e) => {
                        self.record_failure("Refresh", &e);
                        DaemonResponse::Error(e.to_string())
                    }
                }
            }
            DaemonCommand::GetStatus => DaemonResponse::Status(self.status().await),
            DaemonCommand::Shutdown => DaemonResponse::Ok,
        }
    }

    pub async fn status(&self) -> StatusReport {
        let mut status = self.status.clone();
        if let Some(tokens) = &self.tokens {
            status.authenticated = tokens.is_authenticated().await;
        }
        status
    }

    fn record_failure(&mut self, context: &str, e: &DeckError) {
        self.status.failures += 1;
        self.status.last_error = Some(e.to_string());
        error!(kind = e.kind(), "{context} failed: {e}");
    }
}
