use clap::{Parser, Subcommand};

mod commands;
pub use commands::*;

#[derive(Parser)]
#[command(name = "deckplay")]
#[command(about = "Mirror now-playing media state onto a Stream Deck and control playback from its keys")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Toggle play/pause
    #[command(name = "play-pause")]
    PlayPause,

    /// Skip to the next track
    Next,

    /// Go to the previous track
    #[command(name = "prev")]
    Previous,

    /// Redraw the Stream Deck now
    Refresh,

    /// Show what the daemon last rendered
    Status,

    /// List connected Stream Decks
    Devices,

    /// Show where to log in to Spotify
    Login,

    /// Print the effective configuration
    Config,

    /// Daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Run daemon in foreground
    Run,
}
