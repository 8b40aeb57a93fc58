mod cli;
mod command;
mod config;
mod daemon;
mod device;
mod error;
mod ipc;
mod metadata;
mod models;
mod presence;
mod render;
mod spotify;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{App, Cli, Commands, DaemonCommands};
use models::MediaCommand;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let app = App::new()?;

    match cli.command {
        Commands::PlayPause => {
            app.media(MediaCommand::PlayPause)?;
        }
        Commands::Next => {
            app.media(MediaCommand::Next)?;
        }
        Commands::Previous => {
            app.media(MediaCommand::Previous)?;
        }
        Commands::Refresh => {
            app.refresh()?;
        }
        Commands::Status => {
            app.status()?;
        }
        Commands::Devices => {
            app.devices()?;
        }
        Commands::Login => {
            app.login()?;
        }
        Commands::Config => {
            app.show_config()?;
        }
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => {
                app.daemon_start()?;
            }
            DaemonCommands::Stop => {
                app.daemon_stop()?;
            }
            DaemonCommands::Status => {
                app.daemon_status()?;
            }
            DaemonCommands::Run => {
                app.daemon_run()?;
            }
        },
    }

    Ok(())
}
