use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{KeyAction, PixelFormat};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: home.join(".deckplay"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Media-control executable
    pub executable: String,
    /// Restrict commands to one MPRIS player (passed as `--player`)
    #[serde(default)]
    pub player: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            executable: "playerctl".to_string(),
            player: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Open this serial instead of the first device found
    #[serde(default)]
    pub serial: Option<String>,
    pub brightness: u8,
    pub icon_slot: u8,
    /// Channel order of the rendered icon buffer. This only labels the
    /// buffer handed to the session; the Stream Deck driver normalises every
    /// buffer to RGBA, so it does not change what the device shows.
    pub icon_format: PixelFormat,
    /// Same as `icon_format`, for the status strip buffer.
    pub strip_format: PixelFormat,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            brightness: 60,
            icon_slot: 0,
            icon_format: PixelFormat::Rgba,
            strip_format: PixelFormat::Rgba,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    pub interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub index: u8,
    pub action: KeyAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    pub bindings: Vec<KeyBinding>,
}

impl Default for KeysConfig {
    fn default() -> Self {
        let bindings = [
            (0, KeyAction::PlayPause),
            (1, KeyAction::Next),
            (2, KeyAction::Refresh),
            (8, KeyAction::Previous),
            (9, KeyAction::Next),
        ]
        .into_iter()
        .map(|(index, action)| KeyBinding { index, action })
        .collect();

        Self { bindings }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub enabled: bool,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub port: u16,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            client_secret: String::new(),
            port: 8888,
        }
    }
}

impl SpotifyConfig {
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.port)
    }

    pub fn login_url(&self) -> String {
        format!("http://127.0.0.1:{}/login", self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresenceConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub auto_start: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { auto_start: true }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deckplay")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "Failed to serialize config")
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.storage.path
    }

    pub fn socket_path(&self) -> PathBuf {
        self.storage.path.join("deckplay.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.storage.path.join("deckplay.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.storage.path.join("deckplay.log")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.data_dir()).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                self.data_dir().display()
            )
        })?;
        Ok(())
    }
}
