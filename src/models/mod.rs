use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlaybackSnapshot {
    pub artist: String,
    pub track: String,
    pub artwork: Option<String>,
    pub progress_ms: u64,
    pub duration_ms: Option<u64>,
}

impl PlaybackSnapshot {
    pub fn new(artist: String, track: String, artwork: Option<String>) -> Self {
        Self {
            artist,
            track,
            artwork: artwork.filter(|a| !a.is_empty()),
            progress_ms: 0,
            duration_ms: None,
        }
    }

    pub fn with_progress(mut self, progress_ms: u64, duration_ms: Option<u64>) -> Self {
        self.progress_ms = progress_ms;
        self.duration_ms = duration_ms.filter(|d| *d > 0);
        self
    }

    /// Fraction of the track already played, clamped to `0.0..=1.0`.
    ///
    /// `None` when the duration is unknown.
    pub fn progress_ratio(&self) -> Option<f64> {
        let duration = self.duration_ms?;
        Some((self.progress_ms as f64 / duration as f64).clamp(0.0, 1.0))
    }

    pub fn display_name(&self) -> String {
        match (self.artist.is_empty(), self.track.is_empty()) {
            (true, true) => "Nothing playing".to_string(),
            (true, false) => self.track.clone(),
            (false, true) => self.artist.clone(),
            (false, false) => format!("{} - {}", self.artist, self.track),
        }
    }

    pub fn format_progress(&self) -> Option<String> {
        let duration = self.duration_ms?;
        Some(format!(
            "{} / {}",
            format_ms(self.progress_ms),
            format_ms(duration)
        ))
    }
}

pub fn format_ms(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Channel order of a raw 4-byte-per-pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgba,
    Bgra,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba,
            data,
        }
    }

    /// Reorders channels in place. Swapping R and B is its own inverse, so
    /// any conversion between the two layouts is the same operation.
    pub fn into_format(mut self, format: PixelFormat) -> Self {
        if self.format != format {
            for px in self.data.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
            self.format = format;
        }
        self
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub icon: PixelBuffer,
    pub bar: PixelBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAction {
    PlayPause,
    Next,
    Previous,
    Refresh,
}

impl KeyAction {
    /// The player command this key sends, if any. `Refresh` only redraws.
    pub fn media_command(self) -> Option<MediaCommand> {
        match self {
            KeyAction::PlayPause => Some(MediaCommand::PlayPause),
            KeyAction::Next => Some(MediaCommand::Next),
            KeyAction::Previous => Some(MediaCommand::Previous),
            KeyAction::Refresh => None,
        }
    }
}

impl std::fmt::Display for KeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyAction::PlayPause => write!(f, "play-pause"),
            KeyAction::Next => write!(f, "next"),
            KeyAction::Previous => write!(f, "previous"),
            KeyAction::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaCommand {
    PlayPause,
    Next,
    Previous,
}

impl MediaCommand {
    pub fn subcommand(self) -> &'static str {
        match self {
            MediaCommand::PlayPause => "play-pause",
            MediaCommand::Next => "next",
            MediaCommand::Previous => "previous",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusReport {
    pub device: String,
    pub snapshot: Option<PlaybackSnapshot>,
    pub last_render: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub failures: u64,
    pub last_error: Option<String>,
    pub streaming_enabled: bool,
    pub authenticated: bool,
}
