use thiserror::Error;

/// Failures that can end a single tick or key handler.
///
/// Everything except [`DeckError::NoDevice`] is caught at the tick boundary and
/// logged; the next timer tick acts as the retry.
#[derive(Debug, Error)]
pub enum DeckError {
    /// The media-control executable failed or wrote to stderr
    #[error("Command failed: {0}")]
    Command(String),

    /// No access token is available for the streaming service
    #[error("Not authenticated: {0}")]
    Auth(String),

    /// No control device is connected
    #[error("No Stream Deck found")]
    NoDevice,

    /// Artwork could not be read or decoded
    #[error("Render failed: {0}")]
    Render(String),

    /// Writing to the device failed
    #[error("Device write failed: {0}")]
    Push(String),

    /// The streaming service answered with an error
    #[error("Streaming service error: {0}")]
    Service(String),
}

impl DeckError {
    /// Short tag used in log lines and status counters.
    pub fn kind(&self) -> &'static str {
        match self {
            DeckError::Command(_) => "command",
            DeckError::Auth(_) => "auth",
            DeckError::NoDevice => "no-device",
            DeckError::Render(_) => "render",
            DeckError::Push(_) => "push",
            DeckError::Service(_) => "service",
        }
    }
}

impl From<reqwest::Error> for DeckError {
    fn from(e: reqwest::Error) -> Self {
        DeckError::Service(e.to_string())
    }
}

impl From<elgato_streamdeck::StreamDeckError> for DeckError {
    fn from(e: elgato_streamdeck::StreamDeckError) -> Self {
        DeckError::Push(e.to_string())
    }
}
