mod elgato;

pub use elgato::{StreamDeckSession, list, open};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::DeckError;
use crate::models::PixelBuffer;

/// The open control device, as the poll loop sees it.
///
/// Pushes are awaited one at a time by the caller; implementations do not
/// queue.
#[async_trait]
pub trait DeckSession: Send + Sync {
    /// Human-readable model and serial.
    fn describe(&self) -> String;

    fn icon_size(&self) -> (u32, u32);

    /// `None` for models without an LCD strip.
    fn strip_size(&self) -> Option<(u32, u32)>;

    async fn push_icon(&self, slot: u8, pixels: &PixelBuffer) -> Result<(), DeckError>;

    async fn push_status_strip(&self, pixels: &PixelBuffer) -> Result<(), DeckError>;
}

#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub kind: String,
    pub serial: String,
}

static SESSION_OPEN: AtomicBool = AtomicBool::new(false);

/// Held by the one open session; a second `acquire` fails until it drops.
#[derive(Debug)]
pub struct SessionGuard(());

impl SessionGuard {
    pub fn acquire() -> Result<Self, DeckError> {
        SESSION_OPEN
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| DeckError::Push("a device session is already open".to_string()))?;
        Ok(Self(()))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        SESSION_OPEN.store(false, Ordering::SeqCst);
    }
}
