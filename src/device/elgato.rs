use async_trait::async_trait;
use elgato_streamdeck::asynchronous::AsyncStreamDeck;
use elgato_streamdeck::images::{ImageRect, convert_image_with_format_async};
use elgato_streamdeck::info::Kind;
use elgato_streamdeck::{DeviceStateUpdate, list_devices, new_hidapi};
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{DeckSession, DeviceSummary, SessionGuard};
use crate::config::DeviceConfig;
use crate::error::DeckError;
use crate::models::{PixelBuffer, PixelFormat};

/// Input poll rate for the key reader, in Hz
const POLL_RATE: f32 = 50.0;
const KEY_CHANNEL_SIZE: usize = 32;

pub struct StreamDeckSession {
    device: Arc<AsyncStreamDeck>,
    kind: Kind,
    serial: String,
    reader: JoinHandle<()>,
    _guard: SessionGuard,
}

pub fn list() -> Result<Vec<DeviceSummary>, DeckError> {
    let hid = new_hidapi().map_err(|e| DeckError::Push(format!("Failed to initialise HID: {e}")))?;
    Ok(list_devices(&hid)
        .into_iter()
        .map(|(kind, serial)| DeviceSummary {
            kind: format!("{kind:?}"),
            serial,
        })
        .collect())
}

/// Opens the configured device, or the first one found, and starts
/// forwarding key releases to the returned channel.
pub async fn open(
    config: &DeviceConfig,
) -> Result<(StreamDeckSession, mpsc::Receiver<u8>), DeckError> {
    let guard = SessionGuard::acquire()?;

    let hid = new_hidapi().map_err(|e| DeckError::Push(format!("Failed to initialise HID: {e}")))?;
    let devices = list_devices(&hid);

    let (kind, serial) = match &config.serial {
        Some(wanted) => devices.into_iter().find(|(_, serial)| serial == wanted),
        None => devices.into_iter().next(),
    }
    .ok_or(DeckError::NoDevice)?;

    let device = Arc::new(AsyncStreamDeck::connect(&hid, kind, &serial)?);
    device.set_brightness(config.brightness.min(100)).await?;
    device.clear_all_button_images().await?;
    device.flush().await?;

    info!("Opened {kind:?} ({serial})");

    let (tx, rx) = mpsc::channel(KEY_CHANNEL_SIZE);
    let reader = tokio::spawn(read_keys(Arc::clone(&device), tx));

    Ok((
        StreamDeckSession {
            device,
            kind,
            serial,
            reader,
            _guard: guard,
        },
        rx,
    ))
}

async fn read_keys(device: Arc<AsyncStreamDeck>, tx: mpsc::Sender<u8>) {
    let reader = device.get_reader();
    loop {
        match reader.read(POLL_RATE).await {
            Ok(updates) => {
                for update in updates {
                    if let DeviceStateUpdate::ButtonUp(key) = update {
                        debug!("Key {key} released");
                        if tx.send(key).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Stopped reading keys: {e}");
                return;
            }
        }
    }
}

/// How a kind's LCD takes a full status strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StripWrite {
    /// Positioned region write; only the Stream Deck + accepts it.
    Region,
    /// Whole-screen fill, encoded in the kind's LCD image format.
    Fill,
}

fn strip_write(kind: Kind) -> Option<StripWrite> {
    match kind {
        Kind::Plus => Some(StripWrite::Region),
        _ if kind.lcd_image_format().is_some() => Some(StripWrite::Fill),
        _ => None,
    }
}

/// Buffers arrive in whatever order the renderer was configured for; the
/// driver always wants RGBA.
fn to_image(pixels: &PixelBuffer) -> Result<DynamicImage, DeckError> {
    let rgba = pixels.clone().into_format(PixelFormat::Rgba);
    RgbaImage::from_raw(rgba.width, rgba.height, rgba.data)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| DeckError::Push("pixel buffer does not match its dimensions".to_string()))
}

#[async_trait]
impl DeckSession for StreamDeckSession {
    fn describe(&self) -> String {
        format!("{:?} ({})", self.kind, self.serial)
    }

    fn icon_size(&self) -> (u32, u32) {
        let (w, h) = self.kind.key_image_format().size;
        (w as u32, h as u32)
    }

    fn strip_size(&self) -> Option<(u32, u32)> {
        strip_write(self.kind)?;
        self.kind
            .lcd_strip_size()
            .map(|(w, h)| (w as u32, h as u32))
    }

    async fn push_icon(&self, slot: u8, pixels: &PixelBuffer) -> Result<(), DeckError> {
        if slot >= self.kind.key_count() {
            return Err(DeckError::Push(format!("no key {slot} on {:?}", self.kind)));
        }
        self.device.set_button_image(slot, to_image(pixels)?).await?;
        self.device.flush().await?;
        Ok(())
    }

    async fn push_status_strip(&self, pixels: &PixelBuffer) -> Result<(), DeckError> {
        let image = to_image(pixels)?;
        match strip_write(self.kind) {
            Some(StripWrite::Region) => {
                let rect = ImageRect::from_image(image)
                    .map_err(|e| DeckError::Push(format!("Failed to encode strip image: {e}")))?;
                self.device.write_lcd(0, 0, &rect).await?;
            }
            Some(StripWrite::Fill) => {
                let format = self
                    .kind
                    .lcd_image_format()
                    .ok_or_else(|| DeckError::Push(format!("{:?} has no LCD format", self.kind)))?;
                let data = convert_image_with_format_async(format, image)?;
                self.device.write_lcd_fill(&data).await?;
            }
            None => {
                return Err(DeckError::Push(format!("{:?} has no LCD strip", self.kind)));
            }
        }
        Ok(())
    }
}

impl Drop for StreamDeckSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
