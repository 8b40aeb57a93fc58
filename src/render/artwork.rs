use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::error::DeckError;

/// Loads album art and remembers the last one, so an unchanged artwork
/// reference costs nothing on the next tick.
#[derive(Default)]
pub struct ArtworkLoader {
    http: reqwest::Client,
    last: Option<(String, Arc<RgbaImage>)>,
}

impl ArtworkLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&mut self, reference: &str) -> Result<Arc<RgbaImage>, DeckError> {
        if let Some((cached, image)) = &self.last {
            if cached == reference {
                return Ok(Arc::clone(image));
            }
        }

        debug!("Loading artwork from {reference}");
        let bytes = match self.fetch(reference).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.last = None;
                return Err(e);
            }
        };

        let image = image::load_from_memory(&bytes)
            .map_err(|e| DeckError::Render(format!("Failed to decode {reference}: {e}")))?
            .to_rgba8();

        let image = Arc::new(image);
        self.last = Some((reference.to_string(), Arc::clone(&image)));
        Ok(image)
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, DeckError> {
        match Url::parse(reference) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| DeckError::Render(format!("Failed to download {reference}: {e}")))?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| DeckError::Render(format!("Failed to download {reference}: {e}")))?;
                Ok(bytes.to_vec())
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| DeckError::Render(format!("Invalid file URL: {reference}")))?;
                read_file(path).await
            }
            Ok(url) => Err(DeckError::Render(format!(
                "Unsupported artwork scheme: {}",
                url.scheme()
            ))),
            // Not a URL at all: treat as a plain path
            Err(_) => read_file(PathBuf::from(reference)).await,
        }
    }
}

async fn read_file(path: PathBuf) -> Result<Vec<u8>, DeckError> {
    tokio::fs::read(&path)
        .await
        .map_err(|e| DeckError::Render(format!("Failed to read {}: {e}", path.display())))
}
