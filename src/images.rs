//! Cover image download collaborator.
//!
//! The extractor hands every resolved cover image URL to an [`ImageSink`]
//! together with a destination identifier. Failures are the sink's to log;
//! they never invalidate the article.

use crate::error::ImageError;
use crate::utils::slugify_title;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Somewhere to put cover images.
pub trait ImageSink {
    /// Store the image at `url` under `destination`. Returns where it went,
    /// or `None` when the sink keeps nothing.
    async fn save(&self, url: &str, destination: &str) -> Result<Option<PathBuf>, ImageError>;
}

/// Destination identifier for an article's cover image.
pub fn destination_for(id: usize, title: &str) -> String {
    let short: String = title.chars().take(30).collect();
    let slug = slugify_title(short.trim());
    if slug.is_empty() {
        format!("article_{id}")
    } else {
        format!("article_{id}_{slug}")
    }
}

/// Downloads images over HTTP into a directory.
#[derive(Debug, Clone)]
pub struct ImageDownloader {
    client: Client,
    dir: PathBuf,
}

impl ImageDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ImageError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            dir: dir.into(),
        })
    }

    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.dir.join(format!("{destination}.jpg"))
    }
}

impl ImageSink for ImageDownloader {
    #[instrument(level = "info", skip_all, fields(%url, %destination))]
    async fn save(&self, url: &str, destination: &str) -> Result<Option<PathBuf>, ImageError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Image download rejected");
            return Err(ImageError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        let path = self.path_for(destination);
        fs::write(&path, &bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "Downloaded cover image");
        Ok(Some(path))
    }
}

/// Sink that keeps nothing, used when downloads are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardImages;

impl ImageSink for DiscardImages {
    async fn save(&self, _url: &str, _destination: &str) -> Result<Option<PathBuf>, ImageError> {
        Ok(None)
    }
}
