//! Audio resources: local clips and reply audio served by the dialogue
//! service.

use std::path::PathBuf;
use std::time::Duration;

use riddlefish_types::FishError;
use tracing::debug;

/// Where a clip lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Path(PathBuf),
    Url(String),
}

impl AudioSource {
    /// Classify a locator: `http://` and `https://` are URLs, everything
    /// else is a filesystem path.
    pub fn parse(locator: &str) -> Self {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            AudioSource::Url(locator.to_string())
        } else {
            AudioSource::Path(PathBuf::from(locator))
        }
    }
}

/// Loads clip bytes from either kind of [`AudioSource`].
#[derive(Clone)]
pub struct AudioFetcher {
    client: reqwest::Client,
}

/// Timeout for downloading one reply clip.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

impl AudioFetcher {
    /// # Errors
    ///
    /// Returns [`FishError::Audio`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, FishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FishError::Audio(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, source: &AudioSource) -> Result<Vec<u8>, FishError> {
        match source {
            AudioSource::Path(path) => tokio::fs::read(path)
                .await
                .map_err(|e| FishError::Audio(format!("{}: {e}", path.display()))),
            AudioSource::Url(url) => {
                let bytes = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| FishError::Audio(format!("{url}: {e}")))?
                    .bytes()
                    .await
                    .map_err(|e| FishError::Audio(format!("{url}: {e}")))?;
                debug!(url = %url, len = bytes.len(), "reply audio downloaded");
                Ok(bytes.to_vec())
            }
        }
    }
}
