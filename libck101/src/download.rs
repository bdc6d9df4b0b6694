use crate::errors::ImageError;
use crate::session::Session;
use crate::DownloadRule;
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

const FALLBACK_FILE_NAME: &str = "image.jpg";

/// Outcome of one image download, only used for reporting.
#[derive(Debug)]
pub enum ImageResult {
    Saved(PathBuf),
    Skipped(String),
    Failed(ImageError),
}

impl From<Result<PathBuf, ImageError>> for ImageResult {
    fn from(res: Result<PathBuf, ImageError>) -> Self {
        match res {
            Ok(path) => ImageResult::Saved(path),
            Err(e) if e.is_skip() => ImageResult::Skipped(e.to_string()),
            Err(e) => ImageResult::Failed(e),
        }
    }
}

impl ImageResult {
    pub fn log_line(&self, link: &str) -> String {
        match self {
            ImageResult::Saved(_) => format!("{link} [ok]"),
            ImageResult::Skipped(reason) => format!("{link} [skip]: {reason}"),
            ImageResult::Failed(err) => format!("{link} [fail]: {err}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageFetcher {
    session: Arc<Session>,
    rule: DownloadRule,
}

impl ImageFetcher {
    pub fn new(session: Arc<Session>, rule: DownloadRule) -> Self {
        Self { session, rule }
    }

    /// Downloads one image and stores it as JPEG at `destination`, replacing any
    /// existing file. Images below the size gate are never written.
    ///
    /// Cancellation is only observed before the write starts, so a cancelled
    /// download never leaves a truncated file behind.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn fetch(
        &self,
        link: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ImageError> {
        let jpeg = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImageError::Cancelled),
            res = self.fetch_and_encode(link) => res?,
        };

        write_file(destination, &jpeg).await?;
        tracing::debug!(
            "Download completed for {}, file @ {}",
            link,
            destination.to_string_lossy()
        );
        Ok(destination.to_path_buf())
    }

    async fn fetch_and_encode(&self, link: &str) -> Result<Vec<u8>, ImageError> {
        let bytes = self.get_bytes(link).await?;

        let rule = self.rule.clone();
        match tokio::task::spawn_blocking(move || {
            reencode(&bytes, rule.min_width, rule.min_height, rule.jpeg_quality)
        })
        .await
        {
            Ok(res) => res,
            Err(e) => {
                tracing::debug!("Encoder thread panicked\nError : {}", e);
                Err(ImageError::Encode(e.to_string()))
            }
        }
    }

    async fn get_bytes(&self, link: &str) -> Result<Vec<u8>, ImageError> {
        if let Err(e) = self.session.authenticate().await {
            tracing::warn!("Fetching images without login. {}", e);
        }

        let response = match self.session.client().get(link).send().await {
            Err(e) => {
                tracing::debug!("Error downloading image from {}\nError : {}", link, e);
                return Err(ImageError::NetworkError(e.to_string()));
            }
            Ok(r) => {
                if !r.status().is_success() {
                    tracing::debug!("Error status code received : {} |{}|", r.status(), link);
                    return Err(ImageError::ErrorStatusCode {
                        status_code: r.status().to_string(),
                        url: link.to_string(),
                    });
                }
                r
            }
        };

        match response.bytes().await {
            Ok(b) => Ok(b.to_vec()),
            Err(e) => {
                tracing::debug!("Error reading image body from {}\nError : {}", link, e);
                Err(ImageError::NetworkError(e.to_string()))
            }
        }
    }
}

/// Decodes any supported format, applies the size gate and encodes the pixels as JPEG.
/// Alpha is dropped. Source bytes are never kept, even when they already are JPEG.
pub fn reencode(
    bytes: &[u8],
    min_width: u32,
    min_height: u32,
    quality: u8,
) -> Result<Vec<u8>, ImageError> {
    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    let (width, height) = img.dimensions();
    if width < min_width || height < min_height {
        return Err(ImageError::TooSmall { width, height });
    }

    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(jpeg)
}

async fn write_file(destination: &Path, content: &[u8]) -> Result<(), ImageError> {
    let mut dest_file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(destination)
        .await
    {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(
                "Error opening/creating file {}\nError : {} | {}",
                destination.to_string_lossy(),
                e,
                e.kind()
            );
            return Err(ImageError::FileOperationError {
                file_name: destination.to_string_lossy().to_string(),
                message: format!("{} | {}", e, e.kind()),
            });
        }
    };

    if let Err(e) = dest_file.write_all(content).await {
        tracing::debug!(
            "Error writing to file : {}\nError : {}",
            destination.to_string_lossy(),
            e
        );
        return Err(ImageError::FileOperationError {
            file_name: destination.to_string_lossy().to_string(),
            message: format!("{} | {}", e, e.kind()),
        });
    }
    // tokio::fs::File writes in the background, the data is only on disk once flushed.
    if let Err(e) = dest_file.flush().await {
        tracing::debug!(
            "Error flushing file : {}\nError : {}",
            destination.to_string_lossy(),
            e
        );
        return Err(ImageError::FileOperationError {
            file_name: destination.to_string_lossy().to_string(),
            message: format!("{} | {}", e, e.kind()),
        });
    }
    Ok(())
}

/// Last non empty path segment of the link, query and fragment excluded.
/// Two links sharing it map to the same file.
pub fn file_name_from_url(link: &str) -> String {
    let name = match Url::parse(link) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string()),
        Err(_) => link
            .split(['?', '#'])
            .next()
            .and_then(|l| l.trim_end_matches('/').rsplit('/').next())
            .map(|s| s.to_string()),
    };
    match name {
        Some(n) if !n.is_empty() => n,
        _ => FALLBACK_FILE_NAME.to_string(),
    }
}
