//! Evidence image files

use std::path::{Path, PathBuf};

use chrono::Utc;
use image::RgbImage;
use tracing::debug;
use uuid::Uuid;

use crate::StorageError;

const JPEG_QUALITY: u8 = 85;

/// Writes evidence JPEGs into one directory and hands back their public path
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    url_prefix: String,
}

impl ImageStore {
    /// Create the store, making `dir` if needed
    pub async fn new(dir: impl AsRef<Path>, url_prefix: impl Into<String>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::ImageError(format!("{}: {}", dir.display(), e)))?;

        Ok(Self {
            dir,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode and write one image, returning `<url_prefix>/<file name>`
    pub async fn save(&self, device_id: &str, image: &RgbImage) -> Result<String, StorageError> {
        let bytes = evidence::encode_jpeg(image, JPEG_QUALITY)
            .map_err(|e| StorageError::ImageError(e.to_string()))?;

        let file_name = Self::file_name(device_id);
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::ImageError(format!("{}: {}", path.display(), e)))?;

        debug!("Wrote evidence image {}", path.display());
        Ok(format!("{}/{}", self.url_prefix, file_name))
    }

    /// `<device>_<unix seconds>_<6 hex>.jpg` with the device id made file-safe
    fn file_name(device_id: &str) -> String {
        let device: String = device_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}.jpg", device, Utc::now().timestamp(), &suffix[..6])
    }
}
