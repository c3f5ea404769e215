//! Photo file storage.
//!
//! Rows may carry a base64-encoded photo. When a new person is created the
//! decoded bytes are written under the photo root as
//! `<root>/<YYYY>/<MM>/<chf_id>_<uuid>.jpg`; the folder and file name are
//! what the photo row stores. Identities that look like paths are refused.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use uuid::Uuid;

/// Location of a stored photo, relative to the photo root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
    pub folder: String,
    pub filename: String,
}

pub struct PhotoArchive {
    root: PathBuf,
}

impl PhotoArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decode a base64 payload. Whitespace inside the payload is ignored.
    pub fn decode(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD.decode(compact)
    }

    /// Whether `chf_id` can prefix a file name without leaving its folder.
    pub fn is_safe_name(chf_id: &str) -> bool {
        !chf_id.is_empty()
            && !chf_id.contains(['/', '\\'])
            && !chf_id.contains("..")
    }

    /// Write image bytes for `chf_id`, returning where they landed.
    pub fn store(&self, chf_id: &str, taken_on: NaiveDate, bytes: &[u8]) -> Result<StoredPhoto> {
        if !Self::is_safe_name(chf_id) {
            bail!("Refusing photo file name for identity {:?}", chf_id);
        }
        let folder = taken_on.format("%Y/%m").to_string();
        let filename = format!("{}_{}.jpg", chf_id, Uuid::new_v4());
        let dir = self.root.join(&folder);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create photo folder: {}", dir.display()))?;
        let path = dir.join(&filename);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write photo: {}", path.display()))?;
        Ok(StoredPhoto { folder, filename })
    }

    /// Delete a photo written by [`store`](Self::store).
    pub fn remove(&self, stored: &StoredPhoto) -> Result<()> {
        let path = self.root.join(&stored.folder).join(&stored.filename);
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove photo: {}", path.display()))
    }
}
