//! Id-addressed temp-file store for uploads and their text sidecars.
//!
//! One flat directory holds `<fileId>` (the uploaded PDF, deleted once
//! extracted) and `<fileId>.txt` (the extracted text). There is no
//! in-memory registry: a record exists exactly when its files do, so a
//! server restart loses nothing and leaks nothing beyond the directory
//! contents.
//!
//! Known race, kept on purpose: a cleanup racing an in-flight analyze
//! for the same id makes the analyze read fail with not-found. Ids are
//! generated per upload, so concurrent uploads never collide.

use crate::error::{Error, Result};
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Open (and create if missing) the store directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generate a collision-resistant file id independent of the
    /// original filename: epoch millis plus a random component.
    pub fn generate_file_id() -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let random: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
        format!("{}-{:09}.pdf", millis, random)
    }

    pub fn pdf_path(&self, file_id: &str) -> PathBuf {
        self.dir.join(file_id)
    }

    pub fn text_path(&self, file_id: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", file_id))
    }

    /// Persist uploaded PDF bytes under `file_id`, returning the path.
    pub async fn save_upload(&self, file_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.pdf_path(file_id);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Persist extracted text as the `<fileId>.txt` sidecar.
    pub async fn save_text(&self, file_id: &str, text: &str) -> Result<()> {
        tokio::fs::write(self.text_path(file_id), text).await?;
        Ok(())
    }

    /// Read the text sidecar. A missing sidecar surfaces as a
    /// not-found storage error (see `Error::is_not_found`).
    pub async fn load_text(&self, file_id: &str) -> Result<String> {
        check_file_id(file_id)?;
        Ok(tokio::fs::read_to_string(self.text_path(file_id)).await?)
    }

    /// Best-effort removal of a leftover upload on a failed request.
    /// Never fails: an error here must not mask the primary one.
    pub async fn discard_upload(&self, file_id: &str) {
        let path = self.pdf_path(file_id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != ErrorKind::NotFound {
                eprintln!("[Store] Failed to discard {}: {}", path.display(), e);
            }
        }
    }

    /// Delete both files for `file_id`. Each deletion is independently
    /// best-effort; absence of either file is not an error.
    pub async fn delete(&self, file_id: &str) -> Result<()> {
        check_file_id(file_id)?;
        remove_if_exists(&self.pdf_path(file_id)).await?;
        remove_if_exists(&self.text_path(file_id)).await?;
        Ok(())
    }

    /// Delete every file in the store directory (bulk reset).
    pub async fn clear(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

/// Client-supplied ids address files inside the store directory only.
fn check_file_id(file_id: &str) -> Result<()> {
    if file_id.is_empty()
        || file_id.contains('/')
        || file_id.contains('\\')
        || file_id.contains("..")
    {
        return Err(Error::InvalidUpload(format!("invalid file id: {:?}", file_id)));
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
