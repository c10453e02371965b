//! Directory-backed blob store
//!
//! Every blob is one file `{id}.zip` directly under the store root. The
//! archive holds a single entry `{id}.{ext}` with the original image bytes.
//! Operations touch exactly one file each, so no locking is needed between
//! request handlers and the sweeper.

use crate::archive;
use crate::error::{ArchiveError, Result, StoreError};
use crate::ident::{self, ID_LENGTH};
use crate::types::{BlobListing, StoreStats, StoredImage};
use crate::validate::{self, ImageCheck};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const ARCHIVE_EXTENSION: &str = "zip";
const TEMP_SUFFIX: &str = "tmp";

/// How many fresh identifiers `put` tries before giving up on collisions
const MAX_ID_ATTEMPTS: usize = 8;

/// Map an image extension to the Content-Type served for it.
///
/// `jpg` is the only alias; everything else passes through as `image/{ext}`.
pub fn mime_for_extension(ext: &str) -> String {
    let ext = ext.to_ascii_lowercase();
    if ext == "jpg" {
        "image/jpeg".to_string()
    } else {
        format!("image/{}", ext)
    }
}

/// Image store rooted at a single directory
pub struct BlobStore {
    root: PathBuf,
    allowed_extensions: BTreeSet<String>,
}

impl BlobStore {
    /// Create a store over `root` accepting the given (case-insensitive) extensions
    pub fn new<I, S>(root: PathBuf, allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            root,
            allowed_extensions,
        }
    }

    /// Ensure the store directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, "Blob store initialized");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn allowed_extensions(&self) -> impl Iterator<Item = &str> {
        self.allowed_extensions.iter().map(String::as_str)
    }

    /// Path of the archive for `id`
    pub fn archive_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, ARCHIVE_EXTENSION))
    }

    /// Lowercased extension of `filename` if it is on the allow-list.
    ///
    /// The extension is whatever follows the final `.`.
    pub fn extension_of(&self, filename: &str) -> Result<String> {
        let (_, ext) = filename
            .rsplit_once('.')
            .ok_or(StoreError::MissingExtension)?;
        let ext = ext.to_ascii_lowercase();

        if self.allowed_extensions.contains(&ext) {
            Ok(ext)
        } else {
            Err(StoreError::UnsupportedExtension(ext))
        }
    }

    /// Validate, archive, and persist an upload. Returns the new identifier.
    ///
    /// Nothing is written unless the bytes decode as an image.
    pub async fn put(&self, original_filename: &str, data: Vec<u8>) -> Result<String> {
        let ext = self.extension_of(original_filename)?;

        let (check, data) = tokio::task::spawn_blocking(move || {
            let check = validate::validate(&data);
            (check, data)
        })
        .await?;
        if let ImageCheck::Invalid(reason) = check {
            debug!(filename = %original_filename, reason = %reason, "Rejected upload");
            return Err(StoreError::InvalidImage(reason));
        }

        let id = self.fresh_identifier().await?;
        let entry_name = format!("{}.{}", id, ext);
        let size = data.len();
        let packed =
            tokio::task::spawn_blocking(move || archive::pack(&entry_name, &data)).await??;

        self.write_archive(&id, &packed).await?;

        info!(id = %id, ext = %ext, size, archived = packed.len(), "Stored image");
        Ok(id)
    }

    /// Read an image back out of its archive
    pub async fn get(&self, id: &str) -> Result<StoredImage> {
        if !ident::is_valid_identifier(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let bytes = match fs::read(self.archive_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let entry = tokio::task::spawn_blocking(move || archive::unpack(&bytes)).await??;

        let (_, ext) = entry.name.rsplit_once('.').ok_or_else(|| {
            ArchiveError::Corrupt(format!("entry '{}' has no extension", entry.name))
        })?;
        let mime_type = mime_for_extension(ext);

        debug!(id = %id, entry = %entry.name, mime_type = %mime_type, "Read image");
        Ok(StoredImage {
            mime_type,
            data: entry.data,
        })
    }

    /// All `*.zip` archives in the store with their modification times.
    ///
    /// Only archives named by a valid identifier are listed, so every listing
    /// can be passed to [`BlobStore::delete`]. Entries whose metadata cannot be
    /// read are logged and skipped.
    pub async fn list(&self) -> Result<Vec<BlobListing>> {
        let mut listings = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !ident::is_valid_identifier(id) {
                debug!(path = ?path, "Skipping archive not named by an identifier");
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to stat archive");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = match metadata.modified() {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) => {
                    warn!(path = ?path, error = %e, "Archive has no modification time");
                    continue;
                }
            };

            listings.push(BlobListing {
                id: id.to_string(),
                size: metadata.len(),
                modified,
            });
        }

        Ok(listings)
    }

    /// Remove the archive for `id`; absent archives are not an error
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !ident::is_valid_identifier(id) {
            return Ok(());
        }

        match fs::remove_file(self.archive_path(id)).await {
            Ok(()) => {
                debug!(id = %id, "Deleted archive");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Count and total size of stored archives
    pub async fn stats(&self) -> Result<StoreStats> {
        let listings = self.list().await?;
        Ok(StoreStats {
            entries: listings.len(),
            total_size: listings.iter().map(|l| l.size).sum(),
        })
    }

    async fn fresh_identifier(&self) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = ident::generate(ID_LENGTH);
            if !fs::try_exists(self.archive_path(&id)).await? {
                return Ok(id);
            }
            warn!(id = %id, "Identifier collision, regenerating");
        }

        Err(StoreError::Internal(format!(
            "no free identifier after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }

    /// Write to a temporary sibling, then rename into place
    async fn write_archive(&self, id: &str, packed: &[u8]) -> Result<()> {
        let final_path = self.archive_path(id);
        let temp_path = self
            .root
            .join(format!("{}.{}.{}", id, ARCHIVE_EXTENSION, TEMP_SUFFIX));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(packed).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &final_path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = ?temp_path, error = %cleanup, "Failed to remove temp archive");
                }
            }
            return Err(e.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::tempdir;

    const DEFAULT_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

    fn test_store(root: PathBuf) -> BlobStore {
        BlobStore::new(root, DEFAULT_EXTENSIONS)
    }

    fn image_bytes(seed: u8, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(3, 3, |x, y| Rgb([seed, x as u8 * 40, y as u8 * 40]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("jpg"), "image/jpeg");
        assert_eq!(mime_for_extension("JPG"), "image/jpeg");
        assert_eq!(mime_for_extension("jpeg"), "image/jpeg");
        assert_eq!(mime_for_extension("png"), "image/png");
        assert_eq!(mime_for_extension("webp"), "image/webp");
    }

    #[test]
    fn test_extension_of() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());

        assert_eq!(store.extension_of("cat.png").unwrap(), "png");
        assert_eq!(store.extension_of("CAT.JPEG").unwrap(), "jpeg");
        assert_eq!(store.extension_of("archive.tar.gif").unwrap(), "gif");
        assert!(matches!(
            store.extension_of("noextension"),
            Err(StoreError::MissingExtension)
        ));
        assert!(matches!(
            store.extension_of("bitmap.bmp"),
            Err(StoreError::UnsupportedExtension(ext)) if ext == "bmp"
        ));
        assert!(matches!(
            store.extension_of("trailingdot."),
            Err(StoreError::UnsupportedExtension(ext)) if ext.is_empty()
        ));
    }

    #[test]
    fn test_allow_list_is_normalized() {
        let store = BlobStore::new(PathBuf::from("/unused"), [" PNG ", ".Jpg", ""]);
        let allowed: Vec<&str> = store.allowed_extensions().collect();
        assert_eq!(allowed, vec!["jpg", "png"]);
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();

        let png = image_bytes(1, ImageFormat::Png);
        let id = store.put("holiday.PNG", png.clone()).await.unwrap();

        assert_eq!(id.len(), ID_LENGTH);
        assert!(store.archive_path(&id).exists());

        let image = store.get(&id).await.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, png);
    }

    #[tokio::test]
    async fn test_archive_entry_is_named_after_identifier() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();

        let id = store
            .put("photo.jpg", image_bytes(2, ImageFormat::Jpeg))
            .await
            .unwrap();

        let raw = std::fs::read(store.archive_path(&id)).unwrap();
        let entry = archive::unpack(&raw).unwrap();
        assert_eq!(entry.name, format!("{}.jpg", id));

        let image = store.get(&id).await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_put_invalid_image_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();

        let result = store.put("evil.png", b"<?php echo 1; ?>".to_vec()).await;

        assert!(matches!(result, Err(StoreError::InvalidImage(_))));
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_put_rejects_filenames() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();
        let png = image_bytes(3, ImageFormat::Png);

        let result = store.put("no_extension", png.clone()).await;
        assert!(matches!(result, Err(StoreError::MissingExtension)));

        let result = store.put("picture.bmp", png).await;
        assert!(matches!(result, Err(StoreError::UnsupportedExtension(_))));

        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();

        let result = store.get("ZZZZZZZZ").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_rejects_path_like_identifiers() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();

        assert!(matches!(store.get("..").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get("a/b").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_zero_length_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();
        std::fs::write(store.archive_path("Empty123"), b"").unwrap();

        let err = store.get("Empty123").await.unwrap_err();
        assert!(err.is_corrupt(), "{}", err);
    }

    #[tokio::test]
    async fn test_get_non_archive_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();
        std::fs::write(store.archive_path("Garbage1"), b"definitely not a zip").unwrap();

        let err = store.get("Garbage1").await.unwrap_err();
        assert!(err.is_corrupt(), "{}", err);
    }

    #[tokio::test]
    async fn test_get_entry_without_extension_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();
        let packed = archive::pack("README", b"plain").unwrap();
        std::fs::write(store.archive_path("NoExt123"), packed).unwrap();

        let err = store.get("NoExt123").await.unwrap_err();
        assert!(matches!(err, StoreError::Archive(ArchiveError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();

        let a = store.put("a.png", image_bytes(4, ImageFormat::Png)).await.unwrap();
        let b = store.put("b.png", image_bytes(5, ImageFormat::Png)).await.unwrap();
        // Stray files that are not archives
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("Partial1.zip.tmp"), b"half").unwrap();
        std::fs::write(dir.path().join("old-upload.zip"), b"foreign").unwrap();

        let mut ids: Vec<String> = store.list().await.unwrap().into_iter().map(|l| l.id).collect();
        ids.sort();
        let mut expected = vec![a.clone(), b.clone()];
        expected.sort();
        assert_eq!(ids, expected);

        store.delete(&a).await.unwrap();
        assert!(matches!(store.get(&a).await, Err(StoreError::NotFound(_))));
        // Second delete of the same blob is a no-op
        store.delete(&a).await.unwrap();
        store.delete("NeverWas").await.unwrap();

        let listings = store.list().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, b);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path().to_path_buf());
        store.init().await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);

        let id = store.put("s.png", image_bytes(6, ImageFormat::Png)).await.unwrap();
        let on_disk = std::fs::metadata(store.archive_path(&id)).unwrap().len();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_size, on_disk);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_are_isolated() {
        let dir = tempdir().unwrap();
        let store = Arc::new(test_store(dir.path().to_path_buf()));
        store.init().await.unwrap();

        let handles: Vec<_> = (0..100u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let data = image_bytes(i, ImageFormat::Png);
                    let id = store.put(&format!("{}.png", i), data.clone()).await.unwrap();
                    (id, data)
                })
            })
            .collect();

        let mut uploads = Vec::new();
        for handle in handles {
            uploads.push(handle.await.unwrap());
        }

        let ids: HashSet<&String> = uploads.iter().map(|(id, _)| id).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(file_count(dir.path()), 100);

        for (id, data) in &uploads {
            let image = store.get(id).await.unwrap();
            assert_eq!(&image.data, data);
        }
    }
}
