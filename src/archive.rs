//! Archival coordinator: many named image streams in, one zip archive out.
//!
//! Each entry is handled in two phases. Preparation (rewind the source
//! stream, read it into a pooled scratch buffer) runs concurrently under the
//! same permit discipline as extraction. Writing into the container is
//! serialised behind a mutex because a zip stream can only have one open
//! entry at a time.
//!
//! A failed entry is logged and skipped. Only a container that cannot be
//! finalised fails the whole call, and then the result is empty bytes.

use crate::config::ArchiveConfig;
use crate::error::{ImgExtractError, ItemError};
use crate::output::{ArchiveStats, ExtractedImage};
use crate::pool::{BufferPool, PooledBuffer};
use std::collections::HashSet;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

struct Container {
    writer: ZipWriter<PooledBuffer>,
    names: HashSet<String>,
}

/// Writes extracted images into a single deflate-compressed zip archive.
pub struct ZipArchiver {
    pool: BufferPool,
    config: ArchiveConfig,
}

impl ZipArchiver {
    pub fn new(pool: BufferPool, config: ArchiveConfig) -> Result<Self, ImgExtractError> {
        config.validate()?;
        Ok(Self { pool, config })
    }

    /// Archive `images`; see [`ZipArchiver::archive_with_stats`].
    pub async fn archive(&self, images: Vec<ExtractedImage>, cancel: &CancellationToken) -> Vec<u8> {
        self.archive_with_stats(images, cancel).await.0
    }

    /// Archive `images` and report which entries made it in.
    ///
    /// Returns empty bytes, without opening a container, for an empty input.
    /// Streams are rewound before they are read, so callers may hand over
    /// images at any position.
    pub async fn archive_with_stats(
        &self,
        images: Vec<ExtractedImage>,
        cancel: &CancellationToken,
    ) -> (Vec<u8>, ArchiveStats) {
        let mut stats = ArchiveStats::default();
        if images.is_empty() {
            debug!("Nothing to archive");
            return (Vec::new(), stats);
        }

        let total = images.len();
        info!("Archiving {} images (concurrency {})", total, self.config.concurrency);

        let container = Arc::new(Mutex::new(Container {
            writer: ZipWriter::new(self.pool.acquire()),
            names: HashSet::with_capacity(total),
        }));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.config.compression_level);

        // ── Fan out entry writes ─────────────────────────────────────────────
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks: JoinSet<Result<String, ItemError>> = JoinSet::new();

        for image in images {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                debug!("Archive cancelled before '{}'", image.name);
                stats.failures.push(ItemError::Cancelled { name: image.name });
                continue;
            };

            let container = Arc::clone(&container);
            let pool = self.pool.clone();
            let cancel = cancel.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                write_entry(image, &container, options, &pool, &cancel)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(name)) => {
                    debug!("Entry written: {}", name);
                    stats.entries_written += 1;
                }
                Ok(Err(e)) => {
                    warn!("Archive entry skipped: {}", e);
                    stats.failures.push(e);
                }
                Err(e) => {
                    warn!("Archive worker died: {}", e);
                    stats.failures.push(ItemError::TaskFailed {
                        detail: e.to_string(),
                    });
                }
            }
        }
        stats.entries_skipped = stats.failures.len();

        // ── Finalise the container ───────────────────────────────────────────
        match finish(container) {
            Ok(bytes) => {
                info!(
                    "Archive complete: {}/{} entries, {} bytes",
                    stats.entries_written,
                    total,
                    bytes.len()
                );
                (bytes, stats)
            }
            Err(e) => {
                error!("{}", e);
                (Vec::new(), stats)
            }
        }
    }
}

/// Prepare one entry and append it to the container.
fn write_entry(
    mut image: ExtractedImage,
    container: &Mutex<Container>,
    options: SimpleFileOptions,
    pool: &BufferPool,
    cancel: &CancellationToken,
) -> Result<String, ItemError> {
    let name = image.name.clone();

    // Preparation runs outside the lock.
    image
        .data
        .seek(SeekFrom::Start(0))
        .map_err(|e| entry_failed(&name, format!("rewind failed: {}", e)))?;
    let mut scratch = pool.acquire();
    io::copy(&mut image.data, &mut scratch)
        .map_err(|e| entry_failed(&name, format!("read failed: {}", e)))?;
    drop(image);

    if cancel.is_cancelled() {
        return Err(ItemError::Cancelled { name });
    }

    let mut guard = container.lock().unwrap_or_else(PoisonError::into_inner);
    if !guard.names.insert(name.clone()) {
        return Err(ItemError::DuplicateName { name });
    }

    let written = guard
        .writer
        .start_file(name.as_str(), options)
        .map_err(|e| e.to_string())
        .and_then(|()| guard.writer.write_all(scratch.as_slice()).map_err(|e| e.to_string()));

    match written {
        Ok(()) => Ok(name),
        Err(detail) => {
            if let Err(e) = guard.writer.abort_file() {
                warn!("Could not roll back entry '{}': {}", name, e);
            }
            guard.names.remove(&name);
            Err(entry_failed(&name, detail))
        }
    }
}

fn entry_failed(name: &str, detail: String) -> ItemError {
    ItemError::EntryFailed {
        name: name.to_string(),
        detail,
    }
}

/// Close the central directory and copy the archive out of its pooled buffer.
fn finish(container: Arc<Mutex<Container>>) -> Result<Vec<u8>, ImgExtractError> {
    let container = Arc::try_unwrap(container)
        .map_err(|_| ImgExtractError::ArchiveFailed("container still shared after all entries".into()))?
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);

    let buffer = container
        .writer
        .finish()
        .map_err(|e| ImgExtractError::ArchiveFailed(e.to_string()))?;
    Ok(buffer.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::ImageFormat;

    fn image(pool: &BufferPool, name: &str, bytes: &[u8]) -> ExtractedImage {
        let mut data = pool.acquire();
        data.write_all(bytes).unwrap();
        ExtractedImage {
            name: name.to_string(),
            index: 0,
            data,
            format: ImageFormat::Png,
            created_at: Utc::now(),
        }
    }

    fn entries(zip_bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut zip = zip::ZipArchive::new(io::Cursor::new(zip_bytes)).unwrap();
        let mut out = Vec::new();
        for i in 0..zip.len() {
            let mut f = zip.by_index(i).unwrap();
            let mut buf = Vec::new();
            io::Read::read_to_end(&mut f, &mut buf).unwrap();
            out.push((f.name().to_string(), buf));
        }
        out.sort();
        out
    }

    #[tokio::test]
    async fn empty_input_opens_no_container() {
        let pool = BufferPool::default();
        let archiver = ZipArchiver::new(pool.clone(), ArchiveConfig::default()).unwrap();
        let bytes = archiver.archive(Vec::new(), &CancellationToken::new()).await;
        assert!(bytes.is_empty());
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.idle(), 0, "no buffer should have been borrowed");
    }

    #[tokio::test]
    async fn duplicate_names_are_skipped() {
        let pool = BufferPool::default();
        let archiver = ZipArchiver::new(pool.clone(), ArchiveConfig::default()).unwrap();
        let images = vec![
            image(&pool, "a.png", b"first"),
            image(&pool, "a.png", b"second"),
            image(&pool, "b.png", b"third"),
        ];
        let (bytes, stats) = archiver
            .archive_with_stats(images, &CancellationToken::new())
            .await;
        assert_eq!(stats.entries_written, 2);
        assert_eq!(stats.entries_skipped, 1);
        assert!(matches!(stats.failures[0], ItemError::DuplicateName { .. }));
        let names: Vec<_> = entries(&bytes).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[tokio::test]
    async fn buffers_go_back_to_the_pool() {
        let pool = BufferPool::default();
        let archiver = ZipArchiver::new(pool.clone(), ArchiveConfig::default()).unwrap();
        let images = (0..8)
            .map(|i| image(&pool, &format!("img-{i}.png"), &[i as u8; 100]))
            .collect();
        let bytes = archiver.archive(images, &CancellationToken::new()).await;
        assert_eq!(entries(&bytes).len(), 8);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ArchiveConfig {
            concurrency: 0,
            compression_level: None,
        };
        assert!(ZipArchiver::new(BufferPool::default(), config).is_err());
    }
}
