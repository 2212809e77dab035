use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::client::Fetch;
use crate::error::{Error, Result};
use crate::playlist::{self, MediaManifest, KEY_FILE_NAME, PLAYLIST_FILE_NAME};
use crate::progress::{emit, ProgressEvent, ProgressSender};

#[derive(Debug, Deserialize)]
struct SourceEnvelope {
    url: String,
}

/// How many segments a `fetch_segments` call actually transferred versus
/// found already on disk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SegmentStats {
    pub fetched: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Resumable segmented fetch of one rendition: key material plus media
/// chunks. A segment file's existence is its completion marker, so the
/// engine never leaves a truncated file at a final path (writes go through
/// a `.part` name and are renamed into place).
pub struct TransferEngine<'a, F: Fetch> {
    fetch: &'a F,
    cancel: CancellationToken,
}

impl<'a, F: Fetch> TransferEngine<'a, F> {
    pub fn new(fetch: &'a F, cancel: CancellationToken) -> Self {
        Self { fetch, cancel }
    }

    /// One authenticated request returning the real, short-lived signed
    /// playlist URL inside a JSON envelope.
    pub async fn resolve_variant(&self, source_url: &str) -> Result<String> {
        let text = self.fetch.get_text(source_url).await?;
        let envelope: SourceEnvelope =
            serde_json::from_str(&text).map_err(|_| Error::TransferFailed {
                url: source_url.to_string(),
                last_status: None,
            })?;
        Ok(envelope.url)
    }

    pub async fn fetch_manifest(&self, rendition_url: &str) -> Result<MediaManifest> {
        let text = self.fetch.get_text(rendition_url).await?;
        MediaManifest::parse(rendition_url, text)
    }

    /// Downloads the decryption key to `key.bin` and writes the playlist
    /// with every key reference rewritten to that local name, so the muxer
    /// resolves it from disk. Returns the local playlist path.
    pub async fn materialize_key(&self, manifest: &MediaManifest, dir: &Path) -> Result<PathBuf> {
        let key_bytes = self.fetch.get_bytes(&manifest.key_url()).await?;
        write_atomic(&dir.join(KEY_FILE_NAME), &key_bytes).await?;

        let playlist_path = dir.join(PLAYLIST_FILE_NAME);
        let rewritten = manifest.rewrite_key_reference(KEY_FILE_NAME);
        write_atomic(&playlist_path, rewritten.as_bytes()).await?;
        Ok(playlist_path)
    }

    /// Fetches segments `1..=N` in sequence order, skipping any file
    /// already present in `dir`. This skip is the sole resume mechanism:
    /// an interrupted run continues without re-transferring completed
    /// bytes.
    pub async fn fetch_segments(
        &self,
        manifest: &MediaManifest,
        marker: &str,
        dir: &Path,
        episode_title: &str,
        progress: &Option<ProgressSender>,
    ) -> Result<SegmentStats> {
        let total = manifest.segment_count;
        let mut stats = SegmentStats::default();

        for sequence in 1..=total {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let name = playlist::segment_file_name(marker, sequence);
            let path = dir.join(&name);
            if tokio::fs::try_exists(&path).await? {
                stats.skipped += 1;
                continue;
            }

            let url = playlist::sibling_url(&manifest.url, &name);
            let bytes = self.fetch.get_bytes(&url).await?;
            write_atomic(&path, &bytes).await?;

            stats.fetched += 1;
            stats.bytes += bytes.len() as u64;
            emit(
                progress,
                ProgressEvent::SegmentFinished {
                    episode: episode_title.to_string(),
                    done: stats.fetched + stats.skipped,
                    total,
                    bytes: stats.bytes,
                },
            )
            .await;
        }

        Ok(stats)
    }
}

/// Full write to a temporary sibling, then rename. A file at its final
/// name is therefore always complete.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let part = part_path(path);
    tokio::fs::write(&part, bytes).await?;
    tokio::fs::rename(&part, path).await?;
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
