use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::captions::{self, CAPTION_FILE_NAME};
use crate::catalog::{self, Course, Episode};
use crate::client::Fetch;
use crate::config::{DownloadConfig, USER_AGENT};
use crate::error::{Error, Result};
use crate::filename::sanitize_component;
use crate::mux::Muxer;
use crate::playlist;
use crate::progress::{emit, ProgressEvent, ProgressSender};
use crate::quality::NegotiationState;
use crate::transfer::{write_atomic, TransferEngine};

const TMP_DIR_NAME: &str = ".tmp";

#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum EpisodeOutcome {
    Completed(PathBuf),
    Skipped,
}

/// Walks the course strictly sequentially (lessons, then episodes in
/// catalog order), containing non-fatal failures at the episode boundary
/// so a later re-invocation can resume from on-disk state.
pub struct CourseDownloader<'a, F: Fetch, M: Muxer> {
    fetch: &'a F,
    muxer: &'a M,
    config: &'a DownloadConfig,
    cancel: CancellationToken,
    progress: Option<ProgressSender>,
}

impl<'a, F: Fetch, M: Muxer> CourseDownloader<'a, F, M> {
    pub fn new(
        fetch: &'a F,
        muxer: &'a M,
        config: &'a DownloadConfig,
        cancel: CancellationToken,
        progress: Option<ProgressSender>,
    ) -> Self {
        Self {
            fetch,
            muxer,
            config,
            cancel,
            progress,
        }
    }

    pub async fn run(&self) -> Result<DownloadSummary> {
        let course = catalog::fetch_course(
            self.fetch,
            &self.config.endpoints,
            &self.config.course_slug,
        )
        .await?;

        let total = course.episode_count();
        tracing::info!(
            "resolved \"{}\": {} lessons, {} episodes",
            course.title,
            course.lessons.len(),
            total
        );
        emit(
            &self.progress,
            ProgressEvent::CourseResolved {
                title: course.title.clone(),
                lessons: course.lessons.len(),
                episodes: total,
            },
        )
        .await;

        let mut negotiation = NegotiationState::new(self.config.preferred_height)?;
        let course_dir = self
            .config
            .output_dir
            .join(sanitize_component(&course.title));

        let mut summary = DownloadSummary::default();

        for lesson in &course.lessons {
            let lesson_dir = course_dir.join(format!(
                "{}. {}",
                lesson.ordinal,
                sanitize_component(&lesson.name)
            ));
            let lesson_tmp = lesson_dir.join(TMP_DIR_NAME);
            tokio::fs::create_dir_all(&lesson_dir).await?;

            let mut lesson_failed = false;

            for episode in &lesson.episodes {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let done = summary.completed + summary.skipped + summary.failed;
                emit(
                    &self.progress,
                    ProgressEvent::EpisodeStarted {
                        lesson: lesson.name.clone(),
                        episode: episode.title.clone(),
                        completed: done,
                        total,
                    },
                )
                .await;

                match self
                    .download_episode(&course, episode, &lesson_dir, &lesson_tmp, &mut negotiation)
                    .await
                {
                    Ok(EpisodeOutcome::Completed(path)) => {
                        summary.completed += 1;
                        tracing::info!("finished \"{}\" -> {}", episode.title, path.display());
                        emit(
                            &self.progress,
                            ProgressEvent::EpisodeFinished {
                                episode: episode.title.clone(),
                                path: path.display().to_string(),
                            },
                        )
                        .await;
                    }
                    Ok(EpisodeOutcome::Skipped) => {
                        summary.skipped += 1;
                        tracing::info!("skipping \"{}\": output already exists", episode.title);
                        emit(
                            &self.progress,
                            ProgressEvent::EpisodeSkipped {
                                episode: episode.title.clone(),
                            },
                        )
                        .await;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        summary.failed += 1;
                        lesson_failed = true;
                        tracing::error!("episode \"{}\" failed: {e}", episode.title);
                        emit(
                            &self.progress,
                            ProgressEvent::EpisodeFailed {
                                episode: episode.title.clone(),
                                reason: e.to_string(),
                            },
                        )
                        .await;
                    }
                }
            }

            // Failed episodes keep their segment/key artifacts for resume.
            if !lesson_failed {
                if let Err(e) = tokio::fs::remove_dir_all(&lesson_tmp).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("cleanup of {} failed: {e}", lesson_tmp.display());
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn download_episode(
        &self,
        course: &Course,
        episode: &Episode,
        lesson_dir: &Path,
        lesson_tmp: &Path,
        negotiation: &mut NegotiationState,
    ) -> Result<EpisodeOutcome> {
        let file_name = format!(
            "{}. {}.{}",
            episode.source_index + 1,
            sanitize_component(&episode.title),
            self.config.container.extension()
        );
        let final_path = lesson_dir.join(&file_name);

        // Episode-level resume: an existing output means the whole episode
        // already ran to completion.
        if tokio::fs::try_exists(&final_path).await? {
            return Ok(EpisodeOutcome::Skipped);
        }

        let engine = TransferEngine::new(self.fetch, self.cancel.clone());
        let variant_url = engine.resolve_variant(&episode.source_url()).await?;
        let variant_body = self.fetch.get_text(&variant_url).await?;

        let selection = negotiation.negotiate(&variant_body, &variant_url)?;
        if let Some(preferred) = selection.downgraded_from {
            tracing::warn!(
                "preferred quality {}p not available, downgraded to {}p",
                preferred,
                selection.height
            );
            emit(
                &self.progress,
                ProgressEvent::QualityDowngraded {
                    preferred,
                    actual: selection.height,
                },
            )
            .await;
        }

        let rendition_url =
            playlist::sibling_url(&variant_url, &format!("{}.m3u8", selection.marker));

        let tmp_dir = lesson_tmp
            .join(selection.marker)
            .join(sanitize_component(&episode.title));
        tokio::fs::create_dir_all(&tmp_dir).await?;

        // Mux output always lands in the temp subtree first; the rename
        // below guarantees no corrupt file ever sits at the final path.
        let assembled = tmp_dir.join(&file_name);

        if self.config.direct {
            self.muxer
                .assemble_remote(&rendition_url, &self.auth_headers(), &assembled)
                .await?;
        } else {
            let manifest = engine.fetch_manifest(&rendition_url).await?;
            let local_playlist = engine.materialize_key(&manifest, &tmp_dir).await?;
            engine
                .fetch_segments(
                    &manifest,
                    selection.marker,
                    &tmp_dir,
                    &episode.title,
                    &self.progress,
                )
                .await?;
            self.muxer.assemble(&local_playlist, &assembled).await?;
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let finished = if self.config.include_captions {
            match captions::fetch_caption(self.fetch, &self.config.endpoints, course, episode)
                .await?
            {
                Some(bytes) => {
                    let caption_path = tmp_dir.join(CAPTION_FILE_NAME);
                    write_atomic(&caption_path, &bytes).await?;

                    let merged = tmp_dir.join(format!(
                        "captioned.{}",
                        self.config.container.extension()
                    ));
                    self.muxer
                        .attach_subtitle(&assembled, &caption_path, self.config.container, &merged)
                        .await?;
                    merged
                }
                None => {
                    emit(
                        &self.progress,
                        ProgressEvent::CaptionMissing {
                            episode: episode.title.clone(),
                        },
                    )
                    .await;
                    assembled
                }
            }
        } else {
            assembled
        };

        tokio::fs::rename(&finished, &final_path).await?;

        // Best-effort cleanup; a failure here never fails the episode.
        if let Err(e) = tokio::fs::remove_dir_all(&tmp_dir).await {
            tracing::warn!("cleanup of {} failed: {e}", tmp_dir.display());
        }

        Ok(EpisodeOutcome::Completed(final_path))
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Cookie".to_string(), self.config.cookie_header()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("Origin".to_string(), self.config.endpoints.origin.clone()),
            ("Referer".to_string(), self.config.endpoints.referer.clone()),
        ]
    }
}
