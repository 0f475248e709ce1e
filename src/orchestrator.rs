#![forbid(unsafe_code)]

//! Runs one batch: list a day's Shorts, then fetch and publish each in turn.
//!
//! Items fail independently. A failed download or upload is recorded and the
//! batch moves on with the same browser session. Only a catalog failure ends
//! the batch early, and the browser session is released either way.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::browser::{Browser, BrowserError, BrowserSession};
use crate::catalog::{CatalogFetchError, VideoDescriptor, list_shorts_for_date};
use crate::fetcher::{FetchError, VideoFetcher};
use crate::progress::{ProgressWriter, percent, update_progress};
use crate::uploader::{FormStage, RumbleUploader, UploadError, UploadFailure, UploadMetadata};
use crate::youtube::ContentApi;

/// Batch-fatal failures of a lazily connected run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Catalog(#[from] CatalogFetchError),

    #[error("could not start the browser: {0}")]
    Browser(#[from] BrowserError),
}

#[derive(Debug)]
pub enum ItemStatus {
    /// Dry run: found, nothing else done.
    Listed,
    Published { acknowledged: bool },
    FetchFailed(FetchError),
    UploadFailed(UploadError),
}

#[derive(Debug)]
pub struct ItemOutcome {
    pub video_id: String,
    pub title: String,
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            ItemStatus::Published { .. } | ItemStatus::Listed
        )
    }
}

/// Result of one invocation for one date.
#[derive(Debug)]
pub struct BatchRun {
    pub date: NaiveDate,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchRun {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }
}

pub struct Migrator<F> {
    fetcher: F,
    uploader: RumbleUploader,
    progress: Option<ProgressWriter>,
}

impl<F: VideoFetcher> Migrator<F> {
    pub fn new(fetcher: F, uploader: RumbleUploader) -> Self {
        Self {
            fetcher,
            uploader,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressWriter>) -> Self {
        self.progress = progress;
        self
    }

    /// Migrates every Short published on `date`. The session is closed before
    /// this returns, on every path.
    pub fn run<A, B>(
        &self,
        date: NaiveDate,
        api: &A,
        session: BrowserSession<B>,
    ) -> Result<BatchRun, CatalogFetchError>
    where
        A: ContentApi + ?Sized,
        B: Browser,
    {
        // An early return drops the session, which quits the browser.
        let videos = self.list(date, api)?;
        Ok(self.migrate_all(date, &videos, Some(session)))
    }

    /// Like [`Migrator::run`], but only calls `connect` once there is
    /// something to publish. An empty day never starts a browser.
    pub fn run_connecting<A, B, C>(
        &self,
        date: NaiveDate,
        api: &A,
        connect: C,
    ) -> Result<BatchRun, BatchError>
    where
        A: ContentApi + ?Sized,
        B: Browser,
        C: FnOnce() -> Result<B, BrowserError>,
    {
        let videos = self.list(date, api)?;
        if videos.is_empty() {
            return Ok(self.migrate_all(date, &videos, None::<BrowserSession<B>>));
        }
        let session = BrowserSession::new(connect()?);
        Ok(self.migrate_all(date, &videos, Some(session)))
    }

    fn list<A>(&self, date: NaiveDate, api: &A) -> Result<Vec<VideoDescriptor>, CatalogFetchError>
    where
        A: ContentApi + ?Sized,
    {
        update_progress(self.progress.as_ref(), 0, "Listing shorts");
        let videos = list_shorts_for_date(api, date)?;
        info!(%date, count = videos.len(), "found shorts");
        Ok(videos)
    }

    fn migrate_all<B: Browser>(
        &self,
        date: NaiveDate,
        videos: &[VideoDescriptor],
        session: Option<BrowserSession<B>>,
    ) -> BatchRun {
        let progress = self.progress.as_ref();
        let total = videos.len();
        let mut outcomes = Vec::with_capacity(total);

        if let Some(mut session) = session {
            for (index, video) in videos.iter().enumerate() {
                info!(
                    video_id = %video.video_id,
                    title = %video.title,
                    "[{}/{}] migrating",
                    index + 1,
                    total
                );
                update_progress(
                    progress,
                    percent(index, total),
                    &format!("Migrating {}", video.video_id),
                );
                outcomes.push(self.migrate_one(&mut session, video));
            }

            if let Err(err) = session.close() {
                warn!(error = %err, "browser did not shut down cleanly");
            }
        }

        let run = BatchRun { date, outcomes };
        update_progress(
            progress,
            100,
            &format!("Done: {} published, {} failed", run.succeeded(), run.failed()),
        );
        run
    }

    fn migrate_one<B: Browser>(
        &self,
        session: &mut BrowserSession<B>,
        video: &VideoDescriptor,
    ) -> ItemOutcome {
        let status = match self.fetch_and_publish(session, video) {
            Ok(acknowledged) => {
                info!(video_id = %video.video_id, title = %video.title, acknowledged, "published");
                ItemStatus::Published { acknowledged }
            }
            Err(status) => status,
        };
        ItemOutcome {
            video_id: video.video_id.clone(),
            title: video.title.clone(),
            status,
        }
    }

    fn fetch_and_publish<B: Browser>(
        &self,
        session: &mut BrowserSession<B>,
        video: &VideoDescriptor,
    ) -> Result<bool, ItemStatus> {
        let artifact = self.fetcher.fetch_video(&video.video_id).map_err(|err| {
            error!(video_id = %video.video_id, title = %video.title, error = %err, "fetch failed");
            ItemStatus::FetchFailed(err)
        })?;

        let published = session
            .browser()
            .map_err(|err| UploadError {
                stage: FormStage::Idle,
                reason: UploadFailure::Browser(err),
            })
            .and_then(|browser| {
                self.uploader
                    .publish(browser, artifact.path(), UploadMetadata::from(video))
            });

        if let Err(err) = artifact.discard() {
            warn!(video_id = %video.video_id, error = %err, "could not delete local copy");
        }

        match published {
            Ok(result) => Ok(result.acknowledged),
            Err(err) => {
                error!(
                    video_id = %video.video_id,
                    title = %video.title,
                    stage = %err.stage,
                    error = %err.reason,
                    "upload failed"
                );
                Err(ItemStatus::UploadFailed(err))
            }
        }
    }
}

/// Lists what a run for `date` would migrate without touching yt-dlp or a
/// browser.
pub fn dry_run<A>(date: NaiveDate, api: &A) -> Result<BatchRun, CatalogFetchError>
where
    A: ContentApi + ?Sized,
{
    let videos = list_shorts_for_date(api, date)?;
    info!(%date, count = videos.len(), "found shorts (dry run)");
    let outcomes = videos
        .into_iter()
        .map(|video| {
            info!(
                video_id = %video.video_id,
                title = %video.title,
                duration = %video.duration_text().unwrap_or_else(|| video.duration_code.clone()),
                tags = %video.tags_joined(),
                "would migrate"
            );
            ItemOutcome {
                video_id: video.video_id,
                title: video.title,
                status: ItemStatus::Listed,
            }
        })
        .collect();
    Ok(BatchRun { date, outcomes })
}
