#![forbid(unsafe_code)]

//! Lists the account's Shorts for a single publish date.
//!
//! The uploads playlist is walked page by page; only items whose UTC publish
//! date matches the target get a second, per-video lookup for duration and
//! description. Descriptors come back in playlist order.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::debug;

use crate::youtube::{ApiError, ContentApi, PlaylistItem, VideoDetails};

#[derive(Debug, Error)]
pub enum CatalogFetchError {
    #[error("content API call failed: {0}")]
    Api(#[from] ApiError),

    #[error("video {video_id} is listed in uploads but has no details")]
    MissingDetails { video_id: String },

    #[error("video {video_id} has an unreadable publish timestamp {value:?}")]
    InvalidTimestamp { video_id: String, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurationClass {
    Short,
    NotShort,
}

/// Normalized, read-only record of one source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDescriptor {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub duration_class: DurationClass,
    pub duration_code: String,
    pub published_at: DateTime<Utc>,
}

impl VideoDescriptor {
    /// Tags in description order, joined the way the destination's tag field
    /// expects them.
    pub fn tags_joined(&self) -> String {
        self.tags.join(", ")
    }

    /// `M:SS` style rendering for logs, when the duration code is parseable.
    pub fn duration_text(&self) -> Option<String> {
        duration_seconds(&self.duration_code).map(format_duration)
    }
}

/// Walks the uploads playlist and returns the Shorts published on `date`.
pub fn list_shorts_for_date<A>(
    api: &A,
    date: NaiveDate,
) -> Result<Vec<VideoDescriptor>, CatalogFetchError>
where
    A: ContentApi + ?Sized,
{
    let playlist_id = api.uploads_playlist_id()?;
    let mut shorts = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = api.list_playlist_items(&playlist_id, page_token.as_deref())?;
        debug!(
            playlist_id = %playlist_id,
            items = page.items.len(),
            "fetched uploads page"
        );

        for item in page.items {
            let published_at = parse_published_at(&item)?;
            if published_at.date_naive() != date {
                continue;
            }

            let details = api.video_details(&item.video_id)?.ok_or_else(|| {
                CatalogFetchError::MissingDetails {
                    video_id: item.video_id.clone(),
                }
            })?;

            let descriptor = build_descriptor(item.video_id, published_at, details);
            if descriptor.duration_class == DurationClass::Short {
                shorts.push(descriptor);
            } else {
                debug!(
                    video_id = %descriptor.video_id,
                    duration = %descriptor.duration_code,
                    "skipping long-form upload"
                );
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(shorts)
}

fn parse_published_at(item: &PlaylistItem) -> Result<DateTime<Utc>, CatalogFetchError> {
    DateTime::parse_from_rfc3339(item.published_at.trim())
        .map(|datetime| datetime.with_timezone(&Utc))
        .map_err(|_| CatalogFetchError::InvalidTimestamp {
            video_id: item.video_id.clone(),
            value: item.published_at.clone(),
        })
}

fn build_descriptor(
    video_id: String,
    published_at: DateTime<Utc>,
    details: VideoDetails,
) -> VideoDescriptor {
    let tags = extract_tags(&details.description);
    let duration_class = classify_duration(&details.duration);
    VideoDescriptor {
        video_id,
        title: details.title,
        description: details.description,
        tags,
        duration_class,
        duration_code: details.duration,
        published_at,
    }
}

/// Approximates "under a minute": a code carrying the `PT` time marker with
/// neither a minutes nor an hours component is short. Anything else,
/// including empty or day-based codes, is not.
pub fn classify_duration(code: &str) -> DurationClass {
    if code.contains("PT") && !code.contains('M') && !code.contains('H') {
        DurationClass::Short
    } else {
        DurationClass::NotShort
    }
}

/// Whitespace tokens starting with `#`, in order. Trailing punctuation stays
/// attached to the token.
pub fn extract_tags(description: &str) -> Vec<String> {
    description
        .split_whitespace()
        .filter(|token| token.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Exact seconds for `PT#H#M#S` codes. Used for display only; classification
/// stays on [`classify_duration`].
pub fn duration_seconds(code: &str) -> Option<i64> {
    let rest = code.strip_prefix("PT")?;
    if rest.is_empty() {
        return None;
    }
    let mut total = 0i64;
    let mut digits = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: i64 = digits.parse().ok()?;
        digits.clear();
        total += match c {
            'H' => value * 3600,
            'M' => value * 60,
            'S' => value,
            _ => return None,
        };
    }
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

/// Renders durations as `H:MM:SS` or `M:SS` for short clips.
fn format_duration(duration: i64) -> String {
    let hours = duration / 3600;
    let minutes = (duration % 3600) / 60;
    let seconds = duration % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
