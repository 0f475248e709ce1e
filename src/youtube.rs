#![forbid(unsafe_code)]

//! Thin YouTube Data API v3 client.
//!
//! Only the three read-only calls the catalog needs are modelled. Token
//! acquisition and refresh happen elsewhere; this client is handed an access
//! token and uses it as-is.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const PAGE_SIZE: u32 = 50;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl From<ureq::Error> for ApiError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => ApiError::Api {
                status,
                message: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => ApiError::Network(transport.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

/// One entry of the uploads playlist, trimmed to what the catalog reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    pub video_id: String,
    pub published_at: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistPage {
    pub items: Vec<PlaylistItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDetails {
    pub video_id: String,
    /// ISO-8601 duration code such as `PT45S`.
    pub duration: String,
    pub title: String,
    pub description: String,
}

/// Read-only view of the authenticated account's content.
pub trait ContentApi {
    /// Returns the id of the account's canonical uploads playlist.
    fn uploads_playlist_id(&self) -> Result<String>;

    fn list_playlist_items(&self, playlist_id: &str, page_token: Option<&str>)
    -> Result<PlaylistPage>;

    /// `Ok(None)` when the API answers but knows no such video.
    fn video_details(&self, video_id: &str) -> Result<Option<VideoDetails>>;
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemResource {
    snippet: PlaylistItemSnippet,
    content_details: PlaylistItemContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    published_at: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContentDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    id: String,
    content_details: VideoContentDetails,
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

impl From<PlaylistItemResource> for PlaylistItem {
    fn from(resource: PlaylistItemResource) -> Self {
        Self {
            video_id: resource.content_details.video_id,
            published_at: resource.snippet.published_at,
            title: resource.snippet.title,
        }
    }
}

impl From<VideoResource> for VideoDetails {
    fn from(resource: VideoResource) -> Self {
        Self {
            video_id: resource.id,
            duration: resource.content_details.duration,
            title: resource.snippet.title,
            description: resource.snippet.description,
        }
    }
}

/// Authorized-user token file as written by the usual OAuth helpers. Both the
/// `access_token` and the `token` spellings are accepted.
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(alias = "token")]
    access_token: String,
}

pub fn read_access_token(path: &Path) -> anyhow::Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading API token file {}", path.display()))?;
    let token: TokenFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing API token file {}", path.display()))?;
    let access_token = token.access_token.trim();
    if access_token.is_empty() {
        bail!("API token file {} holds an empty token", path.display());
    }
    Ok(access_token.to_string())
}

pub struct YoutubeDataClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl YoutubeDataClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(API_BASE, token)
    }

    pub fn with_base_url(base_url: &str, token: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_token_file(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(read_access_token(path)?))
    }

    fn get<T: DeserializeOwned>(&self, resource: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, resource);
        let mut request = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/json");
        for (key, value) in query {
            request = request.query(key, value);
        }
        let body = request.call()?.into_string().map_err(|err| {
            ApiError::Network(format!("reading {resource} response body: {err}"))
        })?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl ContentApi for YoutubeDataClient {
    fn uploads_playlist_id(&self) -> Result<String> {
        let response: ListResponse<ChannelResource> =
            self.get("channels", &[("part", "contentDetails"), ("mine", "true")])?;
        uploads_from_channels(response)
    }

    fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistPage> {
        let page_size = PAGE_SIZE.to_string();
        let mut query = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let response: ListResponse<PlaylistItemResource> = self.get("playlistItems", &query)?;
        Ok(page_from_response(response))
    }

    fn video_details(&self, video_id: &str) -> Result<Option<VideoDetails>> {
        let response: ListResponse<VideoResource> = self.get(
            "videos",
            &[("part", "contentDetails,snippet"), ("id", video_id)],
        )?;
        Ok(response.items.into_iter().next().map(VideoDetails::from))
    }
}

fn uploads_from_channels(response: ListResponse<ChannelResource>) -> Result<String> {
    let channel = response
        .items
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Unexpected("no channel for the authenticated account".into()))?;
    channel
        .content_details
        .related_playlists
        .uploads
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Unexpected("channel has no uploads playlist".into()))
}

fn page_from_response(response: ListResponse<PlaylistItemResource>) -> PlaylistPage {
    PlaylistPage {
        items: response.items.into_iter().map(PlaylistItem::from).collect(),
        next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn playlist_page_maps_items_and_token() -> Result<()> {
        let raw = serde_json::json!({
            "kind": "youtube#playlistItemListResponse",
            "nextPageToken": "CDIQAA",
            "items": [
                {
                    "snippet": { "publishedAt": "2024-03-01T10:00:00Z", "title": "First" },
                    "contentDetails": { "videoId": "aaa", "videoPublishedAt": "2024-03-01T10:00:00Z" }
                },
                {
                    "snippet": { "publishedAt": "2024-02-29T23:59:59Z", "title": "Second" },
                    "contentDetails": { "videoId": "bbb" }
                }
            ]
        });
        let response: ListResponse<PlaylistItemResource> = serde_json::from_value(raw)?;
        let page = page_from_response(response);
        assert_eq!(page.next_page_token.as_deref(), Some("CDIQAA"));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].video_id, "aaa");
        assert_eq!(page.items[1].published_at, "2024-02-29T23:59:59Z");
        Ok(())
    }

    #[test]
    fn empty_page_token_ends_pagination() -> Result<()> {
        let raw = serde_json::json!({ "nextPageToken": "", "items": [] });
        let response: ListResponse<PlaylistItemResource> = serde_json::from_value(raw)?;
        assert!(page_from_response(response).next_page_token.is_none());
        Ok(())
    }

    #[test]
    fn uploads_playlist_is_read_from_first_channel() -> Result<()> {
        let raw = serde_json::json!({
            "items": [
                { "contentDetails": { "relatedPlaylists": { "likes": "", "uploads": "UUabc" } } }
            ]
        });
        let response: ListResponse<ChannelResource> = serde_json::from_value(raw)?;
        assert_eq!(uploads_from_channels(response)?, "UUabc");
        Ok(())
    }

    #[test]
    fn missing_channel_is_unexpected() {
        let response: ListResponse<ChannelResource> =
            serde_json::from_value(serde_json::json!({ "items": [] })).unwrap();
        let err = uploads_from_channels(response).unwrap_err();
        assert!(matches!(err, ApiError::Unexpected(_)));
    }

    #[test]
    fn video_resource_maps_details() -> Result<()> {
        let raw = serde_json::json!({
            "items": [{
                "id": "aaa",
                "contentDetails": { "duration": "PT45S", "dimension": "2d" },
                "snippet": { "title": "Clip", "description": "hi #fun" }
            }]
        });
        let response: ListResponse<VideoResource> = serde_json::from_value(raw)?;
        let details = response.items.into_iter().next().map(VideoDetails::from);
        let details = details.expect("one video");
        assert_eq!(details.duration, "PT45S");
        assert_eq!(details.description, "hi #fun");
        Ok(())
    }

    mod http {
        use super::super::*;
        use httpmock::prelude::*;
        use serde_json::json;

        fn playlist_item(id: &str, published_at: &str) -> serde_json::Value {
            json!({
                "snippet": { "publishedAt": published_at, "title": format!("{id} title") },
                "contentDetails": { "videoId": id }
            })
        }

        #[test]
        fn pages_through_playlist_with_bearer_token() {
            let server = MockServer::start();
            let first = server.mock(|when, then| {
                when.method(GET)
                    .path("/playlistItems")
                    .header("Authorization", "Bearer ya29.test")
                    .query_param("playlistId", "UUabc")
                    .query_param("maxResults", "50")
                    .query_param("part", "snippet,contentDetails")
                    .query_param_missing("pageToken");
                then.status(200).json_body(json!({
                    "nextPageToken": "NEXT",
                    "items": [playlist_item("aaa", "2024-03-01T10:00:00Z")]
                }));
            });
            let second = server.mock(|when, then| {
                when.method(GET)
                    .path("/playlistItems")
                    .header("Authorization", "Bearer ya29.test")
                    .query_param("pageToken", "NEXT");
                then.status(200).json_body(json!({
                    "items": [playlist_item("bbb", "2024-02-29T09:00:00Z")]
                }));
            });

            let client = YoutubeDataClient::with_base_url(&server.base_url(), "ya29.test".into());
            let page = client.list_playlist_items("UUabc", None).unwrap();
            assert_eq!(page.items[0].video_id, "aaa");
            assert_eq!(page.next_page_token.as_deref(), Some("NEXT"));

            let page = client.list_playlist_items("UUabc", Some("NEXT")).unwrap();
            assert_eq!(page.items[0].video_id, "bbb");
            assert!(page.next_page_token.is_none());

            first.assert_hits(1);
            second.assert_hits(1);
        }

        #[test]
        fn uploads_playlist_and_video_details() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET)
                    .path("/channels")
                    .query_param("part", "contentDetails")
                    .query_param("mine", "true");
                then.status(200).json_body(json!({
                    "items": [{ "contentDetails": { "relatedPlaylists": { "uploads": "UUabc" } } }]
                }));
            });
            server.mock(|when, then| {
                when.method(GET).path("/videos").query_param("id", "aaa");
                then.status(200).json_body(json!({
                    "items": [{
                        "id": "aaa",
                        "contentDetails": { "duration": "PT45S" },
                        "snippet": { "title": "Clip", "description": "hi #fun" }
                    }]
                }));
            });
            server.mock(|when, then| {
                when.method(GET).path("/videos").query_param("id", "gone");
                then.status(200).json_body(json!({ "items": [] }));
            });

            let client = YoutubeDataClient::with_base_url(&server.base_url(), "tok".into());
            assert_eq!(client.uploads_playlist_id().unwrap(), "UUabc");
            let details = client.video_details("aaa").unwrap().unwrap();
            assert_eq!(details.duration, "PT45S");
            assert!(client.video_details("gone").unwrap().is_none());
        }

        #[test]
        fn error_status_maps_to_api_error() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/channels");
                then.status(401)
                    .body(r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#);
            });

            let client = YoutubeDataClient::with_base_url(&server.base_url(), "expired".into());
            match client.uploads_playlist_id() {
                Err(ApiError::Api { status, message }) => {
                    assert_eq!(status, 401);
                    assert!(message.contains("Invalid Credentials"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn read_access_token_accepts_both_spellings() -> Result<()> {
        let dir = tempdir()?;
        let first = dir.path().join("a.json");
        fs::write(&first, r#"{"access_token":" ya29.one ","expires_in":3599}"#)?;
        assert_eq!(read_access_token(&first)?, "ya29.one");

        let second = dir.path().join("b.json");
        fs::write(&second, r#"{"token":"ya29.two","refresh_token":"r"}"#)?;
        assert_eq!(read_access_token(&second)?, "ya29.two");
        Ok(())
    }

    #[test]
    fn read_access_token_rejects_blank_token() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.json");
        fs::write(&path, r#"{"access_token":"   "}"#)?;
        let err = read_access_token(&path).unwrap_err();
        assert!(err.to_string().contains("empty token"));
        Ok(())
    }
}
