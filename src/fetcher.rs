#![forbid(unsafe_code)]

//! Downloads one video as a local mp4 through `yt-dlp`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Result as AnyResult, bail};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_PROGRAM: &str = "yt-dlp";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const REQUIRED_EXT: &str = "mp4";
const REQUIRED_AUDIO_CODEC: &str = "mp4a.40.2";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("stream listing for {video_id} failed ({status}): {stderr}")]
    Listing {
        video_id: String,
        status: String,
        stderr: String,
    },

    #[error("could not parse stream listing for {video_id}: {source}")]
    Parse {
        video_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no progressive mp4 stream with mp4a.40.2 audio for {video_id}")]
    NoMatchingStream { video_id: String },

    #[error("download of {video_id} (format {format_id}) failed ({status}): {stderr}")]
    Download {
        video_id: String,
        format_id: String,
        status: String,
        stderr: String,
    },

    #[error("download reported success but {} is missing", .path.display())]
    MissingOutput { path: PathBuf },

    #[error("preparing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One entry of the `formats` array in yt-dlp's info JSON.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StreamFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl StreamFormat {
    /// Carries both audio and video in one file.
    fn is_progressive(&self) -> bool {
        let has = |codec: &Option<String>| codec.as_deref().is_some_and(|c| !c.is_empty() && c != "none");
        has(&self.vcodec) && has(&self.acodec)
    }

    fn is_eligible(&self) -> bool {
        self.is_progressive()
            && self.ext.as_deref() == Some(REQUIRED_EXT)
            && self
                .acodec
                .as_deref()
                .is_some_and(|codec| codec == REQUIRED_AUDIO_CODEC)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.height.unwrap_or(0), self.width.unwrap_or(0))
    }
}

#[derive(Deserialize)]
struct InfoJson {
    #[serde(default)]
    formats: Vec<StreamFormat>,
}

/// Highest resolution eligible stream. Ties keep the earliest listed.
pub fn select_stream(formats: &[StreamFormat]) -> Option<&StreamFormat> {
    formats
        .iter()
        .filter(|format| format.is_eligible())
        .fold(None, |best: Option<&StreamFormat>, candidate| match best {
            Some(current) if current.resolution() >= candidate.resolution() => Some(current),
            _ => Some(candidate),
        })
}

pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_URL}{video_id}")
}

/// A downloaded video on disk. The file is removed when this is discarded or
/// dropped, whichever comes first.
#[derive(Debug)]
pub struct LocalMediaArtifact {
    path: PathBuf,
    removed: bool,
}

impl LocalMediaArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file now and reports what happened.
    pub fn discard(mut self) -> io::Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> io::Result<()> {
        if std::mem::replace(&mut self.removed, true) {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed local artifact");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for LocalMediaArtifact {
    fn drop(&mut self) {
        if let Err(err) = self.remove() {
            warn!("could not remove local artifact: {err}");
        }
    }
}

/// Seam for the orchestrator so batches can be exercised without yt-dlp.
pub trait VideoFetcher {
    fn fetch_video(&self, video_id: &str) -> Result<LocalMediaArtifact, FetchError>;
}

#[derive(Clone, Debug)]
pub struct MediaFetcher {
    download_dir: PathBuf,
    program: PathBuf,
    cookies: Option<PathBuf>,
}

impl MediaFetcher {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            program: PathBuf::from(DEFAULT_PROGRAM),
            cookies: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn output_path(&self, video_id: &str) -> PathBuf {
        self.download_dir.join(format!("{video_id}.{REQUIRED_EXT}"))
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("--no-warnings").arg("--no-progress");
        if let Some(cookies) = &self.cookies
            && cookies.exists()
        {
            command.arg("--cookies").arg(cookies);
        }
        command
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Runs `yt-dlp --dump-single-json` and returns the advertised formats.
    pub fn list_streams(&self, video_id: &str) -> Result<Vec<StreamFormat>, FetchError> {
        let output = self
            .command()
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg(watch_url(video_id))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| FetchError::Spawn {
                program: self.program_name(),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::Listing {
                video_id: video_id.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let info: InfoJson =
            serde_json::from_slice(&output.stdout).map_err(|source| FetchError::Parse {
                video_id: video_id.to_string(),
                source,
            })?;
        Ok(info.formats)
    }

    fn download(&self, video_id: &str, format: &StreamFormat, target: &Path) -> Result<(), FetchError> {
        let output = self
            .command()
            .arg("--format")
            .arg(&format.format_id)
            .arg("--output")
            .arg(target)
            .arg("--no-part")
            .arg("--force-overwrites")
            .arg(watch_url(video_id))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| FetchError::Spawn {
                program: self.program_name(),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::Download {
                video_id: video_id.to_string(),
                format_id: format.format_id.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !target.is_file() {
            return Err(FetchError::MissingOutput {
                path: target.to_path_buf(),
            });
        }
        Ok(())
    }
}

impl VideoFetcher for MediaFetcher {
    fn fetch_video(&self, video_id: &str) -> Result<LocalMediaArtifact, FetchError> {
        let formats = self.list_streams(video_id)?;
        let format = select_stream(&formats).ok_or_else(|| FetchError::NoMatchingStream {
            video_id: video_id.to_string(),
        })?;
        debug!(
            video_id,
            format_id = %format.format_id,
            height = format.height.unwrap_or(0),
            "selected stream"
        );

        fs::create_dir_all(&self.download_dir).map_err(|source| FetchError::Io {
            path: self.download_dir.clone(),
            source,
        })?;

        let target = self.output_path(video_id);
        // Owning the path before the download starts means a failed or partial
        // download is cleaned up on the way out.
        let artifact = LocalMediaArtifact::new(target.clone());
        self.download(video_id, format, &target)?;
        info!(video_id, path = %target.display(), "downloaded");
        Ok(artifact)
    }
}

/// Runs `<name> --version` to fail loudly when yt-dlp is missing.
pub fn ensure_program_available(program: &Path) -> AnyResult<()> {
    let status = Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!(
            "{} is installed but returned a failure status",
            program.display()
        ),
        Err(err) => bail!("{} is not installed or not in PATH: {}", program.display(), err),
    }
}
