#![forbid(unsafe_code)]

//! Machine-readable progress for wrappers watching a batch run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressReport<'a> {
    progress: u8,
    message: &'a str,
}

/// Writes `{"progress": n, "message": ".."}` to a file, replacing it
/// atomically so readers never see a half-written report. Failures are logged
/// and otherwise ignored; progress reporting never fails a batch.
#[derive(Clone, Debug)]
pub struct ProgressWriter {
    path: PathBuf,
}

impl ProgressWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, progress: u8, message: &str) {
        let report = ProgressReport {
            progress: progress.min(100),
            message,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(err) = fs::create_dir_all(parent)
        {
            warn!("could not create progress dir: {err}");
            return;
        }

        let tmp_path = self.path.with_extension("tmp");
        match serde_json::to_vec(&report) {
            Ok(payload) => {
                if let Err(err) = fs::write(&tmp_path, payload) {
                    warn!("could not write progress file: {err}");
                    return;
                }
                if let Err(err) = fs::rename(&tmp_path, &self.path) {
                    warn!("could not finalize progress file: {err}");
                }
            }
            Err(err) => {
                warn!("could not serialize progress report: {err}");
            }
        }
    }
}

/// Percentage of `done` out of `total`, where an empty batch counts as done.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

pub fn update_progress(progress: Option<&ProgressWriter>, percent: u8, message: &str) {
    if let Some(writer) = progress {
        writer.write(percent, message);
    }
}
