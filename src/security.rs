#![forbid(unsafe_code)]

//! Process-level guards shared by the shortsbridge binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. A browser driven as root
/// needs `--no-sandbox`, and downloads would land root-owned in the user's
/// directories.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; run it as the user that owns the browser profile and download directory"
        );
    }
    Ok(())
}
