#![forbid(unsafe_code)]

//! Copies one day's YouTube Shorts to Rumble.
//!
//! Lists the authenticated account's Shorts for a UTC publish date, downloads
//! each with yt-dlp and publishes it through Rumble's upload form in a browser
//! driven over WebDriver.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use shortsbridge_tools::{
    browser::{LaunchOptions, WebDriverClient},
    config::{SettingsOverrides, resolve_settings},
    fetcher::{MediaFetcher, ensure_program_available},
    orchestrator::{BatchRun, ItemStatus, Migrator, dry_run},
    progress::ProgressWriter,
    security::ensure_not_root,
    uploader::RumbleUploader,
    youtube::YoutubeDataClient,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "migrate_shorts",
    about = "Migrate the YouTube Shorts published on one date to Rumble"
)]
struct Cli {
    /// Publish date to migrate, as YYYY-MM-DD (UTC).
    date: NaiveDate,

    /// Env file to read settings from (default: .env).
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Directory for temporary downloads.
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// WebDriver endpoint, e.g. chromedriver.
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Run the browser without a window.
    #[arg(long)]
    headless: bool,

    /// Rumble category to pick in the upload form.
    #[arg(long)]
    category: Option<String>,

    /// Write JSON progress reports to this file.
    #[arg(long)]
    progress_file: Option<PathBuf>,

    /// Only list what would be migrated.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("shortsbridge_tools=info".parse()?),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Bad or missing arguments print usage and do nothing else.
            err.print()?;
            return Ok(());
        }
    };

    ensure_not_root("migrate_shorts")?;

    let settings = resolve_settings(SettingsOverrides {
        env_path: cli.env_file.clone(),
        download_dir: cli.download_dir.clone(),
        webdriver_url: cli.webdriver_url.clone(),
        category: cli.category.clone(),
        headless: cli.headless.then_some(true),
    })?;
    settings.log_redacted();

    let api = YoutubeDataClient::from_token_file(&settings.token_path)
        .context("loading YouTube credentials")?;

    if cli.dry_run {
        let run = dry_run(cli.date, &api).context("listing shorts")?;
        print_summary(&run);
        return Ok(());
    }

    let fetcher = MediaFetcher::new(settings.download_dir.clone())
        .with_cookies(settings.cookies.clone());
    ensure_program_available(fetcher.program())?;

    let uploader = RumbleUploader::new(settings.credentials.clone())
        .with_category(settings.category.clone());

    let launch = LaunchOptions {
        headless: settings.headless,
    };
    let migrator = Migrator::new(fetcher, uploader)
        .with_progress(cli.progress_file.clone().map(ProgressWriter::new));
    let run = migrator
        .run_connecting(cli.date, &api, || {
            WebDriverClient::connect(&settings.webdriver_url, &launch)
        })
        .with_context(|| {
            format!(
                "migrating shorts for {} (WebDriver at {})",
                cli.date, settings.webdriver_url
            )
        })?;

    print_summary(&run);
    Ok(())
}

fn print_summary(run: &BatchRun) {
    println!();
    println!("Migration summary for {}", run.date);
    println!("==============================");
    if run.outcomes.is_empty() {
        println!("No shorts found.");
        return;
    }
    for outcome in &run.outcomes {
        let status = match &outcome.status {
            ItemStatus::Listed => "listed".to_string(),
            ItemStatus::Published { acknowledged: true } => "published".to_string(),
            ItemStatus::Published {
                acknowledged: false,
            } => "submitted (not acknowledged)".to_string(),
            ItemStatus::FetchFailed(err) => format!("download failed: {err}"),
            ItemStatus::UploadFailed(err) => format!("upload failed: {err}"),
        };
        println!("  - {} {}: {}", outcome.video_id, outcome.title, status);
    }
    println!(
        "Total: {}  Succeeded: {}  Failed: {}",
        run.total(),
        run.succeeded(),
        run.failed()
    );
}
