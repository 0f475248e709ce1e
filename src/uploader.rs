#![forbid(unsafe_code)]

//! Publishes one local video through Rumble's upload form.
//!
//! The form is driven as a forward-only state machine. Each stage performs its
//! action and then the session advances; a wait that runs out of time fails
//! the upload with the stage it happened in. The browser itself is borrowed
//! for the duration of one call and stays logged in between videos.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::{
    Browser, BrowserError, ElementRef, Locator, Readiness, WaitError, WaitPolicy,
    wait_for_element, wait_until,
};
use crate::catalog::VideoDescriptor;

pub const UPLOAD_URL: &str = "https://rumble.com/upload";
pub const DEFAULT_CATEGORY: &str = "Entertainment";

const LOGIN_USERNAME_ID: &str = "login-username";
const LOGIN_PASSWORD_ID: &str = "login-password";
const LOGIN_BUTTON_CLASS: &str = "login-button";
const FILE_INPUT_XPATH: &str = "//input[@type='file']";
const TITLE_ID: &str = "title";
const DESCRIPTION_ID: &str = "description";
const TAGS_ID: &str = "tags";
const CATEGORY_NAME: &str = "primary-category";
const CATEGORY_OPTIONS_CLASS: &str = "select-options-container";
const FIRST_SUBMIT_ID: &str = "submitForm";
const RIGHTS_CHECKBOX_ID: &str = "crights";
const TERMS_CHECKBOX_ID: &str = "cterms";
const FINAL_SUBMIT_ID: &str = "submitForm2";

/// Named points of the upload form, in the only order they can be visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormStage {
    Idle,
    Authenticating,
    FileAttached,
    MetadataFilled,
    Stage1Submitted,
    TermsAccepted,
    Published,
}

impl FormStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FormStage::Idle => "idle",
            FormStage::Authenticating => "authenticating",
            FormStage::FileAttached => "file-attached",
            FormStage::MetadataFilled => "metadata-filled",
            FormStage::Stage1Submitted => "stage-1-submitted",
            FormStage::TermsAccepted => "terms-accepted",
            FormStage::Published => "published",
        }
    }

    /// Stages reachable in one step. Authentication is the only optional one.
    fn successors(self) -> &'static [FormStage] {
        match self {
            FormStage::Idle => &[FormStage::Authenticating, FormStage::FileAttached],
            FormStage::Authenticating => &[FormStage::FileAttached],
            FormStage::FileAttached => &[FormStage::MetadataFilled],
            FormStage::MetadataFilled => &[FormStage::Stage1Submitted],
            FormStage::Stage1Submitted => &[FormStage::TermsAccepted],
            FormStage::TermsAccepted => &[FormStage::Published],
            FormStage::Published => &[],
        }
    }

    pub fn can_advance_to(self, next: FormStage) -> bool {
        self.successors().contains(&next)
    }
}

impl fmt::Display for FormStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    Anonymous,
    Authenticated,
}

#[derive(Debug, Error)]
pub enum UploadFailure {
    #[error("{target} did not become {readiness} within {waited:?}")]
    TimedOut {
        target: String,
        readiness: String,
        waited: Duration,
    },

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("a login page was shown but no destination credentials are configured")]
    MissingCredentials,

    #[error("cannot resolve artifact path {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("form cannot move from {from} to {to}")]
    OutOfOrder { from: FormStage, to: FormStage },
}

#[derive(Debug, Error)]
#[error("upload failed at stage {stage}: {reason}")]
pub struct UploadError {
    pub stage: FormStage,
    #[source]
    pub reason: UploadFailure,
}

/// Destination account. The password never shows up in debug output.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Upper bounds for each kind of wait in the form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadTimings {
    pub element: Duration,
    pub login: Duration,
    pub processing: Duration,
    pub suggestions: Duration,
    pub publish_ack: Duration,
    pub poll_interval: Duration,
}

impl Default for UploadTimings {
    fn default() -> Self {
        Self {
            element: Duration::from_secs(10),
            login: Duration::from_secs(15),
            processing: Duration::from_secs(120),
            suggestions: Duration::from_secs(5),
            publish_ack: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl UploadTimings {
    fn policy(&self, timeout: Duration) -> WaitPolicy {
        WaitPolicy::new(timeout, self.poll_interval)
    }
}

/// What the form gets filled with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadMetadata {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub tags: String,
}

impl From<&VideoDescriptor> for UploadMetadata {
    fn from(video: &VideoDescriptor) -> Self {
        Self {
            video_id: video.video_id.clone(),
            title: video.title.clone(),
            description: video.description.clone(),
            tags: video.tags_joined(),
        }
    }
}

/// State of one video's pass through the form.
#[derive(Debug)]
pub struct UploadSession {
    stage: FormStage,
    auth: AuthStatus,
    metadata: UploadMetadata,
    history: Vec<FormStage>,
}

impl UploadSession {
    pub fn new(metadata: UploadMetadata) -> Self {
        Self {
            stage: FormStage::Idle,
            auth: AuthStatus::Anonymous,
            metadata,
            history: vec![FormStage::Idle],
        }
    }

    pub fn stage(&self) -> FormStage {
        self.stage
    }

    pub fn auth(&self) -> AuthStatus {
        self.auth
    }

    pub fn metadata(&self) -> &UploadMetadata {
        &self.metadata
    }

    pub fn history(&self) -> &[FormStage] {
        &self.history
    }

    pub fn advance(&mut self, next: FormStage) -> Result<(), UploadError> {
        if !self.stage.can_advance_to(next) {
            return Err(self.fail(UploadFailure::OutOfOrder {
                from: self.stage,
                to: next,
            }));
        }
        debug!(video_id = %self.metadata.video_id, from = %self.stage, to = %next, "form stage");
        self.stage = next;
        self.history.push(next);
        Ok(())
    }

    fn mark_authenticated(&mut self) {
        self.auth = AuthStatus::Authenticated;
    }

    fn fail(&self, reason: impl Into<UploadFailure>) -> UploadError {
        UploadError {
            stage: self.stage,
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishResult {
    /// Whether the page showed signs of accepting the submission in time.
    /// Not a confirmation from the platform.
    pub acknowledged: bool,
    pub final_url: String,
    pub stages: Vec<FormStage>,
}

/// Drives the Rumble upload form.
#[derive(Clone, Debug)]
pub struct RumbleUploader {
    upload_url: String,
    credentials: Option<Credentials>,
    category: String,
    timings: UploadTimings,
}

impl RumbleUploader {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            upload_url: UPLOAD_URL.to_string(),
            credentials,
            category: DEFAULT_CATEGORY.to_string(),
            timings: UploadTimings::default(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_timings(mut self, timings: UploadTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into();
        self
    }

    pub fn publish<B>(
        &self,
        browser: &mut B,
        artifact_path: &Path,
        metadata: UploadMetadata,
    ) -> Result<PublishResult, UploadError>
    where
        B: Browser + ?Sized,
    {
        let mut session = UploadSession::new(metadata);

        browser
            .navigate(&self.upload_url)
            .map_err(|err| session.fail(err))?;
        let landed = browser.current_url().map_err(|err| session.fail(err))?;
        if is_login_page(&landed) {
            session.advance(FormStage::Authenticating)?;
            self.authenticate(browser)
                .map_err(|reason| session.fail(reason))?;
            info!("logged in to destination");
        }
        session.mark_authenticated();

        session.advance(FormStage::FileAttached)?;
        self.attach_file(browser, artifact_path)
            .map_err(|reason| session.fail(reason))?;

        session.advance(FormStage::MetadataFilled)?;
        self.fill_metadata(browser, session.metadata())
            .map_err(|reason| session.fail(reason))?;

        session.advance(FormStage::Stage1Submitted)?;
        self.submit_first_stage(browser)
            .map_err(|reason| session.fail(reason))?;

        session.advance(FormStage::TermsAccepted)?;
        self.accept_terms(browser)
            .map_err(|reason| session.fail(reason))?;

        session.advance(FormStage::Published)?;
        let acknowledged = self
            .submit_final_stage(browser)
            .map_err(|reason| session.fail(reason))?;
        let final_url = browser.current_url().map_err(|err| session.fail(err))?;

        if !acknowledged {
            warn!(
                video_id = %session.metadata().video_id,
                "final submit sent but the page did not acknowledge it in time"
            );
        }

        Ok(PublishResult {
            acknowledged,
            final_url,
            stages: session.history().to_vec(),
        })
    }

    fn authenticate<B>(&self, browser: &mut B) -> Result<(), UploadFailure>
    where
        B: Browser + ?Sized,
    {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(UploadFailure::MissingCredentials)?;

        let username = self.element(browser, &Locator::id(LOGIN_USERNAME_ID), Readiness::Present)?;
        browser.send_keys(&username, &credentials.email)?;
        let password = self.element(browser, &Locator::id(LOGIN_PASSWORD_ID), Readiness::Present)?;
        browser.send_keys(&password, &credentials.password)?;
        let button = self.element(
            browser,
            &Locator::class_name(LOGIN_BUTTON_CLASS),
            Readiness::Clickable,
        )?;
        browser.click(&button)?;

        wait_until(self.timings.policy(self.timings.login), || {
            let url = browser.current_url()?;
            Ok((!is_login_page(&url)).then_some(()))
        })
        .map_err(timed_out("login redirect", "resolved"))
    }

    fn attach_file<B>(&self, browser: &mut B, artifact_path: &Path) -> Result<(), UploadFailure>
    where
        B: Browser + ?Sized,
    {
        let absolute =
            std::path::absolute(artifact_path).map_err(|source| UploadFailure::Artifact {
                path: artifact_path.to_path_buf(),
                source,
            })?;
        let input = self.element(browser, &Locator::xpath(FILE_INPUT_XPATH), Readiness::Present)?;
        browser.send_keys(&input, &absolute.to_string_lossy())?;

        // The metadata form unlocks once the server has taken the file.
        wait_for_element(
            browser,
            &Locator::id(TITLE_ID),
            Readiness::Clickable,
            self.timings.policy(self.timings.processing),
        )
        .map_err(timed_out(Locator::id(TITLE_ID), Readiness::Clickable))?;
        Ok(())
    }

    fn fill_metadata<B>(&self, browser: &mut B, metadata: &UploadMetadata) -> Result<(), UploadFailure>
    where
        B: Browser + ?Sized,
    {
        let title = self.element(browser, &Locator::id(TITLE_ID), Readiness::Present)?;
        browser.send_keys(&title, &metadata.title)?;
        let description = self.element(browser, &Locator::id(DESCRIPTION_ID), Readiness::Present)?;
        browser.send_keys(&description, &metadata.description)?;
        if !metadata.tags.is_empty() {
            let tags = self.element(browser, &Locator::id(TAGS_ID), Readiness::Present)?;
            browser.send_keys(&tags, &metadata.tags)?;
        }
        self.select_category(browser)
    }

    /// Type-ahead select: type, wait for suggestions, take the first.
    fn select_category<B>(&self, browser: &mut B) -> Result<(), UploadFailure>
    where
        B: Browser + ?Sized,
    {
        let input = self.element(browser, &Locator::name(CATEGORY_NAME), Readiness::Clickable)?;
        browser.click(&input)?;
        browser.send_keys(&input, &self.category)?;

        let options = Locator::class_name(CATEGORY_OPTIONS_CLASS);
        let suggestion = wait_for_element(
            browser,
            &options,
            Readiness::Present,
            self.timings.policy(self.timings.suggestions),
        )
        .map_err(timed_out(&options, Readiness::Present))?;
        browser.click(&suggestion)?;
        Ok(())
    }

    fn submit_first_stage<B>(&self, browser: &mut B) -> Result<(), UploadFailure>
    where
        B: Browser + ?Sized,
    {
        let submit = self.element(browser, &Locator::id(FIRST_SUBMIT_ID), Readiness::Present)?;
        browser.scripted_click(&submit)?;
        Ok(())
    }

    fn accept_terms<B>(&self, browser: &mut B) -> Result<(), UploadFailure>
    where
        B: Browser + ?Sized,
    {
        let rights = self.element(browser, &Locator::id(RIGHTS_CHECKBOX_ID), Readiness::Present)?;
        let terms = self.element(browser, &Locator::id(TERMS_CHECKBOX_ID), Readiness::Present)?;
        browser.scripted_click(&rights)?;
        browser.scripted_click(&terms)?;
        Ok(())
    }

    /// Returns whether the page acknowledged the submission within the bound.
    fn submit_final_stage<B>(&self, browser: &mut B) -> Result<bool, UploadFailure>
    where
        B: Browser + ?Sized,
    {
        let submit_locator = Locator::id(FINAL_SUBMIT_ID);
        let submit = self.element(browser, &submit_locator, Readiness::Present)?;
        browser.scripted_click(&submit)?;

        let acknowledged = wait_until(self.timings.policy(self.timings.publish_ack), || {
            let url = browser.current_url()?;
            if !url.starts_with(&self.upload_url) {
                return Ok(Some(()));
            }
            Ok(browser.find_element(&submit_locator)?.is_none().then_some(()))
        });
        match acknowledged {
            Ok(()) => Ok(true),
            Err(WaitError::TimedOut { .. }) => Ok(false),
            Err(WaitError::Browser(err)) => Err(err.into()),
        }
    }

    fn element<B>(
        &self,
        browser: &mut B,
        locator: &Locator,
        readiness: Readiness,
    ) -> Result<ElementRef, UploadFailure>
    where
        B: Browser + ?Sized,
    {
        wait_for_element(
            browser,
            locator,
            readiness,
            self.timings.policy(self.timings.element),
        )
        .map_err(timed_out(locator, readiness))
    }
}

fn is_login_page(url: &str) -> bool {
    url.contains("login")
}

fn timed_out(
    target: impl fmt::Display,
    readiness: impl fmt::Display,
) -> impl FnOnce(WaitError) -> UploadFailure {
    let target = target.to_string();
    let readiness = readiness.to_string();
    move |err| match err {
        WaitError::TimedOut { waited } => UploadFailure::TimedOut {
            target,
            readiness,
            waited,
        },
        WaitError::Browser(err) => UploadFailure::Browser(err),
    }
}
