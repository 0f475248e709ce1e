#![forbid(unsafe_code)]

//! Browser automation capability and a W3C WebDriver implementation of it.
//!
//! The pipeline only ever talks to [`Browser`]. [`WebDriverClient`] speaks the
//! WebDriver JSON wire protocol over plain HTTP, which is what chromedriver,
//! geckodriver and Selenium grids expose. Waiting is always bounded: see
//! [`wait_until`] and [`wait_for_element`].

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

/// Key the W3C protocol uses for element references in JSON payloads.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("WebDriver transport error: {0}")]
    Transport(String),

    #[error("WebDriver error (status {status}) {error}: {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },

    #[error("unexpected WebDriver response: {0}")]
    Unexpected(String),

    #[error("browser session already closed")]
    Closed,
}

impl BrowserError {
    /// The element was found but the page re-rendered before it was used.
    pub fn is_stale_element(&self) -> bool {
        matches!(self, BrowserError::Protocol { error, .. } if error == "stale element reference")
    }
}

/// How to find an element on the page.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Locator {
    Id(String),
    Name(String),
    ClassName(String),
    XPath(String),
}

impl Locator {
    pub fn id(value: &str) -> Self {
        Self::Id(value.to_string())
    }

    pub fn name(value: &str) -> Self {
        Self::Name(value.to_string())
    }

    pub fn class_name(value: &str) -> Self {
        Self::ClassName(value.to_string())
    }

    pub fn xpath(value: &str) -> Self {
        Self::XPath(value.to_string())
    }

    /// WebDriver `(using, value)` pair. W3C dropped the id/name/class
    /// strategies, so those become attribute CSS selectors.
    fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Id(id) => ("css selector", format!("[id=\"{}\"]", css_escape(id))),
            Locator::Name(name) => ("css selector", format!("[name=\"{}\"]", css_escape(name))),
            Locator::ClassName(class) => ("css selector", format!(".{class}")),
            Locator::XPath(path) => ("xpath", path.clone()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{id}"),
            Locator::Name(name) => write!(f, "[name={name}]"),
            Locator::ClassName(class) => write!(f, ".{class}"),
            Locator::XPath(path) => write!(f, "{path}"),
        }
    }
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Opaque handle to an element found in the current page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementRef(pub String);

impl ElementRef {
    fn to_json(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

/// The subset of browser automation the uploader relies on.
pub trait Browser {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    fn current_url(&mut self) -> Result<String, BrowserError>;

    /// `Ok(None)` when nothing matches right now.
    fn find_element(&mut self, locator: &Locator) -> Result<Option<ElementRef>, BrowserError>;

    /// Displayed and enabled, i.e. a native click would land.
    fn is_interactable(&mut self, element: &ElementRef) -> Result<bool, BrowserError>;

    fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError>;

    /// Native click, subject to overlay interception.
    fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError>;

    /// Runs `script` synchronously in the page; `args` are exposed as
    /// `arguments[..]`.
    fn execute_script(&mut self, script: &str, args: &[ElementRef])
    -> Result<Value, BrowserError>;

    fn quit(&mut self) -> Result<(), BrowserError>;

    /// Click dispatched from JavaScript, which overlays cannot intercept.
    fn scripted_click(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        self.execute_script("arguments[0].click();", std::slice::from_ref(element))?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Present,
    Clickable,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Present => f.write_str("present"),
            Readiness::Clickable => f.write_str("clickable"),
        }
    }
}

/// Bound and cadence for one polling wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("condition not met within {waited:?}")]
    TimedOut { waited: Duration },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Polls `check` until it yields a value or the policy's timeout passes.
/// The check always runs at least once.
pub fn wait_until<T, F>(policy: WaitPolicy, mut check: F) -> Result<T, WaitError>
where
    F: FnMut() -> Result<Option<T>, BrowserError>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = check()? {
            return Ok(value);
        }
        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(WaitError::TimedOut { waited });
        }
        let remaining = policy.timeout - waited;
        thread::sleep(policy.poll_interval.min(remaining));
    }
}

pub fn wait_for_element<B>(
    browser: &mut B,
    locator: &Locator,
    readiness: Readiness,
    policy: WaitPolicy,
) -> Result<ElementRef, WaitError>
where
    B: Browser + ?Sized,
{
    wait_until(policy, || {
        match locate_ready(browser, locator, readiness) {
            Err(err) if err.is_stale_element() => Ok(None),
            other => other,
        }
    })
}

fn locate_ready<B>(
    browser: &mut B,
    locator: &Locator,
    readiness: Readiness,
) -> Result<Option<ElementRef>, BrowserError>
where
    B: Browser + ?Sized,
{
    let Some(element) = browser.find_element(locator)? else {
        return Ok(None);
    };
    match readiness {
        Readiness::Present => Ok(Some(element)),
        Readiness::Clickable => {
            if browser.is_interactable(&element)? {
                Ok(Some(element))
            } else {
                Ok(None)
            }
        }
    }
}

/// Scoped owner of the one browser a batch runs against. The underlying
/// browser quits exactly once: on [`BrowserSession::close`], or on drop when
/// the batch unwinds early.
pub struct BrowserSession<B: Browser> {
    browser: Option<B>,
}

impl<B: Browser> BrowserSession<B> {
    pub fn new(browser: B) -> Self {
        Self {
            browser: Some(browser),
        }
    }

    pub fn browser(&mut self) -> Result<&mut B, BrowserError> {
        self.browser.as_mut().ok_or(BrowserError::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.browser.is_some()
    }

    pub fn close(mut self) -> Result<(), BrowserError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), BrowserError> {
        match self.browser.take() {
            Some(mut browser) => browser.quit(),
            None => Ok(()),
        }
    }
}

impl<B: Browser> Drop for BrowserSession<B> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "failed to close browser session");
        }
    }
}

/// Options for the browser the driver launches.
#[derive(Clone, Debug, Default)]
pub struct LaunchOptions {
    pub headless: bool,
}

impl LaunchOptions {
    fn capabilities(&self) -> Value {
        let mut args = vec!["--start-maximized"];
        if self.headless {
            args.push("--headless=new");
            args.push("--window-size=1920,1080");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct ValueEnvelope {
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSessionValue {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorValue {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// WebDriver client bound to one remote session.
pub struct WebDriverClient {
    agent: ureq::Agent,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Starts a new browser session on the driver at `base_url`.
    pub fn connect(base_url: &str, options: &LaunchOptions) -> Result<Self, BrowserError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();
        let base_url = base_url.trim_end_matches('/').to_string();
        let response = agent
            .post(&format!("{base_url}/session"))
            .send_json(options.capabilities());
        let value = read_value(response)?;
        let session: NewSessionValue = serde_json::from_value(value)
            .map_err(|err| BrowserError::Unexpected(format!("new session: {err}")))?;
        debug!(session_id = %session.session_id, "webdriver session started");
        Ok(Self {
            agent,
            base_url,
            session_id: session.session_id,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    fn get(&self, path: &str) -> Result<Value, BrowserError> {
        read_value(self.agent.get(&self.endpoint(path)).call())
    }

    fn post(&self, path: &str, body: Value) -> Result<Value, BrowserError> {
        read_value(self.agent.post(&self.endpoint(path)).send_json(body))
    }

    fn element_path(element: &ElementRef, action: &str) -> String {
        format!("/element/{}/{}", element.0, action)
    }
}

impl Browser for WebDriverClient {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.post("/url", json!({ "url": url }))?;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, BrowserError> {
        match self.get("/url")? {
            Value::String(url) => Ok(url),
            other => Err(BrowserError::Unexpected(format!("current url: {other}"))),
        }
    }

    fn find_element(&mut self, locator: &Locator) -> Result<Option<ElementRef>, BrowserError> {
        let (using, value) = locator.strategy();
        match self.post("/element", json!({ "using": using, "value": value })) {
            Ok(found) => element_from_value(&found).map(Some),
            Err(BrowserError::Protocol { error, .. }) if error == "no such element" => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn is_interactable(&mut self, element: &ElementRef) -> Result<bool, BrowserError> {
        let displayed = self.get(&Self::element_path(element, "displayed"))?;
        let enabled = self.get(&Self::element_path(element, "enabled"))?;
        Ok(displayed.as_bool().unwrap_or(false) && enabled.as_bool().unwrap_or(false))
    }

    fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
        self.post(
            &Self::element_path(element, "value"),
            json!({ "text": text }),
        )?;
        Ok(())
    }

    fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        self.post(&Self::element_path(element, "click"), json!({}))?;
        Ok(())
    }

    fn execute_script(
        &mut self,
        script: &str,
        args: &[ElementRef],
    ) -> Result<Value, BrowserError> {
        let args: Vec<Value> = args.iter().map(ElementRef::to_json).collect();
        self.post("/execute/sync", json!({ "script": script, "args": args }))
    }

    fn quit(&mut self) -> Result<(), BrowserError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        read_value(self.agent.delete(&url).call())?;
        debug!(session_id = %self.session_id, "webdriver session closed");
        Ok(())
    }
}

/// Unwraps the `{"value": ..}` envelope and maps WebDriver error bodies.
fn read_value(response: Result<ureq::Response, ureq::Error>) -> Result<Value, BrowserError> {
    match response {
        Ok(response) => {
            let envelope: ValueEnvelope = response
                .into_json()
                .map_err(|err| BrowserError::Unexpected(err.to_string()))?;
            Ok(envelope.value)
        }
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(protocol_error(status, &body))
        }
        Err(ureq::Error::Transport(transport)) => {
            Err(BrowserError::Transport(transport.to_string()))
        }
    }
}

fn protocol_error(status: u16, body: &str) -> BrowserError {
    let parsed = serde_json::from_str::<ValueEnvelope>(body)
        .ok()
        .and_then(|envelope| serde_json::from_value::<ErrorValue>(envelope.value).ok());
    match parsed {
        Some(value) => BrowserError::Protocol {
            status,
            error: value.error,
            message: value.message,
        },
        None => BrowserError::Protocol {
            status,
            error: "unknown error".into(),
            message: body.to_string(),
        },
    }
}

fn element_from_value(value: &Value) -> Result<ElementRef, BrowserError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| BrowserError::Unexpected(format!("not an element reference: {value}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Scripted page model. Elements become findable after a number of
    /// lookups, which lets tests exercise the polling waits.
    #[derive(Default)]
    pub(crate) struct FakeBrowser {
        pub url: String,
        /// locator -> lookups still answering "not found"
        pub appear_after: HashMap<Locator, usize>,
        pub missing: Vec<Locator>,
        pub disabled: Vec<Locator>,
        pub typed: Vec<(Locator, String)>,
        pub native_clicks: Vec<Locator>,
        pub scripted_clicks: Vec<Locator>,
        pub visited: Vec<String>,
        /// url a navigation to the key lands on
        pub redirects: HashMap<String, String>,
        /// url after clicking the locator
        pub click_navigates: HashMap<Locator, String>,
        /// locators that vanish once the given locator is clicked
        pub click_removes: HashMap<Locator, Locator>,
        /// vanished until the next navigation
        pub removed: Vec<Locator>,
        /// shared so tests can count quits after the session consumed us
        pub quits: Rc<Cell<usize>>,
        pub fail_quit: bool,
        /// readiness checks still answering "stale element reference"
        pub stale_checks: usize,
    }

    impl FakeBrowser {
        fn locator_of(&self, element: &ElementRef) -> Locator {
            match element.0.split_once(':') {
                Some(("id", v)) => Locator::id(v),
                Some(("name", v)) => Locator::name(v),
                Some(("class", v)) => Locator::class_name(v),
                Some(("xpath", v)) => Locator::xpath(v),
                _ => panic!("unknown element {}", element.0),
            }
        }

        fn element_of(locator: &Locator) -> ElementRef {
            match locator {
                Locator::Id(v) => ElementRef(format!("id:{v}")),
                Locator::Name(v) => ElementRef(format!("name:{v}")),
                Locator::ClassName(v) => ElementRef(format!("class:{v}")),
                Locator::XPath(v) => ElementRef(format!("xpath:{v}")),
            }
        }

        fn after_click(&mut self, locator: &Locator) {
            if let Some(url) = self.click_navigates.get(locator) {
                self.url = url.clone();
            }
            if let Some(removed) = self.click_removes.get(locator) {
                self.removed.push(removed.clone());
            }
        }
    }

    impl Browser for FakeBrowser {
        fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
            self.visited.push(url.to_string());
            self.removed.clear();
            self.url = self
                .redirects
                .get(url)
                .cloned()
                .unwrap_or_else(|| url.to_string());
            Ok(())
        }

        fn current_url(&mut self) -> Result<String, BrowserError> {
            Ok(self.url.clone())
        }

        fn find_element(&mut self, locator: &Locator) -> Result<Option<ElementRef>, BrowserError> {
            if self.missing.contains(locator) || self.removed.contains(locator) {
                return Ok(None);
            }
            if let Some(remaining) = self.appear_after.get_mut(locator)
                && *remaining > 0
            {
                *remaining -= 1;
                return Ok(None);
            }
            Ok(Some(Self::element_of(locator)))
        }

        fn is_interactable(&mut self, element: &ElementRef) -> Result<bool, BrowserError> {
            if self.stale_checks > 0 {
                self.stale_checks -= 1;
                return Err(BrowserError::Protocol {
                    status: 404,
                    error: "stale element reference".into(),
                    message: "element is not attached to the page document".into(),
                });
            }
            let locator = self.locator_of(element);
            Ok(!self.disabled.contains(&locator))
        }

        fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
            let locator = self.locator_of(element);
            self.typed.push((locator, text.to_string()));
            Ok(())
        }

        fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
            let locator = self.locator_of(element);
            self.native_clicks.push(locator.clone());
            self.after_click(&locator);
            Ok(())
        }

        fn execute_script(
            &mut self,
            script: &str,
            args: &[ElementRef],
        ) -> Result<Value, BrowserError> {
            assert_eq!(script, "arguments[0].click();");
            let locator = self.locator_of(&args[0]);
            self.scripted_clicks.push(locator.clone());
            self.after_click(&locator);
            Ok(Value::Null)
        }

        fn quit(&mut self) -> Result<(), BrowserError> {
            self.quits.set(self.quits.get() + 1);
            if self.fail_quit {
                return Err(BrowserError::Transport("driver gone".into()));
            }
            Ok(())
        }
    }

    fn quick() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(50), Duration::ZERO)
    }

    #[test]
    fn locators_map_to_w3c_strategies() {
        assert_eq!(
            Locator::id("title").strategy(),
            ("css selector", "[id=\"title\"]".to_string())
        );
        assert_eq!(
            Locator::name("primary-category").strategy(),
            ("css selector", "[name=\"primary-category\"]".to_string())
        );
        assert_eq!(
            Locator::class_name("login-button").strategy(),
            ("css selector", ".login-button".to_string())
        );
        assert_eq!(
            Locator::xpath("//input[@type='file']").strategy(),
            ("xpath", "//input[@type='file']".to_string())
        );
    }

    #[test]
    fn protocol_error_reads_webdriver_body() {
        let body = r#"{"value":{"error":"no such element","message":"Unable to locate","stacktrace":""}}"#;
        match protocol_error(404, body) {
            BrowserError::Protocol { status, error, .. } => {
                assert_eq!(status, 404);
                assert_eq!(error, "no such element");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            protocol_error(500, "<html>"),
            BrowserError::Protocol { status: 500, .. }
        ));
    }

    #[test]
    fn element_reference_is_read_from_w3c_key() {
        let value = json!({ ELEMENT_KEY: "abc-123" });
        assert_eq!(element_from_value(&value).unwrap(), ElementRef("abc-123".into()));
        assert!(element_from_value(&json!({"ELEMENT": "legacy"})).is_err());
    }

    #[test]
    fn headless_capabilities_add_arguments() {
        let caps = LaunchOptions { headless: true }.capabilities();
        let args = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert!(args.as_array().unwrap().iter().any(|a| a == "--headless=new"));
        let caps = LaunchOptions::default().capabilities();
        let args = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert_eq!(args.as_array().unwrap().len(), 1);
    }

    #[test]
    fn wait_until_polls_until_value() {
        let mut calls = 0;
        let value = wait_until(quick(), || {
            calls += 1;
            Ok((calls == 3).then_some(calls))
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn wait_until_times_out() {
        let policy = WaitPolicy::new(Duration::from_millis(20), Duration::from_millis(5));
        let err = wait_until::<(), _>(policy, || Ok(None)).unwrap_err();
        match err {
            WaitError::TimedOut { waited } => assert!(waited >= Duration::from_millis(20)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wait_until_propagates_browser_errors() {
        let err = wait_until::<(), _>(quick(), || Err(BrowserError::Closed)).unwrap_err();
        assert!(matches!(err, WaitError::Browser(BrowserError::Closed)));
    }

    #[test]
    fn wait_for_element_respects_readiness() {
        let mut browser = FakeBrowser::default();
        browser.appear_after.insert(Locator::id("late"), 2);
        let element =
            wait_for_element(&mut browser, &Locator::id("late"), Readiness::Present, quick())
                .unwrap();
        assert_eq!(element, ElementRef("id:late".into()));

        browser.disabled.push(Locator::id("locked"));
        let err = wait_for_element(
            &mut browser,
            &Locator::id("locked"),
            Readiness::Clickable,
            WaitPolicy::new(Duration::from_millis(10), Duration::from_millis(2)),
        )
        .unwrap_err();
        assert!(matches!(err, WaitError::TimedOut { .. }));
    }

    #[test]
    fn stale_element_keeps_waiting() {
        let mut browser = FakeBrowser {
            stale_checks: 2,
            ..FakeBrowser::default()
        };
        let element = wait_for_element(
            &mut browser,
            &Locator::id("title"),
            Readiness::Clickable,
            WaitPolicy::new(Duration::from_secs(1), Duration::from_millis(1)),
        )
        .unwrap();
        assert_eq!(element, ElementRef("id:title".into()));
        assert_eq!(browser.stale_checks, 0);
    }

    #[test]
    fn other_protocol_errors_end_the_wait() {
        let err = wait_until::<(), _>(quick(), || {
            Err(BrowserError::Protocol {
                status: 500,
                error: "unknown error".into(),
                message: "chrome not reachable".into(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, WaitError::Browser(BrowserError::Protocol { status: 500, .. })));
        let stale = BrowserError::Protocol {
            status: 404,
            error: "stale element reference".into(),
            message: String::new(),
        };
        assert!(stale.is_stale_element());
        assert!(!BrowserError::Closed.is_stale_element());
    }

    mod webdriver_http {
        use super::super::*;
        use httpmock::prelude::*;

        fn connected(server: &MockServer) -> WebDriverClient {
            let session = server.mock(|when, then| {
                when.method(POST).path("/session");
                then.status(200)
                    .json_body(json!({ "value": { "sessionId": "s1", "capabilities": {} } }));
            });
            let client = WebDriverClient::connect(&server.base_url(), &LaunchOptions::default())
                .unwrap();
            session.assert();
            client
        }

        #[test]
        fn find_element_returns_reference() {
            let server = MockServer::start();
            let mut client = connected(&server);
            let find = server.mock(|when, then| {
                when.method(POST)
                    .path("/session/s1/element")
                    .json_body(json!({ "using": "css selector", "value": "[id=\"title\"]" }));
                then.status(200)
                    .json_body(json!({ "value": { ELEMENT_KEY: "el-1" } }));
            });

            let found = client.find_element(&Locator::id("title")).unwrap();
            assert_eq!(found, Some(ElementRef("el-1".into())));
            find.assert();
        }

        #[test]
        fn no_such_element_is_not_found() {
            let server = MockServer::start();
            let mut client = connected(&server);
            server.mock(|when, then| {
                when.method(POST).path("/session/s1/element");
                then.status(404).json_body(json!({
                    "value": {
                        "error": "no such element",
                        "message": "Unable to locate element",
                        "stacktrace": ""
                    }
                }));
            });

            assert_eq!(client.find_element(&Locator::class_name("gone")).unwrap(), None);
        }

        #[test]
        fn other_status_errors_surface() {
            let server = MockServer::start();
            let mut client = connected(&server);
            server.mock(|when, then| {
                when.method(GET).path("/session/s1/url");
                then.status(500).json_body(json!({
                    "value": { "error": "unknown error", "message": "chrome not reachable" }
                }));
            });

            match client.current_url() {
                Err(BrowserError::Protocol { status, error, .. }) => {
                    assert_eq!(status, 500);
                    assert_eq!(error, "unknown error");
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn interactable_needs_displayed_and_enabled() {
            let server = MockServer::start();
            let mut client = connected(&server);
            server.mock(|when, then| {
                when.method(GET).path("/session/s1/element/el-1/displayed");
                then.status(200).json_body(json!({ "value": true }));
            });
            server.mock(|when, then| {
                when.method(GET).path("/session/s1/element/el-1/enabled");
                then.status(200).json_body(json!({ "value": false }));
            });

            assert!(!client.is_interactable(&ElementRef("el-1".into())).unwrap());
        }

        #[test]
        fn quit_deletes_session() {
            let server = MockServer::start();
            let mut client = connected(&server);
            let delete = server.mock(|when, then| {
                when.method(DELETE).path("/session/s1");
                then.status(200).json_body(json!({ "value": null }));
            });

            client.quit().unwrap();
            delete.assert_hits(1);
        }
    }

    #[test]
    fn session_quits_once_on_close() {
        let browser = FakeBrowser::default();
        let quits = browser.quits.clone();
        let mut session = BrowserSession::new(browser);
        assert!(session.is_open());
        session.browser().unwrap().navigate("https://example.com").unwrap();
        session.close().unwrap();
        assert_eq!(quits.get(), 1);
    }

    #[test]
    fn session_quits_on_drop() {
        let browser = FakeBrowser {
            fail_quit: true,
            ..FakeBrowser::default()
        };
        let quits = browser.quits.clone();
        drop(BrowserSession::new(browser));
        assert_eq!(quits.get(), 1);
    }

    #[test]
    fn session_shutdown_is_idempotent() {
        let mut session = BrowserSession::new(FakeBrowser::default());
        session.shutdown().unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.browser(), Err(BrowserError::Closed)));
        session.shutdown().unwrap();
    }
}
