//! WebDriver session: navigation, element lookup, waits and state capture

use std::thread::sleep;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::driver::ChromeDriverService;
use super::options::ChromeOptions;
use super::{BrowserHandle, Locator, LogEntry};
use crate::config::RunConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::http::resolve_url;

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const DRIVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// JSON-over-HTTP transport to one WebDriver session
struct WireClient {
    http: Client,
    session_url: String,
}

impl WireClient {
    fn command(&self, method: Method, path: &str, body: Option<Value>) -> HarnessResult<Value> {
        let url = format!("{}{}", self.session_url, path);
        execute(&self.http, method, &url, body)
    }
}

/// Send one WebDriver command and unwrap its `value`
fn execute(http: &Client, method: Method, url: &str, body: Option<Value>) -> HarnessResult<Value> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send()?;
    let status = response.status();
    let mut payload: Value = response.json()?;
    let value = payload["value"].take();

    if status.is_success() {
        return Ok(value);
    }

    Err(HarnessError::WebDriver {
        error: value["error"].as_str().unwrap_or("unknown error").to_string(),
        message: value["message"]
            .as_str()
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string(),
    })
}

fn locator_body(locator: &Locator) -> Value {
    let (using, value) = locator.strategy();
    json!({ "using": using, "value": value })
}

fn element_id(value: &Value) -> HarnessResult<String> {
    value[ELEMENT_KEY]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| HarnessError::Internal(format!("malformed element reference: {}", value)))
}

/// A browser owned by exactly one test
pub struct BrowserSession {
    wire: WireClient,
    session_id: Option<String>,
    base_url: String,
    service: ChromeDriverService,
}

impl BrowserSession {
    /// Start chromedriver and open a Chrome session configured from `config`
    pub fn launch(config: &RunConfig) -> HarnessResult<Self> {
        let service = ChromeDriverService::start(&config.driver_binary, DRIVER_STARTUP_TIMEOUT)?;
        let options = ChromeOptions::from_config(config);
        Self::connect(service, &options, &config.base_url)
    }

    /// Open a session on an already running driver
    pub fn connect(
        service: ChromeDriverService,
        options: &ChromeOptions,
        base_url: &str,
    ) -> HarnessResult<Self> {
        let http = Client::builder().build()?;

        let created = execute(
            &http,
            Method::POST,
            &format!("{}/session", service.url()),
            Some(options.capabilities()),
        )
        .map_err(|e| match e {
            HarnessError::WebDriver { error, message } => {
                HarnessError::BrowserCrashed(format!("{}: {}", error, message))
            }
            other => HarnessError::BrowserCrashed(other.to_string()),
        })?;

        let session_id = created["sessionId"]
            .as_str()
            .ok_or_else(|| HarnessError::BrowserCrashed(format!("no session id in {}", created)))?
            .to_string();

        info!("Browser session {} started (headless: {})", session_id, options.headless);

        Ok(Self {
            wire: WireClient {
                session_url: format!("{}/session/{}", service.url(), session_id),
                http,
            },
            session_id: Some(session_id),
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> HarnessResult<Value> {
        if self.session_id.is_none() {
            return Err(HarnessError::Internal("browser session already closed".into()));
        }
        self.wire.command(method, path, body)
    }

    fn get_string(&self, path: &str) -> HarnessResult<String> {
        let value = self.command(Method::GET, path, None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Navigate to `path`, relative to the base URL unless absolute
    pub fn goto(&self, path: &str) -> HarnessResult<()> {
        let url = resolve_url(&self.base_url, path);
        debug!("Navigating to {}", url);
        self.command(Method::POST, "/url", Some(json!({ "url": url })))?;
        Ok(())
    }

    pub fn maximize_window(&self) -> HarnessResult<()> {
        self.command(Method::POST, "/window/maximize", Some(json!({})))?;
        Ok(())
    }

    pub fn set_implicit_wait(&self, timeout: Duration) -> HarnessResult<()> {
        self.command(
            Method::POST,
            "/timeouts",
            Some(json!({ "implicit": timeout.as_millis() as u64 })),
        )?;
        Ok(())
    }

    pub fn find_element(&self, locator: &Locator) -> HarnessResult<Element<'_>> {
        let value = self.command(Method::POST, "/element", Some(locator_body(locator)))?;
        Ok(Element {
            session: self,
            id: element_id(&value)?,
        })
    }

    pub fn find_elements(&self, locator: &Locator) -> HarnessResult<Vec<Element<'_>>> {
        let value = self.command(Method::POST, "/elements", Some(locator_body(locator)))?;
        value
            .as_array()
            .map(|items| items.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|item| {
                Ok(Element {
                    session: self,
                    id: element_id(item)?,
                })
            })
            .collect()
    }

    /// Poll until an element matching `locator` is displayed, or fail with
    /// [`HarnessError::WaitTimeout`] once `timeout` has elapsed
    pub fn wait_for_visible(&self, locator: &Locator, timeout: Duration) -> HarnessResult<Element<'_>> {
        let deadline = Instant::now() + timeout;

        loop {
            for element in self.find_elements(locator)? {
                // Elements can go stale between lookup and check
                if element.is_displayed().unwrap_or(false) {
                    return Ok(element);
                }
            }

            if Instant::now() >= deadline {
                return Err(HarnessError::WaitTimeout {
                    locator: locator.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            sleep(POLL_INTERVAL);
        }
    }

    /// Poll `condition` until it yields a value or `timeout` elapses
    pub fn wait_until<T, F>(&self, description: &str, timeout: Duration, mut condition: F) -> HarnessResult<T>
    where
        F: FnMut(&Self) -> HarnessResult<Option<T>>,
    {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(value) = condition(self)? {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Err(HarnessError::WaitTimeout {
                    locator: description.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            sleep(POLL_INTERVAL);
        }
    }
}

impl BrowserHandle for BrowserSession {
    fn screenshot_png(&self) -> HarnessResult<Vec<u8>> {
        let encoded = self.get_string("/screenshot")?;
        Ok(STANDARD.decode(encoded)?)
    }

    fn page_source(&self) -> HarnessResult<String> {
        self.get_string("/source")
    }

    fn current_url(&self) -> HarnessResult<String> {
        self.get_string("/url")
    }

    fn title(&self) -> HarnessResult<String> {
        self.get_string("/title")
    }

    fn browser_logs(&self) -> HarnessResult<Vec<LogEntry>> {
        let value = self.command(Method::POST, "/se/log", Some(json!({ "type": "browser" })))?;
        Ok(serde_json::from_value(value)?)
    }

    fn quit(&mut self) -> HarnessResult<()> {
        let deleted = match self.session_id.take() {
            Some(id) => {
                debug!("Closing browser session {}", id);
                self.wire.command(Method::DELETE, "", None).map(|_| ())
            }
            None => Ok(()),
        };
        let stopped = self.service.stop();
        deleted.and(stopped)
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let _ = self.quit();
    }
}

/// Reference to an element in a live [`BrowserSession`]
pub struct Element<'s> {
    session: &'s BrowserSession,
    id: String,
}

impl<'s> Element<'s> {
    fn path(&self, suffix: &str) -> String {
        format!("/element/{}{}", self.id, suffix)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn click(&self) -> HarnessResult<()> {
        self.session.command(Method::POST, &self.path("/click"), Some(json!({})))?;
        Ok(())
    }

    pub fn clear(&self) -> HarnessResult<()> {
        self.session.command(Method::POST, &self.path("/clear"), Some(json!({})))?;
        Ok(())
    }

    /// Type `text`; may contain [`keys`](super::keys) codes
    pub fn send_keys(&self, text: &str) -> HarnessResult<()> {
        self.session
            .command(Method::POST, &self.path("/value"), Some(json!({ "text": text })))?;
        Ok(())
    }

    pub fn text(&self) -> HarnessResult<String> {
        self.session.get_string(&self.path("/text"))
    }

    pub fn is_displayed(&self) -> HarnessResult<bool> {
        let value = self.session.command(Method::GET, &self.path("/displayed"), None)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub fn attribute(&self, name: &str) -> HarnessResult<Option<String>> {
        let value = self
            .session
            .command(Method::GET, &self.path(&format!("/attribute/{}", name)), None)?;
        Ok(value.as_str().map(str::to_string))
    }

    pub fn find_element(&self, locator: &Locator) -> HarnessResult<Element<'s>> {
        let value = self
            .session
            .command(Method::POST, &self.path("/element"), Some(locator_body(locator)))?;
        Ok(Element {
            session: self.session,
            id: element_id(&value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Mock, ServerGuard};

    #[test]
    fn test_execute_unwraps_value() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/session/abc/title")
            .with_status(200)
            .with_body(r#"{"value":"SonarQube"}"#)
            .create();

        let value = execute(
            &Client::new(),
            Method::GET,
            &format!("{}/session/abc/title", server.url()),
            None,
        )
        .unwrap();
        assert_eq!(value, "SonarQube");
    }

    #[test]
    fn test_execute_maps_wire_errors() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/session/abc/element")
            .with_status(404)
            .with_body(r#"{"value":{"error":"no such element","message":"no such element: Unable to locate element\n(Session info: chrome=120)","stacktrace":""}}"#)
            .create();

        let err = execute(
            &Client::new(),
            Method::POST,
            &format!("{}/session/abc/element", server.url()),
            Some(locator_body(&Locator::id("missing"))),
        )
        .unwrap_err();

        assert!(err.is_not_found());
        match err {
            HarnessError::WebDriver { message, .. } => {
                assert_eq!(message, "no such element: Unable to locate element");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_element_id_rejects_malformed_reference() {
        assert!(element_id(&json!({"ELEMENT": "x"})).is_err());
        assert_eq!(element_id(&json!({ELEMENT_KEY: "e-1"})).unwrap(), "e-1");
    }

    fn new_session_mock(server: &mut ServerGuard) -> Mock {
        server
            .mock("POST", "/session")
            .match_body(Matcher::PartialJson(json!({
                "capabilities": {"alwaysMatch": {"browserName": "chrome"}}
            })))
            .with_status(200)
            .with_body(r#"{"value":{"sessionId":"abc","capabilities":{}}}"#)
            .create()
    }

    fn headless() -> ChromeOptions {
        ChromeOptions {
            headless: true,
            extra_args: vec![],
        }
    }

    fn connected(server: &mut ServerGuard, base_url: &str) -> BrowserSession {
        let _create = new_session_mock(server);
        BrowserSession::connect(ChromeDriverService::attach(&server.url()), &headless(), base_url).unwrap()
    }

    #[test]
    fn test_connect_reads_session_id() {
        let mut server = mockito::Server::new();
        let session = connected(&mut server, "http://localhost:9000");
        assert_eq!(session.session_id(), Some("abc"));
    }

    #[test]
    fn test_rejected_session_is_browser_crashed() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/session")
            .with_status(500)
            .with_body(r#"{"value":{"error":"session not created","message":"Chrome failed to start: exited abnormally"}}"#)
            .create();

        let err = BrowserSession::connect(ChromeDriverService::attach(&server.url()), &headless(), "http://x")
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::BrowserCrashed(ref m) if m.contains("session not created")));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_non_json_session_reply_is_browser_crashed() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/session")
            .with_status(500)
            .with_body("chrome crashed")
            .create();

        let err = BrowserSession::connect(ChromeDriverService::attach(&server.url()), &headless(), "http://x")
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::BrowserCrashed(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unreachable_driver_is_browser_crashed() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let driver = ChromeDriverService::attach(&format!("http://127.0.0.1:{}", port));

        let err = BrowserSession::connect(driver, &headless(), "http://x").err().unwrap();
        assert!(matches!(err, HarnessError::BrowserCrashed(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_goto_joins_onto_base_url() {
        let mut server = mockito::Server::new();
        let navigate = server
            .mock("POST", "/session/abc/url")
            .match_body(Matcher::Json(json!({"url": "http://app:9000/projects"})))
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .create();

        let session = connected(&mut server, "http://app:9000/");
        session.goto("/projects").unwrap();
        navigate.assert();
    }

    #[test]
    fn test_find_element_and_read_text() {
        let mut server = mockito::Server::new();
        let _find = server
            .mock("POST", "/session/abc/element")
            .match_body(Matcher::Json(json!({"using": "css selector", "value": "[id=\"login\"]"})))
            .with_status(200)
            .with_body(format!(r#"{{"value":{{"{}":"e-1"}}}}"#, ELEMENT_KEY))
            .create();
        let _text = server
            .mock("GET", "/session/abc/element/e-1/text")
            .with_status(200)
            .with_body(r#"{"value":"Log in"}"#)
            .create();

        let session = connected(&mut server, "http://app:9000");
        let element = session.find_element(&Locator::id("login")).unwrap();
        assert_eq!(element.id(), "e-1");
        assert_eq!(element.text().unwrap(), "Log in");
    }

    #[test]
    fn test_wait_for_visible_times_out_as_not_found() {
        let mut server = mockito::Server::new();
        let _elements = server
            .mock("POST", "/session/abc/elements")
            .with_status(200)
            .with_body(r#"{"value":[]}"#)
            .create();

        let session = connected(&mut server, "http://app:9000");
        let start = Instant::now();
        let err = session
            .wait_for_visible(&Locator::id("login"), Duration::from_millis(300))
            .err()
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found within 300 ms: id=login");
    }

    #[test]
    fn test_wait_for_visible_returns_displayed_element() {
        let mut server = mockito::Server::new();
        let _elements = server
            .mock("POST", "/session/abc/elements")
            .with_status(200)
            .with_body(format!(
                r#"{{"value":[{{"{key}":"hidden"}},{{"{key}":"shown"}}]}}"#,
                key = ELEMENT_KEY
            ))
            .create();
        let _hidden = server
            .mock("GET", "/session/abc/element/hidden/displayed")
            .with_status(200)
            .with_body(r#"{"value":false}"#)
            .create();
        let _shown = server
            .mock("GET", "/session/abc/element/shown/displayed")
            .with_status(200)
            .with_body(r#"{"value":true}"#)
            .create();

        let session = connected(&mut server, "http://app:9000");
        let element = session
            .wait_for_visible(&Locator::xpath("//button"), Duration::from_secs(2))
            .unwrap();
        assert_eq!(element.id(), "shown");
    }

    #[test]
    fn test_wait_until_polls_condition() {
        let mut server = mockito::Server::new();
        let session = connected(&mut server, "http://app:9000");

        let mut calls = 0;
        let value = session
            .wait_until("third poll", Duration::from_secs(2), |_| {
                calls += 1;
                Ok((calls == 3).then_some(calls))
            })
            .unwrap();
        assert_eq!(value, 3);

        let err = session
            .wait_until("never", Duration::from_millis(100), |_| Ok(None::<()>))
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::WaitTimeout { .. }));
    }

    #[test]
    fn test_quit_is_idempotent_through_drop() {
        let mut server = mockito::Server::new();
        let delete = server
            .mock("DELETE", "/session/abc")
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .expect(1)
            .create();

        let mut session = connected(&mut server, "http://app:9000");
        session.quit().unwrap();
        session.quit().unwrap();
        assert!(session.session_id().is_none());
        assert!(session.title().is_err());
        drop(session);

        delete.assert();
    }
}
