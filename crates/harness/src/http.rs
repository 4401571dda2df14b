//! Run-scoped HTTP session with transparent interaction recording
//!
//! Every call through [`HttpSession`] runs first, then is turned into an
//! [`InteractionRecord`] that is attached to the running test and kept as the
//! session's last record. Recording never changes what the caller sees.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::Credentials;
use crate::error::{HarnessError, HarnessResult};
use crate::record::{params_value, InteractionRecord, Method, RequestBody, ResponsePayload};
use crate::report::Reporter;

/// Join a relative `path` onto `base` with exactly one slash. Absolute
/// `http://` and `https://` URLs are returned unchanged.
pub fn resolve_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Per-call options: headers, query parameters, body, auth and timeout.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    headers: BTreeMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
    auth: Option<Credentials>,
    timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Form-encoded body, e.g. `form([("name", "MyProject")])`.
    pub fn form<K, V, I>(mut self, fields: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn basic_auth(mut self, credentials: &Credentials) -> Self {
        self.auth = Some(credentials.clone());
        self
    }

    /// Optional `basic_auth`, convenient with `RunConfig::credentials`.
    pub fn auth(mut self, credentials: Option<&Credentials>) -> Self {
        self.auth = credentials.cloned();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully buffered response, exactly as the transport returned it.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    url: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> HarnessResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A failed call, with the status line when one arrived before the failure
struct DispatchError {
    status: Option<StatusCode>,
    error: HarnessError,
}

impl DispatchError {
    fn new(status: Option<StatusCode>, error: reqwest::Error) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

pub struct HttpSession {
    base_url: String,
    client: Client,
    reporter: Reporter,
    last_record: Option<InteractionRecord>,
}

impl HttpSession {
    pub fn new(base_url: &str, reporter: Reporter) -> HarnessResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("evidence-harness/", env!("CARGO_PKG_VERSION")))
            .build()?;

        debug!("Opened HTTP session for {}", base_url);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            reporter,
            last_record: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The most recent call's record, if any call was made in this test.
    pub fn last_record(&self) -> Option<&InteractionRecord> {
        self.last_record.as_ref()
    }

    /// Forget the last record; called when a new test starts.
    pub fn reset_last_record(&mut self) {
        self.last_record = None;
    }

    pub fn get(&mut self, path: &str, options: RequestOptions) -> HarnessResult<ApiResponse> {
        self.request(Method::Get, path, options)
    }

    pub fn post(&mut self, path: &str, options: RequestOptions) -> HarnessResult<ApiResponse> {
        self.request(Method::Post, path, options)
    }

    pub fn put(&mut self, path: &str, options: RequestOptions) -> HarnessResult<ApiResponse> {
        self.request(Method::Put, path, options)
    }

    pub fn delete(&mut self, path: &str, options: RequestOptions) -> HarnessResult<ApiResponse> {
        self.request(Method::Delete, path, options)
    }

    /// Dispatch one call, record it, and hand back the untouched result.
    pub fn request(
        &mut self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> HarnessResult<ApiResponse> {
        let url = resolve_url(&self.base_url, path);
        debug!("{} {}", method, url);

        let result = self.dispatch(method, &url, &options);

        let (status_code, response) = match &result {
            Ok(resp) => (Some(resp.status()), ResponsePayload::from_bytes(&resp.body)),
            Err(failed) => (
                failed.status.map(|status| status.as_u16()),
                ResponsePayload::ResponseText(failed.error.to_string()),
            ),
        };
        let record = InteractionRecord {
            method,
            url,
            request_headers: options.headers,
            request_params: params_value(&options.query),
            request_body: options.body,
            status_code,
            response,
        };

        self.reporter.attach_json(&record.attachment_name(), &record);
        self.last_record = Some(record);

        result.map_err(|failed| failed.error)
    }

    fn dispatch(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<ApiResponse, DispatchError> {
        let mut builder = self.client.request(method.into(), url);

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        builder = match &options.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };
        if let Some(credentials) = &options.auth {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().map_err(|e| DispatchError::new(None, e))?;
        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .map_err(|e| DispatchError::new(Some(status), e))?
            .to_vec();

        Ok(ApiResponse {
            status,
            url: final_url,
            headers,
            body,
        })
    }

    /// Release the connection pool. Never fails.
    pub fn close(self) {
        debug!("Closing HTTP session for {}", self.base_url);
    }
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("base_url", &self.base_url)
            .field("last_record", &self.last_record)
            .finish_non_exhaustive()
    }
}
