//! Minimal authenticated HTTP client for the cloud REST APIs (curl easy handle).
//!
//! Runs in the calling thread. Each call builds a fresh handle; responses are
//! buffered in memory, which is fine for JSON metadata and upload acks.

use std::str;
use std::time::Duration;

use serde::de::DeserializeOwned;

const ERROR_BODY_LIMIT: usize = 512;

/// Buffered response: status, raw header lines of the final response, body.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u32,
    pub headers: Vec<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    /// Body as text, truncated for use in error messages.
    pub fn error_text(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        match text.char_indices().nth(ERROR_BODY_LIMIT) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text.to_string(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Bearer-token client shared by the object store and warehouse backends.
#[derive(Clone)]
pub struct ApiClient {
    token: String,
    connect_timeout: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("token", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(120),
        }
    }

    /// Default timeouts for calls that do not pass their own.
    pub fn with_timeouts(mut self, connect: Duration, overall: Duration) -> Self {
        self.connect_timeout = connect;
        self.timeout = overall;
        self
    }

    pub fn get(&self, url: &str) -> Result<HttpResponse, curl::Error> {
        self.send("GET", url, None, &[], None)
    }

    pub fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, curl::Error> {
        let bytes = body.to_string().into_bytes();
        self.send(
            "POST",
            url,
            Some(bytes.as_slice()),
            &["Content-Type: application/json; charset=UTF-8".to_string()],
            None,
        )
    }

    /// Sends one request. `extra_headers` are full header lines (`Name: value`).
    /// `timeout` overrides the client default for this call.
    pub fn send(
        &self,
        method: &str,
        url: &str,
        body: Option<&[u8]>,
        extra_headers: &[String],
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, curl::Error> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(timeout.unwrap_or(self.timeout))?;

        let mut list = curl::easy::List::new();
        list.append(&format!("Authorization: Bearer {}", self.token))?;
        // Suppress `Expect: 100-continue` round trips on large bodies.
        list.append("Expect:")?;
        for h in extra_headers {
            list.append(h)?;
        }
        easy.http_headers(list)?;

        match body {
            Some(bytes) => easy.post_fields_copy(bytes)?,
            None if method == "POST" => easy.post_fields_copy(&[])?,
            None => {}
        }
        if method != "GET" && method != "POST" {
            easy.custom_request(method)?;
        }

        let mut headers: Vec<String> = Vec::new();
        let mut response_body: Vec<u8> = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    let line = s.trim_end();
                    // A new status line starts a new header block (e.g. after 100 Continue).
                    if line.starts_with("HTTP/") {
                        headers.clear();
                    }
                    if !line.is_empty() {
                        headers.push(line.to_string());
                    }
                }
                true
            })?;
            transfer.write_function(|data| {
                response_body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let status = easy.response_code()?;
        Ok(HttpResponse {
            status,
            headers,
            body: response_body,
        })
    }
}

/// Percent-encode one URL path segment (object names may contain `/`).
pub fn encode_segment(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
