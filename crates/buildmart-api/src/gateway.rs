// Request gateway for the marketplace backend.
//
// Wraps `reqwest::Client` with base-URL joining, automatic multipart
// switching for file-bearing payloads, GET de-duplication, and envelope
// normalization. `send` never fails: every error is folded into
// `{ success: false, message }`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use url::Url;

use crate::encoder::{EncoderConfig, MultipartPayload, encode};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::inflight::InFlight;
use crate::payload::{Payload, has_files, to_json_object};
use crate::transport::TransportConfig;

/// Everything needed to reach the backend.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API root, e.g. `https://api.example.com/api/v1/`.
    pub base_url: Url,
    /// Bearer token sent on every request.
    pub token: Option<SecretString>,
    /// Sent as `Accept-Language`.
    pub locale: Option<String>,
    pub transport: TransportConfig,
}

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers, merged over the client defaults.
    pub headers: HeaderMap,
    /// Overrides the client-wide timeout.
    pub timeout: Option<Duration>,
    /// Used when the payload is sent as multipart or as GET query params.
    pub encoding: EncoderConfig,
    /// Extra query parameters appended to the URL.
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn encoding(mut self, encoding: EncoderConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

// ── Gateway ──────────────────────────────────────────────────────────

/// Async gateway to the backend HTTP API.
///
/// Cheaply cloneable; clones share the HTTP connection pool and the
/// in-flight GET tracker.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    in_flight: InFlight<Envelope>,
}

impl Gateway {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from config, injecting `Accept`, `Authorization` and
    /// `Accept-Language` as default headers.
    pub fn new(config: &GatewayConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(ref token) = config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| Error::Unsupported("token contains characters not allowed in a header"))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        if let Some(ref locale) = config.locale {
            if let Ok(value) = HeaderValue::from_str(locale) {
                headers.insert(header::ACCEPT_LANGUAGE, value);
            }
        }

        let http = config.transport.build_client_with_headers(headers)?;
        Ok(Self::with_client(
            http,
            normalize_base_url(config.base_url.clone()),
            config.transport.timeout,
        ))
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = normalize_base_url(Url::parse(base_url)?);
        Ok(Self::with_client(
            http,
            base_url,
            TransportConfig::default().timeout,
        ))
    }

    fn with_client(http: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                http,
                base_url,
                timeout,
                in_flight: InFlight::new(),
            }),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Number of GET requests currently being shared.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    // ── Verbs ────────────────────────────────────────────────────────

    /// GET with optional query parameters taken from `params`.
    pub async fn get(&self, path: &str, params: Option<&Payload>) -> Envelope {
        self.send(Method::GET, path, params, &RequestOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, payload: &Payload) -> Envelope {
        self.send(Method::POST, path, Some(payload), &RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, payload: &Payload) -> Envelope {
        self.send(Method::PUT, path, Some(payload), &RequestOptions::default())
            .await
    }

    pub async fn patch(&self, path: &str, payload: &Payload) -> Envelope {
        self.send(Method::PATCH, path, Some(payload), &RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Envelope {
        self.send(Method::DELETE, path, None, &RequestOptions::default())
            .await
    }

    /// Send a request and normalize the outcome into an [`Envelope`].
    ///
    /// GET requests are de-duplicated on `METHOD:url`: a second identical GET
    /// issued while the first is outstanding awaits the same result.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Payload>,
        options: &RequestOptions,
    ) -> Envelope {
        let prepared = match self.prepare(method, path, payload, options) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(path, error = %err, "request rejected before dispatch");
                return Envelope::failure(err.user_message());
            }
        };

        let http = self.inner.http.clone();
        if prepared.method == Method::GET {
            let key = format!("{}:{}", prepared.method, prepared.url);
            let shared = self
                .inner
                .in_flight
                .get_or_create(&key, move || prepared.execute(http));
            shared.await.unwrap_or_else(|| {
                Envelope::failure(Error::Task("request task panicked".into()).user_message())
            })
        } else {
            prepared.execute(http).await
        }
    }

    // ── Request preparation ──────────────────────────────────────────

    fn prepare(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Payload>,
        options: &RequestOptions,
    ) -> Result<Prepared, Error> {
        let mut url = self.url(path)?;
        let mut headers = options.headers.clone();
        let mut body = Body::Empty;

        append_query(&mut url, &options.query);

        if let Some(payload) = payload {
            if method == Method::GET {
                let pairs = encode(payload, &options.encoding)?
                    .into_query_pairs()
                    .ok_or(Error::Unsupported("files cannot be sent with a GET request"))?;
                append_query(&mut url, &pairs);
            } else if has_files(payload) {
                let form = encode(payload, &options.encoding)?;
                // reqwest sets multipart/form-data with the boundary itself.
                headers.remove(header::CONTENT_TYPE);
                body = Body::Multipart(form);
            } else {
                body = Body::Json(serde_json::Value::Object(to_json_object(payload)));
            }
        }

        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        Ok(Prepared {
            method,
            url,
            headers,
            body,
            timeout: options.timeout,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Join a relative path onto the base URL.
    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.inner.base_url.join(path.trim_start_matches('/'))?)
    }
}

/// Ensure the base URL ends with `/` so relative joins append.
fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn append_query(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        return;
    }
    let mut query = url.query_pairs_mut();
    for (key, value) in pairs {
        query.append_pair(key, value);
    }
}

enum Body {
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartPayload),
}

/// A request ready to go out. Owns everything so it can run on its own task.
struct Prepared {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
    timeout: Option<Duration>,
    timeout_secs: u64,
}

impl Prepared {
    async fn execute(self, http: reqwest::Client) -> Envelope {
        let method = self.method.clone();
        let url = self.url.clone();
        debug!("{method} {url}");

        match self.dispatch(http).await {
            Ok(envelope) => {
                debug!(%method, %url, success = envelope.success, "request settled");
                envelope
            }
            Err(err) => {
                warn!(%method, %url, error = %err, "request failed");
                Envelope::failure(err.user_message())
            }
        }
    }

    async fn dispatch(self, http: reqwest::Client) -> Result<Envelope, Error> {
        let timeout_secs = self.timeout_secs;
        let mut request = http.request(self.method, self.url).headers(self.headers);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        request = match self.body {
            Body::Empty => request,
            Body::Json(value) => request.json(&value),
            Body::Multipart(form) => request.multipart(form.into_form()?),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| Error::from_transport(e, timeout_secs))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::from_transport(e, timeout_secs))?;

        if status.is_success() {
            Envelope::from_body(&body, true).map_err(|e| {
                let preview = body.chars().take(200).collect::<String>();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(Error::Status {
                status: status.as_u16(),
                message: server_message(&body),
            })
        }
    }
}

/// Pull a human-readable message out of an error body, if it has one.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|field| value.get(field)?.as_str().map(str::to_owned))
        .filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = normalize_base_url(Url::parse("https://api.example.com/api/v1").unwrap());
        assert_eq!(url.as_str(), "https://api.example.com/api/v1/");
    }

    #[test]
    fn paths_join_under_base() {
        let gateway = Gateway::from_reqwest("https://api.example.com/api/v1", reqwest::Client::new())
            .unwrap();
        assert_eq!(
            gateway.url("/products/7").unwrap().as_str(),
            "https://api.example.com/api/v1/products/7"
        );
    }

    #[test]
    fn server_message_reads_message_then_error() {
        assert_eq!(
            server_message(r#"{"message": "Unauthenticated."}"#).as_deref(),
            Some("Unauthenticated.")
        );
        assert_eq!(server_message(r#"{"error": "nope"}"#).as_deref(), Some("nope"));
        assert_eq!(server_message("<html>502</html>"), None);
        assert_eq!(server_message(r#"{"message": ""}"#), None);
    }
}
