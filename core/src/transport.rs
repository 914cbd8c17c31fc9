//! The transport contract shared by the socket and session implementations.
//!
//! # Design
//! An implementation supplies only [`HttpTransport::send_once`], a single
//! request/response exchange. Everything callers observe is in the provided
//! methods: default headers, redirect following, debug logging and error
//! classification. Both transports therefore behave identically, and the
//! resource managers can hold a `Box<dyn HttpTransport>` without caring
//! which one they got.

use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::{debug, error, Span};
use url::Url;

use crate::config::TransportConfig;
use crate::endpoint::{Endpoint, TlsOptions};
use crate::error::{ApiError, Error, Result};
use crate::http::{
    Headers, HttpMethod, HttpRequest, HttpResponse, ResponseBody, API_VERSION_SERVICE,
    CONTENT_TYPE_JSON, CONTENT_TYPE_OCTET_STREAM, USER_AGENT,
};
use crate::session::{Session, SessionTransport};
use crate::socket::SocketTransport;

/// Redirect hops followed per call when not configured.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Per-transport settings that feed the shared request logic.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub endpoint: Endpoint,
    pub auth_token: Option<String>,
    pub api_version: Option<String>,
    pub max_redirects: u32,
    /// Span every log record of this transport is emitted in.
    pub span: Span,
}

impl TransportSettings {
    pub fn new(endpoint: Endpoint) -> Self {
        let span = tracing::debug_span!("magnum_http", endpoint = %endpoint.trimmed());
        Self {
            endpoint,
            auth_token: None,
            api_version: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            span,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let mut settings = Self::new(Endpoint::parse(&config.endpoint)?);
        settings.auth_token = config.auth_token.clone();
        settings.api_version = config.api_version.clone();
        settings.max_redirects = config.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS);
        Ok(settings)
    }

    /// Value of the `OpenStack-API-Version` header.
    pub fn api_version_header(&self) -> String {
        match self.api_version.as_deref() {
            Some(version) if !version.is_empty() => format!("{API_VERSION_SERVICE} {version}"),
            _ => API_VERSION_SERVICE.to_string(),
        }
    }

    /// Copy `headers` and add the defaults that are still missing.
    pub fn default_headers(&self, headers: &Headers) -> Headers {
        let mut headers = headers.clone();
        headers.set_default("User-Agent", USER_AGENT);
        headers.set_default("OpenStack-API-Version", self.api_version_header());
        if let Some(token) = &self.auth_token {
            headers.set_default("X-Auth-Token", token.as_str());
        }
        headers
    }
}

/// How a status code is handled by the request loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Redirect,
    Error,
}

pub fn disposition(status: u16) -> Disposition {
    match status {
        301 | 302 | 305 => Disposition::Redirect,
        300 | 400..=599 => Disposition::Error,
        _ => Disposition::Success,
    }
}

/// Blocking HTTP transport bound to one endpoint.
pub trait HttpTransport: Send + Sync {
    fn settings(&self) -> &TransportSettings;

    /// Perform exactly one exchange for a fully resolved request.
    ///
    /// Implementations return the body as a [`ResponseBody::Stream`] when the
    /// content type is `application/octet-stream` and buffered otherwise.
    fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse>;

    /// TLS files to mention in the `curl` debug line, if known.
    fn tls_options(&self) -> Option<&TlsOptions> {
        None
    }

    /// Send a request, following redirects and translating error statuses.
    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        headers: &Headers,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        let settings = self.settings();
        let _entered = settings.span.enter();

        let headers = settings.default_headers(headers);
        let mut url = settings.endpoint.url_for(path)?;
        let mut hops = 0u32;
        loop {
            let request = HttpRequest {
                method,
                url: url.clone(),
                headers: headers.clone(),
                body: body.clone(),
            };
            debug!("{}", curl_command(&request, self.tls_options()));
            let response = self.send_once(&request)?;
            debug!("{}", response_dump(&response));

            match disposition(response.status) {
                Disposition::Success => return Ok(response),
                Disposition::Redirect => {
                    let location = response.header("location").ok_or_else(|| Error::InvalidResponse {
                        url: url.to_string(),
                        reason: format!("HTTP {} without a Location header", response.status),
                    })?;
                    hops += 1;
                    if hops > settings.max_redirects {
                        return Err(Error::TooManyRedirects {
                            limit: settings.max_redirects,
                            url: url.to_string(),
                        });
                    }
                    let next = url.join(location).map_err(|e| Error::InvalidResponse {
                        url: url.to_string(),
                        reason: format!("bad Location '{location}': {e}"),
                    })?;
                    debug!(status = response.status, from = %url, to = %next, "following redirect");
                    url = next;
                }
                Disposition::Error => return Err(api_error(response, method, &url)),
            }
        }
    }

    /// Send an optional JSON body and decode a JSON reply.
    ///
    /// The decoded body is `None` for 204/205, a missing or non-JSON content
    /// type, or a JSON body that fails to parse (logged, not raised).
    fn json_request(
        &self,
        method: HttpMethod,
        path: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<(HttpResponse, Option<Value>)> {
        let mut headers = headers.clone();
        headers.set_default("Content-Type", CONTENT_TYPE_JSON);
        headers.set_default("Accept", CONTENT_TYPE_JSON);
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let response = self.request(method, path, &headers, body)?;
        let is_json = response
            .content_type()
            .is_some_and(|ct| ct.contains(CONTENT_TYPE_JSON));
        if matches!(response.status, 204 | 205) || !is_json {
            return Ok((response, None));
        }
        let decoded = match &response.body {
            ResponseBody::Buffered(text) => match serde_json::from_str(text) {
                Ok(value) => Some(value),
                Err(e) => {
                    let _entered = self.settings().span.enter();
                    error!(error = %e, "Could not decode response body as JSON");
                    None
                }
            },
            ResponseBody::Stream(_) => None,
        };
        Ok((response, decoded))
    }

    /// Send raw bytes as `application/octet-stream` unless a type is given.
    fn raw_request(
        &self,
        method: HttpMethod,
        path: &str,
        headers: &Headers,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        let mut headers = headers.clone();
        headers.set_default("Content-Type", CONTENT_TYPE_OCTET_STREAM);
        self.request(method, path, &headers, body)
    }
}

/// Translate an error response; the body is not read for a bare 300.
fn api_error(response: HttpResponse, method: HttpMethod, url: &Url) -> Error {
    let status = response.status;
    let text = if status == 300 {
        None
    } else {
        Some(response.body.into_text().unwrap_or_default())
    };
    match ApiError::from_response(status, text.as_deref()) {
        Some(err) => err.with_request(method, url.as_str()).into(),
        None => Error::InvalidResponse {
            url: url.to_string(),
            reason: format!("unexpected status {status}"),
        },
    }
}

/// Open a transport for `config`.
///
/// A caller-supplied [`Session`] selects the delegating transport; without
/// one, requests go over sockets opened by this crate.
pub fn connect(config: &TransportConfig, session: Option<Session>) -> Result<Box<dyn HttpTransport>> {
    let settings = TransportSettings::from_config(config)?;
    connect_with_settings(config, settings, session)
}

/// Like [`connect`], but every log record is emitted inside `span`.
pub fn connect_with_span(
    config: &TransportConfig,
    session: Option<Session>,
    span: Span,
) -> Result<Box<dyn HttpTransport>> {
    let mut settings = TransportSettings::from_config(config)?;
    settings.span = span;
    connect_with_settings(config, settings, session)
}

fn connect_with_settings(
    config: &TransportConfig,
    settings: TransportSettings,
    session: Option<Session>,
) -> Result<Box<dyn HttpTransport>> {
    match session {
        Some(session) => Ok(Box::new(SessionTransport::new(session, settings))),
        None => Ok(Box::new(SocketTransport::new(
            settings,
            &config.connection_options(),
            config.proxy.as_deref(),
        )?)),
    }
}

/// `{SHA1}<hex>` digest used in place of secrets in log output.
pub fn redact(secret: &str) -> String {
    format!("{{SHA1}}{:x}", Sha1::digest(secret.as_bytes()))
}

/// Equivalent `curl` command line for a request, token redacted.
pub fn curl_command(request: &HttpRequest, tls: Option<&TlsOptions>) -> String {
    let mut curl = vec![format!("curl -i -X {}", request.method)];
    for (name, value) in request.headers.iter() {
        let value = if name.eq_ignore_ascii_case("x-auth-token") {
            redact(value)
        } else {
            value.to_string()
        };
        curl.push(format!("-H '{name}: {value}'"));
    }
    if let Some(tls) = tls {
        if let Some(key) = &tls.key_file {
            curl.push(format!("--key {}", key.display()));
        }
        if let Some(cert) = &tls.cert_file {
            curl.push(format!("--cert {}", cert.display()));
        }
        if let Some(ca) = &tls.ca_file {
            curl.push(format!("--cacert {}", ca.display()));
        }
        if tls.insecure {
            curl.push("-k".to_string());
        }
    }
    if let Some(body) = &request.body {
        curl.push(format!("-d '{}'", String::from_utf8_lossy(body)));
    }
    curl.push(request.url.to_string());
    curl.join(" ")
}

/// Status line, headers and buffered body of a response.
pub fn response_dump(response: &HttpResponse) -> String {
    let mut dump = vec![format!("\nHTTP/1.1 {} {}", response.status, response.reason)];
    dump.extend(response.headers.iter().map(|(k, v)| format!("{k}: {v}")));
    dump.push(String::new());
    if let Some(text) = response.body.as_text().filter(|t| !t.is_empty()) {
        dump.push(text.to_string());
        dump.push(String::new());
    }
    dump.join("\n")
}
