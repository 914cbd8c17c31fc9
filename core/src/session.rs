//! Transport that delegates each exchange to a caller-supplied `ureq` agent.
//!
//! # Design
//! A [`Session`] is whatever the caller already uses for HTTP: an agent with
//! its own pool, TLS and proxy settings, plus an optional auth token. Every
//! exchange overrides the agent's redirect and status-error settings per
//! request, so the shared loop in [`HttpTransport`] always sees the raw
//! response whatever the agent was built with.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::debug;
use ureq::tls::{Certificate, ClientCert, PemItem, PrivateKey, RootCerts, TlsConfig};
use ureq::{Agent, AsSendBody, Body, RequestExt};
use url::Url;

use crate::endpoint::{resolve_timeout, system_ca_file, ConnectionKind, ConnectionOptions, TlsOptions};
use crate::error::{Error, Result};
use crate::http::{is_octet_stream, ChunkIter, Headers, HttpMethod, HttpRequest, HttpResponse, ResponseBody};
use crate::transport::{HttpTransport, TransportSettings};

/// A pre-configured agent and the token to send with it.
#[derive(Clone)]
pub struct Session {
    agent: Agent,
    auth_token: Option<String>,
    tls: Option<TlsOptions>,
}

impl Session {
    /// Wrap an existing agent. Its redirect and status-error settings are
    /// overridden on each request.
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            auth_token: None,
            tls: None,
        }
    }

    /// Token sent as `X-Auth-Token` when the transport has none configured.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Build an agent from connection options, as the CLI does for `--use-session`.
    pub fn from_options(options: &ConnectionOptions, proxy: Option<&str>) -> Result<Self> {
        let tls = TlsOptions {
            ca_file: options.ca_file.clone().or_else(system_ca_file),
            cert_file: options.cert_file.clone(),
            key_file: options.key_file.clone(),
            insecure: options.insecure,
        };
        let proxy = proxy
            .map(|p| ureq::Proxy::new(p).map_err(|e| Error::Config(format!("invalid proxy '{p}': {e}"))))
            .transpose()?;

        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .timeout_global(Some(resolve_timeout(options.timeout)))
            .tls_config(tls_config(&tls)?)
            .proxy(proxy)
            .build()
            .new_agent();
        Ok(Self {
            tls: Some(tls),
            ..Self::new(agent)
        })
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// TLS material the agent was built from, when built by [`Session::from_options`].
    pub fn tls_options(&self) -> Option<&TlsOptions> {
        self.tls.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

fn tls_config(options: &TlsOptions) -> Result<TlsConfig> {
    let root_certs = match &options.ca_file {
        Some(path) => {
            let certs = read_certs(path)?;
            if certs.is_empty() {
                return Err(Error::Tls(format!("no usable CA certificates in {}", path.display())));
            }
            RootCerts::new_with_certs(&certs)
        }
        None => RootCerts::WebPki,
    };

    let client_cert = match &options.cert_file {
        Some(cert_file) => {
            let certs = read_certs(cert_file)?;
            let key = read_key(options.key_file.as_deref().unwrap_or(cert_file))?;
            Some(ClientCert::new_with_certs(&certs, key))
        }
        None => None,
    };

    Ok(TlsConfig::builder()
        .root_certs(root_certs)
        .client_cert(client_cert)
        .disable_verification(options.insecure)
        .build())
}

fn read_certs(path: &Path) -> Result<Vec<Certificate<'static>>> {
    let pem = read_pem(path)?;
    let mut certs = Vec::new();
    for item in ureq::tls::parse_pem(&pem) {
        if let PemItem::Certificate(cert) = item.map_err(|e| pem_error(path, e))? {
            certs.push(cert.to_owned());
        }
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PrivateKey<'static>> {
    let pem = read_pem(path)?;
    for item in ureq::tls::parse_pem(&pem) {
        if let PemItem::PrivateKey(key) = item.map_err(|e| pem_error(path, e))? {
            return Ok(key.to_owned());
        }
    }
    Err(Error::Tls(format!("no private key found in {}", path.display())))
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Tls(format!("cannot read {}: {e}", path.display())))
}

fn pem_error(path: &Path, err: ureq::Error) -> Error {
    Error::Tls(format!("failed to parse {}: {err}", path.display()))
}

/// Transport backed by a [`Session`].
pub struct SessionTransport {
    session: Session,
    settings: TransportSettings,
}

impl SessionTransport {
    pub fn new(session: Session, settings: TransportSettings) -> Self {
        Self { session, settings }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn headers_for(&self, request: &HttpRequest) -> Headers {
        let mut headers = request.headers.clone();
        if let Some(token) = self.session.auth_token() {
            headers.set_default("X-Auth-Token", token);
        }
        headers
    }
}

impl HttpTransport for SessionTransport {
    fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    fn tls_options(&self) -> Option<&TlsOptions> {
        match self.settings.endpoint.kind() {
            ConnectionKind::Tls => self.session.tls_options(),
            ConnectionKind::Plain => None,
        }
    }

    fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = request.url.as_str();
        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(url);
        for (name, value) in self.headers_for(request).iter() {
            builder = builder.header(name, value);
        }

        let agent = &self.session.agent;
        let result = match &request.body {
            Some(body) => builder.body(body.clone()).map(|req| exchange(agent, req)),
            None if matches!(request.method, HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete) => {
                builder.body(()).map(|req| exchange(agent, req))
            }
            None => builder.body(Vec::new()).map(|req| exchange(agent, req)),
        };
        let response = result
            .map_err(|e| Error::Config(format!("invalid request for {url}: {e}")))?
            .map_err(|e| session_error(&request.url, e))?;

        let (parts, body) = response.into_parts();
        let status = parts.status.as_u16();
        debug!(status, "session response received");

        let mut headers = Headers::new();
        for (name, value) in parts.headers.iter() {
            headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }

        let reader = body.into_reader();
        let body = if is_octet_stream(headers.get("content-type")) {
            ResponseBody::Stream(ChunkIter::new(Box::new(reader)))
        } else {
            let mut bytes = Vec::new();
            let mut reader = reader;
            reader.read_to_end(&mut bytes).map_err(|e| Error::Communication {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            ResponseBody::buffered(bytes)
        };

        Ok(HttpResponse {
            status,
            reason: parts.status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// One hop: redirects and error statuses are left to the shared request loop.
fn exchange<S: AsSendBody>(
    agent: &Agent,
    request: ureq::http::Request<S>,
) -> std::result::Result<ureq::http::Response<Body>, ureq::Error> {
    request
        .with_agent(agent)
        .configure()
        .http_status_as_error(false)
        .max_redirects(0)
        .max_redirects_will_error(false)
        .run()
}

fn session_error(url: &Url, err: ureq::Error) -> Error {
    match err {
        ureq::Error::HostNotFound => Error::EndpointNotFound {
            url: url.to_string(),
            reason: "host not found".to_string(),
        },
        // ureq reports a failed lookup as plain I/O.
        ureq::Error::Io(e) if !resolves(url) => Error::EndpointNotFound {
            url: url.to_string(),
            reason: e.to_string(),
        },
        other => Error::Communication {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

fn resolves(url: &Url) -> bool {
    url.socket_addrs(|| None).is_ok_and(|addrs| !addrs.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;

    fn transport(session: Session) -> SessionTransport {
        let settings = TransportSettings::new(Endpoint::parse("http://127.0.0.1:1/v1").unwrap());
        SessionTransport::new(session, settings)
    }

    #[test]
    fn session_token_fills_missing_header_only() {
        let session = Session::from_options(&ConnectionOptions::default(), None)
            .unwrap()
            .with_token("session-token");
        let transport = transport(session);
        let mut request = HttpRequest {
            method: HttpMethod::Get,
            url: url::Url::parse("http://127.0.0.1:1/v1/clusters").unwrap(),
            headers: Headers::new(),
            body: None,
        };
        assert_eq!(transport.headers_for(&request).get("x-auth-token"), Some("session-token"));

        request.headers.insert("X-Auth-Token", "explicit");
        assert_eq!(transport.headers_for(&request).get("x-auth-token"), Some("explicit"));
    }

    #[test]
    fn debug_output_hides_token() {
        let session = Session::from_options(&ConnectionOptions::default(), None)
            .unwrap()
            .with_token("very-secret");
        assert!(!format!("{session:?}").contains("very-secret"));
    }

    #[test]
    fn tls_options_reach_the_curl_line_for_https_only() {
        let options = ConnectionOptions {
            insecure: true,
            ..ConnectionOptions::default()
        };
        let session = Session::from_options(&options, None).unwrap();
        assert!(session.tls_options().unwrap().insecure);

        let https = SessionTransport::new(
            session.clone(),
            TransportSettings::new(Endpoint::parse("https://magnum:9511/v1").unwrap()),
        );
        assert!(https.tls_options().unwrap().insecure);
        assert!(transport(session).tls_options().is_none());

        let bare = SessionTransport::new(
            Session::new(Agent::new_with_defaults()),
            TransportSettings::new(Endpoint::parse("https://magnum:9511/v1").unwrap()),
        );
        assert!(bare.tls_options().is_none());
    }

    #[test]
    fn bad_proxy_is_a_config_error() {
        let err = Session::from_options(&ConnectionOptions::default(), Some("ftp://[::1")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unreadable_ca_file_is_a_tls_error() {
        let options = ConnectionOptions {
            ca_file: Some("/nonexistent/ca.pem".into()),
            ..ConnectionOptions::default()
        };
        assert!(matches!(Session::from_options(&options, None), Err(Error::Tls(_))));
    }

    #[test]
    fn refused_connection_is_a_communication_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = TransportSettings::new(Endpoint::parse(&format!("http://127.0.0.1:{port}")).unwrap());
        let transport = SessionTransport::new(
            Session::from_options(&ConnectionOptions::default(), None).unwrap(),
            settings,
        );
        let err = transport
            .request(HttpMethod::Get, "/v1/clusters", &Headers::new(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Communication { .. }), "{err:?}");
    }
}
