//! Endpoint parsing and connection parameters.
//!
//! # Design
//! The configured URL is parsed once into an [`Endpoint`] whose `base_path`
//! has the trailing API version segment removed; every request path is then
//! joined onto it. [`ConnectionParams`] is the immutable recipe a transport
//! uses to open a fresh socket for each request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::{Host, Url};

use crate::error::{Error, Result};

/// API version segment removed from the end of the endpoint path.
pub const API_VERSION_SEGMENT: &str = "/v1";

/// Timeout used when none (or zero) is configured.
pub const DEFAULT_TIMEOUT_SECS: f64 = 600.0;

/// Well-known CA bundle locations, probed in order when no CA file is given.
pub const SYSTEM_CA_BUNDLES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/ssl/cert.pem",
    "/System/Library/OpenSSL/certs/cacert.pem",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Plain,
    Tls,
}

/// TLS settings. Ignored for plain connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub insecure: bool,
}

/// Caller-facing connection options, before defaults are resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionOptions {
    /// Seconds; `None` or zero means [`DEFAULT_TIMEOUT_SECS`].
    pub timeout: Option<f64>,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub insecure: bool,
}

/// Scheme, host, port and version-less base path of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    kind: ConnectionKind,
    host: String,
    port: u16,
    base_path: String,
}

impl Endpoint {
    /// Parse an endpoint URL such as `https://magnum:9511/prefix/v1`.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::Endpoint(format!("Invalid endpoint URL '{url}': {e}")))?;
        Self::from_url(&parsed)
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        let kind = match url.scheme() {
            "http" => ConnectionKind::Plain,
            "https" => ConnectionKind::Tls,
            other => return Err(Error::Endpoint(format!("Unsupported scheme: {other}"))),
        };
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::Endpoint(format!("Endpoint URL '{url}' has no host"))),
        };
        let port = url.port_or_known_default().unwrap_or(match kind {
            ConnectionKind::Plain => 80,
            ConnectionKind::Tls => 443,
        });
        Ok(Self {
            kind,
            host,
            port,
            base_path: trim_api_version(url.path()),
        })
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn scheme(&self) -> &'static str {
        match self.kind {
            ConnectionKind::Plain => "http",
            ConnectionKind::Tls => "https",
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// `host[:port]`, omitting the port when it is the scheme default.
    pub fn authority(&self) -> String {
        authority(&self.host, self.port, self.kind)
    }

    /// Endpoint URL without the version segment or trailing slash.
    pub fn trimmed(&self) -> String {
        format!("{}://{}{}", self.scheme(), self.authority(), self.base_path)
    }

    /// Absolute URL for a request path relative to the endpoint.
    ///
    /// `path` may carry a query string (`/v1/clusters?limit=5`).
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let full = format!(
            "{}://{}{}",
            self.scheme(),
            self.authority(),
            join_path(&self.base_path, path)
        );
        Url::parse(&full).map_err(|e| Error::Endpoint(format!("Invalid request URL '{full}': {e}")))
    }
}

pub(crate) fn authority(host: &str, port: u16, kind: ConnectionKind) -> String {
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    match (kind, port) {
        (ConnectionKind::Plain, 80) | (ConnectionKind::Tls, 443) => host,
        _ => format!("{host}:{port}"),
    }
}

/// Strip trailing slashes, then one `/v1` segment, then trailing slashes again.
pub fn trim_api_version(path: &str) -> String {
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(API_VERSION_SEGMENT).unwrap_or(path);
    path.trim_end_matches('/').to_string()
}

/// Join `base` and `path` with exactly one `/` between them.
pub fn join_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Everything needed to open a connection to the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    pub kind: ConnectionKind,
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub timeout: Duration,
    pub tls: TlsOptions,
}

impl ConnectionParams {
    /// Resolve defaults for `endpoint`: timeout, and for TLS the system CA bundle.
    pub fn new(endpoint: &Endpoint, options: &ConnectionOptions) -> Self {
        let tls = match endpoint.kind() {
            ConnectionKind::Plain => TlsOptions::default(),
            ConnectionKind::Tls => TlsOptions {
                ca_file: options.ca_file.clone().or_else(system_ca_file),
                cert_file: options.cert_file.clone(),
                key_file: options.key_file.clone(),
                insecure: options.insecure,
            },
        };
        Self {
            kind: endpoint.kind(),
            host: endpoint.host().to_string(),
            port: endpoint.port(),
            base_path: endpoint.base_path().to_string(),
            timeout: resolve_timeout(options.timeout),
            tls,
        }
    }

    /// Parameters for another URL (a redirect target), keeping timeout and TLS files.
    pub fn for_url(&self, url: &Url) -> Result<Self> {
        let endpoint = Endpoint::from_url(url)?;
        let tls = match endpoint.kind() {
            ConnectionKind::Plain => TlsOptions::default(),
            ConnectionKind::Tls if self.kind == ConnectionKind::Tls => self.tls.clone(),
            ConnectionKind::Tls => TlsOptions {
                ca_file: system_ca_file(),
                ..TlsOptions::default()
            },
        };
        Ok(Self {
            kind: endpoint.kind(),
            host: endpoint.host().to_string(),
            port: endpoint.port(),
            base_path: endpoint.base_path().to_string(),
            timeout: self.timeout,
            tls,
        })
    }

    pub fn same_origin(&self, url: &Url) -> bool {
        Endpoint::from_url(url)
            .map(|e| e.kind() == self.kind && e.host() == self.host && e.port() == self.port)
            .unwrap_or(false)
    }

    pub fn authority(&self) -> String {
        authority(&self.host, self.port, self.kind)
    }

    /// `host:port` with the port always present, as `CONNECT` requires.
    pub(crate) fn authority_with_port(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Parse `url` and resolve connection parameters for it.
pub fn get_connection_params(url: &str, options: &ConnectionOptions) -> Result<ConnectionParams> {
    let endpoint = Endpoint::parse(url)?;
    Ok(ConnectionParams::new(&endpoint, options))
}

pub(crate) fn resolve_timeout(timeout: Option<f64>) -> Duration {
    match timeout {
        Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
        _ => Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
    }
}

/// First existing entry of [`SYSTEM_CA_BUNDLES`].
pub fn system_ca_file() -> Option<PathBuf> {
    first_existing(SYSTEM_CA_BUNDLES.iter().map(Path::new))
}

fn first_existing<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .find(|path| path.exists())
        .map(Path::to_path_buf)
}
