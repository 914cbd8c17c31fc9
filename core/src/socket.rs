//! Transport that speaks HTTP/1.1 over sockets it opens itself.
//!
//! # Design
//! Each hop opens a new TCP connection, optionally tunnels it through an HTTP
//! proxy with `CONNECT`, wraps it in rustls for `https`, writes one request
//! with `Connection: close` and reads the reply. Nothing is pooled; the
//! transport holds only immutable configuration and is safe to share.

use std::borrow::Cow;
use std::io::{self, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tracing::debug;
use url::Url;

use crate::endpoint::{ConnectionKind, ConnectionOptions, ConnectionParams, TlsOptions};
use crate::error::{Error, Result};
use crate::http::{is_octet_stream, ChunkIter, HttpRequest, HttpResponse, ResponseBody};
use crate::tls::{self, TlsStream};
use crate::transport::{HttpTransport, TransportSettings};
use crate::wire;

/// HTTP proxy used for every connection of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    host: String,
    port: u16,
}

impl Proxy {
    /// Accepts `http://host:port` or bare `host:port`.
    pub fn parse(proxy: &str) -> Result<Self> {
        let with_scheme = if proxy.contains("://") {
            proxy.to_string()
        } else {
            format!("http://{proxy}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| Error::Config(format!("invalid proxy '{proxy}': {e}")))?;
        if url.scheme() != "http" {
            return Err(Error::Config(format!(
                "unsupported proxy scheme '{}' in '{proxy}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("proxy '{proxy}' has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        Ok(Self {
            host,
            port: url.port().unwrap_or(3128),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Hand-rolled transport: one socket per request hop.
pub struct SocketTransport {
    settings: TransportSettings,
    params: ConnectionParams,
    tls_config: Option<Arc<ClientConfig>>,
    proxy: Option<Proxy>,
}

impl SocketTransport {
    /// Resolve connection parameters and, for `https`, load the TLS material.
    pub fn new(
        settings: TransportSettings,
        options: &ConnectionOptions,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let params = ConnectionParams::new(&settings.endpoint, options);
        let tls_config = match params.kind {
            ConnectionKind::Tls => Some(tls::client_config(&params.tls)?),
            ConnectionKind::Plain => None,
        };
        let proxy = proxy.map(Proxy::parse).transpose()?;
        Ok(Self {
            settings,
            params,
            tls_config,
            proxy,
        })
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    fn tls_config_for(&self, params: &ConnectionParams) -> Result<Arc<ClientConfig>> {
        match &self.tls_config {
            Some(config) if params.tls == self.params.tls => Ok(config.clone()),
            _ => tls::client_config(&params.tls),
        }
    }

    fn open(&self, params: &ConnectionParams, url: &str) -> Result<Stream> {
        let (host, port) = match &self.proxy {
            Some(proxy) => (proxy.host(), proxy.port()),
            None => (params.host.as_str(), params.port),
        };
        let mut tcp = connect_tcp(host, port, params.timeout, url)?;

        match params.kind {
            ConnectionKind::Plain => Ok(Stream::Plain(tcp)),
            ConnectionKind::Tls => {
                if self.proxy.is_some() {
                    open_tunnel(&mut tcp, &params.authority_with_port())
                        .map_err(|e| communication(url, e))?;
                }
                let config = self.tls_config_for(params)?;
                let stream = tls::handshake(config, &params.host, tcp).map_err(|e| communication(url, e))?;
                Ok(Stream::Tls(Box::new(stream)))
            }
        }
    }
}

impl HttpTransport for SocketTransport {
    fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    fn tls_options(&self) -> Option<&TlsOptions> {
        match self.params.kind {
            ConnectionKind::Tls => Some(&self.params.tls),
            ConnectionKind::Plain => None,
        }
    }

    fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = request.url.as_str();
        let params = if self.params.same_origin(&request.url) {
            Cow::Borrowed(&self.params)
        } else {
            Cow::Owned(self.params.for_url(&request.url)?)
        };

        let mut stream = self.open(&params, url)?;
        // Plain HTTP through a proxy uses the absolute-form request target.
        let target = match (&self.proxy, params.kind) {
            (Some(_), ConnectionKind::Plain) => &url[..url.find('#').unwrap_or(url.len())],
            _ => request.target(),
        };
        wire::write_request(
            &mut stream,
            request.method,
            target,
            &params.authority(),
            &request.headers,
            request.body.as_deref(),
        )
        .map_err(|e| communication(url, e))?;

        let mut reader = BufReader::new(stream);
        let head = wire::read_head(&mut reader).map_err(|e| read_error(url, e))?;
        debug!(status = head.status, "response head received");
        let streamed = is_octet_stream(head.headers.get("content-type"));
        let mut body_reader =
            wire::body_reader(&head, request.method, reader).map_err(|e| read_error(url, e))?;

        let body = if streamed {
            ResponseBody::Stream(ChunkIter::new(body_reader))
        } else {
            let mut bytes = Vec::new();
            body_reader
                .read_to_end(&mut bytes)
                .map_err(|e| read_error(url, e))?;
            ResponseBody::buffered(bytes)
        };

        Ok(HttpResponse {
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body,
        })
    }
}

/// Resolve and connect, trying each resolved address in turn.
fn connect_tcp(host: &str, port: u16, timeout: Duration, url: &str) -> Result<TcpStream> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::EndpointNotFound {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .collect();
    if addrs.is_empty() {
        return Err(Error::EndpointNotFound {
            url: url.to_string(),
            reason: format!("no addresses for {host}"),
        });
    }

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => {
                tcp.set_read_timeout(Some(timeout))
                    .and_then(|()| tcp.set_write_timeout(Some(timeout)))
                    .map_err(|e| communication(url, e))?;
                return Ok(tcp);
            }
            Err(e) => {
                debug!(%addr, error = %e, "connect failed");
                last_err = Some(e);
            }
        }
    }
    Err(Error::Communication {
        url: url.to_string(),
        reason: last_err.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// Establish a `CONNECT` tunnel; must finish before the TLS handshake.
fn open_tunnel(tcp: &mut TcpStream, authority: &str) -> io::Result<()> {
    let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    tcp.write_all(request.as_bytes())?;
    tcp.flush()?;
    // The proxy sends nothing past the blank line until we speak TLS,
    // so the buffered reader cannot swallow handshake bytes.
    let mut reader = BufReader::new(&mut *tcp);
    let head = wire::read_head(&mut reader)?;
    if !(200..300).contains(&head.status) {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("proxy refused CONNECT {authority}: {} {}", head.status, head.reason),
        ));
    }
    Ok(())
}

fn communication(url: &str, e: io::Error) -> Error {
    Error::Communication {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

fn read_error(url: &str, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::InvalidData => Error::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        },
        _ => communication(url, e),
    }
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}
