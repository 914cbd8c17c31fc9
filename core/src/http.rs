//! HTTP request and response types shared by both transports.
//!
//! # Design
//! Requests and responses are plain data. Headers are kept as an ordered list
//! of `(name, value)` pairs with case-insensitive lookup, which is what the
//! server expects and what ends up in the `curl` debug line. A response body
//! is either fully buffered text or, for `application/octet-stream`, a lazy
//! iterator of fixed-size byte chunks that is never decoded.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use url::Url;

use crate::error::Error;

/// Identifier sent in `User-Agent` unless the caller supplies one.
pub const USER_AGENT: &str = concat!("magnum-client/", env!("CARGO_PKG_VERSION"));

/// Service type prefix of the `OpenStack-API-Version` header.
pub const API_VERSION_SERVICE: &str = "container-infra";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Size of each read when streaming an octet-stream body.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(Error::Config(format!("unsupported HTTP method: {other}"))),
        }
    }
}

/// Ordered header list with case-insensitive name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every existing value of `name` with `value`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
    }

    /// Append without touching existing entries. Used for repeated response headers.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Set `name` only if it is not present yet. Returns whether it was set.
    pub fn set_default(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.contains(name) {
            return false;
        }
        self.0.push((name.to_string(), value.into()));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Headers(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One request hop, fully resolved against the endpoint.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Path plus query string, as written on the request line.
    pub fn target(&self) -> &str {
        &self.url[url::Position::BeforePath..url::Position::AfterQuery]
    }
}

/// Lazy iterator over a streamed response body.
///
/// Each item holds up to [`CHUNK_SIZE`] bytes; iteration ends the first time
/// the underlying reader returns no data.
pub struct ChunkIter {
    reader: Box<dyn Read + Send>,
    chunk_size: usize,
    done: bool,
}

impl ChunkIter {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self::with_chunk_size(reader, CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: Box<dyn Read + Send>, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }
}

impl Iterator for ChunkIter {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        if filled == 0 {
            self.done = true;
            return None;
        }
        chunk.truncate(filled);
        Some(Ok(chunk))
    }
}

impl fmt::Debug for ChunkIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkIter")
            .field("chunk_size", &self.chunk_size)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Response body as handed back to the caller.
#[derive(Debug)]
pub enum ResponseBody {
    /// Whole body read and decoded as UTF-8 (lossy).
    Buffered(String),
    /// `application/octet-stream` body, still on the wire.
    Stream(ChunkIter),
}

impl ResponseBody {
    /// Decode a finished body. Invalid UTF-8 sequences are replaced.
    pub fn buffered(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => ResponseBody::Buffered(text),
            Err(e) => ResponseBody::Buffered(String::from_utf8_lossy(e.as_bytes()).into_owned()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Buffered(text) => Some(text),
            ResponseBody::Stream(_) => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, ResponseBody::Stream(_))
    }

    /// Drain the body into bytes, consuming a stream if needed.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self {
            ResponseBody::Buffered(text) => Ok(text.into_bytes()),
            ResponseBody::Stream(chunks) => {
                let mut out = Vec::new();
                for chunk in chunks {
                    out.extend_from_slice(&chunk?);
                }
                Ok(out)
            }
        }
    }

    /// Drain the body into text. Streams are decoded lossily.
    pub fn into_text(self) -> io::Result<String> {
        match self {
            ResponseBody::Buffered(text) => Ok(text),
            stream => {
                let bytes = stream.into_bytes()?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }
}

/// A received response. Not `Clone` because a streamed body is single-use.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// True when the declared content type means the body must not be buffered.
pub(crate) fn is_octet_stream(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.trim().eq_ignore_ascii_case(CONTENT_TYPE_OCTET_STREAM))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_lookup_ignores_case() {
        let headers: Headers = [("Content-Type", "application/json")].into_iter().collect();
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn set_default_never_overwrites() {
        let mut headers: Headers = [("user-agent", "custom")].into_iter().collect();
        assert!(!headers.set_default("User-Agent", USER_AGENT));
        assert!(headers.set_default("X-Auth-Token", "abc"));
        assert_eq!(headers.get("User-Agent"), Some("custom"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn insert_replaces_all_spellings() {
        let mut headers: Headers = [("accept", "a"), ("Accept", "b")].into_iter().collect();
        headers.insert("ACCEPT", "c");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("accept"), Some("c"));
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn request_target_keeps_query() {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: Url::parse("http://host:9511/prefix/v1/clusters?limit=2").unwrap(),
            headers: Headers::new(),
            body: None,
        };
        assert_eq!(request.target(), "/prefix/v1/clusters?limit=2");
    }

    #[test]
    fn chunk_iter_yields_fixed_chunks_then_stops() {
        let data: Vec<u8> = (0..10u8).collect();
        let iter = ChunkIter::with_chunk_size(Box::new(Cursor::new(data.clone())), 4);
        let chunks: Vec<Vec<u8>> = iter.map(|c| c.unwrap()).collect();
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn chunk_iter_on_empty_reader_is_empty() {
        let mut iter = ChunkIter::new(Box::new(io::empty()));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn buffered_body_decodes_lossily() {
        let body = ResponseBody::buffered(vec![b'o', b'k', 0xff]);
        assert_eq!(body.as_text(), Some("ok\u{fffd}"));
    }

    #[test]
    fn octet_stream_detection_is_exact() {
        assert!(is_octet_stream(Some("application/octet-stream")));
        assert!(!is_octet_stream(Some("application/json")));
        assert!(!is_octet_stream(None));
    }
}
