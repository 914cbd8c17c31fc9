//! Minimal HTTP/1.1 codec for the socket transport.
//!
//! Writes one request with `Connection: close` and parses the status line and
//! headers of the reply. The body is exposed as a reader that honours
//! `Content-Length`, chunked transfer encoding, or read-until-close.

use std::io::{self, BufRead, Read, Write};

use crate::http::{Headers, HttpMethod};

/// Upper bound on a single status or header line.
const MAX_LINE: usize = 16 * 1024;
/// Upper bound on the number of response headers.
const MAX_HEADERS: usize = 256;

/// Serialize a request onto `w`.
///
/// `target` is the request-target (origin form, or absolute form through a
/// plain proxy). `Host`, `Content-Length` and `Connection` are filled in here.
pub(crate) fn write_request<W: Write>(
    w: &mut W,
    method: HttpMethod,
    target: &str,
    host: &str,
    headers: &Headers,
    body: Option<&[u8]>,
) -> io::Result<()> {
    let mut head = format!("{method} {target} HTTP/1.1\r\n");
    if !headers.contains("host") {
        head.push_str(&format!("Host: {host}\r\n"));
    }
    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    match body {
        Some(body) => head.push_str(&format!("Content-Length: {}\r\n", body.len())),
        None if matches!(method, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch) => {
            head.push_str("Content-Length: 0\r\n")
        }
        None => {}
    }
    head.push_str("Connection: close\r\n\r\n");

    w.write_all(head.as_bytes())?;
    if let Some(body) = body {
        w.write_all(body)?;
    }
    w.flush()
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

/// Read the response head, skipping any interim 1xx responses.
pub(crate) fn read_head<R: BufRead>(r: &mut R) -> io::Result<ResponseHead> {
    loop {
        let head = read_one_head(r)?;
        if (100..200).contains(&head.status) && head.status != 101 {
            continue;
        }
        return Ok(head);
    }
}

fn read_one_head<R: BufRead>(r: &mut R) -> io::Result<ResponseHead> {
    let status_line = read_line(r)?
        .ok_or_else(|| invalid("connection closed before status line"))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(invalid(&format!("malformed status line: {status_line}")));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| invalid(&format!("malformed status code: {status_line}")))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Headers::new();
    loop {
        let line = read_line(r)?.ok_or_else(|| invalid("connection closed inside headers"))?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(invalid("too many response headers"));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid(&format!("malformed header line: {line}")))?;
        headers.append(name.trim(), value.trim());
    }
    Ok(ResponseHead {
        status,
        reason,
        headers,
    })
}

/// Reader over the response body framed according to `head`.
pub(crate) fn body_reader<R>(head: &ResponseHead, method: HttpMethod, r: R) -> io::Result<Box<dyn Read + Send>>
where
    R: BufRead + Send + 'static,
{
    if method == HttpMethod::Head || head.status == 204 || head.status == 304 {
        return Ok(Box::new(io::empty()));
    }
    let chunked = head
        .headers
        .get("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return Ok(Box::new(ChunkedReader::new(r)));
    }
    if let Some(length) = head.headers.get("content-length") {
        let length = length
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(&format!("bad Content-Length: {length}")))?;
        return Ok(Box::new(r.take(length)));
    }
    Ok(Box::new(r))
}

/// Decoder for `Transfer-Encoding: chunked`.
pub(crate) struct ChunkedReader<R> {
    inner: R,
    remaining: u64,
    done: bool,
}

impl<R: BufRead> ChunkedReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            remaining: 0,
            done: false,
        }
    }

    fn next_chunk_size(&mut self) -> io::Result<u64> {
        let line = read_line(&mut self.inner)?.ok_or_else(|| eof("chunk size"))?;
        let size = line.split(';').next().unwrap_or_default().trim();
        u64::from_str_radix(size, 16).map_err(|_| invalid(&format!("bad chunk size: {line}")))
    }

    fn skip_trailers(&mut self) -> io::Result<()> {
        while let Some(line) = read_line(&mut self.inner)? {
            if line.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

impl<R: BufRead> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            self.remaining = self.next_chunk_size()?;
            if self.remaining == 0 {
                self.skip_trailers()?;
                self.done = true;
                return Ok(0);
            }
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(eof("chunk data"));
        }
        self.remaining -= n as u64;
        if self.remaining == 0 {
            // CRLF after the chunk data
            read_line(&mut self.inner)?.ok_or_else(|| eof("chunk terminator"))?;
        }
        Ok(n)
    }
}

/// One CRLF- (or LF-) terminated line without its terminator; `None` at EOF.
fn read_line<R: BufRead>(r: &mut R) -> io::Result<Option<String>> {
    let mut raw = Vec::new();
    let n = r.by_ref().take(MAX_LINE as u64 + 1).read_until(b'\n', &mut raw)?;
    if n == 0 {
        return Ok(None);
    }
    if raw.last() != Some(&b'\n') {
        if raw.len() > MAX_LINE {
            return Err(invalid("line too long"));
        }
        return Err(eof("line terminator"));
    }
    raw.pop();
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw)
        .map(Some)
        .map_err(|_| invalid("line is not valid UTF-8"))
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn eof(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, format!("connection closed while reading {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_body(raw: &[u8], method: HttpMethod) -> (ResponseHead, Vec<u8>) {
        let mut cursor = Cursor::new(raw.to_vec());
        let head = read_head(&mut cursor).unwrap();
        let mut body = Vec::new();
        body_reader(&head, method, cursor)
            .unwrap()
            .read_to_end(&mut body)
            .unwrap();
        (head, body)
    }

    #[test]
    fn request_is_serialized_with_framing_headers() {
        let headers: Headers = [("X-Auth-Token", "tok"), ("Connection", "keep-alive")]
            .into_iter()
            .collect();
        let mut out = Vec::new();
        write_request(
            &mut out,
            HttpMethod::Post,
            "/v1/clusters",
            "magnum:9511",
            &headers,
            Some(b"{}"),
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "POST /v1/clusters HTTP/1.1\r\nHost: magnum:9511\r\nX-Auth-Token: tok\r\n\
             Content-Length: 2\r\nConnection: close\r\n\r\n{}"
        );
    }

    #[test]
    fn bodiless_get_has_no_content_length() {
        let mut out = Vec::new();
        write_request(&mut out, HttpMethod::Get, "/", "h", &Headers::new(), None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("Connection: close\r\n\r\n"));
    }

    #[test]
    fn content_length_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}trailing";
        let (head, body) = read_body(raw, HttpMethod::Get);
        assert_eq!(head.status, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.headers.get("content-type"), Some("application/json"));
        assert_eq!(body, b"{}");
    }

    #[test]
    fn chunked_body_with_extensions_and_trailers() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: t\r\n\r\n";
        let (_, body) = read_body(raw, HttpMethod::Get);
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn read_until_close_without_framing() {
        let raw = b"HTTP/1.0 200 OK\r\n\r\nall of it";
        let (_, body) = read_body(raw, HttpMethod::Get);
        assert_eq!(body, b"all of it");
    }

    #[test]
    fn head_and_no_content_have_empty_bodies() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n";
        assert!(read_body(raw, HttpMethod::Head).1.is_empty());
        let raw = b"HTTP/1.1 204 No Content\r\n\r\n";
        assert!(read_body(raw, HttpMethod::Delete).1.is_empty());
    }

    #[test]
    fn interim_continue_is_skipped() {
        let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n";
        let (head, _) = read_body(raw, HttpMethod::Post);
        assert_eq!(head.status, 201);
    }

    #[test]
    fn repeated_headers_are_kept() {
        let raw = b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\nContent-Length: 0\r\n\r\n";
        let (head, _) = read_body(raw, HttpMethod::Get);
        assert_eq!(head.headers.iter().filter(|(k, _)| *k == "Set-Cookie").count(), 2);
    }

    #[test]
    fn malformed_status_line_is_rejected() {
        let mut cursor = Cursor::new(b"garbage\r\n\r\n".to_vec());
        let err = read_head(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_chunk_is_an_error() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\na\r\nshort";
        let mut cursor = Cursor::new(raw.to_vec());
        let head = read_head(&mut cursor).unwrap();
        let mut body = Vec::new();
        let err = body_reader(&head, HttpMethod::Get, cursor)
            .unwrap()
            .read_to_end(&mut body)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
