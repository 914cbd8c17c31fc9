//! Error types for the container-infra client.
//!
//! # Design
//! `Error` is the single error returned by every transport and manager call.
//! HTTP failures carry an [`ApiError`] whose kind is picked from the status
//! code and whose message comes from the error body, which the service emits
//! in several JSON shapes. Classification of that body never fails: anything
//! unparseable yields an empty [`ErrorBody`] so the HTTP status still reaches
//! the caller.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::http::HttpMethod;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by transports and resource managers.
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint URL is malformed or uses an unsupported scheme.
    #[error("{0}")]
    Endpoint(String),

    /// The endpoint host name could not be resolved.
    #[error("Error finding address for {url}: {reason}")]
    EndpointNotFound { url: String, reason: String },

    /// Connecting, the TLS handshake, or socket I/O failed.
    #[error("Error communicating with {url}: {reason}")]
    Communication { url: String, reason: String },

    /// The server answered with 300 or a 4xx/5xx status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Redirect chain exceeded the configured hop limit.
    #[error("Too many redirects (limit {limit}) while requesting {url}")]
    TooManyRedirects { limit: u32, url: String },

    /// The server sent something that is not a well-formed HTTP response.
    #[error("Invalid HTTP response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// CA, certificate or key files could not be loaded.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// A request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Invalid client configuration or arguments.
    #[error("{0}")]
    Config(String),
}

/// Error kind selected from the HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpErrorKind {
    MultipleChoices,
    BadRequest,
    Unauthorized,
    PaymentRequired,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    ProxyAuthenticationRequired,
    RequestTimeout,
    Conflict,
    Gone,
    LengthRequired,
    PreconditionFailed,
    RequestEntityTooLarge,
    RequestUriTooLong,
    UnsupportedMediaType,
    RequestedRangeNotSatisfiable,
    ExpectationFailed,
    UnprocessableEntity,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    HttpVersionNotSupported,
    /// Any other 4xx.
    HttpClientError,
    /// Any other 5xx.
    HttpServerError,
}

impl HttpErrorKind {
    /// Kind for an error status, or `None` when the status is not an error.
    pub fn from_status(status: u16) -> Option<Self> {
        use HttpErrorKind::*;
        let kind = match status {
            300 => MultipleChoices,
            400 => BadRequest,
            401 => Unauthorized,
            402 => PaymentRequired,
            403 => Forbidden,
            404 => NotFound,
            405 => MethodNotAllowed,
            406 => NotAcceptable,
            407 => ProxyAuthenticationRequired,
            408 => RequestTimeout,
            409 => Conflict,
            410 => Gone,
            411 => LengthRequired,
            412 => PreconditionFailed,
            413 => RequestEntityTooLarge,
            414 => RequestUriTooLong,
            415 => UnsupportedMediaType,
            416 => RequestedRangeNotSatisfiable,
            417 => ExpectationFailed,
            422 => UnprocessableEntity,
            500 => InternalServerError,
            501 => NotImplemented,
            502 => BadGateway,
            503 => ServiceUnavailable,
            504 => GatewayTimeout,
            505 => HttpVersionNotSupported,
            400..=499 => HttpClientError,
            500..=599 => HttpServerError,
            _ => return None,
        };
        Some(kind)
    }

    /// Message used when the body carried no fault string.
    pub fn reason(&self) -> &'static str {
        use HttpErrorKind::*;
        match self {
            MultipleChoices => "Multiple Choices",
            BadRequest => "Bad Request",
            Unauthorized => "Unauthorized",
            PaymentRequired => "Payment Required",
            Forbidden => "Forbidden",
            NotFound => "Not Found",
            MethodNotAllowed => "Method Not Allowed",
            NotAcceptable => "Not Acceptable",
            ProxyAuthenticationRequired => "Proxy Authentication Required",
            RequestTimeout => "Request Timeout",
            Conflict => "Conflict",
            Gone => "Gone",
            LengthRequired => "Length Required",
            PreconditionFailed => "Precondition Failed",
            RequestEntityTooLarge => "Request Entity Too Large",
            RequestUriTooLong => "Request-URI Too Long",
            UnsupportedMediaType => "Unsupported Media Type",
            RequestedRangeNotSatisfiable => "Requested Range Not Satisfiable",
            ExpectationFailed => "Expectation Failed",
            UnprocessableEntity => "Unprocessable Entity",
            InternalServerError => "Internal Server Error",
            NotImplemented => "Not Implemented",
            BadGateway => "Bad Gateway",
            ServiceUnavailable => "Service Unavailable",
            GatewayTimeout => "Gateway Timeout",
            HttpVersionNotSupported => "HTTP Version Not Supported",
            HttpClientError => "HTTP Client Error",
            HttpServerError => "HTTP Server Error",
        }
    }
}

/// Fault string and debug trace pulled out of an error response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    pub fault_string: Option<String>,
    pub debug_info: Option<String>,
}

impl ErrorBody {
    /// Classify an error body. JSON is attempted whatever the declared
    /// content type; failure at any step gives an empty classification.
    pub fn parse(body: &str) -> Self {
        extract(body).unwrap_or_default()
    }
}

fn extract(body: &str) -> Option<ErrorBody> {
    let value: Value = serde_json::from_str(body).ok()?;
    let map = value.as_object()?;

    // {"error_message": "<json string with faultstring/debuginfo>"}
    if let Some(raw) = map.get("error_message") {
        let inner = match raw {
            Value::String(encoded) => serde_json::from_str::<Value>(encoded).ok()?,
            other => other.clone(),
        };
        return Some(ErrorBody {
            fault_string: text_field(&inner, "faultstring"),
            debug_info: text_field(&inner, "debuginfo"),
        });
    }

    // {"error": {"title": ..., "message": ...}}
    if let Some(error) = map.get("error") {
        return Some(ErrorBody {
            fault_string: text_field(error, "title"),
            debug_info: text_field(error, "message"),
        });
    }

    // {"errors": [{"title": ..., "detail"|"description": ...}]}
    let first = map.get("errors")?.as_array()?.first()?;
    Some(ErrorBody {
        fault_string: text_field(first, "title"),
        debug_info: text_field(first, "detail").or_else(|| text_field(first, "description")),
    })
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// An HTTP error response translated into a typed error.
///
/// `Display` renders `"<fault> (HTTP <status>)"`. The alternate form
/// (`{:#}`) appends the debug trace on the next line when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    kind: HttpErrorKind,
    status: u16,
    fault_string: Option<String>,
    debug_info: Option<String>,
    method: Option<HttpMethod>,
    url: Option<String>,
}

impl ApiError {
    pub fn new(kind: HttpErrorKind, status: u16, body: ErrorBody) -> Self {
        Self {
            kind,
            status,
            fault_string: body.fault_string,
            debug_info: body.debug_info,
            method: None,
            url: None,
        }
    }

    /// Build the error for a response, or `None` if `status` is not an error.
    ///
    /// The body is only classified for 4xx/5xx; a bare 300 carries no fault.
    pub fn from_response(status: u16, body: Option<&str>) -> Option<Self> {
        let kind = HttpErrorKind::from_status(status)?;
        let parsed = match (status, body) {
            (300, _) | (_, None) => ErrorBody::default(),
            (_, Some(text)) => ErrorBody::parse(text),
        };
        Some(Self::new(kind, status, parsed))
    }

    pub fn with_request(mut self, method: HttpMethod, url: impl Into<String>) -> Self {
        self.method = Some(method);
        self.url = Some(url.into());
        self
    }

    pub fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn fault_string(&self) -> Option<&str> {
        self.fault_string.as_deref()
    }

    pub fn debug_info(&self) -> Option<&str> {
        self.debug_info.as_deref()
    }

    pub fn method(&self) -> Option<HttpMethod> {
        self.method
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn message(&self) -> &str {
        self.fault_string.as_deref().unwrap_or(self.kind.reason())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (HTTP {})", self.message(), self.status)?;
        if f.alternate() {
            if let Some(debug_info) = &self.debug_info {
                write!(f, "\n{debug_info}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}
