//! Blocking client for the container-infra (Magnum) API.
//!
//! # Overview
//! The heart of the crate is the [`HttpTransport`] trait: given an endpoint
//! URL, it issues requests with the service's default headers, follows
//! redirects, streams binary bodies and turns error statuses into typed
//! [`ApiError`]s. Two implementations exist and behave the same:
//! [`SocketTransport`] speaks HTTP/1.1 over sockets it opens itself, and
//! [`SessionTransport`] delegates to a caller-supplied `ureq` agent.
//! [`connect`] picks one depending on whether a [`Session`] is given.
//!
//! # Design
//! - Transports hold only immutable configuration and are `Send + Sync`.
//! - Logging goes through `tracing`, inside a span supplied at construction.
//! - [`MagnumClient`] layers the resource managers (clusters, templates,
//!   node groups, certificates, quotas, stats, services) on any transport.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod session;
pub mod socket;
mod tls;
pub mod transport;
pub mod types;
mod wire;

pub use client::{build_patch, CertificateManager, MagnumClient, Manager, StatsManager};
pub use config::TransportConfig;
pub use endpoint::{get_connection_params, ConnectionKind, ConnectionOptions, ConnectionParams, Endpoint, TlsOptions};
pub use error::{ApiError, Error, ErrorBody, HttpErrorKind, Result};
pub use http::{ChunkIter, Headers, HttpMethod, HttpRequest, HttpResponse, ResponseBody};
pub use session::{Session, SessionTransport};
pub use socket::{Proxy, SocketTransport};
pub use transport::{connect, connect_with_span, HttpTransport, TransportSettings, DEFAULT_MAX_REDIRECTS};
pub use types::{
    Bay, BayModel, Certificate, Cluster, ClusterTemplate, CreateCluster, CreateClusterTemplate,
    CreateNodegroup, CreateQuota, ListOptions, MService, Nodegroup, PatchOp, PatchOperation, Quota,
    ResizeCluster, SignCertificate, Stats, UpgradeCluster,
};
