//! Resource managers for the container-infra API.
//!
//! # Design
//! `MagnumClient` owns one transport and hands out short-lived managers that
//! borrow it. A [`Manager`] maps the usual verbs onto one collection path;
//! resources with extra actions (cluster resize/upgrade, quotas keyed by
//! project and resource) get inherent methods on their instantiation. Every
//! call goes through [`HttpTransport::json_request`], so status handling,
//! redirects and logging are never repeated here.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::http::{Headers, HttpMethod};
use crate::session::Session;
use crate::transport::{connect, HttpTransport};
use crate::types::{
    Bay, BayModel, Certificate, Cluster, ClusterTemplate, CreateQuota, ListOptions, MService,
    Nodegroup, PatchOp, PatchOperation, Quota, ResizeCluster, SignCertificate, Stats, UpgradeCluster,
};

/// Client for the container-infra API over any [`HttpTransport`].
pub struct MagnumClient {
    transport: Box<dyn HttpTransport>,
}

impl MagnumClient {
    pub fn new(transport: Box<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Open a transport for `config` and wrap it.
    pub fn from_config(config: &TransportConfig, session: Option<Session>) -> Result<Self> {
        Ok(Self::new(connect(config, session)?))
    }

    pub fn transport(&self) -> &dyn HttpTransport {
        self.transport.as_ref()
    }

    pub fn clusters(&self) -> Manager<'_, Cluster> {
        Manager::new(self.transport(), "/v1/clusters", "clusters")
    }

    pub fn cluster_templates(&self) -> Manager<'_, ClusterTemplate> {
        Manager::new(self.transport(), "/v1/clustertemplates", "clustertemplates")
    }

    /// Node groups of one cluster, by cluster name or uuid.
    pub fn nodegroups(&self, cluster: &str) -> Manager<'_, Nodegroup> {
        Manager::new(
            self.transport(),
            format!("/v1/clusters/{cluster}/nodegroups"),
            "nodegroups",
        )
    }

    pub fn quotas(&self) -> Manager<'_, Quota> {
        Manager::new(self.transport(), "/v1/quotas", "quotas")
    }

    pub fn mservices(&self) -> Manager<'_, MService> {
        Manager::new(self.transport(), "/v1/mservices", "mservices")
    }

    pub fn bays(&self) -> Manager<'_, Bay> {
        Manager::new(self.transport(), "/v1/bays", "bays")
    }

    pub fn baymodels(&self) -> Manager<'_, BayModel> {
        Manager::new(self.transport(), "/v1/baymodels", "baymodels")
    }

    pub fn certificates(&self) -> CertificateManager<'_> {
        CertificateManager {
            transport: self.transport(),
        }
    }

    pub fn stats(&self) -> StatsManager<'_> {
        StatsManager {
            transport: self.transport(),
        }
    }
}

/// CRUD over one collection path.
pub struct Manager<'a, T> {
    transport: &'a dyn HttpTransport,
    base: String,
    key: &'static str,
    _marker: PhantomData<T>,
}

impl<'a, T: DeserializeOwned> Manager<'a, T> {
    fn new(transport: &'a dyn HttpTransport, base: impl Into<String>, key: &'static str) -> Self {
        Self {
            transport,
            base: base.into(),
            key,
            _marker: PhantomData,
        }
    }

    /// Collection path, such as `/v1/clusters`.
    pub fn path(&self) -> &str {
        &self.base
    }

    pub fn list(&self, options: &ListOptions) -> Result<Vec<T>> {
        let mut path = if options.detail {
            format!("{}/detail", self.base)
        } else {
            self.base.clone()
        };
        let query = options.query();
        if !query.is_empty() {
            path = format!("{path}?{query}");
        }

        let Some(limit) = options.limit else {
            let body = expect_body(send(self.transport, HttpMethod::Get, &path, None)?, &path)?;
            return collection(body, self.key);
        };

        let mut items = Vec::new();
        let mut next = Some(path);
        while let Some(path) = next.take() {
            let body = expect_body(send(self.transport, HttpMethod::Get, &path, None)?, &path)?;
            next = next_link(&body, self.transport.settings().endpoint.base_path());
            for item in collection::<T>(body, self.key)? {
                items.push(item);
                if limit > 0 && items.len() >= limit {
                    return Ok(items);
                }
            }
            if let Some(path) = &next {
                debug!(next = %path, collected = items.len(), "following next link");
            }
        }
        Ok(items)
    }

    pub fn get(&self, id: &str) -> Result<T> {
        let path = format!("{}/{id}", self.base);
        decode(send(self.transport, HttpMethod::Get, &path, None)?, &path)
    }

    pub fn create<B: Serialize>(&self, body: &B) -> Result<T> {
        let body = to_value(body)?;
        decode(send(self.transport, HttpMethod::Post, &self.base, Some(&body))?, &self.base)
    }

    /// Apply a JSON-patch document with `PATCH`.
    pub fn update(&self, id: &str, patch: &[PatchOp]) -> Result<T> {
        let path = format!("{}/{id}", self.base);
        let body = to_value(patch)?;
        decode(send(self.transport, HttpMethod::Patch, &path, Some(&body))?, &path)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let path = format!("{}/{id}", self.base);
        send(self.transport, HttpMethod::Delete, &path, None)?;
        Ok(())
    }

    fn action<B: Serialize>(&self, id: &str, action: &str, body: &B) -> Result<T> {
        let path = format!("{}/{id}/actions/{action}", self.base);
        let body = to_value(body)?;
        decode(send(self.transport, HttpMethod::Post, &path, Some(&body))?, &path)
    }
}

impl Manager<'_, Cluster> {
    /// Change the node count, optionally naming the nodes to remove.
    pub fn resize(&self, id: &str, resize: &ResizeCluster) -> Result<Cluster> {
        self.action(id, "resize", resize)
    }

    /// Move the cluster to another cluster template.
    pub fn upgrade(&self, id: &str, upgrade: &UpgradeCluster) -> Result<Cluster> {
        self.action(id, "upgrade", upgrade)
    }
}

impl Manager<'_, Quota> {
    /// List quotas of every project rather than only the caller's.
    pub fn list_all_tenants(&self) -> Result<Vec<Quota>> {
        let path = format!("{}?all_tenants=True", self.base);
        let body = expect_body(send(self.transport, HttpMethod::Get, &path, None)?, &path)?;
        collection(body, self.key)
    }

    pub fn get_for(&self, project_id: &str, resource: &str) -> Result<Quota> {
        self.get(&format!("{project_id}/{resource}"))
    }

    pub fn create_quota(&self, quota: &CreateQuota) -> Result<Quota> {
        self.create(quota)
    }

    pub fn update_for(&self, project_id: &str, resource: &str, patch: &[PatchOp]) -> Result<Quota> {
        self.update(&format!("{project_id}/{resource}"), patch)
    }

    pub fn delete_for(&self, project_id: &str, resource: &str) -> Result<()> {
        self.delete(&format!("{project_id}/{resource}"))
    }
}

/// Cluster CA retrieval, CSR signing and CA rotation.
pub struct CertificateManager<'a> {
    transport: &'a dyn HttpTransport,
}

impl CertificateManager<'_> {
    pub fn get(&self, cluster: &str) -> Result<Certificate> {
        let path = format!("/v1/certificates/{cluster}");
        decode(send(self.transport, HttpMethod::Get, &path, None)?, &path)
    }

    pub fn sign(&self, request: &SignCertificate) -> Result<Certificate> {
        let path = "/v1/certificates";
        let body = to_value(request)?;
        decode(send(self.transport, HttpMethod::Post, path, Some(&body))?, path)
    }

    /// Replace the cluster CA. The service answers without a body.
    pub fn rotate_ca(&self, cluster: &str) -> Result<()> {
        let path = format!("/v1/certificates/{cluster}");
        send(self.transport, HttpMethod::Patch, &path, None)?;
        Ok(())
    }
}

pub struct StatsManager<'a> {
    transport: &'a dyn HttpTransport,
}

impl StatsManager<'_> {
    /// Totals for `project_id`, or for the whole deployment.
    pub fn get(&self, project_id: Option<&str>) -> Result<Stats> {
        let path = match project_id {
            Some(project) => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("project_id", project)
                    .finish();
                format!("/v1/stats?{query}")
            }
            None => "/v1/stats".to_string(),
        };
        decode(send(self.transport, HttpMethod::Get, &path, None)?, &path)
    }
}

/// Build a JSON-patch document from `key=value` attribute strings.
///
/// Paths get a leading `/` if missing. Values are parsed as JSON and fall
/// back to plain strings. `/labels` values use the `k1=v1,k2=v2` form and
/// become an object. `remove` takes bare paths.
pub fn build_patch<S: AsRef<str>>(op: &str, attributes: &[S]) -> Result<Vec<PatchOp>> {
    let op: PatchOperation = op.parse()?;
    attributes
        .iter()
        .map(|attr| {
            let attr = attr.as_ref();
            let attr = if attr.starts_with('/') {
                attr.to_string()
            } else {
                format!("/{attr}")
            };
            match op {
                PatchOperation::Remove => Ok(PatchOp {
                    op,
                    path: attr,
                    value: None,
                }),
                PatchOperation::Add | PatchOperation::Replace => {
                    let (path, raw) = attr.split_once('=').ok_or_else(|| {
                        Error::Config(format!(
                            "Attributes must be a list of PATH=VALUE not \"{}\"",
                            attr.trim_start_matches('/')
                        ))
                    })?;
                    let value = if path == "/labels" {
                        parse_labels(raw)?
                    } else {
                        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
                    };
                    Ok(PatchOp {
                        op,
                        path: path.to_string(),
                        value: Some(value),
                    })
                }
            }
        })
        .collect()
}

fn parse_labels(raw: &str) -> Result<Value> {
    let mut labels = serde_json::Map::new();
    for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::Config(format!(
                "labels must be a list of KEY=VALUE separated by commas, not \"{pair}\""
            ))
        })?;
        labels.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
    }
    Ok(Value::Object(labels))
}

fn send(
    transport: &dyn HttpTransport,
    method: HttpMethod,
    path: &str,
    body: Option<&Value>,
) -> Result<Option<Value>> {
    let (_, decoded) = transport.json_request(method, path, &Headers::new(), body)?;
    Ok(decoded)
}

fn to_value<B: Serialize + ?Sized>(body: &B) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| Error::Serialization(e.to_string()))
}

fn expect_body(body: Option<Value>, path: &str) -> Result<Value> {
    body.ok_or_else(|| Error::Deserialization(format!("expected a JSON body from {path}")))
}

fn decode<T: DeserializeOwned>(body: Option<Value>, path: &str) -> Result<T> {
    serde_json::from_value(expect_body(body, path)?).map_err(|e| Error::Deserialization(e.to_string()))
}

fn collection<T: DeserializeOwned>(mut body: Value, key: &str) -> Result<Vec<T>> {
    let items = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| Error::Deserialization(format!("response has no '{key}' list")))?;
    serde_json::from_value(items).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Path and query of the `next` link, relative to the endpoint base path.
fn next_link(body: &Value, base_path: &str) -> Option<String> {
    let next = body.get("next")?.as_str().filter(|n| !n.is_empty())?;
    let path = match Url::parse(next) {
        Ok(url) => url[url::Position::BeforePath..url::Position::AfterQuery].to_string(),
        Err(_) => next.to_string(),
    };
    match path.strip_prefix(base_path) {
        Some(rest) if !base_path.is_empty() && rest.starts_with('/') => Some(rest.to_string()),
        _ => Some(path),
    }
}
