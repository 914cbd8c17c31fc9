//! Transport configuration.
//!
//! A [`TransportConfig`] is plain data: it can be deserialized from a config
//! file, filled from the environment, or assembled with the `with_*`
//! builders. Nothing is validated until [`crate::connect`] parses it.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use url::Url;

use crate::endpoint::ConnectionOptions;
use crate::error::{Error, Result};

/// Everything needed to open a transport.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Service URL, optionally ending in the `/v1` version segment.
    pub endpoint: String,
    pub auth_token: Option<String>,
    /// Microversion sent as `OpenStack-API-Version: container-infra <version>`.
    pub api_version: Option<String>,
    /// Seconds for connect, read and write. `None` or zero means 600.
    pub timeout: Option<f64>,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub insecure: bool,
    /// HTTP proxy, `host:port` or `http://host:port`.
    pub proxy: Option<String>,
    /// Redirect hops followed per call; defaults to 5.
    pub max_redirects: Option<u32>,
}

impl TransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Client certificate; the key is read from the same file unless set.
    pub fn with_client_cert(mut self, cert: impl Into<PathBuf>, key: Option<PathBuf>) -> Self {
        self.cert_file = Some(cert.into());
        self.key_file = key;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_max_redirects(mut self, hops: u32) -> Self {
        self.max_redirects = Some(hops);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `MAGNUM_URL` (required), `OS_AUTH_TOKEN`, `MAGNUM_API_VERSION`,
    /// `OS_CACERT`, `OS_CERT`, `OS_KEY`, `MAGNUM_INSECURE`, `MAGNUM_TIMEOUT`,
    /// and the proxy variables described at [`proxy_for`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `MAGNUM_URL` is unset or a numeric or
    /// boolean variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`TransportConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let endpoint = get("MAGNUM_URL").ok_or_else(|| Error::Config("MAGNUM_URL is not set".to_string()))?;
        let mut config = Self::new(endpoint);
        config.auth_token = get("OS_AUTH_TOKEN");
        config.api_version = get("MAGNUM_API_VERSION");
        config.ca_file = get("OS_CACERT").map(PathBuf::from);
        config.cert_file = get("OS_CERT").map(PathBuf::from);
        config.key_file = get("OS_KEY").map(PathBuf::from);
        config.proxy = proxy_for(&config.endpoint, &lookup);

        if let Some(timeout) = get("MAGNUM_TIMEOUT") {
            let secs = timeout.parse::<f64>().map_err(|_| {
                Error::Config(format!("MAGNUM_TIMEOUT must be a number of seconds, got: '{timeout}'"))
            })?;
            config.timeout = Some(secs);
        }
        if let Some(insecure) = get("MAGNUM_INSECURE") {
            config.insecure = parse_bool(&insecure).ok_or_else(|| {
                Error::Config(format!("MAGNUM_INSECURE must be a boolean, got: '{insecure}'"))
            })?;
        }
        Ok(config)
    }

    /// Options handed to the connection layer.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            timeout: self.timeout,
            ca_file: self.ca_file.clone(),
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
            insecure: self.insecure,
        }
    }
}

/// Proxy for `endpoint` from the conventional environment variables.
///
/// `https` endpoints use `HTTPS_PROXY`/`https_proxy`, `http` endpoints use
/// `HTTP_PROXY`/`http_proxy`. Hosts matched by `NO_PROXY`/`no_proxy` (`*`,
/// an exact host, or a domain suffix with or without a leading dot) go
/// direct.
pub fn proxy_for<F>(endpoint: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let url = Url::parse(endpoint).ok()?;
    let proxy = match url.scheme() {
        "https" => get("HTTPS_PROXY").or_else(|| get("https_proxy")),
        "http" => get("HTTP_PROXY").or_else(|| get("http_proxy")),
        _ => None,
    }?;

    let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']');
    let bypass = get("NO_PROXY")
        .or_else(|| get("no_proxy"))
        .is_some_and(|list| no_proxy_matches(&list, host));
    (!bypass).then_some(proxy)
}

fn no_proxy_matches(list: &str, host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    list.split(',')
        .map(|entry| entry.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .any(|entry| entry == "*" || host == entry || host.ends_with(&format!(".{entry}")))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn environment_fills_every_field() {
        let config = TransportConfig::from_lookup(lookup(&[
            ("MAGNUM_URL", "https://magnum:9511/v1"),
            ("OS_AUTH_TOKEN", "tok"),
            ("MAGNUM_API_VERSION", "latest"),
            ("OS_CACERT", "/etc/ca.pem"),
            ("OS_CERT", "/etc/cert.pem"),
            ("OS_KEY", "/etc/key.pem"),
            ("MAGNUM_INSECURE", "yes"),
            ("MAGNUM_TIMEOUT", "2.5"),
            ("HTTPS_PROXY", "proxy:3128"),
            ("HTTP_PROXY", "plain-proxy:3128"),
        ]))
        .unwrap();
        assert_eq!(config.endpoint, "https://magnum:9511/v1");
        assert_eq!(config.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.api_version.as_deref(), Some("latest"));
        assert_eq!(config.timeout, Some(2.5));
        assert!(config.insecure);
        assert_eq!(config.proxy.as_deref(), Some("proxy:3128"));

        let options = config.connection_options();
        assert_eq!(options.ca_file, Some(PathBuf::from("/etc/ca.pem")));
        assert_eq!(options.key_file, Some(PathBuf::from("/etc/key.pem")));
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = TransportConfig::from_lookup(lookup(&[("OS_AUTH_TOKEN", "tok")])).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("MAGNUM_URL")));
    }

    #[test]
    fn invalid_numbers_and_booleans_are_rejected() {
        let bad_timeout = lookup(&[("MAGNUM_URL", "http://m"), ("MAGNUM_TIMEOUT", "soon")]);
        assert!(TransportConfig::from_lookup(bad_timeout).is_err());
        let bad_bool = lookup(&[("MAGNUM_URL", "http://m"), ("MAGNUM_INSECURE", "maybe")]);
        assert!(TransportConfig::from_lookup(bad_bool).is_err());
    }

    #[test]
    fn empty_variables_are_ignored() {
        let config = TransportConfig::from_lookup(lookup(&[("MAGNUM_URL", "http://m"), ("OS_AUTH_TOKEN", "")]))
            .unwrap();
        assert_eq!(config.auth_token, None);
    }

    #[test]
    fn proxy_follows_the_endpoint_scheme() {
        let vars = lookup(&[("HTTPS_PROXY", "tls-proxy:3128"), ("http_proxy", "plain-proxy:3128")]);
        assert_eq!(proxy_for("https://magnum:9511/v1", &vars).as_deref(), Some("tls-proxy:3128"));
        assert_eq!(proxy_for("http://magnum:9511/v1", &vars).as_deref(), Some("plain-proxy:3128"));

        let https_only = lookup(&[("HTTPS_PROXY", "http://127.0.0.1:9")]);
        assert_eq!(proxy_for("http://127.0.0.1:9511/v1", &https_only), None);
    }

    #[test]
    fn no_proxy_hosts_go_direct() {
        let vars = lookup(&[
            ("HTTP_PROXY", "http://127.0.0.1:9"),
            ("HTTPS_PROXY", "http://127.0.0.1:9"),
            ("NO_PROXY", "127.0.0.1, .internal,example.org"),
        ]);
        assert_eq!(proxy_for("http://127.0.0.1:9511/v1", &vars), None);
        assert_eq!(proxy_for("https://magnum.internal/v1", &vars), None);
        assert_eq!(proxy_for("https://api.example.org/v1", &vars), None);
        assert_eq!(proxy_for("https://example.org/v1", &vars), None);
        assert_eq!(
            proxy_for("https://notexample.org/v1", &vars).as_deref(),
            Some("http://127.0.0.1:9")
        );

        let everything = lookup(&[("https_proxy", "p:1"), ("no_proxy", "*")]);
        assert_eq!(proxy_for("https://magnum/v1", &everything), None);
    }

    #[test]
    fn environment_config_bypasses_listed_hosts() {
        let config = TransportConfig::from_lookup(lookup(&[
            ("MAGNUM_URL", "http://127.0.0.1:9511/v1"),
            ("HTTPS_PROXY", "http://127.0.0.1:9"),
            ("HTTP_PROXY", "http://127.0.0.1:9"),
            ("NO_PROXY", "127.0.0.1"),
        ]))
        .unwrap();
        assert_eq!(config.proxy, None);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: TransportConfig = serde_json::from_str(
            r#"{"endpoint": "http://magnum:9511", "insecure": true, "max_redirects": 2}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            TransportConfig::new("http://magnum:9511")
                .with_insecure(true)
                .with_max_redirects(2)
        );
    }
}
