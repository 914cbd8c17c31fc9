//! Command-line argument parsing with clap.

use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use magnum_core::config::proxy_for;
use magnum_core::{ListOptions, TransportConfig};

/// Command-line client for the container-infra (Magnum) API.
#[derive(Parser, Debug, Clone)]
#[command(name = "magnum")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Service endpoint, for example `https://magnum:9511/v1`.
    #[arg(long, env = "MAGNUM_URL")]
    pub magnum_url: String,

    /// Keystone token sent as `X-Auth-Token`.
    #[arg(long, env = "OS_AUTH_TOKEN", hide_env_values = true)]
    pub os_auth_token: Option<String>,

    /// API microversion.
    #[arg(long, env = "MAGNUM_API_VERSION", default_value = "latest")]
    pub api_version: String,

    /// Skip server certificate verification.
    #[arg(long, env = "MAGNUM_INSECURE")]
    pub insecure: bool,

    /// CA bundle used to verify the server.
    #[arg(long, env = "OS_CACERT")]
    pub os_cacert: Option<PathBuf>,

    /// Client certificate (PEM).
    #[arg(long, env = "OS_CERT")]
    pub os_cert: Option<PathBuf>,

    /// Client key (PEM); defaults to the certificate file.
    #[arg(long, env = "OS_KEY")]
    pub os_key: Option<PathBuf>,

    /// Connect, read and write timeout in seconds.
    #[arg(long, env = "MAGNUM_TIMEOUT")]
    pub timeout: Option<f64>,

    /// HTTP proxy, `host:port` or `http://host:port`; empty disables it.
    /// Defaults to `HTTPS_PROXY` or `HTTP_PROXY` by endpoint scheme, honouring `NO_PROXY`.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Send requests through a pooled `ureq` session instead of raw sockets.
    #[arg(long)]
    pub use_session: bool,

    /// Log requests as `curl` commands and dump responses to stderr.
    #[arg(long)]
    pub debug: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn transport_config(&self) -> TransportConfig {
        let mut config = TransportConfig::new(&self.magnum_url)
            .with_api_version(&self.api_version)
            .with_insecure(self.insecure);
        config.auth_token = self.os_auth_token.clone();
        config.timeout = self.timeout;
        config.ca_file = self.os_cacert.clone();
        config.cert_file = self.os_cert.clone();
        config.key_file = self.os_key.clone();
        config.proxy = match &self.proxy {
            Some(proxy) => Some(proxy.clone()).filter(|p| !p.is_empty()),
            None => proxy_for(&self.magnum_url, |name| env::var(name).ok()),
        };
        config
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Issue an arbitrary request and print the JSON reply.
    Request {
        /// HTTP method.
        method: String,
        /// Path relative to the endpoint, such as `/v1/clusters`.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },

    /// List clusters.
    ClusterList(ListArgs),

    /// Show one cluster.
    ClusterShow {
        /// Cluster name or uuid.
        cluster: String,
    },

    /// Delete one or more clusters.
    ClusterDelete {
        /// Cluster names or uuids.
        #[arg(required = true)]
        clusters: Vec<String>,
    },

    /// Update a cluster with `add`, `replace` or `remove` operations.
    ClusterUpdate {
        /// Cluster name or uuid.
        cluster: String,
        /// Patch operation.
        op: String,
        /// Attributes as `PATH=VALUE` (bare `PATH` for remove).
        #[arg(required = true)]
        attributes: Vec<String>,
    },

    /// List cluster templates.
    ClusterTemplateList(ListArgs),

    /// Show one cluster template.
    ClusterTemplateShow {
        /// Template name or uuid.
        template: String,
    },

    /// List the node groups of a cluster.
    NodegroupList {
        /// Cluster name or uuid.
        cluster: String,
        #[command(flatten)]
        list: ListArgs,
    },

    /// Show the CA certificate of a cluster.
    CaShow {
        /// Cluster name or uuid.
        cluster: String,
    },

    /// List quotas.
    QuotasList {
        /// Include every project.
        #[arg(long)]
        all_tenants: bool,
    },

    /// Show cluster and node totals.
    StatsList {
        /// Restrict to one project.
        #[arg(long)]
        project_id: Option<String>,
    },

    /// List Magnum services.
    ServiceList,
}

/// Paging and sorting flags shared by the list commands.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Maximum number of items; 0 fetches every page.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Uuid of the last item of the previous page.
    #[arg(long)]
    pub marker: Option<String>,

    /// Column to sort by.
    #[arg(long)]
    pub sort_key: Option<String>,

    /// `asc` or `desc`.
    #[arg(long)]
    pub sort_dir: Option<String>,

    /// Return full records.
    #[arg(long)]
    pub detail: bool,
}

impl From<&ListArgs> for ListOptions {
    fn from(args: &ListArgs) -> Self {
        ListOptions {
            limit: args.limit,
            marker: args.marker.clone(),
            sort_key: args.sort_key.clone(),
            sort_dir: args.sort_dir.clone(),
            detail: args.detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://magnum:9511/v1";

    #[test]
    fn parses_global_options() {
        let cli = Cli::parse_from([
            "magnum",
            "--magnum-url",
            URL,
            "--os-auth-token",
            "tok",
            "--api-version",
            "1.10",
            "--insecure",
            "--timeout",
            "2.5",
            "--use-session",
            "stats-list",
        ]);
        let config = cli.transport_config();
        assert_eq!(config.endpoint, URL);
        assert_eq!(config.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.api_version.as_deref(), Some("1.10"));
        assert!(config.insecure);
        assert_eq!(config.timeout, Some(2.5));
        assert!(cli.use_session);
        assert!(matches!(cli.command, Commands::StatsList { project_id: None }));
    }

    #[test]
    fn api_version_defaults_to_latest() {
        let cli = Cli::parse_from(["magnum", "--magnum-url", URL, "service-list"]);
        assert_eq!(cli.transport_config().api_version.as_deref(), Some("latest"));
    }

    #[test]
    fn list_flags_become_list_options() {
        let cli = Cli::parse_from([
            "magnum",
            "--magnum-url",
            URL,
            "cluster-list",
            "--limit",
            "0",
            "--sort-key",
            "name",
            "--detail",
        ]);
        let Commands::ClusterList(args) = &cli.command else {
            panic!("expected cluster-list")
        };
        let options = ListOptions::from(args);
        assert_eq!(options.limit, Some(0));
        assert_eq!(options.sort_key.as_deref(), Some("name"));
        assert!(options.detail);
    }

    #[test]
    fn explicit_proxy_wins_and_empty_disables() {
        let cli = Cli::parse_from(["magnum", "--magnum-url", URL, "--proxy", "p:3128", "service-list"]);
        assert_eq!(cli.transport_config().proxy.as_deref(), Some("p:3128"));

        let cli = Cli::parse_from(["magnum", "--magnum-url", URL, "--proxy=", "service-list"]);
        assert_eq!(cli.transport_config().proxy, None);
    }

    #[test]
    fn cluster_delete_requires_a_name() {
        let err = Cli::try_parse_from(["magnum", "--magnum-url", URL, "cluster-delete"]);
        assert!(err.is_err());
    }

    #[test]
    fn cluster_update_collects_attributes() {
        let cli = Cli::parse_from([
            "magnum",
            "--magnum-url",
            URL,
            "cluster-update",
            "prod",
            "replace",
            "node_count=3",
            "labels=a=1,b=2",
        ]);
        let Commands::ClusterUpdate { cluster, op, attributes } = cli.command else {
            panic!("expected cluster-update")
        };
        assert_eq!(cluster, "prod");
        assert_eq!(op, "replace");
        assert_eq!(attributes, ["node_count=3", "labels=a=1,b=2"]);
    }
}
