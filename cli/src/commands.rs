//! Subcommand execution.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use magnum_core::{build_patch, connect, Headers, HttpMethod, ListOptions, MagnumClient, Session};

use crate::cli::{Cli, Commands};
use crate::error::Result;

/// Build a client from the global options, with a `ureq` session when asked.
pub fn client(cli: &Cli) -> Result<MagnumClient> {
    let config = cli.transport_config();
    let session = if cli.use_session {
        Some(Session::from_options(
            &config.connection_options(),
            config.proxy.as_deref(),
        )?)
    } else {
        None
    };
    Ok(MagnumClient::new(connect(&config, session)?))
}

/// Run the parsed command, writing its JSON result to `out`.
pub fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    let client = client(cli)?;
    debug!(command = ?cli.command, "running");
    execute(&client, &cli.command, out)
}

pub fn execute<W: Write>(client: &MagnumClient, command: &Commands, out: &mut W) -> Result<()> {
    match command {
        Commands::Request { method, path, data } => {
            let method: HttpMethod = method.parse()?;
            let body = data.as_deref().map(serde_json::from_str::<Value>).transpose()?;
            let (response, reply) =
                client
                    .transport()
                    .json_request(method, path, &Headers::new(), body.as_ref())?;
            match reply {
                Some(reply) => print(out, &reply),
                None => {
                    writeln!(out, "HTTP {} {}", response.status, response.reason)?;
                    Ok(())
                }
            }
        }
        Commands::ClusterList(args) => print(out, &client.clusters().list(&args.into())?),
        Commands::ClusterShow { cluster } => print(out, &client.clusters().get(cluster)?),
        Commands::ClusterDelete { clusters } => {
            for cluster in clusters {
                client.clusters().delete(cluster)?;
                writeln!(out, "Request to delete cluster {cluster} has been accepted.")?;
            }
            Ok(())
        }
        Commands::ClusterUpdate {
            cluster,
            op,
            attributes,
        } => {
            let patch = build_patch(op, attributes)?;
            print(out, &client.clusters().update(cluster, &patch)?)
        }
        Commands::ClusterTemplateList(args) => {
            print(out, &client.cluster_templates().list(&args.into())?)
        }
        Commands::ClusterTemplateShow { template } => {
            print(out, &client.cluster_templates().get(template)?)
        }
        Commands::NodegroupList { cluster, list } => {
            print(out, &client.nodegroups(cluster).list(&list.into())?)
        }
        Commands::CaShow { cluster } => print(out, &client.certificates().get(cluster)?),
        Commands::QuotasList { all_tenants } => {
            let quotas = if *all_tenants {
                client.quotas().list_all_tenants()?
            } else {
                client.quotas().list(&ListOptions::default())?
            };
            print(out, &quotas)
        }
        Commands::StatsList { project_id } => {
            print(out, &client.stats().get(project_id.as_deref())?)
        }
        Commands::ServiceList => print(out, &client.mservices().list(&ListOptions::default())?),
    }
}

fn print<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
