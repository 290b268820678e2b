// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

#![deny(clippy::large_futures)]

mod config;
#[cfg(with_metrics)]
mod monitoring_server;

use std::{io::Write as _, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use hub_base::capability::CapabilityTable;
use hub_core::{
    detector::HeartbeatDetector,
    lock::MemoryLock,
    node::HttpNodeClient,
    request::{AccountActivitiesRequest, ActivityRequest, RssRequest},
    scheduler::{Job, Scheduler},
    Hub, HubConfig, HubError,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{Environment, Export as _, SeedOptions};

#[derive(clap::Parser)]
#[command(
    name = "hub-server",
    about = "A hub routing indexer queries to staked nodes and scoring their answers",
    version
)]
struct ServerOptions {
    /// Subcommands. Acceptable values are run, query and capabilities.
    #[command(subcommand)]
    command: ServerCommand,

    /// The number of Tokio worker threads to use.
    #[arg(long, env = "HUB_SERVER_TOKIO_THREADS")]
    tokio_threads: Option<usize>,
}

#[derive(clap::Subcommand)]
enum ServerCommand {
    /// Runs the periodic reputation jobs of the hub until interrupted.
    #[command(name = "run")]
    Run {
        #[command(flatten)]
        hub: HubConfig,

        #[command(flatten)]
        seed: SeedOptions,

        /// The name under which this instance takes job leases.
        #[arg(long, default_value = "hub-server")]
        holder: String,

        /// The address of the Prometheus endpoint.
        #[cfg(with_metrics)]
        #[arg(long, default_value = "127.0.0.1:21100")]
        metrics_address: std::net::SocketAddr,
    },

    /// Sends one query through the hub and prints the answer.
    #[command(name = "query")]
    Query {
        #[command(flatten)]
        hub: HubConfig,

        #[command(flatten)]
        seed: SeedOptions,

        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Writes the built-in capability table, as a starting point for `--capabilities`.
    #[command(name = "capabilities")]
    Capabilities {
        /// Where to write the table.
        output: PathBuf,
    },
}

#[derive(clap::Subcommand)]
enum QueryCommand {
    /// One activity, by id.
    Activity {
        id: String,
        #[arg(long)]
        action_limit: Option<u32>,
        #[arg(long)]
        action_page: Option<u32>,
    },

    /// The activities of one account.
    Account {
        account: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        action_limit: Option<u32>,
        #[arg(long)]
        cursor: Option<String>,
        #[arg(long)]
        since_timestamp: Option<u64>,
        #[arg(long)]
        until_timestamp: Option<u64>,
        #[arg(long)]
        success: Option<bool>,
        #[arg(long)]
        direction: Option<String>,
        #[arg(long)]
        network: Vec<String>,
        #[arg(long)]
        tag: Vec<String>,
        #[arg(long = "type")]
        activity_type: Vec<String>,
        #[arg(long)]
        platform: Vec<String>,
    },

    /// An RSS-hub path.
    Rss {
        path: String,
        /// A query parameter forwarded to the node, as `key=value`.
        #[arg(long = "param", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, found {input:?}"))?;
    Ok((key.to_string(), value.to_string()))
}

fn main() {
    let options = <ServerOptions as clap::Parser>::parse();

    hub_base::tracing::init(log_file_name_for(&options.command));

    let mut runtime = if options.tokio_threads == Some(1) {
        tokio::runtime::Builder::new_current_thread()
    } else {
        let mut builder = tokio::runtime::Builder::new_multi_thread();

        if let Some(threads) = options.tokio_threads {
            builder.worker_threads(threads);
        }

        builder
    };

    let result = match runtime.enable_all().build() {
        Ok(runtime) => runtime.block_on(run(options)),
        Err(error) => Err(anyhow::Error::from(error).context("failed to create Tokio runtime")),
    };
    if let Err(error) = result {
        error!("{error:#}");
        std::process::exit(1);
    }
}

/// Returns the log file name to use based on the [`ServerCommand`] that will run.
fn log_file_name_for(command: &ServerCommand) -> &'static str {
    match command {
        ServerCommand::Run { .. } => "hub-server",
        ServerCommand::Query { .. } | ServerCommand::Capabilities { .. } => "hub-client",
    }
}

async fn run(options: ServerOptions) -> anyhow::Result<()> {
    match options.command {
        ServerCommand::Run {
            hub,
            seed,
            holder,
            #[cfg(with_metrics)]
            metrics_address,
        } => {
            let environment = Environment::prepare(&hub, &seed).await?;
            let shutdown_signal = CancellationToken::new();

            #[cfg(with_metrics)]
            let metrics =
                monitoring_server::start_metrics(metrics_address, shutdown_signal.clone());

            let jobs: Vec<Arc<dyn Job>> = vec![
                Arc::new(environment.scorer(&hub)),
                Arc::new(HeartbeatDetector::new(
                    Arc::new(environment.store.clone()),
                    hub.heartbeat_timeout(),
                    hub.heartbeat_timeout() / 2,
                )),
            ];
            let scheduler = Scheduler::new(Arc::new(MemoryLock::new()), holder, hub.lock_ttl());
            let handle = tokio::spawn(scheduler.run(jobs, shutdown_signal.clone()));

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for the interrupt signal")?;
            info!("shutting down");
            shutdown_signal.cancel();
            handle.await?;
            #[cfg(with_metrics)]
            metrics.await?;
            Ok(())
        }

        ServerCommand::Query { hub, seed, query } => {
            let environment = Environment::prepare(&hub, &seed).await?;
            environment
                .scorer(&hub)
                .score_all(hub_base::data_types::Timestamp::now())
                .await?;
            let client = HttpNodeClient::new(hub.verification_timeout())?;
            let service = Hub::new(
                &hub,
                environment.table.clone(),
                Arc::new(environment.store.clone()),
                Arc::new(environment.cache.clone()),
                Arc::new(client),
            );

            let result = match query {
                QueryCommand::Activity {
                    id,
                    action_limit,
                    action_page,
                } => {
                    let request = ActivityRequest {
                        id,
                        action_limit,
                        action_page,
                    };
                    service.activity(&request).await
                }
                QueryCommand::Account {
                    account,
                    limit,
                    action_limit,
                    cursor,
                    since_timestamp,
                    until_timestamp,
                    success,
                    direction,
                    network,
                    tag,
                    activity_type,
                    platform,
                } => {
                    let request = AccountActivitiesRequest {
                        account,
                        limit,
                        action_limit,
                        cursor,
                        since_timestamp,
                        until_timestamp,
                        success,
                        direction,
                        network,
                        tag,
                        activity_type,
                        platform,
                    };
                    service.account_activities(&request).await
                }
                QueryCommand::Rss { path, query } => {
                    service.rss(&RssRequest { path, query }).await
                }
            };

            let payload = match result {
                Ok(payload) => payload,
                Err(HubError::Distributor(error)) => {
                    info!(%error, "no acceptable answer");
                    error.payload().to_vec()
                }
                Err(error) => return Err(error.into()),
            };
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&payload)?;
            stdout.write_all(b"\n")?;
            drop(stdout);

            service.await_verifications().await;
            Ok(())
        }

        ServerCommand::Capabilities { output } => {
            CapabilityTable::default().write(&output)?;
            info!(path = %output.display(), "capability table written");
            Ok(())
        }
    }
}
