//! # easyws
//!
//! Console websocket server and client. Lines typed on stdin are broadcast
//! (server) or sent (client); received messages and lifecycle events are
//! printed to stdout.

#![deny(unsafe_code)]

mod cli;
mod console;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use easyws_core::Message;
use easyws_net::{
    ChannelSink, Client, ClientConfig, Endpoint, NetError, Server, ServerConfig, TlsIdentity,
    generate_self_signed,
};
use easyws_settings::EasyWsSettings;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::{Cli, Mode};
use crate::console::Command;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => easyws_settings::load_settings_from_path(path),
        None => easyws_settings::load_settings(),
    }
    .context("failed to load settings")?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.log.level);
    easyws_core::logging::init_subscriber(level, settings.log.json);

    let metrics = match easyws_net::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable");
            None
        }
    };

    match cli.mode().context("one of --listen or --connect is required")? {
        Mode::Listen(url) => run_server(&cli, &settings, &url, metrics).await,
        Mode::Connect(url) => run_client(&cli, &settings, &url, metrics).await,
    }
}

async fn run_server(
    cli: &Cli,
    settings: &EasyWsSettings,
    url: &str,
    metrics: Option<PrometheusHandle>,
) -> Result<()> {
    let endpoint = Endpoint::parse(url).context("invalid listen url")?;
    let tls = match (&cli.cert, &cli.key) {
        (Some(cert), Some(key)) => Some(
            TlsIdentity::from_files(cert, key).context("failed to read certificate or key")?,
        ),
        (None, None) if endpoint.is_tls() => {
            warn!(host = endpoint.host(), "no --cert/--key given, using a self-signed certificate");
            eprintln!("warning: serving a self-signed certificate for {}", endpoint.host());
            Some(generate_self_signed(endpoint.host())?)
        }
        (None, None) => None,
        _ => bail!("--cert and --key must be given together"),
    };

    let config = ServerConfig {
        path_routing: settings.server.path_routing,
        auth: settings.server.auth.clone(),
        tls,
        max_message_size: settings.server.max_message_size,
    };
    let (sink, queues) =
        ChannelSink::bounded(settings.queues.message_capacity, settings.queues.event_capacity);
    let server = Server::new(url, config, Arc::new(sink))?;
    let printer = console::spawn_printer(queues);

    let mut serve = tokio::spawn({
        let server = server.clone();
        async move { server.listen_and_serve().await }
    });
    info!(%endpoint, "server starting");

    let outcome = console_loop(&mut serve, metrics.as_ref(), |text| {
        let server = server.clone();
        async move {
            let report = server.broadcast(Message::text(text)).await;
            info!(delivered = report.delivered, failed = report.failed, "broadcast");
        }
    })
    .await;

    server.close().await;
    let result = match outcome {
        Some(result) => result,
        None => serve.await.context("server task panicked")?,
    };
    drop(server);
    let _ = printer.await;
    result.map_err(Into::into)
}

async fn run_client(
    cli: &Cli,
    settings: &EasyWsSettings,
    url: &str,
    metrics: Option<PrometheusHandle>,
) -> Result<()> {
    let mut root_cas = Vec::new();
    for path in &settings.client.root_ca_paths {
        let pem = std::fs::read(path)
            .with_context(|| format!("failed to read root certificate {}", path.display()))?;
        root_cas.push(pem);
    }
    let config = ClientConfig {
        skip_verify: cli.skip_verify || settings.client.skip_verify,
        skip_hostname_check: settings.client.skip_hostname_check,
        root_cas,
        headers: settings
            .client
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        max_message_size: settings.client.max_message_size,
    };
    let headers = cli.headers.clone();
    let (sink, queues) =
        ChannelSink::bounded(settings.queues.message_capacity, settings.queues.event_capacity);
    let client = Client::new(config, Arc::new(sink));
    let printer = console::spawn_printer(queues);

    let mut serve = tokio::spawn({
        let client = client.clone();
        let url = url.to_owned();
        async move { client.connect_and_serve(&url, &headers).await }
    });

    let outcome = console_loop(&mut serve, metrics.as_ref(), |text| {
        let client = client.clone();
        async move {
            if let Err(e) = client.send_text(text).await {
                eprintln!("send failed: {e}");
            }
        }
    })
    .await;

    client.disconnect().await?;
    let result = match outcome {
        Some(result) => result,
        None => serve.await.context("client task panicked")?,
    };
    drop(client);
    let _ = printer.await;
    result.map_err(Into::into)
}

/// Read stdin until `exit`, end of input, or the serve task finishing.
///
/// Returns the serve result if the task finished on its own, `None` if the
/// user asked to stop.
async fn console_loop<F, Fut>(
    serve: &mut JoinHandle<Result<(), NetError>>,
    metrics: Option<&PrometheusHandle>,
    send: F,
) -> Option<Result<(), NetError>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut lines = console::spawn_stdin_reader();
    loop {
        tokio::select! {
            finished = &mut *serve => {
                return Some(finished.unwrap_or_else(|e| Err(NetError::Io(e.to_string()))));
            }
            line = lines.recv() => match line {
                Some(line) => match Command::parse(&line) {
                    Command::Exit => return None,
                    Command::Stats => match metrics {
                        Some(handle) => print!("{}", easyws_net::metrics::render(handle)),
                        None => eprintln!("metrics unavailable"),
                    },
                    Command::Empty => {}
                    Command::Send(text) => send(text).await,
                },
                None => return None,
            },
        }
    }
}
