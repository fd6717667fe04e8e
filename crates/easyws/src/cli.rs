//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Websocket server and client console.
#[derive(Parser, Debug)]
#[command(name = "easyws", version, about = "Websocket server and client console")]
#[command(group(ArgGroup::new("mode").required(true).args(["listen", "connect"])))]
pub struct Cli {
    /// Listen on a ws:// or wss:// URL.
    #[arg(long, value_name = "URL")]
    pub listen: Option<String>,

    /// Connect to a ws:// or wss:// URL.
    #[arg(long, value_name = "URL")]
    pub connect: Option<String>,

    /// PEM certificate chain for a wss:// listener.
    #[arg(long, value_name = "PEM", requires = "key")]
    pub cert: Option<PathBuf>,

    /// PEM private key for a wss:// listener.
    #[arg(long, value_name = "PEM", requires = "cert")]
    pub key: Option<PathBuf>,

    /// Accept any server certificate.
    #[arg(short = 'k', long)]
    pub skip_verify: bool,

    /// Extra upgrade request header, repeatable.
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Settings file (defaults to ~/.easyws/settings.json).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter, overriding the settings file.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

/// Mode selected on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Accept connections.
    Listen(String),
    /// Dial one server.
    Connect(String),
}

impl Cli {
    /// The selected mode.
    pub fn mode(&self) -> Option<Mode> {
        match (&self.listen, &self.connect) {
            (Some(url), _) => Some(Mode::Listen(url.clone())),
            (None, Some(url)) => Some(Mode::Connect(url.clone())),
            (None, None) => None,
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name is empty".to_owned());
    }
    Ok((name.to_owned(), value.to_owned()))
}
