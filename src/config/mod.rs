//! Configuration management
//!
//! Precedence, lowest first: built-in defaults, `<config dir>/config.*`,
//! `MPVR_*` environment variables, command-line arguments.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "mpv-remote";

pub const USAGE: &str = "\
Usage: mpv-remote <socket> [options]

Options:
  --address <ip>              Server address to listen on
  -p, --webport <port>        First available server port (default 8000)
  -e, --webportrangeend <port>
                              Last available server port (default 8005)
  --osd-messages              Enables OSD messages
  --verbose                   Verbose logging
  -h, --help                  Show this help";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Path of mpv's `--input-ipc-server` socket
    #[serde(default)]
    pub socket: String,

    /// Address to listen on; all interfaces when unset
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default = "default_webport")]
    pub webport: u16,

    #[serde(default = "default_webport_range_end")]
    pub webportrangeend: u16,

    #[serde(default)]
    pub osd_messages: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "default_status_deadline_ms")]
    pub status_deadline_ms: u64,

    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    #[serde(default = "default_osd_queue_capacity")]
    pub osd_queue_capacity: usize,
}

fn default_webport() -> u16 {
    8000
}

fn default_webport_range_end() -> u16 {
    8005
}

fn default_status_deadline_ms() -> u64 {
    500
}

fn default_response_timeout_ms() -> u64 {
    5000
}

fn default_osd_queue_capacity() -> usize {
    32
}

impl Config {
    pub fn status_deadline(&self) -> Duration {
        Duration::from_millis(self.status_deadline_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Candidate ports, in bind order
    pub fn ports(&self) -> std::ops::RangeInclusive<u16> {
        self.webport..=self.webportrangeend.max(self.webport)
    }
}

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub socket: Option<String>,
    pub address: Option<String>,
    pub webport: Option<u16>,
    pub webportrangeend: Option<u16>,
    pub osd_messages: bool,
    pub verbose: bool,
    pub help: bool,
}

impl CliArgs {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cli = CliArgs::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with('-') => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String> {
                match inline.clone() {
                    Some(v) => Ok(v),
                    None => args
                        .next()
                        .with_context(|| format!("{} requires a value", name)),
                }
            };

            match flag.as_str() {
                "--address" => cli.address = Some(value("--address")?),
                "-p" | "--webport" => cli.webport = Some(parse_port("--webport", &value("--webport")?)?),
                "-e" | "--webportrangeend" => {
                    cli.webportrangeend = Some(parse_port(
                        "--webportrangeend",
                        &value("--webportrangeend")?,
                    )?)
                }
                "--osd-messages" => cli.osd_messages = true,
                "--verbose" => cli.verbose = true,
                "-h" | "--help" => cli.help = true,
                other if other.starts_with('-') => bail!("Unknown option: {}", other),
                _ if cli.socket.is_none() => cli.socket = Some(arg),
                // Extra positionals are ignored, as mpv-remote always did
                _ => {}
            }
        }

        Ok(cli)
    }
}

fn parse_port(flag: &str, raw: &str) -> Result<u16> {
    raw.parse()
        .with_context(|| format!("{} expects a port number, got {:?}", flag, raw))
}

/// Get config directory
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MPVR_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join(CONFIG_DIR_NAME);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join(CONFIG_DIR_NAME);
    }
    PathBuf::from(".")
}

pub fn load_config(cli: &CliArgs) -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (MPVR_WEBPORT, MPVR_OSD_MESSAGES, ...)
        .add_source(
            ::config::Environment::with_prefix("MPVR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    // Command line wins over everything
    if let Some(ref socket) = cli.socket {
        builder = builder.set_override("socket", socket.as_str())?;
    }
    if let Some(ref address) = cli.address {
        builder = builder.set_override("address", address.as_str())?;
    }
    if let Some(port) = cli.webport {
        builder = builder.set_override("webport", port as i64)?;
    }
    if let Some(port) = cli.webportrangeend {
        builder = builder.set_override("webportrangeend", port as i64)?;
    }
    if cli.osd_messages {
        builder = builder.set_override("osd_messages", true)?;
    }
    if cli.verbose {
        builder = builder.set_override("verbose", true)?;
    }

    let config: Config = builder.build()?.try_deserialize()?;

    if config.socket.is_empty() {
        bail!("No socket provided");
    }
    if config.webportrangeend < config.webport {
        bail!(
            "webportrangeend ({}) is lower than webport ({})",
            config.webportrangeend,
            config.webport
        );
    }

    Ok(config)
}
