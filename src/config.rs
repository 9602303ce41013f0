use std::collections::HashMap;
use std::fs::read_to_string;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

use service::{CallPolicy, Node};

/// A duration config value, expressed in seconds, with an `"infinity"`
/// escape hatch for the inactivity timeouts that are allowed to be
/// disabled entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutSetting {
    Seconds(u64),
    Infinity,
}

impl TimeoutSetting {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Seconds(s) => Some(Duration::from_secs(*s)),
            Self::Infinity => None,
        }
    }
}

impl<'de> Deserialize<'de> for TimeoutSetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Infinity(String),
            Seconds(u64),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Seconds(s) => TimeoutSetting::Seconds(s),
            Repr::Infinity(s) if s == "infinity" => TimeoutSetting::Infinity,
            Repr::Infinity(other) => {
                return Err(serde::de::Error::custom(format!(
                    "expected a number of seconds or \"infinity\", got {other:?}"
                )));
            }
        })
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Timeouts {
    #[serde(default = "Timeouts::connect_timeout")]
    pub connect_timeout: TimeoutSetting,
    #[serde(default = "Timeouts::send_timeout")]
    pub send_timeout: TimeoutSetting,
    #[serde(default = "Timeouts::receive_timeout")]
    pub receive_timeout: TimeoutSetting,
    /// Receive timeout applied to broadcast/multicall fan-out, which is
    /// expected to wait on the slowest of several peers rather than one.
    #[serde(default = "Timeouts::sbcast_receive_timeout")]
    pub sbcast_receive_timeout: TimeoutSetting,
    #[serde(default = "Timeouts::client_inactivity_timeout")]
    pub client_inactivity_timeout: TimeoutSetting,
    #[serde(default = "Timeouts::server_inactivity_timeout")]
    pub server_inactivity_timeout: TimeoutSetting,
    /// Accepted for config-surface parity with the wider `gen_rpc`-style
    /// key set; there is no async-call primitive in this engine for it to
    /// bound.
    #[serde(default = "Timeouts::async_call_inactivity_timeout")]
    #[allow(dead_code)]
    pub async_call_inactivity_timeout: TimeoutSetting,
}

impl Timeouts {
    fn connect_timeout() -> TimeoutSetting {
        TimeoutSetting::Seconds(5)
    }

    fn send_timeout() -> TimeoutSetting {
        TimeoutSetting::Seconds(5)
    }

    fn receive_timeout() -> TimeoutSetting {
        TimeoutSetting::Seconds(15)
    }

    fn sbcast_receive_timeout() -> TimeoutSetting {
        TimeoutSetting::Seconds(15)
    }

    fn client_inactivity_timeout() -> TimeoutSetting {
        TimeoutSetting::Seconds(120)
    }

    fn server_inactivity_timeout() -> TimeoutSetting {
        TimeoutSetting::Seconds(120)
    }

    fn async_call_inactivity_timeout() -> TimeoutSetting {
        TimeoutSetting::Seconds(300)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_timeout: Self::connect_timeout(),
            send_timeout: Self::send_timeout(),
            receive_timeout: Self::receive_timeout(),
            sbcast_receive_timeout: Self::sbcast_receive_timeout(),
            client_inactivity_timeout: Self::client_inactivity_timeout(),
            server_inactivity_timeout: Self::server_inactivity_timeout(),
            async_call_inactivity_timeout: Self::async_call_inactivity_timeout(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Off,
    Whitelist,
    Blacklist,
}

impl Default for PolicyMode {
    fn default() -> Self {
        Self::Off
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    /// This node's own identity: the originator recorded in every request
    /// packet and the value the resolver compares against for the
    /// loopback shortcut.
    pub node_name: String,
    /// Control-channel listener port (bound on all interfaces).
    #[serde(default = "Server::tcp_server_port")]
    pub tcp_server_port: u16,
    /// Per-peer control-channel port, for peers that aren't listening on
    /// `tcp_server_port`. Addresses not named here fall back to that
    /// default port on the peer's configured host.
    #[serde(default)]
    pub remote_tcp_server_ports: HashMap<String, SocketAddr>,
    #[serde(default)]
    pub rpc_module_control: PolicyMode,
    #[serde(default)]
    pub rpc_module_list: Vec<String>,
    /// Probe membership for reachability before every call send. Off by
    /// default; see `service::EngineOptions::liveness_check`.
    #[serde(default)]
    pub liveness_check: bool,
}

impl Server {
    fn tcp_server_port() -> u16 {
        default_control_port()
    }

    pub fn policy(&self) -> CallPolicy {
        match self.rpc_module_control {
            PolicyMode::Off => CallPolicy::Off,
            PolicyMode::Whitelist => CallPolicy::whitelist(self.rpc_module_list.clone()),
            PolicyMode::Blacklist => CallPolicy::blacklist(self.rpc_module_list.clone()),
        }
    }

    pub fn peer_addresses(&self) -> Vec<(Node, SocketAddr)> {
        self.remote_tcp_server_ports
            .iter()
            .map(|(name, addr)| (Node::from(name.clone()), *addr))
            .collect()
    }
}

fn default_control_port() -> u16 {
    37373
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Path to the configuration file.
    ///
    /// Example: nodecall --config /etc/nodecall/config.json5
    #[arg(long, short)]
    config: String,
}

impl Config {
    /// Loads config from the file named on the command line.
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();
        Ok(serde_json5::from_str(&read_to_string(&cli.config)?)?)
    }
}
