//! Server settings: an optional JSON file, overridden by command-line flags.

use crate::error::ServerError;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One admitted player of the local hosting authority.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RosterEntry {
    pub session_id: String,
    pub name: String,
    /// Falls back to the default rating.
    #[serde(default)]
    pub rating: Option<i32>,
}

/// All settings of one server process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface the game port binds to.
    pub host: String,
    /// The game port clients connect to.
    pub port: u16,
    /// Address of the admin HTTP surface, disabled if absent.
    pub admin_addr: Option<String>,
    /// File the game results are appended to. Results are only logged if absent.
    pub results_path: Option<PathBuf>,
    /// Directory of the `<port>.state` file, not written if absent.
    pub state_dir: Option<PathBuf>,
    /// Directory of the per-process log file, console only if absent.
    pub log_dir: Option<PathBuf>,
    /// Rating of players the roster does not rate.
    pub default_rating: i32,
    /// Start the game session right away instead of waiting for the authority.
    pub auto_start: bool,
    /// Admitted players. Empty admits every session id.
    pub roster: Vec<RosterEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".into(),
            port: 4000,
            admin_addr: None,
            results_path: None,
            state_dir: Some(PathBuf::from("/tmp")),
            log_dir: None,
            default_rating: 1000,
            auto_start: true,
            roster: Vec::new(),
        }
    }
}

/// Command-line flags. Values given here override the config file.
#[derive(Parser, Debug, Default)]
#[command(name = "gomoku-server", about = "Two player gomoku session server")]
pub struct CliArgs {
    /// Path to a JSON config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen port for client access.
    #[arg(long)]
    pub port: Option<u16>,

    /// Interface to bind the listen port to.
    #[arg(long)]
    pub host: Option<String>,

    /// Address of the admin HTTP surface (e.g. 127.0.0.1:4001).
    #[arg(long)]
    pub admin_addr: Option<String>,

    /// File the game results are appended to as JSON lines.
    #[arg(long)]
    pub results_path: Option<PathBuf>,

    /// Directory for the session state file.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Directory for the log file.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Rating of players without a configured rating.
    #[arg(long)]
    pub default_rating: Option<i32>,

    /// Wait for a start request on the admin surface instead of starting right away.
    #[arg(long)]
    pub no_auto_start: bool,
}

impl ServerConfig {
    /// Loads the config file named on the command line, if any, and applies the flags.
    pub fn load(args: &CliArgs) -> Result<ServerConfig, ServerError> {
        let mut config = match &args.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        config.apply_cli_overrides(args);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<ServerConfig, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ServerError::ConfigParse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(ref host) = args.host {
            self.host = host.clone();
        }
        if let Some(ref addr) = args.admin_addr {
            self.admin_addr = Some(addr.clone());
        }
        if let Some(ref path) = args.results_path {
            self.results_path = Some(path.clone());
        }
        if let Some(ref dir) = args.state_dir {
            self.state_dir = Some(dir.clone());
        }
        if let Some(ref dir) = args.log_dir {
            self.log_dir = Some(dir.clone());
        }
        if let Some(rating) = args.default_rating {
            self.default_rating = rating;
        }
        if args.no_auto_start {
            self.auto_start = false;
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `<state_dir>/<port>.state`
    pub fn state_file(&self) -> Option<PathBuf> {
        self.state_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.state", self.port)))
    }
}
