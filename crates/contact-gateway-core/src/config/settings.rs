use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the listen port
const PORT_ENV: &str = "PORT";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Contact lookup gateway")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port for the HTTP server (overrides PORT and the config file)
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP server settings
    #[serde(default)]
    pub web: WebSettings,

    /// Provider session settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Lookup request settings
    #[serde(default)]
    pub lookup: LookupSettings,

    /// Collaborator bridge process settings
    #[serde(default)]
    pub bridge: BridgeSettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSettings {
    /// Address to bind
    #[serde(default = "default_web_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    3000
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

/// Provider session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Session identifier, used to key the credential directory
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Root directory holding persisted session credentials
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_client_id() -> String {
    "api-getcontact-session".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".wwebjs_auth")
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            data_dir: default_data_dir(),
        }
    }
}

/// Lookup request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupSettings {
    /// Region code used when a search omits `country`
    #[serde(default = "default_country")]
    pub default_country: String,
}

fn default_country() -> String {
    "ID".to_string()
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            default_country: default_country(),
        }
    }
}

/// Settings for the child process that drives the provider's web client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Program to spawn
    #[serde(default = "default_bridge_program")]
    pub program: String,

    /// Arguments passed to the program
    #[serde(default = "default_bridge_args")]
    pub args: Vec<String>,

    /// Run the automated browser headless
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Extra flags forwarded to the automated browser
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
}

fn default_bridge_program() -> String {
    "node".to_string()
}

fn default_bridge_args() -> Vec<String> {
    vec!["bridge.js".to_string()]
}

fn default_headless() -> bool {
    true
}

fn default_browser_args() -> Vec<String> {
    [
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-accelerated-2d-canvas",
        "--no-first-run",
        "--no-zygote",
        "--single-process",
        "--disable-gpu",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            program: default_bridge_program(),
            args: default_bridge_args(),
            headless: default_headless(),
            browser_args: default_browser_args(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return Self::read_file(p);
            }
            tracing::warn!("Config file not found: {}", p.display());
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("contact-gateway/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/contact-gateway/config.toml")),
            dirs::home_dir().map(|p| p.join(".contact-gateway.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::read_file(path);
            }
        }

        Ok(Self::default())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Apply environment overrides (`PORT`)
    pub fn merge_env(&mut self) {
        if let Ok(raw) = std::env::var(PORT_ENV) {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.web.port = port,
                Err(_) => tracing::warn!("Ignoring invalid {} value: {:?}", PORT_ENV, raw),
            }
        }
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(port) = cli.port {
            self.web.port = port;
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        let country = self.lookup.default_country.trim().to_ascii_uppercase();
        self.lookup.default_country = if country.is_empty() {
            default_country()
        } else {
            country
        };

        if self.session.client_id.trim().is_empty() {
            self.session.client_id = default_client_id();
        }
    }

    /// URL an operator opens to see the status page
    pub fn status_url(&self) -> String {
        format!("http://localhost:{}", self.web.port)
    }
}
