//! Configuration management for xseatd

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Core daemon configuration
    pub lightdm: CoreConfig,

    /// Seat defaults for locally spawned X servers
    pub seat: SeatConfig,

    /// XDMCP client configuration
    pub xdmcp: XdmcpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CoreConfig {
    /// Floor for display number allocation
    pub minimum_display_number: u32,

    /// Root for the authority file tree
    pub run_directory: PathBuf,

    /// Destination for per-display X server logs
    pub log_directory: PathBuf,

    /// Rotate an existing log to `.old` instead of appending
    pub backup_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SeatConfig {
    /// Command to run the X server
    pub command: String,

    /// Path passed as `-config`
    pub config_file: Option<PathBuf>,

    /// Server layout passed as `-layout`
    pub layout: Option<String>,

    /// Seat name passed as `-seat`
    pub xdg_seat: Option<String>,

    /// Whether the X server accepts TCP connections
    pub allow_tcp: bool,

    /// Virtual terminal to run on, -1 for unset
    pub vt: i32,

    /// Background passed as `-background`
    pub background: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct XdmcpConfig {
    /// XDMCP server to connect back to
    pub server: Option<String>,

    /// XDMCP port, 0 for the protocol default
    pub port: u16,

    /// Hex key for XDM-AUTHENTICATION-1
    pub key: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            minimum_display_number: 0,
            run_directory: PathBuf::from("/run/xseatd"),
            log_directory: PathBuf::from("/var/log/xseatd"),
            backup_logs: true,
        }
    }
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self {
            command: "X".to_string(),
            config_file: None,
            layout: None,
            xdg_seat: None,
            allow_tcp: false,
            vt: -1,
            background: None,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.seat.command.trim().is_empty() {
            return Err("Seat command must not be empty".into());
        }

        if self.seat.vt < -1 {
            return Err("Seat vt must be -1 (unset) or a VT index".into());
        }

        if self.xdmcp.key.is_some() && self.xdmcp.server.is_none() {
            return Err("XDMCP key is set but no XDMCP server is configured".into());
        }

        Ok(())
    }
}
