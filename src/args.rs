use clap::Parser;
use std::path::PathBuf;

use crate::config::{self, Config};

#[derive(Parser, Debug)]
#[command(name = "xseatd")]
#[command(version)]
#[command(about = "Local X server supervision for graphical seats", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/xseatd.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,

    /// X server command (overrides [seat] command)
    #[arg(long)]
    pub command: Option<String>,

    /// Virtual terminal to run on
    #[arg(long)]
    pub vt: Option<i32>,

    /// Allow TCP connections to the X server
    #[arg(long, action)]
    pub allow_tcp: bool,

    /// Minimum display number to allocate from
    #[arg(long)]
    pub minimum_display_number: Option<u32>,

    /// XDMCP server to connect back to
    #[arg(long)]
    pub xdmcp_server: Option<String>,

    /// XDMCP port (0 for the protocol default)
    #[arg(long)]
    pub xdmcp_port: Option<u16>,

    /// XDMCP authentication key
    #[arg(long)]
    pub xdmcp_key: Option<String>,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }

    /// Fold command-line overrides into a loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(command) = &self.command {
            config.seat.command = command.clone();
        }
        if let Some(vt) = self.vt {
            config.seat.vt = vt;
        }
        if self.allow_tcp {
            config.seat.allow_tcp = true;
        }
        if let Some(minimum) = self.minimum_display_number {
            config.lightdm.minimum_display_number = minimum;
        }
        if let Some(server) = &self.xdmcp_server {
            config.xdmcp.server = Some(server.clone());
        }
        if let Some(port) = self.xdmcp_port {
            config.xdmcp.port = port;
        }
        if let Some(key) = &self.xdmcp_key {
            config.xdmcp.key = Some(key.clone());
        }
    }
}
