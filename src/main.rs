//! xseatd - Main entry point
//!
//! Brings up one local X server for the primary seat and supervises it:
//! reserve a display number, write the authority cookie, launch the server,
//! wait for its ready handshake, and tear everything down on exit.

use clap::Parser;
use log::{error, info, warn};
use tokio::signal;
use tokio::signal::unix::SignalKind;

use xseatd::args::Args;
use xseatd::xserver::authority::XAuthority;
use xseatd::{Config, Context, DisplayEvent, LocalXServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::init_from_env(
        env_logger::Env::default()
            .filter_or("XSEATD_LOG", if args.verbose { "debug" } else { "info" }),
    );

    info!("xseatd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match args.load_config() {
        Ok(cfg) => {
            info!("Loaded configuration from {:?}", args.config);
            cfg
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };
    args.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }

    for dir in [&config.lightdm.run_directory, &config.lightdm.log_directory] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create {}: {}", dir.display(), e);
        }
    }

    let ctx = Context::new(config);

    let mut server = LocalXServer::new(&ctx);
    server.set_command(&ctx.config.seat.command);
    if let Some(config_file) = &ctx.config.seat.config_file {
        server.set_config_file(config_file);
    }
    if let Some(layout) = &ctx.config.seat.layout {
        server.set_layout(layout);
    }
    if let Some(xdg_seat) = &ctx.config.seat.xdg_seat {
        server.set_xdg_seat(xdg_seat);
    }
    server.set_allow_tcp(ctx.config.seat.allow_tcp);
    if let Some(background) = &ctx.config.seat.background {
        server.set_background(background);
    }
    server.set_vt(ctx.config.seat.vt);

    if let Some(xdmcp_server) = &ctx.config.xdmcp.server {
        server.set_xdmcp_server(xdmcp_server);
        server.set_xdmcp_port(ctx.config.xdmcp.port);
        if let Some(key) = &ctx.config.xdmcp.key {
            server.set_xdmcp_key(key);
        }
    } else {
        let hostname = nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        server.set_authority(Some(XAuthority::new_local_cookie(
            &hostname,
            server.display_number(),
        )));
    }

    let display_number = server.display_number();
    let mut events = server.subscribe();

    server.start()?;
    info!("X server :{} launching", display_number);

    let stop = server.stop_handle();
    let pump = tokio::spawn(async move {
        server.run().await;
    });

    let mut sigterm = signal::unix::signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted, stopping X server :{}", display_number);
                if let Some(stop) = &stop {
                    stop.stop();
                }
            }
            _ = sigterm.recv() => {
                info!("Terminated, stopping X server :{}", display_number);
                if let Some(stop) = &stop {
                    stop.stop();
                }
            }
            event = events.recv() => match event {
                Some(DisplayEvent::Ready) => {
                    info!("X server :{} is ready", display_number);
                }
                Some(DisplayEvent::Stopped) | None => break,
            }
        }
    }

    let _ = pump.await;
    info!("xseatd stopped");

    Ok(())
}
