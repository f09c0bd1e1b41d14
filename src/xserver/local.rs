// Local X server lifecycle
//
// Reserves a display number at construction, and on start writes the
// authority file, assembles the command line, scrubs the child environment
// down to the whitelist, and spawns the server. The SIGUSR1 handshake is the
// only evidence the display is up; every terminating path funnels through
// the one stopped handler so VT, display number, and authority file release
// exactly once.

use log::debug;
use std::env;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::context::Context;
use crate::display::{DisplayEvent, DisplayState, DisplayStateMachine};
use crate::process::{ChildSupervisor, LogMode, ProcessEvent, StopHandle};
use crate::xserver::authority::{AuthorityFile, XAuthority};
use crate::xserver::command::{self, CommandSpec};
use crate::xserver::{Result, XServerError};

/// Environment variables that may cross into the X server.
const ENV_WHITELIST: &[&str] = &["LD_PRELOAD", "LD_LIBRARY_PATH", "PATH", "LIGHTDM_TEST_ROOT"];

/// Per-server supervision knobs the daemon can override.
#[derive(Debug, Clone)]
pub struct ServerHooks {
    /// Extra arguments appended after the standard set.
    pub extra_args: Option<String>,
    /// Whether the child's stdout is captured into the log file.
    pub log_stdout: bool,
}

impl Default for ServerHooks {
    fn default() -> Self {
        Self {
            extra_args: None,
            log_stdout: true,
        }
    }
}

pub struct LocalXServer {
    ctx: Context,
    machine: DisplayStateMachine,
    hooks: ServerHooks,

    command: String,
    display_number: u32,
    config_file: Option<PathBuf>,
    layout: Option<String>,
    xdg_seat: Option<String>,
    allow_tcp: bool,
    background: Option<String>,

    vt: i32,
    have_vt_ref: bool,

    xdmcp_server: Option<String>,
    xdmcp_port: u16,
    xdmcp_key: Option<String>,

    authority: Option<XAuthority>,
    authority_file: AuthorityFile,

    got_signal: bool,
    process: Option<ChildSupervisor>,
    events: Option<UnboundedReceiver<ProcessEvent>>,
    resources_released: bool,
}

impl LocalXServer {
    /// Create a server on a freshly reserved display number.
    pub fn new(ctx: &Context) -> Self {
        Self::with_hooks(ctx, ServerHooks::default())
    }

    pub fn with_hooks(ctx: &Context, hooks: ServerHooks) -> Self {
        let display_number = ctx.display_numbers.reserve();
        Self {
            ctx: ctx.clone(),
            machine: DisplayStateMachine::new(),
            hooks,
            command: "X".to_string(),
            display_number,
            config_file: None,
            layout: None,
            xdg_seat: None,
            allow_tcp: false,
            background: None,
            vt: -1,
            have_vt_ref: false,
            xdmcp_server: None,
            xdmcp_port: 0,
            xdmcp_key: None,
            authority: None,
            authority_file: AuthorityFile::new(),
            got_signal: false,
            process: None,
            events: None,
            resources_released: false,
        }
    }

    pub fn display_number(&self) -> u32 {
        self.display_number
    }

    /// The X address of this server, `:<n>`.
    pub fn address(&self) -> String {
        format!(":{}", self.display_number)
    }

    pub fn state(&self) -> DisplayState {
        self.machine.state()
    }

    pub fn is_ready(&self) -> bool {
        self.machine.is_ready()
    }

    /// Subscribe to ready/stopped events.
    pub fn subscribe(&mut self) -> UnboundedReceiver<DisplayEvent> {
        self.machine.subscribe()
    }

    pub fn set_command(&mut self, command: &str) {
        self.command = command.to_string();
    }

    pub fn set_config_file(&mut self, path: &Path) {
        self.config_file = Some(path.to_path_buf());
    }

    pub fn set_layout(&mut self, layout: &str) {
        self.layout = Some(layout.to_string());
    }

    pub fn set_xdg_seat(&mut self, xdg_seat: &str) {
        self.xdg_seat = Some(xdg_seat.to_string());
    }

    pub fn set_allow_tcp(&mut self, allow_tcp: bool) {
        self.allow_tcp = allow_tcp;
    }

    pub fn set_background(&mut self, background: &str) {
        self.background = Some(background.to_string());
    }

    /// Move the server to a VT. Any previous reservation is dropped; VT 0 is
    /// emitted on the command line but never reserved.
    pub fn set_vt(&mut self, vt: i32) {
        if self.have_vt_ref {
            self.ctx.vts.release(self.vt);
        }
        self.have_vt_ref = false;
        self.vt = vt;
        if vt > 0 {
            self.ctx.vts.acquire(vt);
            self.have_vt_ref = true;
        }
    }

    pub fn vt(&self) -> i32 {
        self.vt
    }

    pub fn set_xdmcp_server(&mut self, hostname: &str) {
        self.xdmcp_server = Some(hostname.to_string());
    }

    pub fn xdmcp_server(&self) -> Option<&str> {
        self.xdmcp_server.as_deref()
    }

    pub fn set_xdmcp_port(&mut self, port: u16) {
        self.xdmcp_port = port;
    }

    pub fn xdmcp_port(&self) -> u16 {
        self.xdmcp_port
    }

    /// A remote display manager supplies the key; any locally generated
    /// authority no longer applies.
    pub fn set_xdmcp_key(&mut self, key: &str) {
        self.xdmcp_key = Some(key.to_string());
        self.authority = None;
    }

    pub fn set_authority(&mut self, authority: Option<XAuthority>) {
        self.authority = authority;
    }

    pub fn authority(&self) -> Option<&XAuthority> {
        self.authority.as_ref()
    }

    pub fn authority_file_path(&self) -> Option<&Path> {
        self.authority_file.path()
    }

    /// Launch the X server and wait for its ready signal. Returns as soon as
    /// the child is spawned; readiness arrives later as a `Ready` event.
    pub fn start(&mut self) -> Result<()> {
        if self.process.is_some() {
            return Err(XServerError::ConfigurationMissing("server already started"));
        }
        if self.command.trim().is_empty() {
            return Err(XServerError::ConfigurationMissing("no server command set"));
        }

        self.got_signal = false;
        self.machine.set_launching();

        let mut process = ChildSupervisor::new();
        process.set_clear_environment(true);
        self.events = process.take_events();

        let log_file = self
            .ctx
            .config
            .lightdm
            .log_directory
            .join(format!("x-{}.log", self.display_number));
        let mode = if self.ctx.config.lightdm.backup_logs {
            LogMode::BackupAndTruncate
        } else {
            LogMode::Append
        };
        process.set_log_file(&log_file, self.hooks.log_stdout, mode);
        debug!(
            "X server :{}: logging to {}",
            self.display_number,
            log_file.display()
        );

        let Some(absolute_command) = command::resolve_command(&self.command) else {
            debug!(
                "Can't launch X server {}, not found in path",
                self.command
            );
            self.stopped();
            return Err(XServerError::BinaryNotFound(self.command.clone()));
        };

        self.write_authority_file();

        let spec = CommandSpec {
            display_number: self.display_number,
            config_file: self.config_file.as_deref(),
            layout: self.layout.as_deref(),
            xdg_seat: self.xdg_seat.as_deref(),
            authority_file: self.authority_file.path(),
            xdmcp_server: self.xdmcp_server.as_deref(),
            xdmcp_port: self.xdmcp_port,
            xdmcp_key: self.xdmcp_key.as_deref(),
            allow_tcp: self.allow_tcp,
            vt: self.vt,
            background: self.background.as_deref(),
            extra_args: self.hooks.extra_args.as_deref(),
        };
        let command_line = spec.build(&absolute_command, &self.ctx.xorg_version);
        process.set_command(&command_line);

        debug!("X server :{}: launching", self.display_number);
        self.apply_environment(&mut process);

        if let Err(e) = process.start(false) {
            self.stopped();
            return Err(XServerError::SpawnFailed(e));
        }
        debug!(
            "Waiting for ready signal from X server :{}",
            self.display_number
        );
        self.process = Some(process);
        Ok(())
    }

    /// Request termination; the `Stopped` event follows once the child is
    /// gone. No-op on a server that is not running.
    pub fn stop(&mut self) {
        if let Some(process) = &self.process {
            self.machine.set_stopping();
            process.stop();
        }
    }

    /// Handle for stopping the server from outside its event pump.
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.process.as_ref().and_then(|p| p.stop_handle())
    }

    /// Drive the server until it stops: marshal supervisor events into
    /// display-server transitions.
    pub async fn run(&mut self) {
        loop {
            let event = match self.events.as_mut() {
                Some(events) => events.recv().await,
                None => return,
            };
            match event {
                Some(event) => {
                    if self.handle_process_event(event) {
                        return;
                    }
                }
                None => return,
            }
        }
    }

    /// Returns true when the server has stopped and the pump should end.
    fn handle_process_event(&mut self, event: ProcessEvent) -> bool {
        match event {
            ProcessEvent::GotSignal(signum) => {
                self.got_signal_cb(signum);
                false
            }
            ProcessEvent::Stopped => {
                self.stopped();
                true
            }
        }
    }

    fn got_signal_cb(&mut self, signum: i32) {
        if signum == libc::SIGUSR1 && !self.got_signal {
            self.got_signal = true;
            debug!("Got signal from X server :{}", self.display_number);
            self.machine.mark_ready();
        }
    }

    /// The one release point: VT reference, display number, and authority
    /// file all come back here, on every terminating path.
    fn stopped(&mut self) {
        debug!("X server :{} stopped", self.display_number);

        if self.have_vt_ref {
            self.ctx.vts.release(self.vt);
            self.have_vt_ref = false;
        }
        self.ctx.display_numbers.release(self.display_number);
        self.resources_released = true;

        self.authority_file.remove();

        self.process = None;
        self.events = None;
        self.machine.mark_stopped();
    }

    fn write_authority_file(&mut self) {
        let Some(authority) = &self.authority else {
            return;
        };
        let address = self.address();
        self.authority_file
            .write(authority, &self.ctx.config.lightdm.run_directory, &address);
    }

    /// Only whitelisted variables cross into the child. When nested inside
    /// another display, forward it along with an XAUTHORITY that defaults to
    /// `~/.Xauthority`.
    fn apply_environment(&self, process: &mut ChildSupervisor) {
        if let Ok(display) = env::var("DISPLAY") {
            process.set_env("DISPLAY", &display);
            match env::var("XAUTHORITY") {
                Ok(xauthority) => process.set_env("XAUTHORITY", &xauthority),
                Err(_) => {
                    if let Ok(home) = env::var("HOME") {
                        let path = Path::new(&home).join(".Xauthority");
                        process.set_env("XAUTHORITY", &path.to_string_lossy());
                    }
                }
            }
        }

        for key in ENV_WHITELIST {
            if let Ok(value) = env::var(key) {
                process.set_env(key, &value);
            }
        }
    }
}

impl Drop for LocalXServer {
    fn drop(&mut self) {
        // A server dropped before its stopped transition still owes its
        // reservations back.
        if !self.resources_released {
            if self.have_vt_ref {
                self.ctx.vts.release(self.vt);
            }
            self.ctx.display_numbers.release(self.display_number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalXServer, ServerHooks};
    use crate::config::Config;
    use crate::context::Context;
    use crate::display::{DisplayEvent, DisplayState};
    use crate::process::ProcessEvent;
    use crate::vt::VtRegistry;
    use crate::xserver::allocator::DisplayNumberAllocator;
    use crate::xserver::authority::XAuthority;
    use crate::xserver::version::VersionProbe;
    use crate::xserver::XServerError;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_context(minimum: u32) -> (Context, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.lightdm.minimum_display_number = minimum;
        config.lightdm.run_directory = dir.path().join("run");
        config.lightdm.log_directory = dir.path().join("log");
        let ctx = Context {
            config: Arc::new(config),
            display_numbers: Arc::new(DisplayNumberAllocator::with_lock_dir(
                minimum,
                dir.path().join("locks"),
            )),
            vts: Arc::new(VtRegistry::default()),
            xorg_version: Arc::new(VersionProbe::fixed(1, 20)),
        };
        (ctx, dir)
    }

    #[test]
    fn construction_reserves_a_display_number() {
        let (ctx, _dir) = test_context(50);
        let server = LocalXServer::new(&ctx);
        assert_eq!(server.display_number(), 50);
        assert_eq!(server.address(), ":50");
        assert_eq!(ctx.display_numbers.reserve(), 51);
    }

    #[test]
    fn dropping_an_unstarted_server_releases_its_number() {
        let (ctx, _dir) = test_context(0);
        {
            let _server = LocalXServer::new(&ctx);
        }
        assert_eq!(ctx.display_numbers.reserve(), 0);
    }

    #[test]
    fn setting_a_vt_moves_the_reservation() {
        let (ctx, _dir) = test_context(0);
        let mut server = LocalXServer::new(&ctx);
        server.set_vt(7);
        assert_eq!(ctx.vts.ref_count(7), 1);
        server.set_vt(8);
        assert_eq!(ctx.vts.ref_count(7), 0);
        assert_eq!(ctx.vts.ref_count(8), 1);
        server.set_vt(-1);
        assert_eq!(ctx.vts.ref_count(8), 0);
    }

    #[test]
    fn vt_zero_is_not_reserved() {
        let (ctx, _dir) = test_context(0);
        let mut server = LocalXServer::new(&ctx);
        server.set_vt(0);
        assert_eq!(ctx.vts.ref_count(0), 0);
        assert_eq!(server.vt(), 0);
    }

    #[test]
    fn xdmcp_key_clears_the_authority() {
        let (ctx, _dir) = test_context(0);
        let mut server = LocalXServer::new(&ctx);
        server.set_authority(Some(XAuthority::new_local_cookie("host", 0)));
        server.set_xdmcp_key("deadbeef");
        assert!(server.authority().is_none());
    }

    #[test]
    fn start_without_a_command_fails_without_events() {
        let (ctx, _dir) = test_context(0);
        let mut server = LocalXServer::new(&ctx);
        server.set_command("");
        let mut events = server.subscribe();
        assert!(matches!(
            server.start(),
            Err(XServerError::ConfigurationMissing(_))
        ));
        assert!(events.try_recv().is_err());
        assert_eq!(server.state(), DisplayState::Idle);
    }

    #[test]
    fn start_with_a_missing_binary_synthesises_stopped() {
        let (ctx, _dir) = test_context(0);
        let mut server = LocalXServer::new(&ctx);
        server.set_command("xseatd-no-such-binary");
        server.set_vt(7);
        let mut events = server.subscribe();

        assert!(matches!(
            server.start(),
            Err(XServerError::BinaryNotFound(_))
        ));
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Stopped);
        assert!(events.try_recv().is_err());
        assert_eq!(ctx.vts.ref_count(7), 0);
        assert_eq!(ctx.display_numbers.reserve(), 0);
    }

    #[test]
    fn ready_handshake_then_stop_releases_everything_once() {
        let (ctx, _dir) = test_context(0);
        let mut server = LocalXServer::new(&ctx);
        server.set_vt(7);
        server.set_authority(Some(XAuthority::new_local_cookie("host", 0)));
        let mut events = server.subscribe();

        // Drive the transitions the way a started supervisor would, without
        // spawning a real X server.
        server.machine.set_launching();
        server.write_authority_file();
        let authority_path = server.authority_file_path().unwrap().to_path_buf();
        assert!(authority_path.exists());

        server.handle_process_event(ProcessEvent::GotSignal(libc::SIGUSR1));
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Ready);
        assert!(events.try_recv().is_err());
        assert!(server.is_ready());

        // A second SIGUSR1 must not re-fire the ready transition.
        server.handle_process_event(ProcessEvent::GotSignal(libc::SIGUSR1));
        assert!(events.try_recv().is_err());

        assert!(server.handle_process_event(ProcessEvent::Stopped));
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Stopped);
        assert!(events.try_recv().is_err());

        assert_eq!(ctx.vts.ref_count(7), 0);
        assert_eq!(ctx.display_numbers.reserve(), 0);
        assert!(!authority_path.exists());
        assert!(server.authority_file_path().is_none());
    }

    #[test]
    fn early_exit_before_the_handshake_reports_no_ready() {
        let (ctx, _dir) = test_context(0);
        let mut server = LocalXServer::new(&ctx);
        let mut events = server.subscribe();

        server.machine.set_launching();
        server.handle_process_event(ProcessEvent::Stopped);

        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Stopped);
        assert!(!server.is_ready());
    }

    #[test]
    fn environment_whitelist_is_exact() {
        let (ctx, _dir) = test_context(0);
        let server = LocalXServer::new(&ctx);

        std::env::set_var("DISPLAY", ":9");
        std::env::remove_var("XAUTHORITY");
        std::env::set_var("HOME", "/home/test");
        std::env::set_var("XSEATD_SECRET", "do-not-forward");

        let mut process = crate::process::ChildSupervisor::new();
        server.apply_environment(&mut process);

        let vars = process.env_vars();
        let get = |key: &str| {
            vars.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("DISPLAY"), Some(":9"));
        assert_eq!(get("XAUTHORITY"), Some("/home/test/.Xauthority"));
        assert!(get("PATH").is_some());
        assert_eq!(get("XSEATD_SECRET"), None);
        for (key, _) in vars {
            assert!(
                ["DISPLAY", "XAUTHORITY", "LD_PRELOAD", "LD_LIBRARY_PATH", "PATH", "LIGHTDM_TEST_ROOT"]
                    .contains(&key.as_str()),
                "unexpected variable {}",
                key
            );
        }
    }

    #[test]
    fn hooks_append_extra_arguments() {
        let (ctx, _dir) = test_context(0);
        let hooks = ServerHooks {
            extra_args: Some("-core".to_string()),
            log_stdout: true,
        };
        let server = LocalXServer::with_hooks(&ctx, hooks);
        assert_eq!(server.hooks.extra_args.as_deref(), Some("-core"));
    }
}
