//! Child process supervision
//!
//! One supervisor owns one subprocess: a scrubbed environment, a redirected
//! log file, and a supervision task that turns SIGUSR1 deliveries and the
//! child's exit into typed events on a channel. The X server signals
//! readiness by sending SIGUSR1 to a parent that had the signal ignored at
//! exec time, so the supervisor installs `SIG_IGN` between fork and exec.

use log::{debug, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// How the log file is opened on start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Append to an existing log
    Append,
    /// Rename an existing log to `<path>.old`, then truncate
    BackupAndTruncate,
}

/// Events observed on the supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The parent received a signal while the child was running
    GotSignal(i32),
    /// The child exited, for any reason
    Stopped,
}

/// Time between SIGTERM and SIGKILL when stopping a child.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct LogFile {
    path: PathBuf,
    capture_stdout: bool,
    mode: LogMode,
}

/// Handle for requesting termination without borrowing the supervisor.
#[derive(Debug, Clone)]
pub struct StopHandle {
    pid: Pid,
    exited: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request termination: SIGTERM now, SIGKILL after a grace period if the
    /// child has not exited. Idempotent; the supervision task fires `Stopped`
    /// when the child is actually gone.
    pub fn stop(&self) {
        if self.exited.load(Ordering::SeqCst) {
            return;
        }
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("Sending SIGTERM to process {}", self.pid);
        if let Err(e) = kill(self.pid, Signal::SIGTERM) {
            debug!("Failed to send SIGTERM to process {}: {}", self.pid, e);
            return;
        }

        let pid = self.pid;
        let exited = self.exited.clone();
        tokio::spawn(async move {
            tokio::time::sleep(STOP_GRACE_PERIOD).await;
            if !exited.load(Ordering::SeqCst) {
                warn!("Process {} did not terminate, sending SIGKILL", pid);
                let _ = kill(pid, Signal::SIGKILL);
            }
        });
    }
}

/// Supervisor for a single child process.
pub struct ChildSupervisor {
    command: Option<String>,
    env: Vec<(String, String)>,
    clear_environment: bool,
    log: Option<LogFile>,
    events_tx: UnboundedSender<ProcessEvent>,
    events_rx: Option<UnboundedReceiver<ProcessEvent>>,
    pid: Option<Pid>,
    exited: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl Default for ChildSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildSupervisor {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            command: None,
            env: Vec::new(),
            clear_environment: false,
            log: None,
            events_tx,
            events_rx: Some(events_rx),
            pid: None,
            exited: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Full command line, whitespace-separated.
    pub fn set_command(&mut self, command: &str) {
        self.command = Some(command.to_string());
    }

    pub fn set_env(&mut self, key: &str, value: &str) {
        self.env.push((key.to_string(), value.to_string()));
    }

    /// Environment variables that will be passed to the child.
    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// Scrub the inherited environment; only variables added with `set_env`
    /// cross into the child.
    pub fn set_clear_environment(&mut self, clear: bool) {
        self.clear_environment = clear;
    }

    /// Redirect the child's stderr (and stdout when `capture_stdout`) to a
    /// log file opened according to `mode`.
    pub fn set_log_file(&mut self, path: &Path, capture_stdout: bool, mode: LogMode) {
        self.log = Some(LogFile {
            path: path.to_path_buf(),
            capture_stdout,
            mode,
        });
    }

    /// The one receiver for this supervisor's events. `None` after the first
    /// call.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<ProcessEvent>> {
        self.events_rx.take()
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid.map(Pid::as_raw)
    }

    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.pid.map(|pid| StopHandle {
            pid,
            exited: self.exited.clone(),
            stop_requested: self.stop_requested.clone(),
        })
    }

    /// Spawn the child. With `detached` the process is fired and forgotten;
    /// otherwise a supervision task forwards `GotSignal`/`Stopped` events
    /// until the child exits.
    pub fn start(&mut self, detached: bool) -> io::Result<()> {
        let command_line = self
            .command
            .as_deref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no command configured"))?;
        let mut argv = command_line.split_whitespace();
        let binary = argv
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let mut cmd = Command::new(binary);
        cmd.args(argv);

        if self.clear_environment {
            cmd.env_clear();
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());

        if let Some(log) = &self.log {
            match open_log(log) {
                Ok(file) => {
                    if log.capture_stdout {
                        match file.try_clone() {
                            Ok(out) => {
                                cmd.stdout(Stdio::from(out));
                            }
                            Err(e) => warn!(
                                "Failed to duplicate log handle for {}: {}",
                                log.path.display(),
                                e
                            ),
                        }
                    }
                    cmd.stderr(Stdio::from(file));
                }
                Err(e) => warn!("Failed to open log file {}: {}", log.path.display(), e),
            }
        }

        unsafe {
            cmd.pre_exec(|| {
                // An X server sends SIGUSR1 to a parent that ignores it once
                // the display is up; the disposition survives exec.
                libc::signal(libc::SIGUSR1, libc::SIG_IGN);
                Ok(())
            });
        }

        if detached {
            cmd.spawn()?;
            return Ok(());
        }

        let mut child = cmd.spawn()?;
        self.pid = child.id().map(|id| Pid::from_raw(id as i32));

        let mut ready = signal(SignalKind::user_defined1())?;
        let events = self.events_tx.clone();
        let exited = self.exited.clone();
        tokio::spawn(async move {
            let mut signals_open = true;
            loop {
                tokio::select! {
                    _ = child.wait() => {
                        exited.store(true, Ordering::SeqCst);
                        let _ = events.send(ProcessEvent::Stopped);
                        break;
                    }
                    received = ready.recv(), if signals_open => {
                        match received {
                            Some(()) => {
                                let _ = events.send(ProcessEvent::GotSignal(libc::SIGUSR1));
                            }
                            None => signals_open = false,
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Request termination of the supervised child. No-op when nothing runs.
    pub fn stop(&self) {
        if let Some(handle) = self.stop_handle() {
            handle.stop();
        }
    }
}

fn open_log(log: &LogFile) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).write(true).mode(0o600);
    match log.mode {
        LogMode::BackupAndTruncate => {
            let mut backup = log.path.clone().into_os_string();
            backup.push(".old");
            let _ = std::fs::rename(&log.path, PathBuf::from(backup));
            options.truncate(true);
        }
        LogMode::Append => {
            options.append(true);
        }
    }
    options.open(&log.path)
}
