// X server command-line assembly
//
// The argument order is fixed so successive launches diff cleanly in the
// logs. TCP listening is version-gated: servers since 1.17 no longer listen
// by default and need an explicit `-listen tcp`; older ones listen unless
// told `-nolisten tcp`.

use pathsearch::find_executable_in_path;
use std::path::{Path, PathBuf};

use super::version::VersionProbe;

/// Resolve a configured command against PATH, preserving any arguments after
/// the binary verbatim. `None` when the binary cannot be found.
pub fn resolve_command(command: &str) -> Option<String> {
    let mut parts = command.splitn(2, char::is_whitespace);
    let binary = find_binary(parts.next()?)?;
    Some(match parts.next() {
        Some(rest) => format!("{} {}", binary.display(), rest),
        None => binary.display().to_string(),
    })
}

fn find_binary(binary: &str) -> Option<PathBuf> {
    if binary.is_empty() {
        return None;
    }
    if binary.contains('/') {
        let path = PathBuf::from(binary);
        return nix::unistd::access(&path, nix::unistd::AccessFlags::X_OK)
            .is_ok()
            .then_some(path);
    }
    find_executable_in_path(binary)
}

/// Configuration snapshot for one X server invocation.
#[derive(Debug)]
pub struct CommandSpec<'a> {
    pub display_number: u32,
    pub config_file: Option<&'a Path>,
    pub layout: Option<&'a str>,
    pub xdg_seat: Option<&'a str>,
    pub authority_file: Option<&'a Path>,
    pub xdmcp_server: Option<&'a str>,
    pub xdmcp_port: u16,
    pub xdmcp_key: Option<&'a str>,
    pub allow_tcp: bool,
    pub vt: i32,
    pub background: Option<&'a str>,
    pub extra_args: Option<&'a str>,
}

impl Default for CommandSpec<'_> {
    fn default() -> Self {
        Self {
            display_number: 0,
            config_file: None,
            layout: None,
            xdg_seat: None,
            authority_file: None,
            xdmcp_server: None,
            xdmcp_port: 0,
            xdmcp_key: None,
            allow_tcp: false,
            vt: -1,
            background: None,
            extra_args: None,
        }
    }
}

impl CommandSpec<'_> {
    /// Append the argument set to an already-resolved command.
    pub fn build(&self, absolute_command: &str, version: &VersionProbe) -> String {
        let mut command = format!("{} :{}", absolute_command, self.display_number);

        if let Some(config_file) = self.config_file {
            command.push_str(&format!(" -config {}", config_file.display()));
        }

        if let Some(layout) = self.layout {
            command.push_str(&format!(" -layout {}", layout));
        }

        if let Some(xdg_seat) = self.xdg_seat {
            command.push_str(&format!(" -seat {}", xdg_seat));
        }

        if let Some(authority_file) = self.authority_file {
            command.push_str(&format!(" -auth {}", authority_file.display()));
        }

        if let Some(xdmcp_server) = self.xdmcp_server {
            // Connect to a remote display manager; local TCP policy does not
            // apply.
            if self.xdmcp_port != 0 {
                command.push_str(&format!(" -port {}", self.xdmcp_port));
            }
            command.push_str(&format!(" -query {}", xdmcp_server));
            if let Some(xdmcp_key) = self.xdmcp_key {
                command.push_str(&format!(" -cookie {}", xdmcp_key));
            }
        } else if self.allow_tcp {
            if version.compare(1, 17) >= 0 {
                command.push_str(" -listen tcp");
            }
        } else {
            command.push_str(" -nolisten tcp");
        }

        if self.vt >= 0 {
            command.push_str(&format!(" vt{} -novtswitch", self.vt));
        }

        if let Some(background) = self.background {
            command.push_str(&format!(" -background {}", background));
        }

        if let Some(extra_args) = self.extra_args {
            command.push_str(&format!(" {}", extra_args));
        }

        command
    }
}
