//! X server supervision
//!
//! Everything needed to put one X server on one seat: display number
//! allocation against foreign lock files, authority file handling, the
//! version-gated command line, and the local/remote server objects built on
//! the base display state machine.

pub mod allocator;
pub mod authority;
pub mod command;
pub mod local;
pub mod remote;
pub mod version;

use std::fmt;
use std::io;

/// Errors surfaced by a failed server start.
#[derive(Debug)]
pub enum XServerError {
    /// A start precondition is not satisfied; nothing was spawned and no
    /// event was emitted.
    ConfigurationMissing(&'static str),
    /// The configured command is not resolvable in PATH.
    BinaryNotFound(String),
    /// The child could not be spawned.
    SpawnFailed(io::Error),
}

impl fmt::Display for XServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XServerError::ConfigurationMissing(what) => {
                write!(f, "X server misconfigured: {}", what)
            }
            XServerError::BinaryNotFound(command) => {
                write!(f, "X server binary not found in PATH: {}", command)
            }
            XServerError::SpawnFailed(e) => write!(f, "Failed to spawn X server: {}", e),
        }
    }
}

impl std::error::Error for XServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XServerError::SpawnFailed(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, XServerError>;
