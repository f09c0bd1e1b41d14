//! xseatd - local X server supervision for graphical seats
//!
//! The core of a display-manager daemon: allocating display numbers against
//! the lock files of foreign X servers, materialising MIT-MAGIC-COOKIE
//! authority files, assembling version-gated X command lines, and supervising
//! the X server child through its SIGUSR1 ready handshake.

pub mod accounts;
pub mod args;
pub mod config;
pub mod context;
pub mod display;
pub mod process;
pub mod seat;
pub mod vt;
pub mod xserver;

// Re-exports
pub use config::Config;
pub use context::Context;
pub use display::DisplayEvent;
pub use xserver::local::LocalXServer;
pub use xserver::XServerError;
