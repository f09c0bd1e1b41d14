//! Seat binding for remote XDMCP sessions
//!
//! An XDMCP seat services exactly one incoming session: the first request for
//! an "x" session binds a remote X server handle that lives as long as the
//! seat. XDMCP clients reconnect on logout, so later requests are refused
//! rather than spawning a second server.

use std::net::IpAddr;
use std::sync::Arc;

use crate::xserver::authority::XAuthority;
use crate::xserver::remote::RemoteXServer;

/// Session types a seat can be asked to host.
pub const SESSION_TYPE_X: &str = "x";

/// The handover from the XDMCP protocol layer: who called back, on which
/// display, with which authority.
#[derive(Debug, Clone)]
pub struct XdmcpSession {
    pub authority: XAuthority,
    pub address: IpAddr,
    pub display_number: u32,
}

pub struct XdmcpSeat {
    session: XdmcpSession,
    x_server: Option<Arc<RemoteXServer>>,
}

impl XdmcpSeat {
    pub fn new(session: XdmcpSession) -> Self {
        Self {
            session,
            x_server: None,
        }
    }

    pub fn session(&self) -> &XdmcpSession {
        &self.session
    }

    /// Provide the display server for a session request. Non-"x" sessions
    /// are not ours, and only the first "x" request yields a server: the one
    /// remote server is bound for the lifetime of this seat.
    pub fn create_display_server(&mut self, session_type: &str) -> Option<Arc<RemoteXServer>> {
        if session_type != SESSION_TYPE_X {
            return None;
        }

        if self.x_server.is_some() {
            return None;
        }

        let server = Arc::new(RemoteXServer::new(
            &self.session.address.to_string(),
            self.session.display_number,
            Some(self.session.authority.clone()),
        ));
        self.x_server = Some(server.clone());
        Some(server)
    }
}
