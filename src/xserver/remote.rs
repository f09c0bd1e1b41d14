// Remote X server handle
//
// Represents a display that already runs on a peer (an XDMCP client calling
// back in). There is no child to supervise: starting the handle is
// immediately ready, stopping chains the base stop transition.

use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::display::{DisplayEvent, DisplayState, DisplayStateMachine};
use crate::xserver::authority::XAuthority;

pub struct RemoteXServer {
    hostname: String,
    display_number: u32,
    authority: Option<XAuthority>,
    machine: Mutex<DisplayStateMachine>,
}

impl RemoteXServer {
    pub fn new(hostname: &str, display_number: u32, authority: Option<XAuthority>) -> Self {
        Self {
            hostname: hostname.to_string(),
            display_number,
            authority,
            machine: Mutex::new(DisplayStateMachine::new()),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn display_number(&self) -> u32 {
        self.display_number
    }

    pub fn authority(&self) -> Option<&XAuthority> {
        self.authority.as_ref()
    }

    /// The X address of this server, `<hostname>:<n>`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.display_number)
    }

    pub fn state(&self) -> DisplayState {
        self.machine.lock().unwrap().state()
    }

    pub fn is_ready(&self) -> bool {
        self.machine.lock().unwrap().is_ready()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<DisplayEvent> {
        self.machine.lock().unwrap().subscribe()
    }

    /// The remote display already runs; readiness is immediate.
    pub fn start(&self) {
        let mut machine = self.machine.lock().unwrap();
        machine.set_launching();
        machine.mark_ready();
    }

    pub fn stop(&self) {
        self.machine.lock().unwrap().mark_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::RemoteXServer;
    use crate::display::DisplayEvent;

    #[test]
    fn start_is_immediately_ready() {
        let server = RemoteXServer::new("host.example", 3, None);
        let mut events = server.subscribe();
        assert_eq!(server.address(), "host.example:3");

        server.start();
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Ready);
        assert!(server.is_ready());

        server.stop();
        server.stop();
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Stopped);
        assert!(events.try_recv().is_err());
    }
}
