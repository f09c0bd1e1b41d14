// Base display-server state machine
//
// Local and remote X servers both chain their ready/stopped transitions
// through this object; observers (seat code, the daemon main loop) subscribe
// for typed events instead of hooking signals.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Lifecycle states of a display server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    /// No server process attached
    Idle,
    /// Started, waiting for the ready handshake
    Launching,
    /// Accepting connections
    Ready,
    /// Stop requested, waiting for the child to exit
    Stopping,
}

/// Events delivered to display-server observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The server is up and accepting connections
    Ready,
    /// The server is gone and its resources have been released
    Stopped,
}

#[derive(Debug)]
pub struct DisplayStateMachine {
    state: DisplayState,
    observers: Vec<UnboundedSender<DisplayEvent>>,
}

impl Default for DisplayStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayStateMachine {
    pub fn new() -> Self {
        Self {
            state: DisplayState::Idle,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == DisplayState::Ready
    }

    /// Subscribe to lifecycle events. Each subscriber gets every event.
    pub fn subscribe(&mut self) -> UnboundedReceiver<DisplayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Idle -> Launching. No event; readiness is only ever signalled by the
    /// child's handshake.
    pub fn set_launching(&mut self) {
        if self.state == DisplayState::Idle {
            self.state = DisplayState::Launching;
        }
    }

    /// A stop was requested but the child has not exited yet.
    pub fn set_stopping(&mut self) {
        if matches!(self.state, DisplayState::Launching | DisplayState::Ready) {
            self.state = DisplayState::Stopping;
        }
    }

    /// The ready handshake arrived: Launching -> Ready, notify once.
    pub fn mark_ready(&mut self) {
        if self.state == DisplayState::Launching {
            self.state = DisplayState::Ready;
            self.notify(DisplayEvent::Ready);
        }
    }

    /// The server is gone: any non-idle state -> Idle, notify once.
    pub fn mark_stopped(&mut self) {
        if self.state != DisplayState::Idle {
            self.state = DisplayState::Idle;
            self.notify(DisplayEvent::Stopped);
        }
    }

    fn notify(&mut self, event: DisplayEvent) {
        self.observers.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::{DisplayEvent, DisplayState, DisplayStateMachine};

    #[test]
    fn ready_fires_only_from_launching() {
        let mut machine = DisplayStateMachine::new();
        let mut events = machine.subscribe();

        machine.mark_ready();
        assert!(events.try_recv().is_err());

        machine.set_launching();
        machine.mark_ready();
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Ready);
        assert_eq!(machine.state(), DisplayState::Ready);

        machine.mark_ready();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn stopped_fires_at_most_once() {
        let mut machine = DisplayStateMachine::new();
        let mut events = machine.subscribe();

        machine.set_launching();
        machine.mark_ready();
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Ready);

        machine.set_stopping();
        machine.mark_stopped();
        machine.mark_stopped();
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Stopped);
        assert!(events.try_recv().is_err());
        assert_eq!(machine.state(), DisplayState::Idle);
    }

    #[test]
    fn stop_observes_start_ordering() {
        let mut machine = DisplayStateMachine::new();
        let mut events = machine.subscribe();

        machine.set_launching();
        machine.mark_ready();
        machine.mark_stopped();

        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Ready);
        assert_eq!(events.try_recv().unwrap(), DisplayEvent::Stopped);
    }
}
