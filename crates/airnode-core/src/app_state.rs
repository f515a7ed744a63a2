//! Node run state and the status snapshot shared with the web layer

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::config::PersistedConfig;
use crate::sensors::SensorReading;

/// Coarse lifecycle of the node, derived from the collaborators each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRunState {
    #[default]
    WaitingForNetwork,
    BrokerConnecting,
    Publishing,
    RestartPending,
}

impl NodeRunState {
    pub const fn derive(network: bool, broker: bool, restart_pending: bool) -> Self {
        match (restart_pending, network, broker) {
            (true, _, _) => Self::RestartPending,
            (false, false, _) => Self::WaitingForNetwork,
            (false, true, false) => Self::BrokerConnecting,
            (false, true, true) => Self::Publishing,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::WaitingForNetwork => "waiting for network",
            Self::BrokerConnecting => "connecting to broker",
            Self::Publishing => "publishing",
            Self::RestartPending => "restart pending",
        }
    }
}

/// Copy of everything the status page shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusSnapshot {
    /// Configuration the node is running with, not any pending submission.
    pub config: PersistedConfig,
    /// Last valid reading; `None` until the first one.
    pub last_reading: Option<SensorReading>,
    pub network_connected: bool,
    pub broker_connected: bool,
    pub restart_pending: bool,
}

impl StatusSnapshot {
    pub const fn run_state(&self) -> NodeRunState {
        NodeRunState::derive(
            self.network_connected,
            self.broker_connected,
            self.restart_pending,
        )
    }
}

/// Status written by the node and read by web handlers on other tasks.
///
/// Readers always get a copy; the node is the only writer.
pub struct SharedStatus {
    inner: Mutex<CriticalSectionRawMutex, RefCell<StatusSnapshot>>,
}

impl SharedStatus {
    pub fn new(initial: StatusSnapshot) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(initial)),
        }
    }

    pub fn publish(&self, snapshot: &StatusSnapshot) {
        self.inner.lock(|cell| cell.borrow_mut().clone_from(snapshot));
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.lock(|cell| cell.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_priority() {
        assert_eq!(
            NodeRunState::derive(true, true, true),
            NodeRunState::RestartPending
        );
        assert_eq!(
            NodeRunState::derive(false, true, false),
            NodeRunState::WaitingForNetwork
        );
        assert_eq!(
            NodeRunState::derive(true, false, false),
            NodeRunState::BrokerConnecting
        );
        assert_eq!(
            NodeRunState::derive(true, true, false),
            NodeRunState::Publishing
        );
    }

    #[test]
    fn test_shared_status_returns_copies() {
        let shared = SharedStatus::new(StatusSnapshot::default());
        let mut snapshot = shared.snapshot();
        assert_eq!(snapshot.run_state(), NodeRunState::WaitingForNetwork);

        snapshot.network_connected = true;
        // Not visible until published.
        assert!(!shared.snapshot().network_connected);

        shared.publish(&snapshot);
        assert!(shared.snapshot().network_connected);
    }
}
