//! Network association and configuration portal seam
//!
//! The provisioning collaborator owns Wi-Fi association, the access-point
//! fallback, the captive portal and the web server. The node only asks whether
//! the network is up, drives pending work, and drains the events it reports.

use crate::config::PersistedConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningEvent {
    /// The station associated and has an address. Fired once per association.
    NetworkConnected,
    /// The operator submitted a validated configuration through the portal.
    ConfigSubmitted(PersistedConfig),
}

pub trait Provisioning {
    fn is_connected(&self) -> bool;

    /// Device identity, used as the broker client identifier.
    fn thing_name(&self) -> &str;

    /// Drive pending provisioning work. Must return promptly.
    fn service(&mut self) -> impl Future<Output = ()>;

    /// Next pending event, oldest first.
    fn poll_event(&mut self) -> Option<ProvisioningEvent>;
}
