//! Mock collaborators for host tests

use alloc::collections::VecDeque;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

pub use embassy_futures::block_on;

use crate::button::{ButtonEvent, ButtonInput};
use crate::clock::Clock;
use crate::config::PersistedConfig;
use crate::mqtt::Broker;
use crate::provisioning::{Provisioning, ProvisioningEvent};
use crate::sensors::{ClimateSensor, SensorError, SensorVariant};

pub struct MockSensor {
    pub variant: SensorVariant,
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: Result<f32, SensorError>,
    pub altitude: Result<f32, SensorError>,
    /// Every mandatory read fails with this error when set.
    pub fail_with: Option<SensorError>,
    pub reads: usize,
    pub optional_reads: usize,
}

impl MockSensor {
    pub fn basic(temperature: f32, humidity: f32) -> Self {
        Self {
            variant: SensorVariant::Basic,
            temperature,
            humidity,
            pressure: Err(SensorError::Unsupported),
            altitude: Err(SensorError::Unsupported),
            fail_with: None,
            reads: 0,
            optional_reads: 0,
        }
    }

    pub fn extended(temperature: f32, humidity: f32, pressure: f32, altitude: f32) -> Self {
        Self {
            variant: SensorVariant::Extended,
            pressure: Ok(pressure),
            altitude: Ok(altitude),
            ..Self::basic(temperature, humidity)
        }
    }

    fn mandatory(&mut self, value: f32) -> Result<f32, SensorError> {
        self.reads += 1;
        match self.fail_with {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }
}

impl ClimateSensor for MockSensor {
    fn variant(&self) -> SensorVariant {
        self.variant
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.mandatory(self.temperature)
    }

    async fn read_humidity(&mut self) -> Result<f32, SensorError> {
        self.mandatory(self.humidity)
    }

    async fn read_pressure(&mut self) -> Result<f32, SensorError> {
        self.optional_reads += 1;
        self.pressure
    }

    async fn read_altitude(&mut self) -> Result<f32, SensorError> {
        self.optional_reads += 1;
        self.altitude
    }
}

#[derive(Debug, Default)]
pub struct MockBroker {
    pub connected: bool,
    pub fail_next_connects: u32,
    pub reject_publishes: bool,
    /// Connects return an error but the session comes up on the next
    /// `service`, like a transport that connects in the background.
    pub connects_in_background: bool,
    /// `(host, port, client_id)` of every connect attempt.
    pub connects: Vec<(String, u16, String)>,
    pub publishes: Vec<(String, String)>,
    pub services: usize,
    pub background_connect: bool,
}

impl MockBroker {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    /// Disconnected; the next `n` connect attempts are refused.
    pub fn failing_connects(n: u32) -> Self {
        Self {
            fail_next_connects: n,
            ..Self::default()
        }
    }

    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    pub fn published(&self) -> Vec<(&str, &str)> {
        self.publishes
            .iter()
            .map(|(t, p)| (t.as_str(), p.as_str()))
            .collect()
    }
}

impl Broker for MockBroker {
    type Error = &'static str;

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        client_id: &str,
    ) -> Result<(), &'static str> {
        self.connects.push((host.to_string(), port, client_id.to_string()));
        if self.fail_next_connects > 0 {
            self.fail_next_connects -= 1;
            return Err("connection refused");
        }
        if self.connects_in_background {
            self.background_connect = true;
            return Err("connection in progress");
        }
        self.connected = true;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), &'static str> {
        if !self.connected {
            return Err("not connected");
        }
        if self.reject_publishes {
            return Err("publish rejected");
        }
        let payload = core::str::from_utf8(payload).map_err(|_| "payload not utf-8")?;
        self.publishes.push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    async fn service(&mut self) {
        self.services += 1;
        if core::mem::take(&mut self.background_connect) {
            self.connected = true;
        }
    }
}

pub struct MockProvisioning {
    pub connected: bool,
    pub thing_name: String,
    pub events: VecDeque<ProvisioningEvent>,
    pub services: usize,
}

impl MockProvisioning {
    pub fn new(thing_name: &str) -> Self {
        Self {
            connected: false,
            thing_name: thing_name.to_string(),
            events: VecDeque::new(),
            services: 0,
        }
    }

    pub fn associate(&mut self) {
        self.connected = true;
        self.events.push_back(ProvisioningEvent::NetworkConnected);
    }

    pub fn submit(&mut self, config: PersistedConfig) {
        self.events
            .push_back(ProvisioningEvent::ConfigSubmitted(config));
    }
}

impl Provisioning for MockProvisioning {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn thing_name(&self) -> &str {
        &self.thing_name
    }

    async fn service(&mut self) {
        self.services += 1;
    }

    fn poll_event(&mut self) -> Option<ProvisioningEvent> {
        self.events.pop_front()
    }
}

#[derive(Debug, Default)]
pub struct MockButton {
    pub events: VecDeque<ButtonEvent>,
}

impl ButtonInput for MockButton {
    fn poll(&mut self, _now_ms: u64) -> Option<ButtonEvent> {
        self.events.pop_front()
    }
}

/// Time only moves when a test sets it or something delays.
#[derive(Debug, Default)]
pub struct ManualClock {
    pub now: u64,
    pub delays: Vec<u64>,
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    async fn delay_ms(&mut self, ms: u64) {
        self.delays.push(ms);
        self.now += ms;
    }
}
