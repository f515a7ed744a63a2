//! Simulated collaborators for the core loop

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use airnode_core::button::{ButtonEvent, ButtonInput};
use airnode_core::clock::Clock;
use airnode_core::mqtt::Broker;
use airnode_core::provisioning::{Provisioning, ProvisioningEvent};
use airnode_core::sensors::{
    ClimateSensor, SEA_LEVEL_PRESSURE_PA, SensorError, SensorVariant, altitude_from_pressure,
};
use log::{info, warn};
use thiserror_no_std::Error;

/// Time from boot until the simulated station associates.
const ASSOCIATION_DELAY: Duration = Duration::from_secs(2);

/// Switches flipped from the console while the loop runs.
#[derive(Debug, Clone)]
pub struct Switches {
    pub wifi_link: Arc<AtomicBool>,
    pub broker_online: Arc<AtomicBool>,
    /// Makes the next sensor read fail, once.
    pub sensor_fault: Arc<AtomicBool>,
    pub quit: Arc<AtomicBool>,
}

impl Switches {
    pub fn new() -> Self {
        Self {
            wifi_link: Arc::new(AtomicBool::new(true)),
            broker_online: Arc::new(AtomicBool::new(true)),
            sensor_fault: Arc::new(AtomicBool::new(false)),
            quit: Arc::new(AtomicBool::new(false)),
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Milliseconds since the simulator started; survives simulated restarts.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    start: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn delay_ms(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

// ---------------------------------------------------------------------------
// Sensor
// ---------------------------------------------------------------------------

/// Synthetic readings that drift slowly over time.
pub struct SynthSensor {
    variant: SensorVariant,
    start: Instant,
    fault: Arc<AtomicBool>,
}

impl SynthSensor {
    pub fn new(variant: SensorVariant, fault: Arc<AtomicBool>) -> Self {
        Self {
            variant,
            start: Instant::now(),
            fault,
        }
    }

    fn t(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn pressure_pa(&self) -> f32 {
        let t = self.t();
        (100_800.0 + 250.0 * (t / 240.0).sin()) as f32
    }
}

impl ClimateSensor for SynthSensor {
    fn variant(&self) -> SensorVariant {
        self.variant
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        if self.fault.swap(false, Ordering::AcqRel) {
            // What a failed conversion looks like on the wire.
            return Ok(f32::NAN);
        }
        let t = self.t();
        Ok((22.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos()) as f32)
    }

    async fn read_humidity(&mut self) -> Result<f32, SensorError> {
        let t = self.t();
        Ok((50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos()) as f32)
    }

    async fn read_pressure(&mut self) -> Result<f32, SensorError> {
        match self.variant {
            SensorVariant::Extended => Ok(self.pressure_pa()),
            SensorVariant::Basic => Err(SensorError::Unsupported),
        }
    }

    async fn read_altitude(&mut self) -> Result<f32, SensorError> {
        match self.variant {
            SensorVariant::Extended => Ok(altitude_from_pressure(
                self.pressure_pa(),
                SEA_LEVEL_PRESSURE_PA,
            )),
            SensorVariant::Basic => Err(SensorError::Unsupported),
        }
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimBrokerError {
    #[error("broker is offline")]
    Offline,
    #[error("not connected")]
    NotConnected,
}

/// Log-only broker. Publishes are printed; the console can take it offline.
pub struct LoggingBroker {
    online: Arc<AtomicBool>,
    connected: bool,
}

impl LoggingBroker {
    pub fn new(online: Arc<AtomicBool>) -> Self {
        Self {
            online,
            connected: false,
        }
    }

    /// Sessions do not survive a restart.
    pub fn reboot(&mut self) {
        self.connected = false;
    }
}

impl Broker for LoggingBroker {
    type Error = SimBrokerError;

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        client_id: &str,
    ) -> Result<(), SimBrokerError> {
        if !self.online.load(Ordering::Acquire) {
            return Err(SimBrokerError::Offline);
        }
        info!("mqtt(LOG): session to {}:{} as '{}'", host, port, client_id);
        self.connected = true;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SimBrokerError> {
        if !self.connected {
            return Err(SimBrokerError::NotConnected);
        }
        info!(
            "mqtt(LOG): {} = {}",
            topic,
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }

    async fn service(&mut self) {
        if self.connected && !self.online.load(Ordering::Acquire) {
            warn!("mqtt(LOG): broker went away");
            self.connected = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

/// Scripted station: associates shortly after boot while the link switch is
/// on, and forwards configurations submitted through the portal.
pub struct SimProvisioning {
    thing_name: String,
    link: Arc<AtomicBool>,
    submissions: Receiver<ProvisioningEvent>,
    booted_at: Instant,
    connected: bool,
    pending: VecDeque<ProvisioningEvent>,
}

impl SimProvisioning {
    pub fn new(link: Arc<AtomicBool>, submissions: Receiver<ProvisioningEvent>) -> Self {
        Self {
            thing_name: String::new(),
            link,
            submissions,
            booted_at: Instant::now(),
            connected: false,
            pending: VecDeque::new(),
        }
    }

    /// Start over as a freshly booted device named `thing_name`.
    pub fn reboot(&mut self, thing_name: &str) {
        self.thing_name = thing_name.to_owned();
        self.booted_at = Instant::now();
        self.connected = false;
        self.pending.clear();
    }
}

impl Provisioning for SimProvisioning {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn thing_name(&self) -> &str {
        &self.thing_name
    }

    async fn service(&mut self) {
        let link = self.link.load(Ordering::Acquire);
        if self.connected && !link {
            warn!("wifi(SIM): station disconnected");
            self.connected = false;
        } else if !self.connected && link && self.booted_at.elapsed() >= ASSOCIATION_DELAY {
            info!("wifi(SIM): station associated");
            self.connected = true;
            self.pending.push_back(ProvisioningEvent::NetworkConnected);
        }
    }

    fn poll_event(&mut self) -> Option<ProvisioningEvent> {
        self.pending
            .pop_front()
            .or_else(|| self.submissions.try_recv().ok())
    }
}

// ---------------------------------------------------------------------------
// Button
// ---------------------------------------------------------------------------

/// Button events typed on the console.
pub struct ConsoleButton {
    events: Receiver<ButtonEvent>,
}

impl ConsoleButton {
    pub fn new(events: Receiver<ButtonEvent>) -> Self {
        Self { events }
    }
}

impl ButtonInput for ConsoleButton {
    fn poll(&mut self, _now_ms: u64) -> Option<ButtonEvent> {
        self.events.try_recv().ok()
    }
}
