//! Broker connectivity maintenance
//!
//! The gate runs once per loop iteration while the network is up. It drives
//! the transport's housekeeping and reconnects when the link is down. It never
//! publishes; publishing happens from the sampling step via
//! [`publish_reading`].

use log::{debug, info, warn};

use super::broker::Broker;
use super::topics::{TopicSet, format_payload};
use crate::config::DeviceConfig;
use crate::sensors::SensorReading;

/// How often to retry a failed connect.
///
/// Under both policies the first attempt after a disconnect happens on the
/// iteration that observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Retry on every iteration, bounded only by the loop rate.
    #[default]
    EveryIteration,
    /// Capped exponential backoff between failed attempts.
    Backoff { initial_ms: u64, max_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Connected,
    /// A connect was attempted this iteration and failed.
    ConnectFailed,
    /// Waiting out the backoff; no attempt this iteration.
    Waiting,
}

#[derive(Debug)]
pub struct PublishGate {
    policy: ReconnectPolicy,
    connected: bool,
    next_attempt_ms: Option<u64>,
    backoff_ms: u64,
    attempts: u32,
}

impl PublishGate {
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            connected: false,
            next_attempt_ms: None,
            backoff_ms: initial_backoff(policy),
            attempts: 0,
        }
    }

    pub const fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Connect attempts made so far, successful or not.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn service<B: Broker>(
        &mut self,
        broker: &mut B,
        device: &DeviceConfig,
        client_id: &str,
        now_ms: u64,
    ) -> GateStatus {
        broker.service().await;

        if broker.is_connected() {
            if !self.connected {
                info!("mqtt: connected to {}:{}", device.broker_address, device.broker_port);
                self.mark_connected();
            }
            return GateStatus::Connected;
        }

        if self.connected {
            warn!("mqtt: connection to broker lost");
            self.connected = false;
            self.next_attempt_ms = None;
        }

        if self.next_attempt_ms.is_some_and(|at| now_ms < at) {
            return GateStatus::Waiting;
        }

        self.attempts = self.attempts.saturating_add(1);
        debug!(
            "mqtt: connecting to {}:{} as {} (attempt {})",
            device.broker_address, device.broker_port, client_id, self.attempts
        );

        match broker
            .connect(&device.broker_address, device.broker_port, client_id)
            .await
        {
            Ok(()) => {
                info!("mqtt: connected to {}:{}", device.broker_address, device.broker_port);
                self.mark_connected();
                GateStatus::Connected
            }
            Err(e) => {
                debug!("mqtt: connect failed: {:?}", e);
                self.schedule_retry(now_ms);
                GateStatus::ConnectFailed
            }
        }
    }

    fn mark_connected(&mut self) {
        self.connected = true;
        self.next_attempt_ms = None;
        self.backoff_ms = initial_backoff(self.policy);
    }

    fn schedule_retry(&mut self, now_ms: u64) {
        if let ReconnectPolicy::Backoff { max_ms, .. } = self.policy {
            self.next_attempt_ms = Some(now_ms.saturating_add(self.backoff_ms));
            self.backoff_ms = self.backoff_ms.saturating_mul(2).min(max_ms);
        }
    }
}

impl Default for PublishGate {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

const fn initial_backoff(policy: ReconnectPolicy) -> u64 {
    match policy {
        ReconnectPolicy::EveryIteration => 0,
        ReconnectPolicy::Backoff { initial_ms, .. } => initial_ms,
    }
}

/// Publish every value of `reading` to its topic, one message per value.
///
/// Failures are logged and dropped; the next sample is the retry. Returns the
/// number of values the transport accepted.
pub async fn publish_reading<B: Broker>(
    broker: &mut B,
    topics: &TopicSet,
    reading: &SensorReading,
) -> usize {
    let mut sent = 0;

    for (topic, value) in topics.pairs(reading) {
        let payload = match format_payload(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("mqtt: not publishing {} to {}: {}", value, topic, e);
                continue;
            }
        };
        match broker.publish(topic, payload.as_bytes()).await {
            Ok(()) => {
                debug!("mqtt: {} <- {}", topic, payload);
                sent += 1;
            }
            Err(e) => debug!("mqtt: publish to {} failed: {:?}", topic, e),
        }
    }

    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorVariant;
    use crate::testing::{MockBroker, block_on};

    fn device() -> DeviceConfig {
        DeviceConfig::default()
    }

    #[test]
    fn test_retries_every_iteration_until_connected() {
        let mut gate = PublishGate::default();
        let mut broker = MockBroker::failing_connects(3);
        let device = device();

        for now in 0..3 {
            assert_eq!(
                block_on(gate.service(&mut broker, &device, "TempSensor", now)),
                GateStatus::ConnectFailed
            );
        }
        assert_eq!(
            block_on(gate.service(&mut broker, &device, "TempSensor", 3)),
            GateStatus::Connected
        );
        assert_eq!(gate.attempts(), 4);
        assert_eq!(broker.connects.len(), 4);
        assert_eq!(broker.connects[0].0.as_str(), "192.168.0.1");
        assert_eq!(broker.connects[0].1, 1883);
        assert_eq!(broker.connects[0].2.as_str(), "TempSensor");

        // Connected: no further attempts.
        block_on(gate.service(&mut broker, &device, "TempSensor", 4));
        assert_eq!(gate.attempts(), 4);
        assert_eq!(broker.services, 5);
    }

    #[test]
    fn test_backoff_spaces_attempts() {
        let policy = ReconnectPolicy::Backoff {
            initial_ms: 100,
            max_ms: 300,
        };
        let mut gate = PublishGate::new(policy);
        let mut broker = MockBroker::failing_connects(u32::MAX);
        let device = device();

        let mut attempt_times = heapless::Vec::<u64, 16>::new();
        for now in (0..1_000).step_by(10) {
            let status = block_on(gate.service(&mut broker, &device, "id", now));
            if status == GateStatus::ConnectFailed {
                attempt_times.push(now).unwrap();
            }
        }

        // 0, +100, +200, then capped at +300.
        assert_eq!(attempt_times.as_slice(), &[0, 100, 300, 600, 900]);
    }

    #[test]
    fn test_first_attempt_after_drop_is_immediate() {
        let policy = ReconnectPolicy::Backoff {
            initial_ms: 1_000,
            max_ms: 8_000,
        };
        let mut gate = PublishGate::new(policy);
        let mut broker = MockBroker::failing_connects(1);
        let device = device();

        assert_eq!(
            block_on(gate.service(&mut broker, &device, "id", 0)),
            GateStatus::ConnectFailed
        );
        assert_eq!(
            block_on(gate.service(&mut broker, &device, "id", 1_000)),
            GateStatus::Connected
        );

        broker.drop_connection();
        broker.fail_next_connects = 0;
        assert_eq!(
            block_on(gate.service(&mut broker, &device, "id", 1_010)),
            GateStatus::Connected
        );
        assert_eq!(gate.attempts(), 3);
    }

    #[test]
    fn test_background_connect_is_picked_up_later() {
        let policy = ReconnectPolicy::Backoff {
            initial_ms: 2_000,
            max_ms: 30_000,
        };
        let mut gate = PublishGate::new(policy);
        let mut broker = MockBroker {
            connects_in_background: true,
            ..MockBroker::default()
        };
        let device = device();

        assert_eq!(
            block_on(gate.service(&mut broker, &device, "id", 0)),
            GateStatus::ConnectFailed
        );
        // Session came up before the backoff expired; no second attempt.
        assert_eq!(
            block_on(gate.service(&mut broker, &device, "id", 10)),
            GateStatus::Connected
        );
        assert_eq!(gate.attempts(), 1);
    }

    #[test]
    fn test_publish_reading_formats_each_value() {
        let mut broker = MockBroker::connected();
        let topics = TopicSet::new("sensor1", SensorVariant::Basic).unwrap();
        let reading = SensorReading {
            temperature: 22.5,
            humidity: 45.0,
            pressure: None,
            altitude: None,
        };

        assert_eq!(block_on(publish_reading(&mut broker, &topics, &reading)), 2);
        assert_eq!(broker.published(), &[
            ("/sensor1/temp", "22.50"),
            ("/sensor1/humidity", "45.00"),
        ]);
    }

    #[test]
    fn test_publish_failure_is_dropped() {
        let mut broker = MockBroker::connected();
        broker.reject_publishes = true;
        let topics = TopicSet::new("sensor1", SensorVariant::Basic).unwrap();
        let reading = SensorReading {
            temperature: 1.0,
            humidity: 2.0,
            pressure: None,
            altitude: None,
        };

        assert_eq!(block_on(publish_reading(&mut broker, &topics, &reading)), 0);
        assert!(broker.published().is_empty());
    }

    #[test]
    fn test_unencodable_value_is_skipped() {
        let mut broker = MockBroker::connected();
        let topics = TopicSet::new("sensor1", SensorVariant::Extended).unwrap();
        let reading = SensorReading {
            temperature: 21.0,
            humidity: 40.0,
            pressure: Some(f32::INFINITY),
            altitude: Some(12.5),
        };

        assert_eq!(block_on(publish_reading(&mut broker, &topics, &reading)), 3);
        assert_eq!(broker.published(), &[
            ("/sensor1/temp", "21.00"),
            ("/sensor1/humidity", "40.00"),
            ("/sensor1/altitude", "12.50"),
        ]);
    }
}
