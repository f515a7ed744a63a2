//! The cooperative main loop
//!
//! [`Node`] owns every piece of runtime state (configuration, scheduler,
//! publish gate, restart controller, cached topics and the last reading) and
//! is the only writer of all of it. One call to [`Node::iterate`] is one loop
//! iteration:
//!
//! 1. restart if one is pending (nothing else runs)
//! 2. sample and publish when the scheduler fires
//! 3. drive provisioning and handle its events
//! 4. handle the button
//! 5. maintain the broker connection while the network is up

use log::{debug, error, info, warn};

use crate::app_state::{SharedStatus, StatusSnapshot};
use crate::button::{ButtonEvent, ButtonInput};
use crate::clock::Clock;
use crate::config::{ConfigStore, PersistedConfig, load_or_default};
use crate::mqtt::{Broker, PublishGate, ReconnectPolicy, TopicSet, publish_reading};
use crate::provisioning::{Provisioning, ProvisioningEvent};
use crate::reset::{FACTORY_RESET_SETTLE_MS, LongPressOutcome, LoopState, RESTART_DELAY_MS};
use crate::sampling::SampleScheduler;
use crate::sensors::{ClimateSensor, SensorReader, SensorReading};

/// What the embedding should do after an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Restart the device. The node must not be iterated again.
    Restart,
}

/// Collaborators handed to [`Node::new`] and returned by [`Node::into_parts`].
pub struct NodeParts<P, B, S, K, C, T> {
    pub provisioning: P,
    pub broker: B,
    pub sensor: S,
    pub button: K,
    pub store: C,
    pub clock: T,
    pub reconnect: ReconnectPolicy,
}

pub struct Node<'a, P, B, S, K, C, T> {
    provisioning: P,
    broker: B,
    reader: SensorReader<S>,
    button: K,
    store: C,
    clock: T,
    config: PersistedConfig,
    scheduler: SampleScheduler,
    gate: PublishGate,
    loop_state: LoopState,
    topics: Option<TopicSet>,
    snapshot: StatusSnapshot,
    snapshot_dirty: bool,
    status: &'a SharedStatus,
}

impl<'a, P, B, S, K, C, T> Node<'a, P, B, S, K, C, T>
where
    P: Provisioning,
    B: Broker,
    S: ClimateSensor,
    K: ButtonInput,
    C: ConfigStore,
    T: Clock,
{
    /// Load the configuration and latch the sampling interval.
    pub fn new(parts: NodeParts<P, B, S, K, C, T>, status: &'a SharedStatus) -> Self {
        let NodeParts {
            provisioning,
            broker,
            sensor,
            button,
            mut store,
            clock,
            reconnect,
        } = parts;

        let config = load_or_default(&mut store);
        let scheduler = SampleScheduler::every(config.device.poll_interval_ms(), clock.now_ms());
        info!(
            "node: sampling every {} s, broker {}:{}, prefix {}",
            config.device.poll_interval_secs,
            config.device.broker_address,
            config.device.broker_port,
            config.device.topic_prefix
        );

        let snapshot = StatusSnapshot {
            config: config.clone(),
            ..StatusSnapshot::default()
        };
        status.publish(&snapshot);

        Self {
            provisioning,
            broker,
            reader: SensorReader::new(sensor),
            button,
            store,
            clock,
            config,
            scheduler,
            gate: PublishGate::new(reconnect),
            loop_state: LoopState::new(),
            topics: None,
            snapshot,
            snapshot_dirty: false,
            status,
        }
    }

    pub async fn iterate(&mut self) -> Step {
        if self.loop_state.needs_restart() {
            info!("node: restarting in {} ms", RESTART_DELAY_MS);
            self.refresh_status();
            self.clock.delay_ms(RESTART_DELAY_MS).await;
            return Step::Restart;
        }

        if self.scheduler.poll(self.clock.now_ms()) {
            self.sample().await;
        }

        self.provisioning.service().await;
        while let Some(event) = self.provisioning.poll_event() {
            self.handle_provisioning_event(event);
        }

        if let Some(event) = self.button.poll(self.clock.now_ms()) {
            self.handle_button(event).await;
        }

        if self.provisioning.is_connected() {
            self.gate
                .service(
                    &mut self.broker,
                    &self.config.device,
                    self.provisioning.thing_name(),
                    self.clock.now_ms(),
                )
                .await;
        }

        self.refresh_status();
        Step::Continue
    }

    async fn sample(&mut self) {
        if !self.provisioning.is_connected() {
            debug!("node: network down, skipping sample");
            return;
        }

        let reading = match self.reader.read().await {
            Ok(reading) => reading,
            Err(e) => {
                info!("sensor: reading discarded: {}", e);
                return;
            }
        };
        self.snapshot.last_reading = Some(reading);
        self.snapshot_dirty = true;

        match &self.topics {
            Some(topics) if self.broker.is_connected() => {
                publish_reading(&mut self.broker, topics, &reading).await;
            }
            _ => debug!("node: broker not ready, reading not published"),
        }
    }

    fn handle_provisioning_event(&mut self, event: ProvisioningEvent) {
        match event {
            ProvisioningEvent::NetworkConnected => {
                match TopicSet::new(&self.config.device.topic_prefix, self.reader.variant()) {
                    Ok(topics) => {
                        info!(
                            "node: network connected, publishing under /{}/",
                            self.config.device.topic_prefix
                        );
                        self.topics = Some(topics);
                    }
                    Err(e) => {
                        error!("node: cannot build topics: {}", e);
                        self.topics = None;
                    }
                }
            }
            ProvisioningEvent::ConfigSubmitted(config) => match self.store.save(&config) {
                Ok(()) => {
                    info!("node: configuration saved, restart required");
                    self.loop_state.on_config_saved();
                }
                Err(e) => error!("node: failed to save configuration: {:?}", e),
            },
        }
    }

    async fn handle_button(&mut self, event: ButtonEvent) {
        match event {
            ButtonEvent::Click => debug!("button: click"),
            ButtonEvent::LongPressStart => debug!("button: long press"),
            ButtonEvent::LongPressReleased => match self.loop_state.register_long_press() {
                LongPressOutcome::ConfirmationRequested => {
                    warn!("button: long press again to reset the configuration to defaults");
                }
                LongPressOutcome::FactoryReset => {
                    warn!("button: resetting configuration to defaults");
                    if let Err(e) = self.store.save(&PersistedConfig::default()) {
                        error!("node: failed to save default configuration: {:?}", e);
                    }
                    self.loop_state.request_restart();
                    self.clock.delay_ms(FACTORY_RESET_SETTLE_MS).await;
                }
            },
        }
    }

    /// Push a fresh snapshot to the web layer when anything it shows changed.
    fn refresh_status(&mut self) {
        let network = self.provisioning.is_connected();
        let broker = network && self.broker.is_connected();
        let restart = self.loop_state.needs_restart();

        let changed = self.snapshot.network_connected != network
            || self.snapshot.broker_connected != broker
            || self.snapshot.restart_pending != restart
            || self.snapshot_dirty;

        if changed {
            self.snapshot.network_connected = network;
            self.snapshot.broker_connected = broker;
            self.snapshot.restart_pending = restart;
            self.snapshot_dirty = false;
            self.status.publish(&self.snapshot);
        }
    }

    pub fn config(&self) -> &PersistedConfig {
        &self.config
    }

    pub fn loop_state(&self) -> &LoopState {
        &self.loop_state
    }

    pub fn topics(&self) -> Option<&TopicSet> {
        self.topics.as_ref()
    }

    pub fn last_reading(&self) -> Option<&SensorReading> {
        self.snapshot.last_reading.as_ref()
    }

    pub fn scheduler(&self) -> &SampleScheduler {
        &self.scheduler
    }

    pub fn gate(&self) -> &PublishGate {
        &self.gate
    }

    pub fn provisioning_mut(&mut self) -> &mut P {
        &mut self.provisioning
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        self.reader.sensor_mut()
    }

    pub fn button_mut(&mut self) -> &mut K {
        &mut self.button
    }

    pub fn store_mut(&mut self) -> &mut C {
        &mut self.store
    }

    pub fn clock_mut(&mut self) -> &mut T {
        &mut self.clock
    }

    /// Tear the node down and hand back its collaborators, as a restart does.
    pub fn into_parts(self) -> NodeParts<P, B, S, K, C, T> {
        NodeParts {
            provisioning: self.provisioning,
            broker: self.broker,
            sensor: self.reader.into_inner(),
            button: self.button,
            store: self.store,
            clock: self.clock,
            reconnect: self.gate.policy(),
        }
    }
}
