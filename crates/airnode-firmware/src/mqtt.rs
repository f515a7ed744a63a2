//! MQTT over the station interface
//!
//! rust-mqtt's client borrows its socket and buffers, so it lives inside
//! [`mqtt_task`] for the whole session. The node talks to it through
//! [`MqttProxy`], which implements [`Broker`] on top of the statics in
//! [`MqttLink`]: connect requests are a signal, publishes go through a small
//! outbox channel and the session state is a pair of atomic flags.
//!
//! Connecting never waits on the network. [`MqttProxy::connect`] hands the
//! request to the task and returns; the node sees the session through
//! [`Broker::is_connected`] on a later iteration.

use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, Ordering};

use airnode_core::config::{STRING_LEN, THING_NAME_LEN};
use airnode_core::mqtt::Broker;
use airnode_core::mqtt::topics::{PAYLOAD_LEN, TOPIC_LEN};
use embassy_futures::select::{Either, select};
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, with_timeout};
use log::{debug, info, warn};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;
use thiserror_no_std::Error;

const KEEP_ALIVE_SECS: u16 = 60;
/// Bound on TCP connect and session setup for one attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOX_DEPTH: usize = 4;
const SOCKET_BUFFER_LEN: usize = 1024;
const MQTT_BUFFER_LEN: usize = 512;

#[derive(Error, Debug)]
pub enum MqttError {
    #[error("not connected to the broker")]
    NotConnected,
    #[error("session setup in progress")]
    Pending,
    #[error("broker did not answer in time")]
    Timeout,
    #[error("could not resolve the broker address")]
    Resolve,
    #[error("TCP connection to the broker failed")]
    Tcp,
    #[error("broker refused the session: {0:?}")]
    Refused(ReasonCode),
    #[error("publish queue is full")]
    QueueFull,
    #[error("topic, payload or client id too long")]
    TooLong,
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub host: heapless::String<STRING_LEN>,
    pub port: u16,
    pub client_id: heapless::String<THING_NAME_LEN>,
}

#[derive(Debug, Clone)]
pub struct Outgoing {
    pub topic: heapless::String<TOPIC_LEN>,
    pub payload: heapless::Vec<u8, PAYLOAD_LEN>,
}

/// Everything the proxy and the session task share.
pub struct MqttLink {
    connected: AtomicBool,
    /// Set from request until the session task settles the attempt.
    connecting: AtomicBool,
    requests: Signal<CriticalSectionRawMutex, ConnectRequest>,
    outbox: Channel<CriticalSectionRawMutex, Outgoing, OUTBOX_DEPTH>,
}

impl MqttLink {
    pub const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            requests: Signal::new(),
            outbox: Channel::new(),
        }
    }
}

impl Default for MqttLink {
    fn default() -> Self {
        Self::new()
    }
}

pub static MQTT_LINK: MqttLink = MqttLink::new();

/// The node's handle on the broker session.
pub struct MqttProxy {
    link: &'static MqttLink,
}

impl MqttProxy {
    pub const fn new(link: &'static MqttLink) -> Self {
        Self { link }
    }
}

impl Broker for MqttProxy {
    type Error = MqttError;

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::Acquire)
    }

    /// Start a session attempt and return without waiting for it.
    ///
    /// Always `Err(Pending)` unless already connected; the outcome shows up
    /// in [`Broker::is_connected`].
    async fn connect(&mut self, host: &str, port: u16, client_id: &str) -> Result<(), MqttError> {
        if self.is_connected() {
            return Ok(());
        }
        if self.link.connecting.load(Ordering::Acquire) {
            return Err(MqttError::Pending);
        }

        let request = ConnectRequest {
            host: host.try_into().map_err(|_| MqttError::TooLong)?,
            port,
            client_id: client_id.try_into().map_err(|_| MqttError::TooLong)?,
        };
        self.link.connecting.store(true, Ordering::Release);
        self.link.requests.signal(request);
        Err(MqttError::Pending)
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        let message = Outgoing {
            topic: topic.try_into().map_err(|_| MqttError::TooLong)?,
            payload: heapless::Vec::from_slice(payload).map_err(|_| MqttError::TooLong)?,
        };
        self.link
            .outbox
            .try_send(message)
            .map_err(|_| MqttError::QueueFull)
    }

    async fn service(&mut self) {
        // The session task keeps the connection alive on its own.
    }
}

/// Runs broker sessions on the station stack, one at a time, on request.
#[embassy_executor::task]
pub async fn mqtt_task(stack: Stack<'static>, link: &'static MqttLink) {
    let mut socket_rx = [0u8; SOCKET_BUFFER_LEN];
    let mut socket_tx = [0u8; SOCKET_BUFFER_LEN];
    let mut mqtt_rx = [0u8; MQTT_BUFFER_LEN];
    let mut mqtt_tx = [0u8; MQTT_BUFFER_LEN];

    loop {
        let request = link.requests.wait().await;
        debug!("mqtt: connecting to {}:{}", request.host, request.port);

        let address = match resolve(stack, &request.host).await {
            Ok(address) => address,
            Err(e) => {
                settle_failed(link, e);
                continue;
            }
        };

        let mut socket = TcpSocket::new(stack, &mut socket_rx, &mut socket_tx);
        socket.set_timeout(Some(Duration::from_secs(u64::from(KEEP_ALIVE_SECS) * 2)));
        match with_timeout(CONNECT_TIMEOUT, socket.connect((address, request.port))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("mqtt: TCP connect failed: {:?}", e);
                settle_failed(link, MqttError::Tcp);
                continue;
            }
            Err(_) => {
                settle_failed(link, MqttError::Timeout);
                continue;
            }
        }

        let mut config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20000));
        config.add_client_id(&request.client_id);
        config.keep_alive = KEEP_ALIVE_SECS;
        config.max_packet_size = MQTT_BUFFER_LEN as u32;

        let mut client = MqttClient::<_, 5, _>::new(
            socket,
            &mut mqtt_tx,
            MQTT_BUFFER_LEN,
            &mut mqtt_rx,
            MQTT_BUFFER_LEN,
            config,
        );

        match with_timeout(CONNECT_TIMEOUT, client.connect_to_broker()).await {
            Ok(Ok(())) => {}
            Ok(Err(code)) => {
                settle_failed(link, MqttError::Refused(code));
                continue;
            }
            Err(_) => {
                settle_failed(link, MqttError::Timeout);
                continue;
            }
        }

        link.connected.store(true, Ordering::Release);
        link.connecting.store(false, Ordering::Release);
        info!("mqtt: session open as {}", request.client_id);

        let reason = serve(&mut client, link).await;
        link.connected.store(false, Ordering::Release);
        warn!("mqtt: session closed: {:?}", reason);

        // Messages queued for the dead session are stale by the next one.
        link.outbox.clear();
    }
}

/// End a session attempt that never came up; the node retries on its schedule.
fn settle_failed(link: &MqttLink, error: MqttError) {
    debug!("mqtt: session attempt failed: {}", error);
    link.connecting.store(false, Ordering::Release);
}

/// Forward queued messages and keep the session alive until it fails.
async fn serve(
    client: &mut MqttClient<'_, TcpSocket<'_>, 5, CountingRng>,
    link: &MqttLink,
) -> ReasonCode {
    let ping_every = Duration::from_secs(u64::from(KEEP_ALIVE_SECS / 2));

    loop {
        let result = match select(link.outbox.receive(), Timer::after(ping_every)).await {
            Either::First(message) => client
                .send_message(
                    &message.topic,
                    &message.payload,
                    QualityOfService::QoS0,
                    false,
                )
                .await
                .or_else(|code| match code {
                    ReasonCode::NoMatchingSubscribers => Ok(()),
                    code => Err(code),
                }),
            Either::Second(()) => client.send_ping().await,
        };

        if let Err(code) = result {
            return code;
        }
    }
}

async fn resolve(stack: Stack<'static>, host: &str) -> Result<IpAddress, MqttError> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(IpAddress::Ipv4(ip));
    }

    match stack.dns_query(host, DnsQueryType::A).await {
        Ok(addresses) => addresses.first().copied().ok_or(MqttError::Resolve),
        Err(e) => {
            debug!("mqtt: DNS lookup of {} failed: {:?}", host, e);
            Err(MqttError::Resolve)
        }
    }
}
