//! Wi-Fi station, configuration access point and the provisioning seam
//!
//! The radio always runs the access point so the portal stays reachable. When
//! station credentials are configured it runs in AP+STA mode and
//! [`wifi_task`] keeps the station associated, reporting every association to
//! the node as [`ProvisioningEvent::NetworkConnected`].

use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, Ordering};

use airnode_core::config::{SystemConfig, THING_NAME_LEN};
use airnode_core::provisioning::{Provisioning, ProvisioningEvent};
use embassy_net::{Ipv4Cidr, Stack, StaticConfigV4};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer, with_timeout};
use esp_radio::wifi::{
    AccessPointConfig, AuthMethod, ClientConfig, ModeConfig, WifiController, WifiDevice,
    WifiEvent,
};
use log::{error, info, warn};

/// Address of the device on its own access point network.
pub const AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
const AP_PREFIX_LEN: u8 = 24;
/// WPA2 needs at least this many characters; shorter passwords leave the AP open.
const MIN_WPA2_PASSWORD_LEN: usize = 8;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DHCP_TIMEOUT: Duration = Duration::from_secs(15);

/// True while the station is associated and has an address.
pub static NETWORK_UP: AtomicBool = AtomicBool::new(false);

/// Events for the node, from the Wi-Fi task and the web handlers.
pub static PROVISIONING_EVENTS: Channel<CriticalSectionRawMutex, ProvisioningEvent, 2> =
    Channel::new();

/// Static addressing for the access point interface; the device is the gateway.
pub fn ap_net_config() -> embassy_net::Config {
    embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(AP_ADDRESS, AP_PREFIX_LEN),
        gateway: Some(AP_ADDRESS),
        dns_servers: heapless::Vec::new(),
    })
}

/// Radio mode for the stored system settings.
///
/// `ap_ssid` names the access point; the thing name is the usual choice.
pub fn mode_config(system: &SystemConfig, ap_ssid: &str) -> ModeConfig {
    let mut ap = AccessPointConfig::default().with_ssid(ap_ssid.into());
    if system.ap_password.len() >= MIN_WPA2_PASSWORD_LEN {
        ap = ap
            .with_auth_method(AuthMethod::Wpa2Personal)
            .with_password(system.ap_password.as_str().into());
    } else if !system.ap_password.is_empty() {
        warn!(
            "wifi: AP password shorter than {} characters, access point is open",
            MIN_WPA2_PASSWORD_LEN
        );
    }

    if system.has_wifi_credentials() {
        let client = ClientConfig::default()
            .with_ssid(system.wifi_ssid.as_str().into())
            .with_password(system.wifi_password.as_str().into());
        ModeConfig::ApSta(client, ap)
    } else {
        ModeConfig::AccessPoint(ap)
    }
}

#[embassy_executor::task(pool_size = 2)]
pub async fn net_task(mut runner: embassy_net::Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Start the radio and keep the station associated.
///
/// `station` is `None` when no credentials are configured; the task then only
/// keeps the access point up.
#[embassy_executor::task]
pub async fn wifi_task(
    mut controller: WifiController<'static>,
    mode: ModeConfig,
    station: Option<Stack<'static>>,
) {
    if let Err(e) = controller.set_config(&mode) {
        error!("wifi: set_config failed: {:?}", e);
        return;
    }
    if let Err(e) = controller.start_async().await {
        error!("wifi: start failed: {:?}", e);
        return;
    }
    info!("wifi: access point up at {}", AP_ADDRESS);

    let Some(stack) = station else {
        info!("wifi: no station credentials, waiting for configuration");
        // The controller must stay alive for the access point to keep running.
        core::future::pending::<()>().await;
        return;
    };

    loop {
        if let Err(e) = controller.connect_async().await {
            warn!("wifi: connect failed: {:?}", e);
            Timer::after(RECONNECT_DELAY).await;
            continue;
        }

        if with_timeout(DHCP_TIMEOUT, stack.wait_config_up()).await.is_err() {
            warn!("wifi: no address within {} s", DHCP_TIMEOUT.as_secs());
            let _ = controller.disconnect_async().await;
            Timer::after(RECONNECT_DELAY).await;
            continue;
        }

        if let Some(config) = stack.config_v4() {
            info!("wifi: station up, address {}", config.address);
        }
        NETWORK_UP.store(true, Ordering::Release);
        PROVISIONING_EVENTS
            .send(ProvisioningEvent::NetworkConnected)
            .await;

        controller.wait_for_event(WifiEvent::StaDisconnected).await;
        NETWORK_UP.store(false, Ordering::Release);
        warn!("wifi: station disconnected, retrying");
        Timer::after(RECONNECT_DELAY).await;
    }
}

/// [`Provisioning`] backed by the Wi-Fi task and the portal handlers.
pub struct WifiProvisioning {
    thing_name: heapless::String<THING_NAME_LEN>,
}

impl WifiProvisioning {
    pub fn new(thing_name: heapless::String<THING_NAME_LEN>) -> Self {
        Self { thing_name }
    }
}

impl Provisioning for WifiProvisioning {
    fn is_connected(&self) -> bool {
        NETWORK_UP.load(Ordering::Acquire)
    }

    fn thing_name(&self) -> &str {
        &self.thing_name
    }

    async fn service(&mut self) {
        // Portal and association run in their own tasks; just let them in.
        embassy_futures::yield_now().await;
    }

    fn poll_event(&mut self) -> Option<ProvisioningEvent> {
        PROVISIONING_EVENTS.try_receive().ok()
    }
}
