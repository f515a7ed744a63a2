#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use airnode_core::app_state::StatusSnapshot;
use airnode_core::button::{ButtonConfig, DebouncedButton};
use airnode_core::config::load_or_default;
use airnode_core::mqtt::ReconnectPolicy;
use airnode_core::{Node, NodeParts, Step};
use airnode_firmware::app_state::init_status;
use airnode_firmware::clock::EmbassyClock;
use airnode_firmware::mqtt::{MQTT_LINK, MqttProxy, mqtt_task};
use airnode_firmware::network::{
    AP_ADDRESS, WifiProvisioning, ap_net_config, mode_config, net_task, wifi_task,
};
use airnode_firmware::portal::{dhcp_task, dns_task, http_task};
#[cfg(feature = "sensor-bme280")]
use airnode_firmware::sensor::Bme280Climate;
#[cfg(feature = "sensor-sht40")]
use airnode_firmware::sensor::Sht40Climate;
use airnode_firmware::storage::{FixedTime, SdConfigStore};
use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::{Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::rng::Rng;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use log::info;
use static_cell::StaticCell;

/// Pause between loop iterations so the network tasks get to run.
const LOOP_PERIOD: Duration = Duration::from_millis(10);

/// Broker reconnects back off instead of hammering an absent broker.
const RECONNECT: ReconnectPolicy = ReconnectPolicy::Backoff {
    initial_ms: 2_000,
    max_ms: 30_000,
};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // Configuration lives on the SD card.
    let spi_bus = Spi::new(
        peripherals.SPI2,
        SpiConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("Failed to configure SPI2")
    .with_sck(peripherals.GPIO36)
    .with_mosi(peripherals.GPIO37)
    .with_miso(peripherals.GPIO35);
    let sd_cs = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());
    let sd_spi = ExclusiveDevice::new_no_delay(spi_bus, sd_cs).expect("SD card chip select");
    let sd_card = embedded_sdmmc::SdCard::new(sd_spi, embassy_time::Delay);
    let mut store = SdConfigStore::new(sd_card, FixedTime);

    let stored = load_or_default(&mut store);
    let status = init_status(StatusSnapshot {
        config: stored.clone(),
        ..StatusSnapshot::default()
    });

    // Wi-Fi: the access point always, the station when credentials exist.
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());

    static AP_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (ap_stack, ap_runner) = embassy_net::new(
        interfaces.ap,
        ap_net_config(),
        AP_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(ap_runner).expect("net task"));
    spawner.spawn(dhcp_task(ap_stack, AP_ADDRESS).expect("dhcp task"));
    spawner.spawn(dns_task(ap_stack, AP_ADDRESS).expect("dns task"));
    spawner.spawn(http_task(ap_stack, status).expect("http task"));

    let station = if stored.system.has_wifi_credentials() {
        static STA_RESOURCES: StaticCell<StackResources<5>> = StaticCell::new();
        let (sta_stack, sta_runner) = embassy_net::new(
            interfaces.sta,
            embassy_net::Config::dhcpv4(Default::default()),
            STA_RESOURCES.init(StackResources::new()),
            seed.rotate_left(32),
        );
        spawner.spawn(net_task(sta_runner).expect("net task"));
        spawner.spawn(http_task(sta_stack, status).expect("http task"));
        spawner.spawn(mqtt_task(sta_stack, &MQTT_LINK).expect("mqtt task"));
        Some(sta_stack)
    } else {
        None
    };

    let ap_ssid = option_env!("AIRNODE_AP_SSID").unwrap_or(stored.system.thing_name.as_str());
    info!("Access point SSID: {}", ap_ssid);
    spawner.spawn(
        wifi_task(wifi_controller, mode_config(&stored.system, ap_ssid), station)
            .expect("wifi task"),
    );

    // Sensor on I2C0.
    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("Failed to configure I2C0")
    .with_sda(peripherals.GPIO12)
    .with_scl(peripherals.GPIO11)
    .into_async();

    #[cfg(feature = "sensor-sht40")]
    let sensor = Sht40Climate::new(i2c);
    #[cfg(feature = "sensor-bme280")]
    let sensor = Bme280Climate::new(i2c)
        .await
        .expect("Failed to initialize BME280");

    // BOOT button, active low.
    let boot = Input::new(
        peripherals.GPIO0,
        InputConfig::default().with_pull(Pull::Up),
    );
    let button = DebouncedButton::new(boot, ButtonConfig::default());

    let parts = NodeParts {
        provisioning: WifiProvisioning::new(stored.system.thing_name.clone()),
        broker: MqttProxy::new(&MQTT_LINK),
        sensor,
        button,
        store,
        clock: EmbassyClock,
        reconnect: RECONNECT,
    };
    let mut node = Node::new(parts, status);

    info!("Node running");

    loop {
        if node.iterate().await == Step::Restart {
            info!("Restarting");
            esp_hal::system::software_reset();
        }
        Timer::after(LOOP_PERIOD).await;
    }
}
