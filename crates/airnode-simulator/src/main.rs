//! Desktop simulator for the airnode sensor node.
//!
//! Runs the real `airnode_core::Node` loop on the host against simulated
//! hardware: a synthetic climate sensor, a broker that logs publishes, a
//! scripted Wi-Fi link and a console-driven button. The configuration portal
//! is served on <http://127.0.0.1:8080/>. Pass `--extended` to simulate the
//! pressure/altitude sensor variant.
//!
//! # Console commands
//!
//! | Command    | Action                                 |
//! |------------|----------------------------------------|
//! | `click`    | Short press of the button              |
//! | `long`     | Long press and release                 |
//! | `online`   | Bring the broker back                  |
//! | `offline`  | Take the broker away                   |
//! | `wifi-on`  | Restore the Wi-Fi link                 |
//! | `wifi-off` | Drop the Wi-Fi link                    |
//! | `fault`    | Make the next sensor read fail         |
//! | `quit`     | Exit                                   |

mod devices;
mod portal;

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use airnode_core::app_state::{SharedStatus, StatusSnapshot};
use airnode_core::button::ButtonEvent;
use airnode_core::config::{MemoryConfigStore, load_or_default};
use airnode_core::mqtt::ReconnectPolicy;
use airnode_core::sensors::SensorVariant;
use airnode_core::{Node, NodeParts, Step};
use embassy_futures::block_on;
use log::{info, warn};

use devices::{
    ConsoleButton, LoggingBroker, SimProvisioning, StdClock, Switches, SynthSensor,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const PORTAL_ADDR: &str = "127.0.0.1:8080";

/// Host-side pause between loop iterations.
const LOOP_PERIOD: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

fn spawn_console(switches: Switches, buttons: Sender<ButtonEvent>) {
    let spawned = thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "" => {}
                    "click" => {
                        let _ = buttons.send(ButtonEvent::Click);
                    }
                    "long" => {
                        let _ = buttons.send(ButtonEvent::LongPressStart);
                        let _ = buttons.send(ButtonEvent::LongPressReleased);
                    }
                    "online" => switches.broker_online.store(true, Ordering::Release),
                    "offline" => switches.broker_online.store(false, Ordering::Release),
                    "wifi-on" => switches.wifi_link.store(true, Ordering::Release),
                    "wifi-off" => switches.wifi_link.store(false, Ordering::Release),
                    "fault" => switches.sensor_fault.store(true, Ordering::Release),
                    "quit" => break,
                    other => warn!("unknown command '{}'", other),
                }
            }
            switches.quit.store(true, Ordering::Release);
        });

    if let Err(e) = spawned {
        warn!("console unavailable: {}", e);
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let variant = if std::env::args().any(|arg| arg == "--extended") {
        SensorVariant::Extended
    } else {
        SensorVariant::Basic
    };
    info!("airnode simulator starting ({:?} sensor)", variant);

    let switches = Switches::new();
    let (submissions_tx, submissions_rx) = mpsc::channel();
    let (buttons_tx, buttons_rx) = mpsc::channel();

    let status = Arc::new(SharedStatus::new(StatusSnapshot::default()));
    if let Err(e) = portal::spawn(PORTAL_ADDR, Arc::clone(&status), submissions_tx) {
        warn!("portal unavailable on {}: {}", PORTAL_ADDR, e);
    }
    spawn_console(switches.clone(), buttons_tx);

    let mut parts = NodeParts {
        provisioning: SimProvisioning::new(Arc::clone(&switches.wifi_link), submissions_rx),
        broker: LoggingBroker::new(Arc::clone(&switches.broker_online)),
        sensor: SynthSensor::new(variant, Arc::clone(&switches.sensor_fault)),
        button: ConsoleButton::new(buttons_rx),
        store: MemoryConfigStore::new(),
        clock: StdClock::new(),
        reconnect: ReconnectPolicy::EveryIteration,
    };

    // Each pass of this loop is one simulated boot.
    loop {
        let stored = load_or_default(&mut parts.store);
        parts.provisioning.reboot(&stored.system.thing_name);
        parts.broker.reboot();
        info!("boot: thing name '{}'", stored.system.thing_name);

        let mut node = Node::new(parts, &status);
        loop {
            if switches.quit.load(Ordering::Acquire) {
                info!("simulator exiting");
                return;
            }
            if block_on(node.iterate()) == Step::Restart {
                info!("restart requested, rebooting");
                break;
            }
            thread::sleep(LOOP_PERIOD);
        }
        parts = node.into_parts();
    }
}
