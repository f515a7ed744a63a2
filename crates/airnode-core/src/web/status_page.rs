use alloc::string::String;
use core::fmt::Write;

use super::{PAGE_TAIL, open_page, push_escaped};
use crate::app_state::StatusSnapshot;
use crate::sensors::{SensorReading, SensorType};

/// Read-only status page: settings in effect and the last valid sample.
pub fn render_status_page(status: &StatusSnapshot) -> String {
    let device = &status.config.device;
    let mut out = String::with_capacity(1024);

    open_page(&mut out, "Status", &status.config.system.thing_name);

    out.push_str("<p>State: ");
    out.push_str(status.run_state().label());
    out.push_str("</p><h2>Settings</h2><ul><li>Broker address: ");
    push_escaped(&mut out, &device.broker_address);
    let _ = write!(
        out,
        "</li><li>Broker port: {}</li><li>Poll interval: {} s</li><li>Topic prefix: ",
        device.broker_port, device.poll_interval_secs
    );
    push_escaped(&mut out, &device.topic_prefix);
    out.push_str("</li></ul><h2>Last reading</h2><ul>");

    for quantity in [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Pressure,
        SensorType::Altitude,
    ] {
        let value = status.last_reading.as_ref().and_then(|r| r.value(quantity));
        if value.is_none() && optional_without_value(quantity, status.last_reading.as_ref()) {
            continue;
        }
        push_value(&mut out, quantity, value);
    }

    out.push_str("</ul><p>Go to <a href=\"config\">configure page</a> to change values.</p>");
    out.push_str(PAGE_TAIL);
    out
}

/// Pressure and altitude rows only appear once a reading carries them.
fn optional_without_value(quantity: SensorType, reading: Option<&SensorReading>) -> bool {
    matches!(quantity, SensorType::Pressure | SensorType::Altitude)
        && reading.is_none_or(|r| r.value(quantity).is_none())
}

fn push_value(out: &mut String, quantity: SensorType, value: Option<f32>) {
    let unit = match quantity {
        SensorType::Temperature => " &deg;C",
        SensorType::Humidity => " %",
        SensorType::Pressure => " Pa",
        SensorType::Altitude => " m",
    };

    let _ = write!(out, "<li>{}: ", quantity.label());
    match value {
        Some(v) => {
            let _ = write!(out, "{:.2}{}", v, unit);
        }
        None => out.push_str("n/a"),
    }
    out.push_str("</li>");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_before_first_reading() {
        let page = render_status_page(&StatusSnapshot::default());
        assert!(page.contains("<h1>TempSensor</h1>"));
        assert!(page.contains("Broker address: 192.168.0.1"));
        assert!(page.contains("Broker port: 1883"));
        assert!(page.contains("Poll interval: 1 s"));
        assert!(page.contains("Topic prefix: sensor1"));
        assert!(page.contains("<li>temperature: n/a</li>"));
        assert!(page.contains("<li>humidity: n/a</li>"));
        assert!(!page.contains("pressure"));
        assert!(page.contains("href=\"config\""));
        assert!(page.contains("waiting for network"));
    }

    #[test]
    fn test_with_reading() {
        let status = StatusSnapshot {
            last_reading: Some(SensorReading {
                temperature: 22.5,
                humidity: 45.0,
                pressure: Some(100_000.0),
                altitude: None,
            }),
            network_connected: true,
            broker_connected: true,
            ..StatusSnapshot::default()
        };
        let page = render_status_page(&status);
        assert!(page.contains("temperature: 22.50 &deg;C"));
        assert!(page.contains("humidity: 45.00 %"));
        assert!(page.contains("pressure: 100000.00 Pa"));
        assert!(!page.contains("altitude"));
        assert!(page.contains("State: publishing"));
    }

    #[test]
    fn test_user_strings_escaped() {
        let mut status = StatusSnapshot::default();
        status.config.device.topic_prefix = "<script>".try_into().unwrap();
        let page = render_status_page(&status);
        assert!(page.contains("Topic prefix: &lt;script&gt;"));
        assert!(!page.contains("<script>"));
    }
}
