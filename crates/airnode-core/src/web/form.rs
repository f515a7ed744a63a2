//! Configuration form rendering and `application/x-www-form-urlencoded` parsing

use alloc::string::String;
use core::fmt::Write;

use thiserror_no_std::Error;

use super::{PAGE_TAIL, open_page, push_escaped};
use crate::config::{
    BROKER_PORT_RANGE, ConfigError, POLL_INTERVAL_RANGE, PASSWORD_LEN, PersistedConfig, SSID_LEN,
    STRING_LEN, THING_NAME_LEN, fields,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("malformed form encoding")]
    Malformed,
    #[error("{0}")]
    Field(ConfigError),
}

impl From<ConfigError> for FormError {
    fn from(e: ConfigError) -> Self {
        Self::Field(e)
    }
}

/// Apply a submitted form body on top of `current` and return the result.
///
/// Every field present is validated; the first invalid field rejects the
/// whole submission and `current` is left as it was.
pub fn apply_form(current: &PersistedConfig, body: &str) -> Result<PersistedConfig, FormError> {
    let mut config = current.clone();

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = url_decode(raw_name)?;
        let value = url_decode(raw_value)?;
        config.apply_field(&name, value.trim())?;
    }

    config.validate()?;
    Ok(config)
}

/// Decode one urlencoded component: `+` is a space, `%XX` a byte.
pub fn url_decode(input: &str) -> Result<String, FormError> {
    let bytes = input.as_bytes();
    let mut out = alloc::vec::Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).ok_or(FormError::Malformed)?;
                if !hex.iter().all(u8::is_ascii_hexdigit) {
                    return Err(FormError::Malformed);
                }
                let hex = core::str::from_utf8(hex).map_err(|_| FormError::Malformed)?;
                out.push(u8::from_str_radix(hex, 16).map_err(|_| FormError::Malformed)?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8(out).map_err(|_| FormError::Malformed)
}

/// The configuration form, pre-filled with `config`. Passwords are never
/// echoed; leaving them empty keeps the stored value.
pub fn render_config_form(config: &PersistedConfig) -> String {
    let system = &config.system;
    let device = &config.device;
    let mut out = String::with_capacity(2048);

    open_page(&mut out, "Configuration", &system.thing_name);
    out.push_str("<form action=\"config\" method=\"post\"><fieldset><legend>System</legend>");
    text_input(&mut out, "Thing name", fields::THING_NAME, &system.thing_name, THING_NAME_LEN);
    password_input(&mut out, "AP password", fields::AP_PASSWORD, PASSWORD_LEN);
    text_input(&mut out, "Wi-Fi SSID", fields::WIFI_SSID, &system.wifi_ssid, SSID_LEN);
    password_input(&mut out, "Wi-Fi password", fields::WIFI_PASSWORD, PASSWORD_LEN);
    out.push_str("</fieldset><fieldset><legend>Sensor settings</legend>");
    text_input(
        &mut out,
        "Broker address",
        fields::BROKER_ADDRESS,
        &device.broker_address,
        STRING_LEN,
    );
    number_input(
        &mut out,
        "Broker port",
        fields::BROKER_PORT,
        device.broker_port,
        (*BROKER_PORT_RANGE.start(), *BROKER_PORT_RANGE.end()),
    );
    number_input(
        &mut out,
        "Poll interval (seconds)",
        fields::POLL_INTERVAL,
        device.poll_interval_secs,
        (*POLL_INTERVAL_RANGE.start(), *POLL_INTERVAL_RANGE.end()),
    );
    text_input(
        &mut out,
        "Topic prefix",
        fields::TOPIC_PREFIX,
        &device.topic_prefix,
        STRING_LEN,
    );
    out.push_str(
        "</fieldset><button type=\"submit\">Apply</button></form>\
         <p>Saving restarts the device.</p><p><a href=\"/\">Back</a></p>",
    );
    out.push_str(PAGE_TAIL);
    out
}

fn text_input(out: &mut String, label: &str, name: &str, value: &str, max_len: usize) {
    let _ = write!(
        out,
        "<label for=\"{name}\">{label}</label><input type=\"text\" id=\"{name}\" name=\"{name}\" maxlength=\"{max_len}\" value=\""
    );
    push_escaped(out, value);
    out.push_str("\"><br>");
}

fn password_input(out: &mut String, label: &str, name: &str, max_len: usize) {
    let _ = write!(
        out,
        "<label for=\"{name}\">{label}</label><input type=\"password\" id=\"{name}\" name=\"{name}\" maxlength=\"{max_len}\" placeholder=\"unchanged\"><br>"
    );
}

fn number_input(out: &mut String, label: &str, name: &str, value: u16, (min, max): (u16, u16)) {
    let _ = write!(
        out,
        "<label for=\"{name}\">{label}</label><input type=\"number\" id=\"{name}\" name=\"{name}\" min=\"{min}\" max=\"{max}\" step=\"1\" value=\"{value}\"><br>"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("a+b%2Fc").unwrap(), "a b/c");
        assert_eq!(url_decode("%C3%A9").unwrap(), "é");
        assert_eq!(url_decode("%+5"), Err(FormError::Malformed));
        assert_eq!(url_decode("%-1"), Err(FormError::Malformed));
        assert_eq!(url_decode("%4"), Err(FormError::Malformed));
        assert_eq!(url_decode("100%"), Err(FormError::Malformed));
        assert_eq!(url_decode("%zz"), Err(FormError::Malformed));
    }

    #[test]
    fn test_apply_full_form() {
        let current = PersistedConfig::default();
        let body = "brokerAddress=mqtt.local&brokerPort=8883&pollIntervalSeconds=30\
                    &topicPrefix=garage%2Fnorth&thingName=Garage&apPassword=&wifiSsid=Home+Net\
                    &wifiPassword=hunter22";
        let config = apply_form(&current, body).unwrap();

        assert_eq!(config.device.broker_address.as_str(), "mqtt.local");
        assert_eq!(config.device.broker_port, 8883);
        assert_eq!(config.device.poll_interval_secs, 30);
        assert_eq!(config.device.topic_prefix.as_str(), "garage/north");
        assert_eq!(config.system.thing_name.as_str(), "Garage");
        assert_eq!(config.system.wifi_ssid.as_str(), "Home Net");
        assert_eq!(config.system.wifi_password.as_str(), "hunter22");
        assert!(config.system.ap_password.is_empty());
    }

    #[test]
    fn test_empty_password_keeps_stored() {
        let mut current = PersistedConfig::default();
        current.system.wifi_password = "secret".try_into().unwrap();

        let config = apply_form(&current, "wifiPassword=&brokerPort=1884").unwrap();
        assert_eq!(config.system.wifi_password.as_str(), "secret");
        assert_eq!(config.device.broker_port, 1884);
    }

    #[test]
    fn test_out_of_range_rejects_submission() {
        let current = PersistedConfig::default();
        assert_eq!(
            apply_form(&current, "brokerPort=32768"),
            Err(FormError::Field(ConfigError::OutOfRange {
                field: fields::BROKER_PORT,
                min: 1,
                max: 32767,
            }))
        );
        assert_eq!(
            apply_form(&current, "pollIntervalSeconds=0"),
            Err(FormError::Field(ConfigError::OutOfRange {
                field: fields::POLL_INTERVAL,
                min: 1,
                max: 9999,
            }))
        );
        assert_eq!(
            apply_form(&current, "brokerPort=abc"),
            Err(FormError::Field(ConfigError::NotANumber {
                field: fields::BROKER_PORT
            }))
        );
    }

    #[test]
    fn test_empty_prefix_rejected() {
        assert_eq!(
            apply_form(&PersistedConfig::default(), "topicPrefix="),
            Err(FormError::Field(ConfigError::Empty {
                field: fields::TOPIC_PREFIX
            }))
        );
    }

    #[test]
    fn test_form_renders_bounds_and_values() {
        let page = render_config_form(&PersistedConfig::default());
        assert!(page.contains("name=\"brokerAddress\" maxlength=\"128\" value=\"192.168.0.1\""));
        assert!(page.contains("name=\"brokerPort\" min=\"1\" max=\"32767\""));
        assert!(page.contains("name=\"pollIntervalSeconds\" min=\"1\" max=\"9999\""));
        assert!(page.contains("name=\"topicPrefix\" maxlength=\"128\" value=\"sensor1\""));
        assert!(page.contains("method=\"post\""));
    }

    #[test]
    fn test_form_never_echoes_passwords() {
        let mut config = PersistedConfig::default();
        config.system.wifi_password = "hunter22".try_into().unwrap();
        let page = render_config_form(&config);
        assert!(!page.contains("hunter22"));
    }
}
