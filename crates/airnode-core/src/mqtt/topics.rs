//! Publish topic derivation and payload encoding
//!
//! Topics are `"/" + prefix + "/" + suffix`, one per quantity the sensor
//! variant provides. Payloads are the value in decimal ASCII with two
//! fractional digits, one value per topic.

use core::fmt::Write;

use thiserror_no_std::Error;

use crate::config::STRING_LEN;
use crate::sensors::{SensorReading, SensorType, SensorVariant};

/// Longest suffix is "humidity"/"altitude"/"pressure" (8), plus two slashes.
pub const TOPIC_LEN: usize = STRING_LEN + 10;
/// `-f32::MAX` with two decimals is 43 characters.
pub const PAYLOAD_LEN: usize = 48;

pub type Topic = heapless::String<TOPIC_LEN>;
pub type Payload = heapless::String<PAYLOAD_LEN>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic prefix longer than {max} characters")]
    PrefixTooLong { max: usize },
    #[error("value is not finite")]
    NotFinite,
    #[error("payload longer than {max} characters")]
    PayloadTooLong { max: usize },
}

/// Topics for every quantity of one sensor variant.
///
/// Derived once per network association and stable until the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    temperature: Topic,
    humidity: Topic,
    pressure: Option<Topic>,
    altitude: Option<Topic>,
}

impl TopicSet {
    pub fn new(prefix: &str, variant: SensorVariant) -> Result<Self, TopicError> {
        let extended = variant == SensorVariant::Extended;

        Ok(Self {
            temperature: build(prefix, SensorType::Temperature)?,
            humidity: build(prefix, SensorType::Humidity)?,
            pressure: extended
                .then(|| build(prefix, SensorType::Pressure))
                .transpose()?,
            altitude: extended
                .then(|| build(prefix, SensorType::Altitude))
                .transpose()?,
        })
    }

    pub fn topic(&self, quantity: SensorType) -> Option<&str> {
        match quantity {
            SensorType::Temperature => Some(self.temperature.as_str()),
            SensorType::Humidity => Some(self.humidity.as_str()),
            SensorType::Pressure => self.pressure.as_deref(),
            SensorType::Altitude => self.altitude.as_deref(),
        }
    }

    /// `(topic, value)` pairs for everything in `reading` that has a topic.
    pub fn pairs<'a>(
        &'a self,
        reading: &'a SensorReading,
    ) -> impl Iterator<Item = (&'a str, f32)> + 'a {
        SensorVariant::Extended
            .quantities()
            .iter()
            .filter_map(move |&q| Some((self.topic(q)?, reading.value(q)?)))
    }
}

fn build(prefix: &str, quantity: SensorType) -> Result<Topic, TopicError> {
    let mut topic = Topic::new();
    write!(topic, "/{}/{}", prefix, quantity.topic_suffix())
        .map_err(|_| TopicError::PrefixTooLong { max: STRING_LEN })?;
    Ok(topic)
}

/// Two-decimal ASCII encoding of a published value.
///
/// Deterministic and parses back to the same two-decimal value. NaN and the
/// infinities have no such encoding and are rejected.
pub fn format_payload(value: f32) -> Result<Payload, TopicError> {
    if !value.is_finite() {
        return Err(TopicError::NotFinite);
    }
    let mut payload = Payload::new();
    write!(payload, "{:.2}", value)
        .map_err(|_| TopicError::PayloadTooLong { max: PAYLOAD_LEN })?;
    Ok(payload)
}
