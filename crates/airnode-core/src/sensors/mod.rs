//! Sensor driver seam and the reading failure policy
//!
//! Drivers implement [`ClimateSensor`]; the main loop only ever talks to a
//! [`SensorReader`], which turns the individual fallible reads into one
//! all-or-nothing [`SensorReading`].

use log::debug;
use thiserror_no_std::Error;

/// Standard sea-level pressure used for the altitude estimate, in pascal.
pub const SEA_LEVEL_PRESSURE_PA: f32 = 101_325.0;

/// Physical quantities a node can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    Temperature,
    Humidity,
    Pressure,
    Altitude,
}

impl SensorType {
    /// Last topic segment for this quantity.
    pub const fn topic_suffix(self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Altitude => "altitude",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Altitude => "altitude",
        }
    }
}

/// Which set of quantities a sensor board provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorVariant {
    /// Temperature and humidity.
    Basic,
    /// Temperature, humidity, pressure and altitude.
    Extended,
}

impl SensorVariant {
    pub const fn quantities(self) -> &'static [SensorType] {
        match self {
            Self::Basic => &[SensorType::Temperature, SensorType::Humidity],
            Self::Extended => &[
                SensorType::Temperature,
                SensorType::Humidity,
                SensorType::Pressure,
                SensorType::Altitude,
            ],
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: {operation} failed: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{} reading is not a number", .quantity.label())]
    NotANumber { quantity: SensorType },
    #[error("quantity not supported by this sensor")]
    Unsupported,
}

/// A complete, valid sample.
///
/// Invalid samples never become a `SensorReading`: [`SensorReader::read`]
/// returns an error instead, so there are no sentinel values to publish.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Pascal, extended variant only.
    pub pressure: Option<f32>,
    /// Metres above sea level, extended variant only.
    pub altitude: Option<f32>,
}

impl SensorReading {
    pub const fn value(&self, quantity: SensorType) -> Option<f32> {
        match quantity {
            SensorType::Temperature => Some(self.temperature),
            SensorType::Humidity => Some(self.humidity),
            SensorType::Pressure => self.pressure,
            SensorType::Altitude => self.altitude,
        }
    }
}

/// Driver-level access to a temperature/humidity sensor.
///
/// Each read is one short bus transaction. Drivers may report a failed
/// conversion either as an error or as a NaN value; both are treated alike.
pub trait ClimateSensor {
    fn variant(&self) -> SensorVariant {
        SensorVariant::Basic
    }

    fn read_temperature(&mut self) -> impl Future<Output = Result<f32, SensorError>>;

    fn read_humidity(&mut self) -> impl Future<Output = Result<f32, SensorError>>;

    fn read_pressure(&mut self) -> impl Future<Output = Result<f32, SensorError>> {
        async { Err(SensorError::Unsupported) }
    }

    fn read_altitude(&mut self) -> impl Future<Output = Result<f32, SensorError>> {
        async { Err(SensorError::Unsupported) }
    }
}

/// Stateless wrapper applying the reading failure policy.
///
/// - temperature or humidity failing (error or NaN) invalidates the sample
/// - pressure or altitude failing only drops that field
/// - nothing is retried here; the next scheduled sample is the retry
pub struct SensorReader<S> {
    sensor: S,
}

impl<S: ClimateSensor> SensorReader<S> {
    pub const fn new(sensor: S) -> Self {
        Self { sensor }
    }

    pub fn variant(&self) -> SensorVariant {
        self.sensor.variant()
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn into_inner(self) -> S {
        self.sensor
    }

    pub async fn read(&mut self) -> Result<SensorReading, SensorError> {
        let temperature = mandatory(
            SensorType::Temperature,
            self.sensor.read_temperature().await,
        )?;
        let humidity = mandatory(SensorType::Humidity, self.sensor.read_humidity().await)?;

        let (pressure, altitude) = match self.sensor.variant() {
            SensorVariant::Basic => (None, None),
            SensorVariant::Extended => (
                optional(SensorType::Pressure, self.sensor.read_pressure().await),
                optional(SensorType::Altitude, self.sensor.read_altitude().await),
            ),
        };

        Ok(SensorReading {
            temperature,
            humidity,
            pressure,
            altitude,
        })
    }
}

fn mandatory(quantity: SensorType, value: Result<f32, SensorError>) -> Result<f32, SensorError> {
    match value {
        Ok(v) if v.is_nan() => Err(SensorError::NotANumber { quantity }),
        other => other,
    }
}

fn optional(quantity: SensorType, value: Result<f32, SensorError>) -> Option<f32> {
    match value {
        Ok(v) if !v.is_nan() => Some(v),
        Ok(_) => {
            debug!("sensor: {} is NaN, skipping", quantity.label());
            None
        }
        Err(e) => {
            debug!("sensor: {} unavailable: {}", quantity.label(), e);
            None
        }
    }
}

/// Barometric altitude estimate in metres from station pressure in pascal.
pub fn altitude_from_pressure(pressure_pa: f32, sea_level_pa: f32) -> f32 {
    44_330.0 * (1.0 - libm::powf(pressure_pa / sea_level_pa, 1.0 / 5.255))
}
