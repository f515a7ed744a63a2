//! Climate sensor drivers
//!
//! Exactly one is compiled in, selected by the `sensor-*` features. Both sit
//! directly on the I2C bus; the node owns the driver so no bus sharing is
//! needed.

use airnode_core::sensors::ClimateSensor;
#[cfg(feature = "sensor-bme280")]
use airnode_core::sensors::SensorVariant;
use airnode_core::sensors::SensorError;
#[cfg(feature = "sensor-bme280")]
use airnode_core::sensors::{SEA_LEVEL_PRESSURE_PA, altitude_from_pressure};
use embedded_hal_async::i2c::I2c;

#[cfg(feature = "sensor-sht40")]
pub use sht40::Sht40Climate;

#[cfg(feature = "sensor-bme280")]
pub use bme::Bme280Climate;

#[cfg(all(feature = "sensor-sht40", feature = "sensor-bme280"))]
compile_error!("enable only one of `sensor-sht40` and `sensor-bme280`");

#[cfg(feature = "sensor-sht40")]
mod sht40 {
    use sht4x::Sht4xAsync;

    use super::*;

    /// SHT40 temperature/humidity sensor (basic variant).
    ///
    /// One measurement yields both quantities; the humidity is kept for the
    /// read that follows the temperature read.
    pub struct Sht40Climate<I> {
        sensor: Sht4xAsync<I, embassy_time::Delay>,
        pending_humidity: Option<f32>,
    }

    impl<I: I2c> Sht40Climate<I> {
        pub fn new(i2c: I) -> Self {
            Self {
                sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
                pending_humidity: None,
            }
        }

        async fn measure(&mut self) -> Result<(f32, f32), SensorError> {
            let measurement = self
                .sensor
                .measure(sht4x::Precision::High, &mut embassy_time::Delay)
                .await
                .map_err(|e| {
                    log::error!("SHT40 measurement failed: {:?}", e);
                    SensorError::ReadFailed {
                        sensor: "SHT40",
                        operation: "measure temperature/humidity",
                        details: "I2C communication error or sensor not responding",
                    }
                })?;

            Ok((
                measurement.temperature_celsius().to_num::<f32>(),
                measurement.humidity_percent().to_num::<f32>(),
            ))
        }
    }

    impl<I: I2c> ClimateSensor for Sht40Climate<I> {
        async fn read_temperature(&mut self) -> Result<f32, SensorError> {
            let (temperature, humidity) = self.measure().await?;
            self.pending_humidity = Some(humidity);
            Ok(temperature)
        }

        async fn read_humidity(&mut self) -> Result<f32, SensorError> {
            match self.pending_humidity.take() {
                Some(humidity) => Ok(humidity),
                None => Ok(self.measure().await?.1),
            }
        }
    }
}

#[cfg(feature = "sensor-bme280")]
mod bme {
    use bme280::i2c::AsyncBME280;

    use super::*;
    use crate::app_state::AppError;

    /// BME280 temperature/humidity/pressure sensor (extended variant).
    ///
    /// Each sample is one forced measurement taken on the temperature read;
    /// the remaining quantities come from that same measurement.
    pub struct Bme280Climate<I> {
        sensor: AsyncBME280<I>,
        pending: Option<(f32, f32)>,
    }

    impl<I: I2c> Bme280Climate<I> {
        pub async fn new(i2c: I) -> Result<Self, AppError> {
            let mut sensor = AsyncBME280::new_primary(i2c);
            sensor
                .init(&mut embassy_time::Delay)
                .await
                .map_err(AppError::sensor)?;
            Ok(Self {
                sensor,
                pending: None,
            })
        }

        async fn measure(&mut self) -> Result<(f32, f32, f32), SensorError> {
            let m = self
                .sensor
                .measure(&mut embassy_time::Delay)
                .await
                .map_err(|e| {
                    log::error!("BME280 measurement failed: {:?}", e);
                    SensorError::ReadFailed {
                        sensor: "BME280",
                        operation: "forced measurement",
                        details: "I2C communication error or sensor not responding",
                    }
                })?;
            Ok((m.temperature, m.humidity, m.pressure))
        }

        async fn pending_or_measure(&mut self) -> Result<(f32, f32), SensorError> {
            match self.pending {
                Some(values) => Ok(values),
                None => {
                    let (_, humidity, pressure) = self.measure().await?;
                    Ok((humidity, pressure))
                }
            }
        }
    }

    impl<I: I2c> ClimateSensor for Bme280Climate<I> {
        fn variant(&self) -> SensorVariant {
            SensorVariant::Extended
        }

        async fn read_temperature(&mut self) -> Result<f32, SensorError> {
            let (temperature, humidity, pressure) = self.measure().await?;
            self.pending = Some((humidity, pressure));
            Ok(temperature)
        }

        async fn read_humidity(&mut self) -> Result<f32, SensorError> {
            Ok(self.pending_or_measure().await?.0)
        }

        async fn read_pressure(&mut self) -> Result<f32, SensorError> {
            Ok(self.pending_or_measure().await?.1)
        }

        async fn read_altitude(&mut self) -> Result<f32, SensorError> {
            let (_, pressure) = self.pending_or_measure().await?;
            // Last quantity of the sample; the next sample measures afresh.
            self.pending = None;
            Ok(altitude_from_pressure(pressure, SEA_LEVEL_PRESSURE_PA))
        }
    }
}
