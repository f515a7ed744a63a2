//! Configuration persistence on the SD card
//!
//! The whole configuration is one small file in the root directory, rewritten
//! on every save. These operations are blocking; they only run at boot and
//! when the operator saves, so the loop stalling for a few milliseconds is
//! acceptable.

use alloc::vec::Vec;

use airnode_core::config::{ConfigStore, PersistedConfig};
use embedded_sdmmc::{Mode, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::info;

use crate::app_state::AppError;

const CONFIG_FILE: &str = "CONFIG.BIN";

/// Largest blob read back; a valid configuration is well below this.
const MAX_BLOB_LEN: usize = 1024;

/// The node has no wall clock, so files carry a fixed timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedTime;

impl TimeSource for FixedTime {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

pub struct SdConfigStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdConfigStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, ts),
        }
    }

    fn read_blob(&self) -> Result<Vec<u8>, AppError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(AppError::storage)?;
        let root_dir = volume0.open_root_dir().map_err(AppError::storage)?;
        let file = root_dir
            .open_file_in_dir(CONFIG_FILE, Mode::ReadOnly)
            .map_err(AppError::storage)?;

        let mut blob = alloc::vec![0u8; MAX_BLOB_LEN];
        let mut len = 0;
        while len < blob.len() {
            let n = file.read(&mut blob[len..]).map_err(AppError::storage)?;
            if n == 0 {
                break;
            }
            len += n;
        }
        blob.truncate(len);

        file.close().map_err(AppError::storage)?;
        root_dir.close().map_err(AppError::storage)?;
        volume0.close().map_err(AppError::storage)?;

        Ok(blob)
    }

    fn write_blob(&self, blob: &[u8]) -> Result<(), AppError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(AppError::storage)?;
        let root_dir = volume0.open_root_dir().map_err(AppError::storage)?;
        let file = root_dir
            .open_file_in_dir(CONFIG_FILE, Mode::ReadWriteCreateOrTruncate)
            .map_err(AppError::storage)?;

        file.write(blob).map_err(AppError::storage)?;

        // Closing flushes the directory entry; errors here mean a lost write.
        file.close().map_err(AppError::storage)?;
        root_dir.close().map_err(AppError::storage)?;
        volume0.close().map_err(AppError::storage)?;

        Ok(())
    }
}

impl<S, D, T> ConfigStore for SdConfigStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    type Error = AppError;

    fn load(&mut self) -> Result<PersistedConfig, AppError> {
        let blob = self.read_blob()?;
        Ok(PersistedConfig::from_blob(&blob)?)
    }

    fn save(&mut self, config: &PersistedConfig) -> Result<(), AppError> {
        let blob = config.to_blob()?;
        self.write_blob(&blob)?;
        info!("storage: configuration written ({} bytes)", blob.len());
        Ok(())
    }
}
