use airnode_core::clock::Clock;
use embassy_time::{Instant, Timer};

/// [`Clock`] over the embassy time driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    async fn delay_ms(&mut self, ms: u64) {
        Timer::after_millis(ms).await;
    }
}
