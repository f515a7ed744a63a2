/// Monotonic time source and cooperative delay.
///
/// On the device this is backed by `embassy_time`; tests use a manual clock
/// whose delay simply advances the current time.
pub trait Clock {
    /// Milliseconds since boot. Must never go backwards.
    fn now_ms(&self) -> u64;

    /// Wait for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u64) -> impl Future<Output = ()>;
}
