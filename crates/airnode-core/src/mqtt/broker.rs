/// Message-publish transport.
///
/// `connect` and `publish` are single attempts; failures are reported and the
/// caller decides when to try again. Implementations must not block for long.
/// A transport whose session setup outlives one call may start it in
/// `connect`, return an error, and report the session through
/// `is_connected` once it is up.
pub trait Broker {
    type Error: core::fmt::Debug;

    fn is_connected(&self) -> bool;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        client_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Protocol housekeeping: keep-alive and inbound pump.
    fn service(&mut self) -> impl Future<Output = ()>;
}
