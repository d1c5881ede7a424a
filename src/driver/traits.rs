use crate::common::error::DriverError;

/// datagram link to one controller
/// the listener thread is the only reader, the request cycle the only writer
pub trait Transport: Send + Sync {
    /// send one datagram
    fn send(&self, data: &[u8]) -> Result<(), DriverError>;

    /// wait for one datagram, `Ok(None)` when the idle timeout elapsed first
    fn receive(&self, buf: &mut [u8]) -> Result<Option<usize>, DriverError>;
}
