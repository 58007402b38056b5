use crate::transport::{Transport, TransportError};
use std::thread;
use std::time::{Duration, Instant};

/// Minimum spacing between two outbound frames. The firmware drops or
/// garbles commands that arrive closer together than this.
pub const COMMAND_INTERVAL: Duration = Duration::from_millis(1);

/// Writes frames to a transport, keeping at least `min_interval` between
/// the starts of consecutive writes.
#[derive(Debug)]
pub struct RateLimitedWriter<T: Transport> {
    transport: T,
    min_interval: Duration,
    last_write: Option<Instant>,
}

impl<T: Transport> RateLimitedWriter<T> {
    pub fn new(transport: T) -> Self {
        Self::with_interval(transport, COMMAND_INTERVAL)
    }

    pub fn with_interval(transport: T, min_interval: Duration) -> Self {
        Self {
            transport,
            min_interval,
            last_write: None,
        }
    }

    /// Send one frame, sleeping first if the previous write was too recent.
    pub fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        log::debug!("> {:?}", String::from_utf8_lossy(frame).trim_end());

        if let Some(last) = self.last_write {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }

        self.last_write = Some(Instant::now());
        self.transport.write_all(frame)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Direct access for reads. Writes must go through `send`.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn test_consecutive_sends_are_spaced() {
        let mut writer = RateLimitedWriter::new(MockTransport::new());
        let start = Instant::now();
        for _ in 0..5 {
            writer.send(b"S G\n").unwrap();
        }

        assert_eq!(writer.transport().writes.len(), 5);
        assert!(start.elapsed() >= COMMAND_INTERVAL * 4);
    }

    #[test]
    fn test_first_send_is_not_delayed() {
        let mut writer =
            RateLimitedWriter::with_interval(MockTransport::new(), Duration::from_secs(10));
        let start = Instant::now();
        writer.send(b"i\n").unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(writer.transport().frames(), vec!["i\n".to_string()]);
    }

    #[test]
    fn test_spacing_honours_custom_interval() {
        let interval = Duration::from_millis(15);
        let mut writer = RateLimitedWriter::with_interval(MockTransport::new(), interval);
        let start = Instant::now();
        writer.send(b"S D 5\n").unwrap();
        writer.send(b"S D 4\n").unwrap();

        assert!(start.elapsed() >= interval);
        assert_eq!(
            writer.transport().frames(),
            vec!["S D 5\n".to_string(), "S D 4\n".to_string()]
        );
    }
}
