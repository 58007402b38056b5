use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Byte-stream endpoint the driver talks to.
///
/// `read` may hand back fewer than `n` bytes when `timeout` elapses; the
/// caller decides whether that is a retriable timeout or a fatal short read.
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    fn read(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    fn bytes_available(&mut self) -> Result<usize, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short read: expected {expected} bytes but got {actual}. Likely due to a timeout.")]
    ShortRead { expected: usize, actual: usize },

    #[error("Line too long: no terminator within {limit} bytes")]
    LineTooLong { limit: usize },
}

/// `Transport` over a real serial port.
pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.serial.name())
            .finish()
    }
}

impl SerialTransport {
    /// Open `port` with 8N1 framing at `baud_rate`.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let serial = serialport::new(port, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self { serial })
    }

    pub fn from_port(serial: Box<dyn SerialPort>) -> Self {
        Self { serial }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.serial.write_all(bytes)?;
        self.serial.flush()?;
        Ok(())
    }

    fn read(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut buffer = vec![0u8; n];
        let mut filled = 0;
        let deadline = Instant::now() + timeout;

        while filled < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.serial.set_timeout(remaining)?;
            match self.serial.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        buffer.truncate(filled);
        Ok(buffer)
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.serial.bytes_to_read()? as usize)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::{Transport, TransportError};
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    #[derive(Debug)]
    enum Step {
        Data(Vec<u8>),
        Stall,
        Fail,
    }

    /// Scripted transport: every `read` consumes the next queued step.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        unsolicited: Vec<u8>,
        responses: VecDeque<Step>,
        pub writes: Vec<(Instant, Vec<u8>)>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Bytes sitting in the input buffer before the session starts.
        pub fn with_unsolicited(mut self, bytes: &[u8]) -> Self {
            self.unsolicited.extend_from_slice(bytes);
            self
        }

        /// Bytes that arrive unprompted, e.g. a late trigger acknowledgement.
        pub fn push_unsolicited(&mut self, bytes: &[u8]) -> &mut Self {
            self.unsolicited.extend_from_slice(bytes);
            self
        }

        pub fn respond(&mut self, bytes: &[u8]) -> &mut Self {
            self.responses.push_back(Step::Data(bytes.to_vec()));
            self
        }

        /// Next read times out with nothing received.
        pub fn stall(&mut self) -> &mut Self {
            self.responses.push_back(Step::Stall);
            self
        }

        /// Next read fails as if the port went away.
        pub fn fail(&mut self) -> &mut Self {
            self.responses.push_back(Step::Fail);
            self
        }

        pub fn frames(&self) -> Vec<String> {
            self.writes
                .iter()
                .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
                .collect()
        }

        pub fn clear_writes(&mut self) {
            self.writes.clear();
        }

        pub fn pending_responses(&self) -> usize {
            self.responses.len()
        }
    }

    impl Transport for MockTransport {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.writes.push((Instant::now(), bytes.to_vec()));
            Ok(())
        }

        fn read(&mut self, n: usize, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            if !self.unsolicited.is_empty() {
                let take = n.min(self.unsolicited.len());
                return Ok(self.unsolicited.drain(..take).collect());
            }
            match self.responses.pop_front() {
                Some(Step::Data(mut bytes)) => {
                    if bytes.len() > n {
                        let rest = bytes.split_off(n);
                        self.responses.push_front(Step::Data(rest));
                    }
                    Ok(bytes)
                }
                Some(Step::Fail) => Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device disconnected",
                ))),
                Some(Step::Stall) | None => Ok(Vec::new()),
            }
        }

        fn bytes_available(&mut self) -> Result<usize, TransportError> {
            Ok(self.unsolicited.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[test]
    fn test_mock_splits_long_responses() {
        let mut mock = MockTransport::new();
        mock.respond(b"abc");

        let timeout = Duration::from_millis(1);
        assert_eq!(mock.read(1, timeout).unwrap(), b"a");
        assert_eq!(mock.read(2, timeout).unwrap(), b"bc");
        assert!(mock.read(1, timeout).unwrap().is_empty());
    }

    #[test]
    fn test_mock_serves_unsolicited_first() {
        let mut mock = MockTransport::new().with_unsolicited(b"junk");
        mock.respond(b"x");

        assert_eq!(mock.bytes_available().unwrap(), 4);
        let timeout = Duration::from_millis(1);
        assert_eq!(mock.read(4, timeout).unwrap(), b"junk");
        assert_eq!(mock.bytes_available().unwrap(), 0);
        assert_eq!(mock.read(1, timeout).unwrap(), b"x");
    }

    #[test]
    fn test_mock_scripted_failure() {
        let mut mock = MockTransport::new();
        mock.stall().fail().respond(b"y");

        let timeout = Duration::from_millis(1);
        assert!(mock.read(1, timeout).unwrap().is_empty());
        assert!(matches!(mock.read(1, timeout), Err(TransportError::Io(_))));
        assert_eq!(mock.read(1, timeout).unwrap(), b"y");
    }
}
