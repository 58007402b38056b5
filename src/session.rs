use crate::calibration::{CalibrationError, Channel, ChannelCalibration};
use crate::config::Cgr101Config;
use crate::control_register::{ControlRegister, ControlRegisterError};
use crate::rate_limited_writer::RateLimitedWriter;
use crate::transport::{Transport, TransportError};
use crate::trigger::{TriggerPosition, TriggerState};
use std::thread;
use std::time::Duration;

const MAX_LINE_LENGTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum Cgr101Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol violation: expected 0x{expected:02x} but got 0x{actual:02x}")]
    ProtocolViolation { expected: u8, actual: u8 },

    #[error("Device reported trigger index {0}, outside the 1024-sample ring")]
    TriggerIndexOutOfRange(u16),

    #[error("Control register error: {0}")]
    ControlRegister(#[from] ControlRegisterError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Invalid sample rate {0} Hz, must be positive and finite")]
    InvalidSampleRate(f64),

    #[error("Invalid frame period {0:?}")]
    InvalidFramePeriod(Duration),

    #[error("Post-trigger sample count {0} out of range (max 1023)")]
    PostTriggerCountOutOfRange(u16),
}

/// An open connection to one CGR-101.
///
/// The protocol matches every response to the command right before it, so a
/// session needs exclusive use of its transport. Every operation that talks
/// to the device takes `&mut self`.
#[derive(Debug)]
pub struct Cgr101Session<T: Transport> {
    pub(crate) writer: RateLimitedWriter<T>,
    pub(crate) config: Cgr101Config,
    pub(crate) register: Option<ControlRegister>,
    pub(crate) calibration: ChannelCalibration,
    pub(crate) trigger_state: TriggerState,
    pub(crate) trigger_position: Option<TriggerPosition>,
    /// An `S G` was abandoned and its acknowledgement may still arrive.
    pub(crate) unanswered_arm: bool,
    identity: String,
}

impl<T: Transport> Cgr101Session<T> {
    /// Bring the device into a known state: flush stale input, identify,
    /// select the initial gain on both channels and write the full register.
    pub fn open(transport: T, config: Cgr101Config) -> Result<Self, Cgr101Error> {
        let writer = RateLimitedWriter::with_interval(transport, config.command_interval);
        let mut session = Self {
            writer,
            config,
            register: None,
            calibration: ChannelCalibration::new(),
            trigger_state: TriggerState::Idle,
            trigger_position: None,
            unanswered_arm: false,
            identity: String::new(),
        };

        session.drain_input()?;
        thread::sleep(session.config.settle_delay);
        session.drain_input()?;

        session.identity = session.identify()?;
        log::info!("id: {}", session.identity);

        let gain = session.config.initial_gain;
        for channel in Channel::ALL {
            session.set_gain_range(channel, gain)?;
        }

        let initial = session.config.initial_register;
        session.apply_control_register(initial.into())?;

        Ok(session)
    }

    /// End the session and hand the transport back.
    pub fn close(self) -> T {
        log::debug!("Closing session with {}", self.identity);
        self.writer.into_inner()
    }

    /// Ask the device for its identification string.
    pub fn identify(&mut self) -> Result<String, Cgr101Error> {
        self.discard_late_trigger()?;
        self.writer.send(b"i\n")?;
        let line = self.read_line()?;
        Ok(String::from_utf8_lossy(&line).trim_end().to_string())
    }

    /// Identification string read when the session was opened.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn config(&self) -> &Cgr101Config {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        self.writer.transport()
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        self.writer.transport_mut()
    }

    fn drain_input(&mut self) -> Result<(), Cgr101Error> {
        let pending = self.transport_mut().bytes_available()?;
        if pending > 0 {
            let timeout = self.config.poll_timeout;
            let discarded = self.transport_mut().read(pending, timeout)?;
            log::debug!("Discarded {} stale bytes", discarded.len());
        }
        Ok(())
    }

    /// Throw away a trigger acknowledgement left over from an abandoned arm,
    /// so it is not taken as the answer to the next request.
    pub(crate) fn discard_late_trigger(&mut self) -> Result<(), Cgr101Error> {
        if self.unanswered_arm {
            self.drain_input()?;
            self.unanswered_arm = false;
        }
        Ok(())
    }

    /// Blocking read of exactly `n` bytes. Anything shorter is fatal.
    pub(crate) fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, Cgr101Error> {
        log::debug!("? {}", n);
        let timeout = self.config.response_timeout;
        let data = self.transport_mut().read(n, timeout)?;
        log::debug!("< {:02x?}", &data[..data.len().min(64)]);

        if data.len() != n {
            return Err(TransportError::ShortRead {
                expected: n,
                actual: data.len(),
            }
            .into());
        }
        Ok(data)
    }

    /// Read one byte and require it to be `expected`.
    pub(crate) fn read_ack(&mut self, expected: u8) -> Result<(), Cgr101Error> {
        let byte = self.read_exact(1)?[0];
        check_ack(expected, byte)
    }

    /// Wait up to the poll timeout for a single byte.
    pub(crate) fn poll_byte(&mut self) -> Result<Option<u8>, Cgr101Error> {
        let timeout = self.config.poll_timeout;
        let data = self.transport_mut().read(1, timeout)?;
        Ok(data.first().copied())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, Cgr101Error> {
        log::debug!("? line");
        let mut line = Vec::new();
        loop {
            let byte = self.read_exact(1)?[0];
            line.push(byte);
            if byte == b'\n' {
                break;
            }
            if line.len() >= MAX_LINE_LENGTH {
                return Err(TransportError::LineTooLong {
                    limit: MAX_LINE_LENGTH,
                }
                .into());
            }
        }
        log::debug!("< {}", String::from_utf8_lossy(&line).trim_end());
        Ok(line)
    }
}

pub(crate) fn check_ack(expected: u8, actual: u8) -> Result<(), Cgr101Error> {
    if actual != expected {
        return Err(Cgr101Error::ProtocolViolation { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::calibration::GainRange;
    use crate::transport::mock::MockTransport;

    pub(crate) fn test_config() -> Cgr101Config {
        Cgr101Config::default().with_settle_delay(Duration::ZERO)
    }

    /// A session opened against a mock that answered the identify request.
    pub(crate) fn open_mock_session() -> Cgr101Session<MockTransport> {
        let mut mock = MockTransport::new().with_unsolicited(b"\x00stale");
        mock.respond(b"CGR-101 v2.02\r\n");
        Cgr101Session::open(mock, test_config()).unwrap()
    }

    #[test]
    fn test_open_sequence() {
        let session = open_mock_session();

        assert_eq!(session.identity(), "CGR-101 v2.02");
        assert_eq!(
            session.transport().frames(),
            vec![
                "i\n".to_string(),
                "S P a\n".to_string(),
                "S P b\n".to_string(),
                "S R 65\n".to_string(),
            ]
        );
        assert_eq!(session.calibration().gain_range(Channel::A), GainRange::Low);
        assert_eq!(session.calibration().gain_range(Channel::B), GainRange::Low);
        assert_eq!(session.trigger_state(), TriggerState::Idle);
        assert_eq!(session.sample_rate().rate_hz(), 10_000_000.0);
    }

    #[test]
    fn test_open_with_internal_trigger_selects_display_mode() {
        let mut register = test_config().initial_register;
        register.external_trigger = false;
        let config = test_config()
            .with_initial_register(register)
            .with_initial_gain(GainRange::High);

        let mut mock = MockTransport::new();
        mock.respond(b"CGR-101\n");
        let session = Cgr101Session::open(mock, config).unwrap();

        assert_eq!(
            session.transport().frames(),
            vec![
                "i\n".to_string(),
                "S P A\n".to_string(),
                "S P B\n".to_string(),
                "S R 1\n".to_string(),
                "S D 4\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_open_fails_without_identification() {
        let result = Cgr101Session::open(MockTransport::new(), test_config());
        assert!(matches!(
            result,
            Err(Cgr101Error::Transport(TransportError::ShortRead {
                expected: 1,
                actual: 0
            }))
        ));
    }

    #[test]
    fn test_identify_line_limit() {
        let mut session = open_mock_session();
        session.transport_mut().respond(&[b'x'; MAX_LINE_LENGTH + 10]);
        assert!(matches!(
            session.identify(),
            Err(Cgr101Error::Transport(TransportError::LineTooLong { .. }))
        ));
    }

    #[test]
    fn test_check_ack() {
        assert!(check_ack(b'A', b'A').is_ok());
        assert!(matches!(
            check_ack(b'D', b'A'),
            Err(Cgr101Error::ProtocolViolation {
                expected: b'D',
                actual: b'A'
            })
        ));
    }

    #[test]
    fn test_close_returns_transport() {
        let session = open_mock_session();
        let mock = session.close();
        assert_eq!(mock.frames().len(), 4);
        assert_eq!(mock.pending_responses(), 0);
    }
}
