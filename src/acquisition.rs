use crate::calibration::{Channel, ChannelCalibration};
use crate::sample_rate::FRAME_SAMPLES;
use crate::session::{Cgr101Error, Cgr101Session};
use crate::transport::Transport;
use crate::trigger::{TriggerPosition, TriggerState};
use polars::prelude::*;

/// Sent by the device ahead of the sample dump.
pub const BUFFER_ACK: u8 = b'D';

/// Two big-endian u16 codes per row, one row per sample.
pub const DUMP_BYTES: usize = FRAME_SAMPLES * 4;

pub const TIME_COLUMN_NAME: &str = "time";
pub const CHANNEL_A_COLUMN_NAME: &str = "channel_a";
pub const CHANNEL_B_COLUMN_NAME: &str = "channel_b";

/// Split a raw dump into `[A, B]` code pairs.
pub fn decode_dump(dump: &[u8]) -> Vec<[u16; 2]> {
    dump.chunks_exact(4)
        .map(|row| {
            [
                u16::from_be_bytes([row[0], row[1]]),
                u16::from_be_bytes([row[2], row[3]]),
            ]
        })
        .collect()
}

/// Rotate ring-buffer rows so that row `position` becomes row 0.
pub fn rotate_to_trigger<R>(rows: &mut [R], position: TriggerPosition) {
    if rows.is_empty() {
        return;
    }
    let shift = position.get() % rows.len();
    rows.rotate_left(shift);
}

/// One calibrated two-channel capture.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionFrame {
    pub channel_a: Vec<f32>,
    pub channel_b: Vec<f32>,
    sample_rate_hz: f64,
    trigger_position: TriggerPosition,
}

impl AcquisitionFrame {
    /// Decode, realign and calibrate a raw dump.
    pub fn assemble(
        dump: &[u8],
        position: TriggerPosition,
        calibration: &ChannelCalibration,
        sample_rate_hz: f64,
    ) -> Self {
        let mut rows = decode_dump(dump);
        rotate_to_trigger(&mut rows, position);

        let (channel_a, channel_b): (Vec<f32>, Vec<f32>) = rows
            .iter()
            .map(|[a, b]| {
                (
                    calibration.code_to_volts(Channel::A, *a),
                    calibration.code_to_volts(Channel::B, *b),
                )
            })
            .unzip();

        Self {
            channel_a,
            channel_b,
            sample_rate_hz,
            trigger_position: position,
        }
    }

    pub fn channel(&self, channel: Channel) -> &[f32] {
        match channel {
            Channel::A => &self.channel_a,
            Channel::B => &self.channel_b,
        }
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn trigger_position(&self) -> TriggerPosition {
        self.trigger_position
    }

    pub fn len(&self) -> usize {
        self.channel_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel_a.is_empty()
    }

    /// Sample times in seconds, relative to the first sample.
    pub fn time_axis(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| i as f64 / self.sample_rate_hz)
            .collect()
    }

    pub fn to_lazyframe(&self) -> PolarsResult<LazyFrame> {
        let df = DataFrame::new(vec![
            Series::new(CHANNEL_A_COLUMN_NAME.into(), self.channel_a.as_slice()).into(),
            Series::new(CHANNEL_B_COLUMN_NAME.into(), self.channel_b.as_slice()).into(),
        ])?;

        Ok(df
            .lazy()
            .with_row_index("row_index", Some(0))
            .with_columns([(col("row_index").cast(DataType::Float64)
                * lit(1.0 / self.sample_rate_hz))
            .alias(TIME_COLUMN_NAME)])
            .select([
                col(TIME_COLUMN_NAME),
                col(CHANNEL_A_COLUMN_NAME),
                col(CHANNEL_B_COLUMN_NAME),
            ]))
    }

    /// Columns `time`, `channel_a` and `channel_b`.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        self.to_lazyframe()?.collect()
    }
}

impl<T: Transport> Cgr101Session<T> {
    /// Download the sample buffer of the last capture. Takes about 200 ms on
    /// real hardware at 230400 baud.
    pub fn read_frame(&mut self) -> Result<AcquisitionFrame, Cgr101Error> {
        let _span = tracing::debug_span!("read_frame").entered();
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!("read_frame"), 0));

        if self.trigger_state != TriggerState::BufferReady {
            log::warn!(
                "Reading buffer in state {:?}, samples may be stale",
                self.trigger_state
            );
        }
        let position = self.trigger_position.unwrap_or_default();

        self.discard_late_trigger()?;
        self.writer.send(b"S B \n")?;
        self.read_ack(BUFFER_ACK)?;
        let dump = self.read_exact(DUMP_BYTES)?;

        let frame = AcquisitionFrame::assemble(
            &dump,
            position,
            &self.calibration,
            self.sample_rate().rate_hz(),
        );
        self.trigger_state = TriggerState::Idle;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::GainRange;
    use crate::session::tests::open_mock_session;
    use crate::transport::TransportError;
    use crate::trigger::{ArmOutcome, CancelToken};

    fn dump_from_rows(rows: &[[u16; 2]]) -> Vec<u8> {
        rows.iter()
            .flat_map(|[a, b]| {
                let [a0, a1] = a.to_be_bytes();
                let [b0, b1] = b.to_be_bytes();
                [a0, a1, b0, b1]
            })
            .collect()
    }

    fn flat_dump_with_marker(marker_row: usize, marker_code: u16) -> Vec<u8> {
        let mut rows = vec![[511u16, 511u16]; FRAME_SAMPLES];
        rows[marker_row] = [marker_code, 511];
        dump_from_rows(&rows)
    }

    #[test]
    fn test_decode_dump_big_endian_pairs() {
        let rows = decode_dump(&[0x01, 0xff, 0x00, 0x02, 0x03, 0x00, 0x00, 0x01]);
        assert_eq!(rows, vec![[0x01ff, 0x0002], [0x0300, 0x0001]]);
    }

    #[test]
    fn test_rotation_brings_last_sample_first() {
        let mut rows: Vec<usize> = (0..FRAME_SAMPLES).collect();
        rotate_to_trigger(&mut rows, TriggerPosition::from_reported_index(0).unwrap());
        assert_eq!(rows[0], 1023);
        assert_eq!(rows[1], 0);
        assert_eq!(rows[1023], 1022);
    }

    #[test]
    fn test_rotation_round_trip() {
        let original: Vec<usize> = (0..FRAME_SAMPLES).collect();
        for position in [0u16, 1, 17, 512, 1000, 1023] {
            let mut rows = original.clone();
            rotate_to_trigger(&mut rows, TriggerPosition::new(position).unwrap());
            let back = (FRAME_SAMPLES - usize::from(position)) % FRAME_SAMPLES;
            rotate_to_trigger(&mut rows, TriggerPosition::new(back as u16).unwrap());
            assert_eq!(rows, original);
        }
    }

    #[test]
    fn test_assemble_calibrates_each_channel() {
        let mut calibration = ChannelCalibration::new();
        calibration.set_gain_range(Channel::B, GainRange::High);
        calibration.set_offset(Channel::B, GainRange::High, 0.5);

        let dump = dump_from_rows(&[[411, 511], [511, 501]]);
        let frame =
            AcquisitionFrame::assemble(&dump, TriggerPosition::default(), &calibration, 1e6);

        assert!((frame.channel_a[0] - 0.592).abs() < 1e-5);
        assert_eq!(frame.channel_a[1], 0.0);
        assert_eq!(frame.channel_b[0], -0.5);
        assert!((frame.channel_b[1] - (0.521 - 0.5)).abs() < 1e-5);
    }

    #[test]
    fn test_read_frame_after_internal_capture() {
        let mut session = open_mock_session();
        session.transport_mut().respond(b"A").respond(&[0x00, 0x00]);
        session.capture_internal().unwrap();
        session.transport_mut().clear_writes();

        session
            .transport_mut()
            .respond(b"D")
            .respond(&flat_dump_with_marker(1023, 411));

        let frame = session.read_frame().unwrap();
        assert_eq!(session.transport().frames(), vec!["S B \n".to_string()]);
        assert_eq!(session.trigger_state(), TriggerState::Idle);
        assert_eq!(frame.len(), FRAME_SAMPLES);
        assert_eq!(frame.channel_b.len(), FRAME_SAMPLES);
        assert!((frame.channel_a[0] - 0.592).abs() < 1e-5);
        assert!(frame.channel_a[1..].iter().all(|&v| v == 0.0));
        assert!(frame.channel_b.iter().all(|&v| v == 0.0));
        assert_eq!(frame.sample_rate_hz(), 10_000_000.0);
    }

    #[test]
    fn test_read_frame_without_capture_does_not_rotate() {
        let mut session = open_mock_session();
        session
            .transport_mut()
            .respond(b"D")
            .respond(&flat_dump_with_marker(7, 611));

        let frame = session.read_frame().unwrap();
        assert!((frame.channel_a[7] + 0.592).abs() < 1e-5);
    }

    #[test]
    fn test_read_frame_skips_late_trigger_ack() {
        let mut session = open_mock_session();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            session.arm_external(&cancel, None).unwrap(),
            ArmOutcome::Cancelled
        );

        session.transport_mut().push_unsolicited(&[b'A', 0x03, 0xff]);
        session
            .transport_mut()
            .respond(b"D")
            .respond(&flat_dump_with_marker(3, 411));

        let frame = session.read_frame().unwrap();
        assert!((frame.channel_a[3] - 0.592).abs() < 1e-5);
        assert_eq!(session.transport().pending_responses(), 0);
    }

    #[test]
    fn test_read_frame_rejects_wrong_ack() {
        let mut session = open_mock_session();
        session.transport_mut().respond(b"A");

        assert!(matches!(
            session.read_frame(),
            Err(Cgr101Error::ProtocolViolation {
                expected: b'D',
                actual: b'A'
            })
        ));
    }

    #[test]
    fn test_read_frame_short_dump_is_fatal() {
        let mut session = open_mock_session();
        session.transport_mut().respond(b"D").respond(&[0u8; 100]);

        assert!(matches!(
            session.read_frame(),
            Err(Cgr101Error::Transport(TransportError::ShortRead {
                expected: DUMP_BYTES,
                actual: 100
            }))
        ));
    }

    #[test]
    fn test_time_axis_and_dataframe() {
        let dump = flat_dump_with_marker(0, 411);
        let frame = AcquisitionFrame::assemble(
            &dump,
            TriggerPosition::default(),
            &ChannelCalibration::new(),
            2_500_000.0,
        );

        let times = frame.time_axis();
        assert_eq!(times.len(), FRAME_SAMPLES);
        assert_eq!(times[0], 0.0);
        assert!((times[1] - 4e-7).abs() < 1e-15);

        let df = frame.to_dataframe().unwrap();
        assert_eq!(df.shape(), (FRAME_SAMPLES, 3));
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec![TIME_COLUMN_NAME, CHANNEL_A_COLUMN_NAME, CHANNEL_B_COLUMN_NAME]
        );
        let time = df.column(TIME_COLUMN_NAME).unwrap().f64().unwrap();
        assert_eq!(time.get(0), Some(0.0));
        assert!((time.get(1).unwrap() - 4e-7).abs() < 1e-15);
    }
}
