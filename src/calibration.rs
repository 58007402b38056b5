use crate::session::{Cgr101Error, Cgr101Session};
use crate::transport::Transport;

/// ADC code that corresponds to 0 V. Codes grow as the input voltage falls.
pub const ZERO_CODE: f32 = 511.0;

/// Volts per step of the trigger comparator on the high gain range.
pub const TRIGGER_VOLTS_PER_STEP: f64 = 0.052421484375;

/// Largest threshold the trigger comparator accepts.
pub const MAX_TRIGGER_THRESHOLD: i64 = 1023;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("Unknown channel '{0}', expected A or B")]
    UnknownChannel(char),

    #[error("Unknown channel id {0}, expected 0 (A) or 1 (B)")]
    UnknownChannelId(u8),

    #[error("Trigger level {volts} V maps to threshold {threshold}, outside 0..=1023")]
    TriggerLevelOutOfRange { volts: f64, threshold: i64 },

    #[error("Trigger level {0} V is not a finite voltage")]
    NonFiniteTriggerLevel(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    pub const ALL: [Self; 2] = [Self::A, Self::B];

    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
        }
    }
}

impl TryFrom<char> for Channel {
    type Error = CalibrationError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase() {
            'A' => Ok(Self::A),
            'B' => Ok(Self::B),
            _ => Err(CalibrationError::UnknownChannel(value)),
        }
    }
}

impl TryFrom<u8> for Channel {
    type Error = CalibrationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::A),
            1 => Ok(Self::B),
            _ => Err(CalibrationError::UnknownChannelId(value)),
        }
    }
}

/// Analog front-end attenuation setting of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainRange {
    #[default]
    Low,
    High,
}

impl GainRange {
    pub fn volts_per_code(self) -> f32 {
        match self {
            Self::Low => 0.00592,
            Self::High => 0.0521,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }

    /// The channel letter, upper case for High and lower case for Low.
    pub fn command_letter(self, channel: Channel) -> char {
        match self {
            Self::High => channel.letter(),
            Self::Low => channel.letter().to_ascii_lowercase(),
        }
    }
}

/// Per-channel gain range selection and offset calibration.
///
/// Offsets are indexed by channel and gain range and start at zero. They are
/// measured by the caller; nothing here derives them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelCalibration {
    ranges: [GainRange; 2],
    offsets: [[f32; 2]; 2],
}

impl ChannelCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain_range(&self, channel: Channel) -> GainRange {
        self.ranges[channel.index()]
    }

    pub fn set_gain_range(&mut self, channel: Channel, range: GainRange) {
        self.ranges[channel.index()] = range;
    }

    pub fn offset(&self, channel: Channel, range: GainRange) -> f32 {
        self.offsets[channel.index()][range.index()]
    }

    pub fn set_offset(&mut self, channel: Channel, range: GainRange, volts: f32) {
        self.offsets[channel.index()][range.index()] = volts;
    }

    pub fn volts_per_code(&self, channel: Channel) -> f32 {
        self.gain_range(channel).volts_per_code()
    }

    /// Convert a raw ADC code to volts using the channel's current range.
    pub fn code_to_volts(&self, channel: Channel, raw_code: u16) -> f32 {
        let range = self.gain_range(channel);
        (ZERO_CODE - f32::from(raw_code)) * range.volts_per_code() - self.offset(channel, range)
    }

    /// Comparator threshold for a trigger at `volts` on `channel`.
    ///
    /// The comparator divides by ten on the Low range and not on High, the
    /// reverse of what the display gain table would suggest. Kept as measured
    /// on hardware.
    pub fn trigger_threshold(&self, channel: Channel, volts: f64) -> Result<u16, CalibrationError> {
        if !volts.is_finite() {
            return Err(CalibrationError::NonFiniteTriggerLevel(volts));
        }
        let gain_factor = match self.gain_range(channel) {
            GainRange::High => 1.0,
            GainRange::Low => 10.0,
        };

        let threshold = (f64::from(ZERO_CODE) - gain_factor * volts / TRIGGER_VOLTS_PER_STEP)
            .round() as i64;
        if !(0..=MAX_TRIGGER_THRESHOLD).contains(&threshold) {
            return Err(CalibrationError::TriggerLevelOutOfRange { volts, threshold });
        }

        Ok(threshold as u16)
    }
}

pub fn gain_range_command(channel: Channel, range: GainRange) -> String {
    format!("S P {}\n", range.command_letter(channel))
}

pub fn trigger_level_command(threshold: u16) -> String {
    format!("S T {} {}\n", (threshold >> 8) & 0xff, threshold & 0xff)
}

impl<T: Transport> Cgr101Session<T> {
    /// Switch the front-end range of `channel` and use its scale from now on.
    pub fn set_gain_range(&mut self, channel: Channel, range: GainRange) -> Result<(), Cgr101Error> {
        self.writer
            .send(gain_range_command(channel, range).as_bytes())?;
        self.calibration.set_gain_range(channel, range);
        log::debug!(
            "Channel {} range {:?}: {} V/code",
            channel.letter(),
            range,
            range.volts_per_code()
        );
        Ok(())
    }

    /// Record a measured bias for `channel` on `range`. No device traffic.
    pub fn set_calibration_offset(&mut self, channel: Channel, range: GainRange, volts: f32) {
        self.calibration.set_offset(channel, range, volts);
    }

    pub fn calibration(&self) -> &ChannelCalibration {
        &self.calibration
    }

    /// Channel the comparator currently watches, once the register is known.
    pub fn trigger_source(&self) -> Option<Channel> {
        self.register.map(|register| register.trigger_source)
    }

    /// Program the trigger comparator. Returns the threshold that was sent.
    ///
    /// The threshold is scaled with the gain range of `channel`, while the
    /// comparator watches the register's trigger source. Pass the channel that
    /// is selected as trigger source.
    pub fn set_trigger_level(&mut self, channel: Channel, volts: f64) -> Result<u16, Cgr101Error> {
        let threshold = self.calibration.trigger_threshold(channel, volts)?;
        if let Some(source) = self.trigger_source().filter(|source| *source != channel) {
            log::warn!(
                "Trigger level scaled for channel {} but trigger source is channel {}",
                channel.letter(),
                source.letter()
            );
        }
        log::debug!(
            "Threshold range {:?} level {} V -> {}",
            self.calibration.gain_range(channel),
            volts,
            threshold
        );
        self.writer
            .send(trigger_level_command(threshold).as_bytes())?;
        Ok(threshold)
    }
}
