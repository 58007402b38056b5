use crate::control_register::{ControlRegisterUpdate, MAX_SAMPLE_RATE_DIV};
use crate::session::{Cgr101Error, Cgr101Session};
use crate::transport::Transport;
use std::time::Duration;

/// Sample clock before division.
pub const BASE_CLOCK_HZ: f64 = 20_000_000.0;

/// Samples per channel in one acquisition.
pub const FRAME_SAMPLES: usize = 1024;

/// One of the sixteen rates the sample clock divider can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRateSetting {
    divisor: u8,
}

impl SampleRateSetting {
    /// The undivided 20 MHz clock.
    pub const CEILING: Self = Self { divisor: 0 };

    pub fn from_divisor(divisor: u8) -> Option<Self> {
        (divisor <= MAX_SAMPLE_RATE_DIV).then_some(Self { divisor })
    }

    pub fn divisor(&self) -> u8 {
        self.divisor
    }

    pub fn rate_hz(&self) -> f64 {
        BASE_CLOCK_HZ / f64::from(1u32 << self.divisor)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz())
    }

    /// Duration of a full frame at this rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(FRAME_SAMPLES as f64 / self.rate_hz())
    }
}

/// Pick the slowest rate strictly faster than `requested_hz`.
///
/// Requests at or above the base clock get the base clock.
pub fn quantize(requested_hz: f64) -> SampleRateSetting {
    (0..=MAX_SAMPLE_RATE_DIV)
        .rev()
        .map(|divisor| SampleRateSetting { divisor })
        .find(|candidate| {
            log::trace!("Candidate {} want {}", candidate.rate_hz(), requested_hz);
            candidate.rate_hz() > requested_hz
        })
        .unwrap_or(SampleRateSetting::CEILING)
}

impl<T: Transport> Cgr101Session<T> {
    /// Rate implied by the cached control register.
    pub fn sample_rate(&self) -> SampleRateSetting {
        self.register
            .as_ref()
            .and_then(|register| SampleRateSetting::from_divisor(register.sample_rate_div))
            .unwrap_or(SampleRateSetting::CEILING)
    }

    /// Program the nearest achievable rate and return it in Hz.
    pub fn set_sample_rate(&mut self, requested_hz: f64) -> Result<f64, Cgr101Error> {
        if !requested_hz.is_finite() || requested_hz <= 0.0 {
            return Err(Cgr101Error::InvalidSampleRate(requested_hz));
        }

        let setting = quantize(requested_hz);
        self.apply_control_register(ControlRegisterUpdate::new().sample_rate_div(setting.divisor()))?;
        log::debug!("Sample rate: {} Hz (asked for {} Hz)", setting.rate_hz(), requested_hz);
        Ok(setting.rate_hz())
    }

    /// Program the rate for a frame spanning `period` and return the frame
    /// period actually achieved. Use the returned value for the time axis.
    pub fn set_frame_period(&mut self, period: Duration) -> Result<Duration, Cgr101Error> {
        if period.is_zero() {
            return Err(Cgr101Error::InvalidFramePeriod(period));
        }

        let requested_hz = FRAME_SAMPLES as f64 / period.as_secs_f64();
        let achieved_hz = self.set_sample_rate(requested_hz)?;
        Ok(Duration::from_secs_f64(FRAME_SAMPLES as f64 / achieved_hz))
    }
}
