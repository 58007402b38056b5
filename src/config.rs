//! Session and link parameters.

use crate::calibration::{Channel, GainRange};
use crate::control_register::ControlRegister;
use crate::rate_limited_writer::COMMAND_INTERVAL;
use std::time::Duration;

/// Link speed of the CGR-101's USB serial bridge.
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

#[derive(Debug, Clone, PartialEq)]
pub struct Cgr101Config {
    pub baud_rate: u32,
    /// Minimum spacing between outbound commands.
    pub command_interval: Duration,
    /// How long a single trigger poll waits for the ACK byte.
    pub poll_timeout: Duration,
    /// Bound on blocking reads of fixed-length responses.
    pub response_timeout: Duration,
    /// Pause between the two input drains at session start.
    pub settle_delay: Duration,
    pub initial_gain: GainRange,
    pub initial_register: ControlRegister,
}

impl Default for Cgr101Config {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            command_interval: COMMAND_INTERVAL,
            poll_timeout: Duration::from_millis(100),
            response_timeout: Duration::from_secs(2),
            settle_delay: Duration::from_millis(100),
            initial_gain: GainRange::Low,
            initial_register: ControlRegister {
                sample_rate_div: 1,
                trigger_source: Channel::A,
                trigger_polarity: false,
                external_trigger: true,
            },
        }
    }
}

impl Cgr101Config {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_command_interval(mut self, interval: Duration) -> Self {
        self.command_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_initial_gain(mut self, range: GainRange) -> Self {
        self.initial_gain = range;
        self
    }

    pub fn with_initial_register(mut self, register: ControlRegister) -> Self {
        self.initial_register = register;
        self
    }
}
