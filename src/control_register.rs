use crate::calibration::Channel;
use crate::session::{Cgr101Error, Cgr101Session};
use crate::transport::Transport;

/// Largest sample-rate divisor the device accepts.
pub const MAX_SAMPLE_RATE_DIV: u8 = 15;

const SOURCE_BIT: u8 = 4;
const POLARITY_BIT: u8 = 5;
const EXTERNAL_BIT: u8 = 6;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControlRegisterError {
    #[error("Sample rate divisor {0} out of range (max 15)")]
    DivisorOutOfRange(u8),

    #[error("First control register update must set every field, {0} is missing")]
    IncompleteInitialUpdate(&'static str),

    #[error("Control register value 0x{0:02x} has the reserved bit set")]
    ReservedBitSet(u8),
}

/// Device-side sample rate and trigger setup, packed into 7 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRegister {
    pub sample_rate_div: u8,
    pub trigger_source: Channel,
    pub trigger_polarity: bool,
    pub external_trigger: bool,
}

impl ControlRegister {
    pub fn encode(&self) -> u8 {
        self.sample_rate_div
            | ((self.trigger_source.index() as u8) << SOURCE_BIT)
            | (u8::from(self.trigger_polarity) << POLARITY_BIT)
            | (u8::from(self.external_trigger) << EXTERNAL_BIT)
    }

    pub fn decode(value: u8) -> Result<Self, ControlRegisterError> {
        if value & 0x80 != 0 {
            return Err(ControlRegisterError::ReservedBitSet(value));
        }

        let trigger_source = if value & (1 << SOURCE_BIT) == 0 {
            Channel::A
        } else {
            Channel::B
        };

        Ok(Self {
            sample_rate_div: value & 0x0f,
            trigger_source,
            trigger_polarity: value & (1 << POLARITY_BIT) != 0,
            external_trigger: value & (1 << EXTERNAL_BIT) != 0,
        })
    }

    pub fn command(&self) -> String {
        format!("S R {}\n", self.encode())
    }
}

/// A read-modify-write change to the control register. Fields left unset keep
/// the value currently cached by the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlRegisterUpdate {
    sample_rate_div: Option<u8>,
    trigger_source: Option<Channel>,
    trigger_polarity: Option<bool>,
    external_trigger: Option<bool>,
}

impl ControlRegisterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate_div(mut self, div: u8) -> Self {
        self.sample_rate_div = Some(div);
        self
    }

    pub fn trigger_source(mut self, channel: Channel) -> Self {
        self.trigger_source = Some(channel);
        self
    }

    pub fn trigger_polarity(mut self, rising: bool) -> Self {
        self.trigger_polarity = Some(rising);
        self
    }

    pub fn external_trigger(mut self, external: bool) -> Self {
        self.external_trigger = Some(external);
        self
    }

    /// Merge onto `base`. Without a base every field must be given.
    pub fn merge_onto(
        self,
        base: Option<&ControlRegister>,
    ) -> Result<ControlRegister, ControlRegisterError> {
        let register = match base {
            Some(base) => ControlRegister {
                sample_rate_div: self.sample_rate_div.unwrap_or(base.sample_rate_div),
                trigger_source: self.trigger_source.unwrap_or(base.trigger_source),
                trigger_polarity: self.trigger_polarity.unwrap_or(base.trigger_polarity),
                external_trigger: self.external_trigger.unwrap_or(base.external_trigger),
            },
            None => ControlRegister {
                sample_rate_div: self
                    .sample_rate_div
                    .ok_or(ControlRegisterError::IncompleteInitialUpdate("sample_rate_div"))?,
                trigger_source: self
                    .trigger_source
                    .ok_or(ControlRegisterError::IncompleteInitialUpdate("trigger_source"))?,
                trigger_polarity: self
                    .trigger_polarity
                    .ok_or(ControlRegisterError::IncompleteInitialUpdate("trigger_polarity"))?,
                external_trigger: self
                    .external_trigger
                    .ok_or(ControlRegisterError::IncompleteInitialUpdate("external_trigger"))?,
            },
        };

        if register.sample_rate_div > MAX_SAMPLE_RATE_DIV {
            return Err(ControlRegisterError::DivisorOutOfRange(
                register.sample_rate_div,
            ));
        }

        Ok(register)
    }
}

impl From<ControlRegister> for ControlRegisterUpdate {
    fn from(register: ControlRegister) -> Self {
        Self {
            sample_rate_div: Some(register.sample_rate_div),
            trigger_source: Some(register.trigger_source),
            trigger_polarity: Some(register.trigger_polarity),
            external_trigger: Some(register.external_trigger),
        }
    }
}

impl<T: Transport> Cgr101Session<T> {
    /// Apply `update` to the cached register and write the result to the device.
    ///
    /// Leaving external-trigger mode needs an explicit `S D 4` after the
    /// register write, otherwise the device keeps waiting for an external edge.
    pub fn apply_control_register(
        &mut self,
        update: ControlRegisterUpdate,
    ) -> Result<ControlRegister, Cgr101Error> {
        let register = update.merge_onto(self.register.as_ref())?;

        self.writer.send(register.command().as_bytes())?;
        if !register.external_trigger {
            self.writer.send(b"S D 4\n")?;
        }

        log::debug!("Control register {:?} = {}", register, register.encode());
        self.register = Some(register);
        Ok(register)
    }

    /// The register as last written, `None` before the first write.
    pub fn control_register(&self) -> Option<&ControlRegister> {
        self.register.as_ref()
    }
}
