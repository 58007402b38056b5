use crate::control_register::ControlRegisterUpdate;
use crate::session::{check_ack, Cgr101Error, Cgr101Session};
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Sent by the device once a trigger has been captured.
pub const TRIGGER_ACK: u8 = b'A';

const RING_LAST_INDEX: u16 = 1023;
const MAX_POST_TRIGGER_SAMPLES: u16 = 1023;

/// Where a session is in the arm/trigger/read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    #[default]
    Idle,
    Armed,
    TriggerPending,
    TriggerSeen,
    BufferReady,
}

/// Read offset into the device's ring buffer for the current capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerPosition(u16);

impl TriggerPosition {
    /// Position for the trigger-sample index the device reported.
    pub fn from_reported_index(index: u16) -> Option<Self> {
        RING_LAST_INDEX.checked_sub(index).map(Self)
    }

    pub fn new(position: u16) -> Option<Self> {
        (position <= RING_LAST_INDEX).then_some(Self(position))
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

/// Shared flag that stops a pending `arm_external` wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Triggered(TriggerPosition),
    Cancelled,
    DeadlineElapsed,
}

impl<T: Transport> Cgr101Session<T> {
    pub fn trigger_state(&self) -> TriggerState {
        self.trigger_state
    }

    pub fn trigger_position(&self) -> Option<TriggerPosition> {
        self.trigger_position
    }

    /// Number of samples the device keeps recording after the trigger.
    pub fn set_post_trigger_sample_count(&mut self, count: u16) -> Result<(), Cgr101Error> {
        if count > MAX_POST_TRIGGER_SAMPLES {
            return Err(Cgr101Error::PostTriggerCountOutOfRange(count));
        }
        let command = format!("S C {} {}\n", (count >> 8) & 0xff, count & 0xff);
        self.writer.send(command.as_bytes())?;
        Ok(())
    }

    /// Arm on the external trigger input and wait for an event.
    ///
    /// Keeps pulsing the rearm sequence until the device acknowledges a
    /// trigger, `cancel` is set or `deadline` passes. A cancelled or expired
    /// wait leaves external triggering selected. If the device fires after
    /// that, its acknowledgement is discarded before the next request that
    /// reads a response.
    pub fn arm_external(
        &mut self,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<ArmOutcome, Cgr101Error> {
        let _span = tracing::debug_span!("arm_external").entered();
        self.discard_late_trigger()?;

        if !self.register.is_some_and(|register| register.external_trigger) {
            self.apply_control_register(ControlRegisterUpdate::new().external_trigger(true))?;
        }

        log::debug!("Trigger?");
        self.writer.send(b"S G\n")?;
        self.trigger_state = TriggerState::Armed;
        self.trigger_position = None;

        let poll_pause = self.sample_rate().frame_period() / 10;
        let mut polls = 0u64;
        let ack = loop {
            if cancel.is_cancelled() {
                log::info!("Trigger wait cancelled after {} polls", polls);
                self.trigger_state = TriggerState::Idle;
                self.unanswered_arm = true;
                return Ok(ArmOutcome::Cancelled);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                log::info!("Trigger wait timed out after {} polls", polls);
                self.trigger_state = TriggerState::Idle;
                self.unanswered_arm = true;
                return Ok(ArmOutcome::DeadlineElapsed);
            }

            self.writer.send(b"S D 5\n")?;
            self.writer.send(b"S D 4\n")?;
            thread::sleep(poll_pause);

            self.trigger_state = TriggerState::TriggerPending;
            polls += 1;
            match self.poll_byte()? {
                Some(byte) => break byte,
                None => log::trace!("No trigger yet ({} polls)", polls),
            }
        };

        check_ack(TRIGGER_ACK, ack)?;
        self.finish_trigger().map(ArmOutcome::Triggered)
    }

    /// Capture on the internal trigger. The device fires on its own, so a
    /// missing acknowledgement is fatal rather than retried.
    pub fn capture_internal(&mut self) -> Result<TriggerPosition, Cgr101Error> {
        let _span = tracing::debug_span!("capture_internal").entered();
        self.discard_late_trigger()?;

        if self.register.map_or(true, |register| register.external_trigger) {
            self.apply_control_register(ControlRegisterUpdate::new().external_trigger(false))?;
        }

        self.writer.send(b"S G\n")?;
        self.trigger_state = TriggerState::Armed;
        self.trigger_position = None;

        self.read_ack(TRIGGER_ACK)?;
        self.finish_trigger()
    }

    fn finish_trigger(&mut self) -> Result<TriggerPosition, Cgr101Error> {
        self.trigger_state = TriggerState::TriggerSeen;

        let raw = self.read_exact(2)?;
        let index = u16::from_be_bytes([raw[0], raw[1]]);
        let position = TriggerPosition::from_reported_index(index)
            .ok_or(Cgr101Error::TriggerIndexOutOfRange(index))?;
        log::debug!("Trigger! index {} -> position {}", index, position.get());

        self.trigger_position = Some(position);
        self.trigger_state = TriggerState::BufferReady;
        Ok(position)
    }
}
