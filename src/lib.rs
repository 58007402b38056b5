//! # CGR-101 RS
//!
//! A Rust library for acquiring waveforms from the Syscomp CircuitGear CGR-101,
//! a two-channel 20 MS/s oscilloscope front-end driven over a USB serial link.
//!
//! ## Features
//!
//! - **Device discovery**: Uses `serialport` to find CircuitGear boards
//! - **Sample rate selection**: Requested rates and frame periods snap to the 16 hardware rates
//! - **Triggering**: Internal capture or external trigger with cancellable polling
//! - **Calibration**: Per-channel gain ranges and offsets applied to every sample
//! - **DataFrame output**: Frames convert to `polars` DataFrames with a time column
//!
//! ## Examples
//!
//! ### Internal Trigger Capture
//!
//! ```rust,no_run
//! use cgr101_rs::{Cgr101Config, Cgr101Connector, Channel, GainRange};
//! use std::time::Duration;
//!
//! let mut scope = Cgr101Connector::connect(None, Cgr101Config::default())?;
//!
//! scope.set_gain_range(Channel::A, GainRange::High)?;
//! let period = scope.set_frame_period(Duration::from_millis(10))?;
//! println!("Frame covers {:?}", period);
//!
//! scope.set_trigger_level(Channel::A, 0.5)?;
//! scope.capture_internal()?;
//! let frame = scope.read_frame()?;
//! println!("Captured {} samples", frame.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### External Trigger with a Deadline
//!
//! ```rust,no_run
//! use cgr101_rs::{ArmOutcome, CancelToken, Cgr101Config, Cgr101Connector};
//! use std::time::{Duration, Instant};
//!
//! let mut scope = Cgr101Connector::connect(Some("/dev/ttyUSB0"), Cgr101Config::default())?;
//! scope.set_sample_rate(2_000_000.0)?;
//!
//! let deadline = Instant::now() + Duration::from_secs(5);
//! match scope.arm_external(&CancelToken::new(), Some(deadline))? {
//!     ArmOutcome::Triggered(_) => {
//!         let df = scope.read_frame()?.to_dataframe()?;
//!         println!("{}", df);
//!     }
//!     ArmOutcome::Cancelled | ArmOutcome::DeadlineElapsed => println!("No trigger"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Sample Rate Quantization
//!
//! ```rust
//! use cgr101_rs::sample_rate::quantize;
//!
//! let setting = quantize(2_000_000.0);
//! assert_eq!(setting.divisor(), 3);
//! assert_eq!(setting.rate_hz(), 2_500_000.0);
//! ```

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod connector;
pub mod control_register;
pub mod rate_limited_writer;
pub mod sample_rate;
pub mod session;
pub mod transport;
pub mod trigger;

// Re-export the main types for convenience
pub use acquisition::AcquisitionFrame;

pub use calibration::{CalibrationError, Channel, ChannelCalibration, GainRange};

pub use config::Cgr101Config;

pub use connector::{Cgr101Connector, Cgr101Device, ConnectorError};

pub use control_register::{ControlRegister, ControlRegisterError, ControlRegisterUpdate};

pub use rate_limited_writer::RateLimitedWriter;

pub use sample_rate::SampleRateSetting;

pub use session::{Cgr101Error, Cgr101Session};

pub use transport::{SerialTransport, Transport, TransportError};

pub use trigger::{ArmOutcome, CancelToken, TriggerPosition, TriggerState};
