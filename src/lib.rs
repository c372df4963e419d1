//! Driver for GW Instek GPP series bench power supplies over their serial
//! (USB CDC) link, and a DC/DC converter efficiency sweep built on it.
//!
//! The serial port must be configured as 9600 baud, 8 data bits, no parity,
//! 1 stop bit; [`Gpp::open`] does that.

pub mod channel;
pub mod error;
pub mod instrument;
pub mod protocol;
pub mod sweep;

// Re-export the primary types so users can depend on the crate
// without knowing the internal module layout.
pub use channel::{Channel, ChannelHandle, ChannelStatus};
pub use error::{GppError, Result};
pub use instrument::*;
pub use protocol::{
    Ch1Ch2Mode, DisplayBrightness, Identity, LoadMode, MeasureKind, Measurement, Reading,
    SourceKind, TrackingMode,
};
