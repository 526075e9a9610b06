//! Serial Line Configuration
//!
//! Panels speak 8 data bits, odd parity, one stop bit, no flow control.
//! Only the baud rate is configurable.

use serde::{Deserialize, Serialize};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, SerialStream, StopBits};
use tracing::info;

use crate::error::ProtocolError;

/// Supported line speeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    B4800,
    B9600,
    B57600,
    B115200,
}

impl BaudRate {
    /// Bits per second
    pub fn as_u32(&self) -> u32 {
        match self {
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        BaudRate::B9600
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            4800 => Ok(BaudRate::B4800),
            9600 => Ok(BaudRate::B9600),
            57600 => Ok(BaudRate::B57600),
            115200 => Ok(BaudRate::B115200),
            other => Err(ProtocolError::UnsupportedBaud(other)),
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(baud: BaudRate) -> Self {
        baud.as_u32()
    }
}

/// An opened panel line
pub type SerialLine = SerialStream;

/// Open and configure a panel line (8O1, no flow control), discarding
/// anything the driver buffered before we attached.
pub fn open_line(device: &str, baud: BaudRate) -> Result<SerialLine, ProtocolError> {
    info!("Opening {} at {} baud (8O1)", device, baud.as_u32());

    let builder = tokio_serial::new(device, baud.as_u32())
        .data_bits(DataBits::Eight)
        .parity(Parity::Odd)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None);

    let port = SerialStream::open(&builder).map_err(|e| {
        ProtocolError::SerialError(format!("Failed to open {}: {}", device, e))
    })?;
    port.clear(tokio_serial::ClearBuffer::All)?;

    Ok(port)
}
