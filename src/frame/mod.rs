// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

mod coils;
mod data;
#[cfg(feature = "rtu")]
pub(crate) mod rtu;
#[cfg(feature = "tcp")]
pub(crate) mod tcp;

pub use self::{coils::*, data::*};

/// A Modbus function code.
///
/// It is represented by an unsigned 8 bit integer.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// Modbus Function Code: `01` (`0x01`).
    ReadCoils,

    /// Modbus Function Code: `02` (`0x02`).
    ReadDiscreteInputs,

    /// Modbus Function Code: `05` (`0x05`).
    WriteSingleCoil,

    /// Modbus Function Code: `06` (`0x06`).
    WriteSingleRegister,

    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,

    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,

    /// Modbus Function Code: `15` (`0x0F`).
    WriteMultipleCoils,

    /// Modbus Function Code: `16` (`0x10`).
    WriteMultipleRegisters,

    /// Modbus Function Code: `22` (`0x16`).
    MaskWriteRegister,

    /// Modbus Function Code: `23` (`0x17`).
    ReadWriteMultipleRegisters,

    /// Modbus Function Code: `07` (`0x07`), serial line only.
    #[cfg(feature = "rtu")]
    ReadExceptionStatus,

    /// Modbus Function Code: `08` (`0x08`), serial line only.
    #[cfg(feature = "rtu")]
    Diagnostics,

    /// Modbus Function Code: `17` (`0x11`), serial line only.
    #[cfg(feature = "rtu")]
    ReportServerId,

    /// Custom Modbus Function Code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            #[cfg(feature = "rtu")]
            0x07 => Self::ReadExceptionStatus,
            #[cfg(feature = "rtu")]
            0x08 => Self::Diagnostics,
            #[cfg(feature = "rtu")]
            0x11 => Self::ReportServerId,
            code => FunctionCode::Custom(code),
        }
    }

    /// Get the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            #[cfg(feature = "rtu")]
            Self::ReadExceptionStatus => 0x07,
            #[cfg(feature = "rtu")]
            Self::Diagnostics => 0x08,
            #[cfg(feature = "rtu")]
            Self::ReportServerId => 0x11,
            Self::Custom(code) => code,
        }
    }

    /// Whether this function code addresses single-bit data.
    #[must_use]
    pub const fn is_bit_access(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::WriteSingleCoil
                | Self::WriteMultipleCoils
        )
    }
}

impl From<u8> for FunctionCode {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> Self {
        code.value()
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// Slave address of a serial line device, or unit id of a TCP device.
pub type SlaveId = u8;

/// The RTU broadcast address: every slave executes, nobody responds.
pub const BROADCAST: SlaveId = 0;

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// Raw PDU data
type RawData<'r> = &'r [u8];

/// Which way a PDU travels; the same function code has different shapes
/// in a request and in a response.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Master to slave.
    Request,
    /// Slave to master.
    Response,
}

/// A server (slave) exception.
///
/// Codes without a name of their own are kept as [`Exception::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    NegativeAcknowledge,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetDevice,
    /// Any other non-zero code, e.g. a vendor specific one.
    Other(u8),
}

impl Exception {
    const fn get_name(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::NegativeAcknowledge => "Negative acknowledge",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetDevice => "Gateway target device failed to respond",
            Self::Other(_) => "Exception",
        }
    }

    /// The exception code as sent on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::ServerDeviceFailure => 0x04,
            Self::Acknowledge => 0x05,
            Self::ServerDeviceBusy => 0x06,
            Self::NegativeAcknowledge => 0x07,
            Self::MemoryParityError => 0x08,
            Self::GatewayPathUnavailable => 0x0A,
            Self::GatewayTargetDevice => 0x0B,
            Self::Other(code) => code,
        }
    }
}

impl TryFrom<u8> for Exception {
    type Error = crate::Error;

    /// Only `0` is not an exception code.
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use Exception::*;
        let ex = match code {
            0x00 => {
                return Err(crate::Error::ExceptionCode(code));
            }
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => Other(code),
        };
        Ok(ex)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "{} 0x{code:0>2X}", self.get_name()),
            _ => write!(f, "{}", self.get_name()),
        }
    }
}

impl core::error::Error for Exception {}

#[cfg(all(feature = "defmt", target_os = "none"))]
impl defmt::Format for Exception {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Other(code) => defmt::write!(fmt, "{} {=u8:#04x}", self.get_name(), code),
            _ => defmt::write!(fmt, "{}", self.get_name()),
        }
    }
}

/// A server (slave) exception response.
///
/// `function` is the function code of the rejected request; on the wire it
/// is sent with the high bit set.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: Exception,
}

/// A protocol data unit: function code plus payload, independent of framing.
///
/// The variants are the wire *shapes*; several function codes share a shape.
/// Variable length shapes borrow their data region from the buffer they were
/// decoded from, and the byte count on the wire is always `data.len()`.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pdu<'r> {
    /// Function codes `0x01`-`0x04`, request.
    ReadRequest {
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    },
    /// Function codes `0x01`-`0x04` and `0x17`, response.
    ReadResponse {
        function: FunctionCode,
        data: RawData<'r>,
    },
    /// Function codes `0x05` and `0x06`, request and echoed response.
    WriteSingle {
        function: FunctionCode,
        address: Address,
        value: Word,
    },
    /// Function codes `0x0F` and `0x10`, request.
    WriteMultipleRequest {
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
        data: RawData<'r>,
    },
    /// Function codes `0x0F` and `0x10`, response.
    WriteMultipleResponse {
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    },
    /// Function code `0x16`, request and echoed response.
    MaskWrite {
        address: Address,
        and_mask: Word,
        or_mask: Word,
    },
    /// Function code `0x17`, request. The write is performed before the read.
    ReadWriteMultipleRequest {
        read_address: Address,
        read_quantity: Quantity,
        write_address: Address,
        write_quantity: Quantity,
        data: RawData<'r>,
    },
    Exception(ExceptionResponse),
}

impl Pdu<'_> {
    /// The function code of this PDU (without the exception bit).
    #[must_use]
    pub const fn function(&self) -> FunctionCode {
        match *self {
            Self::ReadRequest { function, .. }
            | Self::ReadResponse { function, .. }
            | Self::WriteSingle { function, .. }
            | Self::WriteMultipleRequest { function, .. }
            | Self::WriteMultipleResponse { function, .. } => function,
            Self::MaskWrite { .. } => FunctionCode::MaskWriteRegister,
            Self::ReadWriteMultipleRequest { .. } => FunctionCode::ReadWriteMultipleRegisters,
            Self::Exception(ExceptionResponse { function, .. }) => function,
        }
    }

    /// Number of bytes required for a serialized PDU frame.
    #[must_use]
    pub const fn pdu_len(&self) -> usize {
        match *self {
            Self::ReadRequest { .. }
            | Self::WriteSingle { .. }
            | Self::WriteMultipleResponse { .. } => 5,
            Self::ReadResponse { data, .. } => 2 + data.len(),
            Self::WriteMultipleRequest { data, .. } => 6 + data.len(),
            Self::MaskWrite { .. } => 7,
            Self::ReadWriteMultipleRequest { data, .. } => 10 + data.len(),
            Self::Exception(_) => 2,
        }
    }

    /// Whether this is an exception response.
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        matches!(self, Self::Exception(_))
    }
}
