// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PDU encoder and decoder.
//!
//! A PDU is decoded by looking up the wire shape of its function code for the
//! given [`Direction`]. Decoding never returns a partially parsed PDU: input
//! that is too short yields `Ok(None)` and more bytes can be awaited.

use crate::{error::*, frame::*, util::*};

#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

type Result<T> = core::result::Result<T, Error>;

/// Maximum size of a PDU.
pub const MAX_PDU_LEN: usize = 253;

/// Wire layout of a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    ReadRequest,
    ReadResponse,
    WriteSingle,
    WriteMultipleRequest,
    WriteMultipleResponse,
    MaskWrite,
    ReadWriteMultipleRequest,
    Exception,
}

impl Shape {
    const fn of(pdu: &Pdu<'_>) -> Self {
        match pdu {
            Pdu::ReadRequest { .. } => Self::ReadRequest,
            Pdu::ReadResponse { .. } => Self::ReadResponse,
            Pdu::WriteSingle { .. } => Self::WriteSingle,
            Pdu::WriteMultipleRequest { .. } => Self::WriteMultipleRequest,
            Pdu::WriteMultipleResponse { .. } => Self::WriteMultipleResponse,
            Pdu::MaskWrite { .. } => Self::MaskWrite,
            Pdu::ReadWriteMultipleRequest { .. } => Self::ReadWriteMultipleRequest,
            Pdu::Exception(_) => Self::Exception,
        }
    }

    /// Smallest number of bytes a PDU of this shape occupies.
    const fn min_len(self) -> usize {
        match self {
            Self::Exception => 2,
            Self::ReadResponse => 3,
            Self::ReadRequest | Self::WriteSingle | Self::WriteMultipleResponse => 5,
            Self::WriteMultipleRequest | Self::MaskWrite => 7,
            Self::ReadWriteMultipleRequest => 11,
        }
    }
}

fn request_shape(function: FunctionCode) -> Option<Shape> {
    use FunctionCode as f;
    let shape = match function {
        f::ReadCoils | f::ReadDiscreteInputs | f::ReadHoldingRegisters | f::ReadInputRegisters => {
            Shape::ReadRequest
        }
        f::WriteSingleCoil | f::WriteSingleRegister => Shape::WriteSingle,
        f::WriteMultipleCoils | f::WriteMultipleRegisters => Shape::WriteMultipleRequest,
        f::MaskWriteRegister => Shape::MaskWrite,
        f::ReadWriteMultipleRegisters => Shape::ReadWriteMultipleRequest,
        _ => return None,
    };
    Some(shape)
}

fn response_shape(function: FunctionCode) -> Option<Shape> {
    use FunctionCode as f;
    let shape = match function {
        f::ReadCoils
        | f::ReadDiscreteInputs
        | f::ReadHoldingRegisters
        | f::ReadInputRegisters
        | f::ReadWriteMultipleRegisters => Shape::ReadResponse,
        f::WriteSingleCoil | f::WriteSingleRegister => Shape::WriteSingle,
        f::WriteMultipleCoils | f::WriteMultipleRegisters => Shape::WriteMultipleResponse,
        f::MaskWriteRegister => Shape::MaskWrite,
        _ => return None,
    };
    Some(shape)
}

/// Decode a PDU from the start of `buf`.
///
/// Returns the PDU together with the number of bytes it occupies, or
/// `Ok(None)` if `buf` does not yet hold a complete PDU.
pub fn decode(buf: &[u8], direction: Direction) -> Result<Option<(Pdu<'_>, usize)>> {
    let Some(&fn_code) = buf.first() else {
        return Ok(None);
    };
    if direction == Direction::Response && fn_code & 0x80 != 0 {
        return decode_exception(buf);
    }
    let function = FunctionCode::new(fn_code);
    let shape = match direction {
        Direction::Request => request_shape(function),
        Direction::Response => response_shape(function),
    }
    .ok_or(Error::FnCode(fn_code))?;
    if buf.len() < shape.min_len() {
        return Ok(None);
    }

    let word = |offset: usize| get_u16(&buf[offset..]).0;

    let decoded = match shape {
        Shape::ReadRequest => (
            Pdu::ReadRequest {
                function,
                address: word(1),
                quantity: word(3),
            },
            5,
        ),
        Shape::WriteSingle => (
            Pdu::WriteSingle {
                function,
                address: word(1),
                value: word(3),
            },
            5,
        ),
        Shape::WriteMultipleResponse => (
            Pdu::WriteMultipleResponse {
                function,
                address: word(1),
                quantity: word(3),
            },
            5,
        ),
        Shape::MaskWrite => (
            Pdu::MaskWrite {
                address: word(1),
                and_mask: word(3),
                or_mask: word(5),
            },
            7,
        ),
        Shape::ReadResponse => {
            let byte_count = buf[1];
            if byte_count == 0 {
                return Err(Error::ByteCount(byte_count));
            }
            let Some(data) = data_region(buf, 2, byte_count) else {
                return Ok(None);
            };
            (Pdu::ReadResponse { function, data }, 2 + data.len())
        }
        Shape::WriteMultipleRequest => {
            let Some(data) = data_region(buf, 6, buf[5]) else {
                return Ok(None);
            };
            (
                Pdu::WriteMultipleRequest {
                    function,
                    address: word(1),
                    quantity: word(3),
                    data,
                },
                6 + data.len(),
            )
        }
        Shape::ReadWriteMultipleRequest => {
            let Some(data) = data_region(buf, 10, buf[9]) else {
                return Ok(None);
            };
            (
                Pdu::ReadWriteMultipleRequest {
                    read_address: word(1),
                    read_quantity: word(3),
                    write_address: word(5),
                    write_quantity: word(7),
                    data,
                },
                10 + data.len(),
            )
        }
        Shape::Exception => return decode_exception(buf),
    };
    Ok(Some(decoded))
}

fn data_region(buf: &[u8], start: usize, byte_count: u8) -> Option<&[u8]> {
    buf.get(start..start + usize::from(byte_count))
}

fn decode_exception(buf: &[u8]) -> Result<Option<(Pdu<'_>, usize)>> {
    if buf.len() < Shape::Exception.min_len() {
        return Ok(None);
    }
    let fn_err_code = buf[0];
    if fn_err_code < 0x80 {
        return Err(Error::ExceptionFnCode(fn_err_code));
    }
    let function = FunctionCode::new(fn_err_code & 0x7F);
    let exception = Exception::try_from(buf[1])?;
    Ok(Some((
        Pdu::Exception(ExceptionResponse {
            function,
            exception,
        }),
        2,
    )))
}

/// Encode `pdu` into `buf` and return the number of bytes written.
pub fn encode(pdu: &Pdu<'_>, direction: Direction, buf: &mut [u8]) -> Result<usize> {
    let shape = Shape::of(pdu);
    let function = pdu.function();
    let fn_code = function.value();

    match (direction, shape) {
        (Direction::Response, Shape::Exception) => {
            if fn_code >= 0x80 {
                return Err(Error::ExceptionFnCode(fn_code));
            }
        }
        (Direction::Request, Shape::Exception) => return Err(Error::FnCode(fn_code | 0x80)),
        (Direction::Request, _) if request_shape(function) != Some(shape) => {
            return Err(Error::FnCode(fn_code));
        }
        (Direction::Response, _) if response_shape(function) != Some(shape) => {
            return Err(Error::FnCode(fn_code));
        }
        _ => {}
    }

    let len = pdu.pdu_len();
    if buf.len() < len {
        return Err(Error::BufferSize);
    }

    let mut pos = put_u8(buf, fn_code);
    match *pdu {
        Pdu::ReadRequest {
            address, quantity, ..
        }
        | Pdu::WriteMultipleResponse {
            address, quantity, ..
        } => {
            pos += put_u16(&mut buf[pos..], address);
            pos += put_u16(&mut buf[pos..], quantity);
        }
        Pdu::WriteSingle { address, value, .. } => {
            pos += put_u16(&mut buf[pos..], address);
            pos += put_u16(&mut buf[pos..], value);
        }
        Pdu::MaskWrite {
            address,
            and_mask,
            or_mask,
        } => {
            pos += put_u16(&mut buf[pos..], address);
            pos += put_u16(&mut buf[pos..], and_mask);
            pos += put_u16(&mut buf[pos..], or_mask);
        }
        Pdu::ReadResponse { data, .. } => {
            pos += put_data(&mut buf[pos..], data)?;
        }
        Pdu::WriteMultipleRequest {
            address,
            quantity,
            data,
            ..
        } => {
            pos += put_u16(&mut buf[pos..], address);
            pos += put_u16(&mut buf[pos..], quantity);
            pos += put_data(&mut buf[pos..], data)?;
        }
        Pdu::ReadWriteMultipleRequest {
            read_address,
            read_quantity,
            write_address,
            write_quantity,
            data,
        } => {
            pos += put_u16(&mut buf[pos..], read_address);
            pos += put_u16(&mut buf[pos..], read_quantity);
            pos += put_u16(&mut buf[pos..], write_address);
            pos += put_u16(&mut buf[pos..], write_quantity);
            pos += put_data(&mut buf[pos..], data)?;
        }
        Pdu::Exception(ExceptionResponse { exception, .. }) => {
            let code = exception.code();
            if code == 0 {
                return Err(Error::ExceptionCode(code));
            }
            buf[0] = fn_code | 0x80;
            pos += put_u8(&mut buf[pos..], code);
        }
    }
    debug_assert_eq!(pos, len);
    Ok(pos)
}

/// Byte count followed by the data bytes.
fn put_data(buf: &mut [u8], data: &[u8]) -> Result<usize> {
    let byte_count = u8::try_from(data.len()).map_err(|_| Error::BufferSize)?;
    let pos = put_u8(buf, byte_count);
    buf[pos..pos + data.len()].copy_from_slice(data);
    Ok(pos + data.len())
}
