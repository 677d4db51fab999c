// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use super::{Error, Result, Session, decode_adu, encode_adu};
use crate::{
    Address, Coil, Direction, Exception, ExceptionResponse, FunctionCode, MAX_PDU_LEN, Pdu,
    Quantity, Word,
    util::{bitmap_get, bitmap_set, get_u16, packed_coils_len, put_u16, u16_coil_to_bool},
};

const MAX_READ_BITS: u16 = 2000;
const MAX_READ_WORDS: u16 = 125;
const MAX_WRITE_BITS: u16 = 1968;
const MAX_WRITE_WORDS: u16 = 123;
const MAX_READ_WRITE_WORDS: u16 = 121;

/// Why a callback refused an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The data model does not implement this table.
    Unsupported,
    IllegalAddress,
    IllegalValue,
    DeviceFault,
}

impl From<AccessError> for Exception {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unsupported => Self::IllegalFunction,
            AccessError::IllegalAddress => Self::IllegalDataAddress,
            AccessError::IllegalValue => Self::IllegalDataValue,
            AccessError::DeviceFault => Self::ServerDeviceFailure,
        }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Exception::from(*self).fmt(f)
    }
}

impl std::error::Error for AccessError {}

/// The data model of a slave, accessed one item at a time.
///
/// Tables that are not overridden answer with
/// [`Exception::IllegalFunction`].
#[allow(unused_variables)]
pub trait Callbacks: Send {
    fn read_discrete_input(&mut self, address: Address) -> std::result::Result<Coil, AccessError> {
        Err(AccessError::Unsupported)
    }

    fn read_coil(&mut self, address: Address) -> std::result::Result<Coil, AccessError> {
        Err(AccessError::Unsupported)
    }

    fn write_coil(
        &mut self,
        address: Address,
        value: Coil,
    ) -> std::result::Result<(), AccessError> {
        Err(AccessError::Unsupported)
    }

    fn read_input_register(&mut self, address: Address) -> std::result::Result<Word, AccessError> {
        Err(AccessError::Unsupported)
    }

    fn read_holding_register(
        &mut self,
        address: Address,
    ) -> std::result::Result<Word, AccessError> {
        Err(AccessError::Unsupported)
    }

    fn write_holding_register(
        &mut self,
        address: Address,
        value: Word,
    ) -> std::result::Result<(), AccessError> {
        Err(AccessError::Unsupported)
    }
}

impl Session {
    /// Wait for one request and answer it.
    ///
    /// Returns `Ok(())` when nothing arrived within the ack timeout and when
    /// a frame was dropped: it was malformed, addressed to another slave or
    /// no [`Callbacks`] are installed. RTU broadcasts are executed but never
    /// answered.
    pub fn poll(&mut self) -> Result<()> {
        let cnt = self.receive()?;
        if cnt == 0 {
            return Ok(());
        }
        let Self {
            slave,
            protocol,
            backend,
            tx,
            rx,
            callbacks,
            ..
        } = self;
        let adu = match decode_adu(*protocol, &rx[..cnt], Direction::Request) {
            Ok(Some(adu)) => adu,
            Ok(None) => {
                #[cfg(feature = "log")]
                log::debug!("Dropping incomplete frame");
                return Ok(());
            }
            Err(err) => {
                #[cfg(feature = "log")]
                log::debug!("Dropping invalid frame: {err}");
                let _ = err;
                return Ok(());
            }
        };
        if !protocol.accepts(adu.unit, *slave) {
            #[cfg(feature = "log")]
            log::debug!("Ignoring request for slave {}", adu.unit);
            return Ok(());
        }
        let Some(callbacks) = callbacks.as_deref_mut() else {
            #[cfg(feature = "log")]
            log::debug!("No callbacks installed, dropping request");
            return Ok(());
        };
        let mut data = [0; MAX_PDU_LEN];
        let response = dispatch(callbacks, &adu.pdu, &mut data).unwrap_or_else(|exception| {
            #[cfg(feature = "log")]
            log::debug!("Rejecting {:?}: {exception}", adu.pdu.function());
            Pdu::Exception(ExceptionResponse {
                function: adu.pdu.function(),
                exception,
            })
        });
        if protocol.is_broadcast(adu.unit) {
            return Ok(());
        }
        let len = encode_adu(
            *protocol,
            adu.unit,
            adu.transaction_id.unwrap_or_default(),
            &response,
            Direction::Response,
            tx,
        )?;
        let frame = &tx[..len];
        #[cfg(feature = "log")]
        log::trace!("TX: {frame:02X?}");
        if backend.write(frame)? != len {
            return Err(Error::ShortWrite);
        }
        Ok(())
    }
}

/// Execute `req` against the data model and build the response in `buf`.
fn dispatch<'d>(
    callbacks: &mut dyn Callbacks,
    req: &Pdu<'_>,
    buf: &'d mut [u8],
) -> std::result::Result<Pdu<'d>, Exception> {
    let rsp = match *req {
        Pdu::ReadRequest {
            function,
            address,
            quantity,
        } => {
            let len = read(callbacks, function, address, quantity, buf)?;
            Pdu::ReadResponse {
                function,
                data: &buf[..len],
            }
        }
        Pdu::WriteSingle {
            function,
            address,
            value,
        } => {
            if function == FunctionCode::WriteSingleCoil {
                let coil = u16_coil_to_bool(value).map_err(|_| Exception::IllegalDataValue)?;
                callbacks.write_coil(address, coil)?;
            } else {
                callbacks.write_holding_register(address, value)?;
            }
            Pdu::WriteSingle {
                function,
                address,
                value,
            }
        }
        Pdu::WriteMultipleRequest {
            function,
            address,
            quantity,
            data,
        } => {
            write(callbacks, function, address, quantity, data)?;
            Pdu::WriteMultipleResponse {
                function,
                address,
                quantity,
            }
        }
        Pdu::MaskWrite {
            address,
            and_mask,
            or_mask,
        } => {
            let current = callbacks.read_holding_register(address)?;
            let value = (current & and_mask) | (or_mask & !and_mask);
            callbacks.write_holding_register(address, value)?;
            Pdu::MaskWrite {
                address,
                and_mask,
                or_mask,
            }
        }
        Pdu::ReadWriteMultipleRequest {
            read_address,
            read_quantity,
            write_address,
            write_quantity,
            data,
        } => {
            check_quantity(read_quantity, MAX_READ_WORDS)?;
            check_quantity(write_quantity, MAX_READ_WRITE_WORDS)?;
            check_range(read_address, read_quantity)?;
            write(
                callbacks,
                FunctionCode::WriteMultipleRegisters,
                write_address,
                write_quantity,
                data,
            )?;
            let len = read(
                callbacks,
                FunctionCode::ReadHoldingRegisters,
                read_address,
                read_quantity,
                buf,
            )?;
            Pdu::ReadResponse {
                function: FunctionCode::ReadWriteMultipleRegisters,
                data: &buf[..len],
            }
        }
        Pdu::ReadResponse { .. } | Pdu::WriteMultipleResponse { .. } | Pdu::Exception(_) => {
            return Err(Exception::IllegalFunction);
        }
    };
    Ok(rsp)
}

fn check_quantity(quantity: Quantity, max: u16) -> std::result::Result<(), Exception> {
    if quantity == 0 || quantity > max {
        return Err(Exception::IllegalDataValue);
    }
    Ok(())
}

fn check_range(address: Address, quantity: Quantity) -> std::result::Result<(), Exception> {
    if u32::from(address) + u32::from(quantity) > 0x1_0000 {
        return Err(Exception::IllegalDataAddress);
    }
    Ok(())
}

/// Read into `buf` and return the number of data bytes.
fn read(
    callbacks: &mut dyn Callbacks,
    function: FunctionCode,
    address: Address,
    quantity: Quantity,
    buf: &mut [u8],
) -> std::result::Result<usize, Exception> {
    if function.is_bit_access() {
        check_quantity(quantity, MAX_READ_BITS)?;
        check_range(address, quantity)?;
        let len = packed_coils_len(usize::from(quantity));
        buf[..len].fill(0);
        for i in 0..quantity {
            let value = if function == FunctionCode::ReadCoils {
                callbacks.read_coil(address + i)?
            } else {
                callbacks.read_discrete_input(address + i)?
            };
            bitmap_set(buf, usize::from(i), value);
        }
        Ok(len)
    } else {
        check_quantity(quantity, MAX_READ_WORDS)?;
        check_range(address, quantity)?;
        let mut len = 0;
        for i in 0..quantity {
            let value = if function == FunctionCode::ReadInputRegisters {
                callbacks.read_input_register(address + i)?
            } else {
                callbacks.read_holding_register(address + i)?
            };
            len += put_u16(&mut buf[len..], value);
        }
        Ok(len)
    }
}

fn write(
    callbacks: &mut dyn Callbacks,
    function: FunctionCode,
    address: Address,
    quantity: Quantity,
    data: &[u8],
) -> std::result::Result<(), Exception> {
    if function.is_bit_access() {
        check_quantity(quantity, MAX_WRITE_BITS)?;
        if data.len() != packed_coils_len(usize::from(quantity)) {
            return Err(Exception::IllegalDataValue);
        }
        check_range(address, quantity)?;
        for i in 0..quantity {
            callbacks.write_coil(address + i, bitmap_get(data, usize::from(i)))?;
        }
    } else {
        check_quantity(quantity, MAX_WRITE_WORDS)?;
        if data.len() != usize::from(quantity) * 2 {
            return Err(Exception::IllegalDataValue);
        }
        check_range(address, quantity)?;
        for (i, chunk) in (0..quantity).zip(data.chunks_exact(2)) {
            callbacks.write_holding_register(address + i, get_u16(chunk).0)?;
        }
    }
    Ok(())
}
