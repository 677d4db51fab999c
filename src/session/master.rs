// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Error, Result, Session, decode_adu, encode_adu};
use crate::{
    Address, Coil, Coils, Direction, Exception, ExceptionResponse, FunctionCode, Pdu, Quantity,
    Registers, Word,
    util::{bool_to_u16_coil, get_u16, packed_coils_len},
};

/// Result of a master request: the transfer itself may fail, and the slave
/// may answer with an exception.
pub type Reply<T> = Result<std::result::Result<T, Exception>>;

const MAX_READ_BITS: usize = 2000;
const MAX_READ_WORDS: usize = 125;
const MAX_WRITE_BITS: usize = 1968;
const MAX_WRITE_WORDS: usize = 123;
const MAX_READ_WRITE_WORDS: usize = 121;

fn check_quantity(quantity: usize, max: usize) -> Result<Quantity> {
    match Quantity::try_from(quantity) {
        Ok(q) if q > 0 && quantity <= max => Ok(q),
        _ => Err(Error::InvalidQuantity(quantity)),
    }
}

impl Session {
    /// Send `pdu` to the configured slave and wait for its answer.
    ///
    /// Pending input is discarded before the request is written. A request
    /// to the RTU broadcast address is not answered; it completes as soon as
    /// it was written and yields `pdu` itself.
    ///
    /// Transport errors close the backend and are returned as
    /// [`Error::Backend`].
    pub fn request<'a>(
        &'a mut self,
        pdu: &Pdu<'a>,
    ) -> Result<std::result::Result<Pdu<'a>, ExceptionResponse>> {
        let unit = self.slave;
        let transaction_id = self.next_transaction_id();
        let len = encode_adu(
            self.protocol,
            unit,
            transaction_id,
            pdu,
            Direction::Request,
            &mut self.tx,
        )?;
        self.backend.flush()?;
        self.transmit(len)?;
        if self.protocol.is_broadcast(unit) {
            return Ok(Ok(*pdu));
        }
        let cnt = self.receive()?;
        if cnt == 0 {
            #[cfg(feature = "log")]
            log::debug!("No response from slave {unit}");
            return Err(Error::Timeout);
        }
        let adu = decode_adu(self.protocol, &self.rx[..cnt], Direction::Response)?
            .ok_or(Error::InvalidFrame)?;
        if adu.unit != unit
            || adu.transaction_id.is_some_and(|id| id != transaction_id)
            || adu.pdu.function() != pdu.function()
        {
            #[cfg(feature = "log")]
            log::debug!("Unexpected response: {adu:?}");
            return Err(Error::UnexpectedResponse);
        }
        match adu.pdu {
            Pdu::Exception(ex) => Ok(Err(ex)),
            rsp => Ok(Ok(rsp)),
        }
    }

    /// Read `quantity` bits or registers with function `0x01`-`0x04`.
    ///
    /// The raw data bytes of the response are copied into `out`; returns
    /// their number.
    pub fn read_request(
        &mut self,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
        out: &mut [u8],
    ) -> Reply<usize> {
        let (max, expected) = if function.is_bit_access() {
            (MAX_READ_BITS, packed_coils_len(usize::from(quantity)))
        } else {
            (MAX_READ_WORDS, usize::from(quantity) * 2)
        };
        check_quantity(usize::from(quantity), max)?;
        if out.len() < expected {
            return Err(Error::InvalidQuantity(usize::from(quantity)));
        }
        let req = Pdu::ReadRequest {
            function,
            address,
            quantity,
        };
        match self.request(&req)? {
            Ok(Pdu::ReadResponse { data, .. }) if data.len() == expected => {
                out[..expected].copy_from_slice(data);
                Ok(Ok(expected))
            }
            Ok(_) => Err(Error::UnexpectedResponse),
            Err(ex) => Ok(Err(ex.exception)),
        }
    }

    /// Write with function `0x05`, `0x06`, `0x0F` or `0x10`.
    ///
    /// `data` holds the raw payload: the big endian value for single writes,
    /// packed coils or big endian registers otherwise. Returns the number of
    /// items written.
    pub fn write_request(
        &mut self,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
        data: &[u8],
    ) -> Reply<usize> {
        match function {
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => {
                if quantity != 1 || data.len() != 2 {
                    return Err(Error::InvalidQuantity(usize::from(quantity)));
                }
                let (value, _) = get_u16(data);
                self.write_single(function, address, value)
            }
            FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
                self.write_multiple(function, address, quantity, data)
            }
            _ => Err(crate::Error::FnCode(function.value()).into()),
        }
    }

    pub fn read_coils(&mut self, address: Address, out: &mut [Coil]) -> Reply<usize> {
        self.read_bits(FunctionCode::ReadCoils, address, out)
    }

    pub fn read_discrete_inputs(&mut self, address: Address, out: &mut [Coil]) -> Reply<usize> {
        self.read_bits(FunctionCode::ReadDiscreteInputs, address, out)
    }

    pub fn read_holding_registers(&mut self, address: Address, out: &mut [Word]) -> Reply<usize> {
        self.read_words(FunctionCode::ReadHoldingRegisters, address, out)
    }

    pub fn read_input_registers(&mut self, address: Address, out: &mut [Word]) -> Reply<usize> {
        self.read_words(FunctionCode::ReadInputRegisters, address, out)
    }

    pub fn write_single_coil(&mut self, address: Address, value: Coil) -> Reply<usize> {
        self.write_single(
            FunctionCode::WriteSingleCoil,
            address,
            bool_to_u16_coil(value),
        )
    }

    pub fn write_single_register(&mut self, address: Address, value: Word) -> Reply<usize> {
        self.write_single(FunctionCode::WriteSingleRegister, address, value)
    }

    pub fn write_multiple_coils(&mut self, address: Address, coils: &[Coil]) -> Reply<usize> {
        let quantity = check_quantity(coils.len(), MAX_WRITE_BITS)?;
        let mut buf = [0; packed_coils_len(MAX_WRITE_BITS)];
        let coils = Coils::from_bools(coils, &mut buf)?;
        self.write_multiple(
            FunctionCode::WriteMultipleCoils,
            address,
            quantity,
            coils.payload(),
        )
    }

    pub fn write_multiple_registers(&mut self, address: Address, words: &[Word]) -> Reply<usize> {
        let quantity = check_quantity(words.len(), MAX_WRITE_WORDS)?;
        let mut buf = [0; MAX_WRITE_WORDS * 2];
        let registers = Registers::from_words(words, &mut buf)?;
        self.write_multiple(
            FunctionCode::WriteMultipleRegisters,
            address,
            quantity,
            registers.payload(),
        )
    }

    /// Modify a holding register: `(current & and_mask) | (or_mask & !and_mask)`.
    pub fn mask_write_register(
        &mut self,
        address: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Reply<usize> {
        let req = Pdu::MaskWrite {
            address,
            and_mask,
            or_mask,
        };
        match self.request(&req)? {
            Ok(rsp) if rsp == req => Ok(Ok(1)),
            Ok(_) => Err(Error::UnexpectedResponse),
            Err(ex) => Ok(Err(ex.exception)),
        }
    }

    /// Write `words` and then read `out.len()` registers in one transaction.
    pub fn write_and_read_registers(
        &mut self,
        write_address: Address,
        words: &[Word],
        read_address: Address,
        out: &mut [Word],
    ) -> Reply<usize> {
        let write_quantity = check_quantity(words.len(), MAX_READ_WRITE_WORDS)?;
        let read_quantity = check_quantity(out.len(), MAX_READ_WORDS)?;
        let mut buf = [0; MAX_READ_WRITE_WORDS * 2];
        let req = Pdu::ReadWriteMultipleRequest {
            read_address,
            read_quantity,
            write_address,
            write_quantity,
            data: Registers::from_words(words, &mut buf)?.payload(),
        };
        match self.request(&req)? {
            Ok(Pdu::ReadResponse { data, .. }) if data.len() == out.len() * 2 => {
                Registers::new(data)?.copy_to(out)?;
                Ok(Ok(out.len()))
            }
            Ok(_) => Err(Error::UnexpectedResponse),
            Err(ex) => Ok(Err(ex.exception)),
        }
    }

    fn read_bits(
        &mut self,
        function: FunctionCode,
        address: Address,
        out: &mut [Coil],
    ) -> Reply<usize> {
        let quantity = check_quantity(out.len(), MAX_READ_BITS)?;
        let mut data = [0; packed_coils_len(MAX_READ_BITS)];
        match self.read_request(function, address, quantity, &mut data)? {
            Ok(len) => {
                Coils::new(&data[..len], out.len())?.copy_to(out)?;
                Ok(Ok(out.len()))
            }
            Err(ex) => Ok(Err(ex)),
        }
    }

    fn read_words(
        &mut self,
        function: FunctionCode,
        address: Address,
        out: &mut [Word],
    ) -> Reply<usize> {
        let quantity = check_quantity(out.len(), MAX_READ_WORDS)?;
        let mut data = [0; MAX_READ_WORDS * 2];
        match self.read_request(function, address, quantity, &mut data)? {
            Ok(len) => {
                Registers::new(&data[..len])?.copy_to(out)?;
                Ok(Ok(out.len()))
            }
            Err(ex) => Ok(Err(ex)),
        }
    }

    fn write_single(
        &mut self,
        function: FunctionCode,
        address: Address,
        value: Word,
    ) -> Reply<usize> {
        let req = Pdu::WriteSingle {
            function,
            address,
            value,
        };
        match self.request(&req)? {
            Ok(rsp) if rsp == req => Ok(Ok(1)),
            Ok(_) => Err(Error::UnexpectedResponse),
            Err(ex) => Ok(Err(ex.exception)),
        }
    }

    fn write_multiple(
        &mut self,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
        data: &[u8],
    ) -> Reply<usize> {
        let (max, expected) = if function.is_bit_access() {
            (MAX_WRITE_BITS, packed_coils_len(usize::from(quantity)))
        } else {
            (MAX_WRITE_WORDS, usize::from(quantity) * 2)
        };
        check_quantity(usize::from(quantity), max)?;
        if data.len() != expected {
            return Err(Error::InvalidQuantity(usize::from(quantity)));
        }
        let req = Pdu::WriteMultipleRequest {
            function,
            address,
            quantity,
            data,
        };
        let echo = Pdu::WriteMultipleResponse {
            function,
            address,
            quantity,
        };
        match self.request(&req)? {
            // The broadcast echo is the request itself.
            Ok(rsp) if rsp == echo || rsp == req => Ok(Ok(usize::from(quantity))),
            Ok(_) => Err(Error::UnexpectedResponse),
            Err(ex) => Ok(Err(ex.exception)),
        }
    }
}
