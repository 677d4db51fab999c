// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP

use super::*;

pub use crate::frame::tcp::*;

/// Transaction id, protocol id, length and unit id.
pub const HEADER_LEN: usize = 7;

// [MODBUS MESSAGING ON TCP/IP IMPLEMENTATION GUIDE V1.0b](http://modbus.org/docs/Modbus_Messaging_Implementation_Guide_V1_0b.pdf), page 18
// "a MODBUS request needs a maximum of 256 bytes + the MBAP header size"
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PDU_LEN;

const PROTOCOL_ID: u16 = 0;

/// Encode a TCP frame into `buf` and return the number of bytes written.
pub fn encode(frame: &TcpFrame<'_>, direction: Direction, buf: &mut [u8]) -> Result<usize> {
    if buf.len() < HEADER_LEN {
        return Err(Error::BufferSize);
    }
    let pdu_len = super::encode(&frame.pdu, direction, &mut buf[HEADER_LEN..])?;
    let length = u16::try_from(pdu_len + 1).map_err(|_| Error::BufferSize)?;
    let mut pos = put_u16(buf, frame.hdr.transaction_id);
    pos += put_u16(&mut buf[pos..], PROTOCOL_ID);
    pos += put_u16(&mut buf[pos..], length);
    pos += put_u8(&mut buf[pos..], frame.hdr.unit_id);
    Ok(pos + pdu_len)
}

/// Decode a TCP frame from the start of `buf`.
///
/// Returns the frame and the length of its PDU.
pub fn decode(buf: &[u8], direction: Direction) -> Result<Option<(TcpFrame<'_>, usize)>> {
    if buf.len() <= HEADER_LEN {
        return Ok(None);
    }
    let (transaction_id, _) = get_u16(buf);
    let (protocol_id, _) = get_u16(&buf[2..]);
    if protocol_id != PROTOCOL_ID {
        #[cfg(feature = "log")]
        log::warn!("Dropping non-Modbus TCP frame (protocol id {protocol_id})");
        return Err(Error::ProtocolNotModbus(protocol_id));
    }
    let m_length = usize::from(get_u16(&buf[4..]).0);
    let unit_id = buf[6];
    let Some((pdu, pdu_len)) = super::decode(&buf[HEADER_LEN..], direction)
        .inspect_err(|_err| {
            #[cfg(feature = "log")]
            log::warn!("Failed to decode TCP {direction:?} PDU: {_err}");
        })?
    else {
        return Ok(None);
    };
    if m_length != pdu_len + 1 {
        return Err(Error::LengthMismatch(m_length, pdu_len + 1));
    }
    let hdr = Header {
        transaction_id,
        unit_id,
    };
    Ok(Some((TcpFrame { hdr, pdu }, pdu_len)))
}
