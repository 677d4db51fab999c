// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU

use super::*;

pub use crate::frame::rtu::*;

// [MODBUS over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a MODBUS RTU frame is 256 bytes."
pub const MAX_FRAME_LEN: usize = 256;

/// Slave address, the smallest PDU and the CRC.
pub const MIN_FRAME_LEN: usize = 1 + 2 + 2;

const CRC_LEN: usize = 2;

/// Encode an RTU frame into `buf` and return the number of bytes written.
pub fn encode(frame: &RtuFrame<'_>, direction: Direction, buf: &mut [u8]) -> Result<usize> {
    if buf.is_empty() {
        return Err(Error::BufferSize);
    }
    let mut pos = put_u8(buf, frame.slave);
    pos += super::encode(&frame.pdu, direction, &mut buf[pos..])?;
    if buf.len() < pos + CRC_LEN {
        return Err(Error::BufferSize);
    }
    let crc = crc16(&buf[..pos]);
    pos += put_u16(&mut buf[pos..], crc);
    Ok(pos)
}

/// Decode an RTU frame from the start of `buf`.
///
/// Returns the frame and the length of its PDU. Bytes after the CRC are
/// ignored. The slave address is not checked.
pub fn decode(buf: &[u8], direction: Direction) -> Result<Option<(RtuFrame<'_>, usize)>> {
    if buf.len() < MIN_FRAME_LEN {
        return Ok(None);
    }
    let slave = buf[0];
    let Some((pdu, pdu_len)) = super::decode(&buf[1..buf.len() - CRC_LEN], direction)
        .inspect_err(|_err| {
            #[cfg(feature = "log")]
            log::warn!("Failed to decode RTU {direction:?} PDU: {_err}");
        })?
    else {
        return Ok(None);
    };
    let adu_len = 1 + pdu_len;
    let residue = crc16(&buf[..adu_len + CRC_LEN]);
    if residue != 0 {
        let received = get_u16(&buf[adu_len..]).0;
        #[cfg(feature = "log")]
        log::warn!("Invalid CRC: received = 0x{received:0>4X}, residue = 0x{residue:0>4X}");
        return Err(Error::Crc(received, residue));
    }
    Ok(Some((RtuFrame { slave, pdu }, pdu_len)))
}

/// Calculate the CRC (Cyclic Redundancy Check) sum.
///
/// The result is byte-swapped: written big-endian it puts the low byte first,
/// as RTU requires. Computed over a frame including its CRC it yields `0`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            // if we followed clippy's suggestion to move out the crc >>= 1, the condition may not be met any more
            // the recommended action therefore makes no sense and it is better to allow this lint
            #[allow(clippy::branches_sharing_code)]
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc.rotate_right(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_HOLDING_REQUEST: &[u8] = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];

    #[test]
    fn test_calc_crc16() {
        let msg = &[0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(crc16(msg), 0xB663);

        let msg = &[0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(crc16(msg), 0xFBF9);

        assert_eq!(crc16(READ_HOLDING_REQUEST), 0);
    }

    #[test]
    fn encode_read_holding_registers_request() {
        let frame = RtuFrame {
            slave: 1,
            pdu: Pdu::ReadRequest {
                function: FunctionCode::ReadHoldingRegisters,
                address: 0,
                quantity: 2,
            },
        };
        let buf = &mut [0; MAX_FRAME_LEN];
        let len = encode(&frame, Direction::Request, buf).unwrap();
        assert_eq!(&buf[..len], READ_HOLDING_REQUEST);

        assert_eq!(
            encode(&frame, Direction::Request, &mut [0; 7]),
            Err(Error::BufferSize)
        );
    }

    #[test]
    fn encode_write_single_register_response() {
        let frame = RtuFrame {
            slave: 0x12,
            pdu: Pdu::WriteSingle {
                function: FunctionCode::WriteSingleRegister,
                address: 0x2222,
                value: 0xABCD,
            },
        };
        let buf = &mut [0; MAX_FRAME_LEN];
        let len = encode(&frame, Direction::Response, buf).unwrap();
        assert_eq!(
            &buf[..len],
            &[0x12, 0x06, 0x22, 0x22, 0xAB, 0xCD, 0x9F, 0xBE]
        );
    }

    #[test]
    fn decode_read_holding_registers_request() {
        let (frame, pdu_len) = decode(READ_HOLDING_REQUEST, Direction::Request)
            .unwrap()
            .unwrap();
        assert_eq!(pdu_len, 5);
        assert_eq!(
            frame,
            RtuFrame {
                slave: 1,
                pdu: Pdu::ReadRequest {
                    function: FunctionCode::ReadHoldingRegisters,
                    address: 0,
                    quantity: 2,
                }
            }
        );
    }

    #[test]
    fn decode_read_holding_registers_response() {
        let buf = &[0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14, 0xDA, 0x3E];
        let (frame, _) = decode(buf, Direction::Response).unwrap().unwrap();
        let Pdu::ReadResponse { data, .. } = frame.pdu else {
            unreachable!()
        };
        let regs = Registers::new(data).unwrap();
        assert_eq!(regs.get(0), Some(10));
        assert_eq!(regs.get(1), Some(20));
    }

    #[test]
    fn decode_exception_response() {
        let buf = &[0x01, 0x83, 0x02, 0xC0, 0xF1];
        let (frame, pdu_len) = decode(buf, Direction::Response).unwrap().unwrap();
        assert_eq!(pdu_len, 2);
        assert_eq!(
            frame.pdu,
            Pdu::Exception(ExceptionResponse {
                function: FunctionCode::ReadHoldingRegisters,
                exception: Exception::IllegalDataAddress,
            })
        );
    }

    #[test]
    fn extract_partly_received_rtu_frame() {
        let buf = &[
            0x12, // slave address
            0x02, // function code
            0x03, // byte count
            0x00, // data
            0x00, // data
            0x00, // data
            0x00, // CRC first byte
                  // missing crc second byte
        ];
        assert_eq!(decode(buf, Direction::Response), Ok(None));
        assert_eq!(decode(&buf[..4], Direction::Response), Ok(None));
    }

    #[test]
    fn extract_usual_rtu_response_frame() {
        let buf = &[
            0x01, // slave address
            0x03, // function code
            0x04, // byte count
            0x89, //
            0x02, //
            0x42, //
            0xC7, //
            0x00, // crc
            0x9D, // crc
            0x03, // -- start of next frame
        ];
        let (frame, pdu_len) = decode(buf, Direction::Response).unwrap().unwrap();
        assert_eq!(frame.slave, 0x01);
        assert_eq!(pdu_len, 6);
    }

    #[test]
    fn invalid_crc() {
        let buf = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0C];
        assert!(matches!(
            decode(buf, Direction::Request),
            Err(Error::Crc(0xC40C, residue)) if residue != 0
        ));
    }

    #[test]
    fn unsupported_function_code_is_reported() {
        let buf = &[0x01, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            decode(buf, Direction::Request),
            Err(Error::FnCode(0xFF))
        );
    }

    #[test]
    fn any_single_bit_flip_is_rejected() {
        let mut buf = [0; 8];
        for byte in 0..READ_HOLDING_REQUEST.len() {
            for bit in 0..8 {
                buf.copy_from_slice(READ_HOLDING_REQUEST);
                buf[byte] ^= 1 << bit;
                let res = decode(&buf, Direction::Request);
                assert!(
                    !matches!(res, Ok(Some(_))),
                    "flipping bit {bit} of byte {byte} was accepted"
                );
            }
        }
    }
}
