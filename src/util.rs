// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Big-endian primitives and bit maps.
//!
//! Every `put_*` returns the number of bytes written and every `get_*` the
//! number of bytes consumed, so that call sites can advance an offset:
//!
//! ```
//! use modbus_engine::util::{put_u8, put_u16};
//!
//! let mut buf = [0; 5];
//! let mut pos = 0;
//! pos += put_u8(&mut buf[pos..], 0x03);
//! pos += put_u16(&mut buf[pos..], 0x0010);
//! pos += put_u16(&mut buf[pos..], 0x0002);
//! assert_eq!(pos, 5);
//! assert_eq!(buf, [0x03, 0x00, 0x10, 0x00, 0x02]);
//! ```
//!
//! The slices must be large enough for the value; an undersized slice panics.

use byteorder::{BigEndian, ByteOrder};

use crate::{Coil, Error};

pub fn put_u8(buf: &mut [u8], value: u8) -> usize {
    buf[0] = value;
    1
}

pub fn get_u8(buf: &[u8]) -> (u8, usize) {
    (buf[0], 1)
}

pub fn put_u16(buf: &mut [u8], value: u16) -> usize {
    BigEndian::write_u16(buf, value);
    2
}

pub fn get_u16(buf: &[u8]) -> (u16, usize) {
    (BigEndian::read_u16(buf), 2)
}

pub fn put_u32(buf: &mut [u8], value: u32) -> usize {
    BigEndian::write_u32(buf, value);
    4
}

pub fn get_u32(buf: &[u8]) -> (u32, usize) {
    (BigEndian::read_u32(buf), 4)
}

/// Write an IEEE-754 single precision float.
pub fn put_f32(buf: &mut [u8], value: f32) -> usize {
    BigEndian::write_f32(buf, value);
    4
}

pub fn get_f32(buf: &[u8]) -> (f32, usize) {
    (BigEndian::read_f32(buf), 4)
}

/// Read bit `idx` of a LSB-first bit map.
#[must_use]
pub fn bitmap_get(bits: &[u8], idx: usize) -> bool {
    bits[idx / 8] & (1 << (idx % 8)) != 0
}

/// Set or clear bit `idx` of a LSB-first bit map.
pub fn bitmap_set(bits: &mut [u8], idx: usize, value: bool) {
    if value {
        bits[idx / 8] |= 1 << (idx % 8);
    } else {
        bits[idx / 8] &= !(1 << (idx % 8));
    }
}

/// Turn a bool into a u16 coil value
#[must_use]
pub const fn bool_to_u16_coil(state: bool) -> u16 {
    if state { 0xFF00 } else { 0x0000 }
}

/// Turn a u16 coil value into a boolean value.
pub const fn u16_coil_to_bool(coil: u16) -> Result<bool, Error> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(Error::CoilValue(coil)),
    }
}

/// Calculate the number of bytes required for a given number of coils.
#[must_use]
pub const fn packed_coils_len(bitcount: usize) -> usize {
    bitcount.div_ceil(8)
}

///  Pack coils into a byte array.
///
///  It returns the number of bytes used to pack the coils.
///  Unused bits of the last byte are cleared.
pub fn pack_coils(coils: &[Coil], bytes: &mut [u8]) -> Result<usize, Error> {
    let packed_size = packed_coils_len(coils.len());
    if bytes.len() < packed_size {
        return Err(Error::BufferSize);
    }
    bytes[..packed_size].fill(0);
    coils
        .iter()
        .enumerate()
        .for_each(|(i, b)| bitmap_set(bytes, i, *b));
    Ok(packed_size)
}

///  Unpack coils from a byte array.
pub fn unpack_coils(bytes: &[u8], count: u16, coils: &mut [Coil]) -> Result<(), Error> {
    let count = usize::from(count);
    if coils.len() < count || bytes.len() < packed_coils_len(count) {
        return Err(Error::BufferSize);
    }
    (0..count).for_each(|i| {
        coils[i] = bitmap_get(bytes, i);
    });
    Ok(())
}
