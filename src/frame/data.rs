// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::*;
use crate::{error::*, util::*};

/// Register data of a read or write PDU (big-endian u16 values).
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers<'d> {
    data: RawData<'d>,
}

impl<'d> Registers<'d> {
    /// View `data` as registers; its length must be even.
    pub fn new(data: &'d [u8]) -> Result<Self, Error> {
        if data.len() % 2 != 0 {
            return Err(Error::BufferSize);
        }
        Ok(Self { data })
    }

    /// Pack words into `target`.
    pub fn from_words(words: &[Word], target: &'d mut [u8]) -> Result<Self, Error> {
        let len = words.len() * 2;
        if len > target.len() {
            return Err(Error::BufferSize);
        }
        let mut pos = 0;
        for w in words {
            pos += put_u16(&mut target[pos..], *w);
        }
        Ok(Self {
            data: &target[..len],
        })
    }

    /// Quantity of registers
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len() / 2
    }

    ///  Returns `true` if the container has no items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a specific register.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<Word> {
        let start = idx.checked_mul(2)?;
        self.data.get(start..start + 2).map(|b| get_u16(b).0)
    }

    /// Copy into `out`, which must hold at least `len()` items.
    pub fn copy_to(&self, out: &mut [Word]) -> Result<(), Error> {
        if out.len() < self.len() {
            return Err(Error::BufferSize);
        }
        for (dst, chunk) in out.iter_mut().zip(self.data.chunks_exact(2)) {
            *dst = get_u16(chunk).0;
        }
        Ok(())
    }

    #[must_use]
    pub const fn payload(&self) -> &'d [u8] {
        self.data
    }
}

/// Register iterator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistersIter<'d> {
    cnt: usize,
    registers: Registers<'d>,
}

impl Iterator for RegistersIter<'_> {
    type Item = Word;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.registers.get(self.cnt);
        self.cnt += 1;
        result
    }
}

impl<'d> IntoIterator for Registers<'d> {
    type Item = Word;
    type IntoIter = RegistersIter<'d>;

    fn into_iter(self) -> Self::IntoIter {
        RegistersIter {
            cnt: 0,
            registers: self,
        }
    }
}
