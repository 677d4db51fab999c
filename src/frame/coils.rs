// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::*;
use crate::{error::*, util::*};

/// Bit data of a read or write PDU, packed LSB first.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coils<'c> {
    data: RawData<'c>,
    quantity: usize,
}

impl<'c> Coils<'c> {
    /// View `quantity` bits of `data`.
    ///
    /// Fails if `data` is shorter than the packed length of `quantity` bits.
    pub fn new(data: &'c [u8], quantity: usize) -> Result<Self, Error> {
        if data.len() < packed_coils_len(quantity) {
            return Err(Error::BufferSize);
        }
        Ok(Self { data, quantity })
    }

    /// Pack a bool slice into `target`.
    pub fn from_bools(bools: &[Coil], target: &'c mut [u8]) -> Result<Self, Error> {
        let len = pack_coils(bools, target)?;
        Ok(Self {
            data: &target[..len],
            quantity: bools.len(),
        })
    }

    /// Quantity of coils
    #[must_use]
    pub const fn len(&self) -> usize {
        self.quantity
    }

    ///  Returns `true` if the container has no items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    /// Get a specific coil.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<Coil> {
        (idx < self.quantity).then(|| bitmap_get(self.data, idx))
    }

    /// The packed bytes.
    #[must_use]
    pub const fn payload(&self) -> &'c [u8] {
        self.data
    }

    /// Unpack into `out`, which must hold at least `len()` items.
    pub fn copy_to(&self, out: &mut [Coil]) -> Result<(), Error> {
        let count = u16::try_from(self.quantity).map_err(|_| Error::BufferSize)?;
        unpack_coils(self.data, count, out)
    }
}

/// Coils iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoilsIter<'c> {
    cnt: usize,
    coils: Coils<'c>,
}

impl Iterator for CoilsIter<'_> {
    type Item = Coil;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.coils.get(self.cnt);
        self.cnt += 1;
        result
    }
}

impl<'c> IntoIterator for Coils<'c> {
    type Item = Coil;
    type IntoIter = CoilsIter<'c>;

    fn into_iter(self) -> Self::IntoIter {
        CoilsIter {
            cnt: 0,
            coils: self,
        }
    }
}
