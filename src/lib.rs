// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(feature = "std", not(any(feature = "rtu", feature = "tcp"))))]
compile_error!("The `std` feature needs at least one of the `rtu` or `tcp` features");

mod codec;
mod error;
mod frame;
pub mod util;

#[cfg(feature = "std")]
pub mod backend;
#[cfg(feature = "std")]
pub mod session;

pub use codec::{MAX_PDU_LEN, decode, encode};
#[cfg(feature = "rtu")]
pub use codec::rtu;
#[cfg(feature = "tcp")]
pub use codec::tcp;
pub use error::*;
pub use frame::*;
