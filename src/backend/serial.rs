// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line (RS485) backend.

use std::{
    fmt,
    io::{self, Read as _},
    sync::Arc,
    time::Duration,
};

use serialport::{ClearBuffer, SerialPort};

pub use serialport::Parity;

use super::{Connect, Port};

/// Drives the transceiver direction pin of an RS485 line.
pub trait DirectionControl: Send + Sync {
    fn set_level(&self, pin: u32, high: bool) -> io::Result<()>;
}

/// Transceiver direction pin.
#[derive(Clone)]
pub struct Direction {
    pub pin: u32,
    /// Level that enables the driver (transmit).
    pub active_high: bool,
    pub control: Arc<dyn DirectionControl>,
}

impl fmt::Debug for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Direction")
            .field("pin", &self.pin)
            .field("active_high", &self.active_high)
            .finish_non_exhaustive()
    }
}

impl Direction {
    fn transmit(&self) -> io::Result<()> {
        self.control.set_level(self.pin, self.active_high)
    }

    fn receive(&self) -> io::Result<()> {
        self.control.set_level(self.pin, !self.active_high)
    }
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device name, e.g. `/dev/ttyUSB0`.
    pub device: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub direction: Option<Direction>,
}

impl SerialConfig {
    /// 8 data bits, no parity, no direction control.
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            parity: Parity::None,
            direction: None,
        }
    }

    #[must_use]
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

/// Opens the configured serial device.
#[derive(Debug)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl Connect for SerialConnector {
    fn connect(&mut self) -> io::Result<Box<dyn Port>> {
        let SerialConfig {
            device,
            baud_rate,
            parity,
            direction,
        } = &self.config;
        let port = serialport::new(device, *baud_rate)
            .parity(*parity)
            .timeout(Duration::ZERO)
            .open()?;
        if let Some(direction) = direction {
            direction.receive()?;
        }
        Ok(Box::new(SerialLine {
            port,
            direction: direction.clone(),
        }))
    }
}

struct SerialLine {
    port: Box<dyn SerialPort>,
    direction: Option<Direction>,
}

impl Port for SerialLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = usize::try_from(self.port.bytes_to_read()?).unwrap_or(usize::MAX);
        if available == 0 {
            return Ok(0);
        }
        let len = buf.len().min(available);
        match self.port.read(&mut buf[..len]) {
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            res => res,
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        transmit(&mut self.port, self.direction.as_ref(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Write `buf` with the driver enabled and wait until it left the line.
fn transmit<W: io::Write>(
    port: &mut W,
    direction: Option<&Direction>,
    buf: &[u8],
) -> io::Result<usize> {
    let Some(direction) = direction else {
        port.write_all(buf)?;
        return Ok(buf.len());
    };
    direction.transmit()?;
    let res = port.write_all(buf).and_then(|()| port.flush());
    direction.receive()?;
    res.map(|()| buf.len())
}
