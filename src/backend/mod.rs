// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport backends.
//!
//! A [`Backend`] owns one byte channel (a serial line, a TCP connection it
//! established itself or a socket handed over by the application) and reads
//! from it with two timeouts:
//!
//! - the *ack* timeout bounds the wait for the first byte of a reply,
//! - the *byte gap* timeout ends a frame once the line has been idle that long.
//!
//! Any I/O error closes the channel; it has to be reopened with
//! [`Backend::open`].

use std::{fmt, io, thread, time::Duration, time::Instant};

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(feature = "net")]
pub mod tcp;

#[cfg(test)]
pub(crate) mod testing;

/// Default wait for the first byte of a reply.
pub const DEFAULT_ACK_TIMEOUT_MS: u32 = 300;

/// Default idle time that ends a frame.
pub const DEFAULT_BYTE_GAP_TIMEOUT_MS: u32 = 32;

/// Sleep between two polls of an idle port.
const POLL_INTERVAL_MS: u64 = 2;

pub type Result<T> = std::result::Result<T, Error>;

/// Transport error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("backend is not open")]
    NotOpen,
    #[error("backend has no way to reopen its channel")]
    NoConnector,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// An open byte channel.
pub trait Port: Send {
    /// Read the bytes that are available without blocking.
    ///
    /// `Ok(0)` means that nothing has arrived yet.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much of `buf` as the channel accepts.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Discard all pending input.
    fn flush(&mut self) -> io::Result<()>;

    /// Release the channel.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Establishes a [`Port`].
pub trait Connect: Send {
    fn connect(&mut self) -> io::Result<Box<dyn Port>>;
}

/// Time source of the read loop.
pub trait Clock: Send {
    /// Monotonic milliseconds.
    fn now_ms(&self) -> u64;
    fn sleep_ms(&self, ms: u64);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

/// Read timeouts in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum wait for the first byte.
    pub ack_ms: u32,
    /// Maximum idle time between two bytes of a frame.
    pub byte_gap_ms: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ack_ms: DEFAULT_ACK_TIMEOUT_MS,
            byte_gap_ms: DEFAULT_BYTE_GAP_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Serial,
    TcpClient,
    AdoptedSocket,
    /// A transport supplied by the application.
    Custom,
}

/// How to reach the device.
#[derive(Debug)]
pub enum BackendConfig {
    #[cfg(feature = "serial")]
    Serial(serial::SerialConfig),
    #[cfg(feature = "net")]
    TcpClient(tcp::TcpConfig),
    /// An already connected socket; the backend takes ownership.
    #[cfg(feature = "net")]
    AdoptedSocket(std::net::TcpStream),
}

enum State {
    Closed,
    Open(Box<dyn Port>),
}

/// A byte channel with frame synchronisation.
pub struct Backend {
    kind: BackendKind,
    connector: Option<Box<dyn Connect>>,
    state: State,
    timeouts: Timeouts,
    clock: Box<dyn Clock>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Create a backend from its configuration.
    ///
    /// Serial and TCP client backends start closed, an adopted socket starts
    /// open.
    pub fn create(config: BackendConfig) -> Result<Self> {
        match config {
            #[cfg(feature = "serial")]
            BackendConfig::Serial(config) => Ok(Self::from_connector(
                BackendKind::Serial,
                Box::new(serial::SerialConnector::new(config)),
            )),
            #[cfg(feature = "net")]
            BackendConfig::TcpClient(config) => Ok(Self::from_connector(
                BackendKind::TcpClient,
                Box::new(tcp::TcpConnector::new(config)),
            )),
            #[cfg(feature = "net")]
            BackendConfig::AdoptedSocket(stream) => {
                let port = tcp::TcpPort::new(stream)?;
                let mut backend = Self::from_port(Box::new(port));
                backend.kind = BackendKind::AdoptedSocket;
                Ok(backend)
            }
        }
    }

    /// A closed backend that opens through `connector`.
    #[must_use]
    pub fn from_connector(kind: BackendKind, connector: Box<dyn Connect>) -> Self {
        Self {
            kind,
            connector: Some(connector),
            state: State::Closed,
            timeouts: Timeouts::default(),
            clock: Box::new(SystemClock::default()),
        }
    }

    /// An open backend over `port` that cannot be reopened once closed.
    #[must_use]
    pub fn from_port(port: Box<dyn Port>) -> Self {
        Self {
            kind: BackendKind::Custom,
            connector: None,
            state: State::Open(port),
            timeouts: Timeouts::default(),
            clock: Box::new(SystemClock::default()),
        }
    }

    /// Replace the time source of the read loop.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Takes effect on the next [`read`](Self::read).
    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    pub fn configure(&mut self, ack_ms: u32, byte_gap_ms: u32) {
        self.set_timeouts(Timeouts {
            ack_ms,
            byte_gap_ms,
        });
    }

    /// Open the channel. Opening an open backend does nothing.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let connector = self.connector.as_mut().ok_or(Error::NoConnector)?;
        let port = connector.connect().inspect_err(|_err| {
            #[cfg(feature = "log")]
            log::warn!("Failed to open {:?} backend: {_err}", self.kind);
        })?;
        #[cfg(feature = "log")]
        log::debug!("Opened {:?} backend", self.kind);
        self.state = State::Open(port);
        Ok(())
    }

    /// Close the channel. Closing a closed backend does nothing.
    ///
    /// If the channel fails to close it is still considered open.
    pub fn close(&mut self) -> Result<()> {
        if let State::Open(port) = &mut self.state {
            port.close()?;
            #[cfg(feature = "log")]
            log::debug!("Closed {:?} backend", self.kind);
        }
        self.state = State::Closed;
        Ok(())
    }

    /// Read one frame into `buf`.
    ///
    /// Waits up to the ack timeout for the first byte and then collects bytes
    /// until the line stays idle for longer than the byte gap timeout or `buf`
    /// is full. Returns the number of bytes read, `0` if nothing arrived.
    ///
    /// On an I/O error the backend is closed; bytes read so far remain in
    /// `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let State::Open(port) = &mut self.state else {
            return Err(Error::NotOpen);
        };
        let Timeouts {
            ack_ms,
            byte_gap_ms,
        } = self.timeouts;
        let mut pos = 0;
        let mut last = self.clock.now_ms();
        while pos < buf.len() {
            match port.read(&mut buf[pos..]) {
                Ok(0) => {}
                Ok(cnt) => {
                    pos += cnt;
                    last = self.clock.now_ms();
                    continue;
                }
                Err(err) => return Err(self.fail(err)),
            }
            self.clock.sleep_ms(POLL_INTERVAL_MS);
            let limit = if pos == 0 { ack_ms } else { byte_gap_ms };
            if self.clock.now_ms().saturating_sub(last) > u64::from(limit) {
                break;
            }
        }
        Ok(pos)
    }

    /// Write `buf` in a single pass and return the number of bytes accepted.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let State::Open(port) = &mut self.state else {
            return Err(Error::NotOpen);
        };
        match port.write(buf) {
            Ok(cnt) => Ok(cnt),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Discard pending input.
    pub fn flush(&mut self) -> Result<()> {
        let State::Open(port) = &mut self.state else {
            return Err(Error::NotOpen);
        };
        match port.flush() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn fail(&mut self, err: io::Error) -> Error {
        #[cfg(feature = "log")]
        log::warn!("Closing {:?} backend after I/O error: {err}", self.kind);
        if let State::Open(mut port) = std::mem::replace(&mut self.state, State::Closed) {
            if let Err(_err) = port.close() {
                #[cfg(feature = "log")]
                log::warn!("Failed to close {:?} backend: {_err}", self.kind);
            }
        }
        Error::Io(err)
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if let Err(_err) = self.close() {
            #[cfg(feature = "log")]
            log::warn!("Failed to close {:?} backend: {_err}", self.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::*, *};

    fn open_backend(clock: &ManualClock) -> (Backend, MockPort) {
        let port = MockPort::new(clock.clone());
        let backend = Backend::from_port(Box::new(port.clone())).with_clock(clock.clone());
        (backend, port)
    }

    #[test]
    fn default_timeouts() {
        let clock = ManualClock::default();
        let (backend, _) = open_backend(&clock);
        assert_eq!(backend.timeouts(), Timeouts::default());
        assert_eq!(backend.timeouts().ack_ms, 300);
        assert_eq!(backend.timeouts().byte_gap_ms, 32);
        assert_eq!(backend.kind(), BackendKind::Custom);
    }

    #[test]
    fn first_byte_just_after_ack_timeout_is_missed() {
        let clock = ManualClock::default();
        let (mut backend, port) = open_backend(&clock);
        port.push_rx(100, &[0x01]);
        backend.configure(99, 10);
        let buf = &mut [0; 8];
        assert_eq!(backend.read(buf).unwrap(), 0);
        assert!(backend.is_open());
    }

    #[test]
    fn first_byte_just_before_ack_timeout_is_read() {
        let clock = ManualClock::default();
        let (mut backend, port) = open_backend(&clock);
        port.push_rx(100, &[0x01]);
        backend.configure(101, 10);
        let buf = &mut [0; 8];
        assert_eq!(backend.read(buf).unwrap(), 1);
        assert_eq!(buf[0], 0x01);
    }

    #[test]
    fn byte_gap_ends_the_frame() {
        let clock = ManualClock::default();
        let (mut backend, port) = open_backend(&clock);
        port.push_rx(0, &[0x01, 0x02]);
        port.push_rx(20, &[0x03]);
        port.push_rx(60, &[0x04]);
        backend.configure(300, 32);
        let buf = &mut [0; 8];
        assert_eq!(backend.read(buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0x01, 0x02, 0x03]);

        assert_eq!(backend.read(buf).unwrap(), 1);
        assert_eq!(buf[0], 0x04);
    }

    #[test]
    fn full_buffer_ends_the_frame() {
        let clock = ManualClock::default();
        let (mut backend, port) = open_backend(&clock);
        port.push_rx(0, &[1, 2, 3, 4, 5]);
        let buf = &mut [0; 3];
        assert_eq!(backend.read(buf).unwrap(), 3);
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn read_error_closes_the_backend() {
        let clock = ManualClock::default();
        let (mut backend, port) = open_backend(&clock);
        port.fail_read();
        let buf = &mut [0; 8];
        assert!(matches!(backend.read(buf), Err(Error::Io(_))));
        assert!(!backend.is_open());
        assert!(port.is_closed());
        assert!(matches!(backend.read(buf), Err(Error::NotOpen)));
    }

    #[test]
    fn read_error_closes_the_backend_even_if_close_fails() {
        let clock = ManualClock::default();
        let (mut backend, port) = open_backend(&clock);
        port.fail_read();
        port.fail_close();
        let buf = &mut [0; 8];
        let Err(Error::Io(err)) = backend.read(buf) else {
            panic!("read must fail");
        };
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(!backend.is_open());
        assert!(!port.is_closed());
        assert!(matches!(backend.read(buf), Err(Error::NotOpen)));
    }

    #[test]
    fn write_error_closes_the_backend() {
        let clock = ManualClock::default();
        let (mut backend, port) = open_backend(&clock);
        port.fail_write();
        assert!(matches!(backend.write(&[1, 2]), Err(Error::Io(_))));
        assert!(!backend.is_open());
    }

    #[test]
    fn closed_backend_fails_fast() {
        let clock = ManualClock::default();
        let (mut backend, _) = open_backend(&clock);
        backend.close().unwrap();
        backend.close().unwrap();
        assert!(matches!(backend.write(&[1]), Err(Error::NotOpen)));
        assert!(matches!(backend.flush(), Err(Error::NotOpen)));
        assert!(matches!(backend.read(&mut [0; 1]), Err(Error::NotOpen)));
        assert!(matches!(backend.open(), Err(Error::NoConnector)));
    }

    #[test]
    fn flush_discards_pending_input() {
        let clock = ManualClock::default();
        let (mut backend, port) = open_backend(&clock);
        port.push_rx(0, &[0xAA, 0xBB]);
        backend.flush().unwrap();
        backend.configure(10, 10);
        assert_eq!(backend.read(&mut [0; 4]).unwrap(), 0);
    }

    #[test]
    fn reopen_through_connector() {
        let clock = ManualClock::default();
        let connector = MockConnector::new(clock.clone());
        let connects = connector.connects();
        let mut backend = Backend::from_connector(BackendKind::Serial, Box::new(connector))
            .with_clock(clock);
        assert!(!backend.is_open());
        assert!(matches!(backend.write(&[1]), Err(Error::NotOpen)));
        backend.open().unwrap();
        backend.open().unwrap();
        assert_eq!(connects.load(std::sync::atomic::Ordering::SeqCst), 1);
        backend.close().unwrap();
        backend.open().unwrap();
        assert_eq!(connects.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(backend.write(&[1, 2, 3]).unwrap(), 3);
    }

    #[test]
    fn drop_closes_the_port() {
        let clock = ManualClock::default();
        let (backend, port) = open_backend(&clock);
        drop(backend);
        assert!(port.is_closed());
    }
}
