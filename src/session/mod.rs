// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master and slave sessions over a [`Backend`].
//!
//! A [`Session`] owns its backend. In the master role it runs synchronous
//! request/response cycles, see [`Session::request`] and the typed wrappers
//! around it. In the slave role [`Session::poll`] handles one request per call
//! using the installed [`Callbacks`].

use crate::{
    Direction, Pdu, SlaveId,
    backend::{self, Backend, BackendKind, Timeouts},
};

mod master;
mod slave;

pub use self::{
    master::Reply,
    slave::{AccessError, Callbacks},
};

/// Scratch buffer size, large enough for the biggest RTU and TCP frame.
const BUF_LEN: usize = 260;

/// Default slave address.
pub const DEFAULT_SLAVE: SlaveId = 1;

pub type Result<T> = std::result::Result<T, Error>;

/// Session error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Backend(#[from] backend::Error),
    #[error("no response")]
    Timeout,
    #[error("incomplete or unexpected frame")]
    InvalidFrame,
    #[error(transparent)]
    Codec(#[from] crate::Error),
    #[error("response does not match the request")]
    UnexpectedResponse,
    #[error("invalid quantity: {0}")]
    InvalidQuantity(usize),
    #[error("frame was only partially written")]
    ShortWrite,
}

impl Error {
    /// The request got no usable response: nothing arrived or the frame
    /// failed validation.
    #[must_use]
    pub const fn is_no_response(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::InvalidFrame | Self::Codec(_) | Self::UnexpectedResponse
        )
    }
}

/// Framing used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    #[cfg(feature = "rtu")]
    Rtu,
    #[cfg(feature = "tcp")]
    Tcp,
}

impl Protocol {
    /// RTU on serial lines and custom transports, TCP on sockets.
    #[must_use]
    pub const fn for_backend(kind: BackendKind) -> Self {
        match kind {
            #[cfg(feature = "tcp")]
            BackendKind::TcpClient | BackendKind::AdoptedSocket => Self::Tcp,
            #[cfg(feature = "rtu")]
            _ => Self::Rtu,
            #[cfg(not(feature = "rtu"))]
            _ => Self::Tcp,
        }
    }

    /// Whether a slave with address `own` handles a request sent to `unit`.
    const fn accepts(self, unit: SlaveId, own: SlaveId) -> bool {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => unit == own || unit == crate::BROADCAST,
            #[cfg(feature = "tcp")]
            Self::Tcp => unit == own || unit == crate::BROADCAST || unit == 0xFF,
        }
    }

    /// Requests to `unit` are never answered.
    const fn is_broadcast(self, unit: SlaveId) -> bool {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => unit == crate::BROADCAST,
            #[cfg(feature = "tcp")]
            Self::Tcp => {
                let _ = unit;
                false
            }
        }
    }
}

/// A decoded frame of either protocol.
#[derive(Debug, Clone, Copy)]
struct Adu<'a> {
    unit: SlaveId,
    /// Only present for TCP.
    transaction_id: Option<u16>,
    pdu: Pdu<'a>,
}

fn encode_adu(
    protocol: Protocol,
    unit: SlaveId,
    transaction_id: u16,
    pdu: &Pdu<'_>,
    direction: Direction,
    buf: &mut [u8],
) -> std::result::Result<usize, crate::Error> {
    match protocol {
        #[cfg(feature = "rtu")]
        Protocol::Rtu => {
            let _ = transaction_id;
            let frame = crate::rtu::RtuFrame {
                slave: unit,
                pdu: *pdu,
            };
            crate::rtu::encode(&frame, direction, buf)
        }
        #[cfg(feature = "tcp")]
        Protocol::Tcp => {
            let frame = crate::tcp::TcpFrame {
                hdr: crate::tcp::Header {
                    transaction_id,
                    unit_id: unit,
                },
                pdu: *pdu,
            };
            crate::tcp::encode(&frame, direction, buf)
        }
    }
}

fn decode_adu(
    protocol: Protocol,
    buf: &[u8],
    direction: Direction,
) -> std::result::Result<Option<Adu<'_>>, crate::Error> {
    let adu = match protocol {
        #[cfg(feature = "rtu")]
        Protocol::Rtu => crate::rtu::decode(buf, direction)?.map(|(frame, _)| Adu {
            unit: frame.slave,
            transaction_id: None,
            pdu: frame.pdu,
        }),
        #[cfg(feature = "tcp")]
        Protocol::Tcp => crate::tcp::decode(buf, direction)?.map(|(frame, _)| Adu {
            unit: frame.hdr.unit_id,
            transaction_id: Some(frame.hdr.transaction_id),
            pdu: frame.pdu,
        }),
    };
    Ok(adu)
}

/// A Modbus session bound to one backend.
pub struct Session {
    slave: SlaveId,
    protocol: Protocol,
    transaction_id: u16,
    backend: Backend,
    tx: [u8; BUF_LEN],
    rx: [u8; BUF_LEN],
    callbacks: Option<Box<dyn Callbacks>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("slave", &self.slave)
            .field("protocol", &self.protocol)
            .field("transaction_id", &self.transaction_id)
            .field("backend", &self.backend)
            .field("callbacks", &self.callbacks.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Take ownership of `backend`.
    ///
    /// The slave address defaults to `1` and the protocol follows the kind
    /// of the backend.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self {
            slave: DEFAULT_SLAVE,
            protocol: Protocol::for_backend(backend.kind()),
            transaction_id: 0,
            backend,
            tx: [0; BUF_LEN],
            rx: [0; BUF_LEN],
            callbacks: None,
        }
    }

    /// Address of the remote slave (master role) or of this device (slave
    /// role).
    pub fn set_slave(&mut self, slave: SlaveId) {
        self.slave = slave;
    }

    #[must_use]
    pub const fn slave(&self) -> SlaveId {
        self.slave
    }

    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn set_timeouts(&mut self, ack_ms: u32, byte_gap_ms: u32) {
        self.backend.configure(ack_ms, byte_gap_ms);
    }

    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        self.backend.timeouts()
    }

    /// Install the slave callbacks used by [`poll`](Self::poll).
    pub fn set_callbacks(&mut self, callbacks: impl Callbacks + 'static) {
        self.callbacks = Some(Box::new(callbacks));
    }

    pub fn clear_callbacks(&mut self) -> Option<Box<dyn Callbacks>> {
        self.callbacks.take()
    }

    #[must_use]
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut Backend {
        &mut self.backend
    }

    pub fn connect(&mut self) -> Result<()> {
        Ok(self.backend.open()?)
    }

    pub fn disconnect(&mut self) -> Result<()> {
        Ok(self.backend.close()?)
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.backend.is_open()
    }

    /// Write raw bytes.
    pub fn send(&mut self, buf: &[u8]) -> Result<usize> {
        #[cfg(feature = "log")]
        log::trace!("TX: {buf:02X?}");
        Ok(self.backend.write(buf)?)
    }

    /// Read one raw frame, see [`Backend::read`].
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let cnt = self.backend.read(buf)?;
        #[cfg(feature = "log")]
        log::trace!("RX: {:02X?}", &buf[..cnt]);
        Ok(cnt)
    }

    /// Discard pending input.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.backend.flush()?)
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Write the first `len` bytes of the transmit buffer.
    fn transmit(&mut self, len: usize) -> Result<()> {
        let frame = &self.tx[..len];
        #[cfg(feature = "log")]
        log::trace!("TX: {frame:02X?}");
        if self.backend.write(frame)? != len {
            return Err(Error::ShortWrite);
        }
        Ok(())
    }

    /// Read one frame into the receive buffer.
    fn receive(&mut self) -> Result<usize> {
        let cnt = self.backend.read(&mut self.rx)?;
        #[cfg(feature = "log")]
        if cnt > 0 {
            log::trace!("RX: {:02X?}", &self.rx[..cnt]);
        }
        Ok(cnt)
    }
}

#[cfg(all(test, feature = "rtu", feature = "tcp"))]
mod tests {
    use super::*;
    use crate::backend::{Clock as _, testing::*};

    pub(super) fn mock_session() -> (Session, MockPort, ManualClock) {
        let clock = ManualClock::default();
        let port = MockPort::new(clock.clone());
        let backend = Backend::from_port(Box::new(port.clone())).with_clock(clock.clone());
        (Session::new(backend), port, clock)
    }

    #[test]
    fn defaults() {
        let (session, _, _) = mock_session();
        assert_eq!(session.slave(), 1);
        assert_eq!(session.protocol(), Protocol::Rtu);
        assert_eq!(session.timeouts(), Timeouts::default());
        assert!(session.is_connected());
    }

    #[test]
    fn protocol_follows_backend_kind() {
        assert_eq!(Protocol::for_backend(BackendKind::Serial), Protocol::Rtu);
        assert_eq!(Protocol::for_backend(BackendKind::Custom), Protocol::Rtu);
        assert_eq!(Protocol::for_backend(BackendKind::TcpClient), Protocol::Tcp);
        assert_eq!(
            Protocol::for_backend(BackendKind::AdoptedSocket),
            Protocol::Tcp
        );
    }

    #[test]
    fn unit_filter() {
        assert!(Protocol::Rtu.accepts(1, 1));
        assert!(Protocol::Rtu.accepts(0, 1));
        assert!(!Protocol::Rtu.accepts(0xFF, 1));
        assert!(!Protocol::Rtu.accepts(2, 1));
        assert!(Protocol::Tcp.accepts(0xFF, 1));
        assert!(Protocol::Tcp.accepts(0, 1));
        assert!(!Protocol::Tcp.accepts(2, 1));
        assert!(Protocol::Rtu.is_broadcast(0));
        assert!(!Protocol::Tcp.is_broadcast(0));
    }

    #[test]
    fn raw_send_and_recv() {
        let (mut session, port, _) = mock_session();
        port.push_reply(&[0xCA, 0xFE]);
        assert_eq!(session.send(&[0x01, 0x02]).unwrap(), 2);
        let buf = &mut [0; 8];
        assert_eq!(session.recv(buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0xCA, 0xFE]);
        assert_eq!(port.written(), vec![vec![0x01, 0x02]]);
    }

    #[test]
    fn raw_recv_times_out_with_zero() {
        let (mut session, _, clock) = mock_session();
        session.set_timeouts(50, 10);
        assert_eq!(session.recv(&mut [0; 8]).unwrap(), 0);
        assert!(clock.now_ms() > 50);
    }

    #[test]
    fn disconnect_then_fail_fast() {
        let (mut session, port, _) = mock_session();
        session.disconnect().unwrap();
        assert!(port.is_closed());
        assert!(!session.is_connected());
        assert!(matches!(
            session.send(&[1]),
            Err(Error::Backend(backend::Error::NotOpen))
        ));
        assert!(matches!(
            session.connect(),
            Err(Error::Backend(backend::Error::NoConnector))
        ));
    }

    #[test]
    fn no_response_errors() {
        assert!(Error::Timeout.is_no_response());
        assert!(Error::Codec(crate::Error::Crc(0, 1)).is_no_response());
        assert!(!Error::ShortWrite.is_no_response());
        assert!(!Error::Backend(backend::Error::NotOpen).is_no_response());
    }

    #[cfg(feature = "net")]
    mod tcp_round_trip {
        use std::{net::TcpListener, thread};

        use super::*;
        use crate::{
            backend::{BackendConfig, tcp::TcpConfig},
            session::slave::tests::Memory,
        };

        #[test]
        fn master_and_slave_over_loopback() {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let memory = Memory::default();
            memory.set_holding(4, 0x0012);

            let slave_memory = memory.clone();
            let slave = thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                let backend = Backend::create(BackendConfig::AdoptedSocket(stream)).unwrap();
                let mut session = Session::new(backend);
                session.set_callbacks(slave_memory);
                // Runs until the master hangs up.
                while session.poll().is_ok() {}
            });

            let backend =
                Backend::create(BackendConfig::TcpClient(TcpConfig::new("127.0.0.1", port)))
                    .unwrap();
            let mut master = Session::new(backend);
            assert_eq!(master.protocol(), Protocol::Tcp);
            master.connect().unwrap();

            assert_eq!(master.write_single_register(3, 0xABCD).unwrap(), Ok(1));
            let out = &mut [0; 2];
            assert_eq!(master.read_holding_registers(3, out).unwrap(), Ok(2));
            assert_eq!(out, &[0xABCD, 0x0012]);

            assert_eq!(master.mask_write_register(4, 0xF2, 0x25).unwrap(), Ok(1));
            assert_eq!(memory.holding(4), 0x17);

            assert_eq!(
                master.read_holding_registers(0xFFFF, &mut [0; 2]).unwrap(),
                Err(crate::Exception::IllegalDataAddress)
            );

            drop(master);
            slave.join().unwrap();
        }
    }
}
