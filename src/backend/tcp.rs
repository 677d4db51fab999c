// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP client and adopted socket backends.

use std::{
    io::{self, Read as _, Write as _},
    net::{Shutdown, TcpStream},
};

use super::{Connect, Port};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
}

impl TcpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Connects to the configured host.
#[derive(Debug)]
pub struct TcpConnector {
    config: TcpConfig,
}

impl TcpConnector {
    #[must_use]
    pub const fn new(config: TcpConfig) -> Self {
        Self { config }
    }
}

impl Connect for TcpConnector {
    fn connect(&mut self) -> io::Result<Box<dyn Port>> {
        let TcpConfig { host, port } = &self.config;
        let stream = TcpStream::connect((host.as_str(), *port))?;
        Ok(Box::new(TcpPort::new(stream)?))
    }
}

/// A connected socket in non-blocking mode.
#[derive(Debug)]
pub struct TcpPort {
    stream: TcpStream,
}

impl TcpPort {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

fn peer_closed() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer")
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Port for TcpPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Ok(0) => Err(peer_closed()),
            Ok(cnt) => Ok(cnt),
            Err(err) if is_transient(&err) => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream.write(buf) {
            Err(err) if is_transient(&err) => Ok(0),
            res => res,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut scratch = [0; 256];
        loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => return Err(peer_closed()),
                Ok(_) => {}
                Err(err) if is_transient(&err) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read as _, Write as _},
        net::TcpListener,
        thread,
        time::Duration,
    };

    use super::*;
    use crate::backend::{Backend, BackendConfig, BackendKind, Error};

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn client_reads_and_writes() {
        let (listener, port) = listener();
        let mut backend =
            Backend::create(BackendConfig::TcpClient(TcpConfig::new("127.0.0.1", port))).unwrap();
        assert_eq!(backend.kind(), BackendKind::TcpClient);
        assert!(!backend.is_open());
        backend.open().unwrap();
        let (mut server, _) = listener.accept().unwrap();

        server.write_all(&[0x01, 0x02, 0x03]).unwrap();
        let buf = &mut [0; 16];
        assert_eq!(backend.read(buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0x01, 0x02, 0x03]);

        assert_eq!(backend.write(&[0xAA, 0xBB]).unwrap(), 2);
        let rx = &mut [0; 2];
        server.read_exact(rx).unwrap();
        assert_eq!(rx, &[0xAA, 0xBB]);
    }

    #[test]
    fn peer_close_closes_the_backend() {
        let (listener, port) = listener();
        let mut backend =
            Backend::create(BackendConfig::TcpClient(TcpConfig::new("127.0.0.1", port))).unwrap();
        backend.open().unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(server);

        let buf = &mut [0; 16];
        assert!(matches!(backend.read(buf), Err(Error::Io(_))));
        assert!(!backend.is_open());

        // A client backend can reconnect.
        backend.open().unwrap();
        assert!(backend.is_open());
    }

    #[test]
    fn flush_discards_pending_input() {
        let (listener, port) = listener();
        let mut backend =
            Backend::create(BackendConfig::TcpClient(TcpConfig::new("127.0.0.1", port))).unwrap();
        backend.open().unwrap();
        let (mut server, _) = listener.accept().unwrap();
        server.write_all(&[0x01, 0x02]).unwrap();
        thread::sleep(Duration::from_millis(50));

        backend.flush().unwrap();
        backend.configure(20, 5);
        assert_eq!(backend.read(&mut [0; 4]).unwrap(), 0);
    }

    #[test]
    fn adopted_socket_starts_open_and_cannot_reopen() {
        let (listener, port) = listener();
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let mut backend = Backend::create(BackendConfig::AdoptedSocket(stream)).unwrap();
        assert_eq!(backend.kind(), BackendKind::AdoptedSocket);
        assert!(backend.is_open());

        server.write_all(&[0x42]).unwrap();
        let buf = &mut [0; 4];
        assert_eq!(backend.read(buf).unwrap(), 1);

        backend.close().unwrap();
        assert!(!backend.is_open());
        assert!(matches!(backend.open(), Err(Error::NoConnector)));
    }

    #[test]
    fn connection_refused() {
        let (listener, port) = listener();
        drop(listener);
        let mut backend =
            Backend::create(BackendConfig::TcpClient(TcpConfig::new("127.0.0.1", port))).unwrap();
        assert!(matches!(backend.open(), Err(Error::Io(_))));
        assert!(!backend.is_open());
    }
}
