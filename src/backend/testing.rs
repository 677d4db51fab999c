// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted port and manual clock for deterministic tests.

use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use super::{Clock, Connect, Port};

/// A clock that only advances while somebody sleeps on it.
#[derive(Debug, Clone, Default)]
pub(crate) struct ManualClock(Arc<AtomicU64>);

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Script {
    /// Bytes and the time they become readable.
    rx: VecDeque<(u64, u8)>,
    /// Frames that arrive as soon as something is written.
    replies: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    fail_read: bool,
    fail_write: bool,
    fail_close: bool,
    closed: bool,
}

/// A port whose input is scripted and whose output is recorded.
///
/// Clones share the same script.
#[derive(Debug, Clone)]
pub(crate) struct MockPort {
    script: Arc<Mutex<Script>>,
    clock: ManualClock,
}

impl MockPort {
    pub(crate) fn new(clock: ManualClock) -> Self {
        Self {
            script: Arc::default(),
            clock,
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Make `bytes` readable at time `at`.
    pub(crate) fn push_rx(&self, at: u64, bytes: &[u8]) {
        self.script().rx.extend(bytes.iter().map(|b| (at, *b)));
    }

    /// Answer the next write with `bytes`.
    pub(crate) fn push_reply(&self, bytes: &[u8]) {
        self.script().replies.push_back(bytes.to_vec());
    }

    pub(crate) fn written(&self) -> Vec<Vec<u8>> {
        self.script().written.clone()
    }

    pub(crate) fn fail_read(&self) {
        self.script().fail_read = true;
    }

    pub(crate) fn fail_write(&self) {
        self.script().fail_write = true;
    }

    pub(crate) fn fail_close(&self) {
        self.script().fail_close = true;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.script().closed
    }
}

impl Port for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let now = self.clock.now_ms();
        let mut script = self.script();
        if script.fail_read {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "read failed"));
        }
        let mut cnt = 0;
        while cnt < buf.len() {
            match script.rx.front() {
                Some(&(at, byte)) if at <= now => {
                    buf[cnt] = byte;
                    cnt += 1;
                    script.rx.pop_front();
                }
                _ => break,
            }
        }
        Ok(cnt)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let now = self.clock.now_ms();
        let mut script = self.script();
        if script.fail_write {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        script.written.push(buf.to_vec());
        if let Some(reply) = script.replies.pop_front() {
            script.rx.extend(reply.into_iter().map(|b| (now, b)));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.script().rx.clear();
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut script = self.script();
        if script.fail_close {
            return Err(io::Error::other("close failed"));
        }
        script.closed = true;
        Ok(())
    }
}

/// Hands out clones of one [`MockPort`].
pub(crate) struct MockConnector {
    port: MockPort,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    pub(crate) fn new(clock: ManualClock) -> Self {
        Self {
            port: MockPort::new(clock),
            connects: Arc::default(),
        }
    }

    pub(crate) fn connects(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.connects)
    }
}

impl Connect for MockConnector {
    fn connect(&mut self) -> io::Result<Box<dyn Port>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.port.clone()))
    }
}
