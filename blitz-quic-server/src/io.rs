// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The UDP I/O loop: one non-blocking socket, one fixed pool of datagram
//! slots, one thread.
//!
//! Slots are addressed by index, never by pointer; a slot belongs to at
//! most one in-flight operation and returns to the free stack on every
//! completion path. When the pool runs dry the loop simply stops taking
//! receives until sends drain — that is the whole backpressure story.

use crate::{config::Config, endpoint::Endpoint};
use blitz_quic_core::crypto::tls;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    collections::VecDeque,
    io,
    net::{SocketAddr, UdpSocket},
    os::fd::AsRawFd,
    time::Instant,
};
use tracing::{debug, info, trace};

/// Every slot holds one full datagram for a standard ethernet path
pub const SLOT_LEN: usize = 1500;

/// The largest UDP payload emitted: a 1500-byte MTU minus IPv4 + UDP
/// headers
pub const MAX_DATAGRAM_LEN: usize = 1472;

/// The loop keeps at least this many slots so receives are never starved
/// outright
const MIN_POOL_SIZE: usize = 32;

struct Slot {
    buf: [u8; SLOT_LEN],
    len: usize,
    peer: Option<SocketAddr>,
}

/// A fixed pool of datagram slots with an index free-stack
struct Pool {
    slots: Vec<Slot>,
    free: Vec<u16>,
}

impl Pool {
    fn new(count: usize) -> Self {
        let count = count.clamp(MIN_POOL_SIZE, u16::MAX as usize);

        let mut slots = Vec::with_capacity(count);
        slots.resize_with(count, || Slot {
            buf: [0; SLOT_LEN],
            len: 0,
            peer: None,
        });

        Self {
            slots,
            free: (0..count as u16).rev().collect(),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn free_count(&self) -> usize {
        self.free.len()
    }

    fn alloc(&mut self) -> Option<u16> {
        self.free.pop()
    }

    fn release(&mut self, index: u16) {
        debug_assert!(!self.free.contains(&index), "slot released twice");
        self.slots[index as usize].peer = None;
        self.free.push(index);
    }

    fn slot_mut(&mut self, index: u16) -> &mut Slot {
        &mut self.slots[index as usize]
    }
}

/// The blitz QUIC endpoint bound to its socket.
///
/// `run` drives the loop forever; `poll_once` runs a single
/// wait-and-dispatch cycle, which is also the test entry point.
pub struct Server<Provider: tls::Endpoint> {
    socket: UdpSocket,
    endpoint: Endpoint<Provider>,
    pool: Pool,
    send_queue: VecDeque<u16>,
}

impl<Provider: tls::Endpoint> Server<Provider> {
    pub fn bind(config: Config, tls: Provider) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&config.bind_address.into())?;
        let socket: UdpSocket = socket.into();

        info!(addr = %socket.local_addr()?, "listening");

        let pool = Pool::new(config.pool_size);
        Ok(Self {
            socket,
            endpoint: Endpoint::new(config, tls),
            pool,
            send_queue: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn endpoint(&self) -> &Endpoint<Provider> {
        &self.endpoint
    }

    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.poll_once()?;
        }
    }

    /// One wait-dispatch cycle: wait for the socket or the earliest
    /// connection deadline, then expire, receive, assemble and send.
    pub fn poll_once(&mut self) -> io::Result<()> {
        let timeout = self.poll_timeout();
        self.wait(timeout)?;

        let now = Instant::now();
        self.endpoint.on_timeout(now);

        self.flush_sends();
        self.drain_receives(now)?;
        self.collect_transmits();
        self.flush_sends();

        Ok(())
    }

    /// Milliseconds for `poll(2)`: zero when work is already queued,
    /// otherwise the earliest connection deadline
    fn poll_timeout(&self) -> i32 {
        if self.endpoint.transmit_pending() || !self.send_queue.is_empty() {
            return 0;
        }

        match self.endpoint.next_deadline() {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                // round up so the deadline has passed when poll returns
                (remaining.as_millis() as i64 + 1).min(i32::MAX as i64) as i32
            }
            None => -1,
        }
    }

    fn wait(&self, timeout: i32) -> io::Result<()> {
        let mut fds = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        if !self.send_queue.is_empty() {
            fds.events |= libc::POLLOUT;
        }

        let rc = unsafe { libc::poll(&mut fds, 1, timeout) };
        if rc < 0 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(error);
        }
        Ok(())
    }

    fn drain_receives(&mut self, now: Instant) -> io::Result<()> {
        loop {
            let Some(index) = self.pool.alloc() else {
                debug!("buffer pool exhausted; pausing receives");
                return Ok(());
            };

            let slot = self.pool.slot_mut(index);
            match self.socket.recv_from(&mut slot.buf) {
                Ok((len, peer)) => {
                    trace!(peer = %peer, len, "received datagram");
                    self.endpoint.on_datagram(peer, &mut slot.buf[..len], now);
                    self.pool.release(index);
                    // answer promptly so slots cycle within the iteration
                    self.collect_transmits();
                    self.flush_sends();
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    self.pool.release(index);
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    self.pool.release(index);
                }
                Err(error) => {
                    self.pool.release(index);
                    return Err(error);
                }
            }
        }
    }

    fn collect_transmits(&mut self) {
        loop {
            let Some(index) = self.pool.alloc() else {
                debug!("buffer pool exhausted; transmissions stay queued");
                return;
            };

            let slot = self.pool.slot_mut(index);
            match self.endpoint.poll_transmit(&mut slot.buf[..MAX_DATAGRAM_LEN]) {
                Some((peer, len)) => {
                    slot.len = len;
                    slot.peer = Some(peer);
                    self.send_queue.push_back(index);
                }
                None => {
                    self.pool.release(index);
                    return;
                }
            }
        }
    }

    fn flush_sends(&mut self) {
        while let Some(&index) = self.send_queue.front() {
            let slot = self.pool.slot_mut(index);
            let peer = slot.peer.expect("queued sends carry an address");

            match self.socket.send_to(&slot.buf[..slot.len], peer) {
                Ok(_) => {
                    self.send_queue.pop_front();
                    self.pool.release(index);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    // transient network errors drop the datagram, not the loop
                    debug!(%error, peer = %peer, "send failed; dropping datagram");
                    self.send_queue.pop_front();
                    self.pool.release(index);
                }
            }
        }
    }
}
