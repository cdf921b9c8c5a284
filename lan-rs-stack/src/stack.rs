use crate::arp::{ArpCache, ArpEntry};
use crate::config::{NetConfig, EPHEMERAL_PORT_BASE};
use crate::driver::Driver;
use crate::error::{FatalError, LanError};
use crate::pool::{BufferPool, FrameBuf, FRAME_SIZE};
use crate::socket::{Pending, SocketHandle, SocketInfo, SocketMode, SocketTable};
use crate::stats::{bump, Counters, Stats};
use crossbeam::crossbeam_channel::{self, Receiver, Sender};
use lan_rs_packets::UDP_PAYLOAD_OFFSET;
use log::{error, trace, warn};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Largest UDP payload that fits in one frame buffer.
pub const MAX_UDP_PAYLOAD: usize = FRAME_SIZE - UDP_PAYLOAD_OFFSET;

/// What a single `poll` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The driver had no frame.
    Idle,
    /// Every buffer was busy, nothing was read from the driver.
    NoBuffer,
    /// A frame was processed and its buffer went back to the pool.
    Handled,
    /// A datagram was handed to a socket, which now owns the buffer.
    Consumed,
}

/// One network interface: its buffers, sockets, ARP cache and driver.
///
/// Every method takes `&self`, so the usual setup is an `Arc<LanStack<_>>` shared between the
/// polling task and the application tasks.
pub struct LanStack<D> {
    pub(crate) config: NetConfig,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) sockets: SocketTable,
    pub(crate) arp: ArpCache,
    pub(crate) driver: Mutex<D>,
    pub(crate) counters: Counters,
    write_failures: AtomicUsize,
    halted: Mutex<Option<FatalError>>,
    fatal_tx: Sender<FatalError>,
    fatal_rx: Receiver<FatalError>,
}

impl<D: Driver> LanStack<D> {
    pub fn new(config: NetConfig, driver: D) -> Self {
        let (fatal_tx, fatal_rx) = crossbeam_channel::unbounded();
        LanStack {
            pool: BufferPool::new(config.buffers),
            sockets: SocketTable::new(config.sockets, EPHEMERAL_PORT_BASE),
            arp: ArpCache::new(config.arp_entries, config.arp_max_age),
            driver: Mutex::new(driver),
            counters: Counters::default(),
            write_failures: AtomicUsize::new(0),
            halted: Mutex::new(None),
            fatal_tx,
            fatal_rx,
            config,
        }
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// The link counts as up once an address is configured.
    pub fn link_up(&self) -> bool {
        !self.config.ip.is_unspecified()
    }

    pub(crate) fn acquire_buffer(&self) -> Option<FrameBuf> {
        let buffer = self.pool.acquire();
        if buffer.is_none() {
            bump(&self.counters.buffer_exhausted);
            warn!("buffer pool exhausted");
        }
        buffer
    }

    /// Reads at most one frame from the driver and runs it through the ingress pipeline.
    pub fn poll(&self) -> PollOutcome {
        let mut buffer = match self.acquire_buffer() {
            Some(buffer) => buffer,
            None => return PollOutcome::NoBuffer,
        };
        let received = self.driver.lock().unwrap().receive(buffer.capacity_mut());
        match received {
            Ok(0) => PollOutcome::Idle,
            Ok(len) => {
                buffer.set_len(len);
                bump(&self.counters.frames_received);
                trace!("received {} byte frame into buffer {}", len, buffer.index());
                self.dispatch_frame(buffer)
            }
            Err(err) => {
                bump(&self.counters.driver_errors);
                warn!("driver receive failed: {}", err);
                PollOutcome::Idle
            }
        }
    }

    /// Opens a UDP socket toward `remote_ip:remote_port`. A `local_port` of 0 picks an
    /// ephemeral port. Returns `None` when every socket slot is taken.
    pub fn bind(
        &self,
        remote_ip: Ipv4Addr,
        remote_port: u16,
        local_port: u16,
        mode: SocketMode,
    ) -> Option<SocketHandle> {
        let handle = self
            .sockets
            .bind(self.config.ip, remote_ip, remote_port, local_port, mode);
        if handle.is_none() {
            bump(&self.counters.socket_exhausted);
            warn!("socket table full");
        }
        handle
    }

    /// Closes a socket, returning any unread buffer to the pool. Closing twice, or closing
    /// `None`, does nothing.
    pub fn close<H: Into<Option<SocketHandle>>>(&self, handle: H) {
        if let Some(handle) = handle.into() {
            drop(self.sockets.close(handle));
        }
    }

    pub fn change_mode(&self, handle: SocketHandle, mode: SocketMode) -> Option<SocketHandle> {
        if mode != SocketMode::READ && mode != SocketMode::WRITE {
            return None;
        }
        self.sockets.change_mode(handle, mode)
    }

    pub fn socket_info(&self, handle: SocketHandle) -> Option<SocketInfo> {
        self.sockets.info(handle)
    }

    /// Every delivery to the socket pushes its handle into `notify`, without blocking.
    /// `read_timeout` becomes the socket's wait for `read`.
    pub fn set_notify(
        &self,
        handle: SocketHandle,
        notify: Sender<SocketHandle>,
        read_timeout: Duration,
    ) -> Result<(), LanError> {
        if self.sockets.set_notify(handle, notify, read_timeout) {
            Ok(())
        } else {
            Err(LanError::StaleSocket)
        }
    }

    /// Copies the pending payload into `out`, waiting at most one short poll interval.
    /// Returns the number of bytes copied, 0 if nothing was pending.
    pub fn read_nowait(&self, handle: SocketHandle, out: &mut [u8]) -> usize {
        self.read_timeout(handle, out, self.config.read_poll_interval)
    }

    /// Like `read_nowait`, but waits up to the socket's read timeout.
    pub fn read(&self, handle: SocketHandle, out: &mut [u8]) -> usize {
        let timeout = self
            .sockets
            .read_timeout(handle)
            .unwrap_or(self.config.read_timeout);
        self.read_timeout(handle, out, timeout)
    }

    pub fn read_timeout(&self, handle: SocketHandle, out: &mut [u8], timeout: Duration) -> usize {
        match self.sockets.take_pending(handle, out.len(), timeout) {
            Pending::Ready { buffer, copy_len } => {
                let payload = &buffer.as_slice()[UDP_PAYLOAD_OFFSET..];
                let copy_len = copy_len.min(payload.len());
                out[..copy_len].copy_from_slice(&payload[..copy_len]);
                copy_len
            }
            Pending::Empty | Pending::Stale => 0,
            Pending::WrongMode => {
                warn!("read on socket {} without READ mode", handle.index());
                0
            }
        }
    }

    /// Sends `data` as one datagram to the socket's remote endpoint. May block while the next
    /// hop is resolved.
    ///
    /// Every rejected write counts toward the failure streak, whatever the cause: a stale
    /// handle, a socket without WRITE mode, an oversized payload, no free buffer, an unresolved
    /// next hop or a driver error. Each one clears the ARP cache, and too many in a row halt the
    /// stack. A successful write resets the streak.
    pub fn write(&self, handle: SocketHandle, data: &[u8]) -> Result<(), LanError> {
        if let Some(fatal) = self.halted() {
            return Err(LanError::Halted(fatal));
        }
        match self.send_datagram(handle, data) {
            Ok(()) => {
                self.write_failures.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.record_write_failure(&err);
                Err(err)
            }
        }
    }

    fn send_datagram(&self, handle: SocketHandle, data: &[u8]) -> Result<(), LanError> {
        let (local_port, remote_ip, remote_port) = self.sockets.writer(handle)?;
        if data.len() > MAX_UDP_PAYLOAD {
            return Err(LanError::PayloadTooLarge {
                len: data.len(),
                max: MAX_UDP_PAYLOAD,
            });
        }
        let mut buffer = self.acquire_buffer().ok_or(LanError::BufferExhausted)?;
        buffer.set_len(UDP_PAYLOAD_OFFSET + data.len());
        buffer.as_mut_slice()[UDP_PAYLOAD_OFFSET..].copy_from_slice(data);
        self.udp_send(&mut buffer, local_port, remote_ip, remote_port, data.len())
    }

    /// Answers the socket's pending datagram in place: the received frame is turned around
    /// and `data` replaces its payload. No buffer is allocated and no ARP lookup is made.
    pub fn reply(&self, handle: SocketHandle, data: &[u8]) -> Result<(), LanError> {
        if data.len() > MAX_UDP_PAYLOAD {
            return Err(LanError::PayloadTooLarge {
                len: data.len(),
                max: MAX_UDP_PAYLOAD,
            });
        }
        let (mut buffer, _) = self.sockets.take_for_reply(handle)?;
        self.udp_reply(&mut buffer, data)
    }

    fn record_write_failure(&self, err: &LanError) {
        bump(&self.counters.write_failures);
        self.arp.clear();
        let failures = self.write_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("write failed ({} in a row): {}", failures, err);
        if failures > self.config.max_write_failures {
            self.halt(FatalError {
                consecutive_failures: failures,
            });
        }
    }

    fn halt(&self, fatal: FatalError) {
        let mut halted = self.halted.lock().unwrap();
        if halted.is_some() {
            return;
        }
        *halted = Some(fatal);
        drop(halted);
        error!("halting: {}", fatal);
        let _ = self.fatal_tx.send(fatal);
    }

    pub fn halted(&self) -> Option<FatalError> {
        *self.halted.lock().unwrap()
    }

    /// Channel on which the single `FatalError` is delivered when the stack halts.
    pub fn fatal_signal(&self) -> Receiver<FatalError> {
        self.fatal_rx.clone()
    }

    /// One ARP aging tick; meant to run once per second.
    pub fn age_arp(&self) -> usize {
        self.arp.age_entries()
    }

    pub fn arp_entries(&self) -> Vec<ArpEntry> {
        self.arp.entries()
    }

    pub fn stats(&self) -> Stats {
        self.counters
            .snapshot(self.pool.free_count(), self.pool.min_free())
    }
}
