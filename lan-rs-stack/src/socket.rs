use crate::error::{LanError, SocketError};
use crate::pool::FrameBuf;
use bitflags::bitflags;
use crossbeam::crossbeam_channel::Sender;
use log::debug;
use std::net::Ipv4Addr;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

bitflags! {
    /// What a socket may do, plus whether it holds an unread datagram.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SocketMode: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        /// Set by the stack while a received datagram waits to be read.
        const NEW_DATA = 0x04;
    }
}

/// Reference to a bound socket. It goes stale when the socket is closed, even if the slot is
/// bound again later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketHandle {
    index: usize,
    generation: u32,
}

impl SocketHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Read-only copy of a socket record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketInfo {
    pub local_ip: Ipv4Addr,
    pub local_port: u16,
    pub remote_ip: Ipv4Addr,
    pub remote_port: u16,
    pub mode: SocketMode,
    pub last_error: Option<SocketError>,
    pub pending_len: usize,
    pub data_lost: bool,
}

struct Socket {
    info: SocketInfo,
    /// Present exactly when `NEW_DATA` is set.
    buffer: Option<FrameBuf>,
    notify: Option<Sender<SocketHandle>>,
    read_timeout: Option<Duration>,
}

struct SocketSlot {
    generation: u32,
    socket: Option<Socket>,
}

/// Remote endpoint and ports of an inbound datagram, as seen from our side.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Datagram {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dest_ip: Ipv4Addr,
    pub dest_port: u16,
    pub payload_len: usize,
}

pub(crate) enum Delivery {
    /// The buffer now belongs to the socket. `displaced` is whatever buffer it held before,
    /// to be dropped once the table is unlocked.
    Delivered {
        handle: SocketHandle,
        data_lost: bool,
        displaced: Option<FrameBuf>,
    },
    Unmatched(FrameBuf),
}

/// Outcome of taking the pending datagram of a socket.
pub(crate) enum Pending {
    Ready { buffer: FrameBuf, copy_len: usize },
    Empty,
    WrongMode,
    Stale,
}

/// Fixed table of socket records. All record changes happen under one short lock; buffers
/// leaving the table are always dropped after the lock is released.
pub struct SocketTable {
    slots: Mutex<Vec<SocketSlot>>,
    data_ready: Condvar,
    ephemeral_base: u16,
}

impl SocketTable {
    pub fn new(capacity: usize, ephemeral_base: u16) -> Self {
        let slots = (0..capacity)
            .map(|_| SocketSlot {
                generation: 0,
                socket: None,
            })
            .collect();
        SocketTable {
            slots: Mutex::new(slots),
            data_ready: Condvar::new(),
            ephemeral_base,
        }
    }

    fn live<'a>(slots: &'a mut [SocketSlot], handle: SocketHandle) -> Option<&'a mut Socket> {
        match slots.get_mut(handle.index) {
            Some(slot) if slot.generation == handle.generation => slot.socket.as_mut(),
            _ => None,
        }
    }

    /// Claims the first free slot. A `local_port` of 0 picks the slot's ephemeral port.
    pub fn bind(
        &self,
        local_ip: Ipv4Addr,
        remote_ip: Ipv4Addr,
        remote_port: u16,
        local_port: u16,
        mode: SocketMode,
    ) -> Option<SocketHandle> {
        let mut slots = self.slots.lock().unwrap();
        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.socket.is_none())?;
        let local_port = if local_port == 0 {
            self.ephemeral_base.wrapping_add(index as u16)
        } else {
            local_port
        };
        slot.socket = Some(Socket {
            info: SocketInfo {
                local_ip,
                local_port,
                remote_ip,
                remote_port,
                mode: mode - SocketMode::NEW_DATA,
                last_error: None,
                pending_len: 0,
                data_lost: false,
            },
            buffer: None,
            notify: None,
            read_timeout: None,
        });
        debug!(
            "socket {} bound {}:{} <-> {}:{}",
            index, local_ip, local_port, remote_ip, remote_port
        );
        Some(SocketHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Frees the socket and hands back the buffer it held, if any. Stale handles are ignored.
    pub fn close(&self, handle: SocketHandle) -> Option<FrameBuf> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let socket = slot.socket.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        drop(slots);
        debug!("socket {} closed", handle.index);
        // Readers parked on this socket see it gone instead of waiting out their timeout.
        self.data_ready.notify_all();
        socket.buffer
    }

    /// Replaces the READ/WRITE part of the mode. An unread datagram stays readable.
    pub fn change_mode(&self, handle: SocketHandle, mode: SocketMode) -> Option<SocketHandle> {
        let mut slots = self.slots.lock().unwrap();
        let socket = Self::live(&mut slots, handle)?;
        let pending = socket.info.mode & SocketMode::NEW_DATA;
        socket.info.mode = (mode - SocketMode::NEW_DATA) | pending;
        Some(handle)
    }

    pub fn info(&self, handle: SocketHandle) -> Option<SocketInfo> {
        let mut slots = self.slots.lock().unwrap();
        Self::live(&mut slots, handle).map(|socket| socket.info.clone())
    }

    pub fn set_notify(
        &self,
        handle: SocketHandle,
        notify: Sender<SocketHandle>,
        read_timeout: Duration,
    ) -> bool {
        let mut slots = self.slots.lock().unwrap();
        match Self::live(&mut slots, handle) {
            Some(socket) => {
                socket.notify = Some(notify);
                socket.read_timeout = Some(read_timeout);
                true
            }
            None => false,
        }
    }

    pub fn read_timeout(&self, handle: SocketHandle) -> Option<Duration> {
        let mut slots = self.slots.lock().unwrap();
        Self::live(&mut slots, handle).and_then(|socket| socket.read_timeout)
    }

    /// Endpoint used by a write, or the reason the socket cannot write.
    pub(crate) fn writer(
        &self,
        handle: SocketHandle,
    ) -> Result<(u16, Ipv4Addr, u16), LanError> {
        let mut slots = self.slots.lock().unwrap();
        let socket = Self::live(&mut slots, handle).ok_or(LanError::StaleSocket)?;
        if !socket.info.mode.contains(SocketMode::WRITE) {
            socket.info.last_error = Some(SocketError::WrongMode);
            return Err(LanError::WrongMode);
        }
        let info = &socket.info;
        Ok((info.local_port, info.remote_ip, info.remote_port))
    }

    /// Hands `buffer` to the first READ socket bound to this datagram's endpoints. A remote
    /// port of 0 matches any source port and is pinned to the first one seen.
    pub(crate) fn deliver(&self, datagram: Datagram, buffer: FrameBuf) -> Delivery {
        let mut slots = self.slots.lock().unwrap();
        let found = slots.iter_mut().enumerate().find(|(_, slot)| {
            slot.socket.as_ref().map_or(false, |socket| {
                let info = &socket.info;
                info.mode.contains(SocketMode::READ)
                    && info.local_ip == datagram.dest_ip
                    && info.local_port == datagram.dest_port
                    && info.remote_ip == datagram.src_ip
                    && (info.remote_port == 0 || info.remote_port == datagram.src_port)
            })
        });
        let (index, slot) = match found {
            Some(found) => found,
            None => return Delivery::Unmatched(buffer),
        };
        let handle = SocketHandle {
            index,
            generation: slot.generation,
        };
        let socket = match slot.socket.as_mut() {
            Some(socket) => socket,
            None => return Delivery::Unmatched(buffer),
        };

        if socket.info.remote_port == 0 {
            socket.info.remote_port = datagram.src_port;
        }
        let data_lost = socket.info.mode.contains(SocketMode::NEW_DATA);
        if data_lost {
            socket.info.data_lost = true;
        }
        socket.info.mode |= SocketMode::NEW_DATA;
        socket.info.pending_len = datagram.payload_len;
        let displaced = socket.buffer.replace(buffer);
        if let Some(notify) = &socket.notify {
            // A full channel already tells the task to look at this socket.
            let _ = notify.try_send(handle);
        }
        drop(slots);
        self.data_ready.notify_all();

        Delivery::Delivered {
            handle,
            data_lost,
            displaced,
        }
    }

    /// Takes the unread datagram, waiting up to `timeout` for one to arrive. `copy_len` is the
    /// pending length clamped to `capacity`; a clamp records `BufferTooSmall`.
    pub(crate) fn take_pending(
        &self,
        handle: SocketHandle,
        capacity: usize,
        timeout: Duration,
    ) -> Pending {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock().unwrap();
        loop {
            let socket = match Self::live(&mut slots, handle) {
                Some(socket) => socket,
                None => return Pending::Stale,
            };
            if !socket.info.mode.contains(SocketMode::READ) {
                socket.info.last_error = Some(SocketError::WrongMode);
                return Pending::WrongMode;
            }
            if socket.info.mode.contains(SocketMode::NEW_DATA) {
                if let Some(buffer) = socket.buffer.take() {
                    let pending = socket.info.pending_len;
                    if pending > capacity {
                        socket.info.last_error = Some(SocketError::BufferTooSmall);
                    }
                    socket.info.mode.remove(SocketMode::NEW_DATA);
                    socket.info.pending_len = 0;
                    return Pending::Ready {
                        buffer,
                        copy_len: pending.min(capacity),
                    };
                }
                socket.info.mode.remove(SocketMode::NEW_DATA);
            }

            let now = Instant::now();
            if now >= deadline {
                return Pending::Empty;
            }
            slots = self
                .data_ready
                .wait_timeout(slots, deadline - now)
                .unwrap()
                .0;
        }
    }

    /// Takes the pending buffer without copying, for replies built in place.
    pub(crate) fn take_for_reply(
        &self,
        handle: SocketHandle,
    ) -> Result<(FrameBuf, usize), LanError> {
        let mut slots = self.slots.lock().unwrap();
        let socket = Self::live(&mut slots, handle).ok_or(LanError::StaleSocket)?;
        let buffer = socket.buffer.take().ok_or(LanError::NoPendingData)?;
        let pending = socket.info.pending_len;
        socket.info.mode.remove(SocketMode::NEW_DATA);
        socket.info.pending_len = 0;
        Ok((buffer, pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;
    use crossbeam::crossbeam_channel;
    use std::sync::Arc;
    use std::thread;

    const OUR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    fn datagram(src_port: u16, dest_port: u16, payload_len: usize) -> Datagram {
        Datagram {
            src_ip: PEER,
            src_port,
            dest_ip: OUR_IP,
            dest_port,
            payload_len,
        }
    }

    #[test]
    fn bind_assigns_ephemeral_ports() {
        let table = SocketTable::new(3, 50000);
        let a = table.bind(OUR_IP, PEER, 53, 0, SocketMode::WRITE).unwrap();
        let b = table.bind(OUR_IP, PEER, 53, 6000, SocketMode::READ).unwrap();
        let c = table.bind(OUR_IP, PEER, 53, 0, SocketMode::READ).unwrap();
        assert!(table.bind(OUR_IP, PEER, 53, 0, SocketMode::READ).is_none());

        assert_eq!(table.info(a).unwrap().local_port, 50000);
        assert_eq!(table.info(b).unwrap().local_port, 6000);
        assert_eq!(table.info(c).unwrap().local_port, 50002);
        assert_eq!(table.info(a).unwrap().local_ip, OUR_IP);
    }

    #[test]
    fn close_is_idempotent() {
        let table = SocketTable::new(2, 50000);
        let a = table.bind(OUR_IP, PEER, 53, 0, SocketMode::READ).unwrap();
        assert!(table.close(a).is_none());
        assert!(table.close(a).is_none());
        assert!(table.info(a).is_none());

        // The slot comes back under a new generation; the old handle stays dead.
        let b = table.bind(OUR_IP, PEER, 53, 0, SocketMode::READ).unwrap();
        assert_eq!(b.index(), a.index());
        assert_ne!(a, b);
        assert!(table.change_mode(a, SocketMode::WRITE).is_none());
        assert!(table.close(a).is_none());
        assert!(table.info(b).is_some());
    }

    #[test]
    fn bind_never_shares_a_slot() {
        let table = Arc::new(SocketTable::new(10, 50000));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    (0..5)
                        .filter_map(|_| table.bind(OUR_IP, PEER, 1, 0, SocketMode::READ))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut indexes: Vec<usize> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .map(|handle| handle.index())
            .collect();
        assert_eq!(indexes.len(), 10);
        indexes.sort();
        indexes.dedup();
        assert_eq!(indexes.len(), 10);
    }

    #[test]
    fn change_mode_keeps_pending_data() {
        let pool = BufferPool::new(2);
        let table = SocketTable::new(1, 50000);
        let handle = table.bind(OUR_IP, PEER, 0, 5000, SocketMode::READ).unwrap();
        let delivery = table.deliver(datagram(1234, 5000, 4), pool.acquire().unwrap());
        assert!(matches!(delivery, Delivery::Delivered { data_lost: false, .. }));

        table.change_mode(handle, SocketMode::WRITE).unwrap();
        let info = table.info(handle).unwrap();
        assert_eq!(info.mode, SocketMode::WRITE | SocketMode::NEW_DATA);
        assert!(table.writer(handle).is_ok());

        table.change_mode(handle, SocketMode::READ).unwrap();
        assert!(matches!(
            table.take_pending(handle, 16, Duration::from_millis(0)),
            Pending::Ready { copy_len: 4, .. }
        ));
    }

    #[test]
    fn deliver_pins_wildcard_port() {
        let pool = BufferPool::new(3);
        let table = SocketTable::new(2, 50000);
        let handle = table.bind(OUR_IP, PEER, 0, 5000, SocketMode::READ).unwrap();

        let first = table.deliver(datagram(1234, 5000, 4), pool.acquire().unwrap());
        assert!(matches!(first, Delivery::Delivered { .. }));
        assert_eq!(table.info(handle).unwrap().remote_port, 1234);

        let other_port = table.deliver(datagram(4321, 5000, 4), pool.acquire().unwrap());
        assert!(matches!(other_port, Delivery::Unmatched(_)));
        let other_dest = table.deliver(datagram(1234, 5001, 4), pool.acquire().unwrap());
        assert!(matches!(other_dest, Delivery::Unmatched(_)));
    }

    #[test]
    fn write_only_socket_is_not_delivered_to() {
        let pool = BufferPool::new(1);
        let table = SocketTable::new(1, 50000);
        table.bind(OUR_IP, PEER, 0, 5000, SocketMode::WRITE).unwrap();
        let delivery = table.deliver(datagram(1234, 5000, 4), pool.acquire().unwrap());
        assert!(matches!(delivery, Delivery::Unmatched(_)));
    }

    #[test]
    fn second_delivery_displaces_first() {
        let pool = BufferPool::new(3);
        let table = SocketTable::new(1, 50000);
        let handle = table.bind(OUR_IP, PEER, 0, 5000, SocketMode::READ).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        assert!(table.set_notify(handle, tx, Duration::from_millis(50)));

        table.deliver(datagram(1234, 5000, 4), pool.acquire().unwrap());
        match table.deliver(datagram(1234, 5000, 7), pool.acquire().unwrap()) {
            Delivery::Delivered {
                data_lost,
                displaced,
                ..
            } => {
                assert!(data_lost);
                assert!(displaced.is_some());
            }
            Delivery::Unmatched(_) => panic!("datagram should have matched"),
        }
        assert_eq!(pool.busy_count(), 1);
        assert_eq!(rx.try_recv(), Ok(handle));
        assert!(rx.try_recv().is_err());

        let info = table.info(handle).unwrap();
        assert!(info.data_lost);
        assert_eq!(info.pending_len, 7);
        assert_eq!(table.read_timeout(handle), Some(Duration::from_millis(50)));
    }

    #[test]
    fn take_pending_records_errors() {
        let pool = BufferPool::new(1);
        let table = SocketTable::new(2, 50000);
        let writer = table.bind(OUR_IP, PEER, 9, 0, SocketMode::WRITE).unwrap();
        assert!(matches!(
            table.take_pending(writer, 16, Duration::from_millis(0)),
            Pending::WrongMode
        ));
        assert_eq!(
            table.info(writer).unwrap().last_error,
            Some(SocketError::WrongMode)
        );

        let reader = table.bind(OUR_IP, PEER, 0, 5000, SocketMode::READ).unwrap();
        assert!(matches!(
            table.take_pending(reader, 16, Duration::from_millis(1)),
            Pending::Empty
        ));
        table.deliver(datagram(1234, 5000, 10), pool.acquire().unwrap());
        assert!(matches!(
            table.take_pending(reader, 4, Duration::from_millis(0)),
            Pending::Ready { copy_len: 4, .. }
        ));
        let info = table.info(reader).unwrap();
        assert_eq!(info.last_error, Some(SocketError::BufferTooSmall));
        assert!(!info.mode.contains(SocketMode::NEW_DATA));
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn take_pending_wakes_on_delivery() {
        let pool = BufferPool::new(1);
        let table = Arc::new(SocketTable::new(1, 50000));
        let handle = table.bind(OUR_IP, PEER, 0, 5000, SocketMode::READ).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                match table.take_pending(handle, 16, Duration::from_secs(5)) {
                    Pending::Ready { copy_len, .. } => copy_len,
                    _ => 0,
                }
            })
        };
        thread::sleep(Duration::from_millis(20));
        table.deliver(datagram(1234, 5000, 3), pool.acquire().unwrap());
        assert_eq!(waiter.join().unwrap(), 3);
    }

    #[test]
    fn close_wakes_parked_reader() {
        let table = Arc::new(SocketTable::new(1, 50000));
        let handle = table.bind(OUR_IP, PEER, 0, 5000, SocketMode::READ).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let started = Instant::now();
                let stale = matches!(
                    table.take_pending(handle, 16, Duration::from_secs(5)),
                    Pending::Stale
                );
                (stale, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(table.close(handle).is_none());

        let (stale, waited) = waiter.join().unwrap();
        assert!(stale);
        assert!(waited < Duration::from_secs(2));
    }
}
