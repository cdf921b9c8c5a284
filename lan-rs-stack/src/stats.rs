use std::sync::atomic::{AtomicUsize, Ordering};

/// Point in time copy of the stack's diagnostic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub free_buffers: usize,
    pub min_free_buffers: usize,
    pub buffer_exhausted: usize,
    pub socket_exhausted: usize,
    pub arp_misses: usize,
    pub arp_failures: usize,
    pub eth_filter_misses: usize,
    pub ip_filter_misses: usize,
    pub malformed_frames: usize,
    pub data_lost: usize,
    pub udp_delivered: usize,
    pub udp_unmatched: usize,
    pub write_failures: usize,
    pub frames_received: usize,
    pub frames_transmitted: usize,
    pub driver_errors: usize,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub buffer_exhausted: AtomicUsize,
    pub socket_exhausted: AtomicUsize,
    pub arp_misses: AtomicUsize,
    pub arp_failures: AtomicUsize,
    pub eth_filter_misses: AtomicUsize,
    pub ip_filter_misses: AtomicUsize,
    pub malformed_frames: AtomicUsize,
    pub data_lost: AtomicUsize,
    pub udp_delivered: AtomicUsize,
    pub udp_unmatched: AtomicUsize,
    pub write_failures: AtomicUsize,
    pub frames_received: AtomicUsize,
    pub frames_transmitted: AtomicUsize,
    pub driver_errors: AtomicUsize,
}

pub(crate) fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self, free_buffers: usize, min_free_buffers: usize) -> Stats {
        let read = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        Stats {
            free_buffers,
            min_free_buffers,
            buffer_exhausted: read(&self.buffer_exhausted),
            socket_exhausted: read(&self.socket_exhausted),
            arp_misses: read(&self.arp_misses),
            arp_failures: read(&self.arp_failures),
            eth_filter_misses: read(&self.eth_filter_misses),
            ip_filter_misses: read(&self.ip_filter_misses),
            malformed_frames: read(&self.malformed_frames),
            data_lost: read(&self.data_lost),
            udp_delivered: read(&self.udp_delivered),
            udp_unmatched: read(&self.udp_unmatched),
            write_failures: read(&self.write_failures),
            frames_received: read(&self.frames_received),
            frames_transmitted: read(&self.frames_transmitted),
            driver_errors: read(&self.driver_errors),
        }
    }
}
