use lan_rs_packets::MacAddr;
use log::debug;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// One learned IPv4 to MAC binding. `age` counts aging ticks left before eviction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub age: u32,
}

/// Formats as `AA:BB:CC:DD:EE:FF a.b.c.d age`.
impl fmt::Display for ArpEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.mac, self.ip, self.age)
    }
}

/// Small fixed-size ARP cache.
///
/// Waiters in `wait_for` are woken whenever an entry is learned, so a resolution returns as
/// soon as the reply has been processed rather than at the end of its attempt window.
pub struct ArpCache {
    entries: Mutex<Vec<Option<ArpEntry>>>,
    learned: Condvar,
    max_age: u32,
}

impl ArpCache {
    pub fn new(capacity: usize, max_age: u32) -> Self {
        ArpCache {
            entries: Mutex::new(vec![None; capacity]),
            learned: Condvar::new(),
            max_age,
        }
    }

    fn find(entries: &[Option<ArpEntry>], ip: Ipv4Addr) -> Option<MacAddr> {
        entries
            .iter()
            .flatten()
            .find(|entry| entry.ip == ip)
            .map(|entry| entry.mac)
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        let entries = self.entries.lock().unwrap();
        Self::find(&entries, ip)
    }

    /// Records `ip` at `mac` with a fresh age. Reuses the entry for `ip` if there is one,
    /// otherwise a free entry, otherwise the entry closest to expiring.
    pub fn upsert(&self, ip: Ipv4Addr, mac: MacAddr) {
        let mut entries = self.entries.lock().unwrap();
        let existing = entries
            .iter()
            .position(|entry| entry.map_or(false, |entry| entry.ip == ip));
        let free = || entries.iter().position(Option::is_none);
        let index = existing.or_else(free).or_else(|| {
            entries
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.map_or(0, |entry| entry.age))
                .map(|(index, _)| index)
        });
        if let Some(index) = index {
            if let Some(evicted) = entries[index].filter(|entry| entry.ip != ip) {
                debug!("arp: evicting {} for {}", evicted, ip);
            }
            entries[index] = Some(ArpEntry {
                ip,
                mac,
                age: self.max_age,
            });
            debug!("arp: learned {} at {}", ip, mac);
        }
        drop(entries);
        self.learned.notify_all();
    }

    /// One aging tick: every entry loses one unit of age and expires when it reaches zero.
    /// Returns how many entries expired.
    pub fn age_entries(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let mut expired = 0;
        for slot in entries.iter_mut() {
            if let Some(entry) = slot {
                entry.age = entry.age.saturating_sub(1);
                if entry.age == 0 {
                    debug!("arp: {} expired", entry.ip);
                    *slot = None;
                    expired += 1;
                }
            }
        }
        expired
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.iter_mut().for_each(|entry| *entry = None);
    }

    pub fn entries(&self) -> Vec<ArpEntry> {
        self.entries.lock().unwrap().iter().flatten().copied().collect()
    }

    /// Blocks until `ip` is in the cache or `timeout` runs out.
    pub fn wait_for(&self, ip: Ipv4Addr, timeout: Duration) -> Option<MacAddr> {
        let deadline = Instant::now() + timeout;
        let mut entries = self.entries.lock().unwrap();
        loop {
            if let Some(mac) = Self::find(&entries, ip) {
                return Some(mac);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            entries = self.learned.wait_timeout(entries, deadline - now).unwrap().0;
        }
    }
}
