use lan_rs_packets::MacAddr;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Frame buffers in the pool.
pub const NUM_BUFFERS: usize = 6;
/// Socket slots in the table.
pub const NUM_SOCKETS: usize = 10;
/// Entries in the ARP cache.
pub const ARP_CACHE_SIZE: usize = 3;
/// Sockets bound with local port 0 get `EPHEMERAL_PORT_BASE + slot index`.
pub const EPHEMERAL_PORT_BASE: u16 = 50000;

pub const DEFAULT_MAC: MacAddr = MacAddr {
    bytes: [0x00, 0x13, 0x37, 0x01, 0x23, 0x45],
};
pub const DEFAULT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 222);
pub const DEFAULT_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
pub const DEFAULT_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);

/// Interface configuration and tunables of a `LanStack`.
///
/// ```
/// use lan_rs_stack::NetConfig;
/// use std::net::Ipv4Addr;
///
/// let config = NetConfig::new()
///     .ip(Ipv4Addr::new(10, 0, 0, 1))
///     .gateway(Ipv4Addr::new(10, 0, 0, 254));
/// assert!(config.is_local(Ipv4Addr::new(10, 0, 0, 9)));
/// ```
#[derive(Clone, Debug)]
pub struct NetConfig {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub ttl: u8,
    pub buffers: usize,
    pub sockets: usize,
    pub arp_entries: usize,
    /// Attempts made by a blocking ARP resolution before giving up.
    pub arp_retries: usize,
    /// How long each attempt waits for a reply.
    pub arp_attempt_timeout: Duration,
    /// Age, in aging ticks, given to an entry when a reply refreshes it.
    pub arp_max_age: u32,
    /// Wait used by non-blocking reads.
    pub read_poll_interval: Duration,
    /// Default wait of blocking reads.
    pub read_timeout: Duration,
    /// Consecutive write failures tolerated; the next one halts the stack.
    pub max_write_failures: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            mac: DEFAULT_MAC,
            ip: DEFAULT_IP,
            netmask: DEFAULT_NETMASK,
            gateway: DEFAULT_GATEWAY,
            ttl: 64,
            buffers: NUM_BUFFERS,
            sockets: NUM_SOCKETS,
            arp_entries: ARP_CACHE_SIZE,
            arp_retries: 50,
            arp_attempt_timeout: Duration::from_millis(20),
            arp_max_age: 2 * 60 * 60,
            read_poll_interval: Duration::from_millis(5),
            read_timeout: Duration::from_millis(5 * 100),
            max_write_failures: 3,
        }
    }
}

impl NetConfig {
    pub fn new() -> Self {
        NetConfig::default()
    }

    pub fn mac(self, mac: MacAddr) -> Self {
        NetConfig { mac, ..self }
    }

    pub fn ip(self, ip: Ipv4Addr) -> Self {
        NetConfig { ip, ..self }
    }

    pub fn netmask(self, netmask: Ipv4Addr) -> Self {
        NetConfig { netmask, ..self }
    }

    pub fn gateway(self, gateway: Ipv4Addr) -> Self {
        NetConfig { gateway, ..self }
    }

    pub fn ttl(self, ttl: u8) -> Self {
        NetConfig { ttl, ..self }
    }

    /// Overrides the arena sizes. Zero sized arenas are bumped to one.
    pub fn capacities(self, buffers: usize, sockets: usize, arp_entries: usize) -> Self {
        NetConfig {
            buffers: buffers.max(1),
            sockets: sockets.max(1),
            arp_entries: arp_entries.max(1),
            ..self
        }
    }

    pub fn arp_timing(self, retries: usize, attempt_timeout: Duration) -> Self {
        NetConfig {
            arp_retries: retries,
            arp_attempt_timeout: attempt_timeout,
            ..self
        }
    }

    pub fn arp_max_age(self, arp_max_age: u32) -> Self {
        NetConfig { arp_max_age, ..self }
    }

    pub fn read_timing(self, poll_interval: Duration, timeout: Duration) -> Self {
        NetConfig {
            read_poll_interval: poll_interval,
            read_timeout: timeout,
            ..self
        }
    }

    pub fn max_write_failures(self, max_write_failures: usize) -> Self {
        NetConfig {
            max_write_failures,
            ..self
        }
    }

    /// Directed broadcast address of our subnet.
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.ip) | !u32::from(self.netmask))
    }

    pub fn is_broadcast(&self, addr: Ipv4Addr) -> bool {
        addr == self.broadcast() || addr == Ipv4Addr::BROADCAST
    }

    /// True when `addr` sits on our subnet and can be reached without the gateway.
    pub fn is_local(&self, addr: Ipv4Addr) -> bool {
        (u32::from(addr) ^ u32::from(self.ip)) & u32::from(self.netmask) == 0
    }

    /// True for datagrams we accept: our own address or the subnet broadcast.
    pub fn accepts(&self, dest: Ipv4Addr) -> bool {
        dest == self.ip || dest == self.broadcast()
    }

    /// Address whose MAC a frame toward `dest` must carry.
    pub fn next_hop(&self, dest: Ipv4Addr) -> Ipv4Addr {
        if self.is_local(dest) {
            dest
        } else {
            self.gateway
        }
    }
}
