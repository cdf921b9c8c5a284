extern crate crossbeam;
extern crate tokio;

/// Configuration of the interface: addresses, arena sizes and the timing constants used by
/// ARP resolution and socket reads. Build one with `NetConfig::new()` and its setters.
pub mod config;

/// Error types surfaced to callers of the stack, plus the per-socket error code and the
/// fatal-halt signal handed to the supervisor.
pub mod error;

/// The driver is the only thing the stack knows about the hardware: it can push a frame out and
/// pull a frame in, if one is waiting. Anything that implements `Driver` can carry the stack.
pub mod driver;

/// The buffer pool owns every frame buffer the stack will ever use. Buffers are handed out as
/// move-only `FrameBuf` handles, and go back to the pool when the handle is dropped.
pub mod pool;

/// Sockets bind a local port to a remote endpoint and hold at most one unread datagram, in the
/// very buffer it arrived in.
pub mod socket;

/// ARP cache with age based eviction. Entries are learned only from replies addressed to us.
pub mod arp;

/// Diagnostic counters, kept as atomics and exposed as a plain snapshot.
pub mod stats;

/// The stack context ties pool, sockets, ARP cache and driver together and exposes the API
/// used by application tasks.
pub mod stack;

/// Frame classification on the way in and header construction on the way out.
mod dispatch;

/// Helpers to drive a stack from a tokio runtime: the polling loop and the ARP aging tick.
pub mod runner;

#[cfg(test)]
mod utils;

pub use crate::config::NetConfig;
pub use crate::driver::Driver;
pub use crate::error::{FatalError, LanError, SocketError};
pub use crate::pool::{BufferPool, FrameBuf, FRAME_SIZE};
pub use crate::socket::{SocketHandle, SocketInfo, SocketMode};
pub use crate::stack::{LanStack, PollOutcome};
pub use crate::stats::Stats;
