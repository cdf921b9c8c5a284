#![cfg(target_os = "linux")]

//! Carries a `LanStack` over a Linux `AF_PACKET` socket, so the stack can be run against a real
//! (or virtual) Ethernet interface instead of an ENC28J60.

mod linux;
mod link;

pub use crate::link::RawLink;
