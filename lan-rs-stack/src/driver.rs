use std::io;

/// Minimal interface to an Ethernet controller.
///
/// Both calls are synchronous. The stack serializes access to the driver behind its own
/// mutex, so implementations do not need interior locking.
pub trait Driver: Send {
    /// Puts a complete Ethernet II frame on the wire.
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Copies a pending frame into `buf` and returns its length, or `Ok(0)` when nothing
    /// is waiting. Frames longer than `buf` are truncated.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).transmit(frame)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).receive(buf)
    }
}
