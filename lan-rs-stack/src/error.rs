use std::error::Error;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;

/// Errors returned by socket operations and the runner.
#[derive(Debug)]
pub enum LanError {
    /// The socket was not opened in a mode that allows the operation.
    WrongMode,
    /// The payload does not fit in a single frame buffer.
    PayloadTooLarge { len: usize, max: usize },
    /// Every frame buffer is in use.
    BufferExhausted,
    /// No ARP reply came back for the next hop.
    ArpUnresolved(Ipv4Addr),
    /// The handle refers to a closed or reused socket slot.
    StaleSocket,
    /// The socket has no received datagram to act on.
    NoPendingData,
    /// The stack stopped accepting writes after too many consecutive failures.
    Halted(FatalError),
    /// A frame header could not be read or written.
    Frame(&'static str),
    Io(io::Error),
}

impl fmt::Display for LanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LanError::WrongMode => write!(f, "socket mode does not allow this operation"),
            LanError::PayloadTooLarge { len, max } => {
                write!(f, "payload of {} bytes exceeds the {} byte limit", len, max)
            }
            LanError::BufferExhausted => write!(f, "no free frame buffer"),
            LanError::ArpUnresolved(ip) => write!(f, "no ARP reply from {}", ip),
            LanError::StaleSocket => write!(f, "socket handle is no longer valid"),
            LanError::NoPendingData => write!(f, "socket has no pending datagram"),
            LanError::Halted(fatal) => write!(f, "stack halted: {}", fatal),
            LanError::Frame(reason) => write!(f, "bad frame: {}", reason),
            LanError::Io(err) => write!(f, "driver error: {}", err),
        }
    }
}

impl Error for LanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LanError::Io(err) => Some(err),
            LanError::Halted(fatal) => Some(fatal),
            _ => None,
        }
    }
}

impl From<io::Error> for LanError {
    fn from(err: io::Error) -> Self {
        LanError::Io(err)
    }
}

/// Last error recorded on a socket by a read or write that could not complete as asked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketError {
    WrongMode,
    /// The pending payload was larger than the caller's buffer and got truncated.
    BufferTooSmall,
}

/// Raised once, when consecutive write failures pass the configured limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FatalError {
    pub consecutive_failures: usize,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} consecutive write failures",
            self.consecutive_failures
        )
    }
}

impl Error for FatalError {}
