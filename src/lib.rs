//! A host-side IPv4 network stack for a single network adapter.
//!
//! The stack is driven entirely from the outside: a supervisor feeds received
//! Ethernet frames and elapsed-time ticks into an `Interface`, which answers by
//! handing frames to its `Device`. Nothing inside blocks or spawns threads.

#[cfg(test)]
#[macro_use]
extern crate assert_matches;
#[macro_use]
extern crate log;

pub mod core;

#[cfg(target_os = "linux")]
pub mod linux;

use crate::core::dev::Error as DevError;

#[derive(Debug)]
pub enum Error {
    /// Indicates an error where an address could not be resolved.
    Address,
    /// Indicates an error where a buffer, pool, timer list, etc. is full or empty.
    Exhausted,
    /// Indicates an error where a packet or frame is malformed.
    Malformed,
    /// Indicates an error where a checksum is invalid.
    Checksum,
    /// Indicates a packet or frame that was deliberately not processed.
    Ignored,
    /// Indicates a payload too large for the link with fragmentation disallowed.
    Oversized,
    /// Indicates an interface that is stopped or whose link is down.
    Disabled,
    /// Indicates an error reported by the underlying device.
    Device(DevError),
    /// Indicates a generic IO error.
    IO(std::io::Error),
}

impl From<DevError> for Error {
    fn from(err: DevError) -> Self {
        Error::Device(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
