//! Linux specific devices.

pub mod dev;
mod libc;
