//! Core, platform independent networking code.

pub mod arp_cache;
pub mod check;
pub mod dev;
pub mod link;
pub mod reassembly;
pub mod repr;
pub mod service;
pub mod storage;
pub mod time;
pub mod timer;
