//! IPv4 datagram reassembly ([RFC 815](https://tools.ietf.org/html/rfc815)).
//!
//! Each partially received datagram keeps an ordered list of the byte ranges
//! still missing. Arriving fragments split or consume those holes, and the
//! datagram is complete once no hole is left and the final fragment has fixed
//! the total length.

use std::collections::HashMap;

use crate::core::repr::Ipv4Address;
use crate::{
    Error,
    Result,
};

/// How long a partial datagram is kept, measured from its first fragment.
pub const REASSEMBLY_TTL_MS: u32 = 15_000;

/// Largest payload an IPv4 packet with a minimal header can describe.
pub const MAX_PAYLOAD_LEN: usize = 65_535 - 20;

/// Identifies the datagram a fragment belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub src_addr: Ipv4Address,
    pub id: u16,
}

/// A fragment as seen by the reassembler.
#[derive(Clone, Copy, Debug)]
pub struct Fragment<'a> {
    pub src_addr: Ipv4Address,
    pub dst_addr: Ipv4Address,
    pub protocol: u8,
    pub id: u16,
    /// Offset of the payload in bytes.
    pub offset: usize,
    /// Set on the fragment without the "more fragments" flag.
    pub last: bool,
    pub payload: &'a [u8],
}

/// A reassembled datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
    pub src_addr: Ipv4Address,
    pub dst_addr: Ipv4Address,
    pub protocol: u8,
    pub payload: Vec<u8>,
}

/// A missing byte range [start, end).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Hole {
    start: usize,
    end: usize,
}

#[derive(Debug)]
struct Context {
    dst_addr: Ipv4Address,
    protocol: u8,
    buffer: Vec<u8>,
    holes: Vec<Hole>,
    total_len: Option<usize>,
    ttl_ms: u32,
}

impl Context {
    fn new(dst_addr: Ipv4Address, protocol: u8, ttl_ms: u32) -> Context {
        Context {
            dst_addr,
            protocol,
            buffer: Vec::new(),
            holes: vec![Hole {
                start: 0,
                end: MAX_PAYLOAD_LEN,
            }],
            total_len: None,
            ttl_ms,
        }
    }

    /// Fixes the total length, dropping any hole past it.
    fn set_total_len(&mut self, total_len: usize) {
        self.total_len = Some(total_len);
        self.holes.retain(|hole| hole.start < total_len);
        for hole in self.holes.iter_mut() {
            hole.end = hole.end.min(total_len);
        }
    }

    /// Absorbs the range [first, last) into the hole list.
    fn fill(&mut self, first: usize, last: usize) {
        let mut holes = Vec::with_capacity(self.holes.len() + 1);

        for hole in self.holes.iter() {
            if first >= hole.end || last <= hole.start {
                holes.push(*hole);
                continue;
            }
            if first > hole.start {
                holes.push(Hole {
                    start: hole.start,
                    end: first,
                });
            }
            if last < hole.end {
                holes.push(Hole {
                    start: last,
                    end: hole.end,
                });
            }
        }

        self.holes = holes;
    }

    fn is_complete(&self) -> bool {
        self.holes.is_empty() && self.total_len.is_some()
    }
}

/// Reassembly contexts for one interface.
#[derive(Debug)]
pub struct Reassembler {
    contexts: HashMap<Key, Context>,
    ttl_ms: u32,
}

impl Default for Reassembler {
    fn default() -> Reassembler {
        Reassembler::new(REASSEMBLY_TTL_MS)
    }
}

impl Reassembler {
    pub fn new(ttl_ms: u32) -> Reassembler {
        Reassembler {
            contexts: HashMap::new(),
            ttl_ms,
        }
    }

    /// Returns the number of partially received datagrams.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Discards every partial datagram.
    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    /// Adds a fragment, returning the datagram once it is complete.
    ///
    /// Fragments extending past the largest possible datagram, or final
    /// fragments contradicting an earlier final fragment, are rejected as
    /// malformed. Bytes already received are kept; overlapping data simply
    /// overwrites them.
    pub fn add(&mut self, fragment: &Fragment) -> Result<Option<Datagram>> {
        let first = fragment.offset;
        let last = first + fragment.payload.len();

        if last > MAX_PAYLOAD_LEN {
            return Err(Error::Malformed);
        }

        let key = Key {
            src_addr: fragment.src_addr,
            id: fragment.id,
        };

        if !self.contexts.contains_key(&key) {
            self.contexts
                .try_reserve(1)
                .map_err(|_| Error::Exhausted)?;
            self.contexts.insert(
                key,
                Context::new(fragment.dst_addr, fragment.protocol, self.ttl_ms),
            );
        }

        let complete = match self.contexts.get_mut(&key) {
            Some(context) => {
                if fragment.last {
                    match context.total_len {
                        Some(total_len) if total_len != last => {
                            return Err(Error::Malformed);
                        }
                        _ => context.set_total_len(last),
                    }
                }

                if context.buffer.len() < last {
                    let additional = last - context.buffer.len();
                    context
                        .buffer
                        .try_reserve(additional)
                        .map_err(|_| Error::Exhausted)?;
                    context.buffer.resize(last, 0);
                }
                context.buffer[first .. last].copy_from_slice(fragment.payload);
                context.fill(first, last);

                context.is_complete()
            }
            None => false,
        };

        if !complete {
            return Ok(None);
        }

        Ok(self.contexts.remove(&key).map(|mut context| {
            if let Some(total_len) = context.total_len {
                context.buffer.truncate(total_len);
            }
            Datagram {
                src_addr: key.src_addr,
                dst_addr: context.dst_addr,
                protocol: context.protocol,
                payload: context.buffer,
            }
        }))
    }

    /// Ages partial datagrams by elapsed_ms, discarding those that run out
    /// of time. Returns the number discarded.
    pub fn tick(&mut self, elapsed_ms: u32) -> usize {
        let before = self.contexts.len();

        self.contexts.retain(|key, context| {
            if context.ttl_ms <= elapsed_ms {
                debug!(
                    "Discarding incomplete datagram {} from {}.",
                    key.id, key.src_addr
                );
                false
            } else {
                context.ttl_ms -= elapsed_ms;
                true
            }
        });

        before - self.contexts.len()
    }
}
