use std::collections::{
    HashMap,
    VecDeque,
};

use crate::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use crate::core::storage::PacketBuffer;

/// How long a frame may wait for its next hop to resolve.
pub const PENDING_WAIT_MS: u32 = 5_000;

/// How long a resolved mapping stays in the cache.
pub const CACHE_TTL_MS: u32 = 60_000;

#[derive(Debug)]
struct Pending {
    buffer: PacketBuffer,
    wait_ms: u32,
}

#[derive(Debug)]
struct Entry {
    eth_addr: Option<EthernetAddress>,
    pending: VecDeque<Pending>,
    // While frames are pending this is the longest wait among them, afterwards
    // it is the age limit of the mapping.
    ttl_ms: u32,
}

/// Maintains IPv4 -> ethernet address mappings and the frames waiting on
/// them.
///
/// An entry is resolved once it holds an ethernet address and nothing is
/// queued on it. Entries age only when `tick` is called.
#[derive(Debug)]
pub struct ArpCache {
    entries: HashMap<Ipv4Address, Entry>,
    cache_ttl_ms: u32,
    pending_wait_ms: u32,
}

impl Default for ArpCache {
    fn default() -> ArpCache {
        ArpCache::new(CACHE_TTL_MS, PENDING_WAIT_MS)
    }
}

impl ArpCache {
    /// Creates an ARP cache where mappings expire after cache_ttl_ms and queued
    /// frames are dropped after pending_wait_ms.
    pub fn new(cache_ttl_ms: u32, pending_wait_ms: u32) -> ArpCache {
        ArpCache {
            entries: HashMap::new(),
            cache_ttl_ms,
            pending_wait_ms,
        }
    }

    /// Lookup the ethernet address for an IPv4 address.
    pub fn eth_addr_for_ip(&self, ipv4_addr: Ipv4Address) -> Option<EthernetAddress> {
        match self.entries.get(&ipv4_addr) {
            Some(entry) if entry.pending.is_empty() => entry.eth_addr,
            _ => None,
        }
    }

    /// Checks if any entry, resolved or not, exists for an IPv4 address.
    pub fn contains(&self, ipv4_addr: Ipv4Address) -> bool {
        self.entries.contains_key(&ipv4_addr)
    }

    /// Checks if frames are queued waiting on an IPv4 address.
    pub fn is_pending(&self, ipv4_addr: Ipv4Address) -> bool {
        match self.entries.get(&ipv4_addr) {
            Some(entry) => !entry.pending.is_empty(),
            None => false,
        }
    }

    /// Returns the number of frames queued on an IPv4 address.
    pub fn pending_len(&self, ipv4_addr: Ipv4Address) -> usize {
        self.entries
            .get(&ipv4_addr)
            .map_or(0, |entry| entry.pending.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records that a request for an IPv4 address is outstanding.
    ///
    /// The placeholder ages out after the pending wait unless a reply
    /// resolves it first.
    pub fn insert_unresolved(&mut self, ipv4_addr: Ipv4Address) {
        let pending_wait_ms = self.pending_wait_ms;
        self.entries.entry(ipv4_addr).or_insert_with(|| Entry {
            eth_addr: None,
            pending: VecDeque::new(),
            ttl_ms: pending_wait_ms,
        });
    }

    /// Queues a frame until the IPv4 address resolves.
    pub fn queue(&mut self, ipv4_addr: Ipv4Address, buffer: PacketBuffer) {
        let pending_wait_ms = self.pending_wait_ms;
        let entry = self.entries.entry(ipv4_addr).or_insert_with(|| Entry {
            eth_addr: None,
            pending: VecDeque::new(),
            ttl_ms: 0,
        });

        entry.pending.push_back(Pending {
            buffer,
            wait_ms: pending_wait_ms,
        });
        entry.ttl_ms = entry.ttl_ms.max(pending_wait_ms);
    }

    /// Create or update the ethernet address mapping for an IPv4 address.
    ///
    /// Returns the frames that were waiting on the address in the order they
    /// were queued.
    pub fn set_eth_addr_for_ip(
        &mut self,
        ipv4_addr: Ipv4Address,
        eth_addr: EthernetAddress,
    ) -> Vec<PacketBuffer> {
        let cache_ttl_ms = self.cache_ttl_ms;
        let entry = self.entries.entry(ipv4_addr).or_insert_with(|| Entry {
            eth_addr: None,
            pending: VecDeque::new(),
            ttl_ms: 0,
        });

        entry.eth_addr = Some(eth_addr);
        entry.ttl_ms = cache_ttl_ms;
        entry.pending.drain(..).map(|pending| pending.buffer).collect()
    }

    /// Removes an entry, returning any frames queued on it.
    pub fn remove(&mut self, ipv4_addr: Ipv4Address) -> Vec<PacketBuffer> {
        match self.entries.remove(&ipv4_addr) {
            Some(entry) => entry.pending.into_iter().map(|pending| pending.buffer).collect(),
            None => Vec::new(),
        }
    }

    /// Removes every entry, returning all queued frames.
    pub fn clear(&mut self) -> Vec<PacketBuffer> {
        self.entries
            .drain()
            .flat_map(|(_, entry)| entry.pending.into_iter().map(|pending| pending.buffer))
            .collect()
    }

    /// Ages queued frames and entries by elapsed_ms.
    ///
    /// Frames whose wait runs out are returned for disposal. Entries are
    /// evicted once their TTL runs out with nothing queued, but never during
    /// a tick that found them pending.
    pub fn tick(&mut self, elapsed_ms: u32) -> Vec<PacketBuffer> {
        let mut expired = Vec::new();

        self.entries.retain(|ipv4_addr, entry| {
            let was_pending = !entry.pending.is_empty();

            let mut remaining = VecDeque::with_capacity(entry.pending.len());
            for mut pending in entry.pending.drain(..) {
                if pending.wait_ms <= elapsed_ms {
                    debug!("Dropping frame waiting on ARP for {}.", ipv4_addr);
                    expired.push(pending.buffer);
                } else {
                    pending.wait_ms -= elapsed_ms;
                    remaining.push_back(pending);
                }
            }
            entry.pending = remaining;

            entry.ttl_ms = entry.ttl_ms.saturating_sub(elapsed_ms);

            was_pending || entry.ttl_ms > 0
        });

        expired
    }
}
