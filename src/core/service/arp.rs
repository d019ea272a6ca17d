use crate::core::repr::{
    eth_types,
    Arp,
    ArpOp,
    EthernetAddress,
    Ipv4Address,
};
use crate::core::service::{
    ethernet,
    Interface,
};
use crate::core::storage::PacketBuffer;
use crate::Result;

/// Sends an ARP packet via an interface.
pub fn send_packet(
    interface: &mut Interface,
    arp_repr: &Arp,
    dst_addr: EthernetAddress,
) -> Result<()> {
    ethernet::send_frame(
        interface,
        dst_addr,
        eth_types::ARP,
        arp_repr.buffer_len(),
        |payload| arp_repr.serialize(payload),
    )
}

/// Broadcasts a request for the Ethernet address of an IPv4 address.
pub fn send_request(interface: &mut Interface, ipv4_addr: Ipv4Address) -> Result<()> {
    let source_proto_addr = interface.ipv4.addr.addr();
    send_query(interface, source_proto_addr, ipv4_addr)
}

/// Broadcasts an [RFC 5227](https://tools.ietf.org/html/rfc5227) probe, i.e.
/// a request with an unspecified sender address, asking if any host claims an
/// IPv4 address.
pub fn send_probe(interface: &mut Interface, ipv4_addr: Ipv4Address) -> Result<()> {
    send_query(interface, Ipv4Address::UNSPECIFIED, ipv4_addr)
}

fn send_query(
    interface: &mut Interface,
    source_proto_addr: Ipv4Address,
    target_proto_addr: Ipv4Address,
) -> Result<()> {
    let arp_repr = Arp {
        op: ArpOp::Request,
        source_hw_addr: interface.ethernet_addr,
        source_proto_addr,
        target_hw_addr: EthernetAddress::UNSPECIFIED,
        target_proto_addr,
    };

    debug!("Sending ARP request for {}.", target_proto_addr);
    send_packet(interface, &arp_repr, EthernetAddress::BROADCAST)
}

/// Tries to retrieve the Ethernet address for an IPv4 address.
///
/// Returns `None` while the address is unresolved. Unless no_send is set, a
/// request is broadcast the first time an unknown address is seen and a
/// placeholder entry records that the request is outstanding. The reply (if
/// the IPv4 address exists on the network) is processed by `recv_packet(...)`
/// and resolves the entry.
pub fn resolve(
    interface: &mut Interface,
    ipv4_addr: Ipv4Address,
    no_send: bool,
) -> Result<Option<EthernetAddress>> {
    if let Some(eth_addr) = interface.arp_cache.eth_addr_for_ip(ipv4_addr) {
        return Ok(Some(eth_addr));
    }

    if no_send || interface.arp_cache.contains(ipv4_addr) {
        return Ok(None);
    }

    send_request(interface, ipv4_addr)?;
    interface.arp_cache.insert_unresolved(ipv4_addr);
    Ok(None)
}

/// Queues a framed buffer until an IPv4 address resolves.
///
/// The buffer's destination is rewritten once the Ethernet address is known.
pub fn queue(interface: &mut Interface, ipv4_addr: Ipv4Address, buffer: PacketBuffer) {
    debug!("Queueing frame until {} resolves.", ipv4_addr);
    interface.arp_cache.queue(ipv4_addr, buffer);
}

/// Records a mapping and sends every frame that was waiting on it, in the
/// order they were queued.
pub fn update(interface: &mut Interface, ipv4_addr: Ipv4Address, eth_addr: EthernetAddress) {
    let pending = interface.arp_cache.set_eth_addr_for_ip(ipv4_addr, eth_addr);

    if !pending.is_empty() {
        debug!(
            "Flushing {} frames queued for {}.",
            pending.len(),
            ipv4_addr
        );
    }

    for mut buffer in pending {
        if let Err(err) = interface.link.set_dst_addr(buffer.as_mut(), eth_addr) {
            debug!("Dropping queued frame with {:?}.", err);
            interface.pool.put(buffer);
            continue;
        }
        if let Err(err) = ethernet::send_buffer(interface, buffer) {
            debug!("Error flushing queued frame with {:?}.", err);
        }
    }
}

/// Forgets an IPv4 address, dropping any frames waiting on it.
pub fn clear(interface: &mut Interface, ipv4_addr: Ipv4Address) {
    for buffer in interface.arp_cache.remove(ipv4_addr) {
        interface.pool.put(buffer);
    }
}

/// Empties the cache, dropping every waiting frame.
pub fn clear_all(interface: &mut Interface) {
    for buffer in interface.arp_cache.clear() {
        interface.pool.put(buffer);
    }
}

/// Ages the cache, returning frames that waited too long to the pool.
pub fn tick(interface: &mut Interface, elapsed_ms: u32) {
    for buffer in interface.arp_cache.tick(elapsed_ms) {
        interface.pool.put(buffer);
    }
}

/// Receives an ARP packet from an interface.
///
/// Any sender with a unicast hardware address and a specified IPv4 address
/// updates the cache. Requests for the interface's own address are answered.
pub fn recv_packet(interface: &mut Interface, payload: &[u8]) -> Result<()> {
    let arp_repr = Arp::deserialize(payload)?;

    let valid_sender = arp_repr.source_hw_addr.is_unicast()
        && !arp_repr.source_hw_addr.is_unspecified()
        && !arp_repr.source_proto_addr.is_unspecified()
        && !arp_repr.source_proto_addr.is_broadcast();

    if valid_sender {
        debug!(
            "Received ARP, adding mapping from {} to {}.",
            arp_repr.source_proto_addr, arp_repr.source_hw_addr
        );
        update(
            interface,
            arp_repr.source_proto_addr,
            arp_repr.source_hw_addr,
        );
    }

    let ipv4_addr = interface.ipv4.addr.addr();

    match arp_repr.op {
        ArpOp::Request if !ipv4_addr.is_unspecified() && arp_repr.target_proto_addr == ipv4_addr => {
            let arp_reply = Arp {
                op: ArpOp::Reply,
                source_hw_addr: interface.ethernet_addr,
                source_proto_addr: ipv4_addr,
                target_hw_addr: arp_repr.source_hw_addr,
                target_proto_addr: arp_repr.source_proto_addr,
            };

            debug!(
                "Sending ARP reply to {}/{}.",
                arp_reply.target_proto_addr, arp_reply.target_hw_addr
            );

            send_packet(interface, &arp_reply, arp_reply.target_hw_addr)
        }
        _ => Ok(()),
    }
}
