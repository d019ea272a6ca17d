use crate::core::reassembly::{
    Fragment,
    MAX_PAYLOAD_LEN,
};
use crate::core::repr::{
    eth_types,
    ipv4_flags,
    ipv4_protocols,
    EthernetAddress,
    Ipv4Address,
    Ipv4Packet,
    Ipv4Repr,
};
use crate::core::service::{
    arp,
    ethernet,
    icmpv4,
    udp,
    Interface,
};
use crate::core::storage::PacketBuffer;
use crate::{
    Error,
    Result,
};

/// TTL of outgoing packets.
pub const HOP_TTL: u8 = 64;

/// Where an outgoing packet is handed over on the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Broadcast to every host on the link.
    Broadcast,
    /// Delivered straight to a host on the subnet.
    Direct(Ipv4Address),
    /// Delivered via the default gateway.
    Gateway(Ipv4Address),
}

/// Chooses the route for a destination address.
pub fn route(interface: &Interface, dst_addr: Ipv4Address) -> Route {
    let addr = interface.ipv4.addr;

    if dst_addr.is_broadcast() || (interface.ipv4.is_configured() && dst_addr == addr.broadcast()) {
        Route::Broadcast
    } else if addr.is_member(dst_addr) {
        Route::Direct(dst_addr)
    } else {
        debug!(
            "Routing {} via default gateway {}.",
            dst_addr, interface.ipv4.default_gateway
        );
        Route::Gateway(interface.ipv4.default_gateway)
    }
}

/// Sends an IPv4 payload via an interface, fragmenting it to fit the device
/// MTU.
///
/// Fragments carry 8 byte aligned slices of the payload under one
/// identification. If the next hop is not resolved yet, fragments wait on ARP
/// and are sent once it is. Payloads too large for the MTU fail with
/// `Error::Oversized` when dont_fragment is set.
pub fn send_packet(
    interface: &mut Interface,
    dst_addr: Ipv4Address,
    protocol: u8,
    dont_fragment: bool,
    payload: &[u8],
) -> Result<()> {
    if !interface.is_link_up() {
        return Err(Error::Disabled);
    }

    let mtu = interface.dev.max_transmission_unit();
    let budget = mtu.saturating_sub(Ipv4Packet::<&[u8]>::HEADER_LEN);

    if payload.len() > MAX_PAYLOAD_LEN || (payload.len() > budget && dont_fragment) {
        debug!(
            "Refusing to send {} byte payload to {} with MTU {}.",
            payload.len(),
            dst_addr,
            mtu
        );
        return Err(Error::Oversized);
    }

    let chunk_len = if payload.len() <= budget {
        payload.len().max(1)
    } else {
        budget & !7
    };
    if chunk_len == 0 {
        return Err(Error::Oversized);
    }

    let (next_hop, eth_addr) = match route(interface, dst_addr) {
        Route::Broadcast => (dst_addr, Some(EthernetAddress::BROADCAST)),
        Route::Gateway(next_hop) if next_hop.is_unspecified() => {
            debug!("No gateway to reach {}.", dst_addr);
            return Err(Error::Address);
        }
        Route::Direct(next_hop) | Route::Gateway(next_hop) => {
            (next_hop, arp::resolve(interface, next_hop, false)?)
        }
    };

    let ident = interface.ipv4_ident;
    interface.ipv4_ident = interface.ipv4_ident.wrapping_add(1);

    let ipv4_repr = Ipv4Repr {
        src_addr: interface.ipv4.addr.addr(),
        dst_addr,
        protocol,
        payload_len: 0,
    };

    // Every fragment is built before any leaves, so a datagram goes out whole
    // or not at all.
    let mut buffers = Vec::new();
    let mut offset = 0;
    loop {
        let end = payload.len().min(offset + chunk_len);
        let more_fragments = end < payload.len();

        let mut flags = 0;
        if dont_fragment {
            flags |= ipv4_flags::DONT_FRAGMENT;
        }
        if more_fragments {
            flags |= ipv4_flags::MORE_FRAGMENTS;
        }

        let built = build_packet(
            interface,
            eth_addr.unwrap_or(EthernetAddress::UNSPECIFIED),
            &Ipv4Repr {
                payload_len: (end - offset) as u16,
                ..ipv4_repr
            },
            ident,
            flags,
            offset,
            &payload[offset .. end],
        );

        match built {
            Ok(buffer) => buffers.push(buffer),
            Err(err) => {
                debug!(
                    "Abandoning datagram {} to {} after {} fragments with {:?}.",
                    ident,
                    dst_addr,
                    buffers.len(),
                    err
                );
                for buffer in buffers {
                    interface.pool.put(buffer);
                }
                return Err(err);
            }
        }

        if !more_fragments {
            break;
        }
        offset = end;
    }

    match eth_addr {
        Some(_) => {
            let mut buffers = buffers.into_iter();
            while let Some(buffer) = buffers.next() {
                if let Err(err) = ethernet::send_buffer(interface, buffer) {
                    for buffer in buffers {
                        interface.pool.put(buffer);
                    }
                    return Err(err);
                }
            }
            Ok(())
        }
        None => {
            for buffer in buffers {
                arp::queue(interface, next_hop, buffer);
            }
            Ok(())
        }
    }
}

fn build_packet(
    interface: &mut Interface,
    eth_addr: EthernetAddress,
    ipv4_repr: &Ipv4Repr,
    ident: u16,
    flags: u8,
    offset: usize,
    chunk: &[u8],
) -> Result<PacketBuffer> {
    ethernet::build_frame(
        interface,
        eth_addr,
        eth_types::IPV4,
        ipv4_repr.buffer_len(),
        |buffer| {
            let mut packet = Ipv4Packet::try_new(buffer)?;
            ipv4_repr.serialize(&mut packet, ident, HOP_TTL);
            packet.set_flags(flags);
            packet.set_fragment_offset((offset / 8) as u16);
            packet.fill_checksum();
            packet.payload_mut().copy_from_slice(chunk);
            Ok(())
        },
    )
}

/// Receives an IPv4 packet from an interface.
///
/// Packets are accepted when addressed to the interface, to a broadcast
/// address, or to anyone while the interface has no address yet. Fragments
/// are held until their datagram is complete.
pub fn recv_packet(
    interface: &mut Interface,
    src_eth_addr: EthernetAddress,
    payload: &[u8],
) -> Result<()> {
    let packet = Ipv4Packet::try_new(payload)?;
    packet.check_encoding()?;

    let ipv4_repr = Ipv4Repr::deserialize(&packet);
    let addr = interface.ipv4.addr;

    let accepted = !interface.ipv4.is_configured()
        || ipv4_repr.dst_addr == addr.addr()
        || ipv4_repr.dst_addr.is_broadcast()
        || ipv4_repr.dst_addr == addr.broadcast();

    if !accepted {
        debug!(
            "Ignoring IPv4 packet with destination {}.",
            ipv4_repr.dst_addr
        );
        return Err(Error::Ignored);
    }

    if !ipv4_repr.src_addr.is_unspecified()
        && !ipv4_repr.src_addr.is_broadcast()
        && src_eth_addr.is_unicast()
    {
        arp::update(interface, ipv4_repr.src_addr, src_eth_addr);
    }

    if !packet.is_fragment() {
        return dispatch(interface, &ipv4_repr, packet.payload());
    }

    let fragment = Fragment {
        src_addr: ipv4_repr.src_addr,
        dst_addr: ipv4_repr.dst_addr,
        protocol: ipv4_repr.protocol,
        id: packet.identification(),
        offset: packet.fragment_offset() as usize * 8,
        last: (packet.flags() & ipv4_flags::MORE_FRAGMENTS) == 0,
        payload: packet.payload(),
    };

    match interface.reassembler.add(&fragment)? {
        Some(datagram) => {
            debug!(
                "Reassembled {} byte datagram from {}.",
                datagram.payload.len(),
                datagram.src_addr
            );
            let ipv4_repr = Ipv4Repr {
                src_addr: datagram.src_addr,
                dst_addr: datagram.dst_addr,
                protocol: datagram.protocol,
                payload_len: datagram.payload.len() as u16,
            };
            dispatch(interface, &ipv4_repr, &datagram.payload)
        }
        None => Ok(()),
    }
}

fn dispatch(interface: &mut Interface, ipv4_repr: &Ipv4Repr, payload: &[u8]) -> Result<()> {
    match ipv4_repr.protocol {
        ipv4_protocols::UDP => udp::recv_packet(interface, ipv4_repr, payload),
        ipv4_protocols::ICMP => icmpv4::recv_packet(interface, ipv4_repr, payload),
        i => {
            debug!("Ignoring IPv4 packet with protocol {}.", i);
            Err(Error::Ignored)
        }
    }
}

/// Ages partially reassembled datagrams.
pub fn tick(interface: &mut Interface, elapsed_ms: u32) {
    interface.reassembler.tick(elapsed_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dev::MockDevice;
    use crate::core::repr::Ipv4AddressCidr;
    use crate::core::service::Config;

    fn interface() -> Interface {
        let dev = MockDevice::new(EthernetAddress::new([0, 1, 2, 3, 4, 5]), 1500);
        let config = Config::with_static(
            "host",
            Ipv4AddressCidr::new(Ipv4Address::new([10, 0, 0, 2]), 24),
            Ipv4Address::new([10, 0, 0, 1]),
        );
        Interface::new(Box::new(dev), config)
    }

    #[test]
    fn test_route() {
        let interface = interface();
        assert_eq!(
            route(&interface, Ipv4Address::BROADCAST),
            Route::Broadcast
        );
        assert_eq!(
            route(&interface, Ipv4Address::new([10, 0, 0, 255])),
            Route::Broadcast
        );
        assert_eq!(
            route(&interface, Ipv4Address::new([10, 0, 0, 7])),
            Route::Direct(Ipv4Address::new([10, 0, 0, 7]))
        );
        assert_eq!(
            route(&interface, Ipv4Address::new([8, 8, 8, 8])),
            Route::Gateway(Ipv4Address::new([10, 0, 0, 1]))
        );
    }

    #[test]
    fn test_route_unconfigured() {
        let dev = MockDevice::new(EthernetAddress::new([0, 1, 2, 3, 4, 5]), 1500);
        let interface = Interface::new(Box::new(dev), Config::dhcp_client("host"));
        assert_eq!(
            route(&interface, Ipv4Address::BROADCAST),
            Route::Broadcast
        );
    }

    #[test]
    fn test_send_oversized_dont_fragment() {
        let mut interface = interface();
        interface.start();
        assert_matches!(
            send_packet(
                &mut interface,
                Ipv4Address::BROADCAST,
                ipv4_protocols::UDP,
                true,
                &[0; 1481]
            ),
            Err(Error::Oversized)
        );
    }
}
