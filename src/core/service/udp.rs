use crate::core::repr::{
    dhcp,
    ipv4_protocols,
    Ipv4Address,
    Ipv4Repr,
    UdpPacket,
    UdpRepr,
};
use crate::core::service::{
    dhcp as dhcp_client,
    ipv4,
    Interface,
};
use crate::{
    Error,
    Result,
};

/// Source port of DNS responses.
pub const DNS_PORT: u16 = 53;

/// Sends a UDP packet via an interface.
///
/// This function takes care of serializing a header, calculating a checksum,
/// etc. so the caller provides **only** the payload.
pub fn send_packet(
    interface: &mut Interface,
    src_port: u16,
    dst_addr: Ipv4Address,
    dst_port: u16,
    payload: &[u8],
) -> Result<()> {
    let udp_len = UdpPacket::<&[u8]>::buffer_len(payload.len());
    if udp_len > UdpPacket::<&[u8]>::MAX_PACKET_LEN {
        return Err(Error::Oversized);
    }

    let ipv4_repr = Ipv4Repr {
        src_addr: interface.ipv4.addr.addr(),
        dst_addr,
        protocol: ipv4_protocols::UDP,
        payload_len: udp_len as u16,
    };
    let udp_repr = UdpRepr {
        src_port,
        dst_port,
        length: udp_len as u16,
    };

    let mut buffer = vec![0; udp_len];
    {
        let mut udp_packet = UdpPacket::try_new(&mut buffer[..])?;
        udp_packet.payload_mut().copy_from_slice(payload);
        // The header is written after the payload so the checksum covers it.
        udp_repr.serialize(&mut udp_packet, &ipv4_repr);
    }

    ipv4::send_packet(interface, dst_addr, ipv4_protocols::UDP, false, &buffer)
}

/// Receives a UDP packet from an interface.
///
/// DHCP replies are handed to the DHCP client. There is no DNS resolver, so
/// DNS responses are only acknowledged in the log.
pub fn recv_packet(interface: &mut Interface, ipv4_repr: &Ipv4Repr, payload: &[u8]) -> Result<()> {
    let udp_packet = UdpPacket::try_new(payload)?;
    udp_packet.check_encoding(ipv4_repr)?;

    let udp_repr = UdpRepr::deserialize(&udp_packet);

    if udp_repr.dst_port == dhcp::CLIENT_PORT {
        dhcp_client::recv_packet(interface, ipv4_repr, udp_packet.payload())
    } else if udp_repr.src_port == DNS_PORT {
        debug!(
            "Ignoring DNS response from {} without a resolver.",
            ipv4_repr.src_addr
        );
        Err(Error::Ignored)
    } else {
        debug!(
            "Ignoring UDP packet from {}:{} to port {}.",
            ipv4_repr.src_addr, udp_repr.src_port, udp_repr.dst_port
        );
        Err(Error::Ignored)
    }
}
