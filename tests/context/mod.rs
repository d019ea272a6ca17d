#![allow(dead_code)]

use adapternet::core::dev::MockDevice;
use adapternet::core::repr::{
    eth_types,
    ipv4_protocols,
    Arp,
    ArpOp,
    DhcpMessageType,
    DhcpPacket,
    DhcpRepr,
    EthernetAddress,
    EthernetFrame,
    Icmpv4Packet,
    Icmpv4Repr,
    Ipv4Address,
    Ipv4AddressCidr,
    Ipv4Packet,
    Ipv4Repr,
    UdpPacket,
    UdpRepr,
};
use adapternet::core::repr::dhcp::{
    CLIENT_PORT,
    SERVER_PORT,
};
use adapternet::core::service::{
    Config,
    Interface,
};

pub const MTU: usize = 1500;

pub const DEV_MAC: EthernetAddress = EthernetAddress::new([0x06, 0x11, 0x22, 0x33, 0x44, 0x55]);

pub const DEV_IPV4: Ipv4Address = Ipv4Address::new([10, 0, 0, 102]);

pub const GATEWAY_MAC: EthernetAddress = EthernetAddress::new([0x06, 0, 0, 0, 0, 0x01]);

pub const GATEWAY_IPV4: Ipv4Address = Ipv4Address::new([10, 0, 0, 101]);

pub const PEER_MAC: EthernetAddress = EthernetAddress::new([0x06, 0, 0, 0, 0, 0x07]);

pub const PEER_IPV4: Ipv4Address = Ipv4Address::new([10, 0, 0, 7]);

pub const SERVER_MAC: EthernetAddress = EthernetAddress::new([0x06, 0, 0, 0, 0, 0x02]);

pub const SERVER_IPV4: Ipv4Address = Ipv4Address::new([192, 168, 1, 1]);

pub const OFFERED_IPV4: Ipv4Address = Ipv4Address::new([192, 168, 1, 50]);

pub const DNS_IPV4: Ipv4Address = Ipv4Address::new([192, 168, 1, 2]);

/// An interface over a mock device, already started.
pub struct Context {
    pub interface: Interface,
    pub dev: MockDevice,
}

impl Context {
    /// An interface at 10.0.0.102/24 with gateway 10.0.0.101.
    pub fn with_static(mtu: usize) -> Context {
        Context::with_config(DEV_MAC, mtu, Context::static_config())
    }

    /// An interface leasing its address via DHCP.
    pub fn dhcp_client() -> Context {
        Context::with_config(DEV_MAC, MTU, Config::dhcp_client("host"))
    }

    /// The peer at 10.0.0.7/24, answering echo requests.
    pub fn peer(mtu: usize) -> Context {
        let mut config = Config::with_static(
            "peer",
            Ipv4AddressCidr::new(PEER_IPV4, 24),
            GATEWAY_IPV4,
        );
        config.answer_echo = true;
        Context::with_config(PEER_MAC, mtu, config)
    }

    /// The configuration of `with_static`, for tests adjusting it.
    pub fn static_config() -> Config {
        Config::with_static(
            "host",
            Ipv4AddressCidr::new(DEV_IPV4, 24),
            GATEWAY_IPV4,
        )
    }

    pub fn with_config(eth_addr: EthernetAddress, mtu: usize, config: Config) -> Context {
        let _ = env_logger::try_init();

        let dev = MockDevice::new(eth_addr, mtu);
        let mut interface = Interface::new(Box::new(dev.clone()), config);
        interface.start();

        Context { interface, dev }
    }

    pub fn recv(&mut self, frame: &[u8]) {
        self.interface.recv_frame(frame);
    }

    pub fn tick(&mut self, elapsed_ms: u32) {
        self.interface.tick(elapsed_ms);
    }

    /// Removes every frame sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.dev.take_sent()
    }

    /// Teaches the interface a peer's ethernet address.
    pub fn learn(&mut self, ipv4_addr: Ipv4Address, eth_addr: EthernetAddress) {
        let reply = Arp {
            op: ArpOp::Reply,
            source_hw_addr: eth_addr,
            source_proto_addr: ipv4_addr,
            target_hw_addr: self.interface.ethernet_addr,
            target_proto_addr: self.interface.ipv4.addr.addr(),
        };
        let dst_addr = self.interface.ethernet_addr;
        self.recv(&arp_frame(&reply, dst_addr));
    }
}

pub fn eth_frame(
    dst_addr: EthernetAddress,
    src_addr: EthernetAddress,
    payload_type: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut buffer = vec![0; EthernetFrame::<&[u8]>::buffer_len(payload.len())];
    {
        let mut frame = EthernetFrame::try_new(&mut buffer[..]).unwrap();
        frame.set_dst_addr(dst_addr);
        frame.set_src_addr(src_addr);
        frame.set_payload_type(payload_type);
        frame.payload_mut().copy_from_slice(payload);
    }
    buffer
}

pub fn arp_frame(arp: &Arp, dst_addr: EthernetAddress) -> Vec<u8> {
    let mut payload = vec![0; arp.buffer_len()];
    arp.serialize(&mut payload).unwrap();
    eth_frame(dst_addr, arp.source_hw_addr, eth_types::ARP, &payload)
}

/// Builds an IPv4 packet, fragment_offset in bytes.
pub fn ipv4_packet(
    ipv4_repr: &Ipv4Repr,
    id: u16,
    flags: u8,
    fragment_offset: usize,
    payload: &[u8],
) -> Vec<u8> {
    let ipv4_repr = Ipv4Repr {
        payload_len: payload.len() as u16,
        ..*ipv4_repr
    };
    let mut buffer = vec![0; ipv4_repr.buffer_len()];
    {
        let mut packet = Ipv4Packet::try_new(&mut buffer[..]).unwrap();
        ipv4_repr.serialize(&mut packet, id, 64);
        packet.set_flags(flags);
        packet.set_fragment_offset((fragment_offset / 8) as u16);
        packet.fill_checksum();
        packet.payload_mut().copy_from_slice(payload);
    }
    buffer
}

pub fn ipv4_frame(
    src_eth_addr: EthernetAddress,
    dst_eth_addr: EthernetAddress,
    ipv4_repr: &Ipv4Repr,
    payload: &[u8],
) -> Vec<u8> {
    eth_frame(
        dst_eth_addr,
        src_eth_addr,
        eth_types::IPV4,
        &ipv4_packet(ipv4_repr, 0, 0, 0, payload),
    )
}

pub fn udp_datagram(
    ipv4_repr: &Ipv4Repr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let len = UdpPacket::<&[u8]>::buffer_len(payload.len());
    let ipv4_repr = Ipv4Repr {
        payload_len: len as u16,
        ..*ipv4_repr
    };
    let mut buffer = vec![0; len];
    {
        let mut packet = UdpPacket::try_new(&mut buffer[..]).unwrap();
        packet.payload_mut().copy_from_slice(payload);
        UdpRepr {
            src_port,
            dst_port,
            length: len as u16,
        }.serialize(&mut packet, &ipv4_repr);
    }
    buffer
}

pub fn icmp_message(icmp_repr: &Icmpv4Repr, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0; Icmpv4Packet::<&[u8]>::buffer_len(payload.len())];
    {
        let mut packet = Icmpv4Packet::try_new(&mut buffer[..]).unwrap();
        packet.payload_mut().copy_from_slice(payload);
        icmp_repr.serialize(&mut packet);
    }
    buffer
}

/// A DHCP reply from SERVER_IPV4 carrying a complete lease for OFFERED_IPV4,
/// adjusted by f.
pub fn dhcp_frame<F>(message_type: DhcpMessageType, xid: u32, dst_addr: Ipv4Address, f: F) -> Vec<u8>
where
    F: FnOnce(&mut DhcpRepr),
{
    let mut dhcp_repr = DhcpRepr::new(message_type, xid, DEV_MAC);
    dhcp_repr.your_ip = OFFERED_IPV4;
    dhcp_repr.server_ip = SERVER_IPV4;
    dhcp_repr.subnet_mask = Some(Ipv4Address::new([255, 255, 255, 0]));
    dhcp_repr.router = Some(SERVER_IPV4);
    dhcp_repr.dns_servers = vec![DNS_IPV4];
    dhcp_repr.domain_name = Some("lan".to_string());
    dhcp_repr.server_identifier = Some(SERVER_IPV4);
    dhcp_repr.lease_duration = Some(3600);
    dhcp_repr.renew_duration = Some(1800);
    dhcp_repr.rebind_duration = Some(3150);
    f(&mut dhcp_repr);

    let mut payload = vec![0; dhcp_repr.buffer_len()];
    dhcp_repr
        .serialize(&mut DhcpPacket::try_new(&mut payload[..]).unwrap())
        .unwrap();

    let ipv4_repr = Ipv4Repr {
        src_addr: SERVER_IPV4,
        dst_addr,
        protocol: ipv4_protocols::UDP,
        payload_len: 0,
    };
    let datagram = udp_datagram(&ipv4_repr, SERVER_PORT, CLIENT_PORT, &payload);

    let dst_eth_addr = if dst_addr.is_broadcast() {
        EthernetAddress::BROADCAST
    } else {
        DEV_MAC
    };
    ipv4_frame(SERVER_MAC, dst_eth_addr, &ipv4_repr, &datagram)
}

/// An IPv4 packet captured from the device.
#[derive(Debug)]
pub struct Ipv4Capture {
    pub eth_dst: EthernetAddress,
    pub repr: Ipv4Repr,
    pub id: u16,
    pub flags: u8,
    /// Fragment offset in bytes.
    pub offset: usize,
    pub payload: Vec<u8>,
}

pub fn sent_ipv4(frame: &[u8]) -> Option<Ipv4Capture> {
    let frame = EthernetFrame::try_new(frame).ok()?;
    if frame.payload_type() != eth_types::IPV4 {
        return None;
    }

    let packet = Ipv4Packet::try_new(frame.payload()).ok()?;
    packet.check_encoding().ok()?;

    Some(Ipv4Capture {
        eth_dst: frame.dst_addr(),
        repr: Ipv4Repr::deserialize(&packet),
        id: packet.identification(),
        flags: packet.flags(),
        offset: packet.fragment_offset() as usize * 8,
        payload: packet.payload().to_vec(),
    })
}

pub fn sent_arp(frame: &[u8]) -> Option<(EthernetAddress, Arp)> {
    let frame = EthernetFrame::try_new(frame).ok()?;
    if frame.payload_type() != eth_types::ARP {
        return None;
    }
    Some((frame.dst_addr(), Arp::deserialize(frame.payload()).ok()?))
}

pub fn sent_udp(frame: &[u8]) -> Option<(Ipv4Capture, UdpRepr, Vec<u8>)> {
    let capture = sent_ipv4(frame)?;
    if capture.repr.protocol != ipv4_protocols::UDP {
        return None;
    }

    let (udp_repr, payload) = {
        let packet = UdpPacket::try_new(&capture.payload[..]).ok()?;
        packet.check_encoding(&capture.repr).ok()?;
        (UdpRepr::deserialize(&packet), packet.payload().to_vec())
    };
    Some((capture, udp_repr, payload))
}

pub fn sent_dhcp(frame: &[u8]) -> Option<(Ipv4Capture, DhcpRepr)> {
    let (capture, udp_repr, payload) = sent_udp(frame)?;
    if udp_repr.src_port != CLIENT_PORT || udp_repr.dst_port != SERVER_PORT {
        return None;
    }

    let packet = DhcpPacket::try_new(&payload[..]).ok()?;
    let dhcp_repr = DhcpRepr::deserialize(&packet).ok()?;
    Some((capture, dhcp_repr))
}

pub fn sent_icmp(frame: &[u8]) -> Option<(Ipv4Capture, Icmpv4Repr, Vec<u8>)> {
    let capture = sent_ipv4(frame)?;
    if capture.repr.protocol != ipv4_protocols::ICMP {
        return None;
    }

    let (icmp_repr, payload) = {
        let packet = Icmpv4Packet::try_new(&capture.payload[..]).ok()?;
        packet.check_encoding().ok()?;
        (Icmpv4Repr::deserialize(&packet).ok()?, packet.payload().to_vec())
    };
    Some((capture, icmp_repr, payload))
}
