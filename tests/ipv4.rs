#[macro_use]
extern crate assert_matches;

mod context;

use adapternet::core::reassembly::REASSEMBLY_TTL_MS;
use adapternet::core::repr::{
    eth_types,
    ipv4_flags,
    ipv4_protocols,
    EthernetAddress,
    Icmpv4Repr,
    Ipv4Address,
    Ipv4Repr,
};
use adapternet::core::service::{
    icmpv4,
    ipv4,
    udp,
};
use adapternet::Error;
use rand::Rng;

use crate::context::*;

fn payload(len: usize) -> Vec<u8> {
    (0 .. len).map(|i| (i % 251) as u8).collect()
}

fn answering_context() -> Context {
    let mut config = Context::static_config();
    config.answer_echo = true;
    Context::with_config(DEV_MAC, MTU, config)
}

fn bounded_context(mtu: usize, max_buffers: usize) -> Context {
    let mut config = Context::static_config();
    config.max_buffers = Some(max_buffers);
    Context::with_config(DEV_MAC, mtu, config)
}

/// An echo request from the peer split at the given byte offsets.
fn echo_request_fragments(id: u16, data: &[u8], splits: &[usize]) -> Vec<Vec<u8>> {
    let message = icmp_message(&Icmpv4Repr::EchoRequest { id: 7, seq: 1 }, data);
    let ipv4_repr = Ipv4Repr {
        src_addr: PEER_IPV4,
        dst_addr: DEV_IPV4,
        protocol: ipv4_protocols::ICMP,
        payload_len: 0,
    };

    let mut bounds = vec![0];
    bounds.extend_from_slice(splits);
    bounds.push(message.len());

    bounds
        .windows(2)
        .map(|bound| {
            let last = bound[1] == message.len();
            let flags = if last { 0 } else { ipv4_flags::MORE_FRAGMENTS };
            let packet = ipv4_packet(
                &ipv4_repr,
                id,
                flags,
                bound[0],
                &message[bound[0] .. bound[1]],
            );
            eth_frame(DEV_MAC, PEER_MAC, eth_types::IPV4, &packet)
        })
        .collect()
}

#[test]
fn test_fragment_to_mtu() {
    let mut context = Context::with_static(576);
    context.learn(PEER_IPV4, PEER_MAC);

    let data = payload(1500);
    udp::send_packet(&mut context.interface, 4000, PEER_IPV4, 4001, &data).unwrap();

    let captures = context
        .sent()
        .iter()
        .map(|frame| sent_ipv4(frame).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(captures.len(), 3);

    let mut datagram = Vec::new();
    for (i, capture) in captures.iter().enumerate() {
        let last = i == captures.len() - 1;

        assert_eq!(capture.eth_dst, PEER_MAC);
        assert_eq!(capture.id, captures[0].id);
        assert_eq!(capture.offset, datagram.len());
        assert!(capture.repr.buffer_len() <= 576);
        assert_eq!(
            capture.flags & ipv4_flags::MORE_FRAGMENTS != 0,
            !last
        );
        if !last {
            assert_eq!(capture.payload.len() % 8, 0);
        }

        datagram.extend_from_slice(&capture.payload);
    }

    // UDP header followed by the original data.
    assert_eq!(datagram.len(), 8 + data.len());
    assert_eq!(&datagram[8 ..], &data[..]);
}

#[test]
fn test_fragments_share_fresh_identification() {
    let mut context = Context::with_static(MTU);
    context.learn(PEER_IPV4, PEER_MAC);

    udp::send_packet(&mut context.interface, 4000, PEER_IPV4, 4001, b"one").unwrap();
    udp::send_packet(&mut context.interface, 4000, PEER_IPV4, 4001, b"two").unwrap();

    let sent = context.sent();
    let first = sent_ipv4(&sent[0]).unwrap();
    let second = sent_ipv4(&sent[1]).unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(first.flags, 0);
    assert_eq!(first.offset, 0);
}

#[test]
fn test_fragments_wait_on_arp() {
    let mut context = Context::with_static(576);

    udp::send_packet(&mut context.interface, 4000, PEER_IPV4, 4001, &payload(1500)).unwrap();

    let sent = context.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent_arp(&sent[0]).is_some());
    assert_eq!(context.interface.arp_cache.pending_len(PEER_IPV4), 3);

    context.learn(PEER_IPV4, PEER_MAC);

    let offsets = context
        .sent()
        .iter()
        .map(|frame| {
            let capture = sent_ipv4(frame).unwrap();
            assert_eq!(capture.eth_dst, PEER_MAC);
            capture.offset
        })
        .collect::<Vec<_>>();
    assert_eq!(offsets, vec![0, 552, 1104]);
}

#[test]
fn test_unresolved_datagram_abandoned_when_pool_runs_out() {
    // Two buffers hold only two of the three fragments.
    let mut context = bounded_context(576, 2);

    assert_matches!(
        udp::send_packet(&mut context.interface, 4000, PEER_IPV4, 4001, &payload(1500)),
        Err(Error::Exhausted)
    );

    let sent = context.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent_arp(&sent[0]).is_some());
    assert_eq!(context.interface.arp_cache.pending_len(PEER_IPV4), 0);
    assert_eq!(context.interface.pool.outstanding(), 0);

    // Nothing of the datagram is flushed once the peer answers.
    context.learn(PEER_IPV4, PEER_MAC);
    assert!(context.sent().is_empty());

    // A datagram that fits the pool still goes out whole.
    udp::send_packet(&mut context.interface, 4000, PEER_IPV4, 4001, &payload(1000)).unwrap();
    let offsets = context
        .sent()
        .iter()
        .map(|frame| sent_ipv4(frame).unwrap().offset)
        .collect::<Vec<_>>();
    assert_eq!(offsets, vec![0, 552]);
    assert_eq!(context.interface.pool.outstanding(), 0);
}

#[test]
fn test_resolved_datagram_abandoned_when_pool_runs_out() {
    let mut context = bounded_context(576, 2);
    context.learn(PEER_IPV4, PEER_MAC);

    assert_matches!(
        udp::send_packet(&mut context.interface, 4000, PEER_IPV4, 4001, &payload(1500)),
        Err(Error::Exhausted)
    );
    assert!(context.sent().is_empty());
    assert_eq!(context.interface.pool.outstanding(), 0);
}

#[test]
fn test_shuffled_fragments_reassemble_at_peer() {
    let data = payload(1400);

    for _ in 0 .. 8 {
        let mut context = Context::with_static(576);
        let mut peer = Context::peer(MTU);
        context.learn(PEER_IPV4, PEER_MAC);

        icmpv4::send_packet(
            &mut context.interface,
            PEER_IPV4,
            &Icmpv4Repr::EchoRequest { id: 3, seq: 5 },
            &data,
        ).unwrap();

        let mut fragments = context.sent();
        assert_eq!(fragments.len(), 3);
        rand::thread_rng().shuffle(&mut fragments);

        for fragment in &fragments {
            peer.recv(fragment);
        }

        let sent = peer.sent();
        assert_eq!(sent.len(), 1);
        let (capture, icmp_repr, reply) = sent_icmp(&sent[0]).unwrap();
        assert_eq!(capture.eth_dst, DEV_MAC);
        assert_eq!(capture.repr.dst_addr, DEV_IPV4);
        assert_eq!(icmp_repr, Icmpv4Repr::EchoReply { id: 3, seq: 5 });
        assert_eq!(reply, data);
        assert!(peer.interface.reassembler.is_empty());
    }
}

#[test]
fn test_dont_fragment_oversized() {
    let mut context = Context::with_static(576);
    context.learn(PEER_IPV4, PEER_MAC);

    assert_matches!(
        ipv4::send_packet(
            &mut context.interface,
            PEER_IPV4,
            ipv4_protocols::UDP,
            true,
            &payload(557)
        ),
        Err(Error::Oversized)
    );
    assert_matches!(
        ipv4::send_packet(
            &mut context.interface,
            PEER_IPV4,
            ipv4_protocols::UDP,
            true,
            &payload(556)
        ),
        Ok(())
    );
    assert_eq!(context.sent().len(), 1);
}

#[test]
fn test_send_with_link_down() {
    let mut context = Context::with_static(MTU);
    context.interface.set_link(false);

    assert_matches!(
        udp::send_packet(&mut context.interface, 4000, PEER_IPV4, 4001, b"hello"),
        Err(Error::Disabled)
    );
    assert!(context.sent().is_empty());
}

#[test]
fn test_route_via_gateway() {
    let mut context = Context::with_static(MTU);
    let remote = Ipv4Address::new([8, 8, 8, 8]);

    assert_eq!(
        ipv4::route(&context.interface, remote),
        ipv4::Route::Gateway(GATEWAY_IPV4)
    );

    icmpv4::send_ping(&mut context.interface, remote).unwrap();
    let sent = context.sent();
    assert_eq!(sent.len(), 1);
    let (_, request) = sent_arp(&sent[0]).unwrap();
    assert_eq!(request.target_proto_addr, GATEWAY_IPV4);

    context.learn(GATEWAY_IPV4, GATEWAY_MAC);

    let sent = context.sent();
    assert_eq!(sent.len(), 1);
    let capture = sent_ipv4(&sent[0]).unwrap();
    assert_eq!(capture.eth_dst, GATEWAY_MAC);
    assert_eq!(capture.repr.dst_addr, remote);
}

#[test]
fn test_broadcast_needs_no_resolution() {
    let mut context = Context::with_static(MTU);

    udp::send_packet(
        &mut context.interface,
        4000,
        Ipv4Address::new([10, 0, 0, 255]),
        4001,
        b"hello",
    ).unwrap();

    let sent = context.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent_ipv4(&sent[0]).unwrap().eth_dst, EthernetAddress::BROADCAST);
}

#[test]
fn test_reassemble_out_of_order() {
    let mut context = answering_context();

    let data = payload(1200);
    let fragments = echo_request_fragments(42, &data, &[400, 800]);
    for &i in [2usize, 0, 1].iter() {
        context.recv(&fragments[i]);
    }

    let sent = context.sent();
    assert_eq!(sent.len(), 1);
    let (capture, icmp_repr, reply) = sent_icmp(&sent[0]).unwrap();
    assert_eq!(capture.eth_dst, PEER_MAC);
    assert_eq!(capture.repr.dst_addr, PEER_IPV4);
    assert_eq!(icmp_repr, Icmpv4Repr::EchoReply { id: 7, seq: 1 });
    assert_eq!(reply, data);
    assert!(context.interface.reassembler.is_empty());
}

#[test]
fn test_reassembly_times_out() {
    let mut context = answering_context();

    let fragments = echo_request_fragments(42, &payload(1200), &[400, 800]);
    context.recv(&fragments[0]);
    context.recv(&fragments[1]);
    assert_eq!(context.interface.reassembler.len(), 1);

    context.tick(REASSEMBLY_TTL_MS);
    assert!(context.interface.reassembler.is_empty());

    context.recv(&fragments[2]);
    assert!(context.sent().is_empty());
    assert_eq!(context.interface.reassembler.len(), 1);
}

#[test]
fn test_ignores_other_destination() {
    let mut context = Context::with_static(MTU);

    let ipv4_repr = Ipv4Repr {
        src_addr: PEER_IPV4,
        dst_addr: Ipv4Address::new([10, 0, 0, 99]),
        protocol: ipv4_protocols::ICMP,
        payload_len: 0,
    };
    let message = icmp_message(&Icmpv4Repr::EchoRequest { id: 7, seq: 1 }, b"ping");
    context.recv(&ipv4_frame(PEER_MAC, DEV_MAC, &ipv4_repr, &message));

    assert!(context.sent().is_empty());
    assert!(context.interface.arp_cache.is_empty());
}

#[test]
fn test_ignores_bad_header_checksum() {
    let mut context = Context::with_static(MTU);

    let ipv4_repr = Ipv4Repr {
        src_addr: PEER_IPV4,
        dst_addr: DEV_IPV4,
        protocol: ipv4_protocols::ICMP,
        payload_len: 0,
    };
    let message = icmp_message(&Icmpv4Repr::EchoRequest { id: 7, seq: 1 }, b"ping");
    let mut frame = ipv4_frame(PEER_MAC, DEV_MAC, &ipv4_repr, &message);
    // TTL lives at byte 8 of the IPv4 header.
    frame[14 + 8] ^= 0xFF;
    context.recv(&frame);

    assert!(context.sent().is_empty());
}
