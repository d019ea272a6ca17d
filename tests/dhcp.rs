#[macro_use]
extern crate assert_matches;

mod context;

use adapternet::core::repr::dhcp::INFINITE_LEASE;
use adapternet::core::repr::{
    ArpOp,
    DhcpMessageType,
    DhcpRepr,
    EthernetAddress,
    Ipv4Address,
    Ipv4AddressCidr,
};
use adapternet::core::service::dhcp::{
    State,
    RETRY_BUDGET,
    RETRY_PERIOD_MS,
};
use adapternet::core::service::Ipv4Config;

use crate::context::*;

const CONFLICT_MAC: EthernetAddress = EthernetAddress::new([0x06, 0, 0, 0, 0, 0x66]);

/// Takes the single DHCP message sent since the last call.
fn sent_message(context: &Context) -> (Ipv4Capture, DhcpRepr) {
    let sent = context.sent();
    assert_eq!(sent.len(), 1, "expected a single DHCP message");
    sent_dhcp(&sent[0]).expect("not a DHCP message")
}

/// Walks a fresh client to Bound, returning the transaction ID of the ACK.
fn bind(context: &mut Context) -> u32 {
    let (_, discover) = sent_message(context);
    let xid = discover.transaction_id;

    context.recv(&dhcp_frame(DhcpMessageType::Offer, xid, Ipv4Address::BROADCAST, |_| {}));
    sent_message(context);
    context.recv(&dhcp_frame(DhcpMessageType::Ack, xid, Ipv4Address::BROADCAST, |_| {}));
    context.sent();
    context.tick(RETRY_PERIOD_MS);

    assert_eq!(context.interface.dhcp.state, State::Bound);
    xid
}

fn leased() -> Ipv4Config {
    Ipv4Config {
        addr: Ipv4AddressCidr::new(OFFERED_IPV4, 24),
        default_gateway: SERVER_IPV4,
        dns_servers: vec![DNS_IPV4],
        domain_name: Some("lan".to_string()),
    }
}

#[test]
fn test_discover_on_start() {
    let context = Context::dhcp_client();
    assert_eq!(context.interface.dhcp.state, State::Init);
    assert_eq!(context.interface.dhcp.retries, RETRY_BUDGET);

    let (capture, discover) = sent_message(&context);
    assert_eq!(capture.eth_dst, EthernetAddress::BROADCAST);
    assert_eq!(capture.repr.src_addr, Ipv4Address::UNSPECIFIED);
    assert_eq!(capture.repr.dst_addr, Ipv4Address::BROADCAST);
    assert_eq!(discover.message_type, DhcpMessageType::Discover);
    assert_eq!(discover.client_hw_addr, DEV_MAC);
    assert_eq!(discover.client_identifier, Some(DEV_MAC));
    assert_eq!(discover.host_name, Some("host".to_string()));
    assert!(discover.broadcast);
    assert_eq!(
        discover.parameter_request_list,
        vec![1, 3, 6, 15, 51, 58, 59]
    );
}

#[test]
fn test_scripted_lease() {
    let mut context = Context::dhcp_client();
    let (_, discover) = sent_message(&context);
    let xid = discover.transaction_id;

    context.recv(&dhcp_frame(DhcpMessageType::Offer, xid, Ipv4Address::BROADCAST, |_| {}));
    assert_eq!(context.interface.dhcp.state, State::Selecting);

    let (capture, request) = sent_message(&context);
    assert_eq!(capture.repr.dst_addr, Ipv4Address::BROADCAST);
    assert_eq!(request.message_type, DhcpMessageType::Request);
    assert_eq!(request.transaction_id, xid);
    assert_eq!(request.requested_ip, Some(OFFERED_IPV4));
    assert_eq!(request.server_identifier, Some(SERVER_IPV4));

    context.recv(&dhcp_frame(DhcpMessageType::Ack, xid, Ipv4Address::BROADCAST, |_| {}));
    assert_eq!(context.interface.dhcp.state, State::ArpCheck);
    assert!(!context.interface.ipv4.is_configured());

    let sent = context.sent();
    assert_eq!(sent.len(), 1);
    let (eth_dst, request) = sent_arp(&sent[0]).unwrap();
    assert_eq!(eth_dst, EthernetAddress::BROADCAST);
    assert_eq!(request.op, ArpOp::Request);
    assert_eq!(request.source_proto_addr, Ipv4Address::UNSPECIFIED);
    assert_eq!(request.target_proto_addr, OFFERED_IPV4);

    context.tick(RETRY_PERIOD_MS - 1);
    assert_eq!(context.interface.dhcp.state, State::ArpCheck);

    context.tick(1);
    assert_eq!(context.interface.dhcp.state, State::Bound);
    assert_eq!(context.interface.ipv4, leased());
    assert!(context.sent().is_empty());
}

#[test]
fn test_offer_missing_subnet_mask() {
    let mut context = Context::dhcp_client();
    let (_, discover) = sent_message(&context);

    context.recv(&dhcp_frame(
        DhcpMessageType::Offer,
        discover.transaction_id,
        Ipv4Address::BROADCAST,
        |dhcp_repr| dhcp_repr.subnet_mask = None,
    ));

    assert_eq!(context.interface.dhcp.state, State::Init);
    assert_eq!(context.interface.dhcp.retries, RETRY_BUDGET);
    assert!(context.sent().is_empty());
}

#[test]
fn test_offer_for_other_transaction() {
    let mut context = Context::dhcp_client();
    let (_, discover) = sent_message(&context);

    context.recv(&dhcp_frame(
        DhcpMessageType::Offer,
        discover.transaction_id.wrapping_add(1),
        Ipv4Address::BROADCAST,
        |_| {},
    ));

    assert_eq!(context.interface.dhcp.state, State::Init);
    assert!(context.sent().is_empty());
}

#[test]
fn test_discover_retried_after_budget() {
    let mut context = Context::dhcp_client();
    sent_message(&context);

    for _ in 0 .. RETRY_BUDGET - 1 {
        context.tick(RETRY_PERIOD_MS);
    }
    assert_eq!(context.interface.dhcp.retries, 1);
    assert!(context.sent().is_empty());

    context.tick(RETRY_PERIOD_MS);
    assert_eq!(context.interface.dhcp.state, State::Init);
    assert_eq!(context.interface.dhcp.retries, RETRY_BUDGET);

    let (_, discover) = sent_message(&context);
    assert_eq!(discover.message_type, DhcpMessageType::Discover);
}

#[test]
fn test_selecting_without_ack_restarts() {
    let mut context = Context::dhcp_client();
    let (_, discover) = sent_message(&context);

    context.recv(&dhcp_frame(
        DhcpMessageType::Offer,
        discover.transaction_id,
        Ipv4Address::BROADCAST,
        |_| {},
    ));
    sent_message(&context);

    for _ in 0 .. RETRY_BUDGET {
        context.tick(RETRY_PERIOD_MS);
    }

    assert_eq!(context.interface.dhcp.state, State::Init);
    let (_, discover) = sent_message(&context);
    assert_eq!(discover.message_type, DhcpMessageType::Discover);
}

#[test]
fn test_nak_restarts() {
    let mut context = Context::dhcp_client();
    let (_, discover) = sent_message(&context);
    let xid = discover.transaction_id;

    context.recv(&dhcp_frame(DhcpMessageType::Offer, xid, Ipv4Address::BROADCAST, |_| {}));
    sent_message(&context);

    context.recv(&dhcp_frame(DhcpMessageType::Nak, xid, Ipv4Address::BROADCAST, |_| {}));
    assert_eq!(context.interface.dhcp.state, State::Init);
    assert_matches!(context.interface.dhcp.lease, None);

    let (_, discover) = sent_message(&context);
    assert_eq!(discover.message_type, DhcpMessageType::Discover);
}

#[test]
fn test_ack_from_unselected_server() {
    let mut context = Context::dhcp_client();
    let (_, discover) = sent_message(&context);
    let xid = discover.transaction_id;

    context.recv(&dhcp_frame(DhcpMessageType::Offer, xid, Ipv4Address::BROADCAST, |_| {}));
    sent_message(&context);

    context.recv(&dhcp_frame(
        DhcpMessageType::Ack,
        xid,
        Ipv4Address::BROADCAST,
        |dhcp_repr| dhcp_repr.server_identifier = Some(Ipv4Address::new([192, 168, 1, 9])),
    ));
    assert_eq!(context.interface.dhcp.state, State::Selecting);
}

#[test]
fn test_address_conflict_declines() {
    let mut context = Context::dhcp_client();
    let (_, discover) = sent_message(&context);
    let xid = discover.transaction_id;

    context.recv(&dhcp_frame(DhcpMessageType::Offer, xid, Ipv4Address::BROADCAST, |_| {}));
    sent_message(&context);
    context.recv(&dhcp_frame(DhcpMessageType::Ack, xid, Ipv4Address::BROADCAST, |_| {}));
    context.sent();

    let claim = adapternet::core::repr::Arp {
        op: ArpOp::Reply,
        source_hw_addr: CONFLICT_MAC,
        source_proto_addr: OFFERED_IPV4,
        target_hw_addr: DEV_MAC,
        target_proto_addr: Ipv4Address::UNSPECIFIED,
    };
    context.recv(&arp_frame(&claim, DEV_MAC));
    context.tick(RETRY_PERIOD_MS);

    let sent = context.sent();
    assert_eq!(sent.len(), 2);

    let (_, decline) = sent_dhcp(&sent[0]).unwrap();
    assert_eq!(decline.message_type, DhcpMessageType::Decline);
    assert_eq!(decline.requested_ip, Some(OFFERED_IPV4));
    assert_eq!(decline.server_identifier, Some(SERVER_IPV4));

    let (_, discover) = sent_dhcp(&sent[1]).unwrap();
    assert_eq!(discover.message_type, DhcpMessageType::Discover);

    assert_eq!(context.interface.dhcp.state, State::Init);
    assert!(!context.interface.ipv4.is_configured());
}

#[test]
fn test_renew_with_server() {
    let mut context = Context::dhcp_client();
    bind(&mut context);

    // The server's mapping ages out long before T1, so the unicast request
    // waits on ARP.
    context.tick(1_800_000);
    assert_eq!(context.interface.dhcp.state, State::Renewing);

    let sent = context.sent();
    assert_eq!(sent.len(), 1);
    let (_, arp_request) = sent_arp(&sent[0]).unwrap();
    assert_eq!(arp_request.source_proto_addr, OFFERED_IPV4);
    assert_eq!(arp_request.target_proto_addr, SERVER_IPV4);

    context.learn(SERVER_IPV4, SERVER_MAC);

    let (capture, request) = sent_message(&context);
    assert_eq!(capture.eth_dst, SERVER_MAC);
    assert_eq!(capture.repr.src_addr, OFFERED_IPV4);
    assert_eq!(capture.repr.dst_addr, SERVER_IPV4);
    assert_eq!(request.message_type, DhcpMessageType::Request);
    assert_eq!(request.client_ip, OFFERED_IPV4);
    assert_matches!(request.requested_ip, None);
    assert!(!request.broadcast);

    context.recv(&dhcp_frame(
        DhcpMessageType::Ack,
        request.transaction_id,
        OFFERED_IPV4,
        |dhcp_repr| dhcp_repr.dns_servers = vec![Ipv4Address::new([192, 168, 1, 3])],
    ));

    assert_eq!(context.interface.dhcp.state, State::Bound);
    assert_eq!(
        context.interface.ipv4.dns_servers,
        vec![Ipv4Address::new([192, 168, 1, 3])]
    );
    assert_eq!(context.interface.ipv4.addr.addr(), OFFERED_IPV4);
}

#[test]
fn test_rebind_then_expire() {
    let mut context = Context::dhcp_client();
    bind(&mut context);

    context.tick(1_800_000);
    assert_eq!(context.interface.dhcp.state, State::Renewing);
    context.sent();

    context.tick(1_350_000);
    assert_eq!(context.interface.dhcp.state, State::Rebinding);

    let (capture, request) = sent_message(&context);
    assert_eq!(capture.eth_dst, EthernetAddress::BROADCAST);
    assert_eq!(capture.repr.dst_addr, Ipv4Address::BROADCAST);
    assert_eq!(request.message_type, DhcpMessageType::Request);
    assert_eq!(request.client_ip, OFFERED_IPV4);

    context.tick(450_000);
    assert_eq!(context.interface.dhcp.state, State::Init);
    assert!(!context.interface.ipv4.is_configured());

    let (_, discover) = sent_message(&context);
    assert_eq!(discover.message_type, DhcpMessageType::Discover);
}

#[test]
fn test_infinite_lease() {
    let mut context = Context::dhcp_client();
    let (_, discover) = sent_message(&context);
    let xid = discover.transaction_id;

    context.recv(&dhcp_frame(DhcpMessageType::Offer, xid, Ipv4Address::BROADCAST, |_| {}));
    context.recv(&dhcp_frame(
        DhcpMessageType::Ack,
        xid,
        Ipv4Address::BROADCAST,
        |dhcp_repr| dhcp_repr.lease_duration = Some(INFINITE_LEASE),
    ));
    context.tick(RETRY_PERIOD_MS);

    assert_eq!(context.interface.dhcp.state, State::Bound);
    assert!(context.interface.timers.is_empty());
}

#[test]
fn test_link_down_withdraws_lease() {
    let mut context = Context::dhcp_client();
    bind(&mut context);
    assert!(context.interface.ipv4.is_configured());

    context.interface.set_link(false);
    assert_eq!(context.interface.dhcp.state, State::Idle);
    assert!(!context.interface.ipv4.is_configured());
    assert!(context.interface.timers.is_empty());
    assert!(context.sent().is_empty());

    context.interface.set_link(true);
    assert_eq!(context.interface.dhcp.state, State::Init);
    let (_, discover) = sent_message(&context);
    assert_eq!(discover.message_type, DhcpMessageType::Discover);
}

#[test]
fn test_stop_withdraws_lease() {
    let mut context = Context::dhcp_client();
    bind(&mut context);

    context.interface.stop();
    assert_eq!(context.interface.dhcp.state, State::Idle);
    assert!(!context.interface.ipv4.is_configured());
    assert_eq!(context.interface.pool.outstanding(), 0);
}
