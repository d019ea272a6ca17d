use crate::core::repr::{
    ipv4_protocols,
    Icmpv4Packet,
    Icmpv4Repr,
    Ipv4Address,
    Ipv4Repr,
};
use crate::core::service::{
    ipv4,
    Interface,
};
use crate::{
    Error,
    Result,
};

/// Payload carried by echo requests sent with `send_ping`.
pub const PING_PAYLOAD: &[u8] = b"abcdefghijklmnopqrstuvwabcdefghi";

/// Numbering for outgoing echo requests.
#[derive(Clone, Copy, Debug)]
pub struct EchoState {
    pub ident: u16,
    pub next_seq: u16,
}

impl EchoState {
    pub fn new() -> EchoState {
        EchoState {
            ident: rand::random(),
            next_seq: 0,
        }
    }
}

/// Send an ICMP packet via the interface.
pub fn send_packet(
    interface: &mut Interface,
    dst_addr: Ipv4Address,
    icmp_repr: &Icmpv4Repr,
    payload: &[u8],
) -> Result<()> {
    let mut buffer = vec![0; Icmpv4Packet::<&[u8]>::buffer_len(payload.len())];
    {
        let mut icmp_packet = Icmpv4Packet::try_new(&mut buffer[..])?;
        icmp_packet.payload_mut().copy_from_slice(payload);
        icmp_repr.serialize(&mut icmp_packet);
    }

    ipv4::send_packet(interface, dst_addr, ipv4_protocols::ICMP, false, &buffer)
}

/// Sends an echo request and returns its sequence number.
pub fn send_ping(interface: &mut Interface, dst_addr: Ipv4Address) -> Result<u16> {
    let seq = interface.echo.next_seq;
    interface.echo.next_seq = seq.wrapping_add(1);

    let icmp_repr = Icmpv4Repr::EchoRequest {
        id: interface.echo.ident,
        seq,
    };

    debug!("Sending echo request {} to {}.", seq, dst_addr);
    send_packet(interface, dst_addr, &icmp_repr, PING_PAYLOAD)?;
    Ok(seq)
}

/// Receives an ICMP packet from an interface.
///
/// Echo messages are logged and dropped, except that echo requests addressed
/// to the interface are answered with the same payload when
/// `Config::answer_echo` is set.
pub fn recv_packet(interface: &mut Interface, ipv4_repr: &Ipv4Repr, payload: &[u8]) -> Result<()> {
    let icmp_packet = Icmpv4Packet::try_new(payload)?;
    icmp_packet.check_encoding()?;

    match Icmpv4Repr::deserialize(&icmp_packet)? {
        Icmpv4Repr::EchoRequest { id, seq } => {
            if ipv4_repr.dst_addr != interface.ipv4.addr.addr() {
                debug!(
                    "Ignoring echo request to {} from {}.",
                    ipv4_repr.dst_addr, ipv4_repr.src_addr
                );
                return Err(Error::Ignored);
            }

            if !interface.config.answer_echo {
                info!(
                    "Echo request from {}: id={} seq={} bytes={}.",
                    ipv4_repr.src_addr,
                    id,
                    seq,
                    icmp_packet.payload().len()
                );
                return Ok(());
            }

            debug!(
                "Answering echo request {} from {}.",
                seq, ipv4_repr.src_addr
            );
            let reply = Icmpv4Repr::EchoReply { id, seq };
            send_packet(interface, ipv4_repr.src_addr, &reply, icmp_packet.payload())
        }
        Icmpv4Repr::EchoReply { id, seq } => {
            info!(
                "Echo reply from {}: id={} seq={} bytes={}.",
                ipv4_repr.src_addr,
                id,
                seq,
                icmp_packet.payload().len()
            );
            Ok(())
        }
    }
}
