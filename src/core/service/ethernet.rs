use crate::core::link::Header;
use crate::core::repr::{
    eth_types,
    EthernetAddress,
};
use crate::core::service::{
    arp,
    ipv4,
    Interface,
};
use crate::core::storage::PacketBuffer;
use crate::{
    Error,
    Result,
};

/// Checks out a buffer from the pool and frames a payload of payload_len
/// bytes, which the closure writes.
///
/// The buffer is handed back to the pool if anything fails.
pub fn build_frame<F>(
    interface: &mut Interface,
    dst_addr: EthernetAddress,
    payload_type: u16,
    payload_len: usize,
    f: F,
) -> Result<PacketBuffer>
where
    F: FnOnce(&mut [u8]) -> Result<()>,
{
    let header_len = interface.link.header_len();
    let mut buffer = interface.pool.get()?;

    if header_len + payload_len > buffer.capacity() {
        interface.pool.put(buffer);
        return Err(Error::Exhausted);
    }

    let header = Header {
        dst_addr,
        src_addr: interface.ethernet_addr,
        payload_type,
    };

    let result = {
        let frame = buffer.frame_mut(header_len + payload_len);
        interface
            .link
            .write_header(frame, &header)
            .and_then(|_| f(&mut frame[header_len ..]))
    };

    match result {
        Ok(()) => Ok(buffer),
        Err(err) => {
            interface.pool.put(buffer);
            Err(err)
        }
    }
}

/// Sends a framed buffer via an interface, returning it to the pool.
pub fn send_buffer(interface: &mut Interface, buffer: PacketBuffer) -> Result<()> {
    if !interface.is_link_up() {
        interface.pool.put(buffer);
        return Err(Error::Disabled);
    }

    let result = interface.dev.send(buffer.as_ref());
    interface.pool.put(buffer);

    result.map_err(|err| {
        warn!("Device failed to send frame with {:?}.", err);
        Error::Device(err)
    })
}

/// Send an Ethernet frame via an interface.
pub fn send_frame<F>(
    interface: &mut Interface,
    dst_addr: EthernetAddress,
    payload_type: u16,
    payload_len: usize,
    f: F,
) -> Result<()>
where
    F: FnOnce(&mut [u8]) -> Result<()>,
{
    let buffer = build_frame(interface, dst_addr, payload_type, payload_len, f)?;
    send_buffer(interface, buffer)
}

/// Receives an Ethernet frame from an interface.
///
/// The frame is parsed and propagated up the network stack.
pub fn recv_frame(interface: &mut Interface, frame: &[u8]) -> Result<()> {
    let (header, payload) = interface.link.parse(frame)?;

    if header.dst_addr != interface.ethernet_addr && !header.dst_addr.is_broadcast() {
        debug!(
            "Ignoring ethernet frame with destination {}.",
            header.dst_addr
        );
        return Err(Error::Ignored);
    }

    match header.payload_type {
        eth_types::ARP => arp::recv_packet(interface, payload),
        eth_types::IPV4 => ipv4::recv_packet(interface, header.src_addr, payload),
        i => {
            debug!("Ignoring ethernet frame with type {}.", i);
            Err(Error::Ignored)
        }
    }
}

/// Ages the state of the layers above ethernet.
pub fn tick(interface: &mut Interface, elapsed_ms: u32) {
    arp::tick(interface, elapsed_ms);
    ipv4::tick(interface, elapsed_ms);
}
