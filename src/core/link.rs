//! Link layer framing.

use crate::core::repr::{
    EthernetAddress,
    EthernetFrame,
};
use crate::Result;

/// A parsed link layer header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub dst_addr: EthernetAddress,
    pub src_addr: EthernetAddress,
    pub payload_type: u16,
}

/// Framing for a particular link layer, chosen once when an interface is
/// created.
pub trait Link {
    /// Returns the size of the link header preceding every payload.
    fn header_len(&self) -> usize;

    /// Writes a link header to the front of a frame buffer.
    fn write_header(&self, frame: &mut [u8], header: &Header) -> Result<()>;

    /// Rewrites only the destination of a frame whose header is already
    /// written.
    fn set_dst_addr(&self, frame: &mut [u8], dst_addr: EthernetAddress) -> Result<()>;

    /// Parses the link header, returning it with the payload it carries.
    fn parse<'a>(&self, frame: &'a [u8]) -> Result<(Header, &'a [u8])>;
}

/// Ethernet II framing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ethernet;

impl Link for Ethernet {
    fn header_len(&self) -> usize {
        EthernetFrame::<&[u8]>::HEADER_LEN
    }

    fn write_header(&self, frame: &mut [u8], header: &Header) -> Result<()> {
        let mut frame = EthernetFrame::try_new(frame)?;
        frame.set_dst_addr(header.dst_addr);
        frame.set_src_addr(header.src_addr);
        frame.set_payload_type(header.payload_type);
        Ok(())
    }

    fn set_dst_addr(&self, frame: &mut [u8], dst_addr: EthernetAddress) -> Result<()> {
        EthernetFrame::try_new(frame)?.set_dst_addr(dst_addr);
        Ok(())
    }

    fn parse<'a>(&self, frame: &'a [u8]) -> Result<(Header, &'a [u8])> {
        let view = EthernetFrame::try_new(frame)?;
        let header = Header {
            dst_addr: view.dst_addr(),
            src_addr: view.src_addr(),
            payload_type: view.payload_type(),
        };
        Ok((header, &frame[self.header_len() ..]))
    }
}
