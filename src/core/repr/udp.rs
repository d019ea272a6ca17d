use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::check;
use crate::core::repr::{
    ipv4_protocols,
    Ipv4Repr,
};
use crate::{
    Error,
    Result,
};

/// Safe representation of a UDP header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
}

impl Repr {
    /// Returns the UDP packet size needed to serialize this UDP header and
    /// payload.
    pub fn buffer_len(&self) -> usize {
        self.length as usize
    }

    /// Deserializes a packet into a UDP header.
    pub fn deserialize<T>(packet: &Packet<T>) -> Repr
    where
        T: AsRef<[u8]>,
    {
        Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            length: packet.length(),
        }
    }

    /// Serializes the UDP header into a packet.
    ///
    /// The payload must be written first so the checksum covers it.
    pub fn serialize<T>(&self, packet: &mut Packet<T>, ip_repr: &Ipv4Repr)
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_length(self.length);
        packet.set_checksum(0);

        // An all zeros checksum means "no checksum", so send it's ones complement
        // equivalent instead.
        let checksum = match packet.gen_packet_checksum(ip_repr) {
            0 => 0xFFFF,
            checksum => checksum,
        };
        packet.set_checksum(checksum);
    }
}

/// [https://en.wikipedia.org/wiki/User_Datagram_Protocol](https://en.wikipedia.org/wiki/User_Datagram_Protocol)
mod fields {
    use std::ops::{
        Range,
        RangeFrom,
    };

    pub const SRC_PORT: Range<usize> = 0 .. 2;

    pub const DST_PORT: Range<usize> = 2 .. 4;

    pub const LENGTH: Range<usize> = 4 .. 6;

    pub const CHECKSUM: Range<usize> = 6 .. 8;

    pub const PAYLOAD: RangeFrom<usize> = 8 ..;
}

/// View of a byte buffer as a UDP packet.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> AsMut<[u8]> for Packet<T> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut()
    }
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const HEADER_LEN: usize = 8;

    pub const MAX_PACKET_LEN: usize = 65535;

    /// Tries to create a UDP packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        let buffer_len = buffer.as_ref().len();

        if buffer_len < Self::buffer_len(0) || buffer_len > Self::MAX_PACKET_LEN {
            Err(Error::Exhausted)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Returns the length of a UDP packet with the specified payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    /// Checks if the packet has a valid encoding. This may include checksum, field
    /// consistency, etc. checks.
    ///
    /// Checksums of 0x0000 and 0xFFFF are treated as "checksum disabled".
    pub fn check_encoding(&self, ip_repr: &Ipv4Repr) -> Result<()> {
        if self.length() as usize != self.buffer.as_ref().len() {
            Err(Error::Malformed)
        } else if self.checksum() != 0 && self.checksum() != 0xFFFF
            && self.gen_packet_checksum(ip_repr) != 0
        {
            Err(Error::Checksum)
        } else {
            Ok(())
        }
    }

    /// Calculates the packet checksum over the IPv4 pseudo header, UDP header
    /// and payload.
    pub fn gen_packet_checksum(&self, ip_repr: &Ipv4Repr) -> u16 {
        let mut ip_pseudo_header = [0; 12];
        ip_pseudo_header[0 .. 4].copy_from_slice(ip_repr.src_addr.as_bytes());
        ip_pseudo_header[4 .. 8].copy_from_slice(ip_repr.dst_addr.as_bytes());
        ip_pseudo_header[9] = ipv4_protocols::UDP;
        NetworkEndian::write_u16(
            &mut ip_pseudo_header[10 .. 12],
            self.buffer.as_ref().len() as u16,
        );

        let iter = ip_pseudo_header
            .iter()
            .chain(self.buffer.as_ref().iter())
            .cloned();
        check::internet_checksum(iter)
    }

    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::SRC_PORT])
    }

    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::DST_PORT])
    }

    pub fn length(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::LENGTH])
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::CHECKSUM])
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_src_port(&mut self, port: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::SRC_PORT], port);
    }

    pub fn set_dst_port(&mut self, port: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::DST_PORT], port);
    }

    pub fn set_length(&mut self, length: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::LENGTH], length);
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::CHECKSUM], checksum);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[fields::PAYLOAD]
    }
}
