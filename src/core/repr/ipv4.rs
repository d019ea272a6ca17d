use std::fmt::{
    Display,
    Formatter,
    Result as FmtResult,
};
use std::result::Result as StdResult;
use std::str::FromStr;

use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::check;
use crate::{
    Error,
    Result,
};

/// [IPv4 address](https://en.wikipedia.org/wiki/IPv4) in network byte order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 4]);

impl Address {
    pub const UNSPECIFIED: Address = Address([0x00; 4]);

    pub const BROADCAST: Address = Address([0xFF; 4]);

    /// Creates an IPv4 address from a network byte order buffer.
    pub const fn new(addr: [u8; 4]) -> Address {
        Address(addr)
    }

    /// Tries to create an IPv4 address from a network byte order slice.
    pub fn try_new(addr: &[u8]) -> Result<Address> {
        if addr.len() != 4 {
            return Err(Error::Exhausted);
        }

        let mut _addr: [u8; 4] = [0; 4];
        _addr.clone_from_slice(addr);
        Ok(Address(_addr))
    }

    /// Creates an IPv4 address from a network byte order slice.
    ///
    /// # Panics
    ///
    /// Panics if the slice is not exactly 4 bytes long.
    pub fn from_bytes(addr: &[u8]) -> Address {
        let mut _addr: [u8; 4] = [0; 4];
        _addr.copy_from_slice(addr);
        Address(_addr)
    }

    /// Creates an IPv4 address from it's host byte order integer form.
    pub fn from_u32(addr: u32) -> Address {
        let mut _addr = [0; 4];
        NetworkEndian::write_u32(&mut _addr, addr);
        Address(_addr)
    }

    /// Returns the address as a host byte order integer.
    pub fn as_u32(&self) -> u32 {
        NetworkEndian::read_u32(&self.0)
    }

    /// Returns a reference to the network byte order representation of the address.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks if this is 0.0.0.0.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0x00; 4]
    }

    /// Checks if this is the limited broadcast address 255.255.255.255.
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 4]
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl FromStr for Address {
    type Err = ();

    /// Parses an Ipv4 address from an A.B.C.D style string.
    fn from_str(addr: &str) -> StdResult<Address, Self::Err> {
        let bytes = addr
            .split('.')
            .map(|token| token.parse::<u8>())
            .collect::<StdResult<Vec<_>, _>>()
            .map_err(|_| ())?;

        if bytes.len() != 4 {
            return Err(());
        }

        let mut ipv4: [u8; 4] = [0; 4];
        ipv4.clone_from_slice(&bytes);

        Ok(Address::new(ipv4))
    }
}

/// An IPv4 address with a subnet prefix, i.e. 10.0.0.102/24.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressCidr {
    addr: Address,
    subnet_len: u8,
}

impl AddressCidr {
    pub const UNSPECIFIED: AddressCidr = AddressCidr {
        addr: Address::UNSPECIFIED,
        subnet_len: 0,
    };

    /// Creates an address with a subnet prefix of subnet_len bits.
    ///
    /// # Panics
    ///
    /// Causes a panic if subnet_len is larger than 32.
    pub fn new(addr: Address, subnet_len: u8) -> AddressCidr {
        assert!(subnet_len <= 32);
        AddressCidr { addr, subnet_len }
    }

    /// Creates an address from a dotted subnet mask, i.e. 255.255.255.0.
    ///
    /// Non contiguous masks are rounded down to their leading one bits.
    pub fn from_netmask(addr: Address, netmask: Address) -> AddressCidr {
        let subnet_len = (!netmask.as_u32()).leading_zeros() as u8;
        AddressCidr::new(addr, subnet_len)
    }

    pub fn addr(&self) -> Address {
        self.addr
    }

    pub fn subnet_len(&self) -> u8 {
        self.subnet_len
    }

    /// Returns the subnet mask in dotted form.
    pub fn netmask(&self) -> Address {
        if self.subnet_len == 0 {
            Address::UNSPECIFIED
        } else {
            Address::from_u32(!0u32 << (32 - self.subnet_len as u32))
        }
    }

    /// Returns the directed broadcast address of the subnet.
    pub fn broadcast(&self) -> Address {
        Address::from_u32(self.addr.as_u32() | !self.netmask().as_u32())
    }

    /// Checks if an address is on the same subnet.
    pub fn is_member(&self, addr: Address) -> bool {
        let mask = self.netmask().as_u32();
        (self.addr.as_u32() & mask) == (addr.as_u32() & mask)
    }
}

impl Display for AddressCidr {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}/{}", self.addr, self.subnet_len)
    }
}

/// [https://en.wikipedia.org/wiki/List_of_IP_protocol_numbers](https://en.wikipedia.org/wiki/List_of_IP_protocol_numbers)
pub mod protocols {
    pub const ICMP: u8 = 0x01;

    pub const TCP: u8 = 0x06;

    pub const UDP: u8 = 0x11;
}

/// Values of the 3 bit flags field.
pub mod flags {
    pub const DONT_FRAGMENT: u8 = 0b010;

    pub const MORE_FRAGMENTS: u8 = 0b001;
}

/// [https://en.wikipedia.org/wiki/IPv4#Header](https://en.wikipedia.org/wiki/IPv4#Header)
mod fields {
    use std::ops::Range;

    pub const VERSION_AND_IHL: usize = 0;

    pub const DSCP_AND_ECN: usize = 1;

    pub const PACKET_LEN: Range<usize> = 2 .. 4;

    pub const IDENTIFICATION: Range<usize> = 4 .. 6;

    pub const FLAGS_AND_FRAGMENT_OFFSET: Range<usize> = 6 .. 8;

    pub const TTL: usize = 8;

    pub const PROTOCOL: usize = 9;

    pub const CHECKSUM: Range<usize> = 10 .. 12;

    pub const SRC_ADDR: Range<usize> = 12 .. 16;

    pub const DST_ADDR: Range<usize> = 16 .. 20;
}

/// View of a byte buffer as an IPv4 packet.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const HEADER_LEN: usize = 20;

    pub const MAX_PACKET_LEN: usize = 65535;

    /// Tries to create an IPv4 packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        if buffer.as_ref().len() < Self::HEADER_LEN {
            Err(Error::Exhausted)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Returns the length of an IPv4 packet with no options and the specified
    /// payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    /// Checks if the packet has a valid encoding: version, header and packet
    /// lengths consistent with the buffer and a valid header checksum.
    ///
    /// The buffer may be longer than the packet, i.e. when padded by the link.
    pub fn check_encoding(&self) -> Result<()> {
        let buffer_len = self.buffer.as_ref().len();

        if self.ip_version() != 4 || (self.header_len() as usize) < Self::HEADER_LEN
            || (self.header_len() as usize) > buffer_len
            || (self.packet_len() as usize) < (self.header_len() as usize)
            || (self.packet_len() as usize) > buffer_len
        {
            Err(Error::Malformed)
        } else if self.gen_header_checksum() != self.header_checksum() {
            Err(Error::Checksum)
        } else {
            Ok(())
        }
    }

    /// Calculates the header checksum, excluding the checksum field itself
    /// from the sum.
    pub fn gen_header_checksum(&self) -> u16 {
        let header = &self.buffer.as_ref()[.. self.header_len() as usize];
        let sum = check::sum(header[.. fields::CHECKSUM.start].iter().cloned())
            + check::sum(header[fields::CHECKSUM.end ..].iter().cloned());
        !check::fold(sum)
    }

    pub fn ip_version(&self) -> u8 {
        self.buffer.as_ref()[fields::VERSION_AND_IHL] >> 4
    }

    /// Returns the header length in bytes.
    pub fn header_len(&self) -> u8 {
        (self.buffer.as_ref()[fields::VERSION_AND_IHL] & 0x0F) * 4
    }

    pub fn dscp(&self) -> u8 {
        self.buffer.as_ref()[fields::DSCP_AND_ECN] >> 2
    }

    pub fn ecn(&self) -> u8 {
        self.buffer.as_ref()[fields::DSCP_AND_ECN] & 0x03
    }

    pub fn packet_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::PACKET_LEN])
    }

    pub fn identification(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::IDENTIFICATION])
    }

    /// Returns the 3 bit flags field, see the `flags` module.
    pub fn flags(&self) -> u8 {
        self.buffer.as_ref()[fields::FLAGS_AND_FRAGMENT_OFFSET.start] >> 5
    }

    /// Returns the fragment offset in units of 8 bytes.
    pub fn fragment_offset(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::FLAGS_AND_FRAGMENT_OFFSET])
            & 0x1FFF
    }

    pub fn ttl(&self) -> u8 {
        self.buffer.as_ref()[fields::TTL]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer.as_ref()[fields::PROTOCOL]
    }

    pub fn header_checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::CHECKSUM])
    }

    pub fn src_addr(&self) -> Address {
        let mut addr = [0; 4];
        addr.copy_from_slice(&self.buffer.as_ref()[fields::SRC_ADDR]);
        Address::new(addr)
    }

    pub fn dst_addr(&self) -> Address {
        let mut addr = [0; 4];
        addr.copy_from_slice(&self.buffer.as_ref()[fields::DST_ADDR]);
        Address::new(addr)
    }

    /// Checks if the packet is a fragment of a larger datagram.
    pub fn is_fragment(&self) -> bool {
        self.fragment_offset() != 0 || (self.flags() & flags::MORE_FRAGMENTS) != 0
    }

    /// Returns the payload, as delimited by the header and packet lengths.
    ///
    /// Only call this on packets with a valid encoding.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[self.header_len() as usize .. self.packet_len() as usize]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_ip_version(&mut self, version: u8) {
        let byte = &mut self.buffer.as_mut()[fields::VERSION_AND_IHL];
        *byte = (*byte & 0x0F) | (version << 4);
    }

    /// Sets the header length in 4 byte words.
    pub fn set_header_len(&mut self, header_len: u8) {
        let byte = &mut self.buffer.as_mut()[fields::VERSION_AND_IHL];
        *byte = (*byte & 0xF0) | (header_len & 0x0F);
    }

    pub fn set_dscp(&mut self, dscp: u8) {
        let byte = &mut self.buffer.as_mut()[fields::DSCP_AND_ECN];
        *byte = (*byte & 0x03) | (dscp << 2);
    }

    pub fn set_ecn(&mut self, ecn: u8) {
        let byte = &mut self.buffer.as_mut()[fields::DSCP_AND_ECN];
        *byte = (*byte & 0xFC) | (ecn & 0x03);
    }

    pub fn set_packet_len(&mut self, packet_len: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::PACKET_LEN], packet_len);
    }

    pub fn set_identification(&mut self, id: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::IDENTIFICATION], id);
    }

    pub fn set_flags(&mut self, flags: u8) {
        let byte = &mut self.buffer.as_mut()[fields::FLAGS_AND_FRAGMENT_OFFSET.start];
        *byte = (*byte & 0x1F) | ((flags & 0x07) << 5);
    }

    /// Sets the fragment offset in units of 8 bytes.
    pub fn set_fragment_offset(&mut self, offset: u16) {
        let flags = (self.flags() as u16) << 13;
        NetworkEndian::write_u16(
            &mut self.buffer.as_mut()[fields::FLAGS_AND_FRAGMENT_OFFSET],
            flags | (offset & 0x1FFF),
        );
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buffer.as_mut()[fields::TTL] = ttl;
    }

    pub fn set_protocol(&mut self, protocol: u8) {
        self.buffer.as_mut()[fields::PROTOCOL] = protocol;
    }

    pub fn set_header_checksum(&mut self, header_checksum: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::CHECKSUM], header_checksum);
    }

    pub fn set_src_addr(&mut self, addr: Address) {
        self.buffer.as_mut()[fields::SRC_ADDR].copy_from_slice(addr.as_bytes());
    }

    pub fn set_dst_addr(&mut self, addr: Address) {
        self.buffer.as_mut()[fields::DST_ADDR].copy_from_slice(addr.as_bytes());
    }

    /// Calculates and writes the header checksum.
    pub fn fill_checksum(&mut self) {
        let checksum = self.gen_header_checksum();
        self.set_header_checksum(checksum);
    }

    /// Returns a mutable view of everything following the header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len() as usize;
        &mut self.buffer.as_mut()[header_len ..]
    }
}

/// Safe representation of an IPv4 header without options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub protocol: u8,
    pub payload_len: u16,
}

impl Repr {
    /// Returns the length of a buffer required to serialize the packet.
    pub fn buffer_len(&self) -> usize {
        Packet::<&[u8]>::buffer_len(self.payload_len as usize)
    }

    /// Deserializes a packet with a valid encoding into an IPv4 header.
    pub fn deserialize<T>(packet: &Packet<T>) -> Repr
    where
        T: AsRef<[u8]>,
    {
        Repr {
            src_addr: packet.src_addr(),
            dst_addr: packet.dst_addr(),
            protocol: packet.protocol(),
            payload_len: packet.packet_len() - packet.header_len() as u16,
        }
    }

    /// Serializes the header into an unfragmented packet with a checksum.
    ///
    /// Fragmentation fields may be overwritten afterwards, as long as the
    /// checksum is refilled.
    pub fn serialize<T>(&self, packet: &mut Packet<T>, id: u16, ttl: u8)
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        packet.set_ip_version(4);
        packet.set_header_len(5);
        packet.set_dscp(0);
        packet.set_ecn(0);
        packet.set_packet_len(self.buffer_len() as u16);
        packet.set_identification(id);
        packet.set_flags(0);
        packet.set_fragment_offset(0);
        packet.set_ttl(ttl);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
        packet.fill_checksum();
    }
}
