use std::cmp;

use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use crate::{
    Error,
    Result,
};

pub const SERVER_PORT: u16 = 67;

pub const CLIENT_PORT: u16 = 68;

pub const MAGIC_COOKIE: u32 = 0x63825363;

/// Lease duration meaning "never expires".
pub const INFINITE_LEASE: u32 = 0xFFFFFFFF;

/// BOOTP op codes.
pub mod ops {
    pub const BOOT_REQUEST: u8 = 1;

    pub const BOOT_REPLY: u8 = 2;
}

/// [RFC 2132](https://tools.ietf.org/html/rfc2132) option codes.
pub mod options {
    pub const PAD: u8 = 0;

    pub const SUBNET_MASK: u8 = 1;

    pub const ROUTER: u8 = 3;

    pub const DNS_SERVER: u8 = 6;

    pub const HOST_NAME: u8 = 12;

    pub const DOMAIN_NAME: u8 = 15;

    pub const REQUESTED_IP: u8 = 50;

    pub const LEASE_TIME: u8 = 51;

    pub const MESSAGE_TYPE: u8 = 53;

    pub const SERVER_ID: u8 = 54;

    pub const PARAMETER_REQUEST_LIST: u8 = 55;

    pub const RENEWAL_TIME: u8 = 58;

    pub const REBINDING_TIME: u8 = 59;

    pub const CLIENT_ID: u8 = 61;

    pub const END: u8 = 255;
}

const FLAG_BROADCAST: u16 = 0x8000;

const HW_TYPE_ETHERNET: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    fn try_new(value: u8) -> Result<MessageType> {
        match value {
            1 => Ok(MessageType::Discover),
            2 => Ok(MessageType::Offer),
            3 => Ok(MessageType::Request),
            4 => Ok(MessageType::Decline),
            5 => Ok(MessageType::Ack),
            6 => Ok(MessageType::Nak),
            7 => Ok(MessageType::Release),
            8 => Ok(MessageType::Inform),
            _ => Err(Error::Malformed),
        }
    }

    /// Returns the BOOTP op code messages of this type travel with.
    pub fn op(&self) -> u8 {
        match *self {
            MessageType::Offer | MessageType::Ack | MessageType::Nak => ops::BOOT_REPLY,
            _ => ops::BOOT_REQUEST,
        }
    }
}

/// [https://tools.ietf.org/html/rfc2131#section-2](https://tools.ietf.org/html/rfc2131#section-2)
mod fields {
    use std::ops::{
        Range,
        RangeFrom,
    };

    pub const OP: usize = 0;

    pub const HW_TYPE: usize = 1;

    pub const HW_LEN: usize = 2;

    pub const HOPS: usize = 3;

    pub const XID: Range<usize> = 4 .. 8;

    pub const SECS: Range<usize> = 8 .. 10;

    pub const FLAGS: Range<usize> = 10 .. 12;

    pub const CIADDR: Range<usize> = 12 .. 16;

    pub const YIADDR: Range<usize> = 16 .. 20;

    pub const SIADDR: Range<usize> = 20 .. 24;

    pub const GIADDR: Range<usize> = 24 .. 28;

    pub const CHADDR: Range<usize> = 28 .. 44;

    pub const SNAME_FILE: Range<usize> = 44 .. 236;

    pub const MAGIC: Range<usize> = 236 .. 240;

    pub const OPTIONS: RangeFrom<usize> = 240 ..;
}

/// View of a byte buffer as a DHCP message.
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
    /// Fixed BOOTP header plus the magic cookie.
    pub const HEADER_LEN: usize = 240;

    /// Smallest message a BOOTP relay or server is required to accept.
    pub const MIN_PACKET_LEN: usize = 300;

    /// Tries to create a DHCP packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        if buffer.as_ref().len() < Self::HEADER_LEN {
            Err(Error::Exhausted)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Checks that the message describes an Ethernet client and carries the
    /// magic cookie.
    pub fn check_encoding(&self) -> Result<()> {
        if self.hw_type() != HW_TYPE_ETHERNET || self.hw_len() != 6
            || self.magic_cookie() != MAGIC_COOKIE
        {
            Err(Error::Malformed)
        } else {
            Ok(())
        }
    }

    pub fn op(&self) -> u8 {
        self.buffer.as_ref()[fields::OP]
    }

    pub fn hw_type(&self) -> u8 {
        self.buffer.as_ref()[fields::HW_TYPE]
    }

    pub fn hw_len(&self) -> u8 {
        self.buffer.as_ref()[fields::HW_LEN]
    }

    pub fn hops(&self) -> u8 {
        self.buffer.as_ref()[fields::HOPS]
    }

    pub fn transaction_id(&self) -> u32 {
        NetworkEndian::read_u32(&self.buffer.as_ref()[fields::XID])
    }

    pub fn secs(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::SECS])
    }

    pub fn flags(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::FLAGS])
    }

    pub fn client_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[fields::CIADDR])
    }

    pub fn your_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[fields::YIADDR])
    }

    pub fn server_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[fields::SIADDR])
    }

    pub fn relay_agent_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[fields::GIADDR])
    }

    pub fn client_hw_addr(&self) -> EthernetAddress {
        let mut addr = [0; 6];
        addr.copy_from_slice(&self.buffer.as_ref()[fields::CHADDR][.. 6]);
        EthernetAddress::new(addr)
    }

    pub fn magic_cookie(&self) -> u32 {
        NetworkEndian::read_u32(&self.buffer.as_ref()[fields::MAGIC])
    }

    pub fn options(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::OPTIONS]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_op(&mut self, op: u8) {
        self.buffer.as_mut()[fields::OP] = op;
    }

    pub fn set_hw_type(&mut self, hw_type: u8) {
        self.buffer.as_mut()[fields::HW_TYPE] = hw_type;
    }

    pub fn set_hw_len(&mut self, hw_len: u8) {
        self.buffer.as_mut()[fields::HW_LEN] = hw_len;
    }

    pub fn set_hops(&mut self, hops: u8) {
        self.buffer.as_mut()[fields::HOPS] = hops;
    }

    pub fn set_transaction_id(&mut self, xid: u32) {
        NetworkEndian::write_u32(&mut self.buffer.as_mut()[fields::XID], xid);
    }

    pub fn set_secs(&mut self, secs: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::SECS], secs);
    }

    pub fn set_flags(&mut self, flags: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::FLAGS], flags);
    }

    pub fn set_client_ip(&mut self, addr: Ipv4Address) {
        self.buffer.as_mut()[fields::CIADDR].copy_from_slice(addr.as_bytes());
    }

    pub fn set_your_ip(&mut self, addr: Ipv4Address) {
        self.buffer.as_mut()[fields::YIADDR].copy_from_slice(addr.as_bytes());
    }

    pub fn set_server_ip(&mut self, addr: Ipv4Address) {
        self.buffer.as_mut()[fields::SIADDR].copy_from_slice(addr.as_bytes());
    }

    pub fn set_relay_agent_ip(&mut self, addr: Ipv4Address) {
        self.buffer.as_mut()[fields::GIADDR].copy_from_slice(addr.as_bytes());
    }

    pub fn set_client_hw_addr(&mut self, addr: EthernetAddress) {
        let chaddr = &mut self.buffer.as_mut()[fields::CHADDR];
        for byte in chaddr.iter_mut() {
            *byte = 0;
        }
        chaddr[.. 6].copy_from_slice(addr.as_bytes());
    }

    pub fn clear_server_name_and_file(&mut self) {
        for byte in self.buffer.as_mut()[fields::SNAME_FILE].iter_mut() {
            *byte = 0;
        }
    }

    pub fn set_magic_cookie(&mut self, magic: u32) {
        NetworkEndian::write_u32(&mut self.buffer.as_mut()[fields::MAGIC], magic);
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[fields::OPTIONS]
    }
}

/// Iterator over the `(code, data)` pairs of a DHCP options field.
///
/// Stops at the end option or the end of the buffer and yields an error for
/// an option whose length runs past the buffer.
pub struct OptionsIter<'a> {
    buffer: &'a [u8],
    done: bool,
}

impl<'a> OptionsIter<'a> {
    pub fn new(buffer: &'a [u8]) -> OptionsIter<'a> {
        OptionsIter {
            buffer,
            done: false,
        }
    }
}

impl<'a> Iterator for OptionsIter<'a> {
    type Item = Result<(u8, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let code = match self.buffer.first() {
                Some(&code) => code,
                None => return None,
            };

            match code {
                options::PAD => {
                    self.buffer = &self.buffer[1 ..];
                }
                options::END => {
                    self.done = true;
                }
                _ => {
                    if self.buffer.len() < 2 || self.buffer.len() < 2 + self.buffer[1] as usize {
                        self.done = true;
                        return Some(Err(Error::Malformed));
                    }
                    let len = self.buffer[1] as usize;
                    let data = &self.buffer[2 .. 2 + len];
                    self.buffer = &self.buffer[2 + len ..];
                    return Some(Ok((code, data)));
                }
            }
        }

        None
    }
}

/// Writes TLV encoded options into a buffer.
struct OptionsWriter<'a> {
    buffer: &'a mut [u8],
    pos: usize,
}

impl<'a> OptionsWriter<'a> {
    fn emit(&mut self, code: u8, data: &[u8]) {
        self.buffer[self.pos] = code;
        self.buffer[self.pos + 1] = data.len() as u8;
        self.buffer[self.pos + 2 .. self.pos + 2 + data.len()].copy_from_slice(data);
        self.pos += 2 + data.len();
    }

    fn emit_u32(&mut self, code: u8, value: u32) {
        let mut data = [0; 4];
        NetworkEndian::write_u32(&mut data, value);
        self.emit(code, &data);
    }

    fn end(&mut self) {
        self.buffer[self.pos] = options::END;
        self.pos += 1;
        for byte in self.buffer[self.pos ..].iter_mut() {
            *byte = options::PAD;
        }
    }
}

/// Safe representation of a DHCP message and the options this stack
/// understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repr {
    pub message_type: MessageType,
    pub transaction_id: u32,
    pub secs: u16,
    pub broadcast: bool,
    pub client_hw_addr: EthernetAddress,
    pub client_ip: Ipv4Address,
    pub your_ip: Ipv4Address,
    pub server_ip: Ipv4Address,
    pub relay_agent_ip: Ipv4Address,
    pub subnet_mask: Option<Ipv4Address>,
    pub router: Option<Ipv4Address>,
    pub dns_servers: Vec<Ipv4Address>,
    pub host_name: Option<String>,
    pub domain_name: Option<String>,
    pub requested_ip: Option<Ipv4Address>,
    pub server_identifier: Option<Ipv4Address>,
    pub lease_duration: Option<u32>,
    pub renew_duration: Option<u32>,
    pub rebind_duration: Option<u32>,
    pub client_identifier: Option<EthernetAddress>,
    pub parameter_request_list: Vec<u8>,
}

impl Repr {
    /// Creates a message of the given type with no options besides the type.
    pub fn new(
        message_type: MessageType,
        transaction_id: u32,
        client_hw_addr: EthernetAddress,
    ) -> Repr {
        Repr {
            message_type,
            transaction_id,
            secs: 0,
            broadcast: false,
            client_hw_addr,
            client_ip: Ipv4Address::UNSPECIFIED,
            your_ip: Ipv4Address::UNSPECIFIED,
            server_ip: Ipv4Address::UNSPECIFIED,
            relay_agent_ip: Ipv4Address::UNSPECIFIED,
            subnet_mask: None,
            router: None,
            dns_servers: Vec::new(),
            host_name: None,
            domain_name: None,
            requested_ip: None,
            server_identifier: None,
            lease_duration: None,
            renew_duration: None,
            rebind_duration: None,
            client_identifier: None,
            parameter_request_list: Vec::new(),
        }
    }

    fn options_len(&self) -> usize {
        let mut len = 3;

        let addrs = [
            self.subnet_mask,
            self.router,
            self.requested_ip,
            self.server_identifier,
        ];
        len += addrs.iter().filter(|addr| addr.is_some()).count() * 6;

        let durations = [
            self.lease_duration,
            self.renew_duration,
            self.rebind_duration,
        ];
        len += durations.iter().filter(|d| d.is_some()).count() * 6;

        if !self.dns_servers.is_empty() {
            len += 2 + 4 * cmp::min(self.dns_servers.len(), 63);
        }
        if let Some(ref host_name) = self.host_name {
            len += 2 + cmp::min(host_name.len(), 255);
        }
        if let Some(ref domain_name) = self.domain_name {
            len += 2 + cmp::min(domain_name.len(), 255);
        }
        if self.client_identifier.is_some() {
            len += 2 + 7;
        }
        if !self.parameter_request_list.is_empty() {
            len += 2 + cmp::min(self.parameter_request_list.len(), 255);
        }

        // End option.
        len + 1
    }

    /// Returns the size of the serialized message, padded to the BOOTP
    /// minimum.
    pub fn buffer_len(&self) -> usize {
        cmp::max(
            Packet::<&[u8]>::HEADER_LEN + self.options_len(),
            Packet::<&[u8]>::MIN_PACKET_LEN,
        )
    }

    /// Tries to deserialize a packet into a DHCP message.
    ///
    /// The message must carry the magic cookie, a message type option and an
    /// op code consistent with that message type.
    pub fn deserialize<T>(packet: &Packet<T>) -> Result<Repr>
    where
        T: AsRef<[u8]>,
    {
        packet.check_encoding()?;

        let mut message_type = None;
        let mut repr = Repr::new(
            MessageType::Discover,
            packet.transaction_id(),
            packet.client_hw_addr(),
        );
        repr.secs = packet.secs();
        repr.broadcast = packet.flags() & FLAG_BROADCAST != 0;
        repr.client_ip = packet.client_ip();
        repr.your_ip = packet.your_ip();
        repr.server_ip = packet.server_ip();
        repr.relay_agent_ip = packet.relay_agent_ip();

        fn addr(data: &[u8]) -> Result<Ipv4Address> {
            if data.len() < 4 {
                Err(Error::Malformed)
            } else {
                Ok(Ipv4Address::from_bytes(&data[.. 4]))
            }
        }

        fn duration(data: &[u8]) -> Result<u32> {
            if data.len() < 4 {
                Err(Error::Malformed)
            } else {
                Ok(NetworkEndian::read_u32(&data[.. 4]))
            }
        }

        for option in OptionsIter::new(packet.options()) {
            let (code, data) = option?;
            match code {
                options::MESSAGE_TYPE if !data.is_empty() => {
                    message_type = Some(MessageType::try_new(data[0])?);
                }
                options::SUBNET_MASK => repr.subnet_mask = Some(addr(data)?),
                options::ROUTER => repr.router = Some(addr(data)?),
                options::DNS_SERVER => {
                    repr.dns_servers = data
                        .chunks(4)
                        .filter(|chunk| chunk.len() == 4)
                        .map(Ipv4Address::from_bytes)
                        .collect();
                }
                options::HOST_NAME => {
                    repr.host_name = Some(String::from_utf8_lossy(data).into_owned());
                }
                options::DOMAIN_NAME => {
                    repr.domain_name = Some(String::from_utf8_lossy(data).into_owned());
                }
                options::REQUESTED_IP => repr.requested_ip = Some(addr(data)?),
                options::SERVER_ID => repr.server_identifier = Some(addr(data)?),
                options::LEASE_TIME => repr.lease_duration = Some(duration(data)?),
                options::RENEWAL_TIME => repr.renew_duration = Some(duration(data)?),
                options::REBINDING_TIME => repr.rebind_duration = Some(duration(data)?),
                options::CLIENT_ID if data.len() == 7 && data[0] == HW_TYPE_ETHERNET => {
                    repr.client_identifier = Some(EthernetAddress::try_new(&data[1 ..])?);
                }
                options::PARAMETER_REQUEST_LIST => {
                    repr.parameter_request_list = data.to_vec();
                }
                _ => {}
            }
        }

        repr.message_type = message_type.ok_or(Error::Malformed)?;
        if repr.message_type.op() != packet.op() {
            return Err(Error::Malformed);
        }

        Ok(repr)
    }

    /// Serializes the DHCP message into a packet.
    ///
    /// Bytes past the end option are filled with pad options.
    pub fn serialize<T>(&self, packet: &mut Packet<T>) -> Result<()>
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        if packet.as_ref().len() < Packet::<&[u8]>::HEADER_LEN + self.options_len() {
            return Err(Error::Exhausted);
        }

        packet.set_op(self.message_type.op());
        packet.set_hw_type(HW_TYPE_ETHERNET);
        packet.set_hw_len(6);
        packet.set_hops(0);
        packet.set_transaction_id(self.transaction_id);
        packet.set_secs(self.secs);
        packet.set_flags(if self.broadcast { FLAG_BROADCAST } else { 0 });
        packet.set_client_ip(self.client_ip);
        packet.set_your_ip(self.your_ip);
        packet.set_server_ip(self.server_ip);
        packet.set_relay_agent_ip(self.relay_agent_ip);
        packet.set_client_hw_addr(self.client_hw_addr);
        packet.clear_server_name_and_file();
        packet.set_magic_cookie(MAGIC_COOKIE);

        let mut writer = OptionsWriter {
            buffer: packet.options_mut(),
            pos: 0,
        };

        writer.emit(options::MESSAGE_TYPE, &[self.message_type as u8]);
        if let Some(client_identifier) = self.client_identifier {
            let mut data = [HW_TYPE_ETHERNET; 7];
            data[1 ..].copy_from_slice(client_identifier.as_bytes());
            writer.emit(options::CLIENT_ID, &data);
        }
        if let Some(ref host_name) = self.host_name {
            let len = cmp::min(host_name.len(), 255);
            writer.emit(options::HOST_NAME, &host_name.as_bytes()[.. len]);
        }
        if let Some(requested_ip) = self.requested_ip {
            writer.emit(options::REQUESTED_IP, requested_ip.as_bytes());
        }
        if let Some(server_identifier) = self.server_identifier {
            writer.emit(options::SERVER_ID, server_identifier.as_bytes());
        }
        if let Some(subnet_mask) = self.subnet_mask {
            writer.emit(options::SUBNET_MASK, subnet_mask.as_bytes());
        }
        if let Some(router) = self.router {
            writer.emit(options::ROUTER, router.as_bytes());
        }
        if !self.dns_servers.is_empty() {
            let data: Vec<u8> = self.dns_servers
                .iter()
                .take(63)
                .flat_map(|addr| addr.as_bytes().iter().cloned())
                .collect();
            writer.emit(options::DNS_SERVER, &data);
        }
        if let Some(ref domain_name) = self.domain_name {
            let len = cmp::min(domain_name.len(), 255);
            writer.emit(options::DOMAIN_NAME, &domain_name.as_bytes()[.. len]);
        }
        if let Some(lease_duration) = self.lease_duration {
            writer.emit_u32(options::LEASE_TIME, lease_duration);
        }
        if let Some(renew_duration) = self.renew_duration {
            writer.emit_u32(options::RENEWAL_TIME, renew_duration);
        }
        if let Some(rebind_duration) = self.rebind_duration {
            writer.emit_u32(options::REBINDING_TIME, rebind_duration);
        }
        if !self.parameter_request_list.is_empty() {
            let len = cmp::min(self.parameter_request_list.len(), 255);
            writer.emit(
                options::PARAMETER_REQUEST_LIST,
                &self.parameter_request_list[.. len],
            );
        }
        writer.end();

        Ok(())
    }
}
