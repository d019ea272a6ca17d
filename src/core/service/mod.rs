//! Packet processing services for different network layers.
//!
//! Each layer is a set of free functions over an `Interface`. The interface
//! owns every piece of per-adapter state so layers can call up and down the
//! stack without sharing ownership.

pub mod arp;
pub mod dhcp;
pub mod ethernet;
pub mod icmpv4;
pub mod ipv4;
pub mod udp;

use std::mem;

use crate::core::arp_cache::ArpCache;
use crate::core::dev::{
    Device,
    Error as DevError,
};
use crate::core::link::{
    Ethernet,
    Link,
};
use crate::core::reassembly::Reassembler;
use crate::core::repr::{
    EthernetAddress,
    Ipv4Address,
    Ipv4AddressCidr,
};
use crate::core::storage::BufferPool;
use crate::core::timer::{
    TimerKind,
    TimerList,
};
use crate::{
    Error,
    Result,
};

/// How an interface obtains its IPv4 configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Host name announced to DHCP servers.
    pub host_name: String,
    /// Acquire addressing via DHCP instead of the static fields below.
    pub dhcp: bool,
    pub ipv4_addr: Ipv4AddressCidr,
    pub default_gateway: Ipv4Address,
    pub dns_servers: Vec<Ipv4Address>,
    pub domain_name: Option<String>,
    /// Upper bound on packet buffers checked out at once.
    pub max_buffers: Option<usize>,
    /// Answer echo requests addressed to the interface.
    pub answer_echo: bool,
}

impl Config {
    /// Creates a configuration that leases an address via DHCP.
    pub fn dhcp_client(host_name: &str) -> Config {
        Config {
            host_name: host_name.to_string(),
            dhcp: true,
            ipv4_addr: Ipv4AddressCidr::UNSPECIFIED,
            default_gateway: Ipv4Address::UNSPECIFIED,
            dns_servers: Vec::new(),
            domain_name: None,
            max_buffers: None,
            answer_echo: false,
        }
    }

    /// Creates a configuration with a fixed address and gateway.
    pub fn with_static(
        host_name: &str,
        ipv4_addr: Ipv4AddressCidr,
        default_gateway: Ipv4Address,
    ) -> Config {
        Config {
            host_name: host_name.to_string(),
            dhcp: false,
            ipv4_addr,
            default_gateway,
            dns_servers: Vec::new(),
            domain_name: None,
            max_buffers: None,
            answer_echo: false,
        }
    }
}

/// IPv4 addressing currently in effect on an interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ipv4Config {
    pub addr: Ipv4AddressCidr,
    /// Default gateway for packets not on the interface subnet. This should
    /// be on the same subnet as addr!
    pub default_gateway: Ipv4Address,
    pub dns_servers: Vec<Ipv4Address>,
    pub domain_name: Option<String>,
}

impl Ipv4Config {
    /// Addressing of an interface without an address.
    pub fn unconfigured() -> Ipv4Config {
        Ipv4Config {
            addr: Ipv4AddressCidr::UNSPECIFIED,
            default_gateway: Ipv4Address::UNSPECIFIED,
            dns_servers: Vec::new(),
            domain_name: None,
        }
    }

    /// Checks if an address has been assigned.
    pub fn is_configured(&self) -> bool {
        !self.addr.addr().is_unspecified()
    }

    fn from_config(config: &Config) -> Ipv4Config {
        if config.dhcp {
            return Ipv4Config::unconfigured();
        }

        Ipv4Config {
            addr: config.ipv4_addr,
            default_gateway: config.default_gateway,
            dns_servers: config.dns_servers.clone(),
            domain_name: config.domain_name.clone(),
        }
    }
}

/// An interface for sending and receiving network packets.
pub struct Interface {
    /// Device for sending and receiving raw frames.
    pub dev: Box<dyn Device>,
    /// Framing used on the device.
    pub link: Box<dyn Link>,
    /// Buffers for outgoing frames and frames waiting on ARP.
    pub pool: BufferPool,
    /// Timers driving the protocol state machines.
    pub timers: TimerList,
    /// Cache for IPv4/Ethernet address translations.
    pub arp_cache: ArpCache,
    /// Partially received IPv4 datagrams.
    pub reassembler: Reassembler,
    /// DHCP client session.
    pub dhcp: dhcp::Session,
    /// Echo request numbering.
    pub echo: icmpv4::EchoState,
    /// Ethernet address for the interface.
    pub ethernet_addr: EthernetAddress,
    /// Addressing in effect.
    pub ipv4: Ipv4Config,
    /// Identification for the next outgoing IPv4 datagram.
    pub ipv4_ident: u16,
    pub config: Config,
    rx_buffer: Vec<u8>,
    started: bool,
    link_up: bool,
}

impl Interface {
    /// Creates an interface over a device.
    ///
    /// Nothing is sent or received until `start` is called.
    pub fn new(dev: Box<dyn Device>, config: Config) -> Interface {
        let link = Box::new(Ethernet);
        let ethernet_addr = dev.ethernet_addr();
        let buffer_len = link.header_len() + dev.max_transmission_unit();

        debug!(
            "Creating interface {} with {} byte buffers.",
            ethernet_addr, buffer_len
        );

        Interface {
            pool: BufferPool::new(ethernet_addr, buffer_len, config.max_buffers),
            timers: TimerList::new(),
            arp_cache: ArpCache::default(),
            reassembler: Reassembler::default(),
            dhcp: dhcp::Session::new(),
            echo: icmpv4::EchoState::new(),
            ipv4: Ipv4Config::from_config(&config),
            ipv4_ident: 0,
            rx_buffer: vec![0; buffer_len],
            started: false,
            link_up: true,
            dev,
            link,
            ethernet_addr,
            config,
        }
    }

    /// Checks if the interface has been started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Checks if the link is enabled.
    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    /// Enables every layer of the stack. With DHCP configured this kicks off
    /// address acquisition.
    pub fn start(&mut self) {
        if self.started {
            return;
        }

        info!("Starting interface {}.", self.ethernet_addr);
        self.started = true;
        self.ipv4 = Ipv4Config::from_config(&self.config);
        dhcp::reset(self);
    }

    /// Processes a frame received from the device.
    ///
    /// Frames are silently dropped while the interface is stopped or the link
    /// is down.
    pub fn recv_frame(&mut self, frame: &[u8]) {
        if !self.started || !self.link_up {
            trace!("Dropping frame received while the interface is down.");
            return;
        }

        match ethernet::recv_frame(self, frame) {
            Ok(()) | Err(Error::Ignored) => {}
            Err(err) => debug!("Error processing frame with {:?}.", err),
        }
    }

    /// Reads and processes every frame waiting on the device, returning how
    /// many were read.
    ///
    /// Frames are read into a scratch buffer held outside the pool, so replies
    /// sent while processing them may use every pool buffer.
    pub fn poll(&mut self) -> Result<usize> {
        let mut rx_buffer = mem::replace(&mut self.rx_buffer, Vec::new());
        let mut count = 0;

        let result = loop {
            match self.dev.recv(&mut rx_buffer[..]) {
                Ok(len) => {
                    self.recv_frame(&rx_buffer[.. len]);
                    count += 1;
                }
                Err(DevError::Nothing) => break Ok(count),
                Err(err) => break Err(Error::Device(err)),
            }
        };

        self.rx_buffer = rx_buffer;
        result
    }

    /// Advances time by elapsed_ms, aging caches and firing due timers.
    pub fn tick(&mut self, elapsed_ms: u32) {
        if !self.started {
            return;
        }

        ethernet::tick(self, elapsed_ms);

        let mut elapsed_ms = elapsed_ms;
        while let Some((id, kind)) = self.timers.expire(&mut elapsed_ms) {
            match kind {
                TimerKind::DhcpRetry | TimerKind::DhcpLease => dhcp::on_timer(self, id, kind),
            }
        }
    }

    /// Enables or disables the link.
    ///
    /// Taking the link down abandons any lease in progress; bringing it back
    /// up restarts DHCP.
    pub fn set_link(&mut self, up: bool) {
        if up == self.link_up {
            return;
        }

        info!(
            "Link on {} is {}.",
            self.ethernet_addr,
            if up { "up" } else { "down" }
        );
        self.link_up = up;

        if !self.started {
            return;
        }

        if up {
            dhcp::reset(self);
        } else {
            dhcp::stop(self);
            arp::clear_all(self);
            self.reassembler.clear();
        }
    }

    /// Stops every layer, cancelling timers and releasing queued frames.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }

        info!("Stopping interface {}.", self.ethernet_addr);
        dhcp::stop(self);
        self.timers.clear();
        arp::clear_all(self);
        self.reassembler.clear();
        self.started = false;
    }

    /// Stops the interface and hands back its device.
    pub fn deinit(mut self) -> Box<dyn Device> {
        self.stop();
        debug!(
            "Releasing interface {} with {} buffers outstanding.",
            self.ethernet_addr,
            self.pool.outstanding()
        );
        self.dev
    }
}
