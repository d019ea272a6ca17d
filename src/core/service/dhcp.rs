//! DHCP client ([RFC 2131](https://tools.ietf.org/html/rfc2131)).
//!
//! The client walks Init -> Selecting -> ArpCheck -> Bound, then keeps the
//! lease alive through Renewing and Rebinding. Every transition happens inside
//! `recv_packet` or `on_timer`; nothing here blocks. A session owns at most
//! one timer, so arming a new one always cancels the previous one.

use crate::core::repr::dhcp::{
    CLIENT_PORT,
    INFINITE_LEASE,
    SERVER_PORT,
};
use crate::core::repr::{
    DhcpMessageType,
    DhcpPacket,
    DhcpRepr,
    Ipv4Address,
    Ipv4AddressCidr,
    Ipv4Repr,
};
use crate::core::service::{
    arp,
    udp,
    Interface,
    Ipv4Config,
};
use crate::core::timer::{
    TimerId,
    TimerKind,
};
use crate::{
    Error,
    Result,
};

/// Interval between retries while waiting on a server.
pub const RETRY_PERIOD_MS: u32 = 1_000;

/// Retries in Init and Selecting before starting over.
pub const RETRY_BUDGET: u32 = 8;

/// Retries waiting for a claimant to answer the ARP probe.
pub const ARP_CHECK_BUDGET: u32 = 1;

/// Subnet mask, router, DNS, domain name, lease, T1 and T2.
const PARAMETER_REQUEST_LIST: [u8; 7] = [1, 3, 6, 15, 51, 58, 59];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// DHCP is disabled or the link is down.
    Idle,
    Init,
    Selecting,
    ArpCheck,
    Bound,
    Renewing,
    Rebinding,
}

/// Parameters negotiated with a server. Durations are in seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    pub server_id: Ipv4Address,
    pub addr: Ipv4AddressCidr,
    pub router: Ipv4Address,
    pub dns_servers: Vec<Ipv4Address>,
    pub domain_name: String,
    pub lease_duration: u32,
    pub renew_duration: u32,
    pub rebind_duration: u32,
}

impl Lease {
    /// Builds a lease from an offer, requiring every option the client asked
    /// for except the lease time.
    pub fn from_offer(dhcp_repr: &DhcpRepr) -> Option<Lease> {
        if dhcp_repr.your_ip.is_unspecified() || dhcp_repr.dns_servers.is_empty() {
            return None;
        }

        let subnet_mask = dhcp_repr.subnet_mask?;

        Some(Lease {
            server_id: dhcp_repr.server_identifier?,
            addr: Ipv4AddressCidr::from_netmask(dhcp_repr.your_ip, subnet_mask),
            router: dhcp_repr.router?,
            dns_servers: dhcp_repr.dns_servers.clone(),
            domain_name: dhcp_repr.domain_name.clone()?,
            lease_duration: dhcp_repr.lease_duration.unwrap_or(INFINITE_LEASE),
            renew_duration: dhcp_repr.renew_duration?,
            rebind_duration: dhcp_repr.rebind_duration?,
        })
    }

    /// Applies whatever an acknowledgement confirms or changes.
    fn confirm(&self, dhcp_repr: &DhcpRepr) -> Lease {
        let mut lease = self.clone();

        let addr = if dhcp_repr.your_ip.is_unspecified() {
            self.addr.addr()
        } else {
            dhcp_repr.your_ip
        };
        let netmask = dhcp_repr.subnet_mask.unwrap_or_else(|| self.addr.netmask());
        lease.addr = Ipv4AddressCidr::from_netmask(addr, netmask);

        if let Some(router) = dhcp_repr.router {
            lease.router = router;
        }
        if !dhcp_repr.dns_servers.is_empty() {
            lease.dns_servers = dhcp_repr.dns_servers.clone();
        }
        if let Some(ref domain_name) = dhcp_repr.domain_name {
            lease.domain_name = domain_name.clone();
        }
        if let Some(lease_duration) = dhcp_repr.lease_duration {
            lease.lease_duration = lease_duration;
        }
        if let Some(renew_duration) = dhcp_repr.renew_duration {
            lease.renew_duration = renew_duration;
        }
        if let Some(rebind_duration) = dhcp_repr.rebind_duration {
            lease.rebind_duration = rebind_duration;
        }

        lease
    }
}

/// DHCP state of one interface.
#[derive(Debug)]
pub struct Session {
    pub state: State,
    pub xid: u32,
    pub retries: u32,
    /// Offered, then acknowledged, lease.
    pub lease: Option<Lease>,
    timer: Option<TimerId>,
    committed: bool,
}

impl Session {
    pub fn new() -> Session {
        Session {
            state: State::Idle,
            xid: 0,
            retries: 0,
            lease: None,
            timer: None,
            committed: false,
        }
    }
}

/// Clears the session and, if DHCP is enabled on a running interface, starts
/// discovery afresh.
pub fn reset(interface: &mut Interface) {
    stop(interface);

    if interface.config.dhcp && interface.is_started() && interface.is_link_up() {
        enter_init(interface);
    }
}

/// Clears the session, withdrawing any address it committed.
pub fn stop(interface: &mut Interface) {
    cancel_timer(interface);

    if interface.dhcp.committed {
        info!("Withdrawing leased address {}.", interface.ipv4.addr);
        interface.ipv4 = Ipv4Config::unconfigured();
    }

    set_state(interface, State::Idle);
    interface.dhcp = Session::new();
}

/// Handles expiry of a timer owned by the session.
pub fn on_timer(interface: &mut Interface, id: TimerId, kind: TimerKind) {
    if interface.dhcp.timer != Some(id) {
        debug!("Cancelling stale DHCP timer {:?}.", id);
        interface.timers.remove(id);
        return;
    }

    match (interface.dhcp.state, kind) {
        (State::Init, TimerKind::DhcpRetry) => {
            if count_down(interface) {
                debug!("No DHCP offer received, restarting discovery.");
                enter_init(interface);
            }
        }
        (State::Selecting, TimerKind::DhcpRetry) => {
            if count_down(interface) {
                info!("No DHCP acknowledgement received.");
                reset(interface);
            }
        }
        (State::ArpCheck, TimerKind::DhcpRetry) => {
            if count_down(interface) {
                finish_arp_check(interface);
            }
        }
        (State::Bound, TimerKind::DhcpLease) => enter_renewing(interface),
        (State::Renewing, TimerKind::DhcpLease) => enter_rebinding(interface),
        (State::Rebinding, TimerKind::DhcpLease) => {
            warn!("Lease on {} expired.", interface.ipv4.addr);
            reset(interface);
        }
        (state, kind) => {
            debug!("Ignoring {:?} timer in DHCP state {:?}.", kind, state);
            cancel_timer(interface);
        }
    }
}

/// Receives a DHCP message from a server.
pub fn recv_packet(interface: &mut Interface, ipv4_repr: &Ipv4Repr, payload: &[u8]) -> Result<()> {
    let dhcp_packet = DhcpPacket::try_new(payload)?;
    let dhcp_repr = DhcpRepr::deserialize(&dhcp_packet)?;

    if dhcp_repr.transaction_id != interface.dhcp.xid
        || dhcp_repr.client_hw_addr != interface.ethernet_addr
    {
        debug!(
            "Ignoring DHCP {:?} for transaction {:#x}.",
            dhcp_repr.message_type, dhcp_repr.transaction_id
        );
        return Err(Error::Ignored);
    }

    match (interface.dhcp.state, dhcp_repr.message_type) {
        (State::Init, DhcpMessageType::Offer) => match Lease::from_offer(&dhcp_repr) {
            Some(lease) => {
                info!(
                    "Received offer of {} from {}.",
                    lease.addr, lease.server_id
                );
                cancel_timer(interface);
                interface.dhcp.lease = Some(lease);
                enter_selecting(interface);
                Ok(())
            }
            None => {
                debug!(
                    "Ignoring DHCP offer from {} missing required options.",
                    ipv4_repr.src_addr
                );
                Err(Error::Ignored)
            }
        },
        (State::Selecting, DhcpMessageType::Ack)
        | (State::Renewing, DhcpMessageType::Ack)
        | (State::Rebinding, DhcpMessageType::Ack) => {
            let lease = match interface.dhcp.lease {
                Some(ref lease) => {
                    if dhcp_repr.server_identifier.map_or(false, |id| id != lease.server_id) {
                        debug!(
                            "Ignoring DHCP ACK from unselected server {}.",
                            ipv4_repr.src_addr
                        );
                        return Err(Error::Ignored);
                    }
                    lease.confirm(&dhcp_repr)
                }
                None => return Err(Error::Ignored),
            };

            cancel_timer(interface);
            interface.dhcp.lease = Some(lease);

            if interface.dhcp.state == State::Selecting {
                enter_arp_check(interface);
            } else {
                enter_bound(interface);
            }
            Ok(())
        }
        (State::Selecting, DhcpMessageType::Nak)
        | (State::Renewing, DhcpMessageType::Nak)
        | (State::Rebinding, DhcpMessageType::Nak) => {
            info!("DHCP server {} refused the lease.", ipv4_repr.src_addr);
            reset(interface);
            Ok(())
        }
        (state, message_type) => {
            debug!(
                "Ignoring DHCP {:?} in state {:?}.",
                message_type, state
            );
            Err(Error::Ignored)
        }
    }
}

fn set_state(interface: &mut Interface, state: State) {
    if interface.dhcp.state != state {
        info!(
            "DHCP on {}: {:?} -> {:?}.",
            interface.ethernet_addr, interface.dhcp.state, state
        );
        interface.dhcp.state = state;
    }
}

fn cancel_timer(interface: &mut Interface) {
    if let Some(id) = interface.dhcp.timer.take() {
        interface.timers.remove(id);
    }
}

fn arm_timer(interface: &mut Interface, period_ms: u32, kind: TimerKind) {
    cancel_timer(interface);
    match interface.timers.add(period_ms, kind) {
        Ok(id) => interface.dhcp.timer = Some(id),
        Err(err) => warn!("Unable to schedule DHCP timer with {:?}.", err),
    }
}

/// Spends one retry, returning true once the budget is exhausted.
fn count_down(interface: &mut Interface) -> bool {
    let session = &mut interface.dhcp;
    session.retries = session.retries.saturating_sub(1);
    session.retries == 0
}

fn secs_to_ms(secs: u32) -> u32 {
    secs.saturating_mul(1_000)
}

fn enter_init(interface: &mut Interface) {
    set_state(interface, State::Init);
    interface.dhcp.xid = rand::random();
    interface.dhcp.retries = RETRY_BUDGET;
    interface.dhcp.lease = None;

    let discover = message(interface, DhcpMessageType::Discover);
    send(interface, &discover, Ipv4Address::BROADCAST);
    arm_timer(interface, RETRY_PERIOD_MS, TimerKind::DhcpRetry);
}

fn enter_selecting(interface: &mut Interface) {
    let (addr, server_id) = match interface.dhcp.lease {
        Some(ref lease) => (lease.addr.addr(), lease.server_id),
        None => return reset(interface),
    };

    set_state(interface, State::Selecting);
    interface.dhcp.retries = RETRY_BUDGET;

    let mut request = message(interface, DhcpMessageType::Request);
    request.requested_ip = Some(addr);
    request.server_identifier = Some(server_id);
    send(interface, &request, Ipv4Address::BROADCAST);
    arm_timer(interface, RETRY_PERIOD_MS, TimerKind::DhcpRetry);
}

/// Forgets any mapping for the offered address and broadcasts an RFC 5227
/// probe for it.
fn enter_arp_check(interface: &mut Interface) {
    let addr = match interface.dhcp.lease {
        Some(ref lease) => lease.addr.addr(),
        None => return reset(interface),
    };

    set_state(interface, State::ArpCheck);
    interface.dhcp.retries = ARP_CHECK_BUDGET;

    // Only a reply to the probe may resolve the address from here on.
    arp::clear(interface, addr);
    if let Err(err) = arp::send_probe(interface, addr) {
        debug!("Error probing for {} with {:?}.", addr, err);
    }
    arm_timer(interface, RETRY_PERIOD_MS, TimerKind::DhcpRetry);
}

fn finish_arp_check(interface: &mut Interface) {
    let addr = match interface.dhcp.lease {
        Some(ref lease) => lease.addr.addr(),
        None => return reset(interface),
    };

    match arp::resolve(interface, addr, true) {
        Ok(Some(eth_addr)) => {
            warn!("Offered address {} is in use by {}.", addr, eth_addr);
            send_decline(interface);
            reset(interface);
        }
        _ => enter_bound(interface),
    }
}

fn enter_bound(interface: &mut Interface) {
    let lease = match interface.dhcp.lease {
        Some(ref lease) => lease.clone(),
        None => return reset(interface),
    };

    set_state(interface, State::Bound);

    info!(
        "Leased {} via {} from {} for {}s.",
        lease.addr, lease.router, lease.server_id, lease.lease_duration
    );
    interface.ipv4 = Ipv4Config {
        addr: lease.addr,
        default_gateway: lease.router,
        dns_servers: lease.dns_servers,
        domain_name: Some(lease.domain_name),
    };
    interface.dhcp.committed = true;

    if lease.lease_duration == INFINITE_LEASE {
        cancel_timer(interface);
    } else {
        arm_timer(
            interface,
            secs_to_ms(lease.renew_duration),
            TimerKind::DhcpLease,
        );
    }
}

fn enter_renewing(interface: &mut Interface) {
    let (addr, server_id, period_ms) = match interface.dhcp.lease {
        Some(ref lease) => (
            lease.addr.addr(),
            lease.server_id,
            secs_to_ms(lease.rebind_duration.saturating_sub(lease.renew_duration)),
        ),
        None => return reset(interface),
    };

    set_state(interface, State::Renewing);
    interface.dhcp.xid = rand::random();

    let mut request = message(interface, DhcpMessageType::Request);
    request.broadcast = false;
    request.client_ip = addr;
    send(interface, &request, server_id);
    arm_timer(interface, period_ms, TimerKind::DhcpLease);
}

fn enter_rebinding(interface: &mut Interface) {
    let (addr, period_ms) = match interface.dhcp.lease {
        Some(ref lease) => (
            lease.addr.addr(),
            secs_to_ms(lease.lease_duration.saturating_sub(lease.rebind_duration)),
        ),
        None => return reset(interface),
    };

    set_state(interface, State::Rebinding);
    interface.dhcp.xid = rand::random();

    let mut request = message(interface, DhcpMessageType::Request);
    request.broadcast = false;
    request.client_ip = addr;
    send(interface, &request, Ipv4Address::BROADCAST);
    arm_timer(interface, period_ms, TimerKind::DhcpLease);
}

fn send_decline(interface: &mut Interface) {
    let (addr, server_id) = match interface.dhcp.lease {
        Some(ref lease) => (lease.addr.addr(), lease.server_id),
        None => return,
    };

    let mut decline = message(interface, DhcpMessageType::Decline);
    decline.parameter_request_list.clear();
    decline.requested_ip = Some(addr);
    decline.server_identifier = Some(server_id);
    send(interface, &decline, Ipv4Address::BROADCAST);
}

/// Creates a message carrying the options every client message carries.
fn message(interface: &Interface, message_type: DhcpMessageType) -> DhcpRepr {
    let mut dhcp_repr = DhcpRepr::new(message_type, interface.dhcp.xid, interface.ethernet_addr);
    dhcp_repr.broadcast = true;
    dhcp_repr.client_identifier = Some(interface.ethernet_addr);
    if !interface.config.host_name.is_empty() {
        dhcp_repr.host_name = Some(interface.config.host_name.clone());
    }
    dhcp_repr.parameter_request_list = PARAMETER_REQUEST_LIST.to_vec();
    dhcp_repr
}

fn send(interface: &mut Interface, dhcp_repr: &DhcpRepr, dst_addr: Ipv4Address) {
    if let Err(err) = send_message(interface, dhcp_repr, dst_addr) {
        debug!(
            "Error sending DHCP {:?} with {:?}.",
            dhcp_repr.message_type, err
        );
    }
}

fn send_message(interface: &mut Interface, dhcp_repr: &DhcpRepr, dst_addr: Ipv4Address) -> Result<()> {
    let mut buffer = vec![0; dhcp_repr.buffer_len()];
    dhcp_repr.serialize(&mut DhcpPacket::try_new(&mut buffer[..])?)?;

    debug!(
        "Sending DHCP {:?} to {}.",
        dhcp_repr.message_type, dst_addr
    );
    udp::send_packet(interface, CLIENT_PORT, dst_addr, SERVER_PORT, &buffer)
}
