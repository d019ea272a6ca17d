pub const IFF_TAP: libc::c_short = 0x0002;

pub const IFF_NO_PI: libc::c_short = 0x1000;

pub const TUNSETIFF: libc::c_ulong = 0x400454CA;

pub const SIOCGIFMTU: libc::c_ulong = 0x8921;

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
pub union c_ifreq_ifru {
    pub ifr_addr: libc::sockaddr,
    pub ifr_flags: libc::c_short,
    pub ifr_mtu: libc::c_int,
    _pad: [u8; 24],
}

/// [https://linux.die.net/man/7/netdevice](https://linux.die.net/man/7/netdevice)
#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
pub struct c_ifreq {
    pub ifr_name: [libc::c_char; libc::IF_NAMESIZE],
    pub ifr_ifru: c_ifreq_ifru,
}

impl c_ifreq {
    /// Creates a request for the named interface, or `None` if the name does
    /// not fit with its terminating NUL.
    pub fn with_name(ifr_name: &str) -> Option<c_ifreq> {
        if ifr_name.len() >= libc::IF_NAMESIZE {
            return None;
        }

        let mut ifreq = c_ifreq {
            ifr_name: [0; libc::IF_NAMESIZE],
            ifr_ifru: c_ifreq_ifru { _pad: [0; 24] },
        };

        for (i, c) in ifr_name.as_bytes().iter().enumerate() {
            ifreq.ifr_name[i] = *c as libc::c_char;
        }

        Some(ifreq)
    }
}
