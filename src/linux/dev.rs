use std::io;

use crate::core::dev::{
    Device,
    Error,
    Result,
};
use crate::core::repr::EthernetAddress;
use crate::linux::libc as _libc;

/// [TAP interface](https://www.kernel.org/doc/Documentation/networking/tuntap.txt)
/// for sending and receiving raw ethernet frames.
///
/// The descriptor is non-blocking, so `recv` returns `Error::Nothing` rather
/// than waiting for a frame.
pub struct Tap {
    fd: libc::c_int,
    max_transmission_unit: usize,
    eth_addr: EthernetAddress,
}

impl Tap {
    /// Creates or binds to an existing TAP interface, which the stack will
    /// drive with the specified ethernet address.
    pub fn new(ifr_name: &str, eth_addr: EthernetAddress) -> Result<Tap> {
        let ifreq = _libc::c_ifreq::with_name(ifr_name).ok_or_else(|| {
            Error::IO(io::Error::new(
                io::ErrorKind::InvalidInput,
                "interface name too long",
            ))
        })?;

        let fd = unsafe {
            libc::open(
                "/dev/net/tun\0".as_ptr() as *const libc::c_char,
                libc::O_RDWR | libc::O_NONBLOCK,
            )
        };

        if fd == -1 {
            return Err(Error::IO(io::Error::last_os_error()));
        }

        let mut flags_req = ifreq;
        flags_req.ifr_ifru.ifr_flags = _libc::IFF_TAP | _libc::IFF_NO_PI;
        if unsafe { libc::ioctl(fd, _libc::TUNSETIFF, &mut flags_req as *mut _libc::c_ifreq) } == -1 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
            }
            return Err(Error::IO(err));
        }

        let mut mtu_req = ifreq;
        if let Err(err) = inet_ioctl(_libc::SIOCGIFMTU, &mut mtu_req) {
            unsafe {
                libc::close(fd);
            }
            return Err(err);
        }
        let max_transmission_unit = unsafe { mtu_req.ifr_ifru.ifr_mtu } as usize;

        debug!(
            "Opened TAP {} with MTU {}.",
            ifr_name, max_transmission_unit
        );

        Ok(Tap {
            fd,
            max_transmission_unit,
            eth_addr,
        })
    }
}

/// Issues an interface ioctl via a throwaway AF_INET socket.
fn inet_ioctl(request: libc::c_ulong, ifreq: &mut _libc::c_ifreq) -> Result<()> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);

        if fd == -1 {
            return Err(Error::IO(io::Error::last_os_error()));
        }

        if libc::ioctl(fd, request, ifreq as *mut _libc::c_ifreq) == -1 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(Error::IO(err));
        }

        libc::close(fd);
        Ok(())
    }
}

impl Device for Tap {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let wrote = unsafe {
            libc::write(
                self.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
            )
        };

        if wrote >= 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            Err(Error::Busy)
        } else {
            Err(Error::IO(err))
        }
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let read = unsafe {
            libc::read(
                self.fd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
            )
        };

        if read >= 0 {
            return Ok(read as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            Err(Error::Nothing)
        } else {
            Err(Error::IO(err))
        }
    }

    fn max_transmission_unit(&self) -> usize {
        self.max_transmission_unit
    }

    fn ethernet_addr(&self) -> EthernetAddress {
        self.eth_addr
    }
}

impl Drop for Tap {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
