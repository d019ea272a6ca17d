//! The boundary between the stack and a network card driver.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::core::repr::EthernetAddress;

#[derive(Debug)]
pub enum Error {
    /// Indicates an error where a buffer was not large enough.
    Overflow,
    /// Indicates a situation with an empty link.
    Nothing,
    /// Indicates the device could not accept a frame right now.
    Busy,
    /// Indicates a generic IO error.
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A network card as seen by the stack.
///
/// Frames handed to `send` are transmitted (or copied) before the call
/// returns, after which the stack recycles the buffer.
pub trait Device {
    /// Sends a complete Ethernet frame.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Reads a frame into the buffer and returns the size of the frame.
    ///
    /// Returns `Error::Nothing` when no frame is waiting. You should ensure the
    /// buffer has room for a full frame to avoid an `Error::Overflow`.
    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the [MTU](https://en.wikipedia.org/wiki/Maximum_transmission_unit)
    /// of the device, i.e. the largest IPv4 packet a frame can carry.
    fn max_transmission_unit(&self) -> usize;

    /// Returns the hardware address of the device.
    fn ethernet_addr(&self) -> EthernetAddress;
}

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<Vec<u8>>,
    incoming: VecDeque<Vec<u8>>,
    busy: bool,
}

/// An in memory device which records sent frames.
///
/// Clones share the same state, so a test can keep a handle while the
/// interface owns the device.
#[derive(Clone, Debug)]
pub struct MockDevice {
    mtu: usize,
    ethernet_addr: EthernetAddress,
    state: Rc<RefCell<MockState>>,
}

impl MockDevice {
    pub fn new(ethernet_addr: EthernetAddress, mtu: usize) -> MockDevice {
        MockDevice {
            mtu,
            ethernet_addr,
            state: Rc::new(RefCell::new(MockState::default())),
        }
    }

    /// Removes and returns every frame sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        let mut state = self.state.borrow_mut();
        state.sent.drain(..).collect()
    }

    /// Returns the number of frames sent and not yet taken.
    pub fn sent_len(&self) -> usize {
        self.state.borrow().sent.len()
    }

    /// Queues a frame to be returned by `recv`.
    pub fn push_incoming(&self, frame: Vec<u8>) {
        self.state.borrow_mut().incoming.push_back(frame);
    }

    /// Makes subsequent sends fail with `Error::Busy`.
    pub fn set_busy(&self, busy: bool) {
        self.state.borrow_mut().busy = busy;
    }
}

impl Device for MockDevice {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.busy {
            return Err(Error::Busy);
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        let frame = match state.incoming.pop_front() {
            Some(frame) => frame,
            None => return Err(Error::Nothing),
        };
        if frame.len() > buffer.len() {
            return Err(Error::Overflow);
        }
        buffer[.. frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    fn max_transmission_unit(&self) -> usize {
        self.mtu
    }

    fn ethernet_addr(&self) -> EthernetAddress {
        self.ethernet_addr
    }
}
