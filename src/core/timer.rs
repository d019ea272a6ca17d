//! A delta ordered list of periodic timers.
//!
//! Each node stores its remaining time relative to the node before it, so the
//! head always holds the time until the next expiry and advancing the clock
//! only touches the front of the list.

use crate::{
    Error,
    Result,
};

/// What an expired timer means to the interface that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// DHCP retransmission and ARP probe timeouts.
    DhcpRetry,
    /// DHCP lease milestones (T1, T2 and lease expiry).
    DhcpLease,
}

/// Handle used to cancel a timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Node {
    id: TimerId,
    delta: u32,
    period: u32,
    kind: TimerKind,
}

#[derive(Debug, Default)]
pub struct TimerList {
    nodes: Vec<Node>,
    next_id: u64,
}

impl TimerList {
    pub fn new() -> TimerList {
        TimerList {
            nodes: Vec::new(),
            next_id: 0,
        }
    }

    /// Returns the number of armed timers.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks if a timer is still armed.
    pub fn contains(&self, id: TimerId) -> bool {
        self.nodes.iter().any(|node| node.id == id)
    }

    /// Returns the milliseconds until the next timer expires, if any.
    pub fn next_expiry(&self) -> Option<u32> {
        self.nodes.first().map(|node| node.delta)
    }

    /// Arms a timer firing every period_ms milliseconds.
    ///
    /// A period of 0 is treated as 1 ms. Fails with `Error::Exhausted` if the
    /// node cannot be allocated, in which case no timer is scheduled.
    pub fn add(&mut self, period_ms: u32, kind: TimerKind) -> Result<TimerId> {
        self.nodes.try_reserve(1).map_err(|_| Error::Exhausted)?;

        let id = TimerId(self.next_id);
        self.next_id += 1;

        let period = period_ms.max(1);
        self.insert(Node {
            id,
            delta: period,
            period,
            kind,
        });

        Ok(id)
    }

    /// Cancels a timer, returning true if it was armed.
    pub fn remove(&mut self, id: TimerId) -> bool {
        let index = match self.nodes.iter().position(|node| node.id == id) {
            Some(index) => index,
            None => return false,
        };

        let node = self.nodes.remove(index);
        if let Some(next) = self.nodes.get_mut(index) {
            next.delta += node.delta;
        }

        true
    }

    /// Cancels every timer.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Pops the next timer due within elapsed_ms, re-arms it for its period and
    /// returns it.
    ///
    /// Time consumed up to the expiry is subtracted from elapsed_ms. Callers
    /// should loop until `None`, handling each timer before asking for the
    /// next one so a handler may cancel any timer, including the one that just
    /// fired. Once nothing else is due, the remaining time is charged to the
    /// head of the list and elapsed_ms drops to 0.
    pub fn expire(&mut self, elapsed_ms: &mut u32) -> Option<(TimerId, TimerKind)> {
        let due = match self.nodes.first_mut() {
            Some(head) if head.delta <= *elapsed_ms => true,
            Some(head) => {
                head.delta -= *elapsed_ms;
                false
            }
            None => false,
        };

        if !due {
            *elapsed_ms = 0;
            return None;
        }

        let mut node = self.nodes.remove(0);
        *elapsed_ms -= node.delta;

        let fired = (node.id, node.kind);
        node.delta = node.period;
        self.insert(node);

        Some(fired)
    }

    /// Inserts a node whose delta is relative to the head of the list, after
    /// any nodes expiring at the same time.
    fn insert(&mut self, mut node: Node) {
        let mut remaining = node.delta;
        let mut index = 0;

        while index < self.nodes.len() && self.nodes[index].delta <= remaining {
            remaining -= self.nodes[index].delta;
            index += 1;
        }

        if let Some(next) = self.nodes.get_mut(index) {
            next.delta -= remaining;
        }

        node.delta = remaining;
        self.nodes.insert(index, node);
    }
}
