//! Netmap ring access
//!
//! A netmap ring is shared between the kernel and the process. The process
//! owns the slots in `[head, tail)`; everything else belongs to the kernel.
//! Slots are handed back by moving `head` forward (never past `tail`) and
//! the kernel publishes new slots on the next sync.
//!
//! Polling for new slots is left to the caller: [`NetmapPort::sync`] is a
//! single non-blocking step.

use crate::kernel::{Kernel, NetmapHandle};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => f.write_str("tx"),
            Direction::Rx => f.write_str("rx"),
        }
    }
}

/// Snapshot of one ring's indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingState {
    pub num_slots: u32,
    pub head: u32,
    pub cur: u32,
    pub tail: u32,
}

impl RingState {
    /// Slots currently owned by the process: received packets on an RX
    /// ring, free slots on a TX ring.
    pub fn available(&self) -> u32 {
        if self.num_slots == 0 {
            return 0;
        }
        (self.tail + self.num_slots - self.head) % self.num_slots
    }

    /// The head index after consuming `count` slots.
    pub fn advance(&self, count: u32) -> Result<u32> {
        if count > self.available() {
            return Err(Error::Usage(format!(
                "cannot release {} slot(s): only {} owned (head {}, tail {})",
                count,
                self.available(),
                self.head,
                self.tail
            )));
        }
        Ok((self.head + count) % self.num_slots)
    }

    /// Whether `head` may be published: it must lie in `[head, tail]`.
    pub fn may_release_to(&self, head: u32) -> bool {
        if head >= self.num_slots {
            return false;
        }
        let distance = (head + self.num_slots - self.head) % self.num_slots;
        distance <= self.available()
    }
}

/// An open netmap port, closed when dropped.
pub struct NetmapPort {
    kernel: Arc<dyn Kernel>,
    handle: Option<NetmapHandle>,
}

impl NetmapPort {
    pub fn open(kernel: Arc<dyn Kernel>, ifname: &str) -> Result<Self> {
        let handle = kernel.netmap_open(ifname)?;
        debug!(
            "netmap {} opened: {} tx / {} rx rings",
            ifname, handle.tx_rings, handle.rx_rings
        );
        Ok(Self {
            kernel,
            handle: Some(handle),
        })
    }

    fn handle(&self) -> Result<&NetmapHandle> {
        self.handle.as_ref().ok_or_else(|| Error::NotFound {
            what: "netmap port",
            name: "closed".to_string(),
        })
    }

    pub fn ifname(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.ifname.as_str())
    }

    pub fn rings(&self, dir: Direction) -> u16 {
        self.handle.as_ref().map_or(0, |h| h.rings(dir))
    }

    pub fn ring(&self, dir: Direction, ring: u16) -> Result<RingState> {
        let handle = self.handle()?;
        self.check_ring(handle, dir, ring)?;
        self.kernel.netmap_ring(handle, dir, ring)
    }

    /// Hand `count` slots at the head of a ring back to the kernel.
    pub fn release(&self, dir: Direction, ring: u16, count: u32) -> Result<RingState> {
        let handle = self.handle()?;
        self.check_ring(handle, dir, ring)?;
        let state = self.kernel.netmap_ring(handle, dir, ring)?;
        let head = state.advance(count)?;
        self.kernel.netmap_release(handle, dir, ring, head)?;
        Ok(RingState {
            head,
            cur: head,
            ..state
        })
    }

    pub fn sync(&self, dir: Direction) -> Result<()> {
        let handle = self.handle()?;
        self.kernel.netmap_sync(handle, dir)
    }

    pub fn close(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.kernel.netmap_close(&handle),
            None => Ok(()),
        }
    }

    fn check_ring(&self, handle: &NetmapHandle, dir: Direction, ring: u16) -> Result<()> {
        if ring >= handle.rings(dir) {
            return Err(Error::NotFound {
                what: "netmap ring",
                name: format!("{} {}{}", handle.ifname, dir, ring),
            });
        }
        Ok(())
    }
}

impl Drop for NetmapPort {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.kernel.netmap_close(&handle) {
                warn!("closing netmap port {} failed: {}", handle.ifname, e);
            }
        }
    }
}
