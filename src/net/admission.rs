//! Per-address connection admission.
//!
//! # Responsibilities
//! - Count live connections per source IP
//! - Refuse a connection once its address reaches the ceiling
//! - Release the slot when the connection ends, reclaiming empty records
//!
//! # Design Decisions
//! - DashMap entry API: each update locks one shard for one counter change
//! - Rejection is silent here; the dispatcher drops the socket

use std::net::IpAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Tracks live connections per IP address against a fixed ceiling.
#[derive(Debug)]
pub struct AdmissionGuard {
    peers: DashMap<IpAddr, usize>,
    ceiling: usize,
}

impl AdmissionGuard {
    /// Create a guard allowing `ceiling` concurrent connections per address.
    pub fn new(ceiling: usize) -> Self {
        Self {
            peers: DashMap::new(),
            ceiling,
        }
    }

    /// Take a slot for `addr` if it is below the ceiling.
    ///
    /// Returns `false` without touching any state when the address is full.
    pub fn try_admit(&self, addr: IpAddr) -> bool {
        match self.peers.entry(addr) {
            Entry::Occupied(mut record) => {
                if *record.get() >= self.ceiling {
                    return false;
                }
                *record.get_mut() += 1;
                true
            }
            Entry::Vacant(slot) => {
                if self.ceiling == 0 {
                    return false;
                }
                slot.insert(1);
                true
            }
        }
    }

    /// Give back a slot for `addr`. The record is removed once it reaches zero.
    pub fn release(&self, addr: IpAddr) {
        if let Entry::Occupied(mut record) = self.peers.entry(addr) {
            let count = record.get_mut();
            *count = count.saturating_sub(1);
            if *count == 0 {
                record.remove();
            }
        }
    }

    /// Admit `addr` and return a permit that releases the slot on drop.
    pub fn admit(self: &Arc<Self>, addr: IpAddr) -> Option<PeerPermit> {
        self.try_admit(addr).then(|| PeerPermit {
            guard: Arc::clone(self),
            addr,
        })
    }

    /// Live connections currently held by `addr`.
    pub fn active(&self, addr: IpAddr) -> usize {
        self.peers.get(&addr).map(|count| *count).unwrap_or(0)
    }

    /// Number of addresses with at least one live connection.
    pub fn tracked_peers(&self) -> usize {
        self.peers.len()
    }

    /// Configured per-address ceiling.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// A held admission slot.
///
/// Dropping the permit releases the slot, whichever way the connection ends.
#[derive(Debug)]
pub struct PeerPermit {
    guard: Arc<AdmissionGuard>,
    addr: IpAddr,
}

impl PeerPermit {
    pub fn addr(&self) -> IpAddr {
        self.addr
    }
}

impl Drop for PeerPermit {
    fn drop(&mut self) {
        self.guard.release(self.addr);
        tracing::trace!(peer_ip = %self.addr, "Admission slot released");
    }
}
