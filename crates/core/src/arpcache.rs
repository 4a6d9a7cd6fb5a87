//! ARP cache and the queue of packets waiting on ARP resolution.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::wire::MacAddr;

/// Maximum number of cached IP to MAC mappings.
pub const ARPCACHE_SZ: usize = 100;
/// How long a mapping stays valid after it was learned.
pub const ARPCACHE_TO: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub added: Instant,
}

/// A frame parked until its next hop resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    pub frame: Vec<u8>,
    /// Interface the frame will leave through.
    pub out_iface: String,
    /// Interface the frame arrived on; errors are reported back through it.
    pub in_iface: String,
}

/// An outstanding ARP request and the packets waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpRequest {
    pub ip: Ipv4Addr,
    pub sent: Option<Instant>,
    pub times_sent: u32,
    pub iface: String,
    pub packets: Vec<QueuedPacket>,
}

#[derive(Debug)]
pub struct ArpCache {
    entries: Vec<ArpEntry>,
    requests: Vec<ArpRequest>,
    capacity: usize,
    timeout: Duration,
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new(ARPCACHE_SZ, ARPCACHE_TO)
    }
}

impl ArpCache {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            requests: Vec::new(),
            capacity,
            timeout,
        }
    }

    fn fresh(&self, entry: &ArpEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.added) <= self.timeout
    }

    /// MAC address for `ip`, if a mapping is cached and has not expired.
    pub fn lookup(&self, ip: Ipv4Addr, now: Instant) -> Option<MacAddr> {
        self.entries
            .iter()
            .find(|e| e.ip == ip && self.fresh(e, now))
            .map(|e| e.mac)
    }

    /// Record `ip -> mac` and hand back the request that was waiting on it.
    ///
    /// An existing mapping for `ip` is refreshed in place. When the cache is
    /// full the oldest mapping makes room.
    pub fn insert(&mut self, mac: MacAddr, ip: Ipv4Addr, now: Instant) -> Option<ArpRequest> {
        let pending = self
            .requests
            .iter()
            .position(|r| r.ip == ip)
            .map(|idx| self.requests.remove(idx));

        let entry = ArpEntry { mac, ip, added: now };
        if let Some(existing) = self.entries.iter_mut().find(|e| e.ip == ip) {
            *existing = entry;
        } else if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else if let Some(oldest) = self.entries.iter_mut().min_by_key(|e| e.added) {
            *oldest = entry;
        }
        pending
    }

    /// Park `frame` until `ip` resolves, creating the request if needed.
    pub fn queue(
        &mut self,
        ip: Ipv4Addr,
        frame: Vec<u8>,
        out_iface: &str,
        in_iface: &str,
    ) -> &mut ArpRequest {
        let idx = match self.requests.iter().position(|r| r.ip == ip) {
            Some(idx) => idx,
            None => {
                self.requests.push(ArpRequest {
                    ip,
                    sent: None,
                    times_sent: 0,
                    iface: out_iface.to_string(),
                    packets: Vec::new(),
                });
                self.requests.len() - 1
            }
        };
        let req = &mut self.requests[idx];
        req.packets.push(QueuedPacket {
            frame,
            out_iface: out_iface.to_string(),
            in_iface: in_iface.to_string(),
        });
        req
    }

    pub fn request_mut(&mut self, ip: Ipv4Addr) -> Option<&mut ArpRequest> {
        self.requests.iter_mut().find(|r| r.ip == ip)
    }

    /// Drop the request for `ip` and return it with its packets.
    pub fn remove_request(&mut self, ip: Ipv4Addr) -> Option<ArpRequest> {
        let idx = self.requests.iter().position(|r| r.ip == ip)?;
        Some(self.requests.remove(idx))
    }

    /// Addresses that currently have an outstanding request.
    pub fn pending(&self) -> Vec<Ipv4Addr> {
        self.requests.iter().map(|r| r.ip).collect()
    }

    /// Forget mappings older than the timeout.
    pub fn sweep(&mut self, now: Instant) {
        let timeout = self.timeout;
        self.entries
            .retain(|e| now.saturating_duration_since(e.added) <= timeout);
    }

    pub fn entries(&self) -> &[ArpEntry] {
        &self.entries
    }
}

impl fmt::Display for ArpCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MAC                IP               AGE")?;
        writeln!(f, "----------------------------------------")?;
        for e in &self.entries {
            writeln!(
                f,
                "{}  {:<15}  {}s",
                e.mac,
                e.ip,
                e.added.elapsed().as_secs()
            )?;
        }
        Ok(())
    }
}
