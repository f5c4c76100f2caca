//! One musician connected to the relay.
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;

///  structure that represents a peer.  The peers have
///
/// - id - assigned by the relay when the CONNECT comes in
/// - name - whatever the peer called itself
/// - address - where the relay last heard from them.  Everything for this peer goes there
/// - muted - ids this peer no longer wants MIDI/chord traffic from
/// - last_seen - millisecond timestamp of the last datagram we got from them
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: u32,
    pub name: String,
    pub address: SocketAddr,
    muted: BTreeSet<u32>,
    last_seen: u128,
    last_rtt: Option<u128>,
}

/// read-only view of a peer for the operator console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub id: u32,
    pub name: String,
    pub address: String,
    pub rtt_millis: Option<u64>,
    pub age_millis: u64,
    pub muted: Vec<u32>,
}

impl Peer {
    pub fn new(now_time: u128, id: u32, name: &str, addr: SocketAddr) -> Peer {
        Peer {
            id,
            name: name.to_string(),
            address: addr,
            muted: BTreeSet::new(),
            last_seen: now_time,
            last_rtt: None,
        }
    }
    /// how long since we heard from them
    pub fn age(&self, now_time: u128) -> u128 {
        now_time.saturating_sub(self.last_seen)
    }
    /// last_seen only ever moves forward
    pub fn touch(&mut self, now_time: u128) -> () {
        if now_time > self.last_seen {
            self.last_seen = now_time;
        }
    }
    pub fn get_last_seen(&self) -> u128 {
        self.last_seen
    }
    pub fn is_old(&self, now_time: u128, timeout: u128) -> bool {
        self.age(now_time) > timeout
    }
    /// returns true if this changed anything
    pub fn mute(&mut self, other: u32) -> bool {
        self.muted.insert(other)
    }
    pub fn unmute(&mut self, other: u32) -> bool {
        self.muted.remove(&other)
    }
    pub fn has_muted(&self, other: u32) -> bool {
        self.muted.contains(&other)
    }
    pub fn get_muted(&self) -> impl Iterator<Item = u32> + '_ {
        self.muted.iter().copied()
    }
    pub fn set_rtt(&mut self, rtt: u128) -> () {
        self.last_rtt = Some(rtt);
    }
    pub fn get_rtt(&self) -> Option<u128> {
        self.last_rtt
    }
    pub fn status(&self, now_time: u128) -> PeerStatus {
        PeerStatus {
            id: self.id,
            name: self.name.clone(),
            address: self.address.to_string(),
            rtt_millis: self.last_rtt.map(|r| r as u64),
            age_millis: self.age(now_time) as u64,
            muted: self.muted.iter().copied().collect(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{ id: {}, name: {}, address: {} }}", self.id, self.name, self.address)
    }
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", text)
    }
}
