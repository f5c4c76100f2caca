//! The session registry: every peer currently in the jam, keyed by id.
//!
//! Only the relay engine writes to this.  Ids are handed out smallest-free-first
//! so an id freed by a disconnect or a timeout is the next one reused.
use log::{debug, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;

use super::peer::{Peer, PeerStatus};

/// ids run from 0 up to (but not including) this
pub const MAX_PEER_IDS: u32 = 9999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityExceeded {
    pub capacity: u32,
}

impl fmt::Display for CapacityExceeded {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "all {} peer ids are in use", self.capacity)
    }
}

impl Error for CapacityExceeded {}

/// Structure to hold the peers in the session
pub struct PeerList {
    peers: BTreeMap<u32, Peer>,
    capacity: u32,
}

impl PeerList {
    pub fn new() -> PeerList {
        Self::with_capacity(MAX_PEER_IDS)
    }
    pub fn with_capacity(capacity: u32) -> PeerList {
        PeerList {
            peers: BTreeMap::new(),
            capacity,
        }
    }
    /// add a peer under the smallest id nobody is using
    pub fn register(&mut self, name: &str, addr: SocketAddr, now_time: u128) -> Result<u32, CapacityExceeded> {
        // keys come back sorted, so the first hole is the smallest free id
        let mut id = 0;
        for key in self.peers.keys() {
            if *key != id {
                break;
            }
            id += 1;
        }
        if id >= self.capacity {
            return Err(CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.peers.insert(id, Peer::new(now_time, id, name, addr));
        Ok(id)
    }
    /// remove a peer.  Not finding them is fine, they may have timed out already
    pub fn unregister(&mut self, id: u32) -> Option<Peer> {
        self.peers.remove(&id)
    }
    /// update the last seen time.  returns false if the id is unknown
    pub fn touch(&mut self, id: u32, now_time: u128) -> bool {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                peer.touch(now_time);
                true
            }
            None => false,
        }
    }
    /// muter stops getting MIDI/chord traffic from muted
    pub fn mute(&mut self, muter_id: u32, muted_id: u32) -> bool {
        match self.peers.get_mut(&muter_id) {
            Some(peer) => {
                if !peer.mute(muted_id) {
                    debug!("peer {} already muted {}", muter_id, muted_id);
                }
                true
            }
            None => {
                warn!("mute from unknown peer {}", muter_id);
                false
            }
        }
    }
    pub fn unmute(&mut self, muter_id: u32, muted_id: u32) -> bool {
        match self.peers.get_mut(&muter_id) {
            Some(peer) => {
                peer.unmute(muted_id);
                true
            }
            None => {
                warn!("unmute from unknown peer {}", muter_id);
                false
            }
        }
    }
    /// (id, name) for everybody, in id order
    pub fn snapshot(&self) -> Vec<(u32, String)> {
        self.peers.values().map(|p| (p.id, p.name.clone())).collect()
    }
    pub fn status(&self, now_time: u128) -> Vec<PeerStatus> {
        self.peers.values().map(|p| p.status(now_time)).collect()
    }
    /// which peer is sending from this address
    pub fn find_by_address(&self, addr: SocketAddr) -> Option<u32> {
        self.peers.values().find(|p| p.address == addr).map(|p| p.id)
    }
    pub fn get(&self, id: u32) -> Option<&Peer> {
        self.peers.get(&id)
    }
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }
    /// Get the peers to iterate though
    pub fn get_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }
    /// ids of everybody we have not heard from in over `timeout` millis
    pub fn expired(&self, now_time: u128, timeout: u128) -> Vec<u32> {
        self.peers
            .values()
            .filter(|p| p.is_old(now_time, timeout))
            .map(|p| p.id)
            .collect()
    }
    pub fn len(&self) -> usize {
        self.peers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
    pub fn get_capacity(&self) -> u32 {
        self.capacity
    }
    pub fn clear(&mut self) -> () {
        self.peers.clear();
    }
}

impl Default for PeerList {
    fn default() -> PeerList {
        PeerList::new()
    }
}

impl fmt::Display for PeerList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[ ")?;
        for peer in self.peers.values() {
            write!(f, " {},", peer)?;
        }
        write!(f, " ]")
    }
}
