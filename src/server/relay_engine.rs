//! Decode datagrams from peers, keep the registry up to date, and fan traffic out.
//!
//! The engine is single threaded.  Whoever owns it (see [`super::relay_server`])
//! feeds it datagrams and liveness ticks one at a time, so the registry always
//! reflects one serialized history.
//!
//! Routing rules:
//! - CONNECT: register, answer the sender with ID, then send COUNT and CLIENT_LIST to everybody
//! - DISCONNECT: unregister, then send COUNT and CLIENT_LIST to whoever is left
//! - TEXT: to everybody but the sender
//! - MIDI / CHORD_KEYS: to everybody but the sender and anyone who muted the sender
//! - MUTE / UNMUTE: registry only, nothing goes out
//! - PING_RESPONSE: record the round trip and tell everybody with PING_INFO
use log::{debug, error, info, trace, warn};
use std::net::SocketAddr;

use crate::common::wire_message::WireMessage;

use super::{
    peer::PeerStatus,
    peer_list::PeerList,
    transport::Transport,
};

/// milliseconds of silence before a peer is dropped
pub const DEFAULT_CLIENT_TIMEOUT: u128 = 10_000;

pub struct RelayEngine<T: Transport> {
    transport: T,
    peers: PeerList,
    client_timeout: u128,
}

impl<T: Transport> RelayEngine<T> {
    pub fn new(transport: T, peers: PeerList, client_timeout: u128) -> RelayEngine<T> {
        RelayEngine {
            transport,
            peers,
            client_timeout,
        }
    }
    pub fn get_peers(&self) -> &PeerList {
        &self.peers
    }
    pub fn get_transport(&self) -> &T {
        &self.transport
    }
    pub fn get_client_timeout(&self) -> u128 {
        self.client_timeout
    }
    pub fn roster(&self, now_time: u128) -> Vec<PeerStatus> {
        self.peers.status(now_time)
    }

    /// process one inbound datagram.  Nothing in here is fatal to the relay.
    pub fn handle_datagram(&mut self, data: &[u8], src: SocketAddr, now_time: u128) -> () {
        let line = match std::str::from_utf8(data) {
            Ok(l) => l.trim(),
            Err(_) => {
                warn!("dropping non-text datagram from {}", src);
                return;
            }
        };
        let msg = match line.parse::<WireMessage>() {
            Ok(m) => m,
            Err(e) => {
                warn!("dropping datagram from {}: {} ({:?})", src, e, line);
                return;
            }
        };
        // any good traffic from a known address keeps that peer alive
        if let Some(id) = self.peers.find_by_address(src) {
            self.peers.touch(id, now_time);
        }
        self.dispatch(msg, line, src, now_time);
    }

    fn dispatch(&mut self, msg: WireMessage, line: &str, src: SocketAddr, now_time: u128) -> () {
        match msg {
            WireMessage::Connect { name } => self.connect(&name, src, now_time),
            WireMessage::Disconnect { id } => self.disconnect(id),
            WireMessage::Text { id, name, body } => {
                debug!("TEXT from {} ({}): {}", name, id, body);
                self.forward(line, id, false);
            }
            WireMessage::Midi {
                id,
                name,
                status,
                channel,
                data1,
                data2,
            } => {
                debug!(
                    "MIDI from {} ({}): status={} channel={} data1={} data2={}",
                    name, id, status, channel, data1, data2
                );
                self.forward(line, id, true);
            }
            WireMessage::ChordKeys {
                id,
                name,
                note,
                note_on,
                chord_label,
            } => {
                debug!(
                    "CHORD_KEYS from {} ({}): note={} on={} chord={}",
                    name, id, note, note_on, chord_label
                );
                self.forward(line, id, true);
            }
            WireMessage::Mute { muter_id, muted_id } => {
                if self.peers.mute(muter_id, muted_id) {
                    info!("peer {} muted peer {}", muter_id, muted_id);
                }
            }
            WireMessage::Unmute { muter_id, muted_id } => {
                if self.peers.unmute(muter_id, muted_id) {
                    info!("peer {} unmuted peer {}", muter_id, muted_id);
                }
            }
            WireMessage::PingResponse { sent_at } => self.ping_response(sent_at, src, now_time),
            other => {
                warn!("unexpected {} message from {}", other.tag(), src);
            }
        }
    }

    fn connect(&mut self, name: &str, src: SocketAddr, now_time: u128) -> () {
        // a retried CONNECT replaces whoever was registered at that address
        if let Some(old_id) = self.peers.find_by_address(src) {
            if let Some(old) = self.peers.unregister(old_id) {
                info!("peer {} ({}) reconnecting from {}", old_id, old.name, src);
            }
        }
        match self.peers.register(name, src, now_time) {
            Ok(id) => {
                info!("peer {} ({}) connected from {}", id, name, src);
                self.send_to_addr(&WireMessage::Id { id }.encode(), id, src);
                self.broadcast_roster();
            }
            Err(e) => {
                warn!("rejecting CONNECT from {} ({}): {}", name, src, e);
            }
        }
    }

    fn disconnect(&mut self, id: u32) -> () {
        match self.peers.unregister(id) {
            Some(peer) => info!("peer {} ({}) disconnected", id, peer.name),
            None => debug!("DISCONNECT for peer {} who is already gone", id),
        }
        self.broadcast_roster();
    }

    fn ping_response(&mut self, sent_at: u128, src: SocketAddr, now_time: u128) -> () {
        let rtt = now_time.saturating_sub(sent_at);
        let found = self.peers.find_by_address(src).and_then(|id| self.peers.get_mut(id));
        let info = match found {
            Some(peer) => {
                peer.set_rtt(rtt);
                trace!("peer {} ({}) ping: {}ms", peer.id, peer.name, rtt);
                WireMessage::PingInfo {
                    id: peer.id,
                    name: peer.name.clone(),
                    rtt_millis: rtt,
                }
            }
            None => {
                warn!("PING_RESPONSE from unknown address {}", src);
                return;
            }
        };
        self.broadcast(&info.encode());
    }

    /// who gets a relayed message from `sender`
    pub fn recipients(&self, sender: u32, honor_mutes: bool) -> Vec<(u32, SocketAddr)> {
        self.peers
            .get_peers()
            .filter(|p| p.id != sender)
            .filter(|p| !(honor_mutes && p.has_muted(sender)))
            .map(|p| (p.id, p.address))
            .collect()
    }

    fn forward(&self, line: &str, sender: u32, honor_mutes: bool) -> () {
        let payload = line.as_bytes();
        for (id, addr) in self.recipients(sender, honor_mutes) {
            self.send_to_addr(payload, id, addr);
        }
    }

    // a failed send only costs that one peer their copy
    fn send_to_addr(&self, payload: &[u8], id: u32, addr: SocketAddr) -> () {
        if let Err(e) = self.transport.send_to(payload, addr) {
            error!("failed to send to peer {} at {}: {}", id, addr, e);
        }
    }

    /// send to every registered peer
    pub(super) fn broadcast(&self, payload: &[u8]) -> () {
        for peer in self.peers.get_peers() {
            self.send_to_addr(payload, peer.id, peer.address);
        }
    }

    /// COUNT then CLIENT_LIST to everybody
    pub(super) fn broadcast_roster(&self) -> () {
        let count = WireMessage::Count { n: self.peers.len() };
        let list = WireMessage::ClientList {
            peers: self.peers.snapshot(),
        };
        self.broadcast(&count.encode());
        self.broadcast(&list.encode());
    }

    pub(super) fn evict(&mut self, ids: &[u32]) -> usize {
        let mut evicted = 0;
        for id in ids {
            if let Some(peer) = self.peers.unregister(*id) {
                info!("peer {} ({}) disconnected due to inactivity", id, peer.name);
                evicted += 1;
            }
        }
        evicted
    }

    /// tell everybody we are going away, then forget them
    pub fn shutdown(&mut self) -> () {
        self.broadcast(&WireMessage::ServerShutdown.encode());
        info!("notified {} peers of server shutdown", self.peers.len());
        self.peers.clear();
    }
}
