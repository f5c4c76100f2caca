//! The client end of a jam session.
//!
//! A `JamClient` owns one UDP socket.  `connect` trades CONNECT for an ID, after
//! that the senders can be called from any thread while one thread sits in `poll`
//! reading whatever the relay sends.  PINGs are answered inside `poll`.
use log::{debug, info, trace, warn};
use simple_error::bail;
use std::{
    collections::BTreeSet,
    fmt,
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::common::{
    box_error::BoxError,
    get_milli_time, sock_with_tos,
    timer::MilliTimer,
    wire_message::{is_oversize, WireMessage, MAX_DATAGRAM, RECV_BUFFER},
};

pub const CONNECT_TIMEOUT_MS: u64 = 2_000;
pub const POLL_TIMEOUT_MS: u64 = 100;
/// give up on a relay we haven't heard anything from in this long
pub const RELAY_TIMEOUT_MS: u128 = 10_000;

/// Something the relay told us that the user should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Text {
        id: u32,
        name: String,
        body: String,
    },
    Midi {
        id: u32,
        name: String,
        status: i32,
        channel: i32,
        data1: i32,
        data2: i32,
    },
    ChordKeys {
        id: u32,
        name: String,
        note: i32,
        note_on: bool,
        chord_label: String,
    },
    PeerCount(usize),
    Roster {
        peers: Vec<(u32, String)>,
        added: Vec<(u32, String)>,
        removed: Vec<(u32, String)>,
    },
    PingInfo {
        id: u32,
        name: String,
        rtt_millis: u128,
    },
    ServerShutdown,
    /// the relay went quiet for too long
    ConnectionLost,
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientEvent::Text { name, body, .. } => write!(f, "{}: {}", name, body),
            ClientEvent::Midi {
                name,
                status,
                channel,
                data1,
                data2,
                ..
            } => write!(f, "{} midi {} ch{} {} {}", name, status, channel, data1, data2),
            ClientEvent::ChordKeys {
                name,
                note,
                note_on,
                chord_label,
                ..
            } => {
                let verb = if *note_on { "pressed" } else { "released" };
                write!(f, "{} {} {} [{}]", name, verb, note, chord_label)
            }
            ClientEvent::PeerCount(n) => write!(f, "{} in the session", n),
            ClientEvent::Roster { added, removed, .. } => {
                for (id, name) in added {
                    write!(f, "+{} ({}) ", name, id)?;
                }
                for (id, name) in removed {
                    write!(f, "-{} ({}) ", name, id)?;
                }
                Ok(())
            }
            ClientEvent::PingInfo {
                id,
                name,
                rtt_millis,
            } => write!(f, "{} ({}) ping {}ms", name, id, rtt_millis),
            ClientEvent::ServerShutdown => write!(f, "the relay shut down"),
            ClientEvent::ConnectionLost => write!(f, "lost contact with the relay"),
        }
    }
}

struct ClientState {
    server: Option<SocketAddr>,
    id: Option<u32>,
    name: String,
    muted: BTreeSet<u32>,
    roster: Vec<(u32, String)>,
    // reset by every datagram from the relay
    relay_timer: MilliTimer,
}

impl ClientState {
    fn new() -> ClientState {
        ClientState {
            server: None,
            id: None,
            name: String::new(),
            muted: BTreeSet::new(),
            roster: vec![],
            relay_timer: MilliTimer::build(get_milli_time(), RELAY_TIMEOUT_MS),
        }
    }
    fn forget_session(&mut self) -> () {
        self.id = None;
        self.server = None;
        self.roster.clear();
    }
}

pub struct JamClient {
    sock: UdpSocket,
    state: Mutex<ClientState>,
}

impl JamClient {
    /// bind the client socket.  port 0 is the usual choice
    pub fn build(bind_addr: SocketAddr) -> Result<JamClient, BoxError> {
        let sock = sock_with_tos::bind(bind_addr)?;
        sock.set_read_timeout(Some(Duration::from_millis(POLL_TIMEOUT_MS)))?;
        Ok(JamClient {
            sock,
            state: Mutex::new(ClientState::new()),
        })
    }

    // a panic on another thread doesn't make the state any less usable
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.sock.local_addr()?)
    }

    /// Say hello to the relay and wait for our id
    pub fn connect(&self, server: SocketAddr, name: &str, timeout: Duration) -> Result<u32, BoxError> {
        if name.contains(':') {
            bail!("name '{}' can't have a colon in it", name);
        }
        self.state().forget_session();
        self.sock
            .send_to(&WireMessage::Connect { name: name.to_string() }.encode(), server)?;

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; MAX_DATAGRAM];
        let reply = loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                bail!("no reply from {} within {:?}", server, timeout);
            }
            self.sock.set_read_timeout(Some(left))?;
            match self.sock.recv_from(&mut buf) {
                Ok((amt, src)) if src == server => break WireMessage::decode(&buf[..amt]),
                Ok((_amt, src)) => debug!("ignoring datagram from {} while connecting", src),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => {
                    self.sock
                        .set_read_timeout(Some(Duration::from_millis(POLL_TIMEOUT_MS)))?;
                    return Err(e.into());
                }
            }
        };
        self.sock
            .set_read_timeout(Some(Duration::from_millis(POLL_TIMEOUT_MS)))?;

        match reply {
            Ok(WireMessage::Id { id }) => {
                let mut state = self.state();
                state.server = Some(server);
                state.id = Some(id);
                state.name = name.to_string();
                state.relay_timer.reset(get_milli_time());
                info!("connected to {} as {} ({})", server, name, id);
                Ok(id)
            }
            Ok(other) => bail!("expected ID from {}, got {}", server, other),
            Err(e) => bail!("bad reply from {}: {}", server, e),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state().id.is_some()
    }
    pub fn get_id(&self) -> Option<u32> {
        self.state().id
    }
    pub fn get_name(&self) -> String {
        self.state().name.clone()
    }
    pub fn get_roster(&self) -> Vec<(u32, String)> {
        self.state().roster.clone()
    }
    pub fn is_muted(&self, id: u32) -> bool {
        self.state().muted.contains(&id)
    }

    // id, name and relay address, or an error when not connected
    fn session(&self) -> Result<(u32, String, SocketAddr), BoxError> {
        let state = self.state();
        match (state.id, state.server) {
            (Some(id), Some(server)) => Ok((id, state.name.clone(), server)),
            _ => bail!("not connected"),
        }
    }

    fn send(&self, msg: &WireMessage, server: SocketAddr) -> Result<(), BoxError> {
        trace!("sending {}", msg);
        self.sock.send_to(&msg.encode(), server)?;
        Ok(())
    }

    pub fn send_text(&self, body: &str) -> Result<(), BoxError> {
        let (id, name, server) = self.session()?;
        let body = body.to_string();
        self.send(&WireMessage::Text { id, name, body }, server)
    }

    pub fn send_midi(&self, status: i32, channel: i32, data1: i32, data2: i32) -> Result<(), BoxError> {
        let (id, name, server) = self.session()?;
        self.send(
            &WireMessage::Midi {
                id,
                name,
                status,
                channel,
                data1,
                data2,
            },
            server,
        )
    }

    pub fn send_chord_keys(&self, note: i32, note_on: bool, chord_label: &str) -> Result<(), BoxError> {
        let (id, name, server) = self.session()?;
        self.send(
            &WireMessage::ChordKeys {
                id,
                name,
                note,
                note_on,
                chord_label: chord_label.to_string(),
            },
            server,
        )
    }

    /// stop hearing MIDI from `other`.  Nobody else finds out
    pub fn mute(&self, other: u32) -> Result<(), BoxError> {
        let (id, _, server) = self.session()?;
        self.state().muted.insert(other);
        self.send(
            &WireMessage::Mute {
                muter_id: id,
                muted_id: other,
            },
            server,
        )
    }

    pub fn unmute(&self, other: u32) -> Result<(), BoxError> {
        let (id, _, server) = self.session()?;
        self.state().muted.remove(&other);
        self.send(
            &WireMessage::Unmute {
                muter_id: id,
                muted_id: other,
            },
            server,
        )
    }

    pub fn disconnect(&self) -> Result<(), BoxError> {
        let (id, _, server) = self.session()?;
        let res = self.send(&WireMessage::Disconnect { id }, server);
        self.state().forget_session();
        info!("disconnected from {}", server);
        res
    }

    /// how long the relay may stay quiet before `poll` reports the connection lost
    pub fn set_relay_timeout(&self, millis: u128) -> () {
        self.state().relay_timer.set_interval(millis);
    }

    // ConnectionLost (and the session forgotten) if the relay has gone quiet
    fn check_relay(&self, now_time: u128) -> Option<ClientEvent> {
        let mut state = self.state();
        let server = state.server?;
        if !state.relay_timer.expired(now_time) {
            return None;
        }
        warn!(
            "nothing from relay {} for {}ms (limit {}ms), giving up",
            server,
            state.relay_timer.since(now_time),
            state.relay_timer.get_interval()
        );
        state.forget_session();
        Some(ClientEvent::ConnectionLost)
    }

    /// Wait a little while for one datagram from the relay.
    ///
    /// Returns Ok(None) when nothing interesting showed up (timeouts, pings,
    /// junk, muted senders).
    pub fn poll(&self) -> Result<Option<ClientEvent>, BoxError> {
        if let Some(lost) = self.check_relay(get_milli_time()) {
            return Ok(Some(lost));
        }
        let mut buf = [0u8; RECV_BUFFER];
        let (amt, src) = match self.sock.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => return Ok(None),
                _ => return Err(e.into()),
            },
        };
        let server = match self.state().server {
            Some(s) => s,
            None => {
                debug!("not connected, dropping datagram from {}", src);
                return Ok(None);
            }
        };
        if src != server {
            debug!("dropping datagram from stranger {}", src);
            return Ok(None);
        }
        self.state().relay_timer.reset(get_milli_time());
        if is_oversize(amt) {
            warn!("dropping oversize datagram from relay");
            return Ok(None);
        }
        match WireMessage::decode(&buf[..amt]) {
            Ok(msg) => self.handle_message(msg, server),
            Err(e) => {
                warn!("bad datagram from relay: {}", e);
                Ok(None)
            }
        }
    }

    fn handle_message(&self, msg: WireMessage, server: SocketAddr) -> Result<Option<ClientEvent>, BoxError> {
        let event = match msg {
            WireMessage::Ping { sent_at } => {
                self.send(&WireMessage::PingResponse { sent_at }, server)?;
                None
            }
            WireMessage::Text { id, name, body } => Some(ClientEvent::Text { id, name, body }),
            WireMessage::Midi {
                id,
                name,
                status,
                channel,
                data1,
                data2,
            } => {
                if self.is_muted(id) {
                    None
                } else {
                    Some(ClientEvent::Midi {
                        id,
                        name,
                        status,
                        channel,
                        data1,
                        data2,
                    })
                }
            }
            WireMessage::ChordKeys {
                id,
                name,
                note,
                note_on,
                chord_label,
            } => {
                if self.is_muted(id) {
                    None
                } else {
                    Some(ClientEvent::ChordKeys {
                        id,
                        name,
                        note,
                        note_on,
                        chord_label,
                    })
                }
            }
            WireMessage::Count { n } => Some(ClientEvent::PeerCount(n)),
            WireMessage::ClientList { peers } => {
                let mut state = self.state();
                let (added, removed) = diff_roster(&state.roster, &peers);
                state.roster = peers.clone();
                Some(ClientEvent::Roster {
                    peers,
                    added,
                    removed,
                })
            }
            WireMessage::PingInfo {
                id,
                name,
                rtt_millis,
            } => Some(ClientEvent::PingInfo {
                id,
                name,
                rtt_millis,
            }),
            WireMessage::ServerShutdown => {
                self.state().forget_session();
                info!("relay {} shut down", server);
                Some(ClientEvent::ServerShutdown)
            }
            other => {
                debug!("ignoring {} from relay", other.tag());
                None
            }
        };
        Ok(event)
    }
}

/// (added, removed) going from `old` to `new`
pub fn diff_roster(old: &[(u32, String)], new: &[(u32, String)]) -> (Vec<(u32, String)>, Vec<(u32, String)>) {
    let added = new.iter().filter(|p| !old.contains(p)).cloned().collect();
    let removed = old.iter().filter(|p| !new.contains(p)).cloned().collect();
    (added, removed)
}

#[cfg(test)]
mod test_jam_client {
    use super::*;

    fn fake_relay() -> (UdpSocket, SocketAddr) {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = sock.local_addr().unwrap();
        (sock, addr)
    }

    fn client() -> JamClient {
        JamClient::build(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap()
    }

    fn recv_line(sock: &UdpSocket) -> (String, SocketAddr) {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (amt, src) = sock.recv_from(&mut buf).unwrap();
        (String::from_utf8_lossy(&buf[..amt]).to_string(), src)
    }

    // connect a client to a relay played by the test
    fn connected(relay: &UdpSocket, relay_addr: SocketAddr, id: u32) -> (JamClient, SocketAddr) {
        let c = client();
        let client_addr = c.local_addr().unwrap();
        let reply = format!("ID:{}", id);
        let handle = std::thread::spawn({
            let relay = relay.try_clone().unwrap();
            move || {
                let (line, src) = recv_line(&relay);
                assert_eq!(line, "CONNECT:ann");
                relay.send_to(reply.as_bytes(), src).unwrap();
            }
        });
        assert_eq!(c.connect(relay_addr, "ann", Duration::from_secs(2)).unwrap(), id);
        handle.join().unwrap();
        (c, client_addr)
    }

    // poll until something other than nothing shows up
    fn next_event(c: &JamClient) -> Option<ClientEvent> {
        for _ in 0..20 {
            if let Some(ev) = c.poll().unwrap() {
                return Some(ev);
            }
        }
        None
    }

    #[test]
    fn connect_gets_an_id() {
        let (relay, relay_addr) = fake_relay();
        let (c, _) = connected(&relay, relay_addr, 7);
        assert!(c.is_connected());
        assert_eq!(c.get_id(), Some(7));
        assert_eq!(c.get_name(), "ann");
    }

    #[test]
    fn connect_times_out() {
        let (_relay, relay_addr) = fake_relay();
        let c = client();
        assert!(c.connect(relay_addr, "ann", Duration::from_millis(200)).is_err());
        assert!(!c.is_connected());
    }

    #[test]
    fn colon_in_name_is_refused() {
        let (_relay, relay_addr) = fake_relay();
        let c = client();
        assert!(c.connect(relay_addr, "a:b", Duration::from_millis(200)).is_err());
    }

    #[test]
    fn senders_need_a_connection() {
        let c = client();
        assert!(c.send_text("hi").is_err());
        assert!(c.send_midi(144, 0, 60, 100).is_err());
        assert!(c.mute(1).is_err());
        assert!(c.disconnect().is_err());
    }

    #[test]
    fn senders_encode_the_session() {
        let (relay, relay_addr) = fake_relay();
        let (c, _) = connected(&relay, relay_addr, 3);
        c.send_text("hello: there").unwrap();
        assert_eq!(recv_line(&relay).0, "TEXT:3:ann:hello: there");
        c.send_midi(144, 0, 60, 100).unwrap();
        assert_eq!(recv_line(&relay).0, "MIDI:3:ann:144:0:60:100");
        c.send_chord_keys(64, false, "C Major").unwrap();
        assert_eq!(recv_line(&relay).0, "CHORD_KEYS:3:ann:64:false:C Major");
        c.mute(5).unwrap();
        assert_eq!(recv_line(&relay).0, "MUTE:3:5");
        assert!(c.is_muted(5));
        c.unmute(5).unwrap();
        assert_eq!(recv_line(&relay).0, "UNMUTE:3:5");
        c.disconnect().unwrap();
        assert_eq!(recv_line(&relay).0, "DISCONNECT:3");
        assert!(!c.is_connected());
    }

    #[test]
    fn ping_is_answered_silently() {
        let (relay, relay_addr) = fake_relay();
        let (c, client_addr) = connected(&relay, relay_addr, 0);
        relay.send_to(b"PING:12345", client_addr).unwrap();
        assert_eq!(next_event(&c), None);
        assert_eq!(recv_line(&relay).0, "PING_RESPONSE:12345");
    }

    #[test]
    fn muted_midi_is_dropped_locally() {
        let (relay, relay_addr) = fake_relay();
        let (c, client_addr) = connected(&relay, relay_addr, 0);
        c.mute(1).unwrap();
        recv_line(&relay);
        relay.send_to(b"MIDI:1:bob:144:0:60:100", client_addr).unwrap();
        relay.send_to(b"TEXT:1:bob:still talking", client_addr).unwrap();
        assert_eq!(
            next_event(&c),
            Some(ClientEvent::Text {
                id: 1,
                name: "bob".to_string(),
                body: "still talking".to_string()
            })
        );
    }

    #[test]
    fn roster_changes_are_reported() {
        let (relay, relay_addr) = fake_relay();
        let (c, client_addr) = connected(&relay, relay_addr, 0);
        relay.send_to(b"CLIENT_LIST:0:ann,1:bob,", client_addr).unwrap();
        match next_event(&c) {
            Some(ClientEvent::Roster { peers, added, .. }) => {
                assert_eq!(peers.len(), 2);
                assert_eq!(added.len(), 2);
            }
            other => panic!("expected a roster, got {:?}", other),
        }
        relay.send_to(b"CLIENT_LIST:0:ann,2:cat,", client_addr).unwrap();
        match next_event(&c) {
            Some(ClientEvent::Roster { added, removed, .. }) => {
                assert_eq!(added, vec![(2, "cat".to_string())]);
                assert_eq!(removed, vec![(1, "bob".to_string())]);
            }
            other => panic!("expected a roster, got {:?}", other),
        }
    }

    #[test]
    fn shutdown_disconnects() {
        let (relay, relay_addr) = fake_relay();
        let (c, client_addr) = connected(&relay, relay_addr, 0);
        relay.send_to(b"SERVER_SHUTDOWN", client_addr).unwrap();
        assert_eq!(next_event(&c), Some(ClientEvent::ServerShutdown));
        assert!(!c.is_connected());
    }

    #[test]
    fn silent_relay_means_connection_lost() {
        let (relay, relay_addr) = fake_relay();
        let (c, client_addr) = connected(&relay, relay_addr, 0);
        c.set_relay_timeout(300);
        // still talking, still connected
        relay.send_to(b"COUNT:1", client_addr).unwrap();
        assert_eq!(next_event(&c), Some(ClientEvent::PeerCount(1)));
        assert!(c.is_connected());

        // then nothing at all
        assert_eq!(next_event(&c), Some(ClientEvent::ConnectionLost));
        assert!(!c.is_connected());
        assert!(c.send_text("anyone?").is_err());
        // reported once
        assert_eq!(c.poll().unwrap(), None);
    }

    #[test]
    fn strangers_are_ignored() {
        let (relay, relay_addr) = fake_relay();
        let (c, client_addr) = connected(&relay, relay_addr, 0);
        let (stranger, _) = fake_relay();
        stranger.send_to(b"TEXT:9:eve:boo", client_addr).unwrap();
        assert_eq!(next_event(&c), None);
        drop(relay);
    }

    #[test]
    fn diffing() {
        let old = vec![(0, "ann".to_string()), (1, "bob".to_string())];
        let new = vec![(0, "ann".to_string())];
        let (added, removed) = diff_roster(&old, &new);
        assert!(added.is_empty());
        assert_eq!(removed, vec![(1, "bob".to_string())]);
        let ev = ClientEvent::Roster {
            peers: new,
            added,
            removed,
        };
        assert_eq!(ev.to_string(), "-bob (1) ");
    }
}
