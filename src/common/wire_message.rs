//! The text messages that go "on the wire" between clients and the relay
//!
//! Every datagram is a single ASCII line.  Fields are separated by colons and the
//! first field is the tag that says what kind of message it is.  Each tag has a fixed
//! number of fields.  A couple of them (TEXT body, CHORD_KEYS label) are allowed to
//! contain colons, in which case the line is only split as far as the field count.
//!
//! | Tag | Fields |
//! |---|---|
//! | `CONNECT` | `name` |
//! | `ID` | `assignedId` |
//! | `DISCONNECT` | `id` |
//! | `TEXT` | `id,name,body` |
//! | `MIDI` | `id,name,status,channel,data1,data2` |
//! | `CHORD_KEYS` | `id,name,note,noteOn,chordLabel` |
//! | `MUTE` / `UNMUTE` | `muterId,mutedId` |
//! | `COUNT` | `n` |
//! | `CLIENT_LIST` | `id:name,id:name,...` |
//! | `PING` / `PING_RESPONSE` | `sentAtMillis` |
//! | `PING_INFO` | `id,name,rttMillis` |
//! | `SERVER_SHUTDOWN` | |
use std::{error::Error, fmt, str::FromStr};

/// biggest datagram anybody should send us
pub const MAX_DATAGRAM: usize = 1024;

/// Receive buffer size.  One byte more than [`MAX_DATAGRAM`] so an oversize
/// datagram shows up as a full buffer instead of being silently cut short.
pub const RECV_BUFFER: usize = MAX_DATAGRAM + 1;

/// true if a datagram of `amt` bytes (as read into a [`RECV_BUFFER`]) is too big to trust
pub fn is_oversize(amt: usize) -> bool {
    amt > MAX_DATAGRAM
}

pub const TAG_CONNECT: &str = "CONNECT";
pub const TAG_ID: &str = "ID";
pub const TAG_DISCONNECT: &str = "DISCONNECT";
pub const TAG_TEXT: &str = "TEXT";
pub const TAG_MIDI: &str = "MIDI";
pub const TAG_CHORD_KEYS: &str = "CHORD_KEYS";
pub const TAG_MUTE: &str = "MUTE";
pub const TAG_UNMUTE: &str = "UNMUTE";
pub const TAG_COUNT: &str = "COUNT";
pub const TAG_CLIENT_LIST: &str = "CLIENT_LIST";
pub const TAG_PING: &str = "PING";
pub const TAG_PING_RESPONSE: &str = "PING_RESPONSE";
pub const TAG_PING_INFO: &str = "PING_INFO";
pub const TAG_SERVER_SHUTDOWN: &str = "SERVER_SHUTDOWN";

/// One decoded datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Connect {
        name: String,
    },
    Id {
        id: u32,
    },
    Disconnect {
        id: u32,
    },
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
    Mute {
        muter_id: u32,
        muted_id: u32,
    },
    Unmute {
        muter_id: u32,
        muted_id: u32,
    },
    Count {
        n: usize,
    },
    ClientList {
        peers: Vec<(u32, String)>,
    },
    Ping {
        sent_at: u128,
    },
    PingResponse {
        sent_at: u128,
    },
    PingInfo {
        id: u32,
        name: String,
        rtt_millis: u128,
    },
    ServerShutdown,
}

/// Why a datagram could not be turned into a [`WireMessage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Empty,
    NotUtf8,
    UnknownTag(String),
    FieldCount {
        tag: &'static str,
        expected: usize,
        found: usize,
    },
    BadNumber {
        tag: &'static str,
        field: &'static str,
        value: String,
    },
    BadBool {
        tag: &'static str,
        value: String,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty datagram"),
            DecodeError::NotUtf8 => write!(f, "datagram is not valid text"),
            DecodeError::UnknownTag(tag) => write!(f, "unknown message type: {}", tag),
            DecodeError::FieldCount {
                tag,
                expected,
                found,
            } => write!(f, "invalid {} message: expected {} fields, got {}", tag, expected, found),
            DecodeError::BadNumber { tag, field, value } => {
                write!(f, "invalid {} message: {} '{}' is not a number", tag, field, value)
            }
            DecodeError::BadBool { tag, value } => {
                write!(f, "invalid {} message: '{}' is not true/false", tag, value)
            }
        }
    }
}

impl Error for DecodeError {}

impl WireMessage {
    /// decode a raw datagram
    pub fn decode(data: &[u8]) -> Result<WireMessage, DecodeError> {
        let line = std::str::from_utf8(data).map_err(|_| DecodeError::NotUtf8)?;
        line.parse()
    }

    /// bytes ready to hand to send_to
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn tag(&self) -> &'static str {
        match self {
            WireMessage::Connect { .. } => TAG_CONNECT,
            WireMessage::Id { .. } => TAG_ID,
            WireMessage::Disconnect { .. } => TAG_DISCONNECT,
            WireMessage::Text { .. } => TAG_TEXT,
            WireMessage::Midi { .. } => TAG_MIDI,
            WireMessage::ChordKeys { .. } => TAG_CHORD_KEYS,
            WireMessage::Mute { .. } => TAG_MUTE,
            WireMessage::Unmute { .. } => TAG_UNMUTE,
            WireMessage::Count { .. } => TAG_COUNT,
            WireMessage::ClientList { .. } => TAG_CLIENT_LIST,
            WireMessage::Ping { .. } => TAG_PING,
            WireMessage::PingResponse { .. } => TAG_PING_RESPONSE,
            WireMessage::PingInfo { .. } => TAG_PING_INFO,
            WireMessage::ServerShutdown => TAG_SERVER_SHUTDOWN,
        }
    }
}

// Split a line into exactly `expected` parts (tag included).  With keep_tail the
// last part swallows whatever colons are left over.
fn split_fields<'a>(
    line: &'a str,
    tag: &'static str,
    expected: usize,
    keep_tail: bool,
) -> Result<Vec<&'a str>, DecodeError> {
    let parts: Vec<&str> = if keep_tail {
        line.splitn(expected, ':').collect()
    } else {
        line.split(':').collect()
    };
    if parts.len() != expected {
        return Err(DecodeError::FieldCount {
            tag,
            expected: expected - 1,
            found: parts.len() - 1,
        });
    }
    Ok(parts)
}

fn parse_num<T: FromStr>(tag: &'static str, field: &'static str, value: &str) -> Result<T, DecodeError> {
    value.parse::<T>().map_err(|_| DecodeError::BadNumber {
        tag,
        field,
        value: value.to_string(),
    })
}

fn parse_bool(tag: &'static str, value: &str) -> Result<bool, DecodeError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(DecodeError::BadBool {
            tag,
            value: value.to_string(),
        })
    }
}

fn parse_client_list(rest: &str) -> Result<Vec<(u32, String)>, DecodeError> {
    let mut peers = vec![];
    for entry in rest.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        // entries without an id separator are skipped, same as a blank entry
        if let Some((id, name)) = entry.split_once(':') {
            peers.push((parse_num(TAG_CLIENT_LIST, "id", id)?, name.to_string()));
        }
    }
    Ok(peers)
}

impl FromStr for WireMessage {
    type Err = DecodeError;

    fn from_str(raw: &str) -> Result<WireMessage, DecodeError> {
        let line = raw.trim();
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }
        let tag = match line.split_once(':') {
            Some((tag, _)) => tag,
            None => line,
        };
        match tag {
            TAG_CONNECT => {
                // The name can't have a colon in it
                let p = split_fields(line, TAG_CONNECT, 2, false)?;
                Ok(WireMessage::Connect {
                    name: p[1].to_string(),
                })
            }
            TAG_ID => {
                let p = split_fields(line, TAG_ID, 2, false)?;
                Ok(WireMessage::Id {
                    id: parse_num(TAG_ID, "id", p[1])?,
                })
            }
            TAG_DISCONNECT => {
                let p = split_fields(line, TAG_DISCONNECT, 2, false)?;
                Ok(WireMessage::Disconnect {
                    id: parse_num(TAG_DISCONNECT, "id", p[1])?,
                })
            }
            TAG_TEXT => {
                let p = split_fields(line, TAG_TEXT, 4, true)?;
                Ok(WireMessage::Text {
                    id: parse_num(TAG_TEXT, "id", p[1])?,
                    name: p[2].to_string(),
                    body: p[3].to_string(),
                })
            }
            TAG_MIDI => {
                let p = split_fields(line, TAG_MIDI, 7, false)?;
                Ok(WireMessage::Midi {
                    id: parse_num(TAG_MIDI, "id", p[1])?,
                    name: p[2].to_string(),
                    status: parse_num(TAG_MIDI, "status", p[3])?,
                    channel: parse_num(TAG_MIDI, "channel", p[4])?,
                    data1: parse_num(TAG_MIDI, "data1", p[5])?,
                    data2: parse_num(TAG_MIDI, "data2", p[6])?,
                })
            }
            TAG_CHORD_KEYS => {
                let p = split_fields(line, TAG_CHORD_KEYS, 6, true)?;
                Ok(WireMessage::ChordKeys {
                    id: parse_num(TAG_CHORD_KEYS, "id", p[1])?,
                    name: p[2].to_string(),
                    note: parse_num(TAG_CHORD_KEYS, "note", p[3])?,
                    note_on: parse_bool(TAG_CHORD_KEYS, p[4])?,
                    chord_label: p[5].to_string(),
                })
            }
            TAG_MUTE => {
                let p = split_fields(line, TAG_MUTE, 3, false)?;
                Ok(WireMessage::Mute {
                    muter_id: parse_num(TAG_MUTE, "muterId", p[1])?,
                    muted_id: parse_num(TAG_MUTE, "mutedId", p[2])?,
                })
            }
            TAG_UNMUTE => {
                let p = split_fields(line, TAG_UNMUTE, 3, false)?;
                Ok(WireMessage::Unmute {
                    muter_id: parse_num(TAG_UNMUTE, "muterId", p[1])?,
                    muted_id: parse_num(TAG_UNMUTE, "mutedId", p[2])?,
                })
            }
            TAG_COUNT => {
                let p = split_fields(line, TAG_COUNT, 2, false)?;
                Ok(WireMessage::Count {
                    n: parse_num(TAG_COUNT, "n", p[1])?,
                })
            }
            TAG_CLIENT_LIST => {
                let p = split_fields(line, TAG_CLIENT_LIST, 2, true)?;
                Ok(WireMessage::ClientList {
                    peers: parse_client_list(p[1])?,
                })
            }
            TAG_PING => {
                let p = split_fields(line, TAG_PING, 2, false)?;
                Ok(WireMessage::Ping {
                    sent_at: parse_num(TAG_PING, "sentAt", p[1])?,
                })
            }
            TAG_PING_RESPONSE => {
                let p = split_fields(line, TAG_PING_RESPONSE, 2, false)?;
                Ok(WireMessage::PingResponse {
                    sent_at: parse_num(TAG_PING_RESPONSE, "sentAt", p[1])?,
                })
            }
            TAG_PING_INFO => {
                let p = split_fields(line, TAG_PING_INFO, 4, false)?;
                let rtt = p[3].strip_suffix("ms").unwrap_or(p[3]);
                Ok(WireMessage::PingInfo {
                    id: parse_num(TAG_PING_INFO, "id", p[1])?,
                    name: p[2].to_string(),
                    rtt_millis: parse_num(TAG_PING_INFO, "rtt", rtt)?,
                })
            }
            TAG_SERVER_SHUTDOWN => {
                split_fields(line, TAG_SERVER_SHUTDOWN, 1, false)?;
                Ok(WireMessage::ServerShutdown)
            }
            other => Err(DecodeError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WireMessage::Connect { name } => write!(f, "{}:{}", TAG_CONNECT, name),
            WireMessage::Id { id } => write!(f, "{}:{}", TAG_ID, id),
            WireMessage::Disconnect { id } => write!(f, "{}:{}", TAG_DISCONNECT, id),
            WireMessage::Text { id, name, body } => {
                write!(f, "{}:{}:{}:{}", TAG_TEXT, id, name, body)
            }
            WireMessage::Midi {
                id,
                name,
                status,
                channel,
                data1,
                data2,
            } => write!(
                f,
                "{}:{}:{}:{}:{}:{}:{}",
                TAG_MIDI, id, name, status, channel, data1, data2
            ),
            WireMessage::ChordKeys {
                id,
                name,
                note,
                note_on,
                chord_label,
            } => write!(
                f,
                "{}:{}:{}:{}:{}:{}",
                TAG_CHORD_KEYS, id, name, note, note_on, chord_label
            ),
            WireMessage::Mute { muter_id, muted_id } => {
                write!(f, "{}:{}:{}", TAG_MUTE, muter_id, muted_id)
            }
            WireMessage::Unmute { muter_id, muted_id } => {
                write!(f, "{}:{}:{}", TAG_UNMUTE, muter_id, muted_id)
            }
            WireMessage::Count { n } => write!(f, "{}:{}", TAG_COUNT, n),
            WireMessage::ClientList { peers } => {
                write!(f, "{}:", TAG_CLIENT_LIST)?;
                for (id, name) in peers {
                    write!(f, "{}:{},", id, name)?;
                }
                Ok(())
            }
            WireMessage::Ping { sent_at } => write!(f, "{}:{}", TAG_PING, sent_at),
            WireMessage::PingResponse { sent_at } => write!(f, "{}:{}", TAG_PING_RESPONSE, sent_at),
            WireMessage::PingInfo {
                id,
                name,
                rtt_millis,
            } => write!(f, "{}:{}:{}:{}ms", TAG_PING_INFO, id, name, rtt_millis),
            WireMessage::ServerShutdown => write!(f, "{}", TAG_SERVER_SHUTDOWN),
        }
    }
}

#[cfg(test)]
mod test_wire_message {
    use super::*;

    #[test]
    fn midi_round_trip() {
        let msg = WireMessage::Midi {
            id: 3,
            name: "ann".to_string(),
            status: 144,
            channel: 2,
            data1: 60,
            data2: 100,
        };
        assert_eq!(msg.to_string(), "MIDI:3:ann:144:2:60:100");
        assert_eq!(WireMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn connect() {
        let msg: WireMessage = "CONNECT:bob".parse().unwrap();
        assert_eq!(msg, WireMessage::Connect { name: "bob".to_string() });
        // empty name is fine
        assert_eq!(
            "CONNECT:".parse::<WireMessage>().unwrap(),
            WireMessage::Connect { name: String::new() }
        );
    }

    #[test]
    fn connect_name_with_colon_rejected() {
        let err = "CONNECT:bob:extra".parse::<WireMessage>().unwrap_err();
        assert_eq!(
            err,
            DecodeError::FieldCount {
                tag: TAG_CONNECT,
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn text_body_keeps_colons() {
        let msg: WireMessage = "TEXT:2:ann:meet at 10:30: ok?".parse().unwrap();
        assert_eq!(
            msg,
            WireMessage::Text {
                id: 2,
                name: "ann".to_string(),
                body: "meet at 10:30: ok?".to_string()
            }
        );
        assert_eq!(msg.to_string(), "TEXT:2:ann:meet at 10:30: ok?");
    }

    #[test]
    fn chord_keys() {
        let msg: WireMessage = "CHORD_KEYS:1:bob:64:true:C Major/E".parse().unwrap();
        assert_eq!(
            msg,
            WireMessage::ChordKeys {
                id: 1,
                name: "bob".to_string(),
                note: 64,
                note_on: true,
                chord_label: "C Major/E".to_string()
            }
        );
        let off: WireMessage = "CHORD_KEYS:1:bob:64:FALSE:".parse().unwrap();
        assert!(matches!(off, WireMessage::ChordKeys { note_on: false, .. }));
        assert!(matches!(
            "CHORD_KEYS:1:bob:64:maybe:x".parse::<WireMessage>(),
            Err(DecodeError::BadBool { .. })
        ));
    }

    #[test]
    fn midi_field_errors() {
        assert!(matches!(
            "MIDI:1:bob:144:0:60".parse::<WireMessage>(),
            Err(DecodeError::FieldCount { expected: 6, found: 5, .. })
        ));
        assert!(matches!(
            "MIDI:1:bob:144:0:60:100:7".parse::<WireMessage>(),
            Err(DecodeError::FieldCount { expected: 6, found: 7, .. })
        ));
        assert_eq!(
            "MIDI:1:bob:note:0:60:100".parse::<WireMessage>().unwrap_err(),
            DecodeError::BadNumber {
                tag: TAG_MIDI,
                field: "status",
                value: "note".to_string()
            }
        );
        assert!(matches!(
            "MIDI:x:bob:144:0:60:100".parse::<WireMessage>(),
            Err(DecodeError::BadNumber { field: "id", .. })
        ));
    }

    #[test]
    fn mute_and_unmute() {
        assert_eq!(
            "MUTE:1:2".parse::<WireMessage>().unwrap(),
            WireMessage::Mute { muter_id: 1, muted_id: 2 }
        );
        assert_eq!(
            "UNMUTE:1:2".parse::<WireMessage>().unwrap(),
            WireMessage::Unmute { muter_id: 1, muted_id: 2 }
        );
        assert!("MUTE:1".parse::<WireMessage>().is_err());
        assert!("UNMUTE:1:two".parse::<WireMessage>().is_err());
    }

    #[test]
    fn disconnect_and_id() {
        assert_eq!(
            "DISCONNECT:12".parse::<WireMessage>().unwrap(),
            WireMessage::Disconnect { id: 12 }
        );
        assert!("DISCONNECT:".parse::<WireMessage>().is_err());
        assert!("DISCONNECT:-1".parse::<WireMessage>().is_err());
        assert_eq!("ID:4".parse::<WireMessage>().unwrap(), WireMessage::Id { id: 4 });
    }

    #[test]
    fn client_list() {
        let msg = WireMessage::ClientList {
            peers: vec![(0, "ann".to_string()), (1, "bob".to_string())],
        };
        assert_eq!(msg.to_string(), "CLIENT_LIST:0:ann,1:bob,");
        assert_eq!(msg.to_string().parse::<WireMessage>().unwrap(), msg);
        assert_eq!(
            "CLIENT_LIST:".parse::<WireMessage>().unwrap(),
            WireMessage::ClientList { peers: vec![] }
        );
        assert!("CLIENT_LIST:x:ann,".parse::<WireMessage>().is_err());
    }

    #[test]
    fn ping_family() {
        assert_eq!(
            "PING:1700000000123".parse::<WireMessage>().unwrap(),
            WireMessage::Ping { sent_at: 1_700_000_000_123 }
        );
        assert_eq!(
            "PING_RESPONSE:55".parse::<WireMessage>().unwrap(),
            WireMessage::PingResponse { sent_at: 55 }
        );
        let info = WireMessage::PingInfo {
            id: 3,
            name: "ann".to_string(),
            rtt_millis: 42,
        };
        assert_eq!(info.to_string(), "PING_INFO:3:ann:42ms");
        assert_eq!("PING_INFO:3:ann:42ms".parse::<WireMessage>().unwrap(), info);
        assert_eq!("PING_INFO:3:ann:42".parse::<WireMessage>().unwrap(), info);
    }

    #[test]
    fn shutdown_and_count() {
        assert_eq!(
            "SERVER_SHUTDOWN".parse::<WireMessage>().unwrap(),
            WireMessage::ServerShutdown
        );
        assert!("SERVER_SHUTDOWN:now".parse::<WireMessage>().is_err());
        assert_eq!("COUNT:3".parse::<WireMessage>().unwrap(), WireMessage::Count { n: 3 });
    }

    #[test]
    fn junk_is_rejected() {
        assert_eq!("".parse::<WireMessage>().unwrap_err(), DecodeError::Empty);
        assert_eq!("  \n".parse::<WireMessage>().unwrap_err(), DecodeError::Empty);
        assert_eq!(
            "HELLO:there".parse::<WireMessage>().unwrap_err(),
            DecodeError::UnknownTag("HELLO".to_string())
        );
        assert_eq!(WireMessage::decode(&[0xff, 0xfe]).unwrap_err(), DecodeError::NotUtf8);
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        assert_eq!(
            WireMessage::decode(b"  COUNT:2\r\n").unwrap(),
            WireMessage::Count { n: 2 }
        );
    }
}
