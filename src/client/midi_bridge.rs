//! Get MIDI from the keyboard out to the session.
//!
//! The device callback should do nothing more than [`enqueue_midi`].  One bridge
//! thread drains the queue, keeps track of which keys are down, names the chord
//! and hands the results to a [`PerformanceSink`] (normally the [`JamClient`]) and
//! to the UI.
use log::{debug, warn};
use std::{
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};
use wmidi::MidiMessage;

#[cfg(test)]
use mockall::automock;

use crate::{
    chord::{active_notes::ActiveNoteSet, recognizer::RecognizeOptions},
    common::box_error::BoxError,
};

use super::jam_client::JamClient;

pub const MIDI_QUEUE_DEPTH: usize = 256;

const STATUS_NOTE_OFF: i32 = 0x80;
const STATUS_NOTE_ON: i32 = 0x90;
const STATUS_CONTROL_CHANGE: i32 = 0xB0;
const MAX_CHANNEL: u8 = 15;

/// where the performance goes
#[cfg_attr(test, automock)]
pub trait PerformanceSink {
    fn send_midi(&self, status: i32, channel: i32, data1: i32, data2: i32) -> Result<(), BoxError>;
    fn send_chord_keys(&self, note: i32, note_on: bool, chord_label: &str) -> Result<(), BoxError>;
}

impl PerformanceSink for JamClient {
    fn send_midi(&self, status: i32, channel: i32, data1: i32, data2: i32) -> Result<(), BoxError> {
        JamClient::send_midi(self, status, channel, data1, data2)
    }
    fn send_chord_keys(&self, note: i32, note_on: bool, chord_label: &str) -> Result<(), BoxError> {
        JamClient::send_chord_keys(self, note, note_on, chord_label)
    }
}

/// what the screen needs after a key goes up or down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiUpdate {
    pub note: u8,
    pub note_on: bool,
    pub label: String,
}

pub struct MidiBridge {
    notes: ActiveNoteSet,
    options: RecognizeOptions,
    local_mute: bool,
    // everything goes out on this channel when set
    channel: Option<u8>,
}

impl MidiBridge {
    pub fn new(options: RecognizeOptions) -> MidiBridge {
        MidiBridge {
            notes: ActiveNoteSet::new(),
            options,
            local_mute: false,
            channel: None,
        }
    }
    /// when set, keys still update the display but nothing goes out
    pub fn set_local_mute(&mut self, mute: bool) -> () {
        self.local_mute = mute;
    }
    pub fn is_local_mute(&self) -> bool {
        self.local_mute
    }
    /// Send on this channel (0-15) no matter what the device used.  None keeps
    /// the device channel.  Returns false (and changes nothing) for a bad channel.
    pub fn set_channel(&mut self, channel: Option<u8>) -> bool {
        match channel {
            Some(c) if c > MAX_CHANNEL => {
                warn!("midi channel {} is out of range", c);
                false
            }
            _ => {
                self.channel = channel;
                true
            }
        }
    }
    pub fn get_channel(&self) -> Option<u8> {
        self.channel
    }
    pub fn get_notes(&self) -> &ActiveNoteSet {
        &self.notes
    }

    /// Handle one raw MIDI message from the device
    pub fn handle<S: PerformanceSink + ?Sized>(&mut self, bytes: &[u8], sink: &S) -> Option<UiUpdate> {
        let msg = match MidiMessage::try_from(bytes) {
            Ok(m) => m,
            Err(e) => {
                debug!("ignoring midi bytes {:?}: {:?}", bytes, e);
                return None;
            }
        };
        match msg {
            MidiMessage::NoteOn(ch, note, vel) => {
                let (note, vel) = (u8::from(note), u8::from(vel));
                // velocity zero is how a lot of keyboards say note off
                let down = vel > 0;
                self.key(ch as i32, STATUS_NOTE_ON, note, vel, down, sink)
            }
            MidiMessage::NoteOff(ch, note, vel) => {
                self.key(ch as i32, STATUS_NOTE_OFF, u8::from(note), u8::from(vel), false, sink)
            }
            MidiMessage::ControlChange(ch, function, value) => {
                self.send_midi(
                    sink,
                    STATUS_CONTROL_CHANGE,
                    ch as i32,
                    u8::from(function) as i32,
                    u8::from(value) as i32,
                );
                None
            }
            other => {
                debug!("not forwarding {:?}", other);
                None
            }
        }
    }

    fn key<S: PerformanceSink + ?Sized>(
        &mut self,
        channel: i32,
        status: i32,
        note: u8,
        velocity: u8,
        down: bool,
        sink: &S,
    ) -> Option<UiUpdate> {
        if down {
            self.notes.note_on(note);
        } else {
            self.notes.note_off(note);
        }
        let label = self.notes.label(&self.options);
        self.send_midi(sink, status, channel, note as i32, velocity as i32);
        if !self.local_mute {
            if let Err(e) = sink.send_chord_keys(note as i32, down, &label) {
                warn!("could not send chord keys: {}", e);
            }
        }
        Some(UiUpdate {
            note,
            note_on: down,
            label,
        })
    }

    fn send_midi<S: PerformanceSink + ?Sized>(&self, sink: &S, status: i32, channel: i32, data1: i32, data2: i32) {
        if self.local_mute {
            return;
        }
        let channel = self.channel.map(i32::from).unwrap_or(channel);
        if let Err(e) = sink.send_midi(status, channel, data1, data2) {
            warn!("could not send midi: {}", e);
        }
    }
}

/// the queue between the device callback and the bridge thread
pub fn midi_queue() -> (mpsc::SyncSender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
    mpsc::sync_channel(MIDI_QUEUE_DEPTH)
}

/// For the device callback.  Never blocks, drops the message if the bridge is behind.
pub fn enqueue_midi(tx: &mpsc::SyncSender<Vec<u8>>, bytes: &[u8]) -> bool {
    match tx.try_send(bytes.to_vec()) {
        Ok(()) => true,
        Err(mpsc::TrySendError::Full(_)) => {
            warn!("midi queue full, dropping {:?}", bytes);
            false
        }
        Err(mpsc::TrySendError::Disconnected(_)) => false,
    }
}

/// Run the bridge until every sender for `rx` is gone
pub fn spawn_midi_bridge<S>(
    mut bridge: MidiBridge,
    rx: mpsc::Receiver<Vec<u8>>,
    sink: Arc<S>,
    ui_tx: mpsc::Sender<UiUpdate>,
) -> JoinHandle<()>
where
    S: PerformanceSink + Send + Sync + 'static,
{
    thread::spawn(move || {
        for bytes in rx.iter() {
            if let Some(update) = bridge.handle(&bytes, sink.as_ref()) {
                // nobody watching the screen is fine
                let _ = ui_tx.send(update);
            }
        }
        debug!("midi bridge stopped");
    })
}

#[cfg(test)]
mod test_midi_bridge {
    use super::*;
    use mockall::predicate::eq;
    use std::sync::Mutex;

    fn bridge() -> MidiBridge {
        MidiBridge::new(RecognizeOptions::default())
    }

    // sink that writes down what it was told
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
    }

    impl PerformanceSink for Recorder {
        fn send_midi(&self, status: i32, channel: i32, data1: i32, data2: i32) -> Result<(), BoxError> {
            self.sent
                .lock()
                .unwrap()
                .push(format!("MIDI {} {} {} {}", status, channel, data1, data2));
            Ok(())
        }
        fn send_chord_keys(&self, note: i32, note_on: bool, chord_label: &str) -> Result<(), BoxError> {
            self.sent
                .lock()
                .unwrap()
                .push(format!("KEYS {} {} {}", note, note_on, chord_label));
            Ok(())
        }
    }

    #[test]
    fn note_on_goes_out_with_the_chord() {
        let mut sink = MockPerformanceSink::new();
        sink.expect_send_midi()
            .with(eq(144), eq(0), eq(60), eq(100))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        sink.expect_send_chord_keys()
            .withf(|note, on, label| *note == 60 && *on && label == "(C)")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let update = bridge().handle(&[0x90, 60, 100], &sink).unwrap();
        assert_eq!(
            update,
            UiUpdate {
                note: 60,
                note_on: true,
                label: "(C)".to_string()
            }
        );
    }

    #[test]
    fn chord_builds_up_and_down() {
        let sink = Recorder::default();
        let mut b = bridge();
        b.handle(&[0x90, 60, 100], &sink);
        b.handle(&[0x90, 64, 100], &sink);
        let up = b.handle(&[0x90, 67, 100], &sink).unwrap();
        assert_eq!(up.label, "C Major");
        let down = b.handle(&[0x80, 64, 0], &sink).unwrap();
        assert!(!down.note_on);
        assert_eq!(down.label, "Perfect Fifth");
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 8);
        assert_eq!(sent[5], "KEYS 67 true C Major");
        assert_eq!(sent[6], "MIDI 128 0 64 0");
    }

    #[test]
    fn zero_velocity_is_note_off() {
        let sink = Recorder::default();
        let mut b = bridge();
        b.handle(&[0x90, 60, 100], &sink);
        let update = b.handle(&[0x90, 60, 0], &sink).unwrap();
        assert!(!update.note_on);
        assert_eq!(update.label, "");
        assert!(b.get_notes().is_empty());
    }

    #[test]
    fn control_change_is_forwarded_without_ui() {
        let sink = Recorder::default();
        // sustain pedal on channel 2
        assert!(bridge().handle(&[0xB1, 64, 127], &sink).is_none());
        assert_eq!(*sink.sent.lock().unwrap(), vec!["MIDI 176 1 64 127".to_string()]);
    }

    #[test]
    fn channel_override_applies_to_everything() {
        let sink = Recorder::default();
        let mut b = bridge();
        assert!(b.set_channel(Some(9)));
        // note on channel 1, pedal on channel 3, both go out on 10
        b.handle(&[0x90, 60, 100], &sink);
        b.handle(&[0xB2, 64, 127], &sink);
        b.handle(&[0x80, 60, 0], &sink);
        assert!(!b.set_channel(Some(16)));
        assert_eq!(b.get_channel(), Some(9));
        assert!(b.set_channel(None));
        b.handle(&[0x93, 62, 90], &sink);
        let midi: Vec<String> = sink
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.starts_with("MIDI"))
            .cloned()
            .collect();
        assert_eq!(
            midi,
            vec![
                "MIDI 144 9 60 100",
                "MIDI 176 9 64 127",
                "MIDI 128 9 60 0",
                "MIDI 144 3 62 90"
            ]
        );
    }

    #[test]
    fn local_mute_keeps_the_display_going() {
        let mut sink = MockPerformanceSink::new();
        sink.expect_send_midi().never();
        sink.expect_send_chord_keys().never();
        let mut b = bridge();
        b.set_local_mute(true);
        assert!(b.is_local_mute());
        let update = b.handle(&[0x90, 62, 80], &sink).unwrap();
        assert_eq!(update.label, "(D)");
    }

    #[test]
    fn garbage_and_other_messages_are_ignored() {
        let sink = Recorder::default();
        let mut b = bridge();
        assert!(b.handle(&[], &sink).is_none());
        assert!(b.handle(&[0x90], &sink).is_none());
        // program change
        assert!(b.handle(&[0xC0, 5], &sink).is_none());
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn send_failure_does_not_stop_the_bridge() {
        let mut sink = MockPerformanceSink::new();
        sink.expect_send_midi()
            .returning(|_, _, _, _| Err("network down".into()));
        sink.expect_send_chord_keys()
            .returning(|_, _, _| Err("network down".into()));
        let mut b = bridge();
        assert!(b.handle(&[0x90, 60, 100], &sink).is_some());
        assert!(b.get_notes().contains(60));
    }

    #[test]
    fn queue_drops_when_full() {
        let (tx, rx) = mpsc::sync_channel(1);
        assert!(enqueue_midi(&tx, &[0x90, 60, 100]));
        assert!(!enqueue_midi(&tx, &[0x80, 60, 0]));
        drop(rx);
        assert!(!enqueue_midi(&tx, &[0x80, 60, 0]));
    }

    #[test]
    fn bridge_thread_feeds_the_ui() {
        let (tx, rx) = midi_queue();
        let (ui_tx, ui_rx) = mpsc::channel();
        let sink = Arc::new(Recorder::default());
        let handle = spawn_midi_bridge(bridge(), rx, sink.clone(), ui_tx);
        enqueue_midi(&tx, &[0x90, 60, 100]);
        enqueue_midi(&tx, &[0x90, 67, 100]);
        drop(tx);
        handle.join().unwrap();
        let labels: Vec<String> = ui_rx.iter().map(|u| u.label).collect();
        assert_eq!(labels, vec!["(C)", "Perfect Fifth"]);
        assert_eq!(sink.sent.lock().unwrap().len(), 4);
    }
}
