//! Keep the session honest: ping everybody and drop anyone who went quiet.
//!
//! A peer is alive as long as *something* decodable has arrived from its address
//! within the client timeout.  Missing a ping reply by itself doesn't matter.
use log::{debug, info, trace};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, sleep, JoinHandle},
    time::Duration,
};

use crate::common::{get_milli_time, timer::MilliTimer, wire_message::WireMessage};

use super::{relay_engine::RelayEngine, relay_server::RelayEvent, transport::Transport};

/// reference ping interval in milliseconds
pub const DEFAULT_PING_INTERVAL: u128 = 5_000;

// longest the ticker sleeps before looking at the running flag again
const TICKER_SLICE: u128 = 50;

impl<T: Transport> RelayEngine<T> {
    /// PING everybody with the current time
    pub fn ping_all(&self, now_time: u128) -> () {
        trace!("pinging {} peers", self.get_peers().len());
        self.broadcast(&WireMessage::Ping { sent_at: now_time }.encode());
    }

    /// One liveness pass.  Returns the ids that got evicted.
    pub fn liveness_tick(&mut self, now_time: u128) -> Vec<u32> {
        self.ping_all(now_time);
        let stale = self.get_peers().expired(now_time, self.get_client_timeout());
        if stale.is_empty() {
            return stale;
        }
        if self.evict(&stale) > 0 {
            info!("{} peers left after eviction", self.get_peers().len());
            self.broadcast_roster();
        }
        stale
    }
}

/// Start the thread that asks the engine for a liveness pass every `interval` millis.
///
/// The thread exits when `running` goes false or the engine hangs up.
pub fn spawn_ticker(
    interval: u128,
    running: Arc<AtomicBool>,
    tx: mpsc::Sender<RelayEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut timer = MilliTimer::build(get_milli_time(), interval);
        while running.load(Ordering::SeqCst) {
            let now_time = get_milli_time();
            if timer.expired(now_time) {
                timer.reset(now_time);
                if tx.send(RelayEvent::Tick(now_time)).is_err() {
                    debug!("engine is gone, ticker exiting");
                    return;
                }
            }
            let nap = timer.remaining(get_milli_time()).clamp(1, TICKER_SLICE);
            sleep(Duration::from_millis(nap as u64));
        }
        debug!("ticker stopped");
    })
}
