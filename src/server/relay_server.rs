//! The running relay: the threads, the queue between them, and an orderly shutdown.
//!
//! - receive thread: blocks on the socket (with a read timeout so it can notice
//!   shutdown) and queues every datagram
//! - ticker thread: queues a liveness tick every ping interval
//! - engine thread: owns the [`RelayEngine`] and the registry, and handles the
//!   queue one event at a time
//!
//! Only the engine thread ever touches the registry, so nothing needs a lock.
//! Shutdown stops the receive thread and the ticker first, then lets the engine
//! send SERVER_SHUTDOWN to everybody, and the socket closes when the engine drops it.
use log::{debug, error, info, warn};
use simple_error::bail;
use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::common::{
    box_error::BoxError,
    get_milli_time, sock_with_tos,
    wire_message::{is_oversize, RECV_BUFFER},
};

use super::{
    liveness::spawn_ticker, peer::PeerStatus, peer_list::PeerList, relay_engine::RelayEngine,
    settings::RelaySettings,
};

// how often the receive thread looks at the running flag
const READ_TIMEOUT_MS: u64 = 100;
// how long a roster request waits on the engine
const ROSTER_TIMEOUT_MS: u64 = 1_000;

/// Everything the engine thread reacts to
pub enum RelayEvent {
    Datagram {
        data: Vec<u8>,
        src: SocketAddr,
        at: u128,
    },
    Tick(u128),
    Roster(mpsc::Sender<Vec<PeerStatus>>),
    Shutdown,
}

/// Cloneable way to ask a running relay for its roster
#[derive(Clone)]
pub struct RelayHandle {
    event_tx: mpsc::Sender<RelayEvent>,
}

impl RelayHandle {
    pub fn roster(&self) -> Result<Vec<PeerStatus>, BoxError> {
        let (tx, rx) = mpsc::channel();
        if self.event_tx.send(RelayEvent::Roster(tx)).is_err() {
            bail!("relay engine is not running");
        }
        Ok(rx.recv_timeout(Duration::from_millis(ROSTER_TIMEOUT_MS))?)
    }
}

pub struct RelayServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    event_tx: mpsc::Sender<RelayEvent>,
    receive_handle: Option<JoinHandle<()>>,
    ticker_handle: Option<JoinHandle<()>>,
    engine_handle: Option<JoinHandle<()>>,
}

impl RelayServer {
    /// Bind the socket and start the relay.  A bind failure is the only error.
    pub fn start(settings: &RelaySettings) -> Result<RelayServer, BoxError> {
        let sock = sock_with_tos::bind(settings.bind_addr())?;
        sock.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)))?;
        let local_addr = sock.local_addr()?;
        let recv_sock = sock.try_clone()?;
        let peers = PeerList::with_capacity(settings.max_peers);
        info!("relay listening on {} (room for {} peers)", local_addr, peers.get_capacity());

        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = mpsc::channel::<RelayEvent>();

        let engine = RelayEngine::new(
            sock,
            peers,
            settings.client_timeout_ms,
        );
        let engine_handle = thread::spawn(move || engine_thread(engine, event_rx));

        let receive_running = running.clone();
        let receive_tx = event_tx.clone();
        let receive_handle =
            thread::spawn(move || receive_thread(recv_sock, receive_running, receive_tx));

        let ticker_handle = spawn_ticker(settings.ping_interval_ms, running.clone(), event_tx.clone());

        Ok(RelayServer {
            local_addr,
            running,
            event_tx,
            receive_handle: Some(receive_handle),
            ticker_handle: Some(ticker_handle),
            engine_handle: Some(engine_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// something another thread can hold on to for roster queries
    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            event_tx: self.event_tx.clone(),
        }
    }

    /// snapshot of everybody in the session, straight from the engine thread
    pub fn roster(&self) -> Result<Vec<PeerStatus>, BoxError> {
        self.handle().roster()
    }

    /// stop taking datagrams, tell everybody, close the socket
    pub fn shutdown(mut self) -> () {
        self.stop();
    }

    /// Keep relaying until something arrives on `stop_rx` (or every sender for it
    /// is gone), then shut down.  This is what a signal handler or console pokes.
    pub fn run_until(self, stop_rx: mpsc::Receiver<()>) -> () {
        let _ = stop_rx.recv();
        self.shutdown();
    }

    fn stop(&mut self) -> () {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("relay shutting down");
        }
        for handle in [self.receive_handle.take(), self.ticker_handle.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                error!("relay worker thread panicked");
            }
        }
        if let Some(handle) = self.engine_handle.take() {
            // the engine might be gone already, joining tells us either way
            let _ = self.event_tx.send(RelayEvent::Shutdown);
            if handle.join().is_err() {
                error!("relay engine thread panicked");
            }
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn engine_thread(mut engine: RelayEngine<UdpSocket>, event_rx: mpsc::Receiver<RelayEvent>) -> () {
    loop {
        match event_rx.recv() {
            Ok(RelayEvent::Datagram { data, src, at }) => engine.handle_datagram(&data, src, at),
            Ok(RelayEvent::Tick(now_time)) => {
                let evicted = engine.liveness_tick(now_time);
                if !evicted.is_empty() {
                    debug!("liveness evicted {:?}", evicted);
                }
            }
            Ok(RelayEvent::Roster(reply)) => {
                let _ = reply.send(engine.roster(get_milli_time()));
            }
            Ok(RelayEvent::Shutdown) => {
                engine.shutdown();
                break;
            }
            Err(_) => {
                warn!("relay event queue closed without a shutdown");
                engine.shutdown();
                break;
            }
        }
    }
    debug!("relay engine stopped");
}

fn receive_thread(sock: UdpSocket, running: Arc<AtomicBool>, tx: mpsc::Sender<RelayEvent>) -> () {
    let mut buf = [0u8; RECV_BUFFER];
    while running.load(Ordering::SeqCst) {
        match sock.recv_from(&mut buf) {
            Ok((amt, src)) if is_oversize(amt) => {
                warn!("dropping oversize datagram from {}", src);
            }
            Ok((amt, src)) => {
                let event = RelayEvent::Datagram {
                    data: buf[..amt].to_vec(),
                    src,
                    at: get_milli_time(),
                };
                if tx.send(event).is_err() {
                    error!("relay engine went away, receive thread exiting");
                    return;
                }
            }
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => {}
                // an ICMP unreachable from an earlier send shows up here on some platforms
                _ => warn!("socket receive error: {}", e),
            },
        }
    }
    debug!("receive thread stopped");
}
