//! The jam session relay
use clap::Parser;
use log::{error, info, warn};
use midijam::{
    common::box_error::BoxError,
    server::{
        relay_server::{RelayHandle, RelayServer},
        settings::{RelaySettings, SETTINGS_FILE},
    },
};
use std::{
    io::{self, BufRead},
    sync::mpsc,
    thread,
};

/// Relay MIDI, chat and chord traffic between everybody in a jam session
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// UDP port to listen on (remembered for next time)
    #[arg(short, long)]
    port: Option<u16>,

    /// No operator console, just run until interrupted
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Settings file
    #[arg(long, default_value_t = String::from(SETTINGS_FILE))]
    config: String,
}

fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = RelaySettings::load(&args.config, args.port)?;
    info!("settings: {:?}", settings);
    let server = match RelayServer::start(&settings) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot bind {}: {}", settings.bind_addr(), e);
            std::process::exit(1);
        }
    };

    // ctrl-c, SIGTERM, console quit and end of input all land here
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let signal_tx = stop_tx.clone();
    ctrlc::set_handler(move || {
        info!("signal received");
        let _ = signal_tx.send(());
    })?;

    if args.headless {
        drop(stop_tx);
    } else {
        println!("relay on {}.  commands: list, count, quit", server.local_addr());
        let handle = server.handle();
        // left running on purpose: it may be blocked on stdin when a signal stops the relay
        thread::spawn(move || console(handle, stop_tx));
    }
    server.run_until(stop_rx);
    Ok(())
}

fn console(handle: RelayHandle, stop_tx: mpsc::Sender<()>) -> () {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("console: {}", e);
                break;
            }
        };
        match line.trim() {
            "list" => match handle.roster() {
                Ok(roster) => {
                    for peer in roster {
                        let rtt = peer
                            .rtt_millis
                            .map(|r| format!("{}ms", r))
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "{:>4} {:<20} {:<22} ping {:>6} seen {}ms ago",
                            peer.id, peer.name, peer.address, rtt, peer.age_millis
                        );
                    }
                }
                Err(e) => error!("no roster: {}", e),
            },
            "count" => match handle.roster() {
                Ok(roster) => println!("{} in the session", roster.len()),
                Err(e) => error!("no roster: {}", e),
            },
            "quit" => break,
            "" => {}
            other => println!("unknown command '{}'", other),
        }
    }
    // quit or end of input
    let _ = stop_tx.send(());
}
