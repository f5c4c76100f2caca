//! Headless jam client: chat from the terminal and watch the session go by
use clap::Parser;
use log::{error, info, warn};
use midijam::{
    client::{
        jam_client::{ClientEvent, JamClient, CONNECT_TIMEOUT_MS},
        settings::{ClientSettings, SETTINGS_FILE},
    },
    common::box_error::BoxError,
};
use std::{
    io::{self, BufRead},
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

/// Join a jam session relay
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Relay address, ip:port (remembered for next time)
    #[arg(long)]
    host: Option<String>,

    /// What the others see you as (remembered for next time)
    #[arg(long)]
    name: Option<String>,

    /// Settings file
    #[arg(long, default_value_t = String::from(SETTINGS_FILE))]
    config: String,
}

fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = ClientSettings::load(&args.config)?;
    if let Some(name) = &args.name {
        settings.set_name(name)?;
    }
    if let Some(host) = &args.host {
        settings.set_host(host)?;
    }
    settings.save()?;

    let server = settings.server_addr()?;
    let client = Arc::new(JamClient::build(SocketAddr::from(([0, 0, 0, 0], 0)))?);
    let id = client.connect(
        server,
        &settings.name,
        Duration::from_millis(CONNECT_TIMEOUT_MS),
    )?;
    println!("joined {} as {} ({})", server, settings.name, id);
    println!("type to chat.  /mute <id>, /unmute <id>, /quit");

    let running = Arc::new(AtomicBool::new(true));
    let input = {
        let client = client.clone();
        let running = running.clone();
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        error!("stdin: {}", e);
                        break;
                    }
                };
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(e) = command(&client, line.trim()) {
                    warn!("{}", e);
                }
                if line.trim() == "/quit" {
                    break;
                }
            }
            running.store(false, Ordering::SeqCst);
        })
    };

    while running.load(Ordering::SeqCst) {
        match client.poll() {
            Ok(Some(event @ (ClientEvent::ServerShutdown | ClientEvent::ConnectionLost))) => {
                println!("{}", event);
                running.store(false, Ordering::SeqCst);
            }
            Ok(Some(event)) => println!("{}", event),
            Ok(None) => {}
            Err(e) => {
                error!("socket error: {}", e);
                running.store(false, Ordering::SeqCst);
            }
        }
    }
    if client.is_connected() {
        client.disconnect()?;
    }
    // the input thread may be stuck waiting for a line, don't wait on it
    drop(input);
    info!("bye");
    Ok(())
}

fn command(client: &JamClient, line: &str) -> Result<(), BoxError> {
    let mut words = line.split_whitespace();
    match words.next() {
        None => Ok(()),
        Some("/quit") => client.disconnect(),
        Some("/mute") => client.mute(peer_id(words.next())?),
        Some("/unmute") => client.unmute(peer_id(words.next())?),
        Some(_) => client.send_text(line),
    }
}

fn peer_id(word: Option<&str>) -> Result<u32, BoxError> {
    match word {
        Some(w) => Ok(w.parse()?),
        None => Err("which peer id?".into()),
    }
}
