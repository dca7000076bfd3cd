//! Connects to a match server, joins the lobby and logs everything that
//! happens until Ctrl-C.
//!
//! ```text
//! lobby-probe [host:port] [nick]
//! ```
//!
//! `LOBBY_PROBE_CONFIG` may point at a JSON `ClientConfig`; command-line
//! arguments override its address and nick. Log verbosity follows
//! `RUST_LOG`.

use std::ops::ControlFlow;

use clashlink::prelude::*;

const TICK_RATE_HZ: u32 = 30;

fn load_config() -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::var("LOBBY_PROBE_CONFIG") {
        Ok(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        Err(_) => ClientConfig::default(),
    };
    let mut args = std::env::args().skip(1);
    if let Some(addr) = args.next() {
        config.server_addr = addr;
    }
    if let Some(nick) = args.next() {
        config.nick = nick;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    clashlink::init_tracing();
    let config = load_config()?;
    eprintln!("connecting to {} as {}", config.server_addr, config.nick);

    let mut client = Client::builder().config(config).build::<TcpConnection>();

    let cancel = client.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    client.open().await?;

    let result = client
        .run_at(TICK_RATE_HZ, |client, report| {
            if report.dispatch.desynced > 0 {
                tracing::warn!(desynced = report.dispatch.desynced, "out of sync");
            }
            for event in client.take_events() {
                tracing::info!(?event, phase = %client.phase(), "event");
            }
            ControlFlow::Continue(())
        })
        .await;

    client.close().await?;
    result?;
    Ok(())
}
