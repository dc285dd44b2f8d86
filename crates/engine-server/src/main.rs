//! Drive the engine from CSV command lines on stdin.
//!
//! Input:  `N, symbol, req, order, user, B|S, price, qty` or `C, symbol, req, order`.
//! Output: every published event as `symbol, <event csv>` on stdout.

use std::sync::Arc;

use anyhow::Context;
use engine_core::LevelBook;
use engine_protocol::csv_codec::{format_published, parse_input_line};
use engine_protocol::BinaryCodec;
use engine_server::{ChanBus, Engine, EngineConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::from_env().context("reading engine configuration")?;
    info!(wal_dir = %config.wal_dir.display(), "starting engine");

    let bus = Arc::new(ChanBus::new(config.event_bus_size));
    let mut events = bus
        .subscribe()
        .context("event bus already has a subscriber")?;
    let printer = tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            println!("{}", format_published(&ev.symbol, &ev.event));
        }
    });

    let engine = Engine::new(config, BinaryCodec, Arc::clone(&bus), |_: &str| Some(LevelBook::new()))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let (symbol, cmd) = match parse_input_line(&line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "skipping input line");
                continue;
            }
        };
        let req_id = cmd.req_id;
        let res = if cmd.is_submit() {
            engine.submit(&symbol, cmd)
        } else {
            engine.cancel(&symbol, cmd)
        };
        if let Err(e) = res {
            warn!(symbol = %symbol, req_id, error = %e, "command not accepted");
        }
    }

    engine.shutdown().await;
    drop(engine);
    drop(bus);
    printer.await.context("event printer")?;
    Ok(())
}
