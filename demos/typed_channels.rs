//! Typed payloads, failure reporting and disposal on one instance.
//!
//! Run with: cargo run --example typed_channels

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

use std::time::Duration;

use mom_channels::{ChannelsBuilder, Handler, Result, TransportBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

#[derive(Debug, Serialize, Deserialize)]
struct Resize {
    width: u32,
    height: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let transport = TransportBuilder::new().node_id("ui").build().await?;

    let channels = ChannelsBuilder::new(transport)
        .on_handler_failure(|failure| println!("reported: {failure}"))
        .build()
        .await?;

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();

    let resize = Handler::typed(move |r: Resize| {
        println!("resize to {}x{}", r.width, r.height);
        let _ = done_tx.send(());
    });
    channels.on("resize", &resize)?;

    channels.emit("resize", &Resize { width: 800, height: 600 }).await?;

    // Not a Resize: reported through the failure hook, nothing else breaks.
    channels.emit("resize", &"full screen please").await?;
    channels.emit("resize", &Resize { width: 1024, height: 768 }).await?;

    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(1), done_rx.recv())
            .await
            .expect("timed out waiting for resize")
            .expect("resize channel closed");
    }

    channels.dispose().await?;
    println!("disposed: {}", channels.is_disposed());

    Ok(())
}
