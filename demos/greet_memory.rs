//! Two channel instances talking over the in-memory hub.
//!
//! A "window" and a "worker" each attach to their own memory transport on a
//! shared hub. The worker answers every `greet` with a `reply`.
//!
//! Run with: cargo run --example greet_memory

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

use std::time::Duration;

use mom_channels::{Channels, Handler, MemoryHub, Result, TransportBuilder};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let hub = MemoryHub::new();

    let window_transport = TransportBuilder::new()
        .node_id("window")
        .hub(hub.clone())
        .build()
        .await?;
    let worker_transport = TransportBuilder::new()
        .node_id("worker")
        .hub(hub.clone())
        .build()
        .await?;

    let window = Channels::new(window_transport).await?;
    let worker = Channels::new(worker_transport).await?;

    // Handlers run on the dispatcher task, so the worker forwards greetings
    // to its own task for the async emit.
    let (greet_tx, mut greet_rx) = mpsc::unbounded_channel::<Value>();
    worker.on(
        "greet",
        &Handler::new(move |payload: &Value| {
            let _ = greet_tx.send(payload.clone());
        }),
    )?;
    worker.on("reply", &Handler::new(|_: &Value| {}))?;

    let responder = {
        let worker = worker.clone();
        tokio::spawn(async move {
            while let Some(name) = greet_rx.recv().await {
                let text = format!("hello, {}", name.as_str().unwrap_or("stranger"));
                if let Err(err) = worker.emit("reply", &text).await {
                    eprintln!("worker: reply failed: {err}");
                }
            }
        })
    };

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Value>();
    window.on(
        "reply",
        &Handler::new(move |payload: &Value| {
            let _ = reply_tx.send(payload.clone());
        }),
    )?;
    window.on("greet", &Handler::new(|_: &Value| {}))?;

    for name in ["ada", "grace", "barbara"] {
        window.emit("greet", &name).await?;
        let reply = tokio::time::timeout(Duration::from_secs(1), reply_rx.recv())
            .await
            .expect("timed out waiting for reply")
            .expect("reply channel closed");
        println!("window <- {reply}");
    }

    window.dispose().await?;
    worker.dispose().await?;
    responder.abort();

    Ok(())
}
