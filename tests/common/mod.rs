// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use mom_channels::{
    // ---
    Channels,
    Handler,
    MemoryHub,
    TransportBuilder,
    TransportPtr,
};

pub fn init_logging() {
    // ---
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Full-duplex transport on `hub`.
pub async fn transport(hub: &Arc<MemoryHub>, node_id: &str) -> TransportPtr {
    TransportBuilder::new()
        .node_id(node_id)
        .hub(hub.clone())
        .build()
        .await
        .expect("failed to build memory transport")
}

/// Records every payload its handler receives.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> Handler {
        let seen = self.seen.clone();
        Handler::new(move |payload: &Value| {
            seen.lock().unwrap().push(payload.clone());
        })
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// Wait until `channels` has dispatched everything sent before this call.
///
/// Emits a marker on a private channel and waits for this instance to see
/// it. The memory hub delivers in send order per subscriber, so once the
/// marker arrives every earlier message has been dispatched too.
pub async fn settle(channels: &Channels) {
    // ---
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let channel = format!("__settle/{}", NEXT.fetch_add(1, Ordering::Relaxed));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let marker = Handler::new(move |_: &Value| {
        let _ = tx.send(());
    });

    channels.on(&channel, &marker).expect("register settle marker");
    channels.emit(&channel, &()).await.expect("emit settle marker");

    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for dispatcher to settle")
        .expect("settle marker channel closed");

    channels.off(&channel, &marker).expect("deregister settle marker");
}
