// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the minimal contract a message transport must satisfy
//! to carry channels: subscribe to an inbound event, send a message, and
//! unsubscribe again. It intentionally avoids any reference to concrete
//! mechanisms (windows, worker threads, broadcast buses, brokers).
//!
//! The transport is responsible only for delivering opaque [`Message`]s to
//! subscribed consumers. Channel naming, handler fan-out and lifecycle are
//! handled by [`Channels`](crate::Channels).
//!
//! Concrete implementations live under `src/transport/`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::Result;

/// Event name a channel instance subscribes to on its transport.
///
/// Mirrors the `"message"` event of window, worker and broadcast-channel
/// style transports.
pub const MESSAGE_EVENT: &str = "message";

/// Operational mode of a transport.
///
/// Determines which [`Capabilities`] a transport advertises. Only
/// [`FullDuplex`](TransportMode::FullDuplex) transports can back a
/// [`Channels`](crate::Channels) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    // ---
    /// Can send and receive. Supports subscribe, send and unsubscribe.
    FullDuplex,

    /// Outbound only, e.g. a fire-and-forget broadcast emitter.
    SendOnly,

    /// Inbound only, e.g. a passive listener on a shared bus.
    ReceiveOnly,
}

/// The set of operations a transport supports.
///
/// This is the structural capability check performed once when a
/// [`Channels`](crate::Channels) instance is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub subscribe: bool,
    pub send: bool,
    pub unsubscribe: bool,
}

impl Capabilities {
    /// Subscribe, send and unsubscribe.
    pub const fn full() -> Self {
        Self {
            subscribe: true,
            send: true,
            unsubscribe: true,
        }
    }

    /// Names of the capabilities this set lacks, in contract order.
    pub fn missing(&self) -> Vec<&'static str> {
        // ---
        let mut missing = Vec::new();
        if !self.subscribe {
            missing.push("subscribe");
        }
        if !self.send {
            missing.push("send");
        }
        if !self.unsubscribe {
            missing.push("unsubscribe");
        }
        missing
    }

    pub fn is_full(&self) -> bool {
        self.missing().is_empty()
    }
}

impl From<TransportMode> for Capabilities {
    fn from(mode: TransportMode) -> Self {
        // ---
        match mode {
            TransportMode::FullDuplex => Capabilities::full(),
            TransportMode::SendOnly => Capabilities {
                subscribe: false,
                send: true,
                unsubscribe: false,
            },
            TransportMode::ReceiveOnly => Capabilities {
                subscribe: true,
                send: false,
                unsubscribe: true,
            },
        }
    }
}

/// Shared base state for transport implementations.
///
/// Each concrete transport embeds this as a field named `base` so that the
/// default [`Transport`] methods can delegate to it:
///
/// ```ignore
/// struct WorkerTransport {
///     base: TransportBase,
///     // ... worker specific fields
/// }
///
/// impl Transport for WorkerTransport {
///     fn base(&self) -> &TransportBase { &self.base }
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TransportBase {
    /// Identifier of this transport instance, used for logging.
    pub transport_id: String,
    /// Operational mode of this transport.
    pub mode: TransportMode,
}

impl TransportBase {
    pub fn new(transport_id: impl Into<String>, mode: TransportMode) -> Self {
        Self {
            transport_id: transport_id.into(),
            mode,
        }
    }
}

impl From<&TransportConfig> for TransportBase {
    fn from(config: &TransportConfig) -> Self {
        // ---
        Self {
            transport_id: config.node_id.clone(),
            mode: config.mode,
        }
    }
}

/// Configuration for creating a transport instance.
///
/// Passed to transport factory functions (`create_*_transport()`), usually
/// produced by [`TransportBuilder`](crate::TransportBuilder).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Node ID of this transport instance.
    pub node_id: String,
    /// Operational mode.
    pub mode: TransportMode,
    /// Capacity of each subscription inbox.
    pub capacity: usize,
}

impl TransportConfig {
    /// Default inbox capacity per subscription.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// A full-duplex configuration with the default capacity.
    pub fn full_duplex(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            mode: TransportMode::FullDuplex,
            capacity: Self::DEFAULT_CAPACITY,
        }
    }
}

/// A message carried by a transport.
///
/// `data` is whatever the sender handed to [`Transport::send`]. Channel
/// envelopes are one shape of `data`, but a shared transport may carry
/// unrelated traffic as well; receivers must not assume any structure.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Transport-level payload.
    pub data: Value,

    /// Transport id of the sender, when the transport knows it.
    ///
    /// Informational only; it takes no part in routing.
    pub origin: Option<Arc<str>>,
}

impl Message {
    pub fn new(data: Value) -> Self {
        Self { data, origin: None }
    }

    pub fn with_origin(mut self, origin: impl Into<Arc<str>>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl From<Value> for Message {
    fn from(data: Value) -> Self {
        Message::new(data)
    }
}

/// Identifies one subscription on a transport.
///
/// Returned inside a [`SubscriptionHandle`] and required by
/// [`Transport::unsubscribe`]. Ids are unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SubscriptionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle returned from a successful subscription.
///
/// The subscription stays active until [`Transport::unsubscribe`] is called
/// with its id, or the handle is dropped (the inbox closes and the transport
/// prunes it on a later send).
pub struct SubscriptionHandle {
    // ---
    /// Id to pass back to [`Transport::unsubscribe`].
    pub id: SubscriptionId,

    /// Receiver for delivered messages.
    pub inbox: mpsc::Receiver<Message>,
}

/// Transport abstraction.
///
/// A `Transport` delivers [`Message`]s between peers attached to the same
/// underlying medium. It is the minimal capability set required by
/// [`Channels`](crate::Channels):
///
/// - `subscribe(event)` registers a listener for inbound messages of the
///   given event and returns its inbox.
/// - `send(message)` hands a message over for asynchronous delivery to
///   whatever the transport defines as recipients.
/// - `unsubscribe(event, id)` reverses `subscribe`.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns, messages sent *after* that point are
///   deliverable to the returned inbox.
/// - `send()` does not wait for subscribers to process the message.
/// - After `unsubscribe()` returns, no further messages are delivered to
///   that inbox.
///
/// Transports that only implement part of the contract report it through
/// [`capabilities`](Transport::capabilities); the unsupported methods return
/// [`ChannelError::Transport`](crate::ChannelError::Transport).
///
/// The in-memory transport is the reference implementation of these
/// semantics.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Returns the operational mode of the transport.
    fn mode(&self) -> TransportMode {
        self.base().mode
    }

    /// Operations this transport supports.
    ///
    /// Defaults to the capabilities implied by [`mode`](Transport::mode).
    fn capabilities(&self) -> Capabilities {
        Capabilities::from(self.mode())
    }

    /// Register a listener for `event` and return a handle to its inbox.
    async fn subscribe(&self, event: &str) -> Result<SubscriptionHandle>;

    /// Hand a message to the transport for delivery.
    async fn send(&self, message: Message) -> Result<()>;

    /// Remove the listener registered under `id` for `event`.
    ///
    /// Unknown ids are ignored.
    async fn unsubscribe(&self, event: &str, id: SubscriptionId) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` only bumps a reference count; every clone addresses the same
/// transport.
pub type TransportPtr = Arc<dyn Transport>;
