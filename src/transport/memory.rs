//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended for testing, single-process
//! applications, and as the reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! - Once `subscribe()` returns, messages sent *after* that point are
//!   deliverable to the returned inbox.
//! - Every message sent through any transport attached to a hub is delivered
//!   to every live `"message"` subscription on that hub, the sender's own
//!   subscriptions included. This mirrors a shared bus (one window posting
//!   to itself, a broadcast channel fanning out to every listener).
//! - Each subscriber sees messages in send order.
//! - `send()` never waits on a subscriber. A subscriber whose inbox is full
//!   misses the message (logged at warn); a closed inbox is pruned.
//! - After `unsubscribe()` returns, the inbox receives nothing further.
//!
//! ## Non-Goals
//!
//! This transport does not emulate serialization, cross-process delivery
//! or the failure modes of any real medium.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    ChannelError,
    Message,
    Result,
    SubscriptionHandle,
    SubscriptionId,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
    MESSAGE_EVENT,
};

struct Subscriber {
    id: SubscriptionId,
    owner: Arc<str>,
    sender: mpsc::Sender<Message>,
}

/// Shared message bus for the in-memory transport.
///
/// All memory transports attached to the same hub can exchange messages,
/// the way peers attached to one real medium would.
///
/// For tests that need isolation from each other, construct a hub
/// explicitly and pass it to [`create_memory_transport_with_hub`]:
///
/// ```
/// # use mom_channels::{MemoryHub, TransportConfig};
/// # async fn example() -> mom_channels::Result<()> {
/// let hub = MemoryHub::new();
///
/// let left = mom_channels::create_memory_transport_with_hub(
///     TransportConfig::full_duplex("left"),
///     hub.clone(),
/// )
/// .await?;
/// let right = mom_channels::create_memory_transport_with_hub(
///     TransportConfig::full_duplex("right"),
///     hub.clone(),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn publish(&self, origin: &str, message: Message) -> Result<()> {
        // ---
        // Snapshot the live senders so the lock is not held across sends.
        let targets: Vec<(SubscriptionId, mpsc::Sender<Message>)> = {
            let subs = self.subscriptions.read().await;
            subs.get(MESSAGE_EVENT)
                .map(|list| list.iter().map(|s| (s.id, s.sender.clone())).collect())
                .unwrap_or_default()
        };

        log_debug!("{origin}: send to {} subscriber(s)", targets.len());

        let mut closed = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log_warn!("{origin}: inbox of {id} is full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    // The SubscriptionHandle was dropped.
                    closed.push(id);
                }
            }
        }

        if !closed.is_empty() {
            log_debug!("{origin}: pruning {} closed subscription(s)", closed.len());
            let mut subs = self.subscriptions.write().await;
            if let Some(list) = subs.get_mut(MESSAGE_EVENT) {
                list.retain(|s| !closed.contains(&s.id));
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        owner: &str,
        event: &str,
        capacity: usize,
    ) -> Result<SubscriptionHandle> {
        // ---
        let (tx, rx) = mpsc::channel(capacity);
        let id = SubscriptionId::next();

        log_debug!("{owner}: subscribe {id} to {event:?}");

        let mut subs = self.subscriptions.write().await;
        subs.entry(event.to_string()).or_default().push(Subscriber {
            id,
            owner: Arc::from(owner),
            sender: tx,
        });

        Ok(SubscriptionHandle { id, inbox: rx })
    }

    async fn unsubscribe(&self, owner: &str, event: &str, id: SubscriptionId) {
        // ---
        let mut subs = self.subscriptions.write().await;
        if let Some(list) = subs.get_mut(event) {
            let before = list.len();
            list.retain(|s| s.id != id);
            if list.len() != before {
                log_debug!("{owner}: unsubscribed {id} from {event:?}");
            }
            if list.is_empty() {
                subs.remove(event);
            }
        }
    }

    /// Drop every subscription owned by `transport_id`.
    ///
    /// Inboxes belonging to that transport close once their buffered
    /// messages are drained.
    pub async fn detach(&self, transport_id: &str) {
        // ---
        log_info!("{transport_id}: detaching from memory hub");

        let mut subs = self.subscriptions.write().await;
        for list in subs.values_mut() {
            list.retain(|s| s.owner.as_ref() != transport_id);
        }
        subs.retain(|_, list| !list.is_empty());
    }

    /// Number of subscriptions currently registered for `event`.
    pub async fn subscriber_count(&self, event: &str) -> usize {
        let subs = self.subscriptions.read().await;
        subs.get(event).map(Vec::len).unwrap_or(0)
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport.
///
/// Routes messages through a shared [`MemoryHub`]. Operations outside the
/// configured mode's capabilities fail with [`ChannelError::Transport`].
struct MemoryTransport {
    // ---
    base: TransportBase,
    capacity: usize,
    hub: Arc<MemoryHub>,
}

impl MemoryTransport {
    fn unsupported(&self, op: &str) -> ChannelError {
        ChannelError::Transport(format!(
            "{}: {op} not supported in {:?} mode",
            self.transport_id(),
            self.mode()
        ))
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn subscribe(&self, event: &str) -> Result<SubscriptionHandle> {
        // ---
        if !self.capabilities().subscribe {
            return Err(self.unsupported("subscribe"));
        }
        self.hub
            .subscribe(self.transport_id(), event, self.capacity)
            .await
    }

    /// Publish `message` to every `"message"` subscription on the hub.
    ///
    /// Messages without an origin are stamped with this transport's id.
    async fn send(&self, mut message: Message) -> Result<()> {
        // ---
        if !self.capabilities().send {
            return Err(self.unsupported("send"));
        }
        if message.origin.is_none() {
            message.origin = Some(Arc::from(self.transport_id()));
        }
        self.hub.publish(self.transport_id(), message).await
    }

    async fn unsubscribe(&self, event: &str, id: SubscriptionId) -> Result<()> {
        // ---
        if !self.capabilities().unsubscribe {
            return Err(self.unsupported("unsubscribe"));
        }
        self.hub.unsubscribe(self.transport_id(), event, id).await;
        Ok(())
    }
}

/// Create a new in-memory transport attached to the process-global hub.
///
/// All transports created with this function share a single bus. For
/// isolated tests, use [`create_memory_transport_with_hub`].
///
/// # Errors
///
/// Returns [`ChannelError::InvalidConfig`] if `config.capacity` is zero.
pub async fn create_memory_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create a new in-memory transport attached to `hub`.
///
/// # Errors
///
/// Returns [`ChannelError::InvalidConfig`] if `config.capacity` is zero.
pub async fn create_memory_transport_with_hub(
    config: TransportConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    if config.capacity == 0 {
        return Err(ChannelError::InvalidConfig(
            "inbox capacity must be at least 1".into(),
        ));
    }

    log_debug!(
        "{}: create memory transport ({:?})",
        config.node_id,
        config.mode
    );

    let transport = MemoryTransport {
        base: TransportBase::from(&config),
        capacity: config.capacity,
        hub,
    };

    Ok(Arc::new(transport))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::TransportMode;
    use serde_json::json;
    use tokio::time::{timeout, Duration};

    async fn transport(hub: &Arc<MemoryHub>, id: &str, mode: TransportMode) -> TransportPtr {
        let config = TransportConfig {
            mode,
            ..TransportConfig::full_duplex(id)
        };
        create_memory_transport_with_hub(config, hub.clone())
            .await
            .expect("create memory transport")
    }

    #[tokio::test]
    async fn send_reaches_every_subscriber_including_sender() {
        // ---
        let hub = MemoryHub::new();
        let a = transport(&hub, "a", TransportMode::FullDuplex).await;
        let b = transport(&hub, "b", TransportMode::FullDuplex).await;

        let mut sub_a = a.subscribe(MESSAGE_EVENT).await.unwrap();
        let mut sub_b = b.subscribe(MESSAGE_EVENT).await.unwrap();

        a.send(Message::new(json!("ping"))).await.unwrap();

        for inbox in [&mut sub_a.inbox, &mut sub_b.inbox] {
            let got = timeout(Duration::from_millis(100), inbox.recv())
                .await
                .expect("timed out")
                .expect("inbox closed");
            assert_eq!(got.data, json!("ping"));
            assert_eq!(got.origin.as_deref(), Some("a"));
        }
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_inbox() {
        // ---
        let hub = MemoryHub::new();
        let a = transport(&hub, "a", TransportMode::FullDuplex).await;

        let mut sub = a.subscribe(MESSAGE_EVENT).await.unwrap();
        assert_eq!(hub.subscriber_count(MESSAGE_EVENT).await, 1);

        a.unsubscribe(MESSAGE_EVENT, sub.id).await.unwrap();
        assert_eq!(hub.subscriber_count(MESSAGE_EVENT).await, 0);

        a.send(Message::new(json!(1))).await.unwrap();
        assert!(sub.inbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_handles_are_pruned_on_send() {
        // ---
        let hub = MemoryHub::new();
        let a = transport(&hub, "a", TransportMode::FullDuplex).await;

        let sub = a.subscribe(MESSAGE_EVENT).await.unwrap();
        drop(sub);
        assert_eq!(hub.subscriber_count(MESSAGE_EVENT).await, 1);

        a.send(Message::new(json!(null))).await.unwrap();
        assert_eq!(hub.subscriber_count(MESSAGE_EVENT).await, 0);
    }

    #[tokio::test]
    async fn full_inbox_drops_instead_of_blocking() {
        // ---
        let hub = MemoryHub::new();
        let config = TransportConfig {
            capacity: 2,
            ..TransportConfig::full_duplex("a")
        };
        let a = create_memory_transport_with_hub(config, hub.clone())
            .await
            .unwrap();

        let mut sub = a.subscribe(MESSAGE_EVENT).await.unwrap();

        for n in 0..5 {
            timeout(Duration::from_millis(100), a.send(Message::new(json!(n))))
                .await
                .expect("send waited on a full inbox")
                .unwrap();
        }

        // The full subscriber stays registered and kept the oldest messages.
        assert_eq!(hub.subscriber_count(MESSAGE_EVENT).await, 1);
        assert_eq!(sub.inbox.recv().await.unwrap().data, json!(0));
        assert_eq!(sub.inbox.recv().await.unwrap().data, json!(1));
        assert!(sub.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn detach_only_drops_the_owner() {
        // ---
        let hub = MemoryHub::new();
        let a = transport(&hub, "a", TransportMode::FullDuplex).await;
        let b = transport(&hub, "b", TransportMode::FullDuplex).await;

        let _sub_a = a.subscribe(MESSAGE_EVENT).await.unwrap();
        let _sub_b = b.subscribe(MESSAGE_EVENT).await.unwrap();

        hub.detach("a").await;
        assert_eq!(hub.subscriber_count(MESSAGE_EVENT).await, 1);
    }

    #[tokio::test]
    async fn partial_modes_reject_unsupported_operations() {
        // ---
        let hub = MemoryHub::new();
        let sender = transport(&hub, "tx", TransportMode::SendOnly).await;
        let listener = transport(&hub, "rx", TransportMode::ReceiveOnly).await;

        assert!(matches!(
            sender.subscribe(MESSAGE_EVENT).await,
            Err(ChannelError::Transport(_))
        ));
        assert!(matches!(
            listener.send(Message::new(json!(0))).await,
            Err(ChannelError::Transport(_))
        ));

        let mut sub = listener.subscribe(MESSAGE_EVENT).await.unwrap();
        sender.send(Message::new(json!("one-way"))).await.unwrap();
        let got = sub.inbox.recv().await.unwrap();
        assert_eq!(got.data, json!("one-way"));
    }

    #[tokio::test]
    async fn zero_capacity_is_rejected() {
        // ---
        let config = TransportConfig {
            capacity: 0,
            ..TransportConfig::full_duplex("zero")
        };
        let res = create_memory_transport_with_hub(config, MemoryHub::new()).await;
        assert!(matches!(res, Err(ChannelError::InvalidConfig(_))));
    }
}
