//! Channel instance.
//!
//! A [`Channels`] value multiplexes named channels over one transport. It
//! holds exactly one subscription on the transport for its whole life and
//! owns the registry its dispatcher fans messages out to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;
use crate::handler::FailureHook;
use crate::protocol::Envelope;
use crate::registry::{lock_ignore_poison, validate_channel, ChannelRegistry, SharedRegistry};
use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    ChannelError,
    ChannelsBuilder,
    ChannelsConfig,
    EmitPolicy,
    Handler,
    Message,
    Result,
    SubscriptionId,
    TransportPtr,
    MESSAGE_EVENT,
};

/// Named channels over a single transport.
///
/// The instance does not own the transport's lifecycle: it attaches one
/// listener at construction and detaches it in [`dispose`](Self::dispose).
/// Until then the transport's subscription keeps the dispatcher, and with it
/// every registered handler, alive. Deregister handlers you no longer need
/// and dispose instances you are done with.
///
/// Cloning is cheap; clones share the same registry and subscription.
///
/// # Example
///
/// ```
/// use mom_channels::{Channels, Handler, MemoryHub, TransportBuilder};
///
/// # async fn example() -> mom_channels::Result<()> {
/// let transport = TransportBuilder::new()
///     .node_id("app")
///     .hub(MemoryHub::new())
///     .build()
///     .await?;
///
/// let channels = Channels::new(transport).await?;
///
/// let greet = Handler::new(|payload: &serde_json::Value| println!("got {payload}"));
/// channels.on("greet", &greet)?;
/// channels.emit("greet", &"hi").await?;
///
/// channels.dispose().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Channels {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TransportPtr,
    node_id: Arc<str>,
    emit_policy: EmitPolicy,
    registry: SharedRegistry,
    subscription: SubscriptionId,
    disposed: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        let task = match self.dispatcher.get_mut() {
            Ok(task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let Some(task) = task else {
            return;
        };

        task.abort();
        log_warn!(
            "{}: dropped without dispose(), dispatcher aborted",
            self.node_id
        );

        // Outside a runtime the subscription stays until the transport
        // notices the closed inbox (the memory hub does so on its next send).
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let transport = self.transport.clone();
        let subscription = self.subscription;
        let node_id = self.node_id.clone();
        runtime.spawn(async move {
            if let Err(err) = transport.unsubscribe(MESSAGE_EVENT, subscription).await {
                log_warn!("{node_id}: unsubscribe after drop failed: {err}");
            }
        });
    }
}

impl Channels {
    /// Attach a new instance to `transport` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidTarget`] if the transport does not
    /// support subscribe, send and unsubscribe, or any error the transport
    /// reports while subscribing.
    pub async fn new(transport: TransportPtr) -> Result<Self> {
        ChannelsBuilder::new(transport).build().await
    }

    /// Validate the transport, subscribe, and start the dispatcher
    /// (internal use by ChannelsBuilder).
    pub(crate) async fn start(
        transport: TransportPtr,
        config: ChannelsConfig,
        failure_hook: Option<FailureHook>,
    ) -> Result<Self> {
        // ---
        let capabilities = transport.capabilities();
        if !capabilities.is_full() {
            return Err(ChannelError::InvalidTarget(format!(
                "{} (transport {})",
                capabilities.missing().join(", "),
                transport.transport_id()
            )));
        }

        let node_id: Arc<str> = Arc::from(config.node_id);
        let registry: SharedRegistry = Arc::new(Mutex::new(ChannelRegistry::new()));

        let handle = transport.subscribe(MESSAGE_EVENT).await?;
        let subscription = handle.id;

        let task = Dispatcher::new(node_id.clone(), registry.clone(), failure_hook)
            .spawn(handle.inbox);

        log_info!(
            "{node_id}: attached to transport {} ({subscription})",
            transport.transport_id()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                node_id,
                emit_policy: config.emit_policy,
                registry,
                subscription,
                disposed: AtomicBool::new(false),
                dispatcher: Mutex::new(Some(task)),
            }),
        })
    }

    /// Fast path for calls after disposal. The registry repeats the check
    /// under its lock, so a call racing `dispose` cannot store a handler.
    fn ensure_live(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(ChannelError::Disposed);
        }
        Ok(())
    }

    /// Register `handler` on `channel`.
    ///
    /// Registering a handler that is already on the channel is a no-op, so
    /// it is invoked once per dispatch no matter how often it was added.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Disposed`] after [`dispose`](Self::dispose).
    /// - [`ChannelError::InvalidChannel`] if `channel` is empty.
    pub fn on(&self, channel: &str, handler: &Handler) -> Result<()> {
        // ---
        self.ensure_live()?;

        let added = lock_ignore_poison(&self.inner.registry).register(channel, handler)?;
        if added {
            log_debug!("{}: {} on {channel:?}", self.inner.node_id, handler.id());
        }
        Ok(())
    }

    /// Deregister `handler` from `channel`.
    ///
    /// Removing a handler that is not registered is a no-op. A dispatch
    /// already in progress still invokes it; later ones do not.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Disposed`] after [`dispose`](Self::dispose).
    /// - [`ChannelError::InvalidChannel`] if `channel` is empty.
    pub fn off(&self, channel: &str, handler: &Handler) -> Result<()> {
        // ---
        self.ensure_live()?;

        let removed = lock_ignore_poison(&self.inner.registry).deregister(channel, handler)?;
        if removed {
            log_debug!("{}: {} off {channel:?}", self.inner.node_id, handler.id());
        }
        Ok(())
    }

    /// Deregister every handler on `channel`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Disposed`] after [`dispose`](Self::dispose).
    /// - [`ChannelError::InvalidChannel`] if `channel` is empty.
    pub fn remove_all_handlers(&self, channel: &str) -> Result<()> {
        // ---
        self.ensure_live()?;

        let released = lock_ignore_poison(&self.inner.registry).clear(channel)?;
        log_debug!(
            "{}: cleared {channel:?} ({released} handler(s))",
            self.inner.node_id
        );
        Ok(())
    }

    /// Send `payload` on `channel` through the transport.
    ///
    /// Returns once the transport has accepted the message; delivery and
    /// handling happen asynchronously on every instance attached to the
    /// transport, this one included.
    ///
    /// Under the default [`EmitPolicy::LocalRegistration`], an instance can
    /// only emit on channels it has at least one handler registered on.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::InvalidChannel`] if `channel` is empty.
    /// - [`ChannelError::Disposed`] after [`dispose`](Self::dispose).
    /// - [`ChannelError::UnregisteredChannel`] if the channel has no local
    ///   handlers and the policy requires them.
    /// - [`ChannelError::Serialization`] if `payload` cannot be converted
    ///   to JSON.
    /// - [`ChannelError::Transport`] if the transport rejects the message.
    pub async fn emit<T>(&self, channel: &str, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        // ---
        validate_channel(channel)?;
        self.ensure_live()?;

        if self.inner.emit_policy == EmitPolicy::LocalRegistration
            && !lock_ignore_poison(&self.inner.registry).is_registered(channel)
        {
            return Err(ChannelError::UnregisteredChannel(channel.to_string()));
        }

        let payload = serde_json::to_value(payload)?;
        let message = Message::new(Envelope::encode(channel, payload));

        self.inner.transport.send(message).await
    }

    /// Detach from the transport and release every handler.
    ///
    /// Unsubscribes the dispatcher, waits for a dispatch in progress to
    /// finish, then clears the registry. Once this returns no handler of
    /// this instance runs again. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if unsubscribing fails. The instance is
    /// disposed and its handlers released regardless.
    pub async fn dispose(&self) -> Result<()> {
        // ---
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            log_debug!("{}: already disposed", self.inner.node_id);
            return Ok(());
        }

        let unsubscribed = self
            .inner
            .transport
            .unsubscribe(MESSAGE_EVENT, self.inner.subscription)
            .await;

        let task = lock_ignore_poison(&self.inner.dispatcher).take();
        if let Some(task) = task {
            task.abort();
            // Cancelled or finished; either way the loop is gone.
            let _ = task.await;
        }

        let released = lock_ignore_poison(&self.inner.registry).clear_all();

        log_info!(
            "{}: disposed, released {released} handler(s)",
            self.inner.node_id
        );

        unsubscribed
    }

    /// `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// The transport this instance is attached to.
    pub fn transport(&self) -> &TransportPtr {
        &self.inner.transport
    }

    /// `true` if `channel` has at least one local handler.
    pub fn is_registered(&self, channel: &str) -> bool {
        lock_ignore_poison(&self.inner.registry).is_registered(channel)
    }

    pub fn handler_count(&self, channel: &str) -> usize {
        lock_ignore_poison(&self.inner.registry).handler_count(channel)
    }

    /// Handlers on `channel`, in dispatch order.
    pub fn handlers(&self, channel: &str) -> Vec<Handler> {
        lock_ignore_poison(&self.inner.registry).snapshot(channel)
    }

    /// Names of all channels with local handlers, sorted.
    pub fn channels(&self) -> Vec<String> {
        lock_ignore_poison(&self.inner.registry).channel_names()
    }
}

impl std::fmt::Debug for Channels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channels")
            .field("node_id", &self.inner.node_id)
            .field("transport", &self.inner.transport.transport_id())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
