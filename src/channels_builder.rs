//! Channels builder.
//!
//! Provides a fluent builder API for configuring [`Channels`] instances.

use std::sync::Arc;

use crate::handler::{FailureHook, HandlerFailure};
use crate::{Channels, ChannelsConfig, EmitPolicy, Result, TransportPtr};

/// Builder for creating [`Channels`] instances.
///
/// Accepts a transport and allows configuration of the node id, the emit
/// policy and an observer for handler failures.
///
/// # Examples
///
/// ## Default configuration
/// ```no_run
/// use mom_channels::{ChannelsBuilder, TransportBuilder};
///
/// # async fn example() -> mom_channels::Result<()> {
/// let transport = TransportBuilder::new().node_id("ui").build().await?;
/// let channels = ChannelsBuilder::new(transport).build().await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Reporting handler failures
/// ```no_run
/// use mom_channels::{ChannelsBuilder, TransportBuilder};
///
/// # async fn example() -> mom_channels::Result<()> {
/// let transport = TransportBuilder::new().node_id("worker").build().await?;
/// let channels = ChannelsBuilder::new(transport)
///     .node_id("worker-channels")
///     .unrestricted_emit()
///     .on_handler_failure(|failure| eprintln!("handler failed: {failure}"))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ChannelsBuilder {
    // ---
    transport: TransportPtr,
    node_id: Option<String>,
    emit_policy: Option<EmitPolicy>,
    failure_hook: Option<FailureHook>,
}

impl ChannelsBuilder {
    /// Create a new builder for an instance attached to `transport`.
    ///
    /// The instance's node id defaults to `transport.transport_id()`.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            node_id: None,
            emit_policy: None,
            failure_hook: None,
        }
    }

    /// Override the instance's node id.
    ///
    /// Useful when several instances share one transport and their log
    /// lines need telling apart.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Set the emit policy.
    ///
    /// Default: [`EmitPolicy::LocalRegistration`].
    pub fn emit_policy(mut self, policy: EmitPolicy) -> Self {
        self.emit_policy = Some(policy);
        self
    }

    /// Allow `emit` on channels without local handlers.
    ///
    /// Shorthand for `.emit_policy(EmitPolicy::Unrestricted)`.
    pub fn unrestricted_emit(self) -> Self {
        self.emit_policy(EmitPolicy::Unrestricted)
    }

    /// Observe handler failures isolated during dispatch.
    ///
    /// Called on the dispatcher task, after the failure has been logged.
    pub fn on_handler_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.failure_hook = Some(Arc::new(hook));
        self
    }

    /// Apply every field of `config`.
    pub fn config(mut self, config: ChannelsConfig) -> Self {
        self.node_id = Some(config.node_id);
        self.emit_policy = Some(config.emit_policy);
        self
    }

    /// Build the instance (consumes self).
    ///
    /// # Errors
    ///
    /// See [`Channels::new`].
    pub async fn build(self) -> Result<Channels> {
        // ---
        // node_id: explicit override, else fall back to transport_id
        let node_id = self
            .node_id
            .unwrap_or_else(|| self.transport.transport_id().to_string());

        let config = ChannelsConfig::new(node_id)
            .with_emit_policy(self.emit_policy.unwrap_or_default());

        Channels::start(self.transport, config, self.failure_hook).await
    }
}
