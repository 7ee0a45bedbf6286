//! Transport builder for creating transport instances.
//!
//! Provides a fluent builder API for constructing transports with clear
//! separation between required and optional configuration.

use std::sync::Arc;

use crate::{
    // ---
    ChannelError,
    MemoryHub,
    Result,
    TransportConfig,
    TransportMode,
    TransportPtr,
};

/// Builder for creating transport instances.
///
/// # Examples
///
/// ## Full-duplex transport on the global hub
/// ```no_run
/// use mom_channels::TransportBuilder;
///
/// # async fn example() -> mom_channels::Result<()> {
/// let transport = TransportBuilder::new()
///     .node_id("main-window")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Send-only transport on a private hub
/// ```no_run
/// use mom_channels::{MemoryHub, TransportBuilder};
///
/// # async fn example() -> mom_channels::Result<()> {
/// let hub = MemoryHub::new();
/// let transport = TransportBuilder::new()
///     .node_id("telemetry")
///     .hub(hub.clone())
///     .send_only()
///     .capacity(256)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TransportBuilder {
    node_id: Option<String>,
    hub: Option<Arc<MemoryHub>>,
    capacity: Option<usize>,

    // Track which mode sugar methods were called (conflicts detected at build())
    called_full_duplex: bool,
    called_send_only: bool,
    called_receive_only: bool,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self {
            node_id: None,
            hub: None,
            capacity: None,
            called_full_duplex: false,
            called_send_only: false,
            called_receive_only: false,
        }
    }

    /// Set the node ID (required).
    ///
    /// Used as the transport id in logs and as the origin of sent messages.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Attach to an explicit hub instead of the process-global one.
    pub fn hub(mut self, hub: Arc<MemoryHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Set the per-subscription inbox capacity.
    ///
    /// Default: [`TransportConfig::DEFAULT_CAPACITY`].
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Subscribe, send and unsubscribe (the default).
    pub fn full_duplex(mut self) -> Self {
        self.called_full_duplex = true;
        self
    }

    /// Send only. Such a transport cannot back a `Channels` instance.
    pub fn send_only(mut self) -> Self {
        self.called_send_only = true;
        self
    }

    /// Receive only. Such a transport cannot back a `Channels` instance.
    pub fn receive_only(mut self) -> Self {
        self.called_receive_only = true;
        self
    }

    /// Build the transport (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `node_id` is missing
    /// - more than one mode method was called
    /// - `capacity` is zero
    pub async fn build(self) -> Result<TransportPtr> {
        // ---
        let node_id = self
            .node_id
            .ok_or_else(|| ChannelError::MissingConfig("node_id".into()))?;

        let mode_count = [
            self.called_full_duplex,
            self.called_send_only,
            self.called_receive_only,
        ]
        .iter()
        .filter(|&&x| x)
        .count();

        if mode_count > 1 {
            return Err(ChannelError::ConfigConflict(
                "Cannot call multiple mode methods (full_duplex, send_only, receive_only)".into(),
            ));
        }

        let mode = if self.called_send_only {
            TransportMode::SendOnly
        } else if self.called_receive_only {
            TransportMode::ReceiveOnly
        } else {
            TransportMode::FullDuplex
        };

        let config = TransportConfig {
            node_id,
            mode,
            capacity: self.capacity.unwrap_or(TransportConfig::DEFAULT_CAPACITY),
        };

        match self.hub {
            Some(hub) => crate::create_memory_transport_with_hub(config, hub).await,
            None => crate::create_memory_transport(config).await,
        }
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
