//! Public, transport-agnostic channel configuration.
//!
//! This type intentionally contains no transport-specific concepts.
//! Transport settings live in [`TransportConfig`](crate::TransportConfig).

use uuid::Uuid;

/// Who may call `emit` on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitPolicy {
    /// `emit` succeeds only on channels that have at least one handler
    /// registered on the emitting instance; otherwise it fails with
    /// [`ChannelError::UnregisteredChannel`](crate::ChannelError::UnregisteredChannel).
    #[default]
    LocalRegistration,

    /// `emit` sends on any non-empty channel name, registered or not.
    Unrestricted,
}

/// Channel instance configuration.
#[derive(Debug, Clone)]
pub struct ChannelsConfig {
    // ---
    /// Identifier of this instance, used for logging.
    ///
    /// Defaults to a random UUID.
    pub node_id: String,

    /// Emit gating policy.
    ///
    /// Default: [`EmitPolicy::LocalRegistration`].
    pub emit_policy: EmitPolicy,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            node_id: Uuid::new_v4().to_string(),
            emit_policy: EmitPolicy::default(),
        }
    }
}

impl ChannelsConfig {
    /// Create a config with an explicit node id and default policy.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            emit_policy: EmitPolicy::default(),
        }
    }

    /// Set the emit policy.
    ///
    /// # Example
    ///
    /// ```
    /// use mom_channels::{ChannelsConfig, EmitPolicy};
    ///
    /// let config = ChannelsConfig::new("ui").with_emit_policy(EmitPolicy::Unrestricted);
    /// assert_eq!(config.emit_policy, EmitPolicy::Unrestricted);
    /// ```
    pub fn with_emit_policy(mut self, policy: EmitPolicy) -> Self {
        self.emit_policy = policy;
        self
    }
}
