//! Channel registry.
//!
//! Maps channel names to the ordered list of handlers registered on them.
//! All registration state of a [`Channels`](crate::Channels) instance lives
//! here; the instance wraps it in a mutex shared with its dispatcher.
//!
//! Invariants:
//! - a handler appears at most once per channel (by identity)
//! - dispatch order is registration order
//! - a channel with no handlers has no entry
//! - once closed by `clear_all`, it accepts no further changes

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{ChannelError, Handler, Result};

/// Registry shared between an instance and its dispatcher task.
pub(crate) type SharedRegistry = Arc<Mutex<ChannelRegistry>>;

/// Acquire mutex guard, ignoring poisoning.
///
/// Handlers run outside the lock and panics inside them are caught, so a
/// poisoned registry still holds consistent data.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reject empty channel names.
pub(crate) fn validate_channel(channel: &str) -> Result<()> {
    if channel.is_empty() {
        return Err(ChannelError::InvalidChannel);
    }
    Ok(())
}

#[derive(Default)]
pub(crate) struct ChannelRegistry {
    channels: HashMap<String, Vec<Handler>>,
    closed: bool,
}

impl ChannelRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ChannelError::Disposed);
        }
        Ok(())
    }

    /// Append `handler` to `channel` unless it is already there.
    ///
    /// Returns `true` if the handler was added.
    pub(crate) fn register(&mut self, channel: &str, handler: &Handler) -> Result<bool> {
        // ---
        self.ensure_open()?;
        validate_channel(channel)?;

        let handlers = self.channels.entry(channel.to_string()).or_default();
        if handlers.iter().any(|h| h.same_as(handler)) {
            return Ok(false);
        }
        handlers.push(handler.clone());
        Ok(true)
    }

    /// Remove `handler` from `channel` if present.
    ///
    /// Returns `true` if an entry was removed. Removing the last handler
    /// removes the channel.
    pub(crate) fn deregister(&mut self, channel: &str, handler: &Handler) -> Result<bool> {
        // ---
        self.ensure_open()?;
        validate_channel(channel)?;

        let Some(handlers) = self.channels.get_mut(channel) else {
            return Ok(false);
        };

        let Some(pos) = handlers.iter().position(|h| h.same_as(handler)) else {
            return Ok(false);
        };

        handlers.remove(pos);
        if handlers.is_empty() {
            self.channels.remove(channel);
        }
        Ok(true)
    }

    /// Drop every handler on `channel`.
    ///
    /// Returns the number of handlers released.
    pub(crate) fn clear(&mut self, channel: &str) -> Result<usize> {
        // ---
        self.ensure_open()?;
        validate_channel(channel)?;
        Ok(self.channels.remove(channel).map(|h| h.len()).unwrap_or(0))
    }

    /// Drop every handler on every channel and close the registry.
    ///
    /// Later `register`, `deregister` and `clear` calls fail with
    /// [`ChannelError::Disposed`].
    pub(crate) fn clear_all(&mut self) -> usize {
        // ---
        self.closed = true;
        let released = self.channels.values().map(Vec::len).sum();
        self.channels.clear();
        released
    }

    pub(crate) fn is_registered(&self, channel: &str) -> bool {
        self.channels.get(channel).is_some_and(|h| !h.is_empty())
    }

    pub(crate) fn handler_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(Vec::len).unwrap_or(0)
    }

    /// Copy of the handler list for `channel`, in dispatch order.
    ///
    /// Dispatch iterates over this copy, so registry changes made by a
    /// running handler only affect later dispatches.
    pub(crate) fn snapshot(&self, channel: &str) -> Vec<Handler> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }

    pub(crate) fn channel_names(&self) -> Vec<String> {
        // ---
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }
}
