//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! concrete transports or channel bookkeeping.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    Capabilities,
    Message,
    SubscriptionHandle,
    SubscriptionId,
    Transport,
    TransportBase,
    TransportConfig,
    TransportMode,
    TransportPtr,
    MESSAGE_EVENT,
};
