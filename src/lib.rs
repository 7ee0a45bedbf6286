//! Named channels multiplexed over a single message transport.
//!
//! This library lets any number of logical channels share one bidirectional
//! message stream (a window, a worker, a broadcast bus, or the bundled
//! in-memory hub). It handles envelope framing, handler registration with
//! identity-based deduplication, ordered fan-out, failure isolation, and the
//! subscription lifecycle.
//!
//! It does not provide request/response correlation, acknowledgements,
//! retries or backpressure.
//!

// Import all sub modules once...
mod channels;
mod dispatcher;
mod domain;
mod handler;
mod macros;
mod protocol;
mod registry;
mod transport;

mod channels_builder;
mod channels_config;
mod transport_builder;

mod error;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use channels::Channels;
pub use channels_builder::ChannelsBuilder;
pub use channels_config::{ChannelsConfig, EmitPolicy};
pub use transport_builder::TransportBuilder;

pub use error::{ChannelError, Result};
pub use handler::{
    //
    FailureHook,
    FailureKind,
    Handler,
    HandlerError,
    HandlerFailure,
    HandlerId,
    HandlerOutcome,
};
pub use protocol::Envelope;

pub use transport::{create_memory_transport, create_memory_transport_with_hub, MemoryHub};

// --- public re-exports
pub use domain::{
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
