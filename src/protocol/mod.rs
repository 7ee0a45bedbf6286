/// Wire protocol for channel traffic.
///
/// This module defines the envelope exchanged through the transport and its
/// encode/decode rules.
mod envelope;

pub use envelope::Envelope;
