//! Event envelope and topic contract shared by producer and consumer.

pub mod envelope;
pub mod topics;

pub use envelope::{EventMessage, Metadata, Priority, ENVELOPE_VERSION};
