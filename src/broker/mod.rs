//! Broker integration: client, publishing seam, and topic dispatch.

pub mod client;
pub mod dispatcher;

pub use client::{BrokerClient, BrokerError, DeliveryReceipt, EventPublisher};
pub use dispatcher::{
    BlockingHandler, HandlerError, RecordHeaders, SuspendingHandler, TopicDispatcher, TopicHandler,
};
