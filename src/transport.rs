// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Transport
//!
//! The `Transport` trait is the capability set the publisher needs from a
//! broker channel. [`crate::amqp::AmqpTransport`] implements it over `lapin`,
//! [`crate::memory::InMemoryTransport`] implements it against an in-process
//! broker double.

use crate::{
    errors::DelayedJobError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::types::{AMQPValue, ShortString};
use std::collections::BTreeMap;

/// A declared exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeHandle {
    pub name: String,
}

/// A declared queue, with the counts the broker reported at declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// A fully built message ready to hand to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub headers: BTreeMap<ShortString, AMQPValue>,
    pub content_type: String,
    pub message_id: String,
    /// Delivery mode 2 when set, so the broker stores the message on disk
    pub persistent: bool,
}

impl OutboundMessage {
    pub fn header(&self, key: &str) -> Option<&AMQPValue> {
        self.headers.get(&ShortString::from(key))
    }
}

/// Broker operations used to declare delayed-job topology and publish jobs.
///
/// A transport owns one channel; it is not meant to be driven from several
/// tasks at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declares an exchange. Re-declaring with identical parameters succeeds,
    /// conflicting parameters yield `TopologyConflict`.
    async fn declare_exchange(
        &self,
        def: &ExchangeDefinition,
    ) -> Result<ExchangeHandle, DelayedJobError>;

    /// Declares a queue, under the same idempotency rule as exchanges.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<QueueHandle, DelayedJobError>;

    /// Binds a queue to an exchange. An existing identical binding is a no-op.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), DelayedJobError>;

    /// Publishes one message.
    async fn publish(&self, message: &OutboundMessage) -> Result<(), DelayedJobError>;

    /// Releases the channel and connection, if still open.
    async fn close(&self) -> Result<(), DelayedJobError>;

    fn is_open(&self) -> bool;
}
