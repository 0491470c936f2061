// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delayed Job Topology
//!
//! Declares the delayed exchange, the delayed queue with its dead-letter
//! arguments, and the binding between them. Every step is an idempotent
//! broker declare, so running this on each publisher construction is safe;
//! the only state is on the broker.

use crate::{
    errors::DelayedJobError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    transport::{ExchangeHandle, QueueHandle, Transport},
};
use tracing::{debug, error};

/// Declares exchange, queue, and binding, in that order.
///
/// Stops at the first failure and returns it untouched, so a conflicting
/// exchange never leads to a queue declaration.
pub async fn declare<T>(
    transport: &T,
    exchange: &ExchangeDefinition,
    queue: &QueueDefinition,
    routing_key: &str,
) -> Result<(ExchangeHandle, QueueHandle), DelayedJobError>
where
    T: Transport + ?Sized,
{
    let exchange_handle = transport.declare_exchange(exchange).await?;
    debug!("exchange: {} was created", exchange_handle.name);

    let queue_handle = transport.declare_queue(queue).await?;
    debug!(
        messages = queue_handle.message_count,
        consumers = queue_handle.consumer_count,
        "queue: {} was created",
        queue_handle.name
    );

    let binding = QueueBinding::new(&queue_handle.name)
        .exchange(&exchange_handle.name)
        .routing_key(routing_key);

    debug!(
        "binding queue: {} to the exchange: {} with the key: {}",
        binding.queue_name, binding.exchange_name, binding.routing_key
    );
    if let Err(err) = transport.bind_queue(&binding).await {
        error!(error = err.to_string(), "error to bind queue to exchange");
        return Err(err);
    }

    debug!("queue was bounded");

    Ok((exchange_handle, queue_handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory::InMemoryBroker, queue::DEFAULT_ROUTING_KEY, transport::MockTransport};
    use mockall::Sequence;

    #[tokio::test]
    async fn declares_in_order_exchange_queue_binding() {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();

        transport
            .expect_declare_exchange()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|def| {
                Ok(ExchangeHandle {
                    name: def.name().to_owned(),
                })
            });
        transport
            .expect_declare_queue()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|def| {
                Ok(QueueHandle {
                    name: def.name().to_owned(),
                    message_count: 0,
                    consumer_count: 0,
                })
            });
        transport
            .expect_bind_queue()
            .withf(|b| {
                b.queue_name() == "delayed_jobs_queue"
                    && b.exchange_name() == "delayed_jobs"
                    && b.key() == "delayed_jobs"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let (exchange, queue) = declare(
            &transport,
            &ExchangeDefinition::default(),
            &QueueDefinition::default(),
            DEFAULT_ROUTING_KEY,
        )
        .await
        .unwrap();

        assert_eq!(exchange.name, "delayed_jobs");
        assert_eq!(queue.name, "delayed_jobs_queue");
    }

    #[tokio::test]
    async fn exchange_conflict_stops_before_queue() {
        let mut transport = MockTransport::new();
        transport
            .expect_declare_exchange()
            .returning(|def| Err(DelayedJobError::exchange_conflict(def.name(), "durable")));
        transport.expect_declare_queue().never();
        transport.expect_bind_queue().never();

        let err = declare(
            &transport,
            &ExchangeDefinition::default(),
            &QueueDefinition::default(),
            DEFAULT_ROUTING_KEY,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DelayedJobError::TopologyConflict { .. }));
    }

    #[tokio::test]
    async fn repeated_declare_leaves_one_of_each() {
        let broker = InMemoryBroker::new();
        let transport = broker.transport();

        for _ in 0..3 {
            declare(
                &transport,
                &ExchangeDefinition::default(),
                &QueueDefinition::default(),
                DEFAULT_ROUTING_KEY,
            )
            .await
            .unwrap();
        }

        assert_eq!(broker.exchange_count(), 1);
        assert_eq!(broker.queue_count(), 1);
        assert_eq!(broker.bindings().len(), 1);
    }
}
