// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delayed Job Publisher
//!
//! This module publishes jobs to the delayed exchange. Construction declares
//! the topology once; every `publish` wraps the job in a [`JobEnvelope`],
//! attaches the `x-delay` header, and sends it as a persistent message. The
//! broker's delayed message plugin does the waiting.

use crate::{
    amqp::AmqpTransport,
    config::PublisherConfig,
    envelope::{Delay, JobEnvelope, JobPayload, AMQP_HEADERS_DELAY, JSON_CONTENT_TYPE},
    errors::DelayedJobError,
    exchange::{ExchangeDefinition, ExchangeOptions},
    otel,
    queue::{QueueDefinition, QueueOptions},
    topology,
    transport::{ExchangeHandle, OutboundMessage, QueueHandle, Transport},
};
use lapin::types::ShortString;
use opentelemetry::Context;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a publisher. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Open,
    Closed,
}

/// Publishes delayed jobs through one exclusively owned transport.
///
/// Not meant for concurrent use: give each concurrent producer its own
/// publisher, or put one behind a lock.
pub struct DelayedJobPublisher<T: Transport = AmqpTransport> {
    transport: T,
    exchange: ExchangeHandle,
    queue: QueueHandle,
    routing_key: String,
    state: PublisherState,
}

impl DelayedJobPublisher<AmqpTransport> {
    /// Connects to the broker and declares the delayed-job topology.
    pub async fn connect(config: &PublisherConfig) -> Result<Self, DelayedJobError> {
        let transport = AmqpTransport::connect(&config.connection).await?;
        DelayedJobPublisher::with_transport(transport, &config.exchange, &config.queue).await
    }

    /// Connects, publishes a single job, and closes again.
    ///
    /// Every call pays for a new connection; hold a publisher for repeated use.
    pub async fn publish_once(
        config: &PublisherConfig,
        job: JobPayload,
        delay_ms: i64,
        routing_key: Option<&str>,
    ) -> Result<JobEnvelope, DelayedJobError> {
        Delay::try_from(delay_ms)?;
        let publisher = DelayedJobPublisher::connect(config).await?;
        publisher.publish_and_close(job, delay_ms, routing_key).await
    }
}

impl<T: Transport> DelayedJobPublisher<T> {
    /// Declares the topology on `transport` and returns an open publisher.
    ///
    /// Overrides are applied over the `delayed_jobs` defaults field by field.
    /// The queue is bound with its dead-letter routing key, which is also the
    /// default key jobs are published with. On failure the transport is
    /// closed and the error returned.
    pub async fn with_transport(
        transport: T,
        exchange: &ExchangeOptions,
        queue: &QueueOptions,
    ) -> Result<Self, DelayedJobError> {
        let exchange_def = ExchangeDefinition::default().with_options(exchange);
        let queue_def = QueueDefinition::default().with_options(queue);
        let routing_key = queue_def.binding_key().to_owned();

        match topology::declare(&transport, &exchange_def, &queue_def, &routing_key).await {
            Ok((exchange, queue)) => {
                info!(
                    exchange = %exchange.name,
                    queue = %queue.name,
                    routing_key = %routing_key,
                    "delayed_jobs_topology_declared"
                );
                Ok(DelayedJobPublisher {
                    transport,
                    exchange,
                    queue,
                    routing_key,
                    state: PublisherState::Open,
                })
            }
            Err(err) => {
                if let Err(close_err) = transport.close().await {
                    warn!(error = %close_err, "error closing transport after failed setup");
                }
                Err(err)
            }
        }
    }

    /// Publishes `job` with the default routing key.
    pub async fn publish(
        &self,
        job: JobPayload,
        delay_ms: i64,
    ) -> Result<JobEnvelope, DelayedJobError> {
        self.publish_to(job, delay_ms, &self.routing_key).await
    }

    /// Publishes `job` so that the broker routes it with `routing_key` once
    /// `delay_ms` milliseconds have passed.
    ///
    /// Returns the envelope that was serialized into the message body.
    pub async fn publish_to(
        &self,
        job: JobPayload,
        delay_ms: i64,
        routing_key: &str,
    ) -> Result<JobEnvelope, DelayedJobError> {
        let delay = Delay::try_from(delay_ms)?;
        if self.state == PublisherState::Closed {
            return Err(DelayedJobError::NotOpen);
        }

        let envelope = JobEnvelope::new(job);
        let body = envelope.to_bytes()?;

        let mut headers = BTreeMap::new();
        otel::inject_context(&Context::current(), &mut headers);
        headers.insert(ShortString::from(AMQP_HEADERS_DELAY), delay.header_value());

        let message = OutboundMessage {
            exchange: self.exchange.name.clone(),
            routing_key: routing_key.to_owned(),
            body,
            headers,
            content_type: JSON_CONTENT_TYPE.to_owned(),
            message_id: Uuid::new_v4().to_string(),
            persistent: true,
        };

        self.transport.publish(&message).await?;

        info!(
            exchange = %message.exchange,
            routing_key = %message.routing_key,
            delay_ms = delay.as_millis(),
            message_id = %message.message_id,
            body_length = message.body.len(),
            "delayed_job_published"
        );

        Ok(envelope)
    }

    /// Releases the transport. Calling it again once it succeeded is a no-op.
    ///
    /// If the transport fails to close, the publisher stays open and the
    /// close can be retried.
    pub async fn close(&mut self) -> Result<(), DelayedJobError> {
        if self.state == PublisherState::Closed {
            return Ok(());
        }

        if self.transport.is_open() {
            self.transport.close().await?;
        }
        self.state = PublisherState::Closed;

        debug!(exchange = %self.exchange.name, "delayed_job_publisher_closed");
        Ok(())
    }

    /// Publishes one job, then closes the publisher whatever the outcome.
    ///
    /// A close failure after a successful publish is logged, not returned:
    /// the job has already been handed to the broker.
    pub async fn publish_and_close(
        mut self,
        job: JobPayload,
        delay_ms: i64,
        routing_key: Option<&str>,
    ) -> Result<JobEnvelope, DelayedJobError> {
        let published = match routing_key {
            Some(key) => self.publish_to(job, delay_ms, key).await,
            None => self.publish(job, delay_ms).await,
        };

        if let Err(err) = self.close().await {
            warn!(error = %err, "error closing single-shot publisher");
        }

        published
    }

    pub fn state(&self) -> PublisherState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == PublisherState::Open
    }

    pub fn exchange(&self) -> &ExchangeHandle {
        &self.exchange
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    /// Key jobs are published with when none is given.
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
