// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Transport
//!
//! [`Transport`] implementation backed by a `lapin` connection and channel.
//! A declare that the broker refuses with `PRECONDITION_FAILED` (an entity
//! already exists with other parameters) surfaces as `TopologyConflict`.

use crate::{
    channel::{new_amqp_channel, new_amqp_connection},
    config::ConnectionOptions,
    errors::DelayedJobError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    transport::{ExchangeHandle, OutboundMessage, QueueHandle, Transport},
};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    protocol::{AMQPErrorKind, AMQPSoftError},
    types::{FieldTable, ShortString},
    BasicProperties, Channel, Connection,
};
use std::sync::Arc;
use tracing::{debug, error};

const REPLY_SUCCESS: u16 = 200;

/// A broker channel, plus the connection it was opened on when that
/// connection is owned here.
pub struct AmqpTransport {
    connection: Option<Arc<Connection>>,
    channel: Arc<Channel>,
}

impl AmqpTransport {
    /// Opens a fresh connection and channel.
    pub async fn connect(opts: &ConnectionOptions) -> Result<AmqpTransport, DelayedJobError> {
        AmqpTransport::from_parts(opts, None, None).await
    }

    /// Builds a transport from whatever the caller already holds.
    ///
    /// Without a connection or a channel, a connection is opened from `opts`.
    /// Without a channel, one is created on the connection. A channel given
    /// on its own is used as is.
    pub async fn from_parts(
        opts: &ConnectionOptions,
        connection: Option<Arc<Connection>>,
        channel: Option<Arc<Channel>>,
    ) -> Result<AmqpTransport, DelayedJobError> {
        match (connection, channel) {
            (connection, Some(channel)) => Ok(AmqpTransport {
                connection,
                channel,
            }),
            (Some(connection), None) => {
                let channel = new_amqp_channel(&connection, opts).await?;
                Ok(AmqpTransport {
                    connection: Some(connection),
                    channel,
                })
            }
            (None, None) => {
                let connection = new_amqp_connection(opts).await?;
                let channel = new_amqp_channel(&connection, opts).await?;
                Ok(AmqpTransport {
                    connection: Some(connection),
                    channel,
                })
            }
        }
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }
}

fn is_precondition_failed(err: &lapin::Error) -> bool {
    match err {
        lapin::Error::ProtocolError(amqp) => matches!(
            amqp.kind(),
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
        ),
        _ => false,
    }
}

fn exchange_declare_error(name: &str, err: lapin::Error) -> DelayedJobError {
    if is_precondition_failed(&err) {
        error!(error = err.to_string(), name = %name, "exchange exists with different parameters");
        return DelayedJobError::exchange_conflict(name, err.to_string());
    }

    error!(error = err.to_string(), name = %name, "error to declare the exchange");
    DelayedJobError::DeclareExchange(name.to_owned())
}

fn queue_declare_error(name: &str, err: lapin::Error) -> DelayedJobError {
    if is_precondition_failed(&err) {
        error!(error = err.to_string(), name = %name, "queue exists with different parameters");
        return DelayedJobError::queue_conflict(name, err.to_string());
    }

    error!(error = err.to_string(), name = %name, "error to declare the queue");
    DelayedJobError::DeclareQueue(name.to_owned())
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn declare_exchange(
        &self,
        def: &ExchangeDefinition,
    ) -> Result<ExchangeHandle, DelayedJobError> {
        debug!("creating exchange: {}", def.name);

        self.channel
            .exchange_declare(
                &def.name,
                def.kind.clone().into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    auto_delete: def.delete,
                    internal: def.internal,
                    nowait: false,
                },
                FieldTable::from(def.params.clone()),
            )
            .await
            .map_err(|err| exchange_declare_error(&def.name, err))?;

        Ok(ExchangeHandle {
            name: def.name.clone(),
        })
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<QueueHandle, DelayedJobError> {
        debug!("creating queue: {}", def.name);

        let queue = self
            .channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.delete,
                    nowait: false,
                },
                FieldTable::from(def.arguments()),
            )
            .await
            .map_err(|err| queue_declare_error(&def.name, err))?;

        Ok(QueueHandle {
            name: queue.name().as_str().to_owned(),
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
        })
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), DelayedJobError> {
        match self
            .channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(DelayedJobError::Binding(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), DelayedJobError> {
        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(message.content_type.clone()))
            .with_message_id(ShortString::from(message.message_id.clone()))
            .with_headers(FieldTable::from(message.headers.clone()));
        if message.persistent {
            properties = properties.with_delivery_mode(2);
        }

        let confirm = match self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &message.body,
                properties,
            )
            .await
        {
            Ok(pending) => pending.await,
            Err(err) => Err(err),
        };

        match confirm {
            Ok(confirmation) if confirmation.is_nack() => {
                error!(
                    exchange = %message.exchange,
                    message_id = %message.message_id,
                    "broker nacked the message"
                );
                Err(DelayedJobError::Publishing(message.exchange.clone()))
            }
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(DelayedJobError::Publishing(message.exchange.clone()))
            }
        }
    }

    /// Closes the channel, then the owned connection. The connection is
    /// closed even when the channel fails to; the first failure is returned.
    async fn close(&self) -> Result<(), DelayedJobError> {
        let mut channel_result = Ok(());
        if self.channel.status().connected() {
            if let Err(err) = self.channel.close(REPLY_SUCCESS, "Normal shutdown").await {
                error!(error = err.to_string(), "error to close the channel");
                channel_result = Err(DelayedJobError::ConnectionFailure(format!(
                    "close channel: {}",
                    err
                )));
            }
        }

        let mut connection_result = Ok(());
        if let Some(conn) = &self.connection {
            if conn.status().connected() {
                if let Err(err) = conn.close(REPLY_SUCCESS, "Normal shutdown").await {
                    error!(error = err.to_string(), "error to close the connection");
                    connection_result = Err(DelayedJobError::ConnectionFailure(format!(
                        "close connection: {}",
                        err
                    )));
                }
            }
        }

        channel_result.and(connection_result)?;
        debug!("amqp transport closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        let connection_open = self
            .connection
            .as_ref()
            .map(|conn| conn.status().connected())
            .unwrap_or(true);

        connection_open && self.channel.status().connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::protocol::AMQPError;

    fn soft_error(kind: AMQPSoftError, text: &str) -> lapin::Error {
        lapin::Error::ProtocolError(AMQPError::new(
            AMQPErrorKind::Soft(kind),
            ShortString::from(text),
        ))
    }

    #[test]
    fn precondition_failed_is_a_topology_conflict() {
        let err = soft_error(
            AMQPSoftError::PRECONDITIONFAILED,
            "PRECONDITION_FAILED - inequivalent arg 'durable'",
        );
        assert!(is_precondition_failed(&err));

        assert!(matches!(
            exchange_declare_error("delayed_jobs", err),
            DelayedJobError::TopologyConflict { ref entity, ref name, .. }
                if entity == "exchange" && name == "delayed_jobs"
        ));

        let err = soft_error(
            AMQPSoftError::PRECONDITIONFAILED,
            "PRECONDITION_FAILED - inequivalent arg 'x-message-ttl'",
        );
        assert!(matches!(
            queue_declare_error("delayed_jobs_queue", err),
            DelayedJobError::TopologyConflict { ref entity, ref name, .. }
                if entity == "queue" && name == "delayed_jobs_queue"
        ));
    }

    #[test]
    fn other_broker_errors_are_declare_failures() {
        let err = soft_error(AMQPSoftError::NOTFOUND, "NOT_FOUND - no vhost");
        assert!(!is_precondition_failed(&err));
        assert_eq!(
            exchange_declare_error("delayed_jobs", err),
            DelayedJobError::DeclareExchange("delayed_jobs".into())
        );

        let err = soft_error(AMQPSoftError::ACCESSREFUSED, "ACCESS_REFUSED");
        assert_eq!(
            queue_declare_error("delayed_jobs_queue", err),
            DelayedJobError::DeclareQueue("delayed_jobs_queue".into())
        );

        assert!(!is_precondition_failed(&lapin::Error::InvalidChannelState(
            lapin::ChannelState::Closed
        )));
    }
}
