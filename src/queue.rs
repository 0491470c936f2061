// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delayed Queue Definition
//!
//! This module defines the queue bound to the delayed exchange, its
//! dead-letter arguments, and the binding between the two. The dead-letter
//! exchange and routing key point back at the delayed-jobs exchange so that a
//! message expiring from the queue is redelivered into the same logical
//! stream that consumers watch.

use crate::exchange::DEFAULT_EXCHANGE_NAME;
use lapin::types::{AMQPValue, LongLongInt, LongString, ShortString};
use std::collections::BTreeMap;

/// Header field used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Header field used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
/// Header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Header field used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Header field used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// Name of the delayed-jobs queue
pub const DEFAULT_QUEUE_NAME: &str = "delayed_jobs_queue";
/// Routing key binding the queue to the exchange, and the default publish key
pub const DEFAULT_ROUTING_KEY: &str = "delayed_jobs";

/// Where the broker redelivers a message that expires or is rejected.
///
/// The exchange and routing key are one unit: overriding one means
/// supplying both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub exchange: String,
    pub routing_key: String,
}

impl DeadLetter {
    pub fn new(exchange: &str, routing_key: &str) -> DeadLetter {
        DeadLetter {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        }
    }
}

impl Default for DeadLetter {
    fn default() -> Self {
        DeadLetter::new(DEFAULT_EXCHANGE_NAME, DEFAULT_ROUTING_KEY)
    }
}

/// Definition of the queue delayed jobs land in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) ttl: Option<u32>,
    pub(crate) max_length: Option<u32>,
    pub(crate) max_length_bytes: Option<u32>,
    pub(crate) dead_letter: Option<DeadLetter>,
}

impl Default for QueueDefinition {
    fn default() -> Self {
        QueueDefinition::new(DEFAULT_QUEUE_NAME)
            .durable()
            .dead_letter(DeadLetter::default())
    }
}

impl QueueDefinition {
    /// Creates a non-durable queue definition without extra arguments.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            delete: false,
            exclusive: false,
            ttl: None,
            max_length: None,
            max_length_bytes: None,
            dead_letter: None,
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the maximum number of messages the queue can hold.
    pub fn max_length(mut self, max: u32) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Sets the dead-letter exchange and routing key.
    pub fn dead_letter(mut self, dead_letter: DeadLetter) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    /// Applies caller overrides on top of this definition, field by field.
    ///
    /// The dead-letter pair is replaced as a whole or not at all.
    pub fn with_options(mut self, options: &QueueOptions) -> Self {
        if let Some(name) = &options.name {
            self.name = name.clone();
        }
        if let Some(durable) = options.durable {
            self.durable = durable;
        }
        if let Some(auto_delete) = options.auto_delete {
            self.delete = auto_delete;
        }
        if let Some(exclusive) = options.exclusive {
            self.exclusive = exclusive;
        }
        if options.message_ttl.is_some() {
            self.ttl = options.message_ttl;
        }
        if options.max_length.is_some() {
            self.max_length = options.max_length;
        }
        if options.max_length_bytes.is_some() {
            self.max_length_bytes = options.max_length_bytes;
        }
        if let Some(dead_letter) = &options.dead_letter {
            self.dead_letter = Some(dead_letter.clone());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Routing key the queue is bound with. It always equals the dead-letter
    /// routing key, so expired messages come back through the same binding.
    pub fn binding_key(&self) -> &str {
        self.dead_letter
            .as_ref()
            .map(|dl| dl.routing_key.as_str())
            .unwrap_or(DEFAULT_ROUTING_KEY)
    }

    /// Arguments sent with the queue declaration.
    pub fn arguments(&self) -> BTreeMap<ShortString, AMQPValue> {
        let mut args = BTreeMap::new();

        if let Some(dl) = &self.dead_letter {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(dl.exchange.clone())),
            );
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
                AMQPValue::LongString(LongString::from(dl.routing_key.clone())),
            );
        }

        let limits = [
            (AMQP_HEADERS_MESSAGE_TTL, self.ttl),
            (AMQP_HEADERS_MAX_LENGTH, self.max_length),
            (AMQP_HEADERS_MAX_LENGTH_BYTES, self.max_length_bytes),
        ];
        for (key, value) in limits {
            if let Some(value) = value {
                args.insert(
                    ShortString::from(key),
                    AMQPValue::LongLongInt(LongLongInt::from(value)),
                );
            }
        }

        args
    }
}

/// Caller overrides for the delayed queue. Unset fields keep their default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub name: Option<String>,
    pub durable: Option<bool>,
    pub auto_delete: Option<bool>,
    pub exclusive: Option<bool>,
    pub message_ttl: Option<u32>,
    pub max_length: Option<u32>,
    pub max_length_bytes: Option<u32>,
    pub dead_letter: Option<DeadLetter>,
}

/// Binding of a queue to an exchange under a routing key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a binding for the given queue with an empty exchange and key.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn key(&self) -> &str {
        &self.routing_key
    }
}
