// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delayed Exchange Definition
//!
//! This module defines the exchange that holds delayed jobs. The exchange is an
//! `x-delayed-message` exchange (provided by the RabbitMQ delayed message
//! plugin); once a message's `x-delay` elapses the plugin routes it with the
//! algorithm named in the `x-delayed-type` argument, `topic` by default.

use lapin::types::{AMQPValue, LongString, ShortString};
use std::collections::BTreeMap;

/// Header field naming the routing algorithm a delayed exchange applies once the delay elapses
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";

/// Exchange type registered by the delayed message plugin
pub const DELAYED_EXCHANGE_TYPE: &str = "x-delayed-message";

/// Name of the delayed-jobs exchange
pub const DEFAULT_EXCHANGE_NAME: &str = "delayed_jobs";

/// Represents the types of exchanges available in RabbitMQ.
///
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
/// - XMessageDelayed: Holds messages for their `x-delay` before routing (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
    XMessageDelayed,
}

impl ExchangeKind {
    /// The type name the broker knows this kind by.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
            ExchangeKind::XMessageDelayed => DELAYED_EXCHANGE_TYPE,
        }
    }
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom(DELAYED_EXCHANGE_TYPE.to_owned())
            }
        }
    }
}

/// Definition of the exchange delayed jobs are published to.
///
/// Built from [`ExchangeDefinition::default`] (the `delayed_jobs` exchange) and
/// then adjusted with [`ExchangeDefinition::with_options`] or the builder methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) internal: bool,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
}

impl Default for ExchangeDefinition {
    fn default() -> Self {
        ExchangeDefinition::new(DEFAULT_EXCHANGE_NAME)
            .delayed(ExchangeKind::Topic)
            .durable()
    }
}

impl ExchangeDefinition {
    /// Creates a non-durable direct exchange definition with the given name.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            durable: false,
            delete: false,
            internal: false,
            params: BTreeMap::default(),
        }
    }

    /// Turns the exchange into a delayed exchange that routes with `routing`
    /// once a message's delay has elapsed.
    pub fn delayed(mut self, routing: ExchangeKind) -> Self {
        self.kind = ExchangeKind::XMessageDelayed;
        self.params.insert(
            ShortString::from(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE),
            AMQPValue::LongString(LongString::from(routing.as_str())),
        );
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Applies caller overrides on top of this definition, field by field.
    pub fn with_options(mut self, options: &ExchangeOptions) -> Self {
        if let Some(name) = &options.name {
            self.name = name.clone();
        }
        if let Some(durable) = options.durable {
            self.durable = durable;
        }
        if let Some(auto_delete) = options.auto_delete {
            self.delete = auto_delete;
        }
        if let Some(internal) = options.internal {
            self.internal = internal;
        }
        if let Some(routing) = &options.delayed_type {
            self = self.delayed(routing.clone());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ExchangeKind {
        &self.kind
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Arguments sent with the exchange declaration.
    pub fn arguments(&self) -> &BTreeMap<ShortString, AMQPValue> {
        &self.params
    }
}

/// Caller overrides for the delayed exchange. Unset fields keep their default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeOptions {
    pub name: Option<String>,
    pub durable: Option<bool>,
    pub auto_delete: Option<bool>,
    pub internal: Option<bool>,
    /// Routing algorithm applied after the delay, written to `x-delayed-type`
    pub delayed_type: Option<ExchangeKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_durable_topic_delayed_exchange() {
        let def = ExchangeDefinition::default();

        assert_eq!(def.name(), "delayed_jobs");
        assert_eq!(def.kind(), &ExchangeKind::XMessageDelayed);
        assert!(def.is_durable());
        assert_eq!(
            def.arguments().get(&ShortString::from("x-delayed-type")),
            Some(&AMQPValue::LongString(LongString::from("topic")))
        );
    }

    #[test]
    fn delayed_kind_maps_to_plugin_exchange_type() {
        let kind: lapin::ExchangeKind = ExchangeKind::XMessageDelayed.into();
        assert!(matches!(kind, lapin::ExchangeKind::Custom(ref t) if t == "x-delayed-message"));
    }

    #[test]
    fn options_override_only_what_they_set() {
        let def = ExchangeDefinition::default().with_options(&ExchangeOptions {
            durable: Some(false),
            delayed_type: Some(ExchangeKind::Direct),
            ..Default::default()
        });

        assert_eq!(def.name(), "delayed_jobs");
        assert!(!def.is_durable());
        assert_eq!(def.kind(), &ExchangeKind::XMessageDelayed);
        assert_eq!(
            def.arguments().get(&ShortString::from("x-delayed-type")),
            Some(&AMQPValue::LongString(LongString::from("direct")))
        );
    }
}
