// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # In-Memory Broker
//!
//! An in-process stand-in for RabbitMQ. It keeps declared exchanges, queues,
//! and bindings, applies the broker's declare rules (identical re-declare is
//! a no-op, a different one is refused), and records every published message.
//! Several transports can share one broker, the way several connections share
//! one RabbitMQ node.

use crate::{
    errors::DelayedJobError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    transport::{ExchangeHandle, OutboundMessage, QueueHandle, Transport},
};
use async_trait::async_trait;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};
use tracing::debug;

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeDefinition>,
    queues: HashMap<String, QueueDefinition>,
    bindings: BTreeSet<QueueBinding>,
    published: Vec<OutboundMessage>,
    publish_failures: usize,
}

/// A broker shared by any number of [`InMemoryTransport`]s.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> InMemoryBroker {
        InMemoryBroker::default()
    }

    /// Opens a new transport (a connection plus channel) on this broker.
    pub fn transport(&self) -> InMemoryTransport {
        InMemoryTransport {
            broker: self.clone(),
            open: AtomicBool::new(true),
        }
    }

    /// Makes the next `count` publishes fail as if the channel had errored.
    pub fn fail_next_publishes(&self, count: usize) {
        self.lock().publish_failures = count;
    }

    pub fn exchange(&self, name: &str) -> Option<ExchangeDefinition> {
        self.lock().exchanges.get(name).cloned()
    }

    pub fn queue(&self, name: &str) -> Option<QueueDefinition> {
        self.lock().queues.get(name).cloned()
    }

    pub fn exchange_count(&self) -> usize {
        self.lock().exchanges.len()
    }

    pub fn queue_count(&self) -> usize {
        self.lock().queues.len()
    }

    pub fn bindings(&self) -> Vec<QueueBinding> {
        self.lock().bindings.iter().cloned().collect()
    }

    /// Every message accepted so far, oldest first.
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.lock().published.clone()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn exchange_differences(
    existing: &ExchangeDefinition,
    requested: &ExchangeDefinition,
) -> Vec<&'static str> {
    let mut diffs = vec![];
    if existing.kind != requested.kind {
        diffs.push("type");
    }
    if existing.durable != requested.durable {
        diffs.push("durable");
    }
    if existing.delete != requested.delete {
        diffs.push("auto_delete");
    }
    if existing.internal != requested.internal {
        diffs.push("internal");
    }
    if existing.params != requested.params {
        diffs.push("arguments");
    }
    diffs
}

fn queue_differences(
    existing: &QueueDefinition,
    requested: &QueueDefinition,
) -> Vec<&'static str> {
    let mut diffs = vec![];
    if existing.durable != requested.durable {
        diffs.push("durable");
    }
    if existing.delete != requested.delete {
        diffs.push("auto_delete");
    }
    if existing.exclusive != requested.exclusive {
        diffs.push("exclusive");
    }
    if existing.arguments() != requested.arguments() {
        diffs.push("arguments");
    }
    diffs
}

/// One connection to an [`InMemoryBroker`].
pub struct InMemoryTransport {
    broker: InMemoryBroker,
    open: AtomicBool,
}

impl InMemoryTransport {
    fn ensure_open(&self) -> Result<(), DelayedJobError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DelayedJobError::ConnectionFailure("channel is closed".to_owned()))
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn declare_exchange(
        &self,
        def: &ExchangeDefinition,
    ) -> Result<ExchangeHandle, DelayedJobError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();

        if let Some(existing) = state.exchanges.get(&def.name) {
            let diffs = exchange_differences(existing, def);
            if !diffs.is_empty() {
                return Err(DelayedJobError::exchange_conflict(
                    &def.name,
                    format!("inequivalent {}", diffs.join(", ")),
                ));
            }
        } else {
            debug!("creating exchange: {}", def.name);
            state.exchanges.insert(def.name.clone(), def.clone());
        }

        Ok(ExchangeHandle {
            name: def.name.clone(),
        })
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<QueueHandle, DelayedJobError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();

        if let Some(existing) = state.queues.get(&def.name) {
            let diffs = queue_differences(existing, def);
            if !diffs.is_empty() {
                return Err(DelayedJobError::queue_conflict(
                    &def.name,
                    format!("inequivalent {}", diffs.join(", ")),
                ));
            }
        } else {
            debug!("creating queue: {}", def.name);
            state.queues.insert(def.name.clone(), def.clone());
        }

        Ok(QueueHandle {
            name: def.name.clone(),
            message_count: 0,
            consumer_count: 0,
        })
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), DelayedJobError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();

        if !state.exchanges.contains_key(&binding.exchange_name)
            || !state.queues.contains_key(&binding.queue_name)
        {
            return Err(DelayedJobError::Binding(
                binding.exchange_name.clone(),
                binding.queue_name.clone(),
            ));
        }

        state.bindings.insert(binding.clone());
        Ok(())
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), DelayedJobError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();

        if state.publish_failures > 0 {
            state.publish_failures -= 1;
            return Err(DelayedJobError::Publishing(message.exchange.clone()));
        }
        if !state.exchanges.contains_key(&message.exchange) {
            return Err(DelayedJobError::Publishing(message.exchange.clone()));
        }

        state.published.push(message.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), DelayedJobError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
