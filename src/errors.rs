// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for Delayed Job Publishing
//!
//! The `DelayedJobError` enum covers every failure the publisher can surface:
//! argument validation, broker topology conflicts, connection problems,
//! serialization, and publishing after the publisher was closed.

use thiserror::Error;

/// Represents errors that can occur while declaring delayed-job topology or
/// publishing delayed jobs.
///
/// Nothing in this crate retries on error. Each variant names the operation
/// and the broker entity involved so the caller can decide what to do.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelayedJobError {
    /// A caller-supplied value was rejected before any broker call was made
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An exchange or queue already exists with different parameters
    #[error("{entity} `{name}` already exists with different parameters: {reason}")]
    TopologyConflict {
        entity: String,
        name: String,
        reason: String,
    },

    /// The connection or channel could not be opened, maintained, or closed
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// The publisher was closed before the operation was attempted
    #[error("publisher is not open")]
    NotOpen,

    /// Error declaring an exchange, other than a parameter conflict
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchange(String),

    /// Error declaring a queue, other than a parameter conflict
    #[error("failure to declare a queue `{0}`")]
    DeclareQueue(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}`")]
    Binding(String, String),

    /// Error encoding or decoding the job envelope
    #[error("failure to serialize job envelope: {0}")]
    Serialization(String),

    /// Error publishing a message
    #[error("failure to publish to exchange `{0}`")]
    Publishing(String),
}

impl DelayedJobError {
    pub(crate) fn exchange_conflict(name: &str, reason: impl Into<String>) -> Self {
        DelayedJobError::TopologyConflict {
            entity: "exchange".to_owned(),
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn queue_conflict(name: &str, reason: impl Into<String>) -> Self {
        DelayedJobError::TopologyConflict {
            entity: "queue".to_owned(),
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_entity() {
        let err = DelayedJobError::queue_conflict("delayed_jobs_queue", "durable differs");
        assert_eq!(
            err.to_string(),
            "queue `delayed_jobs_queue` already exists with different parameters: durable differs"
        );
    }

    #[test]
    fn binding_message_orders_queue_and_exchange() {
        let err = DelayedJobError::Binding("delayed_jobs".into(), "delayed_jobs_queue".into());
        assert_eq!(
            err.to_string(),
            "failure to bind queue `delayed_jobs_queue` to exchange `delayed_jobs`"
        );
    }
}
