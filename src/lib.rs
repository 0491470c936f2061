// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Delayed job publishing on top of the RabbitMQ delayed message exchange.
//!
//! ```no_run
//! # async fn run() -> Result<(), delayed_jobs::errors::DelayedJobError> {
//! use delayed_jobs::{
//!     config::PublisherConfig, envelope::parse_payload, publisher::DelayedJobPublisher,
//! };
//!
//! let mut publisher = DelayedJobPublisher::connect(&PublisherConfig::from_env()).await?;
//! let job = parse_payload(r#"{"type": "email_notification", "recipient": "a@b.com"}"#)?;
//! publisher.publish(job, 5000).await?;
//! publisher.close().await?;
//! # Ok(())
//! # }
//! ```

mod otel;

pub mod amqp;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod exchange;
pub mod memory;
pub mod publisher;
pub mod queue;
pub mod topology;
pub mod transport;
