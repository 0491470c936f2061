// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publisher Configuration
//!
//! Plain value objects handed to the publisher at construction time.
//! `from_env` reads the `RABBITMQ_*` variables, and `with_overrides` applies a
//! key-value option set, e.g. one produced by a host application's config.

use crate::{errors::DelayedJobError, exchange::ExchangeOptions, queue::QueueOptions};
use lapin::uri::AMQPUri;
use std::{env, str::FromStr};
use tracing::warn;

/// Connection settings for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    /// Name reported to the broker for this connection
    pub connection_name: String,
    /// Heartbeat interval negotiated with the broker, in seconds
    pub heartbeat: Option<u16>,
    /// Connection establishment timeout, in milliseconds
    pub connection_timeout: Option<u64>,
    /// Puts channels this crate opens into confirm mode and waits for the broker ack on publish
    pub publisher_confirms: bool,
    /// Passed through to the transport; this crate never reconnects on its own
    pub automatic_recovery: bool,
    /// Seconds between transport-level recovery attempts
    pub network_recovery_interval: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
            connection_name: "delayed-jobs".to_owned(),
            heartbeat: None,
            connection_timeout: None,
            publisher_confirms: true,
            automatic_recovery: true,
            network_recovery_interval: 10,
        }
    }
}

impl ConnectionOptions {
    /// Defaults overridden by any `RABBITMQ_*` environment variables that are set.
    pub fn from_env() -> Self {
        let defaults = ConnectionOptions::default();

        ConnectionOptions {
            host: env::var("RABBITMQ_HOST").unwrap_or(defaults.host),
            port: parse_env("RABBITMQ_PORT").unwrap_or(defaults.port),
            user: env::var("RABBITMQ_USER").unwrap_or(defaults.user),
            password: env::var("RABBITMQ_PASSWORD").unwrap_or(defaults.password),
            vhost: env::var("RABBITMQ_VHOST").unwrap_or(defaults.vhost),
            connection_name: env::var("RABBITMQ_CONNECTION_NAME")
                .unwrap_or(defaults.connection_name),
            heartbeat: parse_env("RABBITMQ_HEARTBEAT").or(defaults.heartbeat),
            connection_timeout: parse_env("RABBITMQ_CONNECTION_TIMEOUT")
                .or(defaults.connection_timeout),
            publisher_confirms: parse_env("RABBITMQ_PUBLISHER_CONFIRMS")
                .unwrap_or(defaults.publisher_confirms),
            automatic_recovery: parse_env("RABBITMQ_AUTOMATIC_RECOVERY")
                .unwrap_or(defaults.automatic_recovery),
            network_recovery_interval: parse_env("RABBITMQ_NETWORK_RECOVERY_INTERVAL")
                .unwrap_or(defaults.network_recovery_interval),
        }
    }

    /// Applies a key-value option set on top of these options.
    ///
    /// Unknown keys and unparsable values are rejected rather than ignored.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Result<Self, DelayedJobError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in overrides {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "host" => self.host = value.to_owned(),
                "port" => self.port = parse_override(key, value)?,
                "user" => self.user = value.to_owned(),
                "password" => self.password = value.to_owned(),
                "vhost" => self.vhost = value.to_owned(),
                "connection_name" => self.connection_name = value.to_owned(),
                "heartbeat" => self.heartbeat = Some(parse_override(key, value)?),
                "connection_timeout" => {
                    self.connection_timeout = Some(parse_override(key, value)?)
                }
                "publisher_confirms" => self.publisher_confirms = parse_override(key, value)?,
                "automatic_recovery" => self.automatic_recovery = parse_override(key, value)?,
                "network_recovery_interval" => {
                    self.network_recovery_interval = parse_override(key, value)?
                }
                _ => {
                    return Err(DelayedJobError::InvalidArgument(format!(
                        "unknown connection option `{}`",
                        key
                    )))
                }
            }
        }

        Ok(self)
    }

    /// The broker address without credentials, for logs and error messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, display_vhost(&self.vhost))
    }

    /// The connection URI handed to the AMQP client.
    pub fn amqp_uri(&self) -> AMQPUri {
        let mut uri = AMQPUri::default();
        uri.authority.host = self.host.clone();
        uri.authority.port = self.port;
        uri.authority.userinfo.username = self.user.clone();
        uri.authority.userinfo.password = self.password.clone();
        uri.vhost = self.vhost.clone();
        uri.query.heartbeat = self.heartbeat;
        uri.query.connection_timeout = self.connection_timeout;
        uri
    }
}

/// Everything needed to construct a publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherConfig {
    pub connection: ConnectionOptions,
    pub exchange: ExchangeOptions,
    pub queue: QueueOptions,
}

impl PublisherConfig {
    /// Connection options from the environment, plus an optional queue TTL
    /// from `DELAYED_JOBS_MESSAGE_TTL`.
    pub fn from_env() -> Self {
        PublisherConfig {
            connection: ConnectionOptions::from_env(),
            exchange: ExchangeOptions::default(),
            queue: QueueOptions {
                message_ttl: parse_env("DELAYED_JOBS_MESSAGE_TTL"),
                ..Default::default()
            },
        }
    }
}

fn display_vhost(vhost: &str) -> String {
    if vhost.starts_with('/') {
        vhost.to_owned()
    } else {
        format!("/{}", vhost)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(env_var = name, value = %raw, "invalid value, using default");
            None
        }
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T, DelayedJobError> {
    value.trim().parse().map_err(|_| {
        DelayedJobError::InvalidArgument(format!(
            "invalid value `{}` for connection option `{}`",
            value, key
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_guest_broker() {
        let opts = ConnectionOptions::default();

        assert_eq!(opts.host, "localhost");
        assert_eq!(opts.port, 5672);
        assert_eq!(opts.user, "guest");
        assert_eq!(opts.password, "guest");
        assert_eq!(opts.vhost, "/");
        assert_eq!(opts.endpoint(), "localhost:5672/");
    }

    #[test]
    fn overrides_parse_typed_values() {
        let opts = ConnectionOptions::default()
            .with_overrides([
                ("host", "rabbit.internal"),
                ("port", "5673"),
                ("vhost", "jobs"),
                ("automatic_recovery", "false"),
                ("heartbeat", "30"),
            ])
            .unwrap();

        assert_eq!(opts.host, "rabbit.internal");
        assert_eq!(opts.port, 5673);
        assert!(!opts.automatic_recovery);
        assert_eq!(opts.heartbeat, Some(30));
        assert_eq!(opts.endpoint(), "rabbit.internal:5673/jobs");
        assert_eq!(opts.user, "guest");
    }

    #[test]
    fn overrides_reject_unknown_keys_and_bad_values() {
        assert!(matches!(
            ConnectionOptions::default().with_overrides([("hots", "x")]),
            Err(DelayedJobError::InvalidArgument(_))
        ));
        assert!(matches!(
            ConnectionOptions::default().with_overrides([("port", "not-a-port")]),
            Err(DelayedJobError::InvalidArgument(_))
        ));
    }

    #[test]
    fn amqp_uri_carries_credentials_and_vhost() {
        let opts = ConnectionOptions {
            user: "app".into(),
            password: "secret".into(),
            vhost: "/".into(),
            heartbeat: Some(15),
            ..Default::default()
        };
        let uri = opts.amqp_uri();

        assert_eq!(uri.authority.host, "localhost");
        assert_eq!(uri.authority.port, 5672);
        assert_eq!(uri.authority.userinfo.username, "app");
        assert_eq!(uri.authority.userinfo.password, "secret");
        assert_eq!(uri.vhost, "/");
        assert_eq!(uri.query.heartbeat, Some(15));
    }

    #[test]
    fn test_parse_env_falls_back_on_garbage() {
        env::set_var("DELAYED_JOBS_TEST_PORT", "abc");
        assert_eq!(parse_env::<u16>("DELAYED_JOBS_TEST_PORT"), None);
        env::set_var("DELAYED_JOBS_TEST_PORT", " 5674 ");
        assert_eq!(parse_env::<u16>("DELAYED_JOBS_TEST_PORT"), Some(5674));
        env::remove_var("DELAYED_JOBS_TEST_PORT");
    }
}
