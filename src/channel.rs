// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! Opens the broker connection and the channel the publisher works on.

use crate::{config::ConnectionOptions, errors::DelayedJobError};
use lapin::{
    options::ConfirmSelectOptions, types::LongString, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Opens a connection to the broker described by `opts`.
pub async fn new_amqp_connection(
    opts: &ConnectionOptions,
) -> Result<Arc<Connection>, DelayedJobError> {
    debug!(endpoint = opts.endpoint(), "creating amqp connection...");
    if opts.automatic_recovery {
        debug!(
            interval = opts.network_recovery_interval,
            "automatic recovery is left to the transport"
        );
    }

    let properties = ConnectionProperties::default()
        .with_connection_name(LongString::from(opts.connection_name.clone()));

    match Connection::connect_uri(opts.amqp_uri(), properties).await {
        Ok(conn) => {
            debug!("amqp connected");
            Ok(Arc::new(conn))
        }
        Err(err) => {
            error!(
                error = err.to_string(),
                endpoint = opts.endpoint(),
                "failure to connect"
            );
            Err(DelayedJobError::ConnectionFailure(format!(
                "connect to {}: {}",
                opts.endpoint(),
                err
            )))
        }
    }
}

/// Creates a channel on `conn`, in confirm mode when `opts` asks for it.
pub async fn new_amqp_channel(
    conn: &Connection,
    opts: &ConnectionOptions,
) -> Result<Arc<Channel>, DelayedJobError> {
    debug!("creating amqp channel...");
    let channel = match conn.create_channel().await {
        Ok(c) => c,
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            return Err(DelayedJobError::ConnectionFailure(format!(
                "open channel: {}",
                err
            )));
        }
    };

    if opts.publisher_confirms {
        if let Err(err) = channel
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await
        {
            error!(error = err.to_string(), "error to enable publisher confirms");
            return Err(DelayedJobError::ConnectionFailure(format!(
                "enable publisher confirms: {}",
                err
            )));
        }
    }

    debug!(channel = channel.id(), "channel created");
    Ok(Arc::new(channel))
}
