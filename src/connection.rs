// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection Management
//!
//! This module owns the single broker connection. The manager replaces the
//! connection handle on every (re)connect, never mutating a live one, and
//! wires the lapin error observer that reports connection loss to the
//! service supervisor.

use crate::{configs::ConnectionConfigs, errors::AmqpError, service::BrokerEvent};
use lapin::{types::LongString, Connection, ConnectionProperties};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

pub(crate) struct ConnectionManager {
    configs: ConnectionConfigs,
    connection: Option<Arc<Connection>>,
}

impl ConnectionManager {
    pub(crate) fn new(configs: ConnectionConfigs) -> ConnectionManager {
        ConnectionManager {
            configs,
            connection: None,
        }
    }

    /// Opens a new connection, replacing any previous handle.
    ///
    /// lapin reports a dying connection through the error observer; the
    /// error is logged and the closure is forwarded to the supervisor
    /// tagged with `epoch` so events from replaced connections are ignored.
    pub(crate) async fn connect(
        &mut self,
        events: UnboundedSender<BrokerEvent>,
        epoch: u64,
    ) -> Result<Arc<Connection>, AmqpError> {
        self.close().await;

        debug!("creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(self.configs.name.clone()));

        let conn = match Connection::connect(&self.configs.uri(), options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError)
            }
        }?;

        conn.on_error(move |err| {
            error!(error = err.to_string(), "amqp connection error");
            let _ = events.send(BrokerEvent::ConnectionClosed { epoch });
        });
        debug!("amqp connected");

        let conn = Arc::new(conn);
        self.connection = Some(conn.clone());
        Ok(conn)
    }

    pub(crate) fn current(&self) -> Result<Arc<Connection>, AmqpError> {
        self.connection
            .clone()
            .ok_or(AmqpError::ConnectionError)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map_or(false, |conn| conn.status().connected())
    }

    /// Best-effort close, idempotent. Failures are logged and swallowed so
    /// teardown always completes.
    pub(crate) async fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            if let Err(err) = conn.close(200, "client shutdown").await {
                debug!(
                    error = err.to_string(),
                    "ignoring failure on best-effort connection close"
                );
            }
        }
    }
}
