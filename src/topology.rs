// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares the broker-side topology for a consumer binding:
//! the exchange, the queue, the bindings between them, and the channel-wide
//! prefetch. All declarations are idempotent broker operations, so
//! re-installing the same topology after a channel is recreated is safe.
//!
//! Binding rules follow the exchange kind: a fanout exchange is bound once
//! with an empty routing key regardless of configured patterns; any other
//! kind produces one binding per pattern.

use crate::{
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    queue::QueueDefinition,
};
use lapin::{
    options::{BasicQosOptions, QueueBindOptions},
    types::FieldTable,
    Channel,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Channel-wide prefetch: one unacknowledged delivery per consumer at a
/// time, favoring fairness over throughput.
pub(crate) const PREFETCH_COUNT: u16 = 1;

/// The routing keys a queue is bound with on the given exchange kind.
pub(crate) fn routing_keys(kind: &ExchangeKind, patterns: &[String]) -> Vec<String> {
    if *kind == ExchangeKind::Fanout {
        return vec![String::new()];
    }

    patterns.to_vec()
}

/// Declares the topology a consumer binding depends on.
pub(crate) struct TopologyBinder {
    channel: Arc<Channel>,
}

impl TopologyBinder {
    pub(crate) fn new(channel: Arc<Channel>) -> TopologyBinder {
        TopologyBinder { channel }
    }

    /// Asserts the exchange and queue, creates the bindings, and sets the
    /// prefetch. Returns the server-confirmed queue name, which is the name
    /// consumption must use.
    pub(crate) async fn install(
        &self,
        queue: &QueueDefinition,
        exchange: &ExchangeDefinition,
    ) -> Result<String, AmqpError> {
        self.declare_exchange(exchange).await?;
        let queue_name = self.declare_queue(queue).await?;

        for key in routing_keys(&exchange.kind, &queue.patterns) {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                queue_name, exchange.name, key
            );

            match self
                .channel
                .queue_bind(
                    &queue_name,
                    &exchange.name,
                    &key,
                    QueueBindOptions { nowait: false },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(error = err.to_string(), "error to bind queue to exchange");
                    Err(AmqpError::BindingError(
                        exchange.name.clone(),
                        queue_name.clone(),
                    ))
                }
                _ => Ok(()),
            }?;
        }

        match self
            .channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to configure prefetch");
                Err(AmqpError::QosDeclarationError(queue_name.clone()))
            }
            _ => Ok(()),
        }?;

        Ok(queue_name)
    }

    pub(crate) async fn declare_exchange(
        &self,
        def: &ExchangeDefinition,
    ) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name);

        match self
            .channel
            .exchange_declare(
                &def.name,
                def.kind.clone().try_into()?,
                def.declare_options(),
                def.declare_params(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => {
                debug!("exchange: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<String, AmqpError> {
        debug!("creating queue: {}", def.name);

        match self
            .channel
            .queue_declare(&def.name, def.declare_options(), FieldTable::default())
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to declare the queue");
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            Ok(queue) => {
                debug!("queue: {} was created", def.name);
                Ok(queue.name().to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| (*k).to_owned()).collect()
    }

    #[test]
    fn fanout_binds_once_with_empty_key_ignoring_patterns() {
        let keys = routing_keys(&ExchangeKind::Fanout, &patterns(&["a.b", "c.*"]));
        assert_eq!(keys, vec!["".to_owned()]);
    }

    #[test]
    fn direct_binds_once_per_pattern() {
        let keys = routing_keys(&ExchangeKind::Direct, &patterns(&["a", "b", "c"]));
        assert_eq!(keys, patterns(&["a", "b", "c"]));
    }

    #[test]
    fn topic_binds_once_per_pattern() {
        let keys = routing_keys(&ExchangeKind::Topic, &patterns(&["orders.*"]));
        assert_eq!(keys, patterns(&["orders.*"]));
    }
}
