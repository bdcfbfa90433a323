// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Registration and Dispatch
//!
//! This module collects the `(queue, handler)` bindings registered by the
//! host application and starts one consumer task per bound queue. Bindings
//! are deduplicated by queue name, so registering the same queue twice never
//! creates two subscriptions.
//!
//! Each consumer task drains its delivery stream until the channel dies.
//! The stream ending is reported to the service supervisor tagged with the
//! channel epoch it belongs to, complementing the channel's own error
//! observer for closures the observer does not see (such as a cancelled
//! consumer).

use crate::{
    consumer::consume,
    errors::AmqpError,
    handler::ConsumerHandler,
    queue::QueueDefinition,
    service::BrokerEvent,
};
use futures_util::StreamExt;
use lapin::{types::FieldTable, Channel};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// A registered consumer: a queue name and the handler bound to it.
#[derive(Clone)]
pub struct ConsumerBinding {
    pub(crate) queue: String,
    pub(crate) handler: Arc<dyn ConsumerHandler>,
}

/// The set of consumer bindings, deduplicated by queue name.
#[derive(Default)]
pub(crate) struct ConsumerRegistry {
    bindings: Vec<ConsumerBinding>,
}

impl ConsumerRegistry {
    /// Registers a handler for a queue. Idempotent per queue name: a second
    /// registration for the same queue is dropped with a warning.
    pub(crate) fn register(&mut self, queue: &str, handler: Arc<dyn ConsumerHandler>) -> bool {
        if self.bindings.iter().any(|binding| binding.queue == queue) {
            warn!("consumer already registered for queue: {}", queue);
            return false;
        }

        self.bindings.push(ConsumerBinding {
            queue: queue.to_owned(),
            handler,
        });
        true
    }

    pub(crate) fn bindings(&self) -> Vec<ConsumerBinding> {
        self.bindings.clone()
    }
}

/// Subscribes the handler to its queue and spawns the dispatch task.
///
/// The subscription uses the queue's consume options, with manual
/// acknowledgement unless `no_ack` was explicitly enabled on the definition.
pub(crate) async fn start_consumer(
    channel: Arc<Channel>,
    queue: QueueDefinition,
    exchange: String,
    queue_name: String,
    handler: Arc<dyn ConsumerHandler>,
    events: UnboundedSender<BrokerEvent>,
    epoch: u64,
) -> Result<(), AmqpError> {
    let mut consumer = match channel
        .basic_consume(
            &queue_name,
            &queue.name,
            queue.consume,
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error to create the consumer");
            Err(AmqpError::BindingConsumerError(queue_name.clone()))
        }
        Ok(c) => Ok(c),
    }?;

    info!(
        "consumer initialized - exchange: {} queue: {}",
        exchange, queue_name
    );

    tokio::spawn(async move {
        while let Some(result) = consumer.next().await {
            match result {
                Ok(delivery) => {
                    if let Err(err) = consume(&delivery, &queue, &exchange, &handler).await {
                        error!(error = err.to_string(), "error consume msg");
                    }
                }

                Err(err) => error!(error = err.to_string(), "errors consume msg"),
            }
        }

        debug!("consumer stream ended for queue: {}", queue_name);
        let _ = events.send(BrokerEvent::ChannelClosed { epoch });
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockConsumerHandler;

    fn mock_handler() -> Arc<dyn ConsumerHandler> {
        Arc::new(MockConsumerHandler::new())
    }

    #[test]
    fn registering_the_same_queue_twice_keeps_one_binding() {
        let mut registry = ConsumerRegistry::default();

        assert!(registry.register("orders", mock_handler()));
        assert!(!registry.register("orders", mock_handler()));

        assert_eq!(registry.bindings().len(), 1);
    }

    #[test]
    fn distinct_queues_each_get_a_binding() {
        let mut registry = ConsumerRegistry::default();

        registry.register("orders", mock_handler());
        registry.register("payments", mock_handler());

        let queues: Vec<String> = registry
            .bindings()
            .iter()
            .map(|binding| binding.queue.clone())
            .collect();
        assert_eq!(queues, vec!["orders".to_owned(), "payments".to_owned()]);
    }
}
