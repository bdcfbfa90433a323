// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Per-Delivery Consumption
//!
//! This module implements the handling of a single delivery: decode the
//! payload with the queue's decoder (JSON by default), invoke the bound
//! handler, then acknowledge or negatively acknowledge per the queue's nack
//! policy. A failing handler never tears down the dispatcher or the channel.

use crate::{
    errors::AmqpError,
    handler::{default_decode, ConsumerHandler, DeliveryInfo, InboundMessage},
    queue::{NackPolicy, QueueDefinition},
};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
};
use std::sync::Arc;
use tracing::{debug, error};

/// What to do with a delivery once the handler outcome is known.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    Ack,
    Nack { multiple: bool, requeue: bool },
}

pub(crate) fn disposition<T>(
    outcome: &Result<T, AmqpError>,
    policy: &NackPolicy,
) -> Disposition {
    match outcome {
        Ok(_) => Disposition::Ack,
        Err(_) => Disposition::Nack {
            multiple: policy.all_up_to,
            requeue: policy.requeue,
        },
    }
}

pub(crate) async fn consume(
    delivery: &Delivery,
    queue: &QueueDefinition,
    exchange: &str,
    handler: &Arc<dyn ConsumerHandler>,
) -> Result<(), AmqpError> {
    debug!(
        "received amqp message - exchange: {} queue: {} handler: {}",
        exchange,
        queue.name,
        handler.name(),
    );

    let decoded = match &queue.decode {
        Some(decode) => decode(&delivery.data),
        None => default_decode(&delivery.data),
    };

    let outcome = match decoded {
        Ok(payload) => {
            let msg = InboundMessage {
                payload,
                info: DeliveryInfo::from_delivery(delivery),
                properties: delivery.properties.clone(),
            };
            handler.exec(&msg).await
        }
        Err(err) => Err(err),
    };

    match disposition(&outcome, &queue.nack) {
        Disposition::Ack => match delivery.ack(BasicAckOptions { multiple: false }).await {
            Err(err) => {
                error!(error = err.to_string(), "error whiling ack msg");
                Err(AmqpError::AckMessageError)
            }
            _ => Ok(()),
        },
        Disposition::Nack { multiple, requeue } => {
            if let Err(err) = &outcome {
                error!(
                    error = err.to_string(),
                    queue = queue.name,
                    "handler failure, message will be nacked"
                );
            }

            match delivery.nack(BasicNackOptions { multiple, requeue }).await {
                Err(err) => {
                    error!(error = err.to_string(), "error whiling nack msg");
                    Err(AmqpError::NackMessageError)
                }
                _ => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockConsumerHandler;
    use lapin::BasicProperties;
    use serde_json::json;

    #[test]
    fn success_acknowledges_a_single_message() {
        let outcome: Result<(), AmqpError> = Ok(());
        let policy = NackPolicy::default();

        assert_eq!(disposition(&outcome, &policy), Disposition::Ack);
    }

    #[test]
    fn failure_nacks_with_the_queue_policy() {
        let outcome: Result<(), AmqpError> = Err(AmqpError::ConsumerError("boom".to_owned()));
        let policy = NackPolicy {
            all_up_to: true,
            requeue: true,
        };

        assert_eq!(
            disposition(&outcome, &policy),
            Disposition::Nack {
                multiple: true,
                requeue: true,
            }
        );
    }

    #[test]
    fn failure_discards_when_requeue_is_disabled() {
        let outcome: Result<(), AmqpError> = Err(AmqpError::ParsePayloadError);
        let policy = NackPolicy::default();

        assert_eq!(
            disposition(&outcome, &policy),
            Disposition::Nack {
                multiple: false,
                requeue: false,
            }
        );
    }

    #[tokio::test]
    async fn handler_failure_maps_to_nack_disposition() {
        let mut handler = MockConsumerHandler::new();
        handler
            .expect_exec()
            .returning(|_| Err(AmqpError::ConsumerError("handler failed".to_owned())));

        let msg = InboundMessage {
            payload: json!({ "id": 1 }),
            info: DeliveryInfo {
                exchange: "events".to_owned(),
                routing_key: "orders.created".to_owned(),
                delivery_tag: 1,
                redelivered: false,
            },
            properties: BasicProperties::default(),
        };

        let outcome = handler.exec(&msg).await;
        let policy = NackPolicy {
            all_up_to: false,
            requeue: true,
        };

        assert_eq!(
            disposition(&outcome, &policy),
            Disposition::Nack {
                multiple: false,
                requeue: true,
            }
        );
    }
}
