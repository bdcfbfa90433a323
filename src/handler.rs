// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handler Contract
//!
//! This module defines the contract between the dispatcher and the host
//! application: the `ConsumerHandler` trait implemented by message handlers,
//! the `InboundMessage` passed to them, and the payload codec types with
//! their structured-JSON defaults.

use crate::errors::AmqpError;
use async_trait::async_trait;
use lapin::{message::Delivery, BasicProperties};
use serde_json::Value;
use std::sync::Arc;

/// Encodes a structured payload into the bytes published to the broker.
pub type Encoder = Arc<dyn Fn(&Value) -> Result<Vec<u8>, AmqpError> + Send + Sync>;

/// Decodes the raw bytes of a delivery into a structured payload.
pub type Decoder = Arc<dyn Fn(&[u8]) -> Result<Value, AmqpError> + Send + Sync>;

/// Default encoder: JSON serialization of the payload.
pub fn default_encode(payload: &Value) -> Result<Vec<u8>, AmqpError> {
    serde_json::to_vec(payload).map_err(|_| AmqpError::ParsePayloadError)
}

/// Default decoder: parse the raw bytes as a JSON document.
pub fn default_decode(data: &[u8]) -> Result<Value, AmqpError> {
    serde_json::from_slice(data).map_err(|_| AmqpError::ParsePayloadError)
}

/// Delivery metadata forwarded to handlers alongside the decoded payload.
#[derive(Debug, Clone)]
pub struct DeliveryInfo {
    pub exchange: String,
    pub routing_key: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
}

impl DeliveryInfo {
    pub(crate) fn from_delivery(delivery: &Delivery) -> DeliveryInfo {
        DeliveryInfo {
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
        }
    }
}

/// A single inbound delivery, scoped to one dispatch invocation.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: Value,
    pub info: DeliveryInfo,
    pub properties: BasicProperties,
}

/// Trait implemented by the host application's message handlers.
///
/// Returning `Ok` acknowledges the delivery; returning `Err` negatively
/// acknowledges it using the queue's nack policy. A handler failure is never
/// fatal to the dispatcher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, msg: &InboundMessage) -> Result<(), AmqpError>;

    /// Identity used in log lines for this handler.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_codec_round_trips_structured_payloads() {
        let payload = json!({ "id": 42, "tags": ["a", "b"], "ok": true });

        let encoded = default_encode(&payload).unwrap();
        let decoded = default_decode(&encoded).unwrap();

        assert_eq!(decoded, payload);
    }

    #[test]
    fn default_decode_rejects_invalid_json() {
        let err = default_decode(b"{not json").unwrap_err();
        assert_eq!(err, AmqpError::ParsePayloadError);
    }
}
