// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! This module provides the per-exchange publish facade. A publisher is
//! created through [`Publisher::bind`], which resolves the exchange
//! definition, asserts the exchange on the live channel, and fixes the
//! instance to it. `publish` then accepts either a bare payload or a full
//! [`PublishRequest`], resolves the encoder and publish options, and performs
//! a confirm-mode publish; the broker's acknowledgement is delivered to the
//! optional completion callback.

use crate::{
    channel::ChannelProvider,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    handler::{default_encode, Encoder},
    topology::TopologyBinder,
};
use lapin::{
    options::BasicPublishOptions, publisher_confirm::Confirmation, types::ShortString,
    BasicProperties,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Invoked once the broker acknowledges or rejects a confirm-mode publish.
pub type ConfirmCallback = Box<dyn FnOnce(Result<(), AmqpError>) + Send>;

/// A single outbound publish.
///
/// Anything left unset falls back to the bound exchange's defaults: empty
/// routing key, the exchange's publish options, and its encoder (or the JSON
/// default). Bare payloads coerce into a request through the `From` impls.
pub struct PublishRequest {
    pub payload: Value,
    pub routing_key: String,
    pub options: Option<BasicPublishOptions>,
    pub encode: Option<Encoder>,
    pub callback: Option<ConfirmCallback>,
}

impl PublishRequest {
    pub fn new(payload: Value) -> PublishRequest {
        PublishRequest {
            payload,
            routing_key: String::new(),
            options: None,
            encode: None,
            callback: None,
        }
    }

    /// Sets the routing key for this publish.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Overrides the exchange's default publish options for this publish.
    pub fn options(mut self, options: BasicPublishOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Overrides the exchange's encoder for this publish.
    pub fn encode(mut self, encode: Encoder) -> Self {
        self.encode = Some(encode);
        self
    }

    /// Sets the completion callback invoked with the broker's confirmation.
    pub fn callback(mut self, callback: ConfirmCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl From<Value> for PublishRequest {
    fn from(payload: Value) -> PublishRequest {
        PublishRequest::new(payload)
    }
}

impl From<&str> for PublishRequest {
    fn from(payload: &str) -> PublishRequest {
        PublishRequest::new(Value::String(payload.to_owned()))
    }
}

impl From<String> for PublishRequest {
    fn from(payload: String) -> PublishRequest {
        PublishRequest::new(Value::String(payload))
    }
}

/// Per-exchange publish facade over the shared confirm channel.
///
/// Ownership of a publisher is the caller's; every instance resolves the
/// channel through its provider on each publish, so channel recreation is
/// transparent to it.
pub struct Publisher {
    provider: Arc<dyn ChannelProvider>,
    exchange: ExchangeDefinition,
}

impl Publisher {
    /// Resolves the exchange definition, asserts the exchange on the active
    /// channel, and fixes this publisher to it for all subsequent calls.
    pub async fn bind(
        provider: Arc<dyn ChannelProvider>,
        exchange: &str,
    ) -> Result<Publisher, AmqpError> {
        let def = provider
            .exchange_definition(exchange)
            .ok_or_else(|| AmqpError::MissingExchangeDefinition(exchange.to_owned()))?;

        let channel = provider.channel().await?;
        TopologyBinder::new(channel).declare_exchange(&def).await?;

        info!("publisher initialized - exchange: {}", def.name);

        Ok(Publisher {
            provider,
            exchange: def,
        })
    }

    /// Publishes to the bound exchange with confirm semantics.
    ///
    /// Returns once the frame is accepted by the client; the broker's
    /// ack/nack reaches the request's callback from a spawned task. A
    /// rejected publish is never retried here.
    pub async fn publish(&self, request: impl Into<PublishRequest>) -> Result<(), AmqpError> {
        let request = request.into();

        let data = encode_payload(&request, &self.exchange)?;
        let options = request.options.unwrap_or(self.exchange.publish_options);

        let mut properties =
            BasicProperties::default().with_message_id(ShortString::from(Uuid::new_v4().to_string()));
        if let Some(content_type) = resolve_content_type(&request, &self.exchange) {
            properties = properties.with_content_type(ShortString::from(content_type));
        }

        let channel = self.provider.channel().await?;
        let confirm = match channel
            .basic_publish(
                &self.exchange.name,
                &request.routing_key,
                options,
                &data,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            Ok(confirm) => Ok(confirm),
        }?;

        if let Some(callback) = request.callback {
            tokio::spawn(async move {
                let outcome = match confirm.await {
                    Ok(Confirmation::Nack(_)) => Err(AmqpError::PublishRejectedError),
                    Ok(_) => Ok(()),
                    Err(err) => {
                        error!(error = err.to_string(), "error awaiting publish confirm");
                        Err(AmqpError::PublishingError)
                    }
                };
                callback(outcome);
            });
        }

        Ok(())
    }
}

/// Content-type resolution: the exchange's configured content type wins;
/// otherwise messages produced by the JSON default encoder are stamped
/// `application/json` and custom-encoded ones carry no content type, since
/// only the encoder knows what it wrote.
pub(crate) fn resolve_content_type(
    request: &PublishRequest,
    exchange: &ExchangeDefinition,
) -> Option<String> {
    if let Some(content_type) = exchange.content_type.as_ref() {
        return Some(content_type.clone());
    }

    if request.encode.is_some() || exchange.encode.is_some() {
        return None;
    }

    Some(JSON_CONTENT_TYPE.to_owned())
}

/// Encoder resolution: per-call encoder, then the exchange default, then
/// JSON serialization.
pub(crate) fn encode_payload(
    request: &PublishRequest,
    exchange: &ExchangeDefinition,
) -> Result<Vec<u8>, AmqpError> {
    match request.encode.as_ref().or(exchange.encode.as_ref()) {
        Some(encode) => encode(&request.payload),
        None => default_encode(&request.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_string_payload_coerces_to_defaulted_request() {
        let request = PublishRequest::from("hello");

        assert_eq!(request.payload, Value::String("hello".to_owned()));
        assert_eq!(request.routing_key, "");
        assert!(request.options.is_none());
        assert!(request.encode.is_none());
        assert!(request.callback.is_none());
    }

    #[test]
    fn default_encoder_is_json() {
        let request = PublishRequest::new(json!({ "id": 7 }));
        let exchange = ExchangeDefinition::new("events");

        let data = encode_payload(&request, &exchange).unwrap();
        assert_eq!(data, serde_json::to_vec(&json!({ "id": 7 })).unwrap());
    }

    #[test]
    fn exchange_encoder_overrides_the_json_default() {
        let request = PublishRequest::new(json!("payload"));
        let exchange = ExchangeDefinition::new("events")
            .encode(Arc::new(|_| Ok(b"exchange-encoded".to_vec())));

        let data = encode_payload(&request, &exchange).unwrap();
        assert_eq!(data, b"exchange-encoded");
    }

    #[test]
    fn per_call_encoder_overrides_the_exchange_default() {
        let request = PublishRequest::new(json!("payload"))
            .encode(Arc::new(|_| Ok(b"call-encoded".to_vec())));
        let exchange = ExchangeDefinition::new("events")
            .encode(Arc::new(|_| Ok(b"exchange-encoded".to_vec())));

        let data = encode_payload(&request, &exchange).unwrap();
        assert_eq!(data, b"call-encoded");
    }

    #[test]
    fn json_encoded_publishes_are_stamped_application_json() {
        let request = PublishRequest::new(json!({ "id": 7 }));
        let exchange = ExchangeDefinition::new("events");

        assert_eq!(
            resolve_content_type(&request, &exchange),
            Some(JSON_CONTENT_TYPE.to_owned())
        );
    }

    #[test]
    fn custom_encoded_publishes_carry_no_content_type() {
        let by_exchange = PublishRequest::new(json!("payload"));
        let exchange = ExchangeDefinition::new("events")
            .encode(Arc::new(|_| Ok(b"exchange-encoded".to_vec())));
        assert_eq!(resolve_content_type(&by_exchange, &exchange), None);

        let by_call = PublishRequest::new(json!("payload"))
            .encode(Arc::new(|_| Ok(b"call-encoded".to_vec())));
        let plain = ExchangeDefinition::new("events");
        assert_eq!(resolve_content_type(&by_call, &plain), None);
    }

    #[test]
    fn configured_content_type_wins_over_encoder_inference() {
        let request = PublishRequest::new(json!("payload"))
            .encode(Arc::new(|_| Ok(b"call-encoded".to_vec())));
        let exchange = ExchangeDefinition::new("events")
            .content_type("application/msgpack");

        assert_eq!(
            resolve_content_type(&request, &exchange),
            Some("application/msgpack".to_owned())
        );
    }
}
