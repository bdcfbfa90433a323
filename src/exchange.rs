// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! This module provides types for defining RabbitMQ exchanges. Exchanges are
//! the routing mechanism that distributes published messages to bound queues.
//! A definition carries the declaration options used when asserting the
//! exchange, the default publish options applied by publishers bound to it,
//! and an optional payload encoder overriding the JSON default.

use crate::{errors::AmqpError, handler::Encoder};
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable, ShortString},
};
use std::collections::BTreeMap;

/// Represents the types of exchanges available in RabbitMQ.
///
/// - Direct: routes messages to queues on an exact routing key match
/// - Fanout: broadcasts messages to all bound queues, ignoring routing keys
/// - Topic: routes messages by wildcard pattern matching of routing keys
/// - Headers: routes based on message header values instead of routing keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl TryInto<lapin::ExchangeKind> for ExchangeKind {
    type Error = AmqpError;

    fn try_into(self) -> Result<lapin::ExchangeKind, AmqpError> {
        match self {
            ExchangeKind::Direct => Ok(lapin::ExchangeKind::Direct),
            ExchangeKind::Fanout => Ok(lapin::ExchangeKind::Fanout),
            ExchangeKind::Topic => Ok(lapin::ExchangeKind::Topic),
            ExchangeKind::Headers => Ok(lapin::ExchangeKind::Headers),
        }
    }
}

/// Definition of a RabbitMQ exchange with its configuration parameters.
///
/// Implements the builder pattern. The kind defaults to Direct when not set,
/// matching the broker-side default used throughout this crate.
#[derive(Clone)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) delete: bool,
    pub(crate) durable: bool,
    pub(crate) passive: bool,
    pub(crate) internal: bool,
    pub(crate) no_wait: bool,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
    pub(crate) publish_options: BasicPublishOptions,
    pub(crate) encode: Option<Encoder>,
    pub(crate) content_type: Option<String>,
}

impl std::fmt::Debug for ExchangeDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("delete", &self.delete)
            .field("durable", &self.durable)
            .field("passive", &self.passive)
            .field("internal", &self.internal)
            .field("no_wait", &self.no_wait)
            .field("params", &self.params)
            .field("publish_options", &self.publish_options)
            .field("encode", &self.encode.as_ref().map(|_| ".."))
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl ExchangeDefinition {
    /// Creates a new exchange definition with the given name and default
    /// settings (direct, non-durable, no custom parameters).
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            delete: false,
            durable: false,
            passive: false,
            internal: false,
            no_wait: false,
            params: BTreeMap::default(),
            publish_options: BasicPublishOptions::default(),
            encode: None,
            content_type: None,
        }
    }

    /// Sets the exchange type.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the exchange type to Direct.
    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    /// Sets the exchange type to Fanout.
    pub fn fanout(mut self) -> Self {
        self.kind = ExchangeKind::Fanout;
        self
    }

    /// Sets the exchange type to Topic.
    pub fn topic(mut self) -> Self {
        self.kind = ExchangeKind::Topic;
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the exchange passive, checking for existence without creating it.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    /// Makes the exchange internal, preventing direct publishing.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Sets the no_wait flag, making the declaration non-blocking.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Adds a single declaration parameter to the exchange.
    pub fn param(mut self, key: ShortString, value: AMQPValue) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Sets the default publish options used by publishers bound to this
    /// exchange when a publish request carries none of its own.
    pub fn publish_options(mut self, options: BasicPublishOptions) -> Self {
        self.publish_options = options;
        self
    }

    /// Sets a custom payload encoder, overriding the JSON default.
    pub fn encode(mut self, encode: Encoder) -> Self {
        self.encode = Some(encode);
        self
    }

    /// Sets the content type stamped on messages published through this
    /// exchange. Without it, publishes encoded by the JSON default are
    /// stamped `application/json` and custom-encoded ones carry no content
    /// type.
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    pub(crate) fn declare_options(&self) -> lapin::options::ExchangeDeclareOptions {
        lapin::options::ExchangeDeclareOptions {
            passive: self.passive,
            durable: self.durable,
            auto_delete: self.delete,
            internal: self.internal,
            nowait: self.no_wait,
        }
    }

    pub(crate) fn declare_params(&self) -> FieldTable {
        FieldTable::from(self.params.clone())
    }
}
