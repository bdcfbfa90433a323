// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! This module provides types for defining RabbitMQ queues. A definition
//! names the exchange the queue belongs to, the routing patterns that bind
//! it, the declaration and consume options, the nack policy applied when a
//! handler fails, and an optional payload decoder overriding the JSON
//! default.

use crate::handler::Decoder;
use lapin::options::{BasicConsumeOptions, QueueDeclareOptions};

/// How a delivery is negatively acknowledged after a handler failure.
///
/// `requeue` asks the broker to put the message back on the queue;
/// `all_up_to` nacks every unacknowledged delivery up to and including this
/// one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NackPolicy {
    pub all_up_to: bool,
    pub requeue: bool,
}

/// Definition of a RabbitMQ queue with its configuration parameters.
///
/// Implements the builder pattern. Consumption defaults to manual
/// acknowledgement; `no_ack` must be opted into explicitly.
#[derive(Clone, Default)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) exchange: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) passive: bool,
    pub(crate) no_wait: bool,
    pub(crate) consume: BasicConsumeOptions,
    pub(crate) nack: NackPolicy,
    pub(crate) decode: Option<Decoder>,
    pub(crate) patterns: Vec<String>,
}

impl std::fmt::Debug for QueueDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDefinition")
            .field("name", &self.name)
            .field("exchange", &self.exchange)
            .field("durable", &self.durable)
            .field("delete", &self.delete)
            .field("exclusive", &self.exclusive)
            .field("passive", &self.passive)
            .field("no_wait", &self.no_wait)
            .field("consume", &self.consume)
            .field("nack", &self.nack)
            .field("decode", &self.decode.as_ref().map(|_| ".."))
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name and default
    /// settings (non-durable, non-exclusive, manual ack, no patterns).
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..QueueDefinition::default()
        }
    }

    /// Sets the exchange this queue belongs to.
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange = exchange.to_owned();
        self
    }

    /// Adds a single routing pattern for binding this queue.
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.patterns.push(pattern.to_owned());
        self
    }

    /// Adds several routing patterns, each producing one binding.
    pub fn patterns(mut self, patterns: &[&str]) -> Self {
        self.patterns
            .extend(patterns.iter().map(|p| (*p).to_owned()));
        self
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Makes the queue passive, checking for existence without creating it.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    /// Sets the no_wait flag, making the declaration non-blocking.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Overrides the consume options passed to `basic_consume`.
    pub fn consume_options(mut self, options: BasicConsumeOptions) -> Self {
        self.consume = options;
        self
    }

    /// Disables manual acknowledgement for this queue's consumer.
    pub fn no_ack(mut self) -> Self {
        self.consume.no_ack = true;
        self
    }

    /// Sets the nack policy applied when a handler fails.
    pub fn nack_policy(mut self, policy: NackPolicy) -> Self {
        self.nack = policy;
        self
    }

    /// Sets a custom payload decoder, overriding the JSON default.
    pub fn decode(mut self, decode: Decoder) -> Self {
        self.decode = Some(decode);
        self
    }

    pub(crate) fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: self.passive,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.delete,
            nowait: self.no_wait,
        }
    }
}
