// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Client Layer
//!
//! This module provides the error taxonomy for the AMQP client layer. The
//! `AmqpError` enum covers connection and channel lifecycle failures, topology
//! declaration errors (fatal at startup), and the recoverable per-message
//! errors raised while consuming or publishing.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Topology errors (`MissingExchangeDefinition`, `MissingQueueDefinition`,
/// `DeclareExchangeError`, `DeclareQueueError`, `BindingError`) abort
/// initialization. Handler and publish-confirm errors are recovered locally
/// and never tear down the channel.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// There is no live channel to operate on
    #[error("channel is not available")]
    ChannelNotAvailable,

    /// A consumer references a queue with no definition in the configuration
    #[error("no queue definition found for queue `{0}`")]
    MissingQueueDefinition(String),

    /// A queue definition references an exchange with no definition in the configuration
    #[error("no exchange definition found for exchange `{0}`")]
    MissingExchangeDefinition(String),

    /// A non-fanout queue was configured without any binding patterns
    #[error("no binding patterns configured for queue `{0}`")]
    MissingBindingPatterns(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}`")]
    BindingError(String, String),

    /// Error configuring the channel prefetch
    #[error("failure to configure qos for queue `{0}`")]
    QosDeclarationError(String),

    /// Error starting a consumer on a queue
    #[error("failure to declare consumer for queue `{0}`")]
    BindingConsumerError(String),

    /// Error encoding or decoding a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// The broker negatively acknowledged a confirm-mode publish
    #[error("publish was rejected by the broker")]
    PublishRejectedError,

    /// The registered handler failed while processing a delivery
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),
}
