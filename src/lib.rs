// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod connection;
mod consumer;
mod dispatcher;
mod topology;

pub mod channel;
pub mod configs;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod publisher;
pub mod queue;
pub mod service;
