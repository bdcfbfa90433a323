// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module owns the single confirm-mode channel scoped to the active
//! connection. Channel creation retries on a fixed one-second interval until
//! it succeeds or the service lifecycle flag is cleared. The `ChannelProvider`
//! trait is the seam publishers use to reach the current channel and the
//! configured exchange definitions without owning either.

use crate::{errors::AmqpError, exchange::ExchangeDefinition, service::BrokerEvent};
use async_trait::async_trait;
use lapin::{options::ConfirmSelectOptions, Channel, Connection};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc::UnboundedSender, time::sleep};
use tracing::{debug, error, warn};

pub(crate) const CHANNEL_OPEN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Access to the live channel and exchange configuration, implemented by the
/// service and consumed by publishers.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// The current confirm channel, or an error when none is live.
    async fn channel(&self) -> Result<Arc<Channel>, AmqpError>;

    /// Looks up an exchange definition by name.
    fn exchange_definition(&self, name: &str) -> Option<ExchangeDefinition>;
}

pub(crate) struct ChannelManager {
    channel: Option<Arc<Channel>>,
}

impl ChannelManager {
    pub(crate) fn new() -> ChannelManager {
        ChannelManager { channel: None }
    }

    /// Creates a confirm-mode channel on `conn`, replacing any previous
    /// handle. On failure the attempt is repeated every second while
    /// `keep_open` stays set; clearing the flag stops the loop so teardown
    /// never races a channel being reopened.
    pub(crate) async fn open(
        &mut self,
        conn: &Connection,
        keep_open: &AtomicBool,
        events: UnboundedSender<BrokerEvent>,
        epoch: u64,
    ) -> Result<Arc<Channel>, AmqpError> {
        self.close().await;

        loop {
            match Self::try_open(conn, events.clone(), epoch).await {
                Ok(channel) => {
                    self.channel = Some(channel.clone());
                    return Ok(channel);
                }
                Err(err) => {
                    if !keep_open.load(Ordering::SeqCst) {
                        return Err(err);
                    }
                    warn!("retrying channel creation");
                    sleep(CHANNEL_OPEN_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn try_open(
        conn: &Connection,
        events: UnboundedSender<BrokerEvent>,
        epoch: u64,
    ) -> Result<Arc<Channel>, AmqpError> {
        debug!("creating amqp channel...");
        let channel = match conn.create_channel().await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }?;

        // A dying channel surfaces through this observer even when no
        // consumer stream is draining it, so publisher-only services still
        // recover. Events carry the channel epoch so observers on replaced
        // channels are ignored.
        channel.on_error(move |err| {
            error!(error = err.to_string(), "amqp channel error");
            let _ = events.send(BrokerEvent::ChannelClosed { epoch });
        });

        match channel
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await
        {
            Ok(_) => {
                debug!("channel created in confirm mode");
                Ok(Arc::new(channel))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to enable confirm mode");
                Err(AmqpError::ChannelError)
            }
        }
    }

    pub(crate) fn current(&self) -> Result<Arc<Channel>, AmqpError> {
        self.channel.clone().ok_or(AmqpError::ChannelNotAvailable)
    }

    /// Best-effort close, idempotent, never errors. Failures are logged and
    /// swallowed; the handle is cleared either way.
    pub(crate) async fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(err) = channel.close(200, "client shutdown").await {
                debug!(
                    error = err.to_string(),
                    "ignoring failure on best-effort channel close"
                );
            }
        }
    }
}
