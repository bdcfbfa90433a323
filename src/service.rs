// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Service Lifecycle
//!
//! This module ties the connection and channel managers, the topology
//! binder, and the dispatcher together behind a single service owned by the
//! host process. The host registers its consumers, calls [`AmqpService::init`]
//! at startup and [`AmqpService::shutdown`] at teardown; everything between —
//! reconnecting a lost connection, recreating a closed channel, re-declaring
//! topology and re-subscribing consumers — is driven by the supervisor task
//! and is invisible to callers beyond added latency.
//!
//! Recovery uses fixed delays: 3 seconds before a reconnect attempt, 3
//! seconds before a channel reopen, with at most one timer of each kind
//! pending at any instant. A failed attempt re-arms its own timer, producing
//! an unbounded retry loop with constant backoff until shutdown clears the
//! lifecycle flag.

use crate::{
    channel::{ChannelManager, ChannelProvider},
    configs::AmqpConfigs,
    connection::ConnectionManager,
    dispatcher::{self, ConsumerRegistry},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    handler::ConsumerHandler,
    topology::TopologyBinder,
};
use async_trait::async_trait;
use lapin::Channel;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex as StdMutex, Weak,
    },
    time::Duration,
};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        Mutex,
    },
    time::sleep,
};
use tracing::{debug, error, info, warn};

pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub(crate) const CHANNEL_REOPEN_DELAY: Duration = Duration::from_secs(3);

/// Failure notifications flowing from the broker observers and consumer
/// tasks to the supervisor. Events carry the epoch of the handle they refer
/// to so notifications from already-replaced handles are discarded.
pub(crate) enum BrokerEvent {
    ConnectionClosed { epoch: u64 },
    ChannelClosed { epoch: u64 },
}

struct Managers {
    connection: ConnectionManager,
    channel: ChannelManager,
}

/// The resilient AMQP client service.
///
/// Owns the single connection and the single confirm channel. Consumers are
/// registered before `init`; publishers reach the channel through the
/// [`ChannelProvider`] implementation.
pub struct AmqpService {
    configs: AmqpConfigs,
    managers: Mutex<Managers>,
    registry: StdMutex<ConsumerRegistry>,
    need_reconnect: AtomicBool,
    reconnect_armed: AtomicBool,
    reopen_armed: AtomicBool,
    conn_epoch: AtomicU64,
    chan_epoch: AtomicU64,
    events: UnboundedSender<BrokerEvent>,
    events_rx: StdMutex<Option<UnboundedReceiver<BrokerEvent>>>,
}

impl AmqpService {
    pub fn new(configs: AmqpConfigs) -> Arc<AmqpService> {
        let (tx, rx) = mpsc::unbounded_channel();

        Arc::new(AmqpService {
            managers: Mutex::new(Managers {
                connection: ConnectionManager::new(configs.connection.clone()),
                channel: ChannelManager::new(),
            }),
            configs,
            registry: StdMutex::new(ConsumerRegistry::default()),
            need_reconnect: AtomicBool::new(true),
            reconnect_armed: AtomicBool::new(false),
            reopen_armed: AtomicBool::new(false),
            conn_epoch: AtomicU64::new(0),
            chan_epoch: AtomicU64::new(0),
            events: tx,
            events_rx: StdMutex::new(Some(rx)),
        })
    }

    /// Registers a handler for a queue. Idempotent per distinct queue name.
    /// Registration must happen before `init`; later registrations only take
    /// effect on the next channel rebuild.
    pub fn register_consumer(&self, queue: &str, handler: Arc<dyn ConsumerHandler>) {
        self.registry.lock().unwrap().register(queue, handler);
    }

    /// Connects, opens the confirm channel, declares topology, starts every
    /// registered consumer, and spawns the recovery supervisor.
    ///
    /// Fails fast before any consumption starts when a registered queue or
    /// its exchange has no definition in the configuration.
    pub async fn init(self: &Arc<Self>) -> Result<(), AmqpError> {
        self.validate()?;
        self.need_reconnect.store(true, Ordering::SeqCst);

        self.bootstrap().await?;

        if let Some(rx) = self.events_rx.lock().unwrap().take() {
            tokio::spawn(Self::supervise(Arc::downgrade(self), rx));
        }

        info!("amqp service initialized");
        Ok(())
    }

    /// Cooperative teardown: clearing the lifecycle flag first prevents any
    /// new reconnect or reopen cycle from arming, then the channel and the
    /// connection are closed best-effort. Idempotent.
    pub async fn shutdown(&self) {
        self.need_reconnect.store(false, Ordering::SeqCst);

        let mut managers = self.managers.lock().await;
        managers.channel.close().await;
        managers.connection.close().await;

        info!("amqp service stopped");
    }

    fn validate(&self) -> Result<(), AmqpError> {
        let bindings = self.registry.lock().unwrap().bindings();
        for binding in &bindings {
            self.configs.resolve_binding(&binding.queue)?;
        }
        Ok(())
    }

    /// Rebuilds the whole stack: connection, channel, topology, consumers.
    async fn bootstrap(&self) -> Result<(), AmqpError> {
        let mut managers = self.managers.lock().await;
        managers.channel.close().await;

        let epoch = self.conn_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let conn = managers.connection.connect(self.events.clone(), epoch).await?;
        let chan_epoch = self.chan_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let channel = managers
            .channel
            .open(&conn, &self.need_reconnect, self.events.clone(), chan_epoch)
            .await?;
        drop(managers);

        self.install_consumers(channel, chan_epoch).await
    }

    /// Rebuilds the channel and everything above it on the live connection.
    async fn restore_channel(&self) -> Result<(), AmqpError> {
        let mut managers = self.managers.lock().await;
        let conn = managers.connection.current()?;
        let chan_epoch = self.chan_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let channel = managers
            .channel
            .open(&conn, &self.need_reconnect, self.events.clone(), chan_epoch)
            .await?;
        drop(managers);

        self.install_consumers(channel, chan_epoch).await
    }

    async fn install_consumers(&self, channel: Arc<Channel>, epoch: u64) -> Result<(), AmqpError> {
        let bindings = self.registry.lock().unwrap().bindings();
        let binder = TopologyBinder::new(channel.clone());

        for binding in bindings {
            let (queue, exchange) = self.configs.resolve_binding(&binding.queue)?;
            let queue_name = binder.install(queue, exchange).await?;

            dispatcher::start_consumer(
                channel.clone(),
                queue.clone(),
                exchange.name.clone(),
                queue_name,
                binding.handler,
                self.events.clone(),
                epoch,
            )
            .await?;
        }

        Ok(())
    }

    async fn supervise(svc: Weak<AmqpService>, mut events: UnboundedReceiver<BrokerEvent>) {
        while let Some(event) = events.recv().await {
            let Some(svc) = svc.upgrade() else { break };

            match event {
                BrokerEvent::ConnectionClosed { epoch } => {
                    if epoch != svc.conn_epoch.load(Ordering::SeqCst) {
                        debug!("ignoring close event from a replaced connection");
                        continue;
                    }
                    svc.schedule_reconnect();
                }
                BrokerEvent::ChannelClosed { epoch } => {
                    if epoch != svc.chan_epoch.load(Ordering::SeqCst) {
                        debug!("ignoring close event from a replaced channel");
                        continue;
                    }

                    // A consumer stream also ends when the whole connection
                    // goes away; recovery then belongs to the reconnect path,
                    // which rebuilds the channel too.
                    let connected = svc.managers.lock().await.connection.is_connected();
                    if connected {
                        svc.schedule_channel_reopen();
                    } else {
                        svc.schedule_reconnect();
                    }
                }
            }
        }
    }

    /// Arms the single reconnect timer, unless shutdown was requested or one
    /// is already pending. A failed attempt re-arms it.
    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.need_reconnect.load(Ordering::SeqCst) {
            debug!("connection closed during shutdown, reconnect suppressed");
            return;
        }
        if self.reconnect_armed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("connection lost, reconnecting in {:?}", RECONNECT_DELAY);

        let svc = self.clone();
        tokio::spawn(async move {
            sleep(RECONNECT_DELAY).await;
            svc.reconnect_armed.store(false, Ordering::SeqCst);

            if !svc.need_reconnect.load(Ordering::SeqCst) {
                return;
            }

            if let Err(err) = svc.bootstrap().await {
                error!(error = err.to_string(), "reconnect attempt failed");
                svc.schedule_reconnect();
            }
        });
    }

    /// Arms the single channel-reopen timer, unless shutdown was requested
    /// or one is already pending. The dead channel is closed best-effort
    /// before the delayed reopen.
    fn schedule_channel_reopen(self: &Arc<Self>) {
        if !self.need_reconnect.load(Ordering::SeqCst) {
            debug!("channel closed during shutdown, reopen suppressed");
            return;
        }
        if self.reopen_armed.swap(true, Ordering::SeqCst) {
            return;
        }

        warn!("channel closed, reopening in {:?}", CHANNEL_REOPEN_DELAY);

        let svc = self.clone();
        tokio::spawn(async move {
            svc.managers.lock().await.channel.close().await;
            sleep(CHANNEL_REOPEN_DELAY).await;
            svc.reopen_armed.store(false, Ordering::SeqCst);

            if !svc.need_reconnect.load(Ordering::SeqCst) {
                return;
            }
            if !svc.managers.lock().await.connection.is_connected() {
                debug!("connection is down, channel recovery deferred to reconnect");
                return;
            }

            if let Err(err) = svc.restore_channel().await {
                error!(error = err.to_string(), "channel reopen failed");
                svc.schedule_channel_reopen();
            }
        });
    }
}

#[async_trait]
impl ChannelProvider for AmqpService {
    async fn channel(&self) -> Result<Arc<Channel>, AmqpError> {
        self.managers.lock().await.channel.current()
    }

    fn exchange_definition(&self, name: &str) -> Option<ExchangeDefinition> {
        self.configs.find_exchange(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exchange::ExchangeDefinition, handler::MockConsumerHandler, queue::QueueDefinition};

    fn mock_handler() -> Arc<dyn ConsumerHandler> {
        Arc::new(MockConsumerHandler::new())
    }

    #[test]
    fn validation_fails_for_consumer_with_unknown_queue() {
        let svc = AmqpService::new(AmqpConfigs::default());
        svc.register_consumer("orders", mock_handler());

        let err = svc.validate().unwrap_err();
        assert_eq!(err, AmqpError::MissingQueueDefinition("orders".to_owned()));
    }

    #[test]
    fn validation_fails_for_queue_with_unknown_exchange() {
        let configs =
            AmqpConfigs::default().queue(QueueDefinition::new("orders").exchange("events"));
        let svc = AmqpService::new(configs);
        svc.register_consumer("orders", mock_handler());

        let err = svc.validate().unwrap_err();
        assert_eq!(err, AmqpError::MissingExchangeDefinition("events".to_owned()));
    }

    #[test]
    fn validation_passes_when_topology_resolves() {
        let configs = AmqpConfigs::default()
            .exchange(ExchangeDefinition::new("events"))
            .queue(QueueDefinition::new("orders").exchange("events").pattern("orders.*"));
        let svc = AmqpService::new(configs);
        svc.register_consumer("orders", mock_handler());

        assert!(svc.validate().is_ok());
    }

    #[test]
    fn duplicate_registration_keeps_a_single_binding() {
        let svc = AmqpService::new(AmqpConfigs::default());
        svc.register_consumer("orders", mock_handler());
        svc.register_consumer("orders", mock_handler());

        assert_eq!(svc.registry.lock().unwrap().bindings().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_suppresses_reconnect_and_reopen() {
        let svc = AmqpService::new(AmqpConfigs::default());
        svc.shutdown().await;

        svc.schedule_reconnect();
        svc.schedule_channel_reopen();

        assert!(!svc.reconnect_armed.load(Ordering::SeqCst));
        assert!(!svc.reopen_armed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stale_epoch_events_are_discarded() {
        let svc = AmqpService::new(AmqpConfigs::default());
        svc.conn_epoch.store(2, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(BrokerEvent::ConnectionClosed { epoch: 1 }).unwrap();
        drop(tx);

        AmqpService::supervise(Arc::downgrade(&svc), rx).await;

        assert!(!svc.reconnect_armed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn recovery_timers_arm_while_reconnect_enabled() {
        let svc = AmqpService::new(AmqpConfigs::default());

        svc.schedule_reconnect();
        svc.schedule_channel_reopen();

        assert!(svc.reconnect_armed.load(Ordering::SeqCst));
        assert!(svc.reopen_armed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn connection_close_event_arms_reconnect() {
        let svc = AmqpService::new(AmqpConfigs::default());
        svc.conn_epoch.store(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(BrokerEvent::ConnectionClosed { epoch: 1 }).unwrap();
        drop(tx);

        AmqpService::supervise(Arc::downgrade(&svc), rx).await;

        assert!(svc.reconnect_armed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn channel_close_event_without_consumers_arms_recovery() {
        // The channel observer reports closures even when no consumer stream
        // is draining the channel; with the connection also gone, recovery
        // routes to the reconnect path.
        let svc = AmqpService::new(AmqpConfigs::default());
        svc.chan_epoch.store(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(BrokerEvent::ChannelClosed { epoch: 1 }).unwrap();
        drop(tx);

        AmqpService::supervise(Arc::downgrade(&svc), rx).await;

        assert!(svc.reconnect_armed.load(Ordering::SeqCst));
    }
}
