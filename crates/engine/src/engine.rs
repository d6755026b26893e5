use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    herald_bots::{BotProcessor, BotTransport, DryRunTransport, HttpBotTransport},
    herald_config::HeraldConfig,
    herald_events::{BusError, DomainEvent, EventBus, PublishReport},
    herald_push::{DryRunGateway, HttpPushGateway, NotificationService, PushGateway},
    herald_repository::Repository,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

/// Whether outbound calls really leave the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    #[default]
    Live,
    /// Log webhook bodies and notifications instead of sending them.
    DryRun,
}

/// Events each consumer received before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub bot_events: usize,
    pub push_events: usize,
}

/// The event bus plus the consumers hanging off it.
pub struct Engine {
    bus: EventBus,
    bots: Option<Arc<BotProcessor>>,
    push: Option<Arc<NotificationService>>,
    cancel: CancellationToken,
    drain_timeout: Duration,
    bot_worker: Option<JoinHandle<usize>>,
    push_worker: Option<JoinHandle<usize>>,
}

impl Engine {
    /// Build an engine around explicit outbound adapters. Consumers disabled
    /// in `config` are not created.
    pub fn new(
        config: &HeraldConfig,
        repo: Arc<dyn Repository>,
        transport: Arc<dyn BotTransport>,
        gateway: Arc<dyn PushGateway>,
    ) -> Self {
        let bots = config
            .bots
            .enabled
            .then(|| Arc::new(BotProcessor::new(repo.clone(), transport, &config.bots)));
        let push = config.push.enabled.then(|| {
            Arc::new(NotificationService::new(
                repo,
                gateway,
                &config.origin,
                &config.push,
            ))
        });
        Self {
            bus: EventBus::from_config(&config.bus),
            bots,
            push,
            cancel: CancellationToken::new(),
            drain_timeout: config.engine.drain_timeout(),
            bot_worker: None,
            push_worker: None,
        }
    }

    /// Build an engine with HTTP adapters, or logging ones in dry-run mode.
    pub fn from_config(
        config: &HeraldConfig,
        repo: Arc<dyn Repository>,
        mode: DeliveryMode,
    ) -> anyhow::Result<Self> {
        let (transport, gateway): (Arc<dyn BotTransport>, Arc<dyn PushGateway>) = match mode {
            DeliveryMode::DryRun => (Arc::new(DryRunTransport), Arc::new(DryRunGateway)),
            DeliveryMode::Live => {
                let transport = HttpBotTransport::new(&config.bots)
                    .context("failed to build bot webhook client")?;
                let gateway: Arc<dyn PushGateway> = match &config.push.endpoint {
                    Some(endpoint) => Arc::new(
                        HttpPushGateway::new(
                            endpoint.clone(),
                            config.push.api_key(),
                            config.push.attempt_timeout(),
                        )
                        .context("failed to build push gateway client")?,
                    ),
                    None => {
                        if config.push.enabled {
                            warn!("push.endpoint is not set, notifications will only be logged");
                        }
                        Arc::new(DryRunGateway)
                    },
                };
                (Arc::new(transport), gateway)
            },
        };
        Ok(Self::new(config, repo, transport, gateway))
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe the consumers and spawn their workers.
    pub fn start(&mut self) -> Result<(), BusError> {
        if let Some(bots) = &self.bots
            && self.bot_worker.is_none()
        {
            self.bot_worker = Some(Arc::clone(bots).start(
                &self.bus,
                self.cancel.child_token(),
                self.drain_timeout,
            )?);
        }
        if let Some(push) = &self.push
            && self.push_worker.is_none()
        {
            self.push_worker = Some(Arc::clone(push).start(
                &self.bus,
                self.cancel.child_token(),
                self.drain_timeout,
            )?);
        }
        info!(
            bots = self.bot_worker.is_some(),
            push = self.push_worker.is_some(),
            overflow = ?self.bus.overflow(),
            "engine started"
        );
        Ok(())
    }

    pub async fn publish(&self, event: DomainEvent) -> Result<PublishReport, BusError> {
        self.bus.publish(event).await
    }

    /// Make workers stop receiving without waiting for queued events.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Close the bus and wait for the workers. Queued events are still
    /// handled unless [`Engine::cancel`] was called first.
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.bus.close();
        let report = ShutdownReport {
            bot_events: join_worker("bots", self.bot_worker.take()).await,
            push_events: join_worker("push", self.push_worker.take()).await,
        };
        info!(
            bot_events = report.bot_events,
            push_events = report.push_events,
            "engine stopped"
        );
        report
    }
}

async fn join_worker(name: &'static str, handle: Option<JoinHandle<usize>>) -> usize {
    let Some(handle) = handle else {
        return 0;
    };
    match handle.await {
        Ok(received) => received,
        Err(e) => {
            error!(worker = name, error = %e, "engine worker failed");
            0
        },
    }
}
