//! Bot dispatch: pick the bots an event concerns, encode the event once, and
//! deliver it to each of them.

use std::{sync::Arc, time::Duration};

use {
    bytes::Bytes,
    chrono::Utc,
    futures::future::join_all,
    herald_common::model::{Bot, BotEventLogEntry, BotEventType, BotState},
    herald_config::BotsConfig,
    herald_events::{
        BotMembership, BotPing, BusError, ChannelCreated, DomainEvent, EventBus, MessageCreated,
        Topic, UserCreated, run_consumer,
    },
    herald_repository::Repository,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    uuid::Uuid,
};

#[cfg(feature = "metrics")]
use herald_metrics::{bots as bot_metrics, counter, histogram, labels};

use crate::{
    error::{DispatchError, Result},
    filter::{BotFilter, apply_filters},
    payload::{
        ChannelCreatedPayload, ChannelPayload, MembershipPayload, MessageCreatedPayload,
        MessagePayload, PingPayload, UserCreatedPayload, UserPayload, encode,
    },
    transport::{BotTransport, DeliveryOutcome},
};

/// Topics the bot processor subscribes to.
pub const TOPICS: &[Topic] = &[
    Topic::BotPing,
    Topic::BotJoined,
    Topic::BotLeft,
    Topic::MessageCreated,
    Topic::ChannelCreated,
    Topic::UserCreated,
];

/// What happened to one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Bot-facing event, `None` when the topic is not dispatched to bots.
    pub event: Option<BotEventType>,
    /// Bots left after filtering.
    pub candidates: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Whether a body was encoded at all.
    pub serialized: bool,
}

impl DispatchReport {
    fn skipped(event: BotEventType) -> Self {
        Self {
            event: Some(event),
            ..Self::default()
        }
    }
}

pub struct BotProcessor {
    repo: Arc<dyn Repository>,
    transport: Arc<dyn BotTransport>,
    delivery_timeout: Duration,
}

impl BotProcessor {
    pub fn new(
        repo: Arc<dyn Repository>,
        transport: Arc<dyn BotTransport>,
        config: &BotsConfig,
    ) -> Self {
        Self {
            repo,
            transport,
            delivery_timeout: config.delivery_timeout(),
        }
    }

    /// Subscribe to the bus and handle events in the background until
    /// `cancel` fires or the bus closes.
    pub fn start(
        self: Arc<Self>,
        bus: &EventBus,
        cancel: CancellationToken,
        drain_timeout: Duration,
    ) -> std::result::Result<JoinHandle<usize>, BusError> {
        let subscription = bus.subscribe(TOPICS)?;
        Ok(tokio::spawn(run_consumer(
            "bots",
            subscription,
            cancel,
            drain_timeout,
            move |event| {
                let processor = Arc::clone(&self);
                async move {
                    processor.handle(&event).await;
                }
            },
        )))
    }

    /// Dispatch an event, logging instead of returning failures.
    pub async fn handle(&self, event: &DomainEvent) -> Option<DispatchReport> {
        let topic = event.topic();
        #[cfg(feature = "metrics")]
        counter!(bot_metrics::EVENTS_TOTAL, labels::TOPIC => topic.as_str()).increment(1);

        match self.dispatch(event).await {
            Ok(report) => {
                debug!(
                    topic = %topic,
                    candidates = report.candidates,
                    delivered = report.delivered,
                    failed = report.failed,
                    "bot dispatch finished"
                );
                Some(report)
            },
            Err(e) => {
                error!(topic = %topic, error = %e, "bot dispatch abandoned");
                #[cfg(feature = "metrics")]
                counter!(bot_metrics::DISPATCH_ERRORS_TOTAL, labels::ERROR_TYPE => e.kind())
                    .increment(1);
                None
            },
        }
    }

    pub async fn dispatch(&self, event: &DomainEvent) -> Result<DispatchReport> {
        match event {
            DomainEvent::BotPing(e) => self.on_ping(e).await,
            DomainEvent::BotJoined(m) => self.on_membership(m, BotEventType::Joined).await,
            DomainEvent::BotLeft(m) => self.on_membership(m, BotEventType::Left).await,
            DomainEvent::MessageCreated(e) => self.on_message_created(e).await,
            DomainEvent::ChannelCreated(e) => self.on_channel_created(e).await,
            DomainEvent::UserCreated(e) => self.on_user_created(e).await,
            DomainEvent::Generic(_) => Ok(DispatchReport::default()),
        }
    }

    // ── Per-topic handlers ──────────────────────────────────────────────────

    async fn on_ping(&self, e: &BotPing) -> Result<DispatchReport> {
        let bot = match &e.bot {
            Some(bot) => bot.clone(),
            None => self
                .repo
                .get_bot(e.bot_id)
                .await
                .map_err(DispatchError::storage("get bot"))?,
        };

        let body = encode(BotEventType::Ping, &PingPayload {})?;
        let delivered = self.deliver(&bot, BotEventType::Ping, body).await;

        let next = BotState::after_ping(delivered);
        match self.repo.change_bot_state(bot.id, next).await {
            Ok(()) => {
                info!(bot_id = %bot.id, state = %next, "bot state updated after ping");
                #[cfg(feature = "metrics")]
                counter!(bot_metrics::STATE_CHANGES_TOTAL, labels::STATE => next.as_str())
                    .increment(1);
            },
            Err(err) => error!(bot_id = %bot.id, state = %next, error = %err, "failed to change bot state"),
        }

        Ok(DispatchReport {
            event: Some(BotEventType::Ping),
            candidates: 1,
            delivered: usize::from(delivered),
            failed: usize::from(!delivered),
            serialized: true,
        })
    }

    async fn on_membership(&self, m: &BotMembership, event: BotEventType) -> Result<DispatchReport> {
        let bot = self
            .repo
            .get_bot(m.bot_id)
            .await
            .map_err(DispatchError::storage("get bot"))?;
        let bots = apply_filters(vec![bot], &[BotFilter::State(BotState::Active)]);
        if bots.is_empty() {
            return Ok(DispatchReport::skipped(event));
        }

        let body = encode(event, &MembershipPayload {
            channel_id: m.channel_id,
        })?;
        Ok(self.multicast(event, body, bots).await)
    }

    async fn on_message_created(&self, e: &MessageCreated) -> Result<DispatchReport> {
        let event = BotEventType::MessageCreated;
        let channel_id = e.message.channel_id;
        let bots = self
            .repo
            .get_bots_by_channel(channel_id)
            .await
            .map_err(DispatchError::storage("get bots by channel"))?;
        let bots = apply_filters(bots, &[
            BotFilter::State(BotState::Active),
            BotFilter::Subscribes(event),
            BotFilter::ChannelMember(channel_id),
            BotFilter::NotSelf(e.message.user_id),
        ]);
        if bots.is_empty() {
            return Ok(DispatchReport::skipped(event));
        }

        let body = encode(event, &MessageCreatedPayload {
            message: MessagePayload::new(&e.message, &e.embedded, &e.plain),
        })?;
        Ok(self.multicast(event, body, bots).await)
    }

    async fn on_channel_created(&self, e: &ChannelCreated) -> Result<DispatchReport> {
        let event = BotEventType::ChannelCreated;
        if e.private {
            return Ok(DispatchReport::skipped(event));
        }

        let bots = self
            .repo
            .get_all_bots()
            .await
            .map_err(DispatchError::storage("get all bots"))?;
        let bots = apply_filters(bots, &[
            BotFilter::Privileged,
            BotFilter::State(BotState::Active),
            BotFilter::Subscribes(event),
        ]);
        if bots.is_empty() {
            return Ok(DispatchReport::skipped(event));
        }

        let channel = match &e.channel {
            Some(channel) => channel.clone(),
            None => self
                .repo
                .get_channel(e.channel_id)
                .await
                .map_err(DispatchError::storage("get channel"))?,
        };
        let path = self
            .repo
            .get_channel_path(e.channel_id)
            .await
            .map_err(DispatchError::storage("get channel path"))?;

        let body = encode(event, &ChannelCreatedPayload {
            channel: ChannelPayload::new(&channel, &path),
        })?;
        Ok(self.multicast(event, body, bots).await)
    }

    async fn on_user_created(&self, e: &UserCreated) -> Result<DispatchReport> {
        let event = BotEventType::UserCreated;
        let bots = self
            .repo
            .get_all_bots()
            .await
            .map_err(DispatchError::storage("get all bots"))?;
        let bots = apply_filters(bots, &[
            BotFilter::Privileged,
            BotFilter::State(BotState::Active),
            BotFilter::Subscribes(event),
        ]);
        if bots.is_empty() {
            return Ok(DispatchReport::skipped(event));
        }

        let user = match &e.user {
            Some(user) => user.clone(),
            None => self
                .repo
                .get_user(e.user_id)
                .await
                .map_err(DispatchError::storage("get user"))?,
        };

        let body = encode(event, &UserCreatedPayload {
            user: UserPayload::from(&user),
        })?;
        Ok(self.multicast(event, body, bots).await)
    }

    // ── Delivery ────────────────────────────────────────────────────────────

    /// Deliver the same body to every bot concurrently.
    async fn multicast(&self, event: BotEventType, body: Bytes, bots: Vec<Bot>) -> DispatchReport {
        let outcomes = join_all(
            bots.iter()
                .map(|bot| self.deliver(bot, event, body.clone())),
        )
        .await;
        let delivered = outcomes.iter().filter(|d| **d).count();
        DispatchReport {
            event: Some(event),
            candidates: bots.len(),
            delivered,
            failed: bots.len() - delivered,
            serialized: true,
        }
    }

    /// One bounded delivery attempt plus its audit log entry.
    async fn deliver(&self, bot: &Bot, event: BotEventType, body: Bytes) -> bool {
        let request_id = Uuid::new_v4();
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let outcome = tokio::time::timeout(
            self.delivery_timeout,
            self.transport
                .deliver(bot, event, request_id, body.clone()),
        )
        .await
        .unwrap_or_else(|_| {
            debug!(bot_id = %bot.id, event = %event, "bot delivery timed out");
            DeliveryOutcome::NOT_DELIVERED
        });

        #[cfg(feature = "metrics")]
        {
            histogram!(bot_metrics::DELIVERY_DURATION_SECONDS, labels::EVENT => event.as_str())
                .record(started.elapsed().as_secs_f64());
            let outcome_label = if outcome.delivered {
                "delivered"
            } else {
                "failed"
            };
            counter!(
                bot_metrics::DELIVERIES_TOTAL,
                labels::EVENT => event.as_str(),
                labels::OUTCOME => outcome_label
            )
            .increment(1);
        }

        if !outcome.delivered {
            warn!(
                bot_id = %bot.id,
                event = %event,
                status = ?outcome.status,
                "bot delivery failed"
            );
        }

        let entry = BotEventLogEntry {
            request_id,
            bot_id: bot.id,
            event,
            body: String::from_utf8_lossy(&body).into_owned(),
            status: outcome.status,
            delivered: outcome.delivered,
            created_at: Utc::now(),
        };
        if let Err(e) = self.repo.write_bot_event_log(&entry).await {
            error!(bot_id = %bot.id, %request_id, error = %e, "failed to write bot event log");
        }

        outcome.delivered
    }
}
