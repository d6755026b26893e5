//! `message.created` → device notifications.

use std::{sync::Arc, time::Duration};

use {
    futures::future::join_all,
    herald_common::model::UserId,
    herald_config::PushConfig,
    herald_events::{BusError, DomainEvent, EventBus, MessageCreated, Topic, run_consumer},
    herald_repository::Repository,
    tokio::{sync::Semaphore, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, labels, push as push_metrics};

use crate::{
    audience::compute_audience,
    delivery::{RetryPolicy, TokenOutcome, send_with_retry},
    error::{NotifyError, Result},
    gateway::PushGateway,
    payload::{PayloadShaper, ShapeInput, select_thumbnail},
};

/// Topics the notification service subscribes to.
pub const TOPICS: &[Topic] = &[Topic::MessageCreated];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub recipients: usize,
    pub tokens: usize,
    pub delivered: usize,
    pub unregistered: usize,
    pub failed: usize,
}

pub struct NotificationService {
    repo: Arc<dyn Repository>,
    gateway: Arc<dyn PushGateway>,
    shaper: PayloadShaper,
    policy: RetryPolicy,
    max_concurrent_sends: usize,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn Repository>,
        gateway: Arc<dyn PushGateway>,
        origin: &str,
        config: &PushConfig,
    ) -> Self {
        Self {
            repo,
            gateway,
            shaper: PayloadShaper::new(origin),
            policy: RetryPolicy::from_config(config),
            max_concurrent_sends: config.max_concurrent_sends.max(1),
        }
    }

    pub fn start(
        self: Arc<Self>,
        bus: &EventBus,
        cancel: CancellationToken,
        drain_timeout: Duration,
    ) -> std::result::Result<JoinHandle<usize>, BusError> {
        let subscription = bus.subscribe(TOPICS)?;
        Ok(tokio::spawn(run_consumer(
            "push",
            subscription,
            cancel,
            drain_timeout,
            move |event| {
                let service = Arc::clone(&self);
                async move {
                    service.handle(&event).await;
                }
            },
        )))
    }

    /// Notify for a bus event, logging instead of returning failures. Events
    /// other than `message.created` are ignored.
    pub async fn handle(&self, event: &DomainEvent) -> Option<NotificationReport> {
        let DomainEvent::MessageCreated(created) = event else {
            return None;
        };
        #[cfg(feature = "metrics")]
        counter!(push_metrics::EVENTS_TOTAL).increment(1);

        match self.notify(created).await {
            Ok(report) => {
                debug!(
                    message_id = %created.message.id,
                    recipients = report.recipients,
                    tokens = report.tokens,
                    delivered = report.delivered,
                    unregistered = report.unregistered,
                    failed = report.failed,
                    "notifications sent"
                );
                Some(report)
            },
            Err(e) => {
                error!(message_id = %created.message.id, error = %e, "notification abandoned");
                #[cfg(feature = "metrics")]
                counter!(push_metrics::NOTIFY_ERRORS_TOTAL, labels::ERROR_TYPE => e.kind())
                    .increment(1);
                None
            },
        }
    }

    pub async fn notify(&self, event: &MessageCreated) -> Result<NotificationReport> {
        let message = &event.message;
        let repo = self.repo.as_ref();

        let channel = repo
            .get_channel(message.channel_id)
            .await
            .map_err(NotifyError::storage("get channel"))?;
        let private_members = repo
            .get_private_channel_member_ids(channel.id)
            .await
            .map_err(NotifyError::storage("get private channel members"))?;

        let recipients = compute_audience(
            repo,
            &channel,
            message.user_id,
            &event.embedded,
            &private_members,
        )
        .await?;
        #[cfg(feature = "metrics")]
        counter!(push_metrics::RECIPIENTS_TOTAL).increment(recipients.len() as u64);
        if recipients.is_empty() {
            return Ok(NotificationReport::default());
        }

        let sender = match repo.get_user(message.user_id).await {
            Ok(user) => Some(user),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(NotifyError::storage("get user")(e)),
        };
        let channel_path = repo
            .get_channel_path(channel.id)
            .await
            .map_err(NotifyError::storage("get channel path"))?;
        let thumbnail = select_thumbnail(repo, &event.embedded).await?;

        let payload = self.shaper.shape(&ShapeInput {
            message,
            plain: &event.plain,
            sender: sender.as_ref(),
            private_member_count: private_members.len(),
            channel_path: &channel_path,
            thumbnail,
        });

        let mut tokens: Vec<(UserId, String)> = Vec::new();
        for &user_id in &recipients {
            let found = repo
                .get_device_tokens_by_user_id(user_id)
                .await
                .map_err(NotifyError::storage("get device tokens"))?;
            tokens.extend(found.into_iter().map(|t| (user_id, t)));
        }

        let semaphore = Semaphore::new(self.max_concurrent_sends);
        let results = join_all(tokens.iter().map(|(user_id, token)| {
            let (semaphore, payload) = (&semaphore, &payload);
            async move {
                let _permit = semaphore.acquire().await;
                let result =
                    send_with_retry(self.gateway.as_ref(), repo, &self.policy, token, payload)
                        .await;
                if let Err(e) = &result {
                    warn!(%user_id, error = %e, "push to device failed");
                }
                result
            }
        }))
        .await;

        let mut report = NotificationReport {
            recipients: recipients.len(),
            tokens: tokens.len(),
            ..NotificationReport::default()
        };
        for result in &results {
            #[cfg(feature = "metrics")]
            crate::delivery::record_outcome(result);
            match result {
                Ok(TokenOutcome::Delivered { .. }) => report.delivered += 1,
                Ok(TokenOutcome::Unregistered { .. }) => report.unregistered += 1,
                Err(_) => report.failed += 1,
            }
        }
        Ok(report)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::PushError, payload::PushPayload},
        async_trait::async_trait,
        herald_common::model::{Channel, Message, User},
        herald_config::OverflowPolicy,
        herald_repository::{ChannelFixture, DeviceFixture, Fixture, MemoryRepository},
        std::{
            collections::HashMap,
            sync::{
                Mutex,
                atomic::{AtomicUsize, Ordering},
            },
        },
        uuid::Uuid,
    };

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(String, PushPayload)>>,
        errors: HashMap<String, PushError>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PushGateway for RecordingGateway {
        async fn send(&self, token: &str, payload: &PushPayload) -> std::result::Result<(), PushError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(err) = self.errors.get(token) {
                return Err(err.clone());
            }
            self.sent
                .lock()
                .unwrap()
                .push((token.to_owned(), payload.clone()));
            Ok(())
        }
    }

    struct World {
        repo: Arc<MemoryRepository>,
        channel: Channel,
        author: User,
        subscriber: User,
    }

    fn user(name: &str) -> User {
        serde_json::from_value(serde_json::json!({"id": Uuid::new_v4(), "name": name})).unwrap()
    }

    fn world(subscriber_tokens: &[&str]) -> World {
        let channel: Channel =
            serde_json::from_value(serde_json::json!({"id": Uuid::new_v4(), "name": "general"}))
                .unwrap();
        let (author, subscriber) = (user("alice"), user("sam"));
        let repo = Arc::new(MemoryRepository::from_fixture(Fixture {
            users: vec![author.clone(), subscriber.clone()],
            channels: vec![ChannelFixture {
                subscribers: vec![subscriber.id, author.id],
                ..ChannelFixture::from(channel.clone())
            }],
            devices: subscriber_tokens
                .iter()
                .map(|t| DeviceFixture {
                    user_id: subscriber.id,
                    token: (*t).to_owned(),
                })
                .chain(std::iter::once(DeviceFixture {
                    user_id: author.id,
                    token: "author-phone".into(),
                }))
                .collect(),
            ..Default::default()
        }));
        World {
            repo,
            channel,
            author,
            subscriber,
        }
    }

    fn created(author: &User, channel: &Channel, plain: &str) -> MessageCreated {
        let message: Message = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "user_id": author.id,
            "channel_id": channel.id,
            "text": plain,
        }))
        .unwrap();
        MessageCreated {
            message,
            embedded: Vec::new(),
            plain: plain.to_owned(),
        }
    }

    fn service(
        repo: &Arc<MemoryRepository>,
        gateway: &Arc<RecordingGateway>,
        config: &PushConfig,
    ) -> NotificationService {
        NotificationService::new(repo.clone(), gateway.clone(), "https://chat.example.com", config)
    }

    #[tokio::test(start_paused = true)]
    async fn subscriber_devices_get_the_notification() {
        let w = world(&["phone", "tablet", "stale"]);
        let gateway = Arc::new(RecordingGateway {
            errors: HashMap::from([("stale".to_owned(), PushError::NotRegistered)]),
            ..Default::default()
        });

        let report = service(&w.repo, &gateway, &PushConfig::default())
            .notify(&created(&w.author, &w.channel, "hello"))
            .await
            .unwrap();

        assert_eq!(report, NotificationReport {
            recipients: 1,
            tokens: 3,
            delivered: 2,
            unregistered: 1,
            failed: 0,
        });
        let sent = gateway.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(t, _)| t != "author-phone"));
        assert_eq!(sent[0].1.title, "#general");
        assert_eq!(sent[0].1.body, "alice: hello");
        assert_eq!(sent[0].1.path, "/channels/general");
        assert_eq!(w.repo.device_tokens(w.subscriber.id), vec![
            "phone".to_owned(),
            "tablet".to_owned()
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_token_does_not_stop_others() {
        let w = world(&["good", "broken"]);
        let gateway = Arc::new(RecordingGateway {
            errors: HashMap::from([("broken".to_owned(), PushError::internal("down"))]),
            ..Default::default()
        });

        let report = service(&w.repo, &gateway, &PushConfig::default())
            .notify(&created(&w.author, &w.channel, "hi"))
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_are_bounded() {
        let tokens: Vec<String> = (0..8).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let w = world(&refs);
        let gateway = Arc::new(RecordingGateway::default());
        let config = PushConfig {
            max_concurrent_sends: 2,
            ..PushConfig::default()
        };

        let report = service(&w.repo, &gateway, &config)
            .notify(&created(&w.author, &w.channel, "hi"))
            .await
            .unwrap();
        assert_eq!(report.delivered, 8);
        assert_eq!(gateway.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_audience_skips_shaping() {
        let author = user("alice");
        let channel: Channel =
            serde_json::from_value(serde_json::json!({"id": Uuid::new_v4(), "name": "quiet"}))
                .unwrap();
        let repo = Arc::new(MemoryRepository::from_fixture(Fixture {
            users: vec![author.clone()],
            channels: vec![ChannelFixture {
                subscribers: vec![author.id],
                ..ChannelFixture::from(channel.clone())
            }],
            ..Default::default()
        }));
        repo.fail_operation("get_channel_path");
        repo.fail_operation("get_user");
        let gateway = Arc::new(RecordingGateway::default());

        let report = service(&repo, &gateway, &PushConfig::default())
            .notify(&created(&author, &channel, "anyone?"))
            .await
            .unwrap();
        assert_eq!(report, NotificationReport::default());
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_error_abandons_event() {
        let w = world(&["phone"]);
        w.repo.fail_operation("get_channel");
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(&w.repo, &gateway, &PushConfig::default());
        let event = created(&w.author, &w.channel, "hi");

        assert!(svc.notify(&event).await.is_err());
        assert!(svc.handle(&DomainEvent::MessageCreated(event)).await.is_none());
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn device_token_lookup_failure_abandons_event() {
        let w = world(&["phone"]);
        w.repo.fail_operation("get_device_tokens_by_user_id");
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(&w.repo, &gateway, &PushConfig::default());

        let err = svc
            .notify(&created(&w.author, &w.channel, "hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("get device tokens"), "{err}");
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn worker_consumes_message_events() {
        let w = world(&["phone"]);
        let gateway = Arc::new(RecordingGateway::default());
        let bus = EventBus::new(4, OverflowPolicy::Block);
        let worker = Arc::new(service(&w.repo, &gateway, &PushConfig::default()))
            .start(&bus, CancellationToken::new(), Duration::from_secs(5))
            .unwrap();

        bus.publish(DomainEvent::MessageCreated(created(&w.author, &w.channel, "hi")))
            .await
            .unwrap();
        bus.close();

        assert_eq!(worker.await.unwrap(), 1);
        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
    }
}
