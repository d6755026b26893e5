//! In-process domain event bus.
//!
//! Each subscription owns a bounded queue. `publish` hands every matching
//! subscription its own `Arc` of the event; what happens when a queue is full
//! is decided by the configured [`OverflowPolicy`].

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {
    futures::future::join_all,
    herald_config::{BusConfig, OverflowPolicy},
    tokio::sync::mpsc::{self, error::TrySendError},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{bus as bus_metrics, counter, gauge, labels};

use crate::{DomainEvent, Topic, error::BusError};

/// Outcome of a single `publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub topic: Topic,
    /// Subscriptions interested in the topic.
    pub matched: usize,
    /// Copies enqueued.
    pub delivered: usize,
    /// Copies dropped because the subscriber's queue was full.
    pub dropped: usize,
    /// Subscriptions found closed during this publish.
    pub closed: usize,
}

struct Subscriber {
    id: u64,
    topics: HashSet<Topic>,
    tx: mpsc::Sender<Arc<DomainEvent>>,
}

struct BusInner {
    capacity: usize,
    overflow: OverflowPolicy,
    subscribers: Mutex<Vec<Subscriber>>,
    closed: AtomicBool,
    next_id: AtomicU64,
}

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                overflow,
                subscribers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(config.capacity, config.overflow)
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.inner.overflow
    }

    /// Register interest in `topics`. Overlapping topic sets across
    /// subscriptions are fine: each gets its own copy.
    pub fn subscribe(&self, topics: &[Topic]) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let topics: HashSet<Topic> = topics.iter().copied().collect();

        let count = {
            let mut subs = self.lock();
            subs.push(Subscriber {
                id,
                topics: topics.clone(),
                tx,
            });
            subs.len()
        };
        debug!(subscription = id, topics = topics.len(), "subscribed to event bus");
        #[cfg(feature = "metrics")]
        gauge!(bus_metrics::SUBSCRIBERS).set(count as f64);
        #[cfg(not(feature = "metrics"))]
        let _ = count;

        Ok(Subscription { id, topics, rx })
    }

    /// Fan an event out to every subscription interested in its topic.
    ///
    /// With [`OverflowPolicy::Block`] this waits for queue space, so a slow
    /// subscriber applies back-pressure to publishers. Sends run
    /// concurrently, so subscribers with room get the event right away. With
    /// [`OverflowPolicy::DropNewest`] a full queue loses this event for that
    /// subscriber only.
    pub async fn publish(&self, event: DomainEvent) -> Result<PublishReport, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let event = Arc::new(event);
        let topic = event.topic();

        // Snapshot senders, never hold the lock across an await.
        let targets: Vec<(u64, mpsc::Sender<Arc<DomainEvent>>)> = {
            let mut subs = self.lock();
            subs.retain(|s| !s.tx.is_closed());
            subs.iter()
                .filter(|s| s.topics.contains(&topic))
                .map(|s| (s.id, s.tx.clone()))
                .collect()
        };

        let mut report = PublishReport {
            topic,
            matched: targets.len(),
            delivered: 0,
            dropped: 0,
            closed: 0,
        };

        match self.inner.overflow {
            // Concurrent sends: a full queue only holds up its own subscriber.
            OverflowPolicy::Block => {
                let sends = targets
                    .iter()
                    .map(|(_, tx)| tx.send(Arc::clone(&event)));
                for result in join_all(sends).await {
                    match result {
                        Ok(()) => report.delivered += 1,
                        Err(_) => report.closed += 1,
                    }
                }
            },
            OverflowPolicy::DropNewest => {
                for (id, tx) in &targets {
                    match tx.try_send(Arc::clone(&event)) {
                        Ok(()) => report.delivered += 1,
                        Err(TrySendError::Full(_)) => {
                            warn!(subscription = *id, topic = %topic, "subscriber queue full, dropping event");
                            #[cfg(feature = "metrics")]
                            counter!(bus_metrics::EVENTS_DROPPED_TOTAL, labels::TOPIC => topic.as_str())
                                .increment(1);
                            report.dropped += 1;
                        },
                        Err(TrySendError::Closed(_)) => report.closed += 1,
                    }
                }
            },
        }

        if report.closed > 0 {
            self.prune();
        }

        #[cfg(feature = "metrics")]
        {
            counter!(bus_metrics::EVENTS_PUBLISHED_TOTAL, labels::TOPIC => topic.as_str())
                .increment(1);
            counter!(bus_metrics::EVENTS_DELIVERED_TOTAL, labels::TOPIC => topic.as_str())
                .increment(report.delivered as u64);
        }
        debug!(
            topic = %topic,
            matched = report.matched,
            delivered = report.delivered,
            dropped = report.dropped,
            "published event"
        );
        Ok(report)
    }

    /// Stop accepting events and subscriptions. Subscribers drain what is
    /// already queued, then `recv` returns `None`.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = std::mem::take(&mut *self.lock());
        debug!(subscribers = dropped.len(), "event bus closed");
        #[cfg(feature = "metrics")]
        gauge!(bus_metrics::SUBSCRIBERS).set(0.0);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Live subscriptions (closed ones are only pruned on publish).
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn prune(&self) {
        let remaining = {
            let mut subs = self.lock();
            subs.retain(|s| !s.tx.is_closed());
            subs.len()
        };
        #[cfg(feature = "metrics")]
        gauge!(bus_metrics::SUBSCRIBERS).set(remaining as f64);
        #[cfg(not(feature = "metrics"))]
        let _ = remaining;
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Receiving end of a bus subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    topics: HashSet<Topic>,
    rx: mpsc::Receiver<Arc<DomainEvent>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topics(&self) -> &HashSet<Topic> {
        &self.topics
    }

    /// Next event, or `None` once the bus is closed and the queue drained.
    pub async fn recv(&mut self) -> Option<Arc<DomainEvent>> {
        self.rx.recv().await
    }

    /// Non-blocking receive; `None` when nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<Arc<DomainEvent>> {
        self.rx.try_recv().ok()
    }
}
