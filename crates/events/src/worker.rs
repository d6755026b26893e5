//! Consumer loop shared by everything that subscribes to the bus.

use std::{future::Future, sync::Arc, time::Duration};

use {
    tokio::task::{JoinError, JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{DomainEvent, Subscription};

/// Receive events from `subscription` and run `handler` for each one in its
/// own task.
///
/// Returns when `cancel` fires or the bus closes. In-flight handlers then get
/// `drain_timeout` to finish before they are aborted. Returns the number of
/// events received.
pub async fn run_consumer<F, Fut>(
    name: &'static str,
    mut subscription: Subscription,
    cancel: CancellationToken,
    drain_timeout: Duration,
    handler: F,
) -> usize
where
    F: Fn(Arc<DomainEvent>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    let mut received = 0usize;
    info!(
        consumer = name,
        subscription = subscription.id(),
        topics = subscription.topics().len(),
        "event consumer started"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(consumer = name, "consumer cancelled");
                break;
            },
            Some(result) = tasks.join_next(), if !tasks.is_empty() => reap(name, result),
            event = subscription.recv() => match event {
                Some(event) => {
                    received += 1;
                    tasks.spawn(handler(event));
                },
                None => {
                    debug!(consumer = name, "event bus closed");
                    break;
                },
            },
        }
    }

    // Stop queueing more events for this consumer while draining.
    drop(subscription);

    if !tasks.is_empty() {
        let in_flight = tasks.len();
        if tokio::time::timeout(drain_timeout, drain(name, &mut tasks))
            .await
            .is_err()
        {
            warn!(
                consumer = name,
                in_flight,
                remaining = tasks.len(),
                "drain timed out, aborting remaining event tasks"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    info!(consumer = name, received, "event consumer stopped");
    received
}

async fn drain(name: &'static str, tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        reap(name, result);
    }
}

fn reap(name: &'static str, result: Result<(), JoinError>) {
    if let Err(e) = result
        && e.is_panic()
    {
        warn!(consumer = name, error = %e, "event task panicked");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{EventBus, Topic, event::BotMembership},
        herald_config::OverflowPolicy,
        std::sync::atomic::{AtomicUsize, Ordering},
        uuid::Uuid,
    };

    fn joined() -> DomainEvent {
        DomainEvent::BotJoined(BotMembership {
            bot_id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
        })
    }

    #[tokio::test]
    async fn handles_events_until_bus_closes() {
        let bus = EventBus::new(8, OverflowPolicy::Block);
        let sub = bus.subscribe(&[Topic::BotJoined]).unwrap();
        let handled = Arc::new(AtomicUsize::new(0));

        let worker = {
            let handled = Arc::clone(&handled);
            tokio::spawn(run_consumer(
                "test",
                sub,
                CancellationToken::new(),
                Duration::from_secs(1),
                move |_event| {
                    let handled = Arc::clone(&handled);
                    async move {
                        handled.fetch_add(1, Ordering::SeqCst);
                    }
                },
            ))
        };

        for _ in 0..3 {
            bus.publish(joined()).await.unwrap();
        }
        bus.close();

        assert_eq!(worker.await.unwrap(), 3);
        assert_eq!(handled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancel_waits_for_in_flight_tasks() {
        let bus = EventBus::new(8, OverflowPolicy::Block);
        let sub = bus.subscribe(&[Topic::BotJoined]).unwrap();
        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let worker = {
            let finished = Arc::clone(&finished);
            tokio::spawn(run_consumer(
                "test",
                sub,
                cancel.clone(),
                Duration::from_secs(5),
                move |_event| {
                    let finished = Arc::clone(&finished);
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                    }
                },
            ))
        };

        bus.publish(joined()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(worker.await.unwrap(), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_timeout_aborts_stuck_tasks() {
        let bus = EventBus::new(8, OverflowPolicy::Block);
        let sub = bus.subscribe(&[Topic::BotJoined]).unwrap();
        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let worker = {
            let finished = Arc::clone(&finished);
            tokio::spawn(run_consumer(
                "test",
                sub,
                cancel.clone(),
                Duration::from_millis(20),
                move |_event| {
                    let finished = Arc::clone(&finished);
                    async move {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                    }
                },
            ))
        };

        bus.publish(joined()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(worker.await.unwrap(), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
