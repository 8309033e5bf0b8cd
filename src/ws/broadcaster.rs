use crate::db::models::PollResults;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::results_channel::ResultsReceiver;
use futures::future::join_all;
use std::time::Duration;

/// Outcome of fanning one snapshot out to the registry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Single consumer of the results channel. Runs until every sender is gone.
pub struct Broadcaster {
    registry: ConnectionRegistry,
    results: ResultsReceiver,
    write_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        registry: ConnectionRegistry,
        results: ResultsReceiver,
        write_timeout: Duration,
    ) -> Self {
        Broadcaster {
            registry,
            results,
            write_timeout,
        }
    }

    pub async fn run(mut self) {
        info!("broadcaster running");

        while let Some(results) = self.results.recv().await {
            let report = broadcast(&self.registry, &results, self.write_timeout).await;
            debug!(
                poll_id = %results.poll_id,
                delivered = report.delivered,
                dropped = report.dropped,
                "poll results broadcast"
            );
        }

        info!("results channel closed, broadcaster stopped");
    }
}

/// Writes `results` to every connection registered right now.
///
/// Writes run concurrently and each is bounded by `write_timeout`. A failed or
/// timed-out write removes and closes only that connection.
pub async fn broadcast(
    registry: &ConnectionRegistry,
    results: &PollResults,
    write_timeout: Duration,
) -> BroadcastReport {
    let payload = match serde_json::to_string(results) {
        Ok(payload) => payload,
        Err(e) => {
            error!(poll_id = %results.poll_id, "error marshaling poll results: {}", e);
            return BroadcastReport::default();
        }
    };

    let observers = registry.snapshot().await;
    let writes = observers.into_iter().map(|observer| {
        let payload = payload.clone();
        async move {
            let outcome = observer.send_text(payload, write_timeout).await;
            (observer, outcome)
        }
    });

    let mut report = BroadcastReport::default();
    for (observer, outcome) in join_all(writes).await {
        match outcome {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(connection_id = observer.id(), "dropping observer: {}", e);
                report.dropped += 1;
                if let Some(removed) = registry.remove(observer.id()).await {
                    tokio::spawn(async move { removed.close().await });
                }
            }
        }
    }

    report
}
