use crate::db::models::PollResults;
use tokio::sync::mpsc;

/// Creates the conduit between successful votes and the broadcaster.
///
/// The queue is unbounded: a vote never waits on, or is dropped because of,
/// a slow broadcaster. It closes once every [`ResultsSender`] is dropped.
pub fn results_channel() -> (ResultsSender, ResultsReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultsSender { tx }, ResultsReceiver { rx })
}

#[derive(Clone, Debug)]
pub struct ResultsSender {
    tx: mpsc::UnboundedSender<PollResults>,
}

impl ResultsSender {
    /// Enqueues a snapshot without blocking. Returns `false` if the
    /// broadcaster has already stopped.
    pub fn publish(&self, results: PollResults) -> bool {
        match self.tx.send(results) {
            Ok(()) => true,
            Err(rejected) => {
                warn!(
                    poll_id = %rejected.0.poll_id,
                    "broadcaster stopped, dropping poll results"
                );
                false
            }
        }
    }
}

#[derive(Debug)]
pub struct ResultsReceiver {
    rx: mpsc::UnboundedReceiver<PollResults>,
}

impl ResultsReceiver {
    /// Waits for the next snapshot. `None` once all senders are gone.
    pub async fn recv(&mut self) -> Option<PollResults> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn results(question: &str) -> PollResults {
        PollResults {
            poll_id: Uuid::new_v4(),
            question: question.to_string(),
            options: vec![],
            votes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn preserves_order_from_one_producer() {
        let (tx, mut rx) = results_channel();
        for q in ["a", "b", "c"] {
            assert!(tx.publish(results(q)));
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(r) = rx.recv().await {
            seen.push(r.question);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn publish_never_blocks_without_a_consumer_reading() {
        let (tx, _rx) = results_channel();
        for i in 0..10_000 {
            assert!(tx.publish(results(&i.to_string())));
        }
    }

    #[tokio::test]
    async fn publish_after_receiver_dropped_reports_false() {
        let (tx, rx) = results_channel();
        drop(rx);
        assert!(!tx.publish(results("late")));
    }
}
