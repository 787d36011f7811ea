// src/services/events.rs

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::ledger::{SavingRecord, SavingType},
};

/// Facts published by the service ledger after they are committed.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    SavingRecorded {
        saving_id: Uuid,
        member_id: Uuid,
        amount: Decimal,
        transaction_type: SavingType,
    },
}

impl From<&SavingRecord> for LedgerEvent {
    fn from(saving: &SavingRecord) -> Self {
        LedgerEvent::SavingRecorded {
            saving_id: saving.id,
            member_id: saving.member_id,
            amount: saving.amount,
            transaction_type: saving.transaction_type,
        }
    }
}

/// Whoever reacts to ledger events (the payments ledger in production).
#[async_trait]
pub trait LedgerEventSink: Send + Sync {
    async fn handle(&self, event: &LedgerEvent) -> Result<(), AppError>;
}

// Sending half, lives in the ledger service
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<LedgerEvent>,
}

impl EventPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LedgerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Fire and forget. The caller's work is already committed, so a closed
    /// channel is only worth a log line.
    pub fn publish(&self, event: LedgerEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(event = ?e.0, "⚠️ Ledger event dropped: no consumer is running");
        }
    }
}

/// Drains the channel until every publisher is gone. Sink failures are logged
/// and the loop moves on to the next event.
pub fn spawn_consumer(
    mut rx: mpsc::UnboundedReceiver<LedgerEvent>,
    sink: Arc<dyn LedgerEventSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = sink.handle(&event).await {
                tracing::error!(?event, error = %e, "Ledger event consumer failed");
            }
        }
        tracing::info!("Ledger event consumer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<LedgerEvent>>,
    }

    #[async_trait]
    impl LedgerEventSink for Recorder {
        async fn handle(&self, event: &LedgerEvent) -> Result<(), AppError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    // Fails on the first event, records the rest
    #[derive(Default)]
    struct Flaky {
        calls: Mutex<usize>,
        recorded: Mutex<Vec<LedgerEvent>>,
    }

    #[async_trait]
    impl LedgerEventSink for Flaky {
        async fn handle(&self, event: &LedgerEvent) -> Result<(), AppError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                return Err(AppError::InternalServerError(anyhow::anyhow!("provider down")));
            }
            self.recorded.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn saving(amount: &str) -> LedgerEvent {
        LedgerEvent::SavingRecorded {
            saving_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            amount: amount.parse().unwrap(),
            transaction_type: SavingType::Deposit,
        }
    }

    #[tokio::test]
    async fn each_saving_reaches_the_sink_once() {
        let (publisher, rx) = EventPublisher::channel();
        let sink = Arc::new(Recorder::default());
        let handle = spawn_consumer(rx, sink.clone());

        let first = saving("500.00");
        let second = saving("2000.00");
        publisher.publish(first.clone());
        publisher.publish(second.clone());

        drop(publisher);
        handle.await.unwrap();

        assert_eq!(*sink.seen.lock().unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn sink_failure_does_not_stop_the_consumer() {
        let (publisher, rx) = EventPublisher::channel();
        let sink = Arc::new(Flaky::default());
        let handle = spawn_consumer(rx, sink.clone());

        publisher.publish(saving("500.00"));
        let survivor = saving("2000.00");
        publisher.publish(survivor.clone());

        drop(publisher);
        handle.await.unwrap();

        assert_eq!(*sink.calls.lock().unwrap(), 2);
        assert_eq!(*sink.recorded.lock().unwrap(), vec![survivor]);
    }

    #[tokio::test]
    async fn publishing_without_consumer_is_harmless() {
        let (publisher, rx) = EventPublisher::channel();
        drop(rx);
        publisher.publish(saving("10.00"));
    }
}
