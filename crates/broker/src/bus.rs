// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus: in-process fan-out plus optional broker pub/sub.
//!
//! Publishers are never blocked by slow subscribers: each subscriber owns a
//! bounded mailbox and events are dropped per-subscriber (with a log line)
//! when it fills. When a broker is configured, `publish` returns only after
//! the broker accepts the message, and a single background reader
//! re-broadcasts broker messages into the local mailboxes, so local
//! delivery always flows through exactly one path.

use futures_util::StreamExt;
use mm_core::Event;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{Broker, BrokerError};

/// Per-subscriber mailbox capacity.
pub const MAILBOX_CAPACITY: usize = 16;

struct BusInner {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
    broker: Option<Broker>,
}

/// Handle to the bus. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// A live subscription. Dropping it (or calling [`Subscription::cancel`])
/// removes the subscriber and closes its channel exactly once.
pub struct Subscription {
    id: u64,
    inner: Arc<BusInner>,
}

impl Subscription {
    pub fn cancel(self) {
        // Removal happens in Drop.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.subscribers.lock().remove(&self.id);
    }
}

impl EventBus {
    /// In-process only bus.
    pub fn new() -> Self {
        Self::with_broker(None)
    }

    /// Bus with optional broker pub/sub.
    pub fn with_broker(broker: Option<Broker>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                broker,
            }),
        }
    }

    /// Register a subscriber. Returns its receiver and a cancel guard.
    pub fn subscribe(&self) -> (mpsc::Receiver<Event>, Subscription) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().insert(id, tx);
        (rx, Subscription { id, inner: Arc::clone(&self.inner) })
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Publish an event.
    ///
    /// Auto-assigns `id` and `timestamp` when unset. With a broker, returns
    /// only after the broker accepts; the broker reader then performs local
    /// delivery. Without one, fans out locally right away.
    pub async fn publish(&self, mut event: Event) -> Result<(), BrokerError> {
        event.ensure_defaults();

        if let Some(broker) = &self.inner.broker {
            let payload = serde_json::to_string(&event)?;
            let mut conn = broker.conn();
            let _: () = redis::cmd("PUBLISH")
                .arg(broker.events_channel())
                .arg(payload)
                .query_async(&mut conn)
                .await?;
            return Ok(());
        }

        self.broadcast_local(event);
        Ok(())
    }

    /// Deliver into every local mailbox, dropping per-subscriber on overflow.
    fn broadcast_local(&self, event: Event) {
        let mut closed = Vec::new();
        {
            let subscribers = self.inner.subscribers.lock();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscriber = id,
                            event_type = %event.event_type,
                            "subscriber mailbox full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }
        if !closed.is_empty() {
            let mut subscribers = self.inner.subscribers.lock();
            for id in closed {
                subscribers.remove(&id);
            }
        }
    }

    /// Run the broker reader until cancelled: subscribe the events channel,
    /// decode envelopes, re-broadcast locally. Reconnects with exponential
    /// sleep on error.
    pub async fn run_broker_reader(&self, cancel: CancellationToken) {
        let Some(broker) = self.inner.broker.clone() else {
            return;
        };
        let channel = broker.events_channel().to_string();
        let mut backoff = Duration::from_millis(200);

        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.read_loop(&broker, &channel, &cancel).await {
                Ok(()) => return, // cancelled
                Err(e) => {
                    tracing::warn!(error = %e, delay_ms = backoff.as_millis() as u64,
                        "broker event reader failed, reconnecting");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    async fn read_loop(
        &self,
        broker: &Broker,
        channel: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BrokerError> {
        let mut pubsub = broker.client().get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        let mut stream = pubsub.on_message();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return Err(BrokerError::Redis(redis::RedisError::from((
                            redis::ErrorKind::Io,
                            "pubsub stream ended",
                        ))));
                    };
                    let payload: String = msg.get_payload()?;
                    match serde_json::from_str::<Event>(&payload) {
                        Ok(event) => self.broadcast_local(event),
                        Err(e) => {
                            tracing::warn!(error = %e, "undecodable event on broker channel");
                        }
                    }
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
