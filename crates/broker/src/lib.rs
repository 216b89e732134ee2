// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mm-broker: redis-backed event bus, job queue, and key-value cache
//! tier.
//!
//! Every broker feature is optional: the bus degrades to in-process fan-out,
//! the queue degrades to direct execution, and the cache tier to the local
//! map. Components receive `Option<Broker>` and degrade individually.

pub mod bus;
pub mod queue;

pub use bus::{EventBus, Subscription, MAILBOX_CAPACITY};
pub use queue::{JobQueue, QueueMessage};

use mm_core::{Classify, ErrorClass};
use redis::aio::ConnectionManager;
use thiserror::Error;

/// Broker errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl Classify for BrokerError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Storage
    }
}

/// A connected broker handle. Cheap to clone.
#[derive(Clone)]
pub struct Broker {
    client: redis::Client,
    conn: ConnectionManager,
    events_channel: String,
    job_stream: String,
}

impl Broker {
    /// Connect to redis at `url` (e.g. `redis://host:6379/0`).
    pub async fn connect(
        url: &str,
        events_channel: impl Into<String>,
        job_stream: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            events_channel: events_channel.into(),
            job_stream: job_stream.into(),
        })
    }

    pub fn events_channel(&self) -> &str {
        &self.events_channel
    }

    pub fn job_stream(&self) -> &str {
        &self.job_stream
    }

    pub(crate) fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub(crate) fn client(&self) -> redis::Client {
        self.client.clone()
    }

    /// KV read.
    pub async fn kv_get(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.conn();
        let value: Option<String> =
            redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    /// KV write with TTL.
    pub async fn kv_set(
        &self,
        key: &str,
        value: &str,
        ttl: std::time::Duration,
    ) -> Result<(), BrokerError> {
        let mut conn = self.conn();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

}
