// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer-group job queue over a redis stream.
//!
//! Message shape on the stream: `job_id` + `request` (JSON). Exactly one
//! consumer in the group receives each message; that is what enforces the
//! single-writer invariant on jobs without distributed locks.

use mm_core::InstallRequest;
use std::collections::HashMap;
use std::time::Duration;

use crate::{Broker, BrokerError};

/// How long `next` blocks waiting for a message.
pub const BLOCK_DURATION: Duration = Duration::from_secs(5);

/// A claimed queue message.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub job_id: String,
    pub request: InstallRequest,
}

/// One consumer-group handle onto the job stream.
#[derive(Clone)]
pub struct JobQueue {
    broker: Broker,
    group: String,
    consumer: String,
}

/// XREADGROUP reply shape: stream → entries → (id, field map).
type StreamReply = Option<Vec<(String, Vec<(String, HashMap<String, String>)>)>>;

impl JobQueue {
    pub fn new(broker: Broker, group: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self { broker, group: group.into(), consumer: consumer.into() }
    }

    /// Create the consumer group if it does not exist. Idempotent.
    pub async fn ensure_group(&self) -> Result<(), BrokerError> {
        let mut conn = self.broker.conn();
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.broker.job_stream())
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a job message to the stream.
    pub async fn enqueue(&self, job_id: &str, request: &InstallRequest) -> Result<(), BrokerError> {
        let mut conn = self.broker.conn();
        let _: String = redis::cmd("XADD")
            .arg(self.broker.job_stream())
            .arg("*")
            .arg("job_id")
            .arg(job_id)
            .arg("request")
            .arg(serde_json::to_string(request)?)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Block up to [`BLOCK_DURATION`] for the next message.
    ///
    /// `Ok(None)` on timeout is the normal idle case. Returns the message and
    /// its stream id for a later [`JobQueue::ack`].
    pub async fn next(&self) -> Result<Option<(QueueMessage, String)>, BrokerError> {
        let mut conn = self.broker.conn();
        let reply: StreamReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("BLOCK")
            .arg(BLOCK_DURATION.as_millis() as u64)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(self.broker.job_stream())
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let Some(streams) = reply else { return Ok(None) };
        for (_stream, entries) in streams {
            for (msg_id, fields) in entries {
                match decode_fields(&fields) {
                    Ok(msg) => return Ok(Some((msg, msg_id))),
                    Err(e) => {
                        // Poison message: ack so it never redelivers, keep reading.
                        tracing::warn!(%msg_id, error = %e, "undecodable queue message, acking");
                        self.ack(&msg_id).await?;
                    }
                }
            }
        }
        Ok(None)
    }

    /// Mark a message delivered.
    pub async fn ack(&self, msg_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.broker.conn();
        let _: i64 = redis::cmd("XACK")
            .arg(self.broker.job_stream())
            .arg(&self.group)
            .arg(msg_id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Approximate pending depth for the gauge.
    pub async fn depth(&self) -> Result<i64, BrokerError> {
        let mut conn = self.broker.conn();
        let len: i64 = redis::cmd("XLEN")
            .arg(self.broker.job_stream())
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

fn decode_fields(fields: &HashMap<String, String>) -> Result<QueueMessage, BrokerError> {
    let job_id = fields.get("job_id").cloned().unwrap_or_default();
    let raw = fields.get("request").map(String::as_str).unwrap_or("{}");
    let request: InstallRequest = serde_json::from_str(raw)?;
    Ok(QueueMessage { job_id, request })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_fields_reads_message_shape() {
        let mut fields = HashMap::new();
        fields.insert("job_id".to_string(), "job-1".to_string());
        fields.insert(
            "request".to_string(),
            r#"{"hfModelId": "Qwen/Qwen2.5-0.5B", "overwrite": true}"#.to_string(),
        );
        let msg = decode_fields(&fields).unwrap();
        assert_eq!(msg.job_id, "job-1");
        assert_eq!(msg.request.hf_model_id, "Qwen/Qwen2.5-0.5B");
        assert!(msg.request.overwrite);
    }

    #[test]
    fn decode_fields_rejects_bad_json() {
        let mut fields = HashMap::new();
        fields.insert("job_id".to_string(), "job-1".to_string());
        fields.insert("request".to_string(), "{not json".to_string());
        assert!(decode_fields(&fields).is_err());
    }
}
