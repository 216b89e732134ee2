// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use serde_json::json;

#[test]
fn wire_type_names_are_dotted() {
    let evt = Event::new(EventType::ActivationCompleted, json!({"action": "created"}));
    let v = serde_json::to_value(&evt).unwrap();
    assert_eq!(v["type"], "model.activation.completed");
    assert_eq!(v["data"]["action"], "created");
    assert!(v["id"].as_str().unwrap().starts_with("evt-"));
}

#[test]
fn envelope_roundtrips() {
    let evt = Event::new(EventType::JobLog, json!({"jobId": "job-1"}));
    let json = serde_json::to_string(&evt).unwrap();
    let parsed: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, evt);
}

#[test]
fn job_status_maps_to_event_type() {
    assert_eq!(EventType::for_job_status(JobStatus::Pending), EventType::JobPending);
    assert_eq!(EventType::for_job_status(JobStatus::Completed), EventType::JobCompleted);
    assert_eq!(EventType::for_job_status(JobStatus::Cancelled), EventType::JobCancelled);
}

#[test]
fn ensure_defaults_fills_blank_fields() {
    let mut evt = Event {
        id: EventId::from_string(""),
        event_type: EventType::JobPending,
        timestamp: Utc.timestamp_opt(0, 0).single().unwrap(),
        data: json!({}),
    };
    evt.ensure_defaults();
    assert!(!evt.id.is_empty());
    assert_ne!(evt.timestamp.timestamp(), 0);
}

#[test]
fn ensure_defaults_preserves_populated_fields() {
    let mut evt = Event::new(EventType::JobPending, json!({}));
    let id = evt.id.clone();
    let ts = evt.timestamp;
    evt.ensure_defaults();
    assert_eq!(evt.id, id);
    assert_eq!(evt.timestamp, ts);
}
