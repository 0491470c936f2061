// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Job Envelope and Delay
//!
//! A published job travels as a JSON envelope holding the caller's payload
//! and the epoch second it was published at. The delay travels separately,
//! as the `x-delay` header read by the delayed message plugin.

use crate::errors::DelayedJobError;
use lapin::types::{AMQPValue, LongLongInt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Header the delayed message plugin reads the delay from, in milliseconds
pub const AMQP_HEADERS_DELAY: &str = "x-delay";

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Caller-supplied job data: string keys mapped to arbitrary JSON values.
pub type JobPayload = Map<String, Value>;

/// What is actually written to the wire for each delayed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_data: JobPayload,
    /// Seconds since the Unix epoch at publish time
    pub timestamp: i64,
}

impl JobEnvelope {
    /// Wraps `job_data` with the current time.
    pub fn new(job_data: JobPayload) -> JobEnvelope {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        JobEnvelope {
            job_data,
            timestamp,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DelayedJobError> {
        serde_json::to_vec(self).map_err(|err| {
            error!(error = err.to_string(), "failure to encode job envelope");
            DelayedJobError::Serialization(err.to_string())
        })
    }

    pub fn from_slice(body: &[u8]) -> Result<JobEnvelope, DelayedJobError> {
        serde_json::from_slice(body).map_err(|err| {
            error!(error = err.to_string(), "failure to decode job envelope");
            DelayedJobError::Serialization(err.to_string())
        })
    }
}

/// Parses a JSON document into a job payload. Only JSON objects are accepted.
pub fn parse_payload(raw: &str) -> Result<JobPayload, DelayedJobError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DelayedJobError::InvalidArgument(format!(
            "job payload must be a JSON object, got `{}`",
            other
        ))),
        Err(err) => Err(DelayedJobError::InvalidArgument(format!(
            "job payload is not valid JSON: {}",
            err
        ))),
    }
}

/// How long the broker holds a message before routing it, in milliseconds.
///
/// Only the broker interprets this value. It can never be negative, and it
/// always fits the signed 64-bit `x-delay` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Delay(LongLongInt);

impl Delay {
    pub fn as_millis(&self) -> u64 {
        self.0.unsigned_abs()
    }

    /// Value for the `x-delay` header.
    pub fn header_value(&self) -> AMQPValue {
        AMQPValue::LongLongInt(self.0)
    }
}

impl TryFrom<i64> for Delay {
    type Error = DelayedJobError;

    fn try_from(millis: i64) -> Result<Delay, DelayedJobError> {
        if millis < 0 {
            return Err(DelayedJobError::InvalidArgument(format!(
                "delay must be a non-negative number of milliseconds, got {}",
                millis
            )));
        }
        Ok(Delay(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_format_has_job_data_and_timestamp() {
        let payload = parse_payload(r#"{"type":"email_notification"}"#).unwrap();
        let envelope = JobEnvelope {
            job_data: payload,
            timestamp: 1_700_000_000,
        };

        let body = envelope.to_bytes().unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(
            value,
            json!({"job_data": {"type": "email_notification"}, "timestamp": 1_700_000_000})
        );
    }

    #[test]
    fn nested_payload_survives_the_wire() {
        let payload = parse_payload(
            r#"{"user": {"id": 7, "tags": ["a", {"deep": null}]}, "ratio": 0.5}"#,
        )
        .unwrap();
        let sent = JobEnvelope::new(payload.clone());

        let received = JobEnvelope::from_slice(&sent.to_bytes().unwrap()).unwrap();

        assert_eq!(received.job_data, payload);
        assert_eq!(received, sent);
    }

    #[test]
    fn new_envelope_uses_current_time() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let envelope = JobEnvelope::new(JobPayload::new());

        assert!(envelope.timestamp >= before);
        assert!(envelope.timestamp - before <= 1);
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(matches!(
            parse_payload("[1, 2]"),
            Err(DelayedJobError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_payload("{not json"),
            Err(DelayedJobError::InvalidArgument(_))
        ));
    }

    #[test]
    fn negative_delay_is_rejected() {
        assert!(matches!(
            Delay::try_from(-1),
            Err(DelayedJobError::InvalidArgument(_))
        ));
        assert_eq!(Delay::try_from(0).unwrap().as_millis(), 0);
        assert_eq!(
            Delay::try_from(5000).unwrap().header_value(),
            AMQPValue::LongLongInt(5000)
        );
    }

    #[test]
    fn largest_delay_reaches_the_header_unchanged() {
        let delay = Delay::try_from(i64::MAX).unwrap();

        assert_eq!(delay.as_millis(), i64::MAX as u64);
        assert_eq!(delay.header_value(), AMQPValue::LongLongInt(i64::MAX));
    }

    #[test]
    fn tiny_floats_survive_the_wire_exactly() {
        let payload = parse_payload(r#"{"value": 1.0715660391465826e-75}"#).unwrap();
        let sent = JobEnvelope::new(payload.clone());

        let received = JobEnvelope::from_slice(&sent.to_bytes().unwrap()).unwrap();

        assert_eq!(received.job_data, payload);
        assert_eq!(received.job_data["value"].as_f64(), Some(1.0715660391465826e-75));
    }
}
