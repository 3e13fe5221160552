//! Print-job document model
//!
//! A job is owned transiently by whichever bridge last claimed it;
//! ownership ends when the status reaches a terminal value.

use crate::cloud::store::{FieldValue, StoreDocument};
use std::collections::BTreeMap;

/// Jobs give up after this many attempts unless the document says otherwise
pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Printing,
    Printed,
    Failed,
}

impl JobStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "printing" => Some(JobStatus::Printing),
            "printed" => Some(JobStatus::Printed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Printing => "printing",
            JobStatus::Printed => "printed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Where the payload should come out
///
/// Unrecognized kinds are preserved so they can be reported as a permanent
/// error on the job rather than silently dropped.
#[derive(Debug, Clone)]
pub enum JobTarget {
    Lan { ip: String, port: u16 },
    OsPrinter { printer_name: String },
    Unknown { kind: String },
}

impl JobTarget {
    fn from_fields(fields: &BTreeMap<String, FieldValue>) -> Self {
        let kind = fields
            .get("type")
            .and_then(FieldValue::as_str)
            .unwrap_or_default();
        let str_field = |key: &str| {
            fields
                .get(key)
                .and_then(FieldValue::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match kind {
            "lan" => JobTarget::Lan {
                ip: str_field("ip"),
                port: fields
                    .get("port")
                    .and_then(FieldValue::as_int)
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(9100),
            },
            "osPrinter" => JobTarget::OsPrinter {
                printer_name: str_field("printerName"),
            },
            other => JobTarget::Unknown {
                kind: other.to_string(),
            },
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            JobTarget::Lan { .. } => "lan",
            JobTarget::OsPrinter { .. } => "osPrinter",
            JobTarget::Unknown { .. } => "unknown",
        }
    }
}

/// One job parsed out of a queue document
#[derive(Debug, Clone)]
pub struct PrintJob {
    /// Full document resource name
    pub name: String,
    pub status: JobStatus,
    pub target: JobTarget,
    pub payload_b64: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub order_id: Option<String>,
    /// Store revision the fields were read at
    pub update_time: Option<String>,
}

impl PrintJob {
    /// Parse a queue document; `None` when the status field is unusable
    pub fn from_document(doc: &StoreDocument) -> Option<Self> {
        let status = JobStatus::parse(doc.fields.get("status")?.as_str()?)?;

        let target = match doc.fields.get("target") {
            Some(FieldValue::MapValue(map)) => JobTarget::from_fields(&map.fields),
            _ => JobTarget::Unknown {
                kind: String::new(),
            },
        };

        let int_field = |key: &str| doc.fields.get(key).and_then(FieldValue::as_int);

        Some(PrintJob {
            name: doc.name.clone(),
            status,
            target,
            payload_b64: doc
                .fields
                .get("payloadB64")
                .and_then(FieldValue::as_str)
                .unwrap_or_default()
                .to_string(),
            attempts: int_field("attempts").unwrap_or(0),
            max_attempts: int_field("maxAttempts")
                .unwrap_or(DEFAULT_MAX_ATTEMPTS)
                .max(1),
            order_id: doc
                .fields
                .get("orderId")
                .and_then(FieldValue::as_str)
                .map(str::to_string),
            update_time: doc.update_time.clone(),
        })
    }

    /// Document id - the last path segment of the resource name
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::store::MapFields;

    fn doc_with(fields: Vec<(&str, FieldValue)>) -> StoreDocument {
        StoreDocument {
            name: "projects/p/databases/(default)/documents/restaurants/r1/printQueue/job-1"
                .to_string(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            update_time: Some("2026-01-10T12:00:00Z".to_string()),
        }
    }

    fn lan_target(ip: &str, port: Option<i64>) -> FieldValue {
        let mut fields = BTreeMap::from([
            ("type".to_string(), FieldValue::string("lan")),
            ("ip".to_string(), FieldValue::string(ip)),
        ]);
        if let Some(port) = port {
            fields.insert("port".to_string(), FieldValue::integer(port));
        }
        FieldValue::MapValue(MapFields { fields })
    }

    #[test]
    fn parses_lan_job_with_defaults() {
        let doc = doc_with(vec![
            ("status", FieldValue::string("queued")),
            ("target", lan_target("10.0.0.5", None)),
            ("payloadB64", FieldValue::string("SGk=")),
        ]);
        let job = PrintJob::from_document(&doc).unwrap();

        assert_eq!(job.id(), "job-1");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        match &job.target {
            JobTarget::Lan { ip, port } => {
                assert_eq!(ip, "10.0.0.5");
                assert_eq!(*port, 9100);
            }
            other => panic!("wrong target: {other:?}"),
        }
    }

    #[test]
    fn unknown_target_kind_is_preserved() {
        let doc = doc_with(vec![
            ("status", FieldValue::string("queued")),
            (
                "target",
                FieldValue::MapValue(MapFields {
                    fields: BTreeMap::from([(
                        "type".to_string(),
                        FieldValue::string("bluetooth"),
                    )]),
                }),
            ),
        ]);
        let job = PrintJob::from_document(&doc).unwrap();
        match &job.target {
            JobTarget::Unknown { kind } => assert_eq!(kind, "bluetooth"),
            other => panic!("wrong target: {other:?}"),
        }
    }

    #[test]
    fn missing_target_map_is_unknown() {
        let doc = doc_with(vec![("status", FieldValue::string("queued"))]);
        let job = PrintJob::from_document(&doc).unwrap();
        assert!(matches!(job.target, JobTarget::Unknown { .. }));
    }

    #[test]
    fn unusable_status_is_rejected() {
        let doc = doc_with(vec![("status", FieldValue::string("archived"))]);
        assert!(PrintJob::from_document(&doc).is_none());
        assert!(PrintJob::from_document(&doc_with(vec![])).is_none());
    }

    #[test]
    fn max_attempts_is_clamped_to_at_least_one() {
        let doc = doc_with(vec![
            ("status", FieldValue::string("queued")),
            ("maxAttempts", FieldValue::integer(0)),
        ]);
        assert_eq!(PrintJob::from_document(&doc).unwrap().max_attempts, 1);
    }
}
