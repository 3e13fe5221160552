//! Remote document store client
//!
//! Speaks the Firestore REST surface for one restaurant's print queue.
//! Only the three logical operations the poller needs exist: list queued
//! jobs, read one document, patch one document (optionally guarded by an
//! update-time precondition).

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Public Firestore REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("document not found")]
    NotFound,

    /// The guarded patch lost against a concurrent writer
    #[error("update precondition failed")]
    PreconditionFailed,

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Tagged field value, mirroring the store's wire representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    StringValue(String),
    IntegerValue(#[serde(with = "int_string")] i64),
    TimestampValue(String),
    NullValue(()),
    MapValue(MapFields),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapFields {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl FieldValue {
    pub fn string(value: impl Into<String>) -> Self {
        FieldValue::StringValue(value.into())
    }

    pub fn integer(value: i64) -> Self {
        FieldValue::IntegerValue(value)
    }

    /// Current time as a wire timestamp
    pub fn now() -> Self {
        FieldValue::TimestampValue(
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        )
    }

    pub fn null() -> Self {
        FieldValue::NullValue(())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::StringValue(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::IntegerValue(i) => Some(*i),
            _ => None,
        }
    }
}

/// Integers travel as decimal strings on the wire; accept both forms
mod int_string {
    use serde::de::{self, Deserializer, Visitor};
    use serde::ser::Serializer;

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        struct IntVisitor;

        impl Visitor<'_> for IntVisitor {
            type Value = i64;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an integer or a decimal string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
                i64::try_from(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IntVisitor)
    }
}

/// One document as the store returns it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    /// Full resource name (`projects/.../documents/restaurants/r1/printQueue/j1`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

/// Client for one restaurant's `printQueue` collection
pub struct QueueStore {
    client: Client,
    base_url: String,
    project_id: String,
    restaurant_id: String,
}

impl QueueStore {
    pub fn new(project_id: &str, restaurant_id: &str) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id: project_id.to_string(),
            restaurant_id: restaurant_id.to_string(),
        })
    }

    /// Point at a different endpoint (tests, emulators)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn restaurant_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/restaurants/{}",
            self.base_url, self.project_id, self.restaurant_id
        )
    }

    /// Jobs still waiting in the queue, oldest store order, up to `limit`
    ///
    /// A 404 means the collection does not exist yet - an empty queue, not
    /// an error.
    pub async fn list_queued(&self, limit: u32) -> Result<Vec<StoreDocument>, StoreError> {
        let url = format!("{}:runQuery", self.restaurant_url());
        let body = serde_json::json!({
            "structuredQuery": {
                "from": [{ "collectionId": "printQueue" }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "status" },
                        "op": "EQUAL",
                        "value": { "stringValue": "queued" },
                    }
                },
                "limit": limit,
            }
        });

        let response = self.client.post(&url).json(&body).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = check_status(response).await?;

        let rows: Vec<serde_json::Value> = response.json().await?;
        let documents = rows
            .into_iter()
            .filter_map(|row| row.get("document").cloned())
            .filter_map(|doc| match serde_json::from_value::<StoreDocument>(doc) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable queue document");
                    None
                }
            })
            .collect();
        Ok(documents)
    }

    /// Fetch one document by its full resource name
    pub async fn get(&self, name: &str) -> Result<StoreDocument, StoreError> {
        let url = format!("{}/{}", self.base_url, name);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Patch the named fields of one document
    ///
    /// With `require_update_time` set, the store rejects the patch when the
    /// document changed since that revision; callers treat the rejection as
    /// losing a claim race.
    pub async fn patch(
        &self,
        name: &str,
        fields: BTreeMap<String, FieldValue>,
        mask: &[&str],
        require_update_time: Option<&str>,
    ) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.base_url, name);

        let mut query: Vec<(&str, String)> = mask
            .iter()
            .map(|field| ("updateMask.fieldPaths", field.to_string()))
            .collect();
        if let Some(revision) = require_update_time {
            query.push(("currentDocument.updateTime", revision.to_string()));
        }

        let body = serde_json::json!({ "fields": fields });
        let response = self
            .client
            .patch(&url)
            .query(&query)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if require_update_time.is_some()
            && (status == StatusCode::BAD_REQUEST || status == StatusCode::CONFLICT)
        {
            return Err(StoreError::PreconditionFailed);
        }
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_round_trip_the_wire_shapes() {
        let cases = [
            (FieldValue::string("queued"), r#"{"stringValue":"queued"}"#),
            (FieldValue::integer(3), r#"{"integerValue":"3"}"#),
            (FieldValue::null(), r#"{"nullValue":null}"#),
        ];
        for (value, wire) in cases {
            assert_eq!(serde_json::to_string(&value).unwrap(), wire);
            assert_eq!(serde_json::from_str::<FieldValue>(wire).unwrap(), value);
        }
    }

    #[test]
    fn integer_accepts_both_wire_forms() {
        let from_string: FieldValue = serde_json::from_str(r#"{"integerValue":"42"}"#).unwrap();
        let from_number: FieldValue = serde_json::from_str(r#"{"integerValue":42}"#).unwrap();
        assert_eq!(from_string.as_int(), Some(42));
        assert_eq!(from_number.as_int(), Some(42));
    }

    #[test]
    fn document_decodes_nested_map() {
        let doc: StoreDocument = serde_json::from_str(
            r#"{
                "name": "projects/p/databases/(default)/documents/restaurants/r1/printQueue/j1",
                "fields": {
                    "status": { "stringValue": "queued" },
                    "target": { "mapValue": { "fields": {
                        "type": { "stringValue": "lan" },
                        "ip": { "stringValue": "10.0.0.5" },
                        "port": { "integerValue": "9100" }
                    }}}
                },
                "updateTime": "2026-01-10T12:00:00.000000Z"
            }"#,
        )
        .unwrap();

        assert_eq!(doc.fields["status"].as_str(), Some("queued"));
        let FieldValue::MapValue(target) = &doc.fields["target"] else {
            panic!("target should be a map");
        };
        assert_eq!(target.fields["port"].as_int(), Some(9100));
        assert_eq!(doc.update_time.as_deref(), Some("2026-01-10T12:00:00.000000Z"));
    }
}
