//! [`Record`]: a metadata document plus an optional file bundle. Network
//! operations (`update`, `delete`, `files`, `applicable_requests`,
//! `upload`) are defined in [`crate::records`], which only needs the
//! typed shape defined here plus the injected connection/etag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::links::RecordLinks;
use crate::connection::Connection;

/// `parent.communities` on a draft: which community (if any) it was
/// created under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunitiesRef {
    #[serde(default)]
    pub default: Option<String>,
}

/// `parent` on a [`Record`]: cross-version grouping (community,
/// workflow) that survives every draft/published revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordParent {
    #[serde(default)]
    pub communities: Option<CommunitiesRef>,
    #[serde(default)]
    pub workflow: Option<String>,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// The `files` marker on a [`Record`]: whether this record accepts a
/// file bundle at all (the entries themselves live behind `links.files`,
/// see [`super::FilesList`]).
///
/// NRP-flavored repositories send the object shape (`{"enabled": bool}`);
/// Zenodo-flavored ones send a bare JSON array of file entries instead
/// (§9 Open Question 3). Rather than threading the discovered
/// [`crate::config::RepositoryFlavor`] through deserialization just to
/// pick a branch, `deserialize_files_enabled` sniffs the wire shape
/// directly: an array coerces to `enabled: !array.is_empty()`, matching
/// the source's ad-hoc coercion but expressed as one deserializer
/// instead of a runtime flavor check (documented in `DESIGN.md`).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FilesEnabled {
    pub enabled: bool,
}

impl<'de> Deserialize<'de> for FilesEnabled {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Array(entries) => Ok(FilesEnabled {
                enabled: !entries.is_empty(),
            }),
            Value::Object(mut map) => {
                let enabled = match map.remove("enabled") {
                    Some(Value::Bool(b)) => b,
                    _ => false,
                };
                Ok(FilesEnabled { enabled })
            }
            Value::Bool(b) => Ok(FilesEnabled { enabled: b }),
            other => Err(serde::de::Error::custom(format!(
                "expected files marker to be an object, array, or bool, got {other}"
            ))),
        }
    }
}

/// A metadata record: identity, HATEOAS links, model-defined metadata,
/// and lifecycle state (`"draft"` or `"published"`).
///
/// `self.links.self_` uniquely identifies the record; the ETag carried
/// alongside it (populated once the record has been read or written
/// through a [`Connection`]) is the concurrency token for the next
/// write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revision_id: Option<u64>,
    #[serde(default)]
    pub links: RecordLinks,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(rename = "files", default)]
    pub files_: Option<FilesEnabled>,
    #[serde(default)]
    pub parent: Option<RecordParent>,
    /// Left as a bare string rather than an enum: callers branch on it
    /// with `is_draft`/`is_published`, and an unrecognized third value
    /// (a future lifecycle state) should round-trip rather than fail to
    /// parse.
    #[serde(default)]
    pub state: Option<String>,

    #[serde(skip)]
    pub(crate) connection: Option<Connection>,
    #[serde(skip)]
    pub(crate) etag: Option<String>,

    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl Record {
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.state.as_deref() == Some("draft")
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.state.as_deref() == Some("published")
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_enabled_object_shape() {
        let parsed: FilesEnabled =
            serde_json::from_value(serde_json::json!({"enabled": true})).expect("deserialize");
        assert!(parsed.enabled);
    }

    #[test]
    fn files_enabled_zenodo_array_shape_nonempty() {
        let parsed: FilesEnabled =
            serde_json::from_value(serde_json::json!([{"key": "a.txt"}])).expect("deserialize");
        assert!(parsed.enabled);
    }

    #[test]
    fn files_enabled_zenodo_array_shape_empty() {
        let parsed: FilesEnabled =
            serde_json::from_value(serde_json::json!([])).expect("deserialize");
        assert!(!parsed.enabled);
    }

    #[test]
    fn record_with_zenodo_files_list_deserializes() {
        let record: Record = serde_json::from_value(serde_json::json!({
            "id": "abc123",
            "files": [{"key": "data.bin"}],
        }))
        .expect("deserialize");
        assert!(record.files_.expect("files marker present").enabled);
    }
}
