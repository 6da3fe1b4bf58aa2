//! [`Request`], [`RequestType`], and [`RequestTypeList`]: the workflow
//! objects behind publish/delete/edit/access-grant proposals. State
//! transitions (`submit`/`cancel`/`accept`/`decline`) and `create` are
//! implemented in [`crate::requests`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::links::{RequestLinks, RequestTypeLinks};
use crate::connection::Connection;

/// A request's position in `created -> submitted -> accepted|declined`,
/// or the `created -> cancelled`/`(expiry) -> expired` side branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Created,
    Submitted,
    Accepted,
    Declined,
    Cancelled,
    Expired,
}

/// A workflow object representing a proposed record transition (publish,
/// delete, edit, access grant). `created_by`, `receiver`, and `topic` are
/// each a single-entry `{entity_type: id}` reference map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub title: Option<String>,
    pub status: RequestStatus,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub created_by: HashMap<String, String>,
    #[serde(default)]
    pub receiver: HashMap<String, String>,
    #[serde(default)]
    pub topic: HashMap<String, String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Structured at read time so that upstream's colon-delimited flat
    /// keys (`"published_record:links:self"`) appear here as a normal
    /// nested tree (`crate::requests::expand_colon_keys`).
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub links: RequestLinks,

    #[serde(skip)]
    pub(crate) connection: Option<Connection>,
    #[serde(skip)]
    pub(crate) etag: Option<String>,

    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl Request {
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

/// One request type a record may have an applicable request of
/// (`publish_draft`, `delete_published`, …), keyed by a stable
/// `type_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestType {
    pub type_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub links: RequestTypeLinks,

    #[serde(skip)]
    pub(crate) connection: Option<Connection>,

    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// The result of `GET record.links.applicable_requests`: every request
/// type the current principal may open against that record right now.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTypeList {
    #[serde(default)]
    pub request_types: Vec<RequestType>,

    #[serde(skip)]
    pub(crate) connection: Option<Connection>,
}

impl RequestTypeList {
    /// Look up a request type by its stable `type_id` (e.g.
    /// `"publish_draft"`).
    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&RequestType> {
        self.request_types.iter().find(|rt| rt.type_id == type_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestType> {
        self.request_types.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.request_types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.request_types.is_empty()
    }
}

impl<'a> IntoIterator for &'a RequestTypeList {
    type Item = &'a RequestType;
    type IntoIter = std::slice::Iter<'a, RequestType>;

    fn into_iter(self) -> Self::IntoIter {
        self.request_types.iter()
    }
}
