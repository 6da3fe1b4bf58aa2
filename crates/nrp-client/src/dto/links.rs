//! HATEOAS link sets, one typed struct per DTO, with unknown link names
//! surviving round-trip under `extras` rather than being dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of a multipart file's `links.parts` array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartLink {
    pub url: String,
}

/// Links carried by a [`super::Record`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordLinks {
    #[serde(rename = "self", default)]
    pub self_: Option<String>,
    #[serde(default)]
    pub self_html: Option<String>,
    #[serde(default)]
    pub files: Option<String>,
    #[serde(default)]
    pub requests: Option<String>,
    #[serde(default)]
    pub applicable_requests: Option<String>,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// Links carried by a [`super::File`]. `commit` is absent once a local
/// transfer is already final; `parts` is absent for anything but
/// multipart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileLinks {
    #[serde(rename = "self", default)]
    pub self_: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub parts: Option<Vec<PartLink>>,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// The `links.actions` object of a [`super::Request`]. A missing field
/// here is the server's way of saying the current principal may not take
/// that action in the request's current state (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestActionLinks {
    #[serde(default)]
    pub submit: Option<String>,
    #[serde(default)]
    pub cancel: Option<String>,
    #[serde(default)]
    pub accept: Option<String>,
    #[serde(default)]
    pub decline: Option<String>,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// Links carried by a [`super::Request`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestLinks {
    #[serde(rename = "self", default)]
    pub self_: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub actions: RequestActionLinks,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// `links.actions` of a [`super::RequestType`]: just the one `create`
/// action that kicks off the request lifecycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTypeActionLinks {
    #[serde(default)]
    pub create: Option<String>,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// Links carried by a [`super::RequestType`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTypeLinks {
    #[serde(default)]
    pub actions: RequestTypeActionLinks,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// Pagination links carried by a [`super::RestList`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestListLinks {
    #[serde(rename = "self", default)]
    pub self_: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub prev: Option<String>,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}
