//! [`File`] and [`FilesList`]: the per-record file bundle, keyed by
//! [`TransferType`]. Network operations (initiate/upload/commit) live in
//! [`crate::transfer`], which only needs the typed shape defined here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::links::FileLinks;
use crate::connection::Connection;

/// How the bytes of one file move between caller and repository.
///
/// `L`ocal is a single client-side `PUT`; `M`ultipart is a server-issued
/// set of part URLs the client `PUT`s concurrently; `F`etch has the
/// server pull from a caller-supplied URL; `R`emote just links an
/// already-hosted object in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferType {
    L,
    M,
    F,
    R,
}

impl TransferType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L => "L",
            Self::M => "M",
            Self::F => "F",
            Self::R => "R",
        }
    }
}

impl Default for TransferType {
    fn default() -> Self {
        Self::L
    }
}

/// The `transfer` object embedded in a [`File`]: its type discriminator
/// plus whatever extra fields that type carries (`url` for fetch,
/// `size`/`parts`/`part_size` for multipart once initiated).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileTransfer {
    #[serde(rename = "type")]
    pub transfer_type: TransferType,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

/// One file attached to a record, pending or completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub key: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// `"pending"` until every part is committed, then `"completed"`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub transfer: FileTransfer,
    #[serde(default)]
    pub links: FileLinks,

    #[serde(skip)]
    pub(crate) connection: Option<Connection>,
    #[serde(skip)]
    pub(crate) etag: Option<String>,

    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl File {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

/// A record's file bundle: whether it accepts files at all, and the
/// entries attached so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesList {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub entries: Vec<File>,

    #[serde(skip)]
    pub(crate) connection: Option<Connection>,
}
