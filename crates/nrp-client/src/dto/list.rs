//! [`RestList`]: the paginated search-result envelope shared by the
//! Records and Requests APIs. Paging (`next_page`/`all`) is implemented
//! in [`crate::records`], which is the only module that needs a live
//! connection to follow `links.next`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::links::RestListLinks;
use crate::connection::Connection;

/// The `hits` envelope inside a [`RestList`]: the page's items plus the
/// total count across every page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hits<T> {
    pub hits: Vec<T>,
    #[serde(default)]
    pub total: u64,
}

/// One page of a search result, still attached to the [`Connection`] it
/// was read through so its hits (and the list itself, via
/// [`crate::records::all`]) can issue further requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestList<T> {
    pub hits: Hits<T>,
    #[serde(default)]
    pub aggregations: Option<Value>,
    #[serde(default, rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub links: RestListLinks,

    #[serde(skip)]
    pub(crate) connection: Option<Connection>,
}

impl<T> RestList<T> {
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.links.next.is_some()
    }

    #[must_use]
    pub fn has_prev(&self) -> bool {
        self.links.prev.is_some()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.hits.total
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.hits.hits.iter()
    }

    #[must_use]
    pub fn into_hits(self) -> Vec<T> {
        self.hits.hits
    }
}
