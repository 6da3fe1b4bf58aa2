//! Typed DTOs for records, files, and requests.
//!
//! Every DTO here follows the same converter contract (§4.7): explicit
//! typed fields with boundary renames (`self` -> `self_`), unknown JSON
//! keys preserved under `extras` rather than dropped, and a
//! `#[serde(skip)]`ped connection/etag pair injected after the fact by
//! whichever of [`crate::records`]/[`crate::requests`] read the DTO
//! through a live [`crate::connection::Connection`] — never serialized
//! back out.

mod file;
mod links;
mod list;
mod record;
mod request;

pub use file::{File, FileTransfer, FilesList, TransferType};
pub use links::{
    FileLinks, PartLink, RecordLinks, RequestActionLinks, RequestLinks, RequestTypeActionLinks,
    RequestTypeLinks, RestListLinks,
};
pub use list::{Hits, RestList};
pub use record::{CommunitiesRef, FilesEnabled, Record, RecordParent};
pub use request::{Request, RequestStatus, RequestType, RequestTypeList};
