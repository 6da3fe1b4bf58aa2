#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Async client for InvenioRDM-style research-data repositories.
//!
//! Built on top of [`nrp_http`], this crate adds everything that is
//! specific to a single repository rather than to HTTP transport in
//! general: bearer-token auth by host, ETag-based optimistic concurrency,
//! a typed error taxonomy over JSON payloads, a multipart upload/download
//! engine with AWS-style part-size math, and typed Records/Requests APIs.
//!
//! # Layering
//!
//! - [`nrp_http::HttpClient`] is generic transport plumbing (pooling, TLS,
//!   decompression, redirects, retry, concurrency limiting).
//! - [`Connection`] wraps one `HttpClient` per repository and owns
//!   everything repository-specific: auth-by-host, ETag extraction, and
//!   translating transport errors into [`RepositoryError`].
//! - [`RecordClient`](records::RecordClient) and
//!   [`RequestClient`](requests::RequestClient) are the public entry
//!   points most callers use; [`Client`](client::Client) wires discovery,
//!   URL routing, and both clients together for one [`RepositoryConfig`].

mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod download;
pub mod dto;
mod error;
mod etag;
mod limiter;
pub mod multipart;
pub mod records;
pub mod requests;
pub mod streams;
pub mod transfer;

pub use auth::{AuthToken, TokenStore};
pub use client::{Client, RecordIdKind, classify_record_id};
pub use config::{ModelInfo, RepositoryConfig, RepositoryFlavor, RepositoryInfo};
pub use connection::{Connection, ConnectionOptions};
pub use dto::{
    File, FilesList, Record, Request, RequestStatus, RequestType, RequestTypeList, RestList,
    TransferType,
};
pub use error::{ErrorPayload, RepositoryError};
pub use limiter::Limiter;
pub use multipart::{MultipartMathError, part_plan};
pub use records::RecordClient;
pub use requests::{RequestClient, RequestStatusFilter};
pub use streams::{DataSink, DataSource};
