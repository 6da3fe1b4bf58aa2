//! The multipart upload engine: a three-phase initiate/upload/commit
//! protocol dispatched over a [`TransferType`]-keyed registry of
//! [`Transfer`] implementations.
//!
//! Grounded in `modkit-http`'s layered-builder style for assembling a
//! configured object from a handful of orthogonal knobs, and in the
//! `tokio::task::JoinSet` structured-concurrency pattern `hyperspot`'s own
//! worker pools use for "spawn N, join all, abort siblings on first
//! failure" instead of unstructured `tokio::spawn` + `Vec<JoinHandle>`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::Connection;
use crate::dto::{File, FileTransfer, FilesList, TransferType};
use crate::error::RepositoryError;
use crate::limiter::Limiter;
use crate::multipart::part_plan;
use crate::streams::DataSource;

/// The JSON body of one entry in a files-initiate request
/// (`POST record.links.files`): `[{key, metadata, transfer: {type, ...}}]`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransferInitPayload {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub transfer: FileTransfer,
}

/// One variant of the file-transfer protocol (§4.3): local single-PUT,
/// server-issued multipart, server-side fetch, or an already-hosted
/// remote link.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Enrich the initiate payload before it is POSTed (multipart adds
    /// `size`/`parts`/`part_size`; the other variants are no-ops).
    async fn prepare(
        &self,
        source: &dyn DataSource,
        payload: &mut TransferInitPayload,
    ) -> Result<(), RepositoryError>;

    /// Stream bytes per the variant's protocol, once the server has
    /// returned the initialized [`File`] entry. A no-op for fetch/remote.
    async fn upload(
        &self,
        conn: &Connection,
        initialized: &File,
        source: &dyn DataSource,
    ) -> Result<(), RepositoryError>;

    /// The body POSTed to `initialized.links.commit`, if present.
    fn commit_payload(&self, initialized: &File) -> Value;
}

/// `L`: a single `PUT` of the whole source to `links.content`.
pub struct LocalTransfer;

#[async_trait]
impl Transfer for LocalTransfer {
    async fn prepare(
        &self,
        _source: &dyn DataSource,
        _payload: &mut TransferInitPayload,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn upload(
        &self,
        conn: &Connection,
        initialized: &File,
        source: &dyn DataSource,
    ) -> Result<(), RepositoryError> {
        let content_url = initialized
            .links
            .content
            .as_deref()
            .ok_or(RepositoryError::MissingLink("content"))?;
        let len = source.len().await?;
        let mut reader = source.open(0, len).await?;
        let mut buf = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buf).await?;
        conn.put_bytes(content_url, "application/octet-stream", buf.into())
            .await?;
        Ok(())
    }

    fn commit_payload(&self, _initialized: &File) -> Value {
        Value::Object(Map::new())
    }
}

/// `M`: a server-issued set of part URLs, `PUT` concurrently under a
/// [`JoinSet`](tokio::task::JoinSet) so a single part failure aborts every
/// sibling part still in flight.
pub struct MultipartTransfer {
    limiter: Limiter,
}

impl MultipartTransfer {
    #[must_use]
    pub fn new(limiter: Limiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Transfer for MultipartTransfer {
    async fn prepare(
        &self,
        source: &dyn DataSource,
        payload: &mut TransferInitPayload,
    ) -> Result<(), RepositoryError> {
        if !source.has_range_support() {
            return Err(RepositoryError::SourceRangeUnsupported);
        }
        let size = source.len().await?;
        let plan = part_plan(size, None, None)?;
        payload.transfer.extras.insert("size".to_owned(), size.into());
        payload
            .transfer
            .extras
            .insert("parts".to_owned(), plan.parts.len().into());
        payload
            .transfer
            .extras
            .insert("part_size".to_owned(), plan.part_size.into());
        Ok(())
    }

    async fn upload(
        &self,
        conn: &Connection,
        initialized: &File,
        source: &dyn DataSource,
    ) -> Result<(), RepositoryError> {
        let part_links = initialized
            .links
            .parts
            .as_ref()
            .ok_or(RepositoryError::MissingLink("parts"))?;
        let size = source.len().await?;
        let plan = part_plan(size, Some(u32::try_from(part_links.len()).unwrap_or(1)), None)?;

        let mut set = tokio::task::JoinSet::new();
        for (part, link) in plan.parts.into_iter().zip(part_links.iter()) {
            let conn = conn.clone();
            let url = link.url.clone();
            let limiter = self.limiter.clone();
            let mut reader = source.open(part.offset, part.length).await?;
            let mut buf = Vec::with_capacity(usize::try_from(part.length).unwrap_or(0));
            tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buf).await?;
            set.spawn(async move {
                let _permit = limiter.acquire().await;
                conn.put_bytes(&url, "application/octet-stream", buf.into())
                    .await
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(_response)) => {}
                Ok(Err(repo_err)) => {
                    set.abort_all();
                    return Err(repo_err);
                }
                Err(join_err) => {
                    set.abort_all();
                    return Err(RepositoryError::Io(std::io::Error::other(
                        join_err.to_string(),
                    )));
                }
            }
        }
        Ok(())
    }

    fn commit_payload(&self, _initialized: &File) -> Value {
        Value::Object(Map::new())
    }
}

/// `F`: the server fetches the bytes itself from a caller-supplied URL;
/// nothing is uploaded client-side.
pub struct FetchTransfer {
    pub url: String,
}

#[async_trait]
impl Transfer for FetchTransfer {
    async fn prepare(
        &self,
        _source: &dyn DataSource,
        payload: &mut TransferInitPayload,
    ) -> Result<(), RepositoryError> {
        payload
            .transfer
            .extras
            .insert("url".to_owned(), self.url.clone().into());
        Ok(())
    }

    async fn upload(
        &self,
        _conn: &Connection,
        _initialized: &File,
        _source: &dyn DataSource,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }

    fn commit_payload(&self, _initialized: &File) -> Value {
        Value::Object(Map::new())
    }
}

/// `R`: an already-hosted object is linked in place; nothing is uploaded
/// or fetched.
pub struct RemoteTransfer {
    pub url: String,
}

#[async_trait]
impl Transfer for RemoteTransfer {
    async fn prepare(
        &self,
        _source: &dyn DataSource,
        payload: &mut TransferInitPayload,
    ) -> Result<(), RepositoryError> {
        payload
            .transfer
            .extras
            .insert("url".to_owned(), self.url.clone().into());
        Ok(())
    }

    async fn upload(
        &self,
        _conn: &Connection,
        _initialized: &File,
        _source: &dyn DataSource,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }

    fn commit_payload(&self, _initialized: &File) -> Value {
        Value::Object(Map::new())
    }
}

/// The explicit, constructor-built dispatch table from [`TransferType`] to
/// its [`Transfer`] implementation — never a global/lazy-static table
/// (§9: "Global mutable state").
pub struct TransferEngine {
    registry: HashMap<TransferType, Arc<dyn Transfer>>,
}

impl TransferEngine {
    /// An empty engine; callers register variants with [`Self::register`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
        }
    }

    #[must_use]
    pub fn register(mut self, transfer_type: TransferType, transfer: Arc<dyn Transfer>) -> Self {
        self.registry.insert(transfer_type, transfer);
        self
    }

    /// The conventional registry: local, multipart (sharing `limiter`),
    /// fetch, and remote. Fetch/remote are registered with an empty URL
    /// placeholder, since their URL is supplied per-call via
    /// `transfer_metadata` rather than at construction; [`Self::upload`]
    /// overrides it from the caller-supplied metadata before `prepare`.
    #[must_use]
    pub fn standard(limiter: Limiter) -> Self {
        Self::new()
            .register(TransferType::L, Arc::new(LocalTransfer))
            .register(TransferType::M, Arc::new(MultipartTransfer::new(limiter)))
    }

    /// Run the three-phase upload protocol (§4.3) for one file.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotImplemented`] if `transfer_type` has
    /// no registered [`Transfer`], [`RepositoryError::MissingLink`] if the
    /// server's initiate response omits the selected file's entry, and
    /// whatever transport/status/IO error interrupts initiate/upload/commit.
    pub async fn upload(
        &self,
        conn: &Connection,
        files_link: &str,
        key: &str,
        metadata: Option<Value>,
        transfer_type: TransferType,
        transfer_metadata: Option<Map<String, Value>>,
        source: &dyn DataSource,
    ) -> Result<File, RepositoryError> {
        let transfer = self
            .registry
            .get(&transfer_type)
            .cloned()
            .ok_or(RepositoryError::NotImplemented("transfer type not registered"))?;

        let mut payload = TransferInitPayload {
            key: key.to_owned(),
            metadata,
            transfer: FileTransfer {
                transfer_type,
                extras: transfer_metadata.unwrap_or_default(),
            },
        };
        transfer.prepare(source, &mut payload).await?;

        let response = conn.post(files_link, &vec![payload]).await?;
        let mut files_list: FilesList = response.json().await?;
        let mut initialized = take_entry_by_key(&mut files_list.entries, key)
            .ok_or(RepositoryError::MissingLink("files entry for initiated key"))?;

        transfer.upload(conn, &initialized, source).await?;

        if let Some(commit_url) = initialized.links.commit.clone() {
            let commit_body = transfer.commit_payload(&initialized);
            let response = conn.post(&commit_url, &commit_body).await?;
            initialized = response.json().await?;
            if !initialized.is_completed() {
                return Err(RepositoryError::UploadIncomplete(
                    initialized
                        .status
                        .clone()
                        .unwrap_or_else(|| "unknown".to_owned()),
                ));
            }
        }

        Ok(initialized)
    }
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn take_entry_by_key(entries: &mut Vec<File>, key: &str) -> Option<File> {
    let idx = entries.iter().position(|f| f.key == key)?;
    Some(entries.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use crate::streams::BytesSource;
    use httpmock::MockServer;

    fn test_connection(server: &MockServer) -> Connection {
        Connection::new_insecure(server.base_url(), TokenStore::new())
            .expect("connection should build")
    }

    #[tokio::test]
    async fn local_upload_puts_whole_source_then_commits() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/api/records/1/files");
            then.status(200).json_body(serde_json::json!({
                "enabled": true,
                "entries": [{
                    "key": "data.bin",
                    "size": 5,
                    "status": "pending",
                    "transfer": {"type": "L"},
                    "links": {
                        "self": "https://x/files/data.bin",
                        "content": format!("{}/files/data.bin/content", server.base_url()),
                        "commit": format!("{}/files/data.bin/commit", server.base_url()),
                    }
                }]
            }));
        });
        server.mock(|when, then| {
            when.method(httpmock::Method::PUT).path("/files/data.bin/content");
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/files/data.bin/commit");
            then.status(200).json_body(serde_json::json!({
                "key": "data.bin",
                "size": 5,
                "status": "completed",
                "transfer": {"type": "L"},
                "links": {}
            }));
        });

        let conn = test_connection(&server);
        let engine = TransferEngine::standard(Limiter::new(4));
        let source = BytesSource::new(b"hello".to_vec());
        let file = engine
            .upload(
                &conn,
                "/api/records/1/files",
                "data.bin",
                None,
                TransferType::L,
                None,
                &source,
            )
            .await
            .expect("upload");
        assert!(file.is_completed());
    }

    struct UnrangeableSource(bytes::Bytes);

    #[async_trait]
    impl DataSource for UnrangeableSource {
        async fn len(&self) -> std::io::Result<u64> {
            Ok(self.0.len() as u64)
        }

        async fn open(
            &self,
            _offset: u64,
            _count: u64,
        ) -> std::io::Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
            Ok(Box::new(std::io::Cursor::new(self.0.clone())))
        }

        fn has_range_support(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn multipart_rejects_source_without_range_support() {
        let server = MockServer::start();
        let conn = test_connection(&server);
        let engine = TransferEngine::standard(Limiter::new(4));
        let source = UnrangeableSource(bytes::Bytes::from_static(b"hello world"));
        let err = engine
            .upload(
                &conn,
                "/api/records/1/files",
                "data.bin",
                None,
                TransferType::M,
                None,
                &source,
            )
            .await
            .expect_err("should fail");
        assert!(matches!(err, RepositoryError::SourceRangeUnsupported));
    }

    #[tokio::test]
    async fn unregistered_transfer_type_is_not_implemented() {
        let server = MockServer::start();
        let conn = test_connection(&server);
        let engine = TransferEngine::new();
        let source = BytesSource::new(b"x".to_vec());
        let err = engine
            .upload(
                &conn,
                "/api/records/1/files",
                "data.bin",
                None,
                TransferType::F,
                None,
                &source,
            )
            .await
            .expect_err("should fail");
        assert!(matches!(err, RepositoryError::NotImplemented(_)));
    }
}
