//! The Records API (§4.5): create/read/search/update/delete, in-place
//! metadata patching, and the `all()`/`scan()` pagination streams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::RepositoryInfo;
use crate::connection::Connection;
use crate::dto::{File, FilesList, Record, RequestTypeList, RestList, TransferType};
use crate::error::RepositoryError;
use crate::streams::DataSource;
use crate::transfer::TransferEngine;

/// The typed entry point for one model's record endpoints
/// (`search`/`create_record`/`read_record`/`read_draft`).
#[derive(Clone)]
pub struct RecordClient {
    connection: Connection,
    info: RepositoryInfo,
    model: String,
}

impl RecordClient {
    /// Build a client for `model`, or the repository's sole declared model
    /// (or the aggregate `"records"` endpoint) if `model` is `None`
    /// ([`RepositoryInfo::resolve_model`]).
    #[must_use]
    pub fn new(connection: Connection, info: RepositoryInfo, model: Option<&str>) -> Self {
        let model = info.resolve_model(model).to_owned();
        Self {
            connection,
            info,
            model,
        }
    }

    /// Create a record. `community`/`workflow`, if given, are merged into
    /// `data.parent`; `files_enabled` sets `files.enabled` on the create
    /// body.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotImplemented`] if `idempotent` is
    /// `true` (Open Question 1, §9: idempotent create via deterministic
    /// PID generation is not implemented), or the usual transport/status
    /// errors otherwise.
    pub async fn create_record(
        &self,
        data: Value,
        community: Option<&str>,
        workflow: Option<&str>,
        idempotent: bool,
        files_enabled: bool,
    ) -> Result<Record, RepositoryError> {
        if idempotent {
            return Err(RepositoryError::NotImplemented("idempotent create"));
        }

        let mut body = Map::new();
        body.insert("metadata".to_owned(), data);
        if community.is_some() || workflow.is_some() {
            let mut parent = Map::new();
            if let Some(community) = community {
                let mut communities = Map::new();
                communities.insert("default".to_owned(), Value::String(community.to_owned()));
                parent.insert("communities".to_owned(), Value::Object(communities));
            }
            if let Some(workflow) = workflow {
                parent.insert("workflow".to_owned(), Value::String(workflow.to_owned()));
            }
            body.insert("parent".to_owned(), Value::Object(parent));
        }
        let mut files = Map::new();
        files.insert("enabled".to_owned(), Value::Bool(files_enabled));
        body.insert("files".to_owned(), Value::Object(files));

        let url = self.info.create_url(&self.model);
        let response = self.connection.post(&url, &Value::Object(body)).await?;
        self.finish_record(response).await
    }

    /// Read a published record. `record_id` may be an opaque id or an
    /// already-resolved full URL, used verbatim in the latter case.
    ///
    /// # Errors
    ///
    /// Returns the usual transport/status/JSON errors.
    pub async fn read_record(&self, record_id: &str, expand: bool) -> Result<Record, RepositoryError> {
        let url = self.resolve_record_url(record_id, true, expand);
        let response = self.connection.get(&url).await?;
        self.finish_record(response).await
    }

    /// Read a draft record (`user_read_url` rather than `read_url`).
    ///
    /// # Errors
    ///
    /// Returns the usual transport/status/JSON errors.
    pub async fn read_draft(&self, record_id: &str, expand: bool) -> Result<Record, RepositoryError> {
        let url = self.resolve_record_url(record_id, false, expand);
        let response = self.connection.get(&url).await?;
        self.finish_record(response).await
    }

    /// Search published records.
    ///
    /// # Errors
    ///
    /// Returns the usual transport/status/JSON errors.
    pub async fn search(
        &self,
        q: Option<&str>,
        page: Option<u32>,
        size: Option<u32>,
        facets: &HashMap<String, String>,
    ) -> Result<RestList<Record>, RepositoryError> {
        let url = build_list_url(&self.info.search_url(&self.model), q, page, size, None, facets);
        self.finish_list(&url).await
    }

    /// Search the current principal's own drafts.
    ///
    /// # Errors
    ///
    /// Returns the usual transport/status/JSON errors.
    pub async fn search_drafts(
        &self,
        q: Option<&str>,
        page: Option<u32>,
        size: Option<u32>,
        facets: &HashMap<String, String>,
    ) -> Result<RestList<Record>, RepositoryError> {
        let url = build_list_url(
            &self.info.user_search_url(&self.model),
            q,
            page,
            size,
            None,
            facets,
        );
        self.finish_list(&url).await
    }

    /// Walk every published record, oldest-first, re-querying past each
    /// exhausted page boundary by `created` cursor rather than by
    /// `page`/`size` offset (so records inserted during a long scan at
    /// the tail are not missed, unlike offset pagination).
    ///
    /// # Errors
    ///
    /// Yields [`RepositoryError`] for any search/page-follow failure;
    /// the stream ends after yielding the error.
    pub fn scan(
        &self,
        q: Option<&str>,
        facets: HashMap<String, String>,
    ) -> impl Stream<Item = Result<Record, RepositoryError>> + use<> {
        let state = ScanState {
            client: self.clone(),
            base_q: q.map(str::to_owned),
            facets,
            cursor: None,
            seen_in_window: HashSet::new(),
            buffer: VecDeque::new(),
            next_link: None,
            started: false,
            done: false,
        };
        futures_util::stream::unfold(state, scan_step)
    }

    fn resolve_record_url(&self, record_id: &str, published: bool, expand: bool) -> String {
        let mut url = if record_id.starts_with("http://") || record_id.starts_with("https://") {
            record_id.to_owned()
        } else if published {
            self.info.read_url(&self.model, record_id)
        } else {
            self.info.user_read_url(&self.model, record_id)
        };
        if expand {
            url.push_str(if url.contains('?') { "&expand=true" } else { "?expand=true" });
        }
        url
    }

    async fn finish_record(&self, response: crate::connection::Response) -> Result<Record, RepositoryError> {
        let etag = response.etag().map(str::to_owned);
        let mut record: Record = response.json().await?;
        record.connection = Some(self.connection.clone());
        record.etag = etag;
        Ok(record)
    }

    async fn finish_list(&self, url: &str) -> Result<RestList<Record>, RepositoryError> {
        let response = self.connection.get(url).await?;
        let mut list: RestList<Record> = response.json().await?;
        list_inject(&mut list, &self.connection);
        Ok(list)
    }
}

fn build_list_url(
    base: &str,
    q: Option<&str>,
    page: Option<u32>,
    size: Option<u32>,
    sort: Option<&str>,
    facets: &HashMap<String, String>,
) -> String {
    let mut url = match url::Url::parse(base) {
        Ok(url) => url,
        Err(_) => return base.to_owned(),
    };
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(q) = q {
            pairs.append_pair("q", q);
        }
        if let Some(page) = page {
            pairs.append_pair("page", &page.to_string());
        }
        if let Some(size) = size {
            pairs.append_pair("size", &size.to_string());
        }
        if let Some(sort) = sort {
            pairs.append_pair("sort", sort);
        }
        for (key, value) in facets {
            pairs.append_pair(key, value);
        }
    }
    url.to_string()
}

fn list_inject<T>(list: &mut RestList<T>, connection: &Connection) {
    list.connection = Some(connection.clone());
}

/// `mode` argument to [`update_by_path`]: whether the value at the leaf is
/// replaced outright or deep-merged into whatever is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Replace,
    Merge,
}

/// Set `value` at the dotted `path` (`"a.b.3.c"`) inside `root`,
/// creating missing intermediate objects/arrays as needed (an all-digit
/// path segment creates/extends an array; anything else creates an
/// object).
///
/// This is the Rust expression of the source's "build a list of setter
/// wrappers, walk, then replace/merge at the leaf" algorithm (§4.5):
/// rather than materializing setter objects, the walk mutates `root`
/// in place directly, since Rust's `&mut` already gives every step a
/// live handle back to its parent without needing one.
pub fn update_by_path(root: &mut Value, path: &str, value: Value, mode: UpdateMode) {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((head, rest)) = segments.split_first() else {
        apply_leaf(root, value, mode);
        return;
    };
    let child = if let Ok(idx) = head.parse::<usize>() {
        array_slot(root, idx)
    } else {
        object_slot(root, head)
    };
    if rest.is_empty() {
        apply_leaf(child, value, mode);
    } else {
        set_recursive(child, rest, value, mode);
    }
}

fn set_recursive(node: &mut Value, segments: &[&str], value: Value, mode: UpdateMode) {
    let Some((head, rest)) = segments.split_first() else {
        apply_leaf(node, value, mode);
        return;
    };
    let child = if let Ok(idx) = head.parse::<usize>() {
        array_slot(node, idx)
    } else {
        object_slot(node, head)
    };
    if rest.is_empty() {
        apply_leaf(child, value, mode);
    } else {
        set_recursive(child, rest, value, mode);
    }
}

fn array_slot(node: &mut Value, idx: usize) -> &mut Value {
    if !node.is_array() {
        *node = Value::Array(Vec::new());
    }
    let Value::Array(arr) = node else {
        unreachable!("node was just coerced to an array")
    };
    while arr.len() <= idx {
        arr.push(Value::Null);
    }
    &mut arr[idx]
}

fn object_slot<'a>(node: &'a mut Value, key: &str) -> &'a mut Value {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        unreachable!("node was just coerced to an object")
    };
    map.entry(key.to_owned()).or_insert(Value::Null)
}

fn apply_leaf(node: &mut Value, value: Value, mode: UpdateMode) {
    match mode {
        UpdateMode::Replace => *node = value,
        UpdateMode::Merge => merge_value(node, value),
    }
}

fn merge_value(target: &mut Value, incoming: Value) {
    match incoming {
        Value::Object(new_map) => {
            if let Value::Object(existing) = target {
                for (key, value) in new_map {
                    match existing.get_mut(&key) {
                        Some(slot) => merge_value(slot, value),
                        None => {
                            existing.insert(key, value);
                        }
                    }
                }
            } else {
                *target = Value::Object(new_map);
            }
        }
        Value::Array(mut new_items) => {
            if let Value::Array(existing) = target {
                existing.append(&mut new_items);
            } else {
                *target = Value::Array(new_items);
            }
        }
        scalar => *target = scalar,
    }
}

fn record_connection(record: &Record) -> Result<&Connection, RepositoryError> {
    record
        .connection
        .as_ref()
        .ok_or(RepositoryError::MissingLink("connection"))
}

impl Record {
    /// `PUT` the whole record back to `links.self_`, sending `If-Match`
    /// unless `force_etag` bypasses optimistic concurrency.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::EtagMismatch`] on a 412, or the usual
    /// transport/status/JSON errors otherwise.
    pub async fn update(&self, force_etag: bool) -> Result<Record, RepositoryError> {
        let conn = record_connection(self)?.clone();
        let link = self
            .links
            .self_
            .clone()
            .ok_or(RepositoryError::MissingLink("self"))?;
        let if_match = if force_etag { None } else { self.etag.as_deref() };
        let response = conn.put(&link, self, if_match).await?;
        let etag = response.etag().map(str::to_owned);
        let mut updated: Record = response.json().await?;
        updated.connection = Some(conn);
        updated.etag = etag;
        Ok(updated)
    }

    /// `DELETE` the record at `links.self_`, sending `If-Match` from the
    /// record's stored ETag.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::EtagMismatch`] on a 412, or the usual
    /// transport/status errors otherwise.
    pub async fn delete(&self) -> Result<(), RepositoryError> {
        let conn = record_connection(self)?;
        let link = self
            .links
            .self_
            .clone()
            .ok_or(RepositoryError::MissingLink("self"))?;
        conn.delete(&link, self.etag.as_deref()).await?;
        Ok(())
    }

    /// `GET links.files`: the record's attached file bundle.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::MissingLink`] if the record has no
    /// `links.files` (files not enabled), or the usual transport/status
    /// errors otherwise.
    pub async fn files(&self) -> Result<FilesList, RepositoryError> {
        let conn = record_connection(self)?;
        let link = self
            .links
            .files
            .clone()
            .ok_or(RepositoryError::MissingLink("files"))?;
        let response = conn.get(&link).await?;
        let mut list: FilesList = response.json().await?;
        list.connection = Some(conn.clone());
        Ok(list)
    }

    /// `GET links.applicable_requests`: every request type the current
    /// principal may open against this record right now.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::MissingLink`] if the record has no
    /// `links.applicable_requests`, or the usual transport/status errors
    /// otherwise.
    pub async fn applicable_requests(&self) -> Result<RequestTypeList, RepositoryError> {
        let conn = record_connection(self)?;
        let link = self
            .links
            .applicable_requests
            .clone()
            .ok_or(RepositoryError::MissingLink("applicable_requests"))?;
        let response = conn.get(&link).await?;
        let mut list: RequestTypeList = response.json().await?;
        list.connection = Some(conn.clone());
        for request_type in &mut list.request_types {
            request_type.connection = Some(conn.clone());
        }
        Ok(list)
    }

    /// Upload one file into this record's bundle via `engine` (§4.3's
    /// three-phase initiate/upload/commit protocol).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::MissingLink`] if the record has no
    /// `links.files`, or whatever error interrupts the transfer.
    pub async fn upload(
        &self,
        engine: &TransferEngine,
        key: &str,
        metadata: Option<Value>,
        transfer_type: TransferType,
        transfer_metadata: Option<Map<String, Value>>,
        source: &dyn DataSource,
    ) -> Result<File, RepositoryError> {
        let conn = record_connection(self)?;
        let files_link = self
            .links
            .files
            .clone()
            .ok_or(RepositoryError::MissingLink("files"))?;
        let mut file = engine
            .upload(conn, &files_link, key, metadata, transfer_type, transfer_metadata, source)
            .await?;
        file.connection = Some(conn.clone());
        Ok(file)
    }
}

impl<T: DeserializeOwned> RestList<T> {
    /// Follow `links.next`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::MissingLink`] if this list was never
    /// read through a live connection (constructed manually rather than
    /// deserialized from a response), or the usual transport/status/JSON
    /// errors otherwise.
    pub async fn next_page(&self) -> Result<Option<Self>, RepositoryError> {
        self.follow(self.links.next.clone()).await
    }

    /// Follow `links.prev`, if present.
    ///
    /// # Errors
    ///
    /// See [`Self::next_page`].
    pub async fn prev_page(&self) -> Result<Option<Self>, RepositoryError> {
        self.follow(self.links.prev.clone()).await
    }

    async fn follow(&self, link: Option<String>) -> Result<Option<Self>, RepositoryError> {
        let Some(link) = link else {
            return Ok(None);
        };
        let conn = self
            .connection
            .clone()
            .ok_or(RepositoryError::MissingLink("connection"))?;
        let response = conn.get(&link).await?;
        let mut page: Self = response.json().await?;
        page.connection = Some(conn);
        Ok(Some(page))
    }

    /// Walk every page starting from this one, following `links.next`
    /// until it is absent.
    #[must_use]
    pub fn all(self, conn: Connection) -> Pager<T> {
        let next_link = self.links.next.clone();
        Pager {
            connection: conn,
            next_link,
            state: PagerState::Buffered {
                hits: self.into_hits().into_iter(),
            },
        }
    }
}

type PageFuture<T> = Pin<Box<dyn Future<Output = Result<RestList<T>, RepositoryError>> + Send>>;

pin_project! {
    #[project = PagerStateProj]
    enum PagerState<T> {
        Buffered { hits: std::vec::IntoIter<T> },
        Fetching { #[pin] fut: PageFuture<T> },
        Done,
    }
}

pin_project! {
    /// The `impl Stream` backing [`RestList::all`]: buffers the current
    /// page's hits, then follows `links.next` via an in-flight fetch
    /// future once the buffer is drained, grounded in the
    /// `Buffered`/`Fetching`/`Done` state shape of `modkit-sdk`'s
    /// `pager.rs` cursor pagers.
    pub struct Pager<T> {
        connection: Connection,
        next_link: Option<String>,
        #[pin]
        state: PagerState<T>,
    }
}

enum Transition<T> {
    NeedFetch,
    Fetched(Result<RestList<T>, RepositoryError>),
}

impl<T: DeserializeOwned + Send + 'static> Stream for Pager<T> {
    type Item = Result<T, RepositoryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            let transition = match this.state.as_mut().project() {
                PagerStateProj::Buffered { hits } => {
                    if let Some(item) = hits.next() {
                        return Poll::Ready(Some(Ok(item)));
                    }
                    Transition::NeedFetch
                }
                PagerStateProj::Fetching { fut } => match fut.poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(result) => Transition::Fetched(result),
                },
                PagerStateProj::Done => return Poll::Ready(None),
            };

            match transition {
                Transition::NeedFetch => match this.next_link.take() {
                    Some(link) => {
                        let conn = this.connection.clone();
                        let fut: PageFuture<T> = Box::pin(async move {
                            let response = conn.get(&link).await?;
                            response.json::<RestList<T>>().await
                        });
                        this.state.set(PagerState::Fetching { fut });
                    }
                    None => this.state.set(PagerState::Done),
                },
                Transition::Fetched(Ok(page)) => {
                    *this.next_link = page.links.next.clone();
                    this.state.set(PagerState::Buffered {
                        hits: page.into_hits().into_iter(),
                    });
                }
                Transition::Fetched(Err(error)) => {
                    this.state.set(PagerState::Done);
                    return Poll::Ready(Some(Err(error)));
                }
            }
        }
    }
}

struct ScanState {
    client: RecordClient,
    base_q: Option<String>,
    facets: HashMap<String, String>,
    cursor: Option<String>,
    seen_in_window: HashSet<String>,
    buffer: VecDeque<Record>,
    next_link: Option<String>,
    started: bool,
    done: bool,
}

fn scan_query(base_q: Option<&str>, cursor: Option<&str>) -> Option<String> {
    match (base_q, cursor) {
        (None, None) => None,
        (Some(q), None) => Some(q.to_owned()),
        (base, Some(cursor)) => {
            let window = format!("created:[\"{cursor}\" TO *]");
            Some(match base {
                Some(q) => format!("{q} AND {window}"),
                None => window,
            })
        }
    }
}

async fn scan_step(mut state: ScanState) -> Option<(Result<Record, RepositoryError>, ScanState)> {
    loop {
        if state.done {
            return None;
        }
        if let Some(record) = state.buffer.pop_front() {
            let key = record.links.self_.clone().unwrap_or_else(|| record.id.clone());
            if state.seen_in_window.contains(&key) {
                continue;
            }
            state.seen_in_window.insert(key);
            return Some((Ok(record), state));
        }

        if let Some(link) = state.next_link.take() {
            let response = match state.client.connection.get(&link).await {
                Ok(response) => response,
                Err(error) => {
                    state.done = true;
                    return Some((Err(error), state));
                }
            };
            match response.json::<RestList<Record>>().await {
                Ok(mut page) => {
                    list_inject(&mut page, &state.client.connection);
                    state.next_link = page.links.next.clone();
                    state.buffer.extend(page.into_hits());
                    continue;
                }
                Err(error) => {
                    state.done = true;
                    return Some((Err(error), state));
                }
            }
        }

        if state.started && state.next_link.is_none() && state.cursor.is_none() {
            // Window exhausted with no cursor to advance from (the very
            // first window came back empty of a `created` timestamp): no
            // further progress is possible.
            state.done = true;
            continue;
        }

        let q = scan_query(state.base_q.as_deref(), state.cursor.as_deref());
        let facets = state.facets.clone();
        let result = state
            .client
            .search(q.as_deref(), None, None, &facets)
            .await;
        match result {
            Ok(mut page) => {
                if page.hits.hits.is_empty() {
                    state.done = true;
                    continue;
                }
                state.seen_in_window.clear();
                let new_cursor = page.hits.hits.last().and_then(|r| r.created).map(|d| d.to_rfc3339());
                state.next_link = page.links.next.clone();
                state.buffer.extend(std::mem::take(&mut page.hits.hits));
                state.started = true;
                if let Some(cursor) = new_cursor {
                    state.cursor = Some(cursor);
                }
            }
            Err(error) => {
                state.done = true;
                return Some((Err(error), state));
            }
        }
    }
}
