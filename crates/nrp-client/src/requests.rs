//! The Requests API (§4.6): the `created -> submitted -> accepted|declined`
//! state machine, applicable-request creation off a [`Record`], and the
//! top-level [`RequestClient`] that lists requests across every record by
//! status family.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::config::RepositoryInfo;
use crate::connection::Connection;
use crate::dto::{Request, RequestStatus, RequestType, RestList};
use crate::error::RepositoryError;

/// Split every colon-delimited key (`"published_record:links:self"`) in a
/// request payload into a nested object, so callers see a regular tree
/// rather than upstream's flattened wire shape (§4.6.1).
///
/// Keys without a `:` pass through unchanged. Runs once, right after the
/// payload is parsed off the wire — not scattered across call sites.
#[must_use]
pub fn expand_colon_keys(flat: Map<String, Value>) -> Value {
    let mut root = Map::new();
    for (key, value) in flat {
        let mut segments = key.split(':');
        let Some(first) = segments.next() else {
            continue;
        };
        let mut node = root.entry(first.to_owned()).or_insert(Value::Object(Map::new()));
        let rest: Vec<&str> = segments.collect();
        for segment in &rest {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                unreachable!("node was just coerced to an object")
            };
            node = map.entry((*segment).to_owned()).or_insert(Value::Object(Map::new()));
        }
        *node = value;
    }
    Value::Object(root)
}

/// Parse a request's `payload`, expanding colon-delimited keys if the
/// payload arrived as a flat object; non-object payloads (or those
/// already nested) pass through unchanged.
#[must_use]
pub fn normalize_payload(payload: Value) -> Value {
    match payload {
        Value::Object(flat) if flat.keys().any(|k| k.contains(':')) => expand_colon_keys(flat),
        other => other,
    }
}

fn request_connection(request: &Request) -> Result<&Connection, RepositoryError> {
    request
        .connection
        .as_ref()
        .ok_or(RepositoryError::MissingLink("connection"))
}

async fn finish_request(
    conn: Connection,
    response: crate::connection::Response,
) -> Result<Request, RepositoryError> {
    let etag = response.etag().map(str::to_owned);
    let mut request: Request = response.json().await?;
    if let Some(payload) = request.payload.take() {
        request.payload = Some(normalize_payload(payload));
    }
    request.connection = Some(conn);
    request.etag = etag;
    Ok(request)
}

impl Request {
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// `POST links.actions.submit`: move `created -> submitted`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] if `status !=
    /// Created` or the server omitted the `submit` action link (no
    /// permission), or the usual transport/status/JSON errors otherwise.
    pub async fn submit(&self) -> Result<Request, RepositoryError> {
        self.transition("submit", RequestStatus::Created, |l| l.submit.as_deref())
            .await
    }

    /// `POST links.actions.cancel`: move `created -> cancelled`.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn cancel(&self) -> Result<Request, RepositoryError> {
        self.transition("cancel", RequestStatus::Created, |l| l.cancel.as_deref())
            .await
    }

    /// `POST links.actions.accept`: move `submitted -> accepted`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] if `status !=
    /// Submitted` or the server omitted the `accept` action link, or the
    /// usual transport/status/JSON errors otherwise.
    pub async fn accept(&self) -> Result<Request, RepositoryError> {
        self.transition("accept", RequestStatus::Submitted, |l| l.accept.as_deref())
            .await
    }

    /// `POST links.actions.decline`: move `submitted -> declined`.
    ///
    /// # Errors
    ///
    /// See [`Self::accept`].
    pub async fn decline(&self) -> Result<Request, RepositoryError> {
        self.transition("decline", RequestStatus::Submitted, |l| l.decline.as_deref())
            .await
    }

    async fn transition(
        &self,
        action: &'static str,
        required: RequestStatus,
        link: impl Fn(&crate::dto::RequestActionLinks) -> Option<&str>,
    ) -> Result<Request, RepositoryError> {
        if self.status != required {
            return Err(RepositoryError::InvalidTransition {
                action,
                status: self.status,
            });
        }
        let conn = request_connection(self)?.clone();
        let url = link(&self.links.actions).ok_or(RepositoryError::InvalidTransition {
            action,
            status: self.status,
        })?;
        let response = conn.post(url, &Value::Object(Map::new())).await?;
        finish_request(conn, response).await
    }
}

impl RequestType {
    /// `POST links.actions.create` with `payload`, optionally immediately
    /// `submit()`-ing the resulting request.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::MissingLink`] if this request type has
    /// no `links.actions.create` (the current principal may not open one
    /// of this type), or whatever error interrupts create/submit.
    pub async fn create(&self, payload: Value, submit: bool) -> Result<Request, RepositoryError> {
        let conn = self
            .connection
            .as_ref()
            .ok_or(RepositoryError::MissingLink("connection"))?
            .clone();
        let url = self
            .links
            .actions
            .create
            .as_deref()
            .ok_or(RepositoryError::MissingLink("actions.create"))?;
        let response = conn.post(url, &payload).await?;
        let request = finish_request(conn, response).await?;
        if submit {
            request.submit().await
        } else {
            Ok(request)
        }
    }
}

/// The status family a [`RequestClient::list`] query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatusFilter {
    Created,
    Submitted,
    Accepted,
    Declined,
    Cancelled,
    Expired,
}

impl RequestStatusFilter {
    fn as_query_value(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

/// The top-level entry point for listing requests across every record
/// (rather than one record's `applicable_requests`), filtered by status
/// family and paginated like any other [`RestList`].
#[derive(Clone)]
pub struct RequestClient {
    connection: Connection,
    requests_url: String,
}

impl RequestClient {
    #[must_use]
    pub fn new(connection: Connection, info: &RepositoryInfo) -> Self {
        Self {
            connection,
            requests_url: format!("{}/api/requests", info.base_url),
        }
    }

    /// List requests in `status`, paginated by `page`/`size`.
    ///
    /// # Errors
    ///
    /// Returns the usual transport/status/JSON errors.
    pub async fn list(
        &self,
        status: RequestStatusFilter,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<RestList<Request>, RepositoryError> {
        let mut facets = HashMap::new();
        facets.insert("status".to_owned(), status.as_query_value().to_owned());
        let url = build_request_list_url(&self.requests_url, page, size, &facets);
        let response = self.connection.get(&url).await?;
        let mut list: RestList<Request> = response.json().await?;
        list.connection = Some(self.connection.clone());
        for request in &mut list.hits.hits {
            request.connection = Some(self.connection.clone());
            if let Some(payload) = request.payload.take() {
                request.payload = Some(normalize_payload(payload));
            }
        }
        Ok(list)
    }
}

fn build_request_list_url(
    base: &str,
    page: Option<u32>,
    size: Option<u32>,
    facets: &HashMap<String, String>,
) -> String {
    let mut url = match url::Url::parse(base) {
        Ok(url) => url,
        Err(_) => return base.to_owned(),
    };
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(page) = page {
            pairs.append_pair("page", &page.to_string());
        }
        if let Some(size) = size {
            pairs.append_pair("size", &size.to_string());
        }
        for (key, value) in facets {
            pairs.append_pair(key, value);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use crate::dto::RequestActionLinks;
    use httpmock::MockServer;

    fn test_connection(server: &MockServer) -> Connection {
        Connection::new_insecure(server.base_url(), TokenStore::new())
            .expect("connection should build")
    }

    fn request_with(status: RequestStatus, actions: RequestActionLinks) -> Request {
        serde_json::from_value::<Request>(serde_json::json!({
            "id": "req-1",
            "type": "publish_draft",
            "status": match status {
                RequestStatus::Created => "created",
                RequestStatus::Submitted => "submitted",
                RequestStatus::Accepted => "accepted",
                RequestStatus::Declined => "declined",
                RequestStatus::Cancelled => "cancelled",
                RequestStatus::Expired => "expired",
            },
            "created_by": {"user": "1"},
            "receiver": {"user": "2"},
            "topic": {"record": "rec1"},
            "links": {"actions": {}},
        }))
        .map(|mut r| {
            r.links.actions = actions;
            r
        })
        .expect("deserialize request")
    }

    #[test]
    fn expand_colon_keys_builds_nested_tree() {
        let mut flat = Map::new();
        flat.insert(
            "published_record:links:self".to_owned(),
            Value::String("https://x/records/1".to_owned()),
        );
        let nested = expand_colon_keys(flat);
        assert_eq!(
            nested,
            serde_json::json!({"published_record": {"links": {"self": "https://x/records/1"}}})
        );
    }

    #[test]
    fn expand_colon_keys_passes_through_plain_keys() {
        let mut flat = Map::new();
        flat.insert("comment".to_owned(), Value::String("hi".to_owned()));
        let nested = expand_colon_keys(flat);
        assert_eq!(nested, serde_json::json!({"comment": "hi"}));
    }

    #[test]
    fn normalize_payload_leaves_plain_object_unchanged() {
        let value = serde_json::json!({"comment": "hi"});
        assert_eq!(normalize_payload(value.clone()), value);
    }

    #[tokio::test]
    async fn submit_from_created_succeeds() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/actions/submit");
            then.status(200).json_body(serde_json::json!({
                "id": "req-1",
                "type": "publish_draft",
                "status": "submitted",
                "created_by": {"user": "1"},
                "receiver": {"user": "2"},
                "topic": {"record": "rec1"},
                "links": {"actions": {"accept": format!("{}/actions/accept", server.base_url())}},
            }));
        });
        let conn = test_connection(&server);
        let mut request = request_with(
            RequestStatus::Created,
            RequestActionLinks {
                submit: Some(format!("{}/actions/submit", server.base_url())),
                ..Default::default()
            },
        );
        request.connection = Some(conn);
        let updated = request.submit().await.expect("submit");
        assert_eq!(updated.status, RequestStatus::Submitted);
    }

    #[tokio::test]
    async fn accept_from_created_is_invalid_transition() {
        let server = MockServer::start();
        let conn = test_connection(&server);
        let mut request = request_with(RequestStatus::Created, RequestActionLinks::default());
        request.connection = Some(conn);
        let err = request.accept().await.expect_err("should fail");
        assert!(matches!(err, RepositoryError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn submit_without_action_link_is_invalid_transition() {
        let server = MockServer::start();
        let conn = test_connection(&server);
        let mut request = request_with(RequestStatus::Created, RequestActionLinks::default());
        request.connection = Some(conn);
        let err = request.submit().await.expect_err("should fail");
        assert!(matches!(err, RepositoryError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn decline_from_submitted_succeeds() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/actions/decline");
            then.status(200).json_body(serde_json::json!({
                "id": "req-1",
                "type": "publish_draft",
                "status": "declined",
                "created_by": {"user": "1"},
                "receiver": {"user": "2"},
                "topic": {"record": "rec1"},
                "links": {"actions": {}},
            }));
        });
        let conn = test_connection(&server);
        let mut request = request_with(
            RequestStatus::Submitted,
            RequestActionLinks {
                decline: Some(format!("{}/actions/decline", server.base_url())),
                ..Default::default()
            },
        );
        request.connection = Some(conn);
        let updated = request.decline().await.expect("decline");
        assert_eq!(updated.status, RequestStatus::Declined);
    }

    #[tokio::test]
    async fn list_sends_status_as_query_param() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET)
                .path("/api/requests")
                .query_param("status", "submitted");
            then.status(200).json_body(serde_json::json!({
                "hits": {"hits": [], "total": 0},
                "links": {}
            }));
        });
        let conn = test_connection(&server);
        let info = RepositoryInfo {
            base_url: server.base_url(),
            version: String::new(),
            models: Vec::new(),
            transfer_types: Vec::new(),
            flavor: crate::config::RepositoryFlavor::Nrp,
        };
        let client = RequestClient::new(conn, &info);
        let list = client
            .list(RequestStatusFilter::Submitted, None, None)
            .await
            .expect("list");
        assert_eq!(list.total(), 0);
        mock.assert();
    }
}
