//! The domain error taxonomy for a single repository connection.
//!
//! Transport-shaped failures (timeouts, TLS, connection refused) stay in
//! [`nrp_http::HttpError`]; this enum is what callers of [`crate::Connection`]
//! and the Records/Requests APIs actually match on. Grounded in
//! `modkit-http`'s `error.rs` style: `#[non_exhaustive]`, `#[source]`/`#[from]`
//! preserving the error chain, one enum per crate boundary.

use serde_json::Value;
use thiserror::Error;

/// A parsed (or synthesized) JSON error body from a non-2xx response.
///
/// When the response body parses as JSON, `reason` is that value verbatim.
/// When it doesn't (or is empty), `reason` is a synthetic
/// `{"status": ..., "reason": <raw text>}` envelope, matching the
/// source's fallback for non-JSON error bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub status: u16,
    pub reason: Value,
}

impl ErrorPayload {
    #[must_use]
    pub fn from_body(status: http::StatusCode, body: &[u8], content_type: Option<&str>) -> Self {
        let looks_json = content_type.is_some_and(|ct| ct.contains("json"));
        let parsed = if looks_json || !body.is_empty() {
            serde_json::from_slice::<Value>(body).ok()
        } else {
            None
        };
        match parsed {
            Some(reason) => Self {
                status: status.as_u16(),
                reason,
            },
            None => Self {
                status: status.as_u16(),
                reason: Value::String(String::from_utf8_lossy(body).into_owned()),
            },
        }
    }
}

/// Root error type for all repository operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepositoryError {
    /// Transport/network failure (connect, TLS, timeout) that exhausted retries
    /// or was not retryable for the method in question.
    #[error("communication with {host} failed: {source}")]
    Communication {
        host: String,
        #[source]
        source: nrp_http::HttpError,
    },

    /// 5xx response with a parsed (or synthesized) JSON payload.
    #[error("server error {status} from {method} {url}")]
    Server {
        method: http::Method,
        url: String,
        status: http::StatusCode,
        payload: ErrorPayload,
    },

    /// 4xx response (other than 412, see [`Self::EtagMismatch`]) with a parsed
    /// (or synthesized) JSON payload.
    #[error("client error {status} from {method} {url}")]
    Client {
        method: http::Method,
        url: String,
        status: http::StatusCode,
        payload: ErrorPayload,
    },

    /// A response body that was required to be JSON failed to parse.
    #[error("expected JSON response, got non-JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// A required HATEOAS link was absent from a response.
    #[error("required link {0:?} missing from response")]
    MissingLink(&'static str),

    /// 412 Precondition Failed: the ETag supplied with the write no longer
    /// matches the server's current revision.
    #[error("ETag mismatch on write (412 Precondition Failed): {method} {url}")]
    EtagMismatch {
        method: http::Method,
        url: String,
        payload: ErrorPayload,
    },

    /// Every part uploaded successfully but the commit response reported a
    /// status other than `completed`.
    #[error("upload commit did not complete: status={0}")]
    UploadIncomplete(String),

    /// A feature the source intentionally does not implement (and this crate
    /// preserves that surface rather than guessing at a strategy).
    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),

    /// A multipart (or otherwise range-split) transfer was requested from
    /// a [`crate::DataSource`] that does not support independent,
    /// restartable range reads (§4.3).
    #[error("source does not support ranged reads; only single-part local transfer is available")]
    SourceRangeUnsupported,

    /// A request-state-machine transition was attempted from a status
    /// that does not permit it (§4.6: submit/cancel require `created`,
    /// accept/decline require `submitted`).
    #[error("cannot {action} a request in status {status:?}")]
    InvalidTransition {
        action: &'static str,
        status: crate::dto::RequestStatus,
    },

    /// A multipart part-size computation was out of bounds.
    #[error("multipart sizing error: {0}")]
    MultipartMath(#[from] crate::multipart::MultipartMathError),

    /// A source/sink I/O failure (file read/write, allocation).
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A URL failed to parse or was rejected by transport security rules.
    #[error("invalid URL '{0}': {1}")]
    InvalidUrl(String, String),

    /// [`crate::RepositoryConfig::enabled`] was `false` when a connection
    /// was requested (§3: a disabled repository entry is kept around for
    /// its config but must not be dialed).
    #[error("repository '{0}' is disabled")]
    RepositoryDisabled(String),
}

impl RepositoryError {
    /// Build the right `Server`/`Client`/`EtagMismatch` variant from a
    /// non-2xx status and a raw body, or `Communication` for a transport
    /// error. Never returns a variant for 2xx.
    pub(crate) fn from_http_status(
        method: http::Method,
        url: String,
        status: http::StatusCode,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Self {
        let payload = ErrorPayload::from_body(status, body, content_type);
        if status == http::StatusCode::PRECONDITION_FAILED {
            return Self::EtagMismatch {
                method,
                url,
                payload,
            };
        }
        if status.is_server_error() {
            return Self::Server {
                method,
                url,
                status,
                payload,
            };
        }
        Self::Client {
            method,
            url,
            status,
            payload,
        }
    }

    /// True for the concurrency-fault class (§7: "the caller must re-read
    /// and retry").
    #[must_use]
    pub fn is_etag_mismatch(&self) -> bool {
        matches!(self, Self::EtagMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_parses_json_body() {
        let payload = ErrorPayload::from_body(
            http::StatusCode::BAD_REQUEST,
            br#"{"message": "bad"}"#,
            Some("application/json"),
        );
        assert_eq!(payload.status, 400);
        assert_eq!(payload.reason, serde_json::json!({"message": "bad"}));
    }

    #[test]
    fn error_payload_synthesizes_envelope_for_non_json() {
        let payload =
            ErrorPayload::from_body(http::StatusCode::BAD_GATEWAY, b"upstream down", None);
        assert_eq!(payload.status, 502);
        assert_eq!(payload.reason, Value::String("upstream down".to_owned()));
    }

    #[test]
    fn from_http_status_maps_412_to_etag_mismatch() {
        let err = RepositoryError::from_http_status(
            http::Method::PUT,
            "https://repo.example/api/records/1".to_owned(),
            http::StatusCode::PRECONDITION_FAILED,
            b"{}",
            Some("application/json"),
        );
        assert!(err.is_etag_mismatch());
    }

    #[test]
    fn from_http_status_maps_5xx_to_server() {
        let err = RepositoryError::from_http_status(
            http::Method::GET,
            "https://repo.example/api/records".to_owned(),
            http::StatusCode::INTERNAL_SERVER_ERROR,
            b"{}",
            Some("application/json"),
        );
        assert!(matches!(err, RepositoryError::Server { .. }));
    }

    #[test]
    fn from_http_status_maps_4xx_to_client() {
        let err = RepositoryError::from_http_status(
            http::Method::GET,
            "https://repo.example/api/records/missing".to_owned(),
            http::StatusCode::NOT_FOUND,
            b"{}",
            Some("application/json"),
        );
        assert!(matches!(err, RepositoryError::Client { .. }));
    }
}
