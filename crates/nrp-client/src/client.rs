//! [`Client`]: wires a [`RepositoryConfig`] into a ready-to-use
//! [`Connection`], discovered [`RepositoryInfo`], and the
//! [`RecordClient`]/[`RequestClient`] entry points callers actually use.
//!
//! Grounded in `modkit-http`'s builder-then-client split: construction is
//! cheap and infallible-ish (one TLS client build), discovery is a
//! separate, explicit, cacheable async step — never hidden inside
//! `Client::new` — so a caller who already has a cached [`RepositoryInfo`]
//! (§6: "persisted... `info` is cached inside the config") can skip the
//! network round-trip entirely.

use crate::auth::{AuthToken, TokenStore};
use crate::config::{RepositoryConfig, RepositoryInfo};
use crate::connection::{Connection, ConnectionOptions};
use crate::error::RepositoryError;
use crate::records::RecordClient;
use crate::requests::RequestClient;

/// A repository identifier in one of three shapes (§4.8): an opaque id
/// against the default repository, an already-resolved absolute URL, or
/// a DOI. DOI *resolution* (the HTTP GET against a public resolver) is an
/// explicit non-goal (§1) and a collaborator's job; this crate only
/// classifies the string so the collaborator knows which of its own
/// steps to take next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordIdKind {
    /// A bare id, to be used against this client's own repository.
    Opaque,
    /// Already an absolute URL; `owns` reports whether it matches this
    /// client's repository by `{scheme, host}`.
    Url { owns: bool },
    /// A DOI reference (`doi:10.5281/...` or `https://doi.org/...`),
    /// which must be resolved to a URL by a collaborator before it can be
    /// read through any [`RecordClient`].
    Doi,
}

const DOI_SCHEME_PREFIX: &str = "doi:";
const DOI_RESOLVER_HOST: &str = "doi.org";

/// Classify a free-form record identifier per §4.8's three cases,
/// without performing any network I/O.
#[must_use]
pub fn classify_record_id(config: &RepositoryConfig, id: &str) -> RecordIdKind {
    if let Some(rest) = id.strip_prefix(DOI_SCHEME_PREFIX) {
        if !rest.is_empty() {
            return RecordIdKind::Doi;
        }
    }
    if let Ok(url) = url::Url::parse(id) {
        if url.host_str() == Some(DOI_RESOLVER_HOST) {
            return RecordIdKind::Doi;
        }
        let owns = url::Url::parse(&config.base_url)
            .is_ok_and(|base| base.scheme() == url.scheme() && base.host() == url.host());
        return RecordIdKind::Url { owns };
    }
    RecordIdKind::Opaque
}

/// One connected repository: owns the [`Connection`], the discovered (or
/// supplied) [`RepositoryInfo`], and hands out typed
/// [`RecordClient`]/[`RequestClient`] instances for it.
#[derive(Clone)]
pub struct Client {
    config: RepositoryConfig,
    connection: Connection,
    info: RepositoryInfo,
}

impl Client {
    /// Open a connection for `config` and discover its [`RepositoryInfo`]
    /// via `.well-known/repository` (falling back to synthesized RDM
    /// routing per §4.8 if the host predates that endpoint).
    ///
    /// If `config.info` is already populated (a caller round-tripped it
    /// from a previous `connect`, §6), that cached value is used directly
    /// and no discovery round-trip is made; call [`Self::refresh_info`]
    /// to force one.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Communication`] if the underlying HTTP
    /// client fails to build, or whatever error interrupts discovery.
    pub async fn connect(config: RepositoryConfig) -> Result<Self, RepositoryError> {
        let connection = open_connection(&config)?;
        let info = match config.info.clone() {
            Some(info) => info,
            None => RepositoryInfo::discover(&connection).await?,
        };
        Ok(Self {
            config,
            connection,
            info,
        })
    }

    /// Build a client from a `config` and an already-known `info`,
    /// skipping the discovery round-trip entirely (the cached-`info` path
    /// from §6: a caller that persisted `info` from a previous `connect`
    /// need not re-discover on every invocation).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Communication`] if the underlying HTTP
    /// client fails to build.
    pub fn from_cached_info(config: RepositoryConfig, info: RepositoryInfo) -> Result<Self, RepositoryError> {
        let connection = open_connection(&config)?;
        Ok(Self {
            config,
            connection,
            info,
        })
    }

    /// Re-run discovery, replacing the cached [`RepositoryInfo`] (the
    /// `info(refresh=true)` path of §6/§3).
    ///
    /// # Errors
    ///
    /// Returns whatever error interrupts discovery.
    pub async fn refresh_info(&mut self) -> Result<(), RepositoryError> {
        self.info = RepositoryInfo::discover(&self.connection).await?;
        self.config.info = Some(self.info.clone());
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    #[must_use]
    pub fn info(&self) -> &RepositoryInfo {
        &self.info
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// A typed entry point for `model`'s record endpoints, or the
    /// repository's sole declared model (or the aggregate `"records"`
    /// endpoint) if `model` is `None` ([`RepositoryInfo::resolve_model`]).
    #[must_use]
    pub fn records(&self, model: Option<&str>) -> RecordClient {
        RecordClient::new(self.connection.clone(), self.info.clone(), model)
    }

    /// The top-level request listing client (§4.6: global listing by
    /// status family, independent of any one record's
    /// `applicable_requests`).
    #[must_use]
    pub fn requests(&self) -> RequestClient {
        RequestClient::new(self.connection.clone(), &self.info)
    }

    /// Classify `id` per §4.8 against this client's own repository.
    #[must_use]
    pub fn classify_record_id(&self, id: &str) -> RecordIdKind {
        classify_record_id(&self.config, id)
    }
}

fn open_connection(config: &RepositoryConfig) -> Result<Connection, RepositoryError> {
    if !config.enabled {
        return Err(RepositoryError::RepositoryDisabled(
            config.alias.clone().unwrap_or_else(|| config.base_url.clone()),
        ));
    }
    let tokens = TokenStore::new();
    if let Some(token) = &config.token {
        if let Some(host) = url::Url::parse(&config.base_url).ok().and_then(|u| u.host_str().map(str::to_owned)) {
            tokens.set(host, AuthToken::new(token.clone()));
        }
    }
    let options = ConnectionOptions {
        retry_count: usize::try_from(config.retry_count).unwrap_or(usize::MAX),
        retry_after_seconds: config.retry_after_seconds,
        max_concurrent_requests: config
            .max_concurrent_requests
            .unwrap_or_else(|| ConnectionOptions::default().max_concurrent_requests),
    };
    Connection::with_options(config.base_url.clone(), tokens, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> RepositoryConfig {
        RepositoryConfig::new(base_url)
    }

    #[test]
    fn classify_opaque_id() {
        let cfg = config("https://repo.example");
        assert_eq!(classify_record_id(&cfg, "abc123"), RecordIdKind::Opaque);
    }

    #[test]
    fn classify_doi_scheme_prefix() {
        let cfg = config("https://repo.example");
        assert_eq!(classify_record_id(&cfg, "doi:10.5281/zenodo.1234"), RecordIdKind::Doi);
    }

    #[test]
    fn classify_doi_resolver_url() {
        let cfg = config("https://repo.example");
        assert_eq!(
            classify_record_id(&cfg, "https://doi.org/10.5281/zenodo.1234"),
            RecordIdKind::Doi
        );
    }

    #[test]
    fn classify_owning_url() {
        let cfg = config("https://repo.example");
        assert_eq!(
            classify_record_id(&cfg, "https://repo.example/api/records/abc123"),
            RecordIdKind::Url { owns: true }
        );
    }

    #[test]
    fn classify_foreign_url() {
        let cfg = config("https://repo.example");
        assert_eq!(
            classify_record_id(&cfg, "https://other.example/api/records/abc123"),
            RecordIdKind::Url { owns: false }
        );
    }

    #[test]
    fn open_connection_rejects_disabled_repository() {
        let mut cfg = config("https://repo.example").with_alias("disabled-repo");
        cfg.enabled = false;
        let err = open_connection(&cfg).expect_err("disabled repository must not connect");
        assert!(matches!(err, RepositoryError::RepositoryDisabled(alias) if alias == "disabled-repo"));
    }

    #[test]
    fn open_connection_threads_retry_options_through() {
        let mut cfg = config("https://repo.example");
        cfg.retry_count = 2;
        cfg.retry_after_seconds = 3;
        cfg.max_concurrent_requests = Some(7);
        assert!(open_connection(&cfg).is_ok());
    }
}
