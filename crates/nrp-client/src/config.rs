//! Repository configuration, discovery, and URL routing.
//!
//! A [`RepositoryConfig`] is the minimum a caller must supply: a base URL
//! and (optionally) a bearer token. Everything else — the flavor of the
//! REST API in front of us, the concrete search/create/read URLs — is
//! either supplied explicitly or discovered once via the
//! `.well-known/repository` endpoint (falling back to bare RDM routing
//! conventions when a host predates that endpoint).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::connection::Connection;
use crate::error::RepositoryError;

const WELL_KNOWN_REPOSITORY_PATH: &str = "/.well-known/repository";
const DEFAULT_CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_PATH_ENV_VAR: &str = "NRP_CMD_CONFIG_PATH";
const CONFIG_ENV_PREFIX: &str = "NRP_";

/// Default retry count (§3: "retry count"), matching [`Connection`]'s
/// hardcoded default until a caller overrides it.
const DEFAULT_RETRY_COUNT: u32 = 5;

/// Default retry-after seconds (§3: "retry-after seconds") used as the
/// exponential backoff's starting delay.
const DEFAULT_RETRY_AFTER_SECONDS: u64 = 1;

/// Caller-supplied configuration for a single repository connection
/// (§3's `RepositoryConfig`): an alias, the base URL, optional auth, and
/// the retry/enablement knobs a persisted multi-repository config file
/// would carry per entry. Persisting a *list* of these under a shared
/// `default_alias`/`per_directory_variables` envelope (§6) is a
/// collaborator concern (§1's non-goals: "persistent per-user
/// configuration file format"); this type is just the one-repository
/// unit that collaborator would serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// A caller-chosen unique key for this repository, independent of
    /// its URL (so a config file can rename a host without callers
    /// needing to update every reference).
    #[serde(default)]
    pub alias: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Whether TLS certificate verification is enforced for this
    /// repository. `nrp_http`'s rustls stack has no certificate-bypass
    /// primitive (by design: see `DESIGN.md`), so `false` is accepted and
    /// round-tripped for fidelity with §3's data model but does not
    /// currently relax verification; [`crate::client::Client::connect`]
    /// always verifies.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_after_seconds")]
    pub retry_after_seconds: u64,
    /// Whether this repository entry should be used at all. A disabled
    /// entry is skipped by collaborators that iterate a multi-repository
    /// config file; [`crate::client::Client::connect`] rejects it.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub max_concurrent_requests: Option<usize>,
    /// The last [`RepositoryInfo`] discovered for this repository, so a
    /// caller that persists `RepositoryConfig` need not re-discover on
    /// every invocation (§6: "`info` is cached inside the config").
    #[serde(default)]
    pub info: Option<RepositoryInfo>,
}

fn default_true() -> bool {
    true
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_after_seconds() -> u64 {
    DEFAULT_RETRY_AFTER_SECONDS
}

impl RepositoryConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            alias: None,
            base_url: base_url.into(),
            token: None,
            verify_tls: true,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_after_seconds: DEFAULT_RETRY_AFTER_SECONDS,
            enabled: true,
            max_concurrent_requests: None,
            info: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Load configuration by merging, in order: built-in defaults, a JSON
    /// config file, then `NRP_`-prefixed environment variables.
    ///
    /// The config file path is `$NRP_CMD_CONFIG_PATH` if set, otherwise
    /// `<dirs::config_dir()>/nrp/config.json`. A missing file is not an
    /// error; env vars and defaults still apply.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidUrl`]-shaped figment errors
    /// wrapped as [`RepositoryError::Io`] if the file exists but cannot be
    /// parsed, or if no `base_url` is available from any source.
    pub fn load() -> Result<Self, RepositoryError> {
        use figment::providers::{Env, Format, Json, Serialized};
        use figment::Figment;

        let config_path = std::env::var(CONFIG_PATH_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());

        let defaults = RepositoryConfig::new(String::new());

        let figment = Figment::new()
            .merge(Serialized::defaults(defaults))
            .merge(Json::file(config_path))
            .merge(Env::prefixed(CONFIG_ENV_PREFIX));

        let config: RepositoryConfig = figment
            .extract()
            .map_err(|e| RepositoryError::InvalidUrl(String::new(), e.to_string()))?;

        if config.base_url.is_empty() {
            return Err(RepositoryError::InvalidUrl(
                String::new(),
                "no base_url configured (set NRP_BASE_URL or a config file)".to_owned(),
            ));
        }

        Ok(config)
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nrp")
        .join(DEFAULT_CONFIG_FILE_NAME)
}

/// The flavor of REST API a repository speaks, used to route around wire
/// format divergence between a plain RDM instance and upstream Zenodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryFlavor {
    Nrp,
    Zenodo,
}

impl Default for RepositoryFlavor {
    fn default() -> Self {
        Self::Nrp
    }
}

impl RepositoryFlavor {
    fn from_version_string(version: &str) -> Self {
        if version.to_ascii_lowercase().contains("zenodo") {
            Self::Zenodo
        } else {
            Self::Nrp
        }
    }
}

/// Identifying information about one data model exposed by a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

/// Discovered (or assumed) facts about a repository, used to route every
/// subsequent request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub base_url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    /// File-transfer type names this repository accepts, as advertised
    /// at discovery. Falls back to `["local-file"]` for hosts predating
    /// the `.well-known/repository` endpoint.
    #[serde(default = "default_transfer_types")]
    pub transfer_types: Vec<String>,
    #[serde(skip)]
    pub flavor: RepositoryFlavor,
}

fn default_transfer_types() -> Vec<String> {
    vec!["local-file".to_owned()]
}

impl RepositoryInfo {
    /// Discover repository metadata via `.well-known/repository`, falling
    /// back to bare RDM conventions (flavor `Nrp`, no declared models) if
    /// the endpoint is absent (404) on older hosts.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] for any non-404 transport or server
    /// failure while probing the endpoint.
    pub async fn discover(connection: &Connection) -> Result<Self, RepositoryError> {
        match connection.get(WELL_KNOWN_REPOSITORY_PATH).await {
            Ok(response) => {
                #[derive(Deserialize)]
                struct Discovered {
                    #[serde(default)]
                    version: String,
                    #[serde(default)]
                    models: Vec<ModelInfo>,
                    #[serde(default = "default_transfer_types")]
                    transfer_types: Vec<String>,
                }
                let discovered: Discovered = response.json().await?;
                let flavor = RepositoryFlavor::from_version_string(&discovered.version);
                Ok(Self {
                    base_url: connection.base_url().to_owned(),
                    version: discovered.version,
                    models: discovered.models,
                    transfer_types: discovered.transfer_types,
                    flavor,
                })
            }
            Err(RepositoryError::Client { status, .. }) if status == http::StatusCode::NOT_FOUND => {
                Ok(Self {
                    base_url: connection.base_url().to_owned(),
                    version: String::new(),
                    models: Vec::new(),
                    transfer_types: default_transfer_types(),
                    flavor: RepositoryFlavor::Nrp,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// The single declared model's name, if discovery found exactly one.
    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        match self.models.as_slice() {
            [only] => Some(only.name.as_str()),
            _ => None,
        }
    }

    /// Resolve an optional caller-supplied model name to the one actually
    /// used for routing: the name itself if given, else the sole
    /// declared model, else the aggregate `"records"` endpoint (§4.8).
    #[must_use]
    pub fn resolve_model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model.or_else(|| self.default_model()).unwrap_or("records")
    }

    #[must_use]
    pub fn search_url(&self, model: &str) -> String {
        format!("{}/api/{model}", self.base_url)
    }

    #[must_use]
    pub fn user_search_url(&self, model: &str) -> String {
        format!("{}/api/user/{model}", self.base_url)
    }

    #[must_use]
    pub fn create_url(&self, model: &str) -> String {
        format!("{}/api/{model}", self.base_url)
    }

    #[must_use]
    pub fn read_url(&self, model: &str, id: &str) -> String {
        format!("{}/api/{model}/{id}", self.base_url)
    }

    #[must_use]
    pub fn user_read_url(&self, model: &str, id: &str) -> String {
        format!("{}/api/user/{model}/{id}", self.base_url)
    }

    #[must_use]
    pub fn requests_url(&self, id: &str) -> String {
        format!("{}/api/requests/{id}", self.base_url)
    }

    /// Resolve which repository a (possibly opaque, possibly
    /// already-resolved DOI/full-URL) record identifier belongs to.
    ///
    /// Identifiers that are already an absolute URL on this repository's
    /// host are matched directly; anything else (a bare record id, or a
    /// DOI that has already been re-resolved to a URL by the caller) is
    /// assumed to belong to this repository, matching the source's
    /// default-repo fallback for opaque ids.
    #[must_use]
    pub fn owns_url(&self, candidate: &str) -> bool {
        let (Ok(candidate_url), Ok(base_url)) = (Url::parse(candidate), Url::parse(&self.base_url))
        else {
            return false;
        };
        candidate_url.scheme() == base_url.scheme() && candidate_url.host() == base_url.host()
    }
}
