// crates/sync-engine/src/http.rs
//! REST implementation of the remote data source

use crate::remote::{RemoteDataSource, RemoteError, RemotePage};
use fitsync_config::RemoteConfig;
use fitsync_core::{Cursor, Entity, EntityKind, EntityRef};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// HTTP remote configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// API root, e.g. `https://api.fitsync.app`
    pub base_url: String,
    /// Per-request timeout enforced by the client
    pub timeout: Duration,
    pub auth_token: Option<String>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from_config(&RemoteConfig::default())
    }
}

impl HttpConfig {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: config.request_timeout(),
            auth_token: config.auth_token.clone(),
            user_agent: format!("FitSync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageBody {
    entities: Vec<serde_json::Value>,
    cursor: i64,
}

/// Talks to the FitSync REST API.
///
/// Entities live under `/entities/{collection}`; creates `POST` the full
/// record with its client-generated id, updates `PUT` and deletes `DELETE`
/// by id, and changes are read with `GET ?since={cursor}`.
#[derive(Clone)]
pub struct HttpRemote {
    inner: ReqwestClient,
    config: HttpConfig,
}

impl HttpRemote {
    pub fn new(config: HttpConfig) -> Result<Self, RemoteError> {
        let inner = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RemoteError::Transport {
                message: format!("cannot build HTTP client: {}", e),
                retryable: false,
            })?;

        Ok(Self { inner, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!(
            "{}/entities/{}",
            self.config.base_url.trim_end_matches('/'),
            kind.collection()
        )
    }

    fn entity_url(&self, entity: &EntityRef) -> String {
        format!("{}/{}", self.collection_url(entity.kind), entity.id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        target: &str,
        is_create: bool,
    ) -> Result<Response, RemoteError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, target, is_create, body))
    }

    fn payload(entity: &Entity) -> Result<serde_json::Value, RemoteError> {
        entity
            .to_json()
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Transport {
        retryable: error.is_timeout() || error.is_connect() || error.is_request(),
        message: error.to_string(),
    }
}

/// Maps a non-success status to a remote error
fn status_error(status: StatusCode, target: &str, is_create: bool, body: String) -> RemoteError {
    let detail = if body.is_empty() {
        target.to_string()
    } else {
        format!("{}: {}", target, body)
    };

    match status.as_u16() {
        400 | 422 => RemoteError::Validation(detail),
        404 => RemoteError::NotFound(detail),
        409 if is_create => RemoteError::Duplicate(detail),
        409 => RemoteError::Conflict(detail),
        408 | 429 => RemoteError::Transport {
            message: format!("HTTP {} for {}", status.as_u16(), detail),
            retryable: true,
        },
        code if status.is_server_error() => RemoteError::Transport {
            message: format!("HTTP {} for {}", code, detail),
            retryable: true,
        },
        code => RemoteError::Transport {
            message: format!(
                "HTTP {} {} for {}",
                code,
                status.canonical_reason().unwrap_or("Unknown"),
                detail
            ),
            retryable: false,
        },
    }
}

impl RemoteDataSource for HttpRemote {
    async fn create(&self, entity: &Entity) -> Result<(), RemoteError> {
        let body = Self::payload(entity)?;
        let target = entity.entity_ref().to_string();
        let request = self.inner.post(self.collection_url(entity.kind())).json(&body);
        self.send(request, &target, true).await?;
        Ok(())
    }

    async fn update(&self, entity: &Entity) -> Result<(), RemoteError> {
        let body = Self::payload(entity)?;
        let target = entity.entity_ref();
        let request = self.inner.put(self.entity_url(&target)).json(&body);
        self.send(request, &target.to_string(), false).await?;
        Ok(())
    }

    async fn delete(&self, entity: &EntityRef) -> Result<(), RemoteError> {
        let request = self.inner.delete(self.entity_url(entity));
        self.send(request, &entity.to_string(), false).await?;
        Ok(())
    }

    async fn fetch_since(&self, kind: EntityKind, since: Cursor) -> Result<RemotePage, RemoteError> {
        let request = self
            .inner
            .get(self.collection_url(kind))
            .query(&[("since", since.as_raw())]);
        let response = self.send(request, kind.collection(), false).await?;

        let page: PageBody = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        let entities = page
            .entities
            .into_iter()
            .map(|value| Entity::from_json(kind, value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        log::debug!(
            "Fetched {} {} since {} (cursor {})",
            entities.len(),
            kind.collection(),
            since,
            page.cursor
        );

        Ok(RemotePage {
            entities,
            cursor: Cursor::from_raw(page.cursor),
        })
    }
}
