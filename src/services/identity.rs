//! Bearer token introspection and client directory lookups.
//!
//! Both live in an external identity service. [`HttpIdentityProvider`] talks to it over
//! HTTP, [`CachedClientDirectory`] keeps short-lived copies of client profiles so the
//! authorization check on team routes does not hit the directory on every request.
//! Token resolution itself is never cached.

use crate::models::client::ClientProfile;
use crate::services::states::config::IdentityConfig;
use async_trait::async_trait;
use brew_macros::BrewBusinessError;
use moka::future::Cache;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

#[derive(Debug, thiserror::Error, BrewBusinessError)]
pub enum IdentityError {
    #[error("Missing or malformed bearer token")]
    #[code(10001)]
    MissingToken,
    #[error("Bearer token was rejected")]
    #[code(10002)]
    InvalidToken,
    #[error("Client {0} does not exist")]
    #[code(10003)]
    ClientNotFound(i64),
    #[error("Identity service answered with {0}")]
    #[code(10004)]
    UpstreamStatus(StatusCode),
    #[error("Identity service request failed: {0}")]
    #[code(10005)]
    Upstream(#[from] reqwest::Error),
    #[error("Invalid identity service url: {0}")]
    Url(#[from] url::ParseError),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves a bearer token to the client id it was issued for.
    async fn authenticate(&self, token: &str) -> IdentityResult<i64>;

    async fn get_client_by_id(&self, client_id: i64) -> IdentityResult<ClientProfile>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRes {
    client_id: i64,
}

pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpIdentityProvider {
    pub fn new(config: &IdentityConfig) -> IdentityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn authenticate(&self, token: &str) -> IdentityResult<i64> {
        let res = self
            .client
            .get(self.base_url.join("auth/session")?)
            .bearer_auth(token)
            .send()
            .await?;
        match res.status() {
            s if s.is_success() => Ok(res.json::<SessionRes>().await?.client_id),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidToken),
            s => Err(IdentityError::UpstreamStatus(s)),
        }
    }

    async fn get_client_by_id(&self, client_id: i64) -> IdentityResult<ClientProfile> {
        let res = self
            .client
            .get(self.base_url.join(&format!("clients/{client_id}"))?)
            .send()
            .await?;
        match res.status() {
            s if s.is_success() => Ok(res.json::<ClientProfile>().await?),
            StatusCode::NOT_FOUND => Err(IdentityError::ClientNotFound(client_id)),
            s => Err(IdentityError::UpstreamStatus(s)),
        }
    }
}

pub struct CachedClientDirectory {
    inner: Arc<dyn IdentityProvider>,
    profiles: Cache<i64, ClientProfile>,
}

impl CachedClientDirectory {
    pub fn new(inner: Arc<dyn IdentityProvider>, config: &IdentityConfig) -> Self {
        let profiles = Cache::builder()
            .max_capacity(config.profile_cache_capacity)
            .time_to_live(config.profile_cache_ttl())
            .build();
        Self { inner, profiles }
    }
}

#[async_trait]
impl IdentityProvider for CachedClientDirectory {
    async fn authenticate(&self, token: &str) -> IdentityResult<i64> {
        self.inner.authenticate(token).await
    }

    async fn get_client_by_id(&self, client_id: i64) -> IdentityResult<ClientProfile> {
        if let Some(profile) = self.profiles.get(&client_id).await {
            return Ok(profile);
        }
        let profile = self.inner.get_client_by_id(client_id).await?;
        self.profiles.insert(client_id, profile.clone()).await;
        Ok(profile)
    }
}
