use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 55 * 60;

/// Cached tokens are treated as expired this long before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization code missing")]
    AuthorizationMissing,
    #[error("Token exchange failed ({status}): {body}")]
    TokenExchangeFailed { status: u16, body: String },
    #[error("No stored refresh token; complete /login and /callback first")]
    TokenCacheMissing,
    #[error("Token store error: {0}")]
    Store(String),
    #[error("Token endpoint unreachable: {0}")]
    Transport(String),
}

/// Successful response from the identity provider's token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Credentials persisted between requests so writes can re-authenticate
/// without an interactive login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub obtained_at: DateTime<Utc>,
}

impl AuthToken {
    /// Builds a token from a grant. A grant without a refresh token keeps
    /// `previous_refresh` so the stored credential stays usable.
    pub fn from_grant(grant: TokenGrant, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh),
            expires_in: grant.expires_in,
            obtained_at: Utc::now(),
        }
    }

    /// A token restored from a bare refresh-token file. The access token is
    /// empty and must be refreshed before use.
    pub fn from_refresh_token(refresh_token: String) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: Some(refresh_token),
            expires_in: Some(0),
            obtained_at: Utc::now(),
        }
    }

    fn expires_at(&self) -> DateTime<Utc> {
        let lifetime = self
            .expires_in
            .and_then(|s| i64::try_from(s).ok())
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        self.obtained_at + Duration::seconds(lifetime)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// The identity provider's authorize and token endpoints.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// URL the browser is redirected to for interactive login.
    fn authorize_url(&self) -> String;
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// Where the current credentials live between requests.
///
/// Saves overwrite the previous token wholesale.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<AuthToken>, AuthError>;
    async fn save(&self, token: &AuthToken) -> Result<(), AuthError>;
}

/// Hands out bearer tokens for workbook calls.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS)
    }
}

/// Runs the authorization-code login and keeps a bearer token available afterwards.
pub struct AuthService {
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<dyn TokenStore>,
    cached: RwLock<Option<CachedToken>>,
}

impl AuthService {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            endpoint,
            store,
            cached: RwLock::new(None),
        }
    }

    pub fn authorize_url(&self) -> String {
        self.endpoint.authorize_url()
    }

    /// Exchanges the code from the login callback and persists the result.
    pub async fn complete_login(&self, code: Option<&str>) -> Result<AuthToken, AuthError> {
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::AuthorizationMissing)?;

        let grant = self.endpoint.exchange_code(code).await?;
        let token = AuthToken::from_grant(grant, None);
        if token.refresh_token.is_none() {
            tracing::warn!("Token endpoint issued no refresh token; is offline_access in SCOPES?");
        }

        self.store.save(&token).await?;
        self.remember(&token).await;
        tracing::info!("Login completed, token stored");

        Ok(token)
    }

    async fn remember(&self, token: &AuthToken) {
        let mut cached = self.cached.write().await;
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: token.expires_at(),
        });
    }
}

#[async_trait]
impl AccessTokenSource for AuthService {
    async fn access_token(&self) -> Result<String, AuthError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.token.clone());
            }
        }

        // Hold the write lock across the refresh so concurrent callers share one exchange.
        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.token.clone());
        }

        let stored = self.store.load().await?.ok_or(AuthError::TokenCacheMissing)?;
        let refresh_token = stored
            .refresh_token
            .clone()
            .ok_or(AuthError::TokenCacheMissing)?;

        tracing::debug!("Refreshing access token");
        let grant = self.endpoint.refresh(&refresh_token).await?;
        let token = AuthToken::from_grant(grant, Some(refresh_token));
        self.store.save(&token).await?;

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: token.expires_at(),
        });

        Ok(token.access_token)
    }
}
