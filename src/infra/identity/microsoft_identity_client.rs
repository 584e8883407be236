use async_trait::async_trait;
use reqwest::Client;

use crate::config::IdentityConfig;
use crate::core::auth::{AuthError, TokenEndpoint, TokenGrant};

const LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// OAuth2 authorization-code client for the Microsoft identity platform (v2.0 endpoints).
pub struct MicrosoftIdentityClient {
    client: Client,
    config: IdentityConfig,
}

impl MicrosoftIdentityClient {
    pub fn new(client: Client, config: IdentityConfig) -> Self {
        Self {
            client,
            config,
        }
    }

    fn token_url(&self) -> String {
        format!(
            "{LOGIN_BASE}/{}/oauth2/v2.0/token",
            self.config.tenant_id
        )
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, AuthError> {
        let response = self
            .client
            .post(self.token_url())
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| AuthError::Transport(e.to_string()))?;
            tracing::warn!(status = status.as_u16(), "Token endpoint rejected the request");
            return Err(AuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body: format!("unreadable token response: {e}"),
            })
    }
}

#[async_trait]
impl TokenEndpoint for MicrosoftIdentityClient {
    fn authorize_url(&self) -> String {
        format!(
            "{LOGIN_BASE}/{}/oauth2/v2.0/authorize?client_id={}&response_type=code&redirect_uri={}&response_mode=query&scope={}",
            self.config.tenant_id,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scopes),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        tracing::debug!("Exchanging authorization code");
        self.request_token(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", self.config.scopes.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.request_token(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", self.config.scopes.as_str()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MicrosoftIdentityClient {
        MicrosoftIdentityClient::new(
            Client::new(),
            IdentityConfig {
                tenant_id: "tenant-1".to_string(),
                client_id: "client-1".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "https://example.com/callback".to_string(),
                scopes: "offline_access User.Read".to_string(),
            },
        )
    }

    #[test]
    fn authorize_url_carries_encoded_parameters() {
        let url = client().authorize_url();

        assert!(url.starts_with(
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/authorize?client_id=client-1"
        ));
        assert!(url.contains("&response_type=code"));
        assert!(url.contains("&redirect_uri=https%3A%2F%2Fexample.com%2Fcallback"));
        assert!(url.contains("&response_mode=query"));
        assert!(url.contains("&scope=offline_access%20User.Read"));
        assert!(!url.contains("secret"));
    }

    #[test]
    fn token_url_is_tenant_scoped() {
        assert_eq!(
            client().token_url(),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
    }
}
