//! OIDC client implementation using the openidconnect crate.

use async_trait::async_trait;
use clerk_platform_access::{
    AuthorizationRequest, IdentityProvider, OidcConfig, ProviderError, RetryPolicy, TokenSet,
};
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClaimsVerificationError, ClientId, ClientSecret, CsrfToken,
    DiscoveryError, IssuerUrl, Nonce, OAuth2TokenResponse, RedirectUrl, RefreshToken,
    RequestTokenError, Scope, TokenResponse,
};
use tracing::instrument;

/// OIDC client for authenticating users.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    config: OidcConfig,
    http_client: reqwest::Client,
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata.
    ///
    /// Discovery is retried according to `policy`.
    pub async fn discover(config: OidcConfig, policy: &RetryPolicy) -> Result<Self, ProviderError> {
        let issuer_url = IssuerUrl::new(config.issuer_url().to_string()).map_err(|e| {
            ProviderError::Configuration {
                reason: format!("invalid issuer URL: {e}"),
            }
        })?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string()).map_err(|e| {
            ProviderError::Configuration {
                reason: format!("invalid redirect URI: {e}"),
            }
        })?;

        // Redirects disabled to prevent SSRF through the provider.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(policy.request_timeout())
            .build()
            .map_err(|e| ProviderError::Configuration {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        let provider_metadata = policy
            .run("discovery", || async {
                CoreProviderMetadata::discover_async(issuer_url.clone(), &http_client)
                    .await
                    .map_err(|e| match e {
                        DiscoveryError::Request(inner) => ProviderError::Unavailable {
                            reason: format!("discovery request failed: {inner}"),
                        },
                        other => ProviderError::Configuration {
                            reason: format!("failed to discover provider: {other}"),
                        },
                    })
            })
            .await?;

        tracing::info!(issuer = config.issuer_url(), "discovered OIDC provider");

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            config,
            http_client,
        })
    }
}

/// OAuth2 error codes that signal a provider outage rather than a refusal.
const UNAVAILABLE_ERROR_CODES: &[&str] = &["server_error", "temporarily_unavailable"];

/// Classifies a token endpoint failure.
///
/// Only a well-formed OAuth2 error response (e.g. `invalid_grant`) is a
/// rejection. Transport failures, unreadable bodies (a proxy's 502 page) and
/// empty error responses count as the provider being unavailable.
fn token_error<RE, T>(operation: &str, e: RequestTokenError<RE, T>) -> ProviderError
where
    RE: std::error::Error + 'static,
    T: openidconnect::ErrorResponse + 'static,
{
    match e {
        RequestTokenError::ServerResponse(response) => {
            let code = serde_json::to_value(&response)
                .ok()
                .and_then(|v| v.get("error").and_then(|c| c.as_str()).map(str::to_string));
            if code
                .as_deref()
                .is_some_and(|c| UNAVAILABLE_ERROR_CODES.contains(&c))
            {
                ProviderError::Unavailable {
                    reason: format!("{operation} failed: {response}"),
                }
            } else {
                ProviderError::Rejected {
                    reason: format!("{operation} rejected: {response}"),
                }
            }
        }
        RequestTokenError::Request(inner) => ProviderError::Unavailable {
            reason: format!("{operation} request failed: {inner}"),
        },
        RequestTokenError::Parse(inner, _) => ProviderError::Unavailable {
            reason: format!("{operation} returned an unreadable response: {inner}"),
        },
        RequestTokenError::Other(reason) => ProviderError::Unavailable {
            reason: format!("{operation} failed: {reason}"),
        },
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn authorization_request(&self) -> Result<AuthorizationRequest, ProviderError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let mut auth_request = client.authorize_url(
            CoreAuthenticationFlow::AuthorizationCode,
            CsrfToken::new_random,
            Nonce::new_random,
        );

        // "openid" is always requested by the flow itself.
        for scope in self.config.scopes().into_iter().filter(|s| *s != "openid") {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        Ok(AuthorizationRequest {
            url: auth_url.to_string(),
            state: csrf_token.secret().clone(),
            nonce: nonce.secret().clone(),
        })
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        expected_nonce: &str,
    ) -> Result<TokenSet, ProviderError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| ProviderError::Configuration {
                reason: format!("token endpoint error: {e}"),
            })?
            .request_async(&self.http_client)
            .await
            .map_err(|e| token_error("code exchange", e))?;

        let id_token = token_response
            .id_token()
            .ok_or(ProviderError::MissingIdToken)?;

        let nonce = Nonce::new(expected_nonce.to_string());
        let claims = id_token
            .claims(&client.id_token_verifier(), &nonce)
            .map_err(|e| match e {
                ClaimsVerificationError::InvalidNonce(_) => ProviderError::NonceMismatch,
                other => ProviderError::InvalidIdToken {
                    reason: other.to_string(),
                },
            })?;

        let id_token_claims =
            serde_json::to_value(claims).map_err(|e| ProviderError::InvalidIdToken {
                reason: e.to_string(),
            })?;

        Ok(TokenSet {
            access_token: token_response.access_token().secret().clone(),
            refresh_token: token_response.refresh_token().map(|t| t.secret().clone()),
            expires_in: token_response.expires_in(),
            id_token_claims: Some(id_token_claims),
        })
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let token_response = client
            .exchange_refresh_token(&refresh_token)
            .map_err(|e| ProviderError::Configuration {
                reason: format!("token endpoint error: {e}"),
            })?
            .request_async(&self.http_client)
            .await
            .map_err(|e| token_error("refresh", e))?;

        Ok(TokenSet {
            access_token: token_response.access_token().secret().clone(),
            refresh_token: token_response.refresh_token().map(|t| t.secret().clone()),
            expires_in: token_response.expires_in(),
            id_token_claims: None,
        })
    }
}
