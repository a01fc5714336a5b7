//! Bearer-token credentials for the Azure Resource Manager endpoint.
//!
//! `DefaultAzureCredential` tries, in order:
//! 1. `AZURE_ACCESS_TOKEN` (a pre-issued bearer token)
//! 2. a service principal from `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`
//! 3. the Azure CLI (`az account get-access-token`)

use amlinfra_abstraction::{ApiError, ApiResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

/// OAuth scope for the management plane.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Default Entra ID authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// A bearer token and its expiry, if known.
#[derive(Clone)]
pub struct AccessToken {
    /// The raw bearer token.
    pub token: String,
    /// When the token stops being valid.
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Creates a token with no known expiry.
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into(), expires_on: None }
    }

    /// True when the token expires within `margin` of now.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_on.is_some_and(|at| at - margin <= Utc::now())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// A source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Obtains a token for the given OAuth scope.
    async fn get_token(&self, scope: &str) -> ApiResult<AccessToken>;
}

/// A fixed bearer token.
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    /// Wraps an already-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: AccessToken::new(token) }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn get_token(&self, _scope: &str) -> ApiResult<AccessToken> {
        Ok(self.token.clone())
    }
}

/// Service principal credential using the OAuth2 client-credentials flow.
#[derive(Clone)]
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority_host: String,
    client: Client,
}

impl ClientSecretCredential {
    /// Creates a credential against the public Entra ID authority.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            client: Client::new(),
        }
    }

    /// Overrides the authority host (sovereign clouds, tests).
    #[must_use]
    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            urlencoding::encode(&self.tenant_id)
        )
    }
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("authority_host", &self.authority_host)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &'static str {
        "client_secret"
    }

    async fn get_token(&self, scope: &str) -> ApiResult<AccessToken> {
        let url = self.token_url();
        debug!(url = %url, client_id = %self.client_id, "Requesting service principal token");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::CredentialError(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::CredentialError(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            ApiError::CredentialError(format!("failed to parse token response: {e}"))
        })?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on: parsed.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

/// Token from the locally logged-in Azure CLI.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self { program: "az".to_string() }
    }
}

impl AzureCliCredential {
    /// Uses a specific `az` executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default, rename = "expires_on")]
    expires_on: Option<i64>,
}

/// Converts an OAuth scope into the resource form the CLI expects.
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        "azure_cli"
    }

    async fn get_token(&self, scope: &str) -> ApiResult<AccessToken> {
        let resource = scope_to_resource(scope);
        let output = Command::new(&self.program)
            .args(["account", "get-access-token", "--resource", resource, "--output", "json"])
            .output()
            .await
            .map_err(|e| ApiError::CredentialError(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ApiError::CredentialError(format!(
                "az account get-access-token failed: {}",
                stderr.trim()
            )));
        }

        let parsed: CliTokenResponse = serde_json::from_slice(&output.stdout).map_err(|e| {
            ApiError::CredentialError(format!("failed to parse az output: {e}"))
        })?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on: parsed.expires_on.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }
}

/// Tries each configured credential in order and returns the first token.
pub struct DefaultAzureCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl DefaultAzureCredential {
    /// Builds the chain from the process environment.
    #[allow(clippy::disallowed_methods)] // env::var is needed for credential discovery
    #[must_use]
    pub fn new() -> Self {
        let mut sources: Vec<Arc<dyn TokenCredential>> = Vec::new();

        if let Some(token) = non_empty_var("AZURE_ACCESS_TOKEN") {
            sources.push(Arc::new(StaticTokenCredential::new(token)));
        }

        if let (Some(tenant), Some(client_id), Some(secret)) = (
            non_empty_var("AZURE_TENANT_ID"),
            non_empty_var("AZURE_CLIENT_ID"),
            non_empty_var("AZURE_CLIENT_SECRET"),
        ) {
            let mut credential = ClientSecretCredential::new(tenant, client_id, secret);
            if let Some(host) = non_empty_var("AZURE_AUTHORITY_HOST") {
                credential = credential.with_authority_host(host);
            }
            sources.push(Arc::new(credential));
        }

        sources.push(Arc::new(AzureCliCredential::default()));
        Self { sources }
    }

    /// Builds a chain from explicit sources.
    #[must_use]
    pub fn from_sources(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }

    /// Names of the sources, in the order they are tried.
    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

impl Default for DefaultAzureCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultAzureCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultAzureCredential").field("sources", &self.source_names()).finish()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl TokenCredential for DefaultAzureCredential {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn get_token(&self, scope: &str) -> ApiResult<AccessToken> {
        let mut failures = Vec::new();

        for source in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    debug!(source = source.name(), "Obtained access token");
                    return Ok(token);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Credential source failed");
                    failures.push(format!("{}: {e}", source.name()));
                }
            }
        }

        Err(ApiError::CredentialError(format!(
            "no credential source succeeded ({})",
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingCredential;

    #[async_trait]
    impl TokenCredential for FailingCredential {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn get_token(&self, _scope: &str) -> ApiResult<AccessToken> {
            Err(ApiError::CredentialError("nope".to_string()))
        }
    }

    #[test]
    fn test_scope_to_resource() {
        assert_eq!(scope_to_resource(MANAGEMENT_SCOPE), "https://management.azure.com");
        assert_eq!(scope_to_resource("https://example"), "https://example");
    }

    #[test]
    fn test_access_token_expiry() {
        let fresh = AccessToken { token: "t".to_string(), expires_on: Some(Utc::now() + Duration::hours(1)) };
        assert!(!fresh.expires_within(Duration::minutes(5)));

        let stale = AccessToken { token: "t".to_string(), expires_on: Some(Utc::now() + Duration::minutes(1)) };
        assert!(stale.expires_within(Duration::minutes(5)));

        assert!(!AccessToken::new("t").expires_within(Duration::minutes(5)));
    }

    #[test]
    fn test_access_token_debug_redacts() {
        let token = AccessToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn test_default_chain_falls_through() {
        let chain = DefaultAzureCredential::from_sources(vec![
            Arc::new(FailingCredential),
            Arc::new(StaticTokenCredential::new("abc")),
        ]);
        let token = chain.get_token(MANAGEMENT_SCOPE).await.unwrap();
        assert_eq!(token.token, "abc");
    }

    #[tokio::test]
    async fn test_default_chain_reports_every_failure() {
        let chain = DefaultAzureCredential::from_sources(vec![
            Arc::new(FailingCredential),
            Arc::new(FailingCredential),
        ]);
        let err = chain.get_token(MANAGEMENT_SCOPE).await.unwrap_err();
        match err {
            ApiError::CredentialError(msg) => assert_eq!(msg.matches("failing").count(), 2),
            other => panic!("Expected CredentialError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_secret_credential_token_flow() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex("grant_type=client_credentials".to_string()),
                mockito::Matcher::Regex("client_id=app".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "sp-token", "expires_in": 3600, "token_type": "Bearer"}"#)
            .create_async()
            .await;

        let credential =
            ClientSecretCredential::new("tenant-1", "app", "secret").with_authority_host(server.url());
        let token = credential.get_token(MANAGEMENT_SCOPE).await.unwrap();

        assert_eq!(token.token, "sp-token");
        assert!(token.expires_on.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_secret_credential_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(401)
            .with_body(r#"{"error": "invalid_client"}"#)
            .create_async()
            .await;

        let credential =
            ClientSecretCredential::new("tenant-1", "app", "bad").with_authority_host(server.url());
        let err = credential.get_token(MANAGEMENT_SCOPE).await.unwrap_err();
        assert!(matches!(err, ApiError::CredentialError(ref m) if m.contains("invalid_client")));
    }
}
