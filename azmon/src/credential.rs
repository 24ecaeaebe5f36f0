//! Credentials for outbound provider requests
//!
//! The credential source is chosen once, when an input initializes, from
//! ambient environment configuration. The first source whose settings are
//! complete wins:
//!
//! 1. a pre-issued access token,
//! 2. a service principal with a client secret,
//! 3. a username and password on behalf of an application,
//! 4. the managed identity of the host the process runs on.
//!
//! Issued tokens are cached and renewed ahead of their expiry, so a
//! long-running poll loop keeps a valid token without re-initializing its
//! inputs.

use std::{env, fmt};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{debug, info};

/// Variable holding a pre-issued bearer token.
pub const ACCESS_TOKEN: &str = "AZURE_ACCESS_TOKEN";
/// Variable holding the directory (tenant) of the application.
pub const TENANT_ID: &str = "AZURE_TENANT_ID";
/// Variable holding the application (client) id. Also selects a user
/// assigned managed identity.
pub const CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Variable holding the client secret of the service principal.
pub const CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
/// Variable holding the path of a client certificate. Not supported.
pub const CERTIFICATE_PATH: &str = "AZURE_CERTIFICATE_PATH";
/// Variable holding the user to authenticate as.
pub const USERNAME: &str = "AZURE_USERNAME";
/// Variable holding the password of [`USERNAME`].
pub const PASSWORD: &str = "AZURE_PASSWORD";
/// Variable overriding the identity provider's base URI.
pub const AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
/// Variable overriding the audience tokens are requested for.
pub const RESOURCE: &str = "AZURE_RESOURCE";
/// Variable overriding the managed identity token endpoint.
pub const MSI_ENDPOINT: &str = "AZURE_MSI_ENDPOINT";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_RESOURCE: &str = "https://management.azure.com/";
const DEFAULT_MSI_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const MSI_API_VERSION: &str = "2018-02-01";
const MSI_TIMEOUT: Duration = Duration::from_secs(5);

/// Tokens are renewed this long before they expire, or halfway through their
/// lifetime if that is shorter.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);
/// Lifetime assumed when the identity provider does not state one.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

#[derive(thiserror::Error, Debug)]
/// Errors produced while acquiring a credential
pub enum Error {
    /// A client certificate is configured, which is not supported.
    #[error("Client certificate authentication (AZURE_CERTIFICATE_PATH) is not supported")]
    UnsupportedCertificate,
    /// The token request could not be completed.
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The identity provider refused to issue a token.
    #[error("Token request rejected. Status {status}:\n{body}")]
    Rejected {
        /// HTTP status of the refusal
        status: u16,
        /// Verbatim body of the refusal
        body: String,
    },
    /// The identity provider's answer was not a token response.
    #[error("Failed to decode token response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Something able to authorize an outbound request.
#[async_trait]
pub trait Authorizer: Send + Sync + fmt::Debug {
    /// Attach authorization to `request`.
    ///
    /// # Errors
    ///
    /// Function will return an error if no valid token could be obtained.
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, Error>;
}

/// A fixed OAuth 2.0 bearer token.
#[derive(Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    /// Wrap `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Authorizer for BearerToken {
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, Error> {
        Ok(request.bearer_auth(&self.token))
    }
}

/// The way a [`Credential`] obtains its tokens.
#[derive(Clone, PartialEq, Eq)]
pub enum Source {
    /// A pre-issued token, used as-is and never renewed.
    AccessToken(String),
    /// OAuth 2.0 client credentials grant.
    ClientSecret {
        /// Directory of the application
        tenant_id: String,
        /// Application id
        client_id: String,
        /// Application secret
        client_secret: String,
    },
    /// OAuth 2.0 resource owner password grant.
    UsernamePassword {
        /// Directory of the user
        tenant_id: String,
        /// Application id
        client_id: String,
        /// User to authenticate as
        username: String,
        /// Password of the user
        password: String,
    },
    /// The host's managed identity, user assigned if `client_id` is set.
    ManagedIdentity {
        /// Id of a user assigned identity
        client_id: Option<String>,
    },
}

impl Source {
    fn kind(&self) -> &'static str {
        match self {
            Source::AccessToken(_) => "access token",
            Source::ClientSecret { .. } => "client secret",
            Source::UsernamePassword { .. } => "username and password",
            Source::ManagedIdentity { .. } => "managed identity",
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::AccessToken(_) => f.debug_tuple("AccessToken").field(&"<redacted>").finish(),
            Source::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Source::UsernamePassword {
                tenant_id,
                client_id,
                username,
                ..
            } => f
                .debug_struct("UsernamePassword")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Source::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

/// Snapshot of the credential related environment.
#[derive(Clone)]
pub struct Environment {
    /// See [`ACCESS_TOKEN`].
    pub access_token: Option<String>,
    /// See [`TENANT_ID`].
    pub tenant_id: Option<String>,
    /// See [`CLIENT_ID`].
    pub client_id: Option<String>,
    /// See [`CLIENT_SECRET`].
    pub client_secret: Option<String>,
    /// See [`CERTIFICATE_PATH`].
    pub certificate_path: Option<String>,
    /// See [`USERNAME`].
    pub username: Option<String>,
    /// See [`PASSWORD`].
    pub password: Option<String>,
    /// See [`AUTHORITY_HOST`].
    pub authority_host: String,
    /// See [`RESOURCE`].
    pub resource: String,
    /// See [`MSI_ENDPOINT`].
    pub msi_endpoint: String,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            access_token: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            certificate_path: None,
            username: None,
            password: None,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
            msi_endpoint: DEFAULT_MSI_ENDPOINT.to_string(),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Environment")
            .field("access_token", &redacted(&self.access_token))
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("certificate_path", &self.certificate_path)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("authority_host", &self.authority_host)
            .field("resource", &self.resource)
            .field("msi_endpoint", &self.msi_endpoint)
            .finish()
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Environment {
    /// Read the process environment. Empty variables count as unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            access_token: var(ACCESS_TOKEN),
            tenant_id: var(TENANT_ID),
            client_id: var(CLIENT_ID),
            client_secret: var(CLIENT_SECRET),
            certificate_path: var(CERTIFICATE_PATH),
            username: var(USERNAME),
            password: var(PASSWORD),
            authority_host: var(AUTHORITY_HOST).unwrap_or(defaults.authority_host),
            resource: var(RESOURCE).unwrap_or(defaults.resource),
            msi_endpoint: var(MSI_ENDPOINT).unwrap_or(defaults.msi_endpoint),
        }
    }

    /// Pick the first [`Source`] whose settings are complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCertificate`] if a client certificate is
    /// the most preferred complete setting.
    pub fn source(&self) -> Result<Source, Error> {
        if let Some(token) = &self.access_token {
            return Ok(Source::AccessToken(token.clone()));
        }

        if let (Some(tenant_id), Some(client_id)) = (&self.tenant_id, &self.client_id) {
            if let Some(client_secret) = &self.client_secret {
                return Ok(Source::ClientSecret {
                    tenant_id: tenant_id.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                });
            }
            if self.certificate_path.is_some() {
                return Err(Error::UnsupportedCertificate);
            }
            if let (Some(username), Some(password)) = (&self.username, &self.password) {
                return Ok(Source::UsernamePassword {
                    tenant_id: tenant_id.clone(),
                    client_id: client_id.clone(),
                    username: username.clone(),
                    password: password.clone(),
                });
            }
        }

        Ok(Source::ManagedIdentity {
            client_id: self.client_id.clone(),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Lifetime>,
}

/// Token lifetime in seconds, sent as a number or a numeric string depending
/// on the endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lifetime {
    Seconds(u64),
    Text(String),
}

impl Lifetime {
    fn duration(&self) -> Option<Duration> {
        match self {
            Lifetime::Seconds(secs) => Some(Duration::from_secs(*secs)),
            Lifetime::Text(text) => text.trim().parse().ok().map(Duration::from_secs),
        }
    }
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// A credential that obtains tokens from a [`Source`] and renews them before
/// they expire.
pub struct Credential {
    client: reqwest::Client,
    source: Source,
    authority_host: String,
    resource: String,
    msi_endpoint: String,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("authority_host", &self.authority_host)
            .field("resource", &self.resource)
            .field("msi_endpoint", &self.msi_endpoint)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Create a new [`Credential`] drawing tokens from `source`. No request is
    /// made until the first token is needed.
    #[must_use]
    pub fn new(client: reqwest::Client, source: Source, env: &Environment) -> Self {
        Self {
            client,
            source,
            authority_host: env.authority_host.trim_end_matches('/').to_string(),
            resource: env.resource.clone(),
            msi_endpoint: env.msi_endpoint.clone(),
            cached: Mutex::new(None),
        }
    }

    /// A token valid for at least a little while longer.
    ///
    /// The cached token is returned while it is fresh. Otherwise a new one is
    /// requested; concurrent callers wait for that single request.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the identity provider did not issue a
    /// token. Nothing is retried.
    pub async fn token(&self) -> Result<String, Error> {
        if let Source::AccessToken(token) = &self.source {
            return Ok(token.clone());
        }

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
            debug!("{} token is due for renewal", self.source.kind());
        }

        let requested_at = Instant::now();
        let response = self.request().await?;
        let lifetime = response
            .expires_in
            .as_ref()
            .and_then(Lifetime::duration)
            .unwrap_or(DEFAULT_LIFETIME);
        let margin = REFRESH_MARGIN.min(lifetime / 2);
        let token = response.access_token;
        *cached = Some(CachedToken {
            token: token.clone(),
            refresh_at: requested_at + lifetime.saturating_sub(margin),
        });
        Ok(token)
    }

    async fn request(&self) -> Result<TokenResponse, Error> {
        let request = match &self.source {
            Source::AccessToken(token) => {
                return Ok(TokenResponse {
                    access_token: token.clone(),
                    expires_in: None,
                });
            }
            Source::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                info!("Requesting token for client {client_id}");
                self.client
                    .post(self.token_uri(tenant_id))
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("resource", self.resource.as_str()),
                    ])
            }
            Source::UsernamePassword {
                tenant_id,
                client_id,
                username,
                password,
            } => {
                info!("Requesting token for user {username}");
                self.client
                    .post(self.token_uri(tenant_id))
                    .form(&[
                        ("grant_type", "password"),
                        ("client_id", client_id.as_str()),
                        ("username", username.as_str()),
                        ("password", password.as_str()),
                        ("resource", self.resource.as_str()),
                    ])
            }
            Source::ManagedIdentity { client_id } => {
                info!("Requesting managed identity token from {}", self.msi_endpoint);
                let mut query = vec![
                    ("api-version", MSI_API_VERSION),
                    ("resource", self.resource.as_str()),
                ];
                if let Some(client_id) = client_id {
                    query.push(("client_id", client_id.as_str()));
                }
                self.client
                    .get(&self.msi_endpoint)
                    .header("Metadata", "true")
                    .query(&query)
                    .timeout(MSI_TIMEOUT)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(Error::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }

    fn token_uri(&self, tenant_id: &str) -> String {
        format!("{}/{tenant_id}/oauth2/token", self.authority_host)
    }
}

#[async_trait]
impl Authorizer for Credential {
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let token = self.token().await?;
        Ok(request.bearer_auth(token))
    }
}

/// Build a [`Credential`] from the process environment and obtain its first
/// token, so that a misconfigured identity fails initialization.
///
/// # Errors
///
/// See [`Environment::source`] and [`Credential::token`].
pub async fn from_environment(client: &reqwest::Client) -> Result<Credential, Error> {
    let env = Environment::from_env();
    let source = env.source()?;
    info!("Authenticating with {}", source.kind());
    let credential = Credential::new(client.clone(), source, &env);
    credential.token().await?;
    Ok(credential)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;
    use warp::Filter;

    fn service_principal(authority_host: String) -> Environment {
        Environment {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some("hunter2".to_string()),
            authority_host,
            ..Environment::default()
        }
    }

    fn credential(env: &Environment) -> Credential {
        let source = env.source().expect("source must be selected");
        Credential::new(reqwest::Client::new(), source, env)
    }

    /// Serve a token endpoint for `tenant` issuing `tok-0`, `tok-1`, ... each
    /// living `expires_in` seconds. Returns the base URI and the number of
    /// tokens issued so far.
    fn token_server(expires_in: &'static str) -> (String, Arc<AtomicUsize>) {
        let issued = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&issued);
        let route = warp::post()
            .and(warp::path!("tenant" / "oauth2" / "token"))
            .and(warp::body::form())
            .map(move |form: HashMap<String, String>| {
                if form.get("client_secret").map(String::as_str) != Some("hunter2") {
                    return warp::reply::with_status(
                        "{}".to_string(),
                        warp::http::StatusCode::BAD_REQUEST,
                    );
                }
                let n = counter.fetch_add(1, Ordering::SeqCst);
                warp::reply::with_status(
                    format!(
                        r#"{{"token_type":"Bearer","expires_in":"{expires_in}","access_token":"tok-{n}"}}"#
                    ),
                    warp::http::StatusCode::OK,
                )
            });
        let (addr, serve_fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        let _server_handle = tokio::spawn(serve_fut);
        (format!("http://{addr}"), issued)
    }

    #[tokio::test]
    async fn bearer_token_sets_authorization_header() {
        let client = reqwest::Client::new();
        let request = BearerToken::new("abc")
            .authorize(client.get("http://127.0.0.1/"))
            .await
            .expect("static token must authorize")
            .build()
            .expect("request must build");

        assert_eq!(
            request
                .headers()
                .get(reqwest::header::AUTHORIZATION)
                .expect("header must be set"),
            "Bearer abc"
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let token = format!("{:?}", BearerToken::new("abc"));
        assert!(!token.contains("abc"));

        let env = service_principal(DEFAULT_AUTHORITY_HOST.to_string());
        let printed = format!("{env:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("tenant"));

        let printed = format!("{:?}", credential(&env));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn source_follows_preference_order() {
        let complete = Environment {
            access_token: Some("abc".to_string()),
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some("hunter2".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Environment::default()
        };
        assert!(matches!(complete.source(), Ok(Source::AccessToken(_))));

        let env = Environment {
            access_token: None,
            ..complete.clone()
        };
        assert!(matches!(env.source(), Ok(Source::ClientSecret { .. })));

        let env = Environment {
            client_secret: None,
            ..env
        };
        assert!(matches!(
            env.source(),
            Ok(Source::UsernamePassword { ref username, .. }) if username == "user"
        ));

        let env = Environment {
            certificate_path: Some("/etc/azmon/cert.pem".to_string()),
            ..env
        };
        assert!(matches!(env.source(), Err(Error::UnsupportedCertificate)));
    }

    #[test]
    fn incomplete_settings_fall_back_to_managed_identity() {
        assert_eq!(
            Environment::default().source().expect("source must be selected"),
            Source::ManagedIdentity { client_id: None }
        );

        // A client id alone selects a user assigned identity.
        let env = Environment {
            client_id: Some("client".to_string()),
            ..Environment::default()
        };
        assert_eq!(
            env.source().expect("source must be selected"),
            Source::ManagedIdentity {
                client_id: Some("client".to_string())
            }
        );

        // A tenant without any secret is not a service principal.
        let env = Environment {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            ..Environment::default()
        };
        assert!(matches!(
            env.source(),
            Ok(Source::ManagedIdentity { .. })
        ));
    }

    #[tokio::test]
    async fn pre_issued_token_needs_no_network() {
        let env = Environment {
            access_token: Some("abc".to_string()),
            // Unroutable: any request would fail.
            authority_host: "http://127.0.0.1:1".to_string(),
            msi_endpoint: "http://127.0.0.1:1".to_string(),
            ..Environment::default()
        };
        let token = credential(&env)
            .token()
            .await
            .expect("static token must be accepted");
        assert_eq!(token, "abc");
    }

    #[tokio::test]
    async fn client_secret_is_exchanged_for_token() {
        let (authority, issued) = token_server("3599");
        let credential = credential(&service_principal(format!("{authority}/")));

        assert_eq!(credential.token().await.expect("token must be issued"), "tok-0");
        // Fresh tokens come from the cache.
        assert_eq!(credential.token().await.expect("token must be issued"), "tok-0");
        assert_eq!(issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiring_token_is_renewed() {
        let (authority, issued) = token_server("1");
        let credential = credential(&service_principal(authority));

        assert_eq!(credential.token().await.expect("token must be issued"), "tok-0");
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(credential.token().await.expect("token must be renewed"), "tok-1");
        assert_eq!(issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn username_and_password_are_exchanged_for_token() {
        let route = warp::post()
            .and(warp::path!("tenant" / "oauth2" / "token"))
            .and(warp::body::form())
            .map(|form: HashMap<String, String>| {
                let granted = form.get("grant_type").map(String::as_str) == Some("password")
                    && form.get("username").map(String::as_str) == Some("user")
                    && form.get("password").map(String::as_str) == Some("pass")
                    && form.get("resource").map(String::as_str) == Some(DEFAULT_RESOURCE);
                if granted {
                    warp::reply::with_status(
                        r#"{"expires_in":3599,"access_token":"user-token"}"#,
                        warp::http::StatusCode::OK,
                    )
                } else {
                    warp::reply::with_status("{}", warp::http::StatusCode::BAD_REQUEST)
                }
            });
        let (addr, serve_fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        let _server_handle = tokio::spawn(serve_fut);

        let env = Environment {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            authority_host: format!("http://{addr}"),
            ..Environment::default()
        };
        let token = credential(&env).token().await.expect("token must be issued");
        assert_eq!(token, "user-token");
    }

    #[tokio::test]
    async fn managed_identity_queries_metadata_endpoint() {
        let route = warp::get()
            .and(warp::path!("metadata" / "identity" / "oauth2" / "token"))
            .and(warp::header::optional::<String>("metadata"))
            .and(warp::query::<HashMap<String, String>>())
            .map(|metadata: Option<String>, query: HashMap<String, String>| {
                let granted = metadata.as_deref() == Some("true")
                    && query.get("api-version").map(String::as_str) == Some(MSI_API_VERSION)
                    && query.get("resource").map(String::as_str) == Some(DEFAULT_RESOURCE)
                    && query.get("client_id").map(String::as_str) == Some("identity");
                if granted {
                    warp::reply::with_status(
                        r#"{"access_token":"msi-token","expires_in":"86399","token_type":"Bearer"}"#,
                        warp::http::StatusCode::OK,
                    )
                } else {
                    warp::reply::with_status("{}", warp::http::StatusCode::BAD_REQUEST)
                }
            });
        let (addr, serve_fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        let _server_handle = tokio::spawn(serve_fut);

        let env = Environment {
            client_id: Some("identity".to_string()),
            msi_endpoint: format!("http://{addr}/metadata/identity/oauth2/token"),
            ..Environment::default()
        };
        let token = credential(&env).token().await.expect("token must be issued");
        assert_eq!(token, "msi-token");
    }

    #[tokio::test]
    async fn refusal_carries_status_and_body() {
        let route = warp::post().map(|| {
            warp::reply::with_status(
                r#"{"error":"invalid_client"}"#,
                warp::http::StatusCode::UNAUTHORIZED,
            )
        });
        let (addr, serve_fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        let _server_handle = tokio::spawn(serve_fut);

        let err = credential(&service_principal(format!("http://{addr}")))
            .token()
            .await
            .expect_err("refusal must fail");
        match err {
            Error::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, r#"{"error":"invalid_client"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
