// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! IAM token sources.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::spec::Credentials;
use ycsync_lib::error::SyncError;

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN_MINUTES: i64 = 5;

pub const DEFAULT_METADATA_URL: &str =
    "http://169.254.169.254/computeMetadata/v1/instance/service-accounts/default/token";

/// Supplies IAM tokens for API calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A token valid for at least a few more minutes.
    async fn token(&self) -> Result<String>;
}

/// A fixed IAM token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    refresh_at: DateTime<Utc>,
}

impl CachedToken {
    fn new(token: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            token,
            refresh_at: expires_at - Duration::minutes(REFRESH_MARGIN_MINUTES),
        }
    }

    fn fresh(&self) -> Option<String> {
        (Utc::now() < self.refresh_at).then(|| self.token.clone())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IamTokenResponse {
    iam_token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges a Yandex Passport OAuth token for IAM tokens.
pub struct OAuthTokenExchange {
    http: reqwest::Client,
    url: String,
    oauth_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthTokenExchange {
    /// `iam_base` is the IAM API base URL, e.g. `https://iam.api.cloud.yandex.net`.
    pub fn new(http: reqwest::Client, iam_base: &str, oauth_token: impl Into<String>) -> Self {
        Self {
            http,
            url: format!("{}/iam/v1/tokens", iam_base.trim_end_matches('/')),
            oauth_token: oauth_token.into(),
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for OAuthTokenExchange {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().and_then(CachedToken::fresh) {
            return Ok(token);
        }

        debug!("Exchanging OAuth token for an IAM token at {}", self.url);
        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "yandexPassportOauthToken": self.oauth_token }))
            .send()
            .await
            .with_context(|| format!("POST {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("IAM token exchange failed with {status}: {body}"));
        }
        let body: IamTokenResponse = response
            .json()
            .await
            .context("malformed IAM token response")?;

        let fresh = CachedToken::new(body.iam_token, body.expires_at);
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Tokens of the service account attached to the VM the connector runs on.
pub struct MetadataServiceToken {
    http: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServiceToken {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_url(http, DEFAULT_METADATA_URL)
    }

    pub fn with_url(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for MetadataServiceToken {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().and_then(CachedToken::fresh) {
            return Ok(token);
        }

        debug!("Fetching IAM token from metadata service {}", self.url);
        let body: MetadataTokenResponse = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?
            .error_for_status()?
            .json()
            .await
            .context("malformed metadata token response")?;

        let expires_at = Utc::now() + Duration::seconds(body.expires_in);
        let fresh = CachedToken::new(body.access_token, expires_at);
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

/// Build the token source for `credentials`, resolving environment references.
///
/// # Errors
///
/// Returns [`SyncError::Config`] when a referenced variable is not set.
pub fn token_source(
    credentials: &Credentials,
    http: reqwest::Client,
    iam_base: &str,
) -> ycsync_lib::error::Result<Arc<dyn TokenSource>> {
    let source: Arc<dyn TokenSource> = match credentials {
        Credentials::IamToken { token } => Arc::new(StaticToken::new(
            token
                .resolve()
                .map_err(|e| SyncError::config("credentials.token", e.to_string()))?,
        )),
        Credentials::OauthToken { token } => Arc::new(OAuthTokenExchange::new(
            http,
            iam_base,
            token
                .resolve()
                .map_err(|e| SyncError::config("credentials.token", e.to_string()))?,
        )),
        Credentials::MetadataService => Arc::new(MetadataServiceToken::new(http)),
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ycsync_lib::config_value::ConfigValue;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken::new("t1.abc");
        assert_eq!(source.token().await.unwrap(), "t1.abc");
    }

    #[tokio::test]
    async fn test_oauth_exchange_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/iam/v1/tokens",
            post(move |Json(body): Json<Value>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(body["yandexPassportOauthToken"], "oauth-1");
                    let expires_at = Utc::now() + Duration::hours(12);
                    Json(json!({"iamToken": "iam-1", "expiresAt": expires_at.to_rfc3339()}))
                }
            }),
        );
        let base = serve(app).await;

        let source = OAuthTokenExchange::new(reqwest::Client::new(), &base, "oauth-1");
        assert_eq!(source.token().await.unwrap(), "iam-1");
        assert_eq!(source.token().await.unwrap(), "iam-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oauth_token_near_expiry_is_refreshed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/iam/v1/tokens",
            post(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    // inside the refresh margin
                    let expires_at = Utc::now() + Duration::minutes(2);
                    Json(json!({"iamToken": format!("iam-{n}"), "expiresAt": expires_at.to_rfc3339()}))
                }
            }),
        );
        let base = serve(app).await;

        let source = OAuthTokenExchange::new(reqwest::Client::new(), &base, "oauth");
        assert_eq!(source.token().await.unwrap(), "iam-0");
        assert_eq!(source.token().await.unwrap(), "iam-1");
    }

    #[tokio::test]
    async fn test_oauth_rejected() {
        let app = Router::new().route(
            "/iam/v1/tokens",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad token") }),
        );
        let base = serve(app).await;

        let source = OAuthTokenExchange::new(reqwest::Client::new(), &base, "oauth");
        let err = source.token().await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_metadata_token() {
        let app = Router::new().route(
            "/token",
            get(|headers: axum::http::HeaderMap| async move {
                assert_eq!(headers["Metadata-Flavor"], "Google");
                Json(json!({"access_token": "vm-token", "expires_in": 3600, "token_type": "Bearer"}))
            }),
        );
        let base = serve(app).await;

        let source = MetadataServiceToken::with_url(reqwest::Client::new(), format!("{base}/token"));
        assert_eq!(source.token().await.unwrap(), "vm-token");
    }

    #[test]
    fn test_missing_env_is_config_error() {
        let credentials = Credentials::IamToken {
            token: ConfigValue::EnvironmentVariable {
                name: "YCSYNC_TEST_SURELY_UNSET_TOKEN".to_string(),
                default: None,
            },
        };
        let err = token_source(&credentials, reqwest::Client::new(), "http://unused")
            .err()
            .unwrap();
        assert!(err.is_config());
    }
}
