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

//! Yandex Cloud REST API client.
//!
//! One [`Client`] is created per connector. The scheduler clones it per
//! folder or cloud (see [`folder_multiplex`] and [`cloud_multiplex`]); clones
//! share the HTTP connection pool and the token source.

use anyhow::{anyhow, bail, Context};
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{token_source, TokenSource};
use crate::spec::Spec;
use ycsync_lib::client::ClientMeta;
use ycsync_lib::error::{Result, SyncError};
use ycsync_lib::state::{NoOpStateClient, StateClient};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// A Yandex Cloud API service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    ResourceManager,
    Compute,
    Vpc,
    Iam,
    Storage,
    Kms,
}

impl Service {
    fn host(&self) -> &'static str {
        match self {
            Service::ResourceManager => "resource-manager",
            Service::Compute => "compute",
            Service::Vpc => "vpc",
            Service::Iam => "iam",
            Service::Storage => "storage",
            Service::Kms => "kms",
        }
    }
}

/// Base URLs of the API services.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoints {
    /// Single base for every service, when overridden.
    base: Option<String>,
}

impl Endpoints {
    pub fn new(base: Option<&str>) -> Self {
        Self {
            base: base.map(|b| b.trim_end_matches('/').to_string()),
        }
    }

    pub fn base(&self, service: Service) -> String {
        match &self.base {
            Some(base) => base.clone(),
            None => format!("https://{}.api.cloud.yandex.net", service.host()),
        }
    }

    pub fn url(&self, service: Service, path: &str) -> String {
        format!("{}{path}", self.base(service))
    }
}

/// What a client copy is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Cloud(String),
    Folder(String),
}

/// Client for the Yandex Cloud REST APIs.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    endpoints: Endpoints,
    page_size: u32,
    max_retries: u32,
    cloud_ids: Arc<Vec<String>>,
    folder_ids: Arc<Vec<String>>,
    scope: Scope,
    state: Arc<dyn StateClient>,
}

impl Client {
    /// Authenticate and work out which clouds and folders to sync.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Config`] when credentials reference unset variables
    /// - [`SyncError::Connection`] when no token can be obtained or folder
    ///   discovery fails
    pub async fn new(spec: &Spec) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(spec.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Internal(e.into()))?;
        let endpoints = Endpoints::new(spec.endpoint.as_deref());
        let tokens = token_source(&spec.credentials, http.clone(), &endpoints.base(Service::Iam))?;

        tokens
            .token()
            .await
            .map_err(|e| SyncError::connection("IAM token service", e))?;

        let mut client = Self {
            http,
            tokens,
            endpoints,
            page_size: spec.page_size,
            max_retries: spec.max_retries,
            cloud_ids: Arc::new(spec.cloud_ids.clone()),
            folder_ids: Arc::new(spec.folder_ids.clone()),
            scope: Scope::All,
            state: Arc::new(NoOpStateClient),
        };

        if client.cloud_ids.is_empty() {
            match client.discover_clouds().await {
                Ok(clouds) => client.cloud_ids = Arc::new(clouds),
                // folders were given explicitly, clouds are only needed for discovery
                Err(e) if !client.folder_ids.is_empty() => {
                    warn!("Cannot list clouds, continuing with configured folders: {e:#}");
                }
                Err(e) => return Err(SyncError::connection("resource-manager", e)),
            }
        }

        if client.folder_ids.is_empty() {
            let folders = client
                .discover_folders()
                .await
                .map_err(|e| SyncError::connection("resource-manager", e))?;
            client.folder_ids = Arc::new(folders);
        }

        info!(
            "Yandex Cloud client ready: {} clouds, {} folders",
            client.cloud_ids.len(),
            client.folder_ids.len()
        );
        Ok(client)
    }

    async fn discover_clouds(&self) -> anyhow::Result<Vec<String>> {
        let clouds = self
            .list(Service::ResourceManager, "/resource-manager/v1/clouds", &[], "clouds")
            .await?;
        Ok(ids(&clouds))
    }

    async fn discover_folders(&self) -> anyhow::Result<Vec<String>> {
        let mut folders = Vec::new();
        for cloud_id in self.cloud_ids.iter() {
            let listed = self
                .list(
                    Service::ResourceManager,
                    "/resource-manager/v1/folders",
                    &[("cloudId", cloud_id.as_str())],
                    "folders",
                )
                .await?;
            folders.extend(ids(&listed));
        }
        Ok(folders)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn folder_ids(&self) -> &[String] {
        &self.folder_ids
    }

    pub fn cloud_ids(&self) -> &[String] {
        &self.cloud_ids
    }

    /// Copy of this client bound to `scope`.
    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    /// The folder this client is bound to.
    pub fn folder_id(&self) -> anyhow::Result<&str> {
        match &self.scope {
            Scope::Folder(id) => Ok(id),
            other => Err(anyhow!("client is not bound to a folder (scope {other:?})")),
        }
    }

    /// The cloud this client is bound to.
    pub fn cloud_id(&self) -> anyhow::Result<&str> {
        match &self.scope {
            Scope::Cloud(id) => Ok(id),
            other => Err(anyhow!("client is not bound to a cloud (scope {other:?})")),
        }
    }

    /// List all items of a paginated list call.
    ///
    /// `items` is the response field holding the page's items, e.g. `disks`.
    pub async fn list(
        &self,
        service: Service,
        path: &str,
        query: &[(&str, &str)],
        items: &str,
    ) -> anyhow::Result<Vec<Value>> {
        let url = self.endpoints.url(service, path);
        let page_size = self.page_size.to_string();
        let mut page_token = String::new();
        let mut out = Vec::new();

        loop {
            let mut params: Vec<(&str, &str)> = query.to_vec();
            params.push(("pageSize", &page_size));
            if !page_token.is_empty() {
                params.push(("pageToken", &page_token));
            }

            let page = self.get_json(&url, &params).await?;
            if let Some(found) = page.get(items).and_then(Value::as_array) {
                out.extend(found.iter().cloned());
            }

            match page.get("nextPageToken").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => page_token = next.to_string(),
                _ => break,
            }
        }

        debug!("GET {url} returned {} {items}", out.len());
        Ok(out)
    }

    /// GET a JSON document, retrying throttled and failed requests.
    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<Value> {
        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let token = self.tokens.token().await.context("failed to get IAM token")?;
            let result = self
                .http
                .get(url)
                .query(query)
                .bearer_auth(token)
                .send()
                .await;

            let failure = match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<Value>()
                        .await
                        .with_context(|| format!("GET {url}: malformed response"));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let message = format!("GET {url}: {status}: {}", api_message(&body));
                    if !is_retryable(status) {
                        bail!(message);
                    }
                    message
                }
                Err(e) if e.is_timeout() || e.is_connect() => format!("GET {url}: {e}"),
                Err(e) => return Err(e).with_context(|| format!("GET {url}")),
            };

            if attempt >= self.max_retries {
                bail!("{failure} (gave up after {attempt} retries)");
            }
            attempt += 1;
            warn!(
                "Request failed (attempt {attempt}/{}): {failure}",
                self.max_retries
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// The `message` of an API error body, or the body itself.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn ids(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

impl ClientMeta for Client {
    fn id(&self) -> String {
        match &self.scope {
            Scope::All => "yc".to_string(),
            Scope::Cloud(id) => format!("cloud:{id}"),
            Scope::Folder(id) => format!("folder:{id}"),
        }
    }

    fn state(&self) -> Arc<dyn StateClient> {
        self.state.clone()
    }

    fn with_state(&self, state: Arc<dyn StateClient>) -> Arc<dyn ClientMeta> {
        Arc::new(Self {
            state,
            ..self.clone()
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One client per folder.
pub fn folder_multiplex(client: &Arc<dyn ClientMeta>) -> Vec<Arc<dyn ClientMeta>> {
    let Some(client) = client.as_any().downcast_ref::<Client>() else {
        warn!("Cannot multiplex client {} by folder", client.id());
        return Vec::new();
    };
    client
        .folder_ids
        .iter()
        .map(|id| Arc::new(client.with_scope(Scope::Folder(id.clone()))) as Arc<dyn ClientMeta>)
        .collect()
}

/// One client per cloud.
pub fn cloud_multiplex(client: &Arc<dyn ClientMeta>) -> Vec<Arc<dyn ClientMeta>> {
    let Some(client) = client.as_any().downcast_ref::<Client>() else {
        warn!("Cannot multiplex client {} by cloud", client.id());
        return Vec::new();
    };
    client
        .cloud_ids
        .iter()
        .map(|id| Arc::new(client.with_scope(Scope::Cloud(id.clone()))) as Arc<dyn ClientMeta>)
        .collect()
}
