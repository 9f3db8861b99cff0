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

//! Configuration of the Yandex Cloud connector.
//!
//! The spec arrives as JSON bytes from the host:
//!
//! ```json
//! {
//!   "credentials": { "type": "oauth_token", "token": "${YC_OAUTH_TOKEN}" },
//!   "folder_ids": ["b1g..."],
//!   "concurrency": 500,
//!   "scheduler": "round-robin"
//! }
//! ```

use serde::{Deserialize, Serialize};
use ycsync_lib::config_value::ConfigValueString;
use ycsync_lib::error::{Result, SyncError};
use ycsync_lib::scheduler::{SchedulerOptions, Strategy};

fn default_concurrency() -> usize {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_page_size() -> u32 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// How the connector authenticates against the Yandex Cloud API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Credentials {
    /// A ready IAM token, used as is.
    IamToken { token: ConfigValueString },
    /// A Yandex Passport OAuth token, exchanged for IAM tokens.
    OauthToken { token: ConfigValueString },
    /// Tokens of the service account attached to the current VM.
    MetadataService,
}

impl Credentials {
    fn kind(&self) -> &'static str {
        match self {
            Credentials::IamToken { .. } => "iam_token",
            Credentials::OauthToken { .. } => "oauth_token",
            Credentials::MetadataService => "metadata_service",
        }
    }
}

/// Validated connector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spec {
    pub credentials: Credentials,

    /// Clouds to discover folders in. All visible clouds when empty.
    #[serde(default)]
    pub cloud_ids: Vec<String>,

    /// Folders to sync. Discovered from the clouds when empty.
    #[serde(default)]
    pub folder_ids: Vec<String>,

    /// Base URL used for every service instead of the public API hosts.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub scheduler: Strategy,

    /// Retries of a throttled or failed API request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Page size of list calls.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Spec {
    /// Create a spec with defaults for everything but the credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            cloud_ids: Vec::new(),
            folder_ids: Vec::new(),
            endpoint: None,
            concurrency: default_concurrency(),
            scheduler: Strategy::default(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Parse and validate spec bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the offending field.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let document: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| SyncError::config("spec", e.to_string()))?;

        // Tagged enums lose the path of nested errors, so credentials are checked on their own.
        if let Some(credentials) = document.get("credentials") {
            Credentials::deserialize(credentials).map_err(|e| {
                let field = match offending_field(&e) {
                    Some(Offending::Variant(_)) => "credentials.type".to_string(),
                    Some(Offending::Field(name)) => format!("credentials.{name}"),
                    None => "credentials".to_string(),
                };
                SyncError::config(field, e.to_string())
            })?;
        }

        let spec: Spec = serde_json::from_value(document).map_err(|e| {
            let field = match offending_field(&e) {
                Some(Offending::Variant(name)) => format!("variant {name}"),
                Some(Offending::Field(name)) => name,
                None => "spec".to_string(),
            };
            SyncError::config(field, e.to_string())
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SyncError::config("concurrency", "must be greater than 0"));
        }
        if self.max_retries > 10 {
            return Err(SyncError::config("max_retries", "must be between 0 and 10"));
        }
        if !(1..=1000).contains(&self.page_size) {
            return Err(SyncError::config("page_size", "must be between 1 and 1000"));
        }
        if self.request_timeout_secs == 0 {
            return Err(SyncError::config(
                "request_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.cloud_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(SyncError::config("cloud_ids", "ids must not be empty"));
        }
        if self.folder_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(SyncError::config("folder_ids", "ids must not be empty"));
        }
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(SyncError::config(
                    "endpoint",
                    format!("{endpoint} is not an http(s) URL"),
                ));
            }
        }
        log::debug!(
            "Using {} credentials, {} clouds, {} folders",
            self.credentials.kind(),
            self.cloud_ids.len(),
            self.folder_ids.len()
        );
        Ok(())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            concurrency: self.concurrency,
            strategy: self.scheduler,
        }
    }
}

enum Offending {
    Field(String),
    Variant(String),
}

/// What a serde error is about, if it names a field or an enum variant.
fn offending_field(err: &serde_json::Error) -> Option<Offending> {
    let message = err.to_string();
    let name = |prefix: &str| {
        message
            .strip_prefix(prefix)
            .and_then(|rest| rest.split('`').next())
            .map(str::to_string)
    };
    name("unknown variant `")
        .map(Offending::Variant)
        .or_else(|| name("unknown field `").map(Offending::Field))
        .or_else(|| name("missing field `").map(Offending::Field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ycsync_lib::config_value::ConfigValue;

    #[test]
    fn test_defaults() {
        let spec =
            Spec::from_bytes(br#"{"credentials": {"type": "metadata_service"}}"#).unwrap();
        assert_eq!(spec, Spec::new(Credentials::MetadataService));
        assert_eq!(spec.concurrency, 10_000);
        assert_eq!(spec.scheduler, Strategy::Dfs);
        assert_eq!(spec.page_size, 1000);
    }

    #[test]
    fn test_full_spec() {
        let spec = Spec::from_bytes(
            br#"{
                "credentials": {"type": "oauth_token", "token": "${YC_OAUTH:-abc}"},
                "cloud_ids": ["b1g1"],
                "folder_ids": ["b1g2", "b1g3"],
                "endpoint": "http://127.0.0.1:8080",
                "concurrency": 4,
                "scheduler": "shuffle",
                "max_retries": 0,
                "page_size": 10,
                "request_timeout_secs": 5
            }"#,
        )
        .unwrap();

        assert_eq!(
            spec.credentials,
            Credentials::OauthToken {
                token: ConfigValue::EnvironmentVariable {
                    name: "YC_OAUTH".to_string(),
                    default: Some("abc".to_string()),
                }
            }
        );
        assert_eq!(
            spec.scheduler_options(),
            SchedulerOptions {
                concurrency: 4,
                strategy: Strategy::Shuffle,
            }
        );
        assert_eq!(spec.folder_ids.len(), 2);
    }

    #[test]
    fn test_unknown_field_is_named() {
        let err = Spec::from_bytes(
            br#"{"credentials": {"type": "metadata_service"}, "concurency": 5}"#,
        )
        .unwrap_err();
        match err {
            SyncError::Config { field, .. } => assert_eq!(field, "concurency"),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_unknown_credentials_field_is_named() {
        let err = Spec::from_bytes(
            br#"{"credentials": {"type": "iam_token", "token": "x", "tokne_file": "/etc/key"}}"#,
        )
        .unwrap_err();
        match err {
            SyncError::Config { field, .. } => assert_eq!(field, "credentials.tokne_file"),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_credentials_errors_are_scoped() {
        let cases = [
            (r#"{"type": "oauth_token"}"#, "credentials.token"),
            (r#"{"type": "service_account_key"}"#, "credentials.type"),
            (r#"{"token": "x"}"#, "credentials.type"),
            (r#""iam""#, "credentials"),
        ];
        for (credentials, expected) in cases {
            let raw = format!(r#"{{"credentials": {credentials}}}"#);
            match Spec::from_bytes(raw.as_bytes()) {
                Err(SyncError::Config { field, .. }) => {
                    assert_eq!(field, expected, "{credentials}")
                }
                other => panic!("{credentials}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_credentials() {
        let err = Spec::from_bytes(br#"{"concurrency": 5}"#).unwrap_err();
        match err {
            SyncError::Config { field, .. } => assert_eq!(field, "credentials"),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_malformed_json() {
        let err = Spec::from_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, SyncError::Config { ref field, .. } if field == "spec"));
    }

    #[test]
    fn test_range_checks() {
        let cases = [
            (r#""concurrency": 0"#, "concurrency"),
            (r#""max_retries": 11"#, "max_retries"),
            (r#""page_size": 0"#, "page_size"),
            (r#""page_size": 1001"#, "page_size"),
            (r#""request_timeout_secs": 0"#, "request_timeout_secs"),
            (r#""folder_ids": [""]"#, "folder_ids"),
            (r#""endpoint": "ftp://x""#, "endpoint"),
        ];
        for (fragment, expected) in cases {
            let raw =
                format!(r#"{{"credentials": {{"type": "metadata_service"}}, {fragment}}}"#);
            match Spec::from_bytes(raw.as_bytes()) {
                Err(SyncError::Config { field, .. }) => assert_eq!(field, expected, "{fragment}"),
                other => panic!("{fragment}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_bad_scheduler() {
        let err = Spec::from_bytes(
            br#"{"credentials": {"type": "metadata_service"}, "scheduler": "bfs"}"#,
        )
        .unwrap_err();
        match err {
            SyncError::Config { field, .. } => assert_eq!(field, "variant bfs"),
            other => panic!("unexpected {other}"),
        }
    }
}
