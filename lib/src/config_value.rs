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

//! Configuration values that may reference the environment.
//!
//! Credentials should not have to live in a spec file. A [`ConfigValue`] accepts
//! any of these forms:
//!
//! ```yaml
//! token: "t1.9euelZ..."                      # static
//! token: "${YC_TOKEN}"                       # POSIX reference
//! token: "${YC_TOKEN:-fallback}"             # POSIX reference with default
//! token: { kind: EnvironmentVariable, name: YC_TOKEN, default: fallback }
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while resolving a [`ConfigValue`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// The referenced environment variable was not found and no default was provided.
    #[error("Environment variable '{0}' not found and no default provided")]
    EnvVarNotFound(String),

    /// The resolved string value could not be parsed to the target type.
    #[error("Failed to parse value: {0}")]
    ParseError(String),
}

/// A configuration value that is either literal or read from the environment.
#[derive(Clone, PartialEq)]
pub enum ConfigValue<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// A reference to an environment variable.
    EnvironmentVariable {
        name: String,
        default: Option<String>,
    },

    /// A static value of type `T`.
    Static(T),
}

pub type ConfigValueString = ConfigValue<String>;

// Static values are usually secrets, keep them out of debug output.
impl<T> fmt::Debug for ConfigValue<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::EnvironmentVariable { name, default } => f
                .debug_struct("EnvironmentVariable")
                .field("name", name)
                .field("default", &default.as_ref().map(|_| "***"))
                .finish(),
            ConfigValue::Static(_) => f.write_str("Static(***)"),
        }
    }
}

impl<T> ConfigValue<T>
where
    T: Serialize + DeserializeOwned + Clone + FromStr,
    <T as FromStr>::Err: fmt::Display,
{
    /// Resolve the value, reading the environment when needed.
    pub fn resolve(&self) -> Result<T, ResolverError> {
        match self {
            ConfigValue::Static(value) => Ok(value.clone()),
            ConfigValue::EnvironmentVariable { name, default } => {
                let raw = std::env::var(name).or_else(|_| {
                    default
                        .clone()
                        .ok_or_else(|| ResolverError::EnvVarNotFound(name.clone()))
                })?;
                raw.parse::<T>()
                    .map_err(|e| ResolverError::ParseError(format!("{name}: {e}")))
            }
        }
    }
}

impl<T> Serialize for ConfigValue<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        match self {
            ConfigValue::EnvironmentVariable { name, default } => {
                let size = if default.is_some() { 3 } else { 2 };
                let mut map = serializer.serialize_map(Some(size))?;
                map.serialize_entry("kind", "EnvironmentVariable")?;
                map.serialize_entry("name", name)?;
                if let Some(d) = default {
                    map.serialize_entry("default", d)?;
                }
                map.end()
            }
            ConfigValue::Static(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T> Deserialize<'de> for ConfigValue<T>
where
    T: Serialize + DeserializeOwned + Clone + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        use serde_json::Value;

        let value = Value::deserialize(deserializer)?;

        if let Value::Object(ref map) = value {
            if let Some(Value::String(kind)) = map.get("kind") {
                if kind != "EnvironmentVariable" {
                    return Err(D::Error::custom(format!("Unknown kind: {kind}")));
                }
                let name = map
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| D::Error::missing_field("name"))?
                    .to_string();
                let default = map
                    .get("default")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                return Ok(ConfigValue::EnvironmentVariable { name, default });
            }
        }

        if let Value::String(s) = &value {
            if let Some(env_ref) = parse_posix_env_var(s) {
                return Ok(env_ref);
            }
        }

        let static_value: T = serde_json::from_value(value)
            .map_err(|e| D::Error::custom(format!("Failed to deserialize as static value: {e}")))?;

        Ok(ConfigValue::Static(static_value))
    }
}

fn parse_posix_env_var<T>(s: &str) -> Option<ConfigValue<T>>
where
    T: Clone + Serialize + DeserializeOwned,
{
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;

    if let Some((name, default)) = inner.split_once(":-") {
        Some(ConfigValue::EnvironmentVariable {
            name: name.to_string(),
            default: Some(default.to_string()),
        })
    } else {
        Some(ConfigValue::EnvironmentVariable {
            name: inner.to_string(),
            default: None,
        })
    }
}
