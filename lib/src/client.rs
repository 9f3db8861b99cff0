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

//! The view of an API client that the scheduler and resolvers share.

use std::any::Any;
use std::sync::Arc;

use crate::state::StateClient;

/// An API client handed to table resolvers.
///
/// The scheduler only needs an identity for logging and the bookmark store.
/// Resolvers downcast through [`ClientMeta::as_any`] to reach the concrete
/// connector client.
pub trait ClientMeta: Send + Sync {
    /// Identifier used in logs, e.g. the folder a multiplexed client is bound to.
    fn id(&self) -> String;

    /// Bookmark store for incremental tables.
    fn state(&self) -> Arc<dyn StateClient>;

    /// Copy of this client bound to the given bookmark store.
    fn with_state(&self, state: Arc<dyn StateClient>) -> Arc<dyn ClientMeta>;

    /// Downcast helper - allows access to the concrete client type.
    fn as_any(&self) -> &dyn Any;
}

/// Downcast a [`ClientMeta`] to the concrete client type.
///
/// # Errors
///
/// Returns an error when the client is of a different type.
pub fn downcast_client<T: 'static>(client: &dyn ClientMeta) -> anyhow::Result<&T> {
    client.as_any().downcast_ref::<T>().ok_or_else(|| {
        anyhow::anyhow!(
            "client {} is not a {}",
            client.id(),
            std::any::type_name::<T>()
        )
    })
}
