/*
 *
 * Copyright 2026 rondo authors.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//! Clients for external service registries.
//!
//! A service registry maps a logical service name to the set of instances
//! currently serving it. The name resolver only consumes this boundary: it
//! asks for the healthy instances of a service and treats an empty answer
//! and an error identically, as a failed resolution attempt.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

mod consul;
mod memory;

pub use consul::{ConsulClient, ConsulConfig};
pub use memory::MemoryRegistry;

/// One healthy instance of a service, as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    /// Host the instance is reachable at (IP address or DNS name).
    pub host: String,

    /// Port the instance is listening on.
    pub port: u16,

    /// Registry-provided metadata for the instance (e.g. version tags).
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            metadata: HashMap::new(),
        }
    }
}

/// Errors returned by a registry query.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry endpoint could not be reached, or the request timed out.
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a non-success HTTP status.
    #[error("registry returned HTTP status {0}")]
    Status(u16),

    /// The registry response could not be decoded.
    #[error("failed to decode registry response: {0}")]
    Decode(String),

    /// The registry client was misconfigured.
    #[error("invalid registry configuration: {0}")]
    Config(String),
}

/// Queries an external service registry for the instances of a logical
/// service name.
///
/// Implementations must be cheap to share across tasks; the resolver holds
/// one behind an `Arc` and queries it on every refresh cycle.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Returns the currently healthy instances of `service`.
    ///
    /// An empty list is a valid answer and is treated by callers the same
    /// way as an error: as a resolution failure for this cycle.
    async fn list_healthy_instances(
        &self,
        service: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError>;
}
