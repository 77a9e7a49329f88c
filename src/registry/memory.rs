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

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{RegistryClient, RegistryError, ServiceInstance};

/// A registry backed by an in-process instance table.
///
/// Useful for tests and for deployments with a statically known instance
/// set. Instance lists can be replaced at any time; the next resolution
/// cycle observes the new set.
#[derive(Default)]
pub struct MemoryRegistry {
    services: RwLock<HashMap<String, Vec<ServiceInstance>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the instance list for `service`.
    pub fn set_instances(&self, service: &str, instances: Vec<ServiceInstance>) {
        self.services
            .write()
            .insert(service.to_string(), instances);
    }

    /// Removes all instances of `service`.
    pub fn clear(&self, service: &str) {
        self.services.write().remove(service);
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn list_healthy_instances(
        &self,
        service: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        Ok(self
            .services
            .read()
            .get(service)
            .cloned()
            .unwrap_or_default())
    }
}
