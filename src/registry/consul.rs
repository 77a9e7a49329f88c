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

//! A registry client backed by the Consul health API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{RegistryClient, RegistryError, ServiceInstance};

/// Configuration for a [`ConsulClient`].
#[derive(Debug, Clone)]
pub struct ConsulConfig {
    /// Base address of the Consul HTTP API, e.g. `http://127.0.0.1:8500`.
    pub address: String,

    /// Datacenter to query. Uses the agent's local datacenter when unset.
    pub datacenter: Option<String>,

    /// ACL token sent with each request when set.
    pub token: Option<String>,

    /// Client-side timeout for each registry query. A timed-out query is
    /// reported as a failed resolution attempt.
    pub query_timeout: Duration,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8500".to_string(),
            datacenter: None,
            token: None,
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// A [`RegistryClient`] that queries the Consul health API
/// (`/v1/health/service/{name}?passing=true`) for passing instances.
pub struct ConsulClient {
    base_url: Url,
    datacenter: Option<String>,
    token: Option<String>,
    http: reqwest::Client,
}

impl ConsulClient {
    pub fn new(config: ConsulConfig) -> Result<Self, RegistryError> {
        let base_url = config
            .address
            .parse::<Url>()
            .map_err(|err| RegistryError::Config(format!("bad address: {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.query_timeout)
            .build()?;
        Ok(Self {
            base_url,
            datacenter: config.datacenter,
            token: config.token,
            http,
        })
    }
}

// The subset of the health API response the resolver cares about. Each entry
// describes one instance that passed its health checks.
#[derive(Debug, Deserialize)]
struct HealthEntry {
    #[serde(rename = "Service")]
    service: AgentService,
}

#[derive(Debug, Deserialize)]
struct AgentService {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Meta", default)]
    meta: HashMap<String, String>,
}

#[async_trait]
impl RegistryClient for ConsulClient {
    async fn list_healthy_instances(
        &self,
        service: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        let mut url = self
            .base_url
            .join(&format!("v1/health/service/{service}"))
            .map_err(|err| RegistryError::Config(format!("bad service name: {err}")))?;
        url.query_pairs_mut().append_pair("passing", "true");
        if let Some(dc) = &self.datacenter {
            url.query_pairs_mut().append_pair("dc", dc);
        }

        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.header("X-Consul-Token", token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status().as_u16()));
        }

        let entries: Vec<HealthEntry> = response
            .json()
            .await
            .map_err(|err| RegistryError::Decode(err.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|entry| ServiceInstance {
                host: entry.service.address,
                port: entry.service.port,
                metadata: entry.service.meta,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_health_response() {
        let body = r#"[
            {
                "Node": {"Node": "node-1", "Address": "10.0.0.1"},
                "Service": {
                    "ID": "payments-1",
                    "Service": "payments",
                    "Address": "10.0.0.1",
                    "Port": 9090,
                    "Meta": {"version": "1.4.2"}
                },
                "Checks": []
            },
            {
                "Service": {
                    "Address": "10.0.0.2",
                    "Port": 9090
                }
            }
        ]"#;

        let entries: Vec<HealthEntry> = serde_json::from_str(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].service.address, "10.0.0.1");
        assert_eq!(entries[0].service.port, 9090);
        assert_eq!(
            entries[0].service.meta.get("version"),
            Some(&"1.4.2".to_string())
        );
        assert!(entries[1].service.meta.is_empty());
    }

    #[test]
    fn rejects_bad_address() {
        let config = ConsulConfig {
            address: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ConsulClient::new(config),
            Err(RegistryError::Config(_))
        ));
    }
}
