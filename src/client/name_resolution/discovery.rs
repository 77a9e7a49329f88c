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

//! A name resolver backed by an external service registry.
//!
//! The resolver refreshes on a fixed interval. Each cycle queries the
//! registry for the healthy instances of the configured service name and
//! delivers the resulting address set to the listener; an empty answer or a
//! failed query is delivered as an error, leaving the previous address set
//! in effect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{
    AddressSet, Endpoint, Resolver, ResolverBuilder, ResolverListener, ResolverOptions, Target,
};
use crate::registry::RegistryClient;
use crate::status::Status;

/// The URI scheme handled by [`DiscoveryResolverBuilder`].
pub static SCHEME: &str = "registry";

/// The default interval between resolution attempts.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Registry-provided metadata attached to each resolved endpoint's
/// attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryMetadata(pub HashMap<String, String>);

/// Builds [`DiscoveryResolver`] instances for `registry://` targets, all
/// sharing one registry client.
pub struct DiscoveryResolverBuilder {
    registry: Arc<dyn RegistryClient>,
}

impl DiscoveryResolverBuilder {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }
}

impl ResolverBuilder for DiscoveryResolverBuilder {
    fn build(&self, target: &Target, options: ResolverOptions) -> Box<dyn Resolver> {
        Box::new(DiscoveryResolver::new(
            target.service_name(),
            options,
            self.registry.clone(),
        ))
    }

    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn priority(&self) -> u8 {
        10
    }
}

/// A [`Resolver`] that periodically fetches the healthy instances of one
/// service from a [`RegistryClient`].
///
/// Refresh cycles never overlap: the refresh task awaits each registry query
/// before the next tick is considered, and ticks that fire while a query is
/// still running are skipped.
pub struct DiscoveryResolver {
    service: String,
    authority: String,
    refresh_interval: Duration,
    registry: Arc<dyn RegistryClient>,
    resolve_now_tx: Option<mpsc::UnboundedSender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl DiscoveryResolver {
    fn new(service: String, options: ResolverOptions, registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            service,
            authority: options.authority,
            refresh_interval: options.refresh_interval,
            registry,
            resolve_now_tx: None,
            task: None,
        }
    }
}

impl Resolver for DiscoveryResolver {
    fn start(&mut self, listener: Box<dyn ResolverListener>) {
        if self.task.is_some() {
            warn!(service = %self.service, "resolver already started, ignoring");
            return;
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        self.resolve_now_tx = Some(tx);

        let service = self.service.clone();
        let registry = self.registry.clone();
        let refresh_interval = self.refresh_interval;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    msg = rx.recv() => {
                        if msg.is_none() {
                            // Resolver dropped; stop refreshing.
                            return;
                        }
                    }
                }
                resolve_once(registry.as_ref(), &service, listener.as_ref()).await;
            }
        }));
    }

    fn resolve_now(&mut self) {
        if let Some(tx) = &self.resolve_now_tx {
            _ = tx.send(());
        }
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(service = %self.service, "shutting down resolver");
            task.abort();
        }
        self.resolve_now_tx = None;
    }

    fn authority(&self) -> &str {
        &self.authority
    }
}

impl Drop for DiscoveryResolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn resolve_once(registry: &dyn RegistryClient, service: &str, listener: &dyn ResolverListener) {
    debug!(service, "resolving service");
    match registry.list_healthy_instances(service).await {
        Ok(instances) if !instances.is_empty() => {
            let addresses: AddressSet = instances
                .into_iter()
                .map(|instance| {
                    let mut endpoint = Endpoint::new(instance.host, instance.port);
                    if !instance.metadata.is_empty() {
                        let attributes = endpoint
                            .attributes
                            .add(RegistryMetadata(instance.metadata));
                        endpoint = endpoint.with_attributes(attributes);
                    }
                    endpoint
                })
                .collect();
            info!(service, instances = addresses.len(), "resolved service");
            listener.on_result(addresses);
        }
        Ok(_) => {
            warn!(service, "resolution found no healthy endpoints");
            listener.on_error(Status::unavailable(format!(
                "no healthy endpoints for service {service}"
            )));
        }
        Err(err) => {
            warn!(service, error = %err, "resolution failed");
            listener.on_error(Status::unavailable(format!(
                "failed to query registry for service {service}: {err}"
            )));
        }
    }
}
