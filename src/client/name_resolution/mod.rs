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

//! Name resolution.
//!
//! Name resolution is the process by which a channel's target is converted
//! into network addresses used by the channel to connect to a service. A
//! resolver delivers every successful resolution as an [`AddressSet`] to its
//! [`ResolverListener`]; failed attempts are delivered as an error and leave
//! the previously delivered set in effect.

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::attributes::Attributes;
use crate::status::Status;

pub mod discovery;
mod registry;

pub use discovery::{DiscoveryResolver, DiscoveryResolverBuilder};
pub use registry::ResolverRegistry;

/// Target represents the destination of a channel, in URI form
/// (`scheme://service-name`). The scheme selects the resolver responsible
/// for the target; the rest names the service to resolve.
#[derive(Debug, Clone)]
pub struct Target {
    url: Url,
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Url>() {
            Ok(url) => Ok(Target { url }),
            Err(err) => Err(err.to_string()),
        }
    }
}

impl Target {
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// The logical service name carried by the target: the authority host
    /// when present (`registry://payments`), otherwise the path with its
    /// leading slash removed (`registry:///payments`).
    pub fn service_name(&self) -> String {
        match self.url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => {
                let path = self.url.path();
                path.strip_prefix('/').unwrap_or(path).to_string()
            }
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme(), self.service_name())
    }
}

/// A resolvable (host, port) pair representing one server instance.
///
/// Equality and hashing consider only the host and port; the attribute bag
/// carries opaque data (e.g. registry metadata) for the LB policy and never
/// participates in identity.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    host: String,
    port: u16,

    /// Arbitrary data about this endpoint intended for consumption by the
    /// LB policy.
    pub attributes: Attributes,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The set of endpoints for a logical service, as delivered by one
/// resolution.
///
/// Deduplicated on (host, port) and order-preserving on first insertion.
/// Equality is structural set equality, so two sets with the same endpoints
/// in different orders compare equal.
#[derive(Debug, Clone, Default)]
pub struct AddressSet {
    endpoints: Vec<Endpoint>,
}

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an endpoint, returning false if an endpoint with the same
    /// (host, port) is already present.
    pub fn insert(&mut self, endpoint: Endpoint) -> bool {
        if self.contains(&endpoint) {
            return false;
        }
        self.endpoints.push(endpoint);
        true
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.contains(endpoint)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Computes the difference between this set and a previous one. `added`
    /// and `retained` carry the endpoints of `self`, `removed` those of
    /// `previous`; membership is decided by (host, port) only.
    pub fn diff(&self, previous: &AddressSet) -> AddressDiff {
        let mut diff = AddressDiff::default();
        for endpoint in &self.endpoints {
            if previous.contains(endpoint) {
                diff.retained.push(endpoint.clone());
            } else {
                diff.added.push(endpoint.clone());
            }
        }
        for endpoint in &previous.endpoints {
            if !self.contains(endpoint) {
                diff.removed.push(endpoint.clone());
            }
        }
        diff
    }
}

impl PartialEq for AddressSet {
    fn eq(&self, other: &Self) -> bool {
        self.endpoints.len() == other.endpoints.len()
            && self.endpoints.iter().all(|e| other.contains(e))
    }
}

impl Eq for AddressSet {}

impl FromIterator<Endpoint> for AddressSet {
    fn from_iter<T: IntoIterator<Item = Endpoint>>(iter: T) -> Self {
        let mut set = AddressSet::new();
        for endpoint in iter {
            set.insert(endpoint);
        }
        set
    }
}

impl Display for AddressSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{endpoint}")?;
        }
        write!(f, "]")
    }
}

/// The result of reconciling a new [`AddressSet`] against a previous one.
#[derive(Debug, Default)]
pub struct AddressDiff {
    pub added: Vec<Endpoint>,
    pub removed: Vec<Endpoint>,
    pub retained: Vec<Endpoint>,
}

/// Receives the outcome of each resolution cycle.
///
/// Callbacks are invoked on the resolver's own task and must not block; a
/// listener that needs to do real work should hand the update off to its own
/// execution context.
pub trait ResolverListener: Send + Sync {
    /// Delivers a successfully resolved, non-empty address set.
    fn on_result(&self, addresses: AddressSet);

    /// Reports a failed resolution attempt. The previously delivered address
    /// set, if any, remains in effect.
    fn on_error(&self, status: Status);
}

/// A name resolver for a single target.
pub trait Resolver: Send + Sync {
    /// Begins periodic resolution, delivering every outcome to `listener`.
    /// Subsequent calls are ignored.
    fn start(&mut self, listener: Box<dyn ResolverListener>);

    /// Asks the resolver to obtain an updated result immediately, outside
    /// the periodic schedule. A no-op before `start` or after `shutdown`.
    fn resolve_now(&mut self);

    /// Stops the periodic schedule and releases resources. In-flight
    /// registry queries may complete but their results are discarded.
    fn shutdown(&mut self);

    /// The service authority this resolver resolves.
    fn authority(&self) -> &str;
}

/// A collection of data configured on the channel that is constructing a
/// name resolver.
#[non_exhaustive]
pub struct ResolverOptions {
    /// The authority the channel will use by default.
    pub authority: String,

    /// Interval between periodic resolution attempts.
    pub refresh_interval: Duration,
}

/// A name resolver factory that produces [`Resolver`] instances for the
/// targets of a given URI scheme.
pub trait ResolverBuilder: Send + Sync {
    /// Builds a name resolver instance.
    ///
    /// Note that build must not fail. A resolver that cannot operate should
    /// report an error to its listener on every cycle instead.
    fn build(&self, target: &Target, options: ResolverOptions) -> Box<dyn Resolver>;

    /// Reports the URI scheme handled by this name resolver.
    fn scheme(&self) -> &'static str;

    /// Whether this builder can currently produce resolvers. Unavailable
    /// builders are skipped during registry lookup.
    fn is_available(&self) -> bool {
        true
    }

    /// Relative priority among builders registered for the same scheme;
    /// higher wins.
    fn priority(&self) -> u8 {
        5
    }

    /// Returns the default authority for a channel using this name resolver
    /// and target.
    fn default_authority(&self, target: &Target) -> String {
        target.service_name()
    }
}
