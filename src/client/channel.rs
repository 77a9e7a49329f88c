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

//! A channel that composes name resolution and load balancing over a
//! caller-provided transport.
//!
//! The channel owns a resolver and an LB policy and routes all of their
//! callbacks through one worker task, so the policy runs strictly serially.
//! The policy's published picker is held in an atomically swappable snapshot
//! that [`BalancedChannel::pick`] reads lock-free on every call.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::client::ConnectivityState;
use crate::client::load_balancing::{
    ChannelController, LbPolicyRegistry, LbState, PickArgs, PickResult, Subchannel,
    SubchannelFactory, SubchannelState, SubchannelStateListener, round_robin,
};
use crate::client::name_resolution::{
    AddressSet, Endpoint, Resolver, ResolverListener, ResolverOptions, ResolverRegistry, Target,
    discovery,
};
use crate::status::Status;

/// Configuration for constructing a [`BalancedChannel`].
#[non_exhaustive]
pub struct ChannelOptions {
    /// The target URI naming the service, e.g. `registry://payments`. The
    /// scheme selects the resolver.
    pub target: String,

    /// The name of the LB policy to use.
    pub policy: String,

    /// Interval between periodic resolution attempts.
    pub refresh_interval: Duration,
}

impl ChannelOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            policy: round_robin::POLICY_NAME.to_string(),
            refresh_interval: discovery::DEFAULT_REFRESH_INTERVAL,
        }
    }
}

enum ChannelEvent {
    Resolved(AddressSet),
    ResolutionError(Status),
    SubchannelState(Arc<dyn Subchannel>, SubchannelState),
    RequestConnection,
    Shutdown,
}

/// A client channel that resolves its target through a registry-backed
/// resolver and balances calls across the resolved endpoints.
pub struct BalancedChannel {
    authority: String,
    state: Arc<ArcSwap<LbState>>,
    resolver: Mutex<Box<dyn Resolver>>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BalancedChannel {
    /// Creates a channel for `options.target`, looking up the resolver by
    /// the target's scheme and the LB policy by name in the provided
    /// registries. `transport` supplies the actual connections.
    ///
    /// Resolution starts immediately; until the first picker is published
    /// the channel is Connecting and every pick queues.
    pub fn new(
        options: ChannelOptions,
        resolvers: &ResolverRegistry,
        policies: &LbPolicyRegistry,
        transport: Arc<dyn SubchannelFactory>,
    ) -> Result<Self, Status> {
        let target: Target = options.target.parse().map_err(|err| {
            Status::invalid_argument(format!("invalid target {:?}: {err}", options.target))
        })?;
        let resolver_builder = resolvers.get(target.scheme()).ok_or_else(|| {
            Status::invalid_argument(format!(
                "no resolver registered for scheme {:?}",
                target.scheme()
            ))
        })?;
        let policy_builder = policies.get(&options.policy).ok_or_else(|| {
            Status::invalid_argument(format!(
                "no LB policy registered under {:?}",
                options.policy
            ))
        })?;

        let authority = resolver_builder.default_authority(&target);
        let mut resolver = resolver_builder.build(
            &target,
            ResolverOptions {
                authority: authority.clone(),
                refresh_interval: options.refresh_interval,
            },
        );

        let state = Arc::new(ArcSwap::from_pointee(LbState::initial()));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        let mut policy = policy_builder.build();
        let mut controller = Controller {
            state: state.clone(),
            transport,
            events_tx: events_tx.clone(),
        };
        let worker = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    ChannelEvent::Resolved(addresses) => {
                        policy.resolver_update(addresses, &mut controller);
                    }
                    ChannelEvent::ResolutionError(status) => {
                        policy.resolution_error(status, &mut controller);
                    }
                    ChannelEvent::SubchannelState(subchannel, state) => {
                        policy.subchannel_update(&subchannel, &state, &mut controller);
                    }
                    ChannelEvent::RequestConnection => {
                        policy.request_connection();
                    }
                    ChannelEvent::Shutdown => {
                        policy.shutdown();
                        return;
                    }
                }
            }
            // All senders gone; nothing can reach the policy anymore.
            policy.shutdown();
        });

        info!(%authority, policy = %options.policy, "starting channel for {target}");
        resolver.start(Box::new(EventListener {
            tx: events_tx.clone(),
        }));

        Ok(Self {
            authority,
            state,
            resolver: Mutex::new(resolver),
            events_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Picks a connection for a call using the current picker snapshot.
    /// Never blocks; returns Queue while no connection is usable.
    pub fn pick(&self, args: &PickArgs) -> PickResult {
        self.state.load().picker.pick(args)
    }

    /// The channel's current aggregate connectivity state.
    pub fn state(&self) -> ConnectivityState {
        self.state.load().connectivity_state
    }

    /// The authority of the channel's target.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Asks the resolver for a fresh result outside its periodic schedule.
    pub fn resolve_now(&self) {
        self.resolver.lock().resolve_now();
    }

    /// Asks the LB policy to establish connections on all its subchannels.
    pub fn request_connection(&self) {
        _ = self.events_tx.send(ChannelEvent::RequestConnection);
    }

    /// Shuts the channel down: stops resolution and releases every
    /// subchannel. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.worker.lock().take().is_some() {
            debug!(authority = %self.authority, "shutting down channel");
            self.resolver.lock().shutdown();
            _ = self.events_tx.send(ChannelEvent::Shutdown);
        }
    }
}

impl Drop for BalancedChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Routes resolver callbacks onto the worker's event queue.
struct EventListener {
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl ResolverListener for EventListener {
    fn on_result(&self, addresses: AddressSet) {
        _ = self.tx.send(ChannelEvent::Resolved(addresses));
    }

    fn on_error(&self, status: Status) {
        _ = self.tx.send(ChannelEvent::ResolutionError(status));
    }
}

/// Routes one subchannel's state transitions onto the worker's event queue,
/// tagged with the connection they came from, so that a late event from a
/// replaced connection is never attributed to its successor on the same
/// endpoint.
struct StateForwarder {
    // Weak so the listener and its subchannel never keep each other alive.
    // Set right after the transport hands the subchannel back; subchannels
    // start Idle and report nothing before their first connect call.
    subchannel: OnceLock<Weak<dyn Subchannel>>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl SubchannelStateListener for StateForwarder {
    fn on_state_change(&self, state: SubchannelState) {
        let Some(subchannel) = self.subchannel.get().and_then(Weak::upgrade) else {
            return;
        };
        _ = self
            .tx
            .send(ChannelEvent::SubchannelState(subchannel, state));
    }
}

/// The [`ChannelController`] handed to the policy on every callback.
struct Controller {
    state: Arc<ArcSwap<LbState>>,
    transport: Arc<dyn SubchannelFactory>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelController for Controller {
    fn new_subchannel(&mut self, endpoint: &Endpoint) -> Arc<dyn Subchannel> {
        let listener = Arc::new(StateForwarder {
            subchannel: OnceLock::new(),
            tx: self.events_tx.clone(),
        });
        let subchannel = self.transport.new_subchannel(endpoint, listener.clone());
        _ = listener.subchannel.set(Arc::downgrade(&subchannel));
        subchannel
    }

    fn update_balancing_state(&mut self, update: LbState) {
        debug!(state = %update.connectivity_state, "channel state updated");
        self.state.store(Arc::new(update));
    }
}
