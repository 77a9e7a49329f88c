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

//! Load balancing.
//!
//! LB policies are responsible for creating connections (modeled as
//! subchannels) from the address sets delivered by name resolution, and for
//! producing [`Picker`] instances that choose a connection for each outgoing
//! call.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::client::ConnectivityState;
use crate::client::name_resolution::{AddressSet, Endpoint};
use crate::status::Status;

mod registry;
pub mod round_robin;

#[cfg(test)]
pub(crate) mod test_utils;

pub use registry::LbPolicyRegistry;

/// An LB policy factory that produces [`LbPolicy`] instances used by the
/// channel to manage connections and pick connections for calls.
pub trait LbPolicyBuilder: Send + Sync {
    /// Builds and returns a new LB policy instance.
    ///
    /// Note that build must not fail. An LB policy instance is assumed to
    /// begin in a Connecting state that queues calls until its first update.
    fn build(&self) -> Box<dyn LbPolicy>;

    /// Reports the name of the LB policy.
    fn name(&self) -> &'static str;

    /// Whether this builder can currently produce policies. Unavailable
    /// builders are skipped during registry lookup.
    fn is_available(&self) -> bool {
        true
    }

    /// Relative priority among builders registered under the same name;
    /// higher wins.
    fn priority(&self) -> u8 {
        5
    }
}

/// An LB policy instance.
///
/// All methods are invoked serially on the channel's worker; an LB policy
/// never needs internal locking for its own bookkeeping.
pub trait LbPolicy: Send {
    /// Called by the channel when the name resolver produces a new address
    /// set. The policy reconciles the set against its live connections.
    fn resolver_update(
        &mut self,
        addresses: AddressSet,
        channel_controller: &mut dyn ChannelController,
    );

    /// Called by the channel when a resolution attempt fails.
    fn resolution_error(&mut self, status: Status, channel_controller: &mut dyn ChannelController);

    /// Called by the channel when a subchannel created by this policy
    /// changes state. `subchannel` is the reporting connection itself:
    /// implementations must ignore events from a connection they no longer
    /// own, even when another live connection exists for the same endpoint.
    fn subchannel_update(
        &mut self,
        subchannel: &Arc<dyn Subchannel>,
        state: &SubchannelState,
        channel_controller: &mut dyn ChannelController,
    );

    /// Asks every live subchannel to establish a connection.
    fn request_connection(&mut self);

    /// Shuts down every live subchannel. Must be idempotent.
    fn shutdown(&mut self);
}

/// Controls channel behaviors on behalf of an LB policy.
///
/// Implemented by the RPC runtime (or [`crate::client::BalancedChannel`])
/// and handed to the policy on every call into it.
pub trait ChannelController: Send {
    /// Creates a new subchannel for `endpoint` in Idle state. The controller
    /// binds a state listener to the subchannel that routes its transitions
    /// back into [`LbPolicy::subchannel_update`].
    fn new_subchannel(&mut self, endpoint: &Endpoint) -> Arc<dyn Subchannel>;

    /// Publishes a new snapshot of the policy's aggregate state and picker.
    /// Replacing the currently visible snapshot must be atomic with respect
    /// to concurrent picks.
    fn update_balancing_state(&mut self, update: LbState);
}

/// Represents the reported state of a subchannel.
#[derive(Clone, Debug, Default)]
pub struct SubchannelState {
    /// The connectivity state of the subchannel.
    pub connectivity_state: ConnectivityState,

    /// Set if connectivity state is TransientFailure to describe the most
    /// recent connection error. None for any other state.
    pub last_connection_error: Option<String>,
}

impl SubchannelState {
    pub fn new(connectivity_state: ConnectivityState) -> Self {
        Self {
            connectivity_state,
            last_connection_error: None,
        }
    }
}

/// A subchannel represents one managed connection to a single endpoint.
///
/// Subchannels start Idle. `connect()` requests a connection attempt; on a
/// live connection it is a no-op confirmation that the connection should
/// stay open. `shutdown()` requests release of the underlying resources;
/// slow work happens off the caller. State transitions are reported to the
/// listener the subchannel was created with.
pub trait Subchannel: Send + Sync {
    /// The endpoint this subchannel connects to.
    fn endpoint(&self) -> Endpoint;

    /// Requests a connection attempt (Idle) or keepalive confirmation
    /// (Ready). Never blocks.
    fn connect(&self);

    /// Requests shutdown of the underlying connection. The subchannel
    /// reports Shutdown to its listener once released. Never blocks.
    fn shutdown(&self);
}

/// Receives the state transitions of one subchannel.
///
/// Callbacks must not block: implementations perform in-memory bookkeeping
/// or hand the event off to another execution context.
pub trait SubchannelStateListener: Send + Sync {
    fn on_state_change(&self, state: SubchannelState);
}

/// Creates subchannels on behalf of the channel. This is the boundary to
/// the RPC transport, which is outside this crate.
pub trait SubchannelFactory: Send + Sync {
    /// Creates a subchannel for `endpoint` in Idle state that reports its
    /// state transitions to `listener`.
    fn new_subchannel(
        &self,
        endpoint: &Endpoint,
        listener: Arc<dyn SubchannelStateListener>,
    ) -> Arc<dyn Subchannel>;
}

/// Per-call information passed to [`Picker::pick`]. Round robin ignores it;
/// policies that route by method can inspect it.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct PickArgs {
    /// Fully qualified method being called.
    pub method: String,
}

/// A Picker is an immutable snapshot responsible for deciding what
/// subchannel to use for any given call. A new picker is built whenever the
/// set of usable connections changes; pickers themselves are never mutated
/// after construction, so `pick` is safe under unbounded concurrency.
pub trait Picker: Send + Sync {
    /// Picks a connection to use for the call. Never blocks.
    fn pick(&self, args: &PickArgs) -> PickResult;
}

/// The outcome of one pick.
pub enum PickResult {
    /// The subchannel to use for the call.
    Pick(Pick),
    /// No connection is usable yet ("no result"): the call should be queued
    /// until a new picker is published.
    Queue,
    /// The call should fail fast with the included status.
    Fail(Status),
}

impl Debug for PickResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PickResult::Pick(pick) => write!(f, "Pick({})", pick.subchannel.endpoint()),
            PickResult::Queue => write!(f, "Queue"),
            PickResult::Fail(status) => write!(f, "Fail({status})"),
        }
    }
}

/// A collection of data used by the channel for routing a call.
pub struct Pick {
    /// The subchannel for the call.
    pub subchannel: Arc<dyn Subchannel>,
}

/// The aggregate state of an LB policy: a channel-wide connectivity state
/// paired with the picker to use while that state holds.
#[derive(Clone)]
pub struct LbState {
    pub connectivity_state: ConnectivityState,
    pub picker: Arc<dyn Picker>,
}

impl LbState {
    /// Returns a generic initial LbState which is Connecting with a picker
    /// that queues all picks.
    pub fn initial() -> Self {
        Self {
            connectivity_state: ConnectivityState::Connecting,
            picker: Arc::new(QueuingPicker {}),
        }
    }
}

/// The "no result" sentinel picker: always returns Queue. Published while
/// no connection is usable but connection attempts are in progress.
pub struct QueuingPicker {}

impl Picker for QueuingPicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        PickResult::Queue
    }
}

/// A picker that fails every pick with a fixed status. Published when
/// resolution fails before any usable address set was delivered.
pub struct FailingPicker {
    pub status: Status,
}

impl Picker for FailingPicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        PickResult::Fail(self.status.clone())
    }
}
