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

//! The round robin LB policy.
//!
//! Maintains one subchannel per resolved endpoint, reconciled against every
//! new address set so that unchanged endpoints keep their live connections.
//! Whenever the set of Ready subchannels changes, a new picker is published
//! that rotates across them in the order they became Ready.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use super::{
    ChannelController, FailingPicker, LbPolicy, LbPolicyBuilder, LbState, Pick, PickArgs,
    PickResult, Picker, QueuingPicker, Subchannel, SubchannelState,
};
use crate::client::ConnectivityState;
use crate::client::name_resolution::{AddressSet, Endpoint};
use crate::status::Status;

/// The name this policy registers under.
pub static POLICY_NAME: &str = "round_robin";

/// Builds [`RoundRobinBalancer`] instances.
#[derive(Default)]
pub struct RoundRobinBuilder {}

impl RoundRobinBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LbPolicyBuilder for RoundRobinBuilder {
    fn build(&self) -> Box<dyn LbPolicy> {
        Box::new(RoundRobinBalancer::new())
    }

    fn name(&self) -> &'static str {
        POLICY_NAME
    }

    fn priority(&self) -> u8 {
        10
    }
}

struct SubchannelEntry {
    subchannel: Arc<dyn Subchannel>,
    state: ConnectivityState,
}

/// An [`LbPolicy`] that keeps one subchannel per resolved endpoint and
/// spreads calls across the Ready ones in rotation.
pub struct RoundRobinBalancer {
    subchannels: HashMap<Endpoint, SubchannelEntry>,
    // Endpoints in the order they most recently became Ready; determines
    // picker rotation order.
    ready_order: Vec<Endpoint>,
    resolved_once: bool,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            subchannels: HashMap::new(),
            ready_order: Vec::new(),
            resolved_once: false,
        }
    }

    fn current_addresses(&self) -> AddressSet {
        self.subchannels.keys().cloned().collect()
    }

    /// Rebuilds the aggregate state from the recorded subchannel states and
    /// publishes it.
    fn update_aggregate_state(&mut self, channel_controller: &mut dyn ChannelController) {
        let ready: Vec<Arc<dyn Subchannel>> = self
            .ready_order
            .iter()
            .filter_map(|endpoint| self.subchannels.get(endpoint))
            .filter(|entry| entry.state == ConnectivityState::Ready)
            .map(|entry| entry.subchannel.clone())
            .collect();

        let update = if ready.is_empty() {
            LbState {
                connectivity_state: ConnectivityState::Connecting,
                picker: Arc::new(QueuingPicker {}),
            }
        } else {
            debug!(ready = ready.len(), "publishing round robin picker");
            LbState {
                connectivity_state: ConnectivityState::Ready,
                picker: Arc::new(RoundRobinPicker::new(ready)),
            }
        };
        channel_controller.update_balancing_state(update);
    }

    #[cfg(test)]
    fn subchannel_for(&self, endpoint: &Endpoint) -> Option<Arc<dyn Subchannel>> {
        self.subchannels
            .get(endpoint)
            .map(|entry| entry.subchannel.clone())
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LbPolicy for RoundRobinBalancer {
    fn resolver_update(
        &mut self,
        addresses: AddressSet,
        channel_controller: &mut dyn ChannelController,
    ) {
        self.resolved_once = true;
        let diff = addresses.diff(&self.current_addresses());
        if diff.added.is_empty() && diff.removed.is_empty() {
            debug!("address set unchanged, keeping existing subchannels");
            return;
        }
        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            retained = diff.retained.len(),
            "reconciling address set"
        );

        let mut removed_ready = false;
        for endpoint in &diff.removed {
            if let Some(entry) = self.subchannels.remove(endpoint) {
                removed_ready |= entry.state == ConnectivityState::Ready;
                self.ready_order.retain(|e| e != endpoint);
                entry.subchannel.shutdown();
            }
        }

        for endpoint in &diff.added {
            let subchannel = channel_controller.new_subchannel(endpoint);
            subchannel.connect();
            let replaced = self.subchannels.insert(
                endpoint.clone(),
                SubchannelEntry {
                    subchannel,
                    state: ConnectivityState::Idle,
                },
            );
            assert!(
                replaced.is_none(),
                "reconciliation created a duplicate subchannel for {endpoint}"
            );
        }
        assert_eq!(
            self.subchannels.len(),
            diff.retained.len() + diff.added.len(),
            "subchannel map out of sync with resolved address set"
        );

        // A Ready endpoint left the set: the usable connections changed, so
        // the visible picker must stop handing it out.
        if removed_ready {
            self.update_aggregate_state(channel_controller);
        }
    }

    fn resolution_error(&mut self, status: Status, channel_controller: &mut dyn ChannelController) {
        if self.resolved_once {
            // The previously resolved endpoints stay in service.
            warn!(%status, "ignoring resolution error, keeping last good address set");
            return;
        }
        warn!(%status, "resolution failed before any address set was delivered");
        channel_controller.update_balancing_state(LbState {
            connectivity_state: ConnectivityState::TransientFailure,
            picker: Arc::new(FailingPicker { status }),
        });
    }

    fn subchannel_update(
        &mut self,
        subchannel: &Arc<dyn Subchannel>,
        state: &SubchannelState,
        channel_controller: &mut dyn ChannelController,
    ) {
        let endpoint = subchannel.endpoint();
        let new_state = state.connectivity_state;
        if new_state == ConnectivityState::Shutdown {
            // Terminal. Only the connection currently mapped may evict its
            // entry; a late notification from a connection that was already
            // replaced for the same endpoint must not touch the replacement.
            let owned = self
                .subchannels
                .get(&endpoint)
                .is_some_and(|entry| Arc::ptr_eq(&entry.subchannel, subchannel));
            if owned {
                self.ready_order.retain(|e| e != &endpoint);
                self.subchannels.remove(&endpoint);
            }
            return;
        }
        let Some(entry) = self.subchannels.get_mut(&endpoint) else {
            debug!(%endpoint, "state change for unknown subchannel, ignoring");
            return;
        };
        if !Arc::ptr_eq(&entry.subchannel, subchannel) {
            debug!(%endpoint, "state change from a superseded connection, ignoring");
            return;
        }

        if new_state == ConnectivityState::Ready {
            // Keepalive confirmation so the transport holds the connection.
            entry.subchannel.connect();
        }

        let previous = entry.state;
        if previous == ConnectivityState::TransientFailure
            && matches!(
                new_state,
                ConnectivityState::Connecting | ConnectivityState::Idle
            )
        {
            // Reconnect churn after a failure; keep reporting the failure
            // until the subchannel becomes Ready again.
            debug!(%endpoint, %new_state, "suppressing post-failure state change");
            return;
        }

        entry.state = new_state;
        if let Some(error) = &state.last_connection_error {
            warn!(%endpoint, error, "subchannel reported a connection failure");
        }

        if new_state == ConnectivityState::Ready {
            if !self.ready_order.contains(&endpoint) {
                self.ready_order.push(endpoint);
            }
        } else if previous == ConnectivityState::Ready {
            self.ready_order.retain(|e| e != &endpoint);
        }
        self.update_aggregate_state(channel_controller);
    }

    fn request_connection(&mut self) {
        for entry in self.subchannels.values() {
            entry.subchannel.connect();
        }
    }

    fn shutdown(&mut self) {
        for (_, entry) in self.subchannels.drain() {
            entry.subchannel.shutdown();
        }
        self.ready_order.clear();
    }
}

/// An immutable picker that rotates across a fixed list of Ready
/// subchannels. The cursor starts at the first subchannel and advances by
/// one per pick; concurrent picks each observe a distinct cursor value.
struct RoundRobinPicker {
    subchannels: Vec<Arc<dyn Subchannel>>,
    next: AtomicUsize,
}

impl RoundRobinPicker {
    fn new(subchannels: Vec<Arc<dyn Subchannel>>) -> Self {
        Self {
            subchannels,
            next: AtomicUsize::new(0),
        }
    }
}

impl Picker for RoundRobinPicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.subchannels.len();
        PickResult::Pick(Pick {
            subchannel: self.subchannels[index].clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::load_balancing::test_utils::{TestChannelController, TestSubchannel};
    use crate::status::StatusCode;

    fn endpoints(n: u16) -> Vec<Endpoint> {
        (1..=n).map(|i| Endpoint::new(format!("10.0.0.{i}"), 9090)).collect()
    }

    fn addresses(endpoints: &[Endpoint]) -> AddressSet {
        endpoints.iter().cloned().collect()
    }

    // Drives a state change through the connection currently created for
    // `endpoint`.
    fn update(
        policy: &mut RoundRobinBalancer,
        endpoint: &Endpoint,
        state: ConnectivityState,
        controller: &mut TestChannelController,
    ) {
        let subchannel: Arc<dyn Subchannel> = controller.subchannel(endpoint);
        policy.subchannel_update(&subchannel, &SubchannelState::new(state), controller);
    }

    fn ready(
        policy: &mut RoundRobinBalancer,
        endpoint: &Endpoint,
        controller: &mut TestChannelController,
    ) {
        update(policy, endpoint, ConnectivityState::Ready, controller);
    }

    fn picked_endpoint(picker: &dyn Picker) -> Endpoint {
        match picker.pick(&PickArgs::default()) {
            PickResult::Pick(pick) => pick.subchannel.endpoint(),
            other => panic!("expected a pick, got {other:?}"),
        }
    }

    #[test]
    fn creates_and_connects_one_subchannel_per_endpoint() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(3);

        policy.resolver_update(addresses(&eps), &mut controller);

        assert_eq!(controller.created.len(), 3);
        for ep in &eps {
            assert_eq!(controller.subchannel(ep).connect_calls(), 1);
        }
        // Nothing Ready yet, so no picker was published.
        assert!(controller.published.is_empty());
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(3);

        policy.resolver_update(addresses(&eps), &mut controller);
        policy.resolver_update(addresses(&eps), &mut controller);

        assert_eq!(controller.created.len(), 3);
        for ep in &eps {
            assert_eq!(controller.subchannel(ep).shutdown_calls(), 0);
        }
    }

    #[test]
    fn reconciliation_preserves_retained_subchannels() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(4);

        // {e1, e2, e3} then {e2, e3, e4}.
        policy.resolver_update(addresses(&eps[0..3]), &mut controller);
        let kept_before = policy.subchannel_for(&eps[1]).unwrap();
        policy.resolver_update(addresses(&eps[1..4]), &mut controller);

        assert_eq!(controller.subchannel(&eps[0]).shutdown_calls(), 1);
        assert_eq!(controller.created.len(), 4);
        let kept_after = policy.subchannel_for(&eps[1]).unwrap();
        assert!(
            Arc::ptr_eq(&kept_before, &kept_after),
            "retained endpoint lost its subchannel"
        );
    }

    #[test]
    fn picks_rotate_across_ready_subchannels_in_ready_order() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(3);

        policy.resolver_update(addresses(&eps), &mut controller);
        for ep in &eps {
            ready(&mut policy, ep, &mut controller);
        }

        let state = controller.last_state();
        assert_eq!(state.connectivity_state, ConnectivityState::Ready);
        let picker = state.picker.clone();
        for round in 0..3 {
            for ep in &eps {
                assert_eq!(&picked_endpoint(picker.as_ref()), ep, "round {round}");
            }
        }
    }

    #[test]
    fn queues_while_no_subchannel_is_ready() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(1);

        policy.resolver_update(addresses(&eps), &mut controller);
        update(
            &mut policy,
            &eps[0],
            ConnectivityState::Connecting,
            &mut controller,
        );

        let state = controller.last_state();
        assert_eq!(state.connectivity_state, ConnectivityState::Connecting);
        assert!(matches!(
            state.picker.pick(&PickArgs::default()),
            PickResult::Queue
        ));
    }

    #[test]
    fn ready_subchannel_gets_keepalive_connect() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(1);

        policy.resolver_update(addresses(&eps), &mut controller);
        ready(&mut policy, &eps[0], &mut controller);

        // Once at creation, once as the Ready confirmation.
        assert_eq!(controller.subchannel(&eps[0]).connect_calls(), 2);
    }

    #[test]
    fn suppresses_churn_after_transient_failure() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(1);

        policy.resolver_update(addresses(&eps), &mut controller);
        ready(&mut policy, &eps[0], &mut controller);
        let subchannel: Arc<dyn Subchannel> = controller.subchannel(&eps[0]);
        policy.subchannel_update(
            &subchannel,
            &SubchannelState {
                connectivity_state: ConnectivityState::TransientFailure,
                last_connection_error: Some("connection refused".to_string()),
            },
            &mut controller,
        );
        let published = controller.published.len();

        // Backoff-driven churn must not republish.
        update(
            &mut policy,
            &eps[0],
            ConnectivityState::Connecting,
            &mut controller,
        );
        update(&mut policy, &eps[0], ConnectivityState::Idle, &mut controller);
        assert_eq!(controller.published.len(), published);

        // Recovery is not suppressed.
        ready(&mut policy, &eps[0], &mut controller);
        assert_eq!(controller.published.len(), published + 1);
        assert_eq!(
            controller.last_state().connectivity_state,
            ConnectivityState::Ready
        );
    }

    #[test]
    fn removing_a_ready_endpoint_republishes_the_picker() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(2);

        policy.resolver_update(addresses(&eps), &mut controller);
        ready(&mut policy, &eps[0], &mut controller);
        ready(&mut policy, &eps[1], &mut controller);

        policy.resolver_update(addresses(&eps[0..1]), &mut controller);
        assert_eq!(controller.subchannel(&eps[1]).shutdown_calls(), 1);

        let picker = controller.last_state().picker.clone();
        for _ in 0..4 {
            assert_eq!(picked_endpoint(picker.as_ref()), eps[0]);
        }
    }

    #[test]
    fn resolution_error_before_first_result_fails_picks() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();

        policy.resolution_error(Status::unavailable("registry is down"), &mut controller);

        let state = controller.last_state();
        assert_eq!(
            state.connectivity_state,
            ConnectivityState::TransientFailure
        );
        match state.picker.pick(&PickArgs::default()) {
            PickResult::Fail(status) => assert_eq!(status.code(), StatusCode::Unavailable),
            other => panic!("expected a failing pick, got {other:?}"),
        }
    }

    #[test]
    fn resolution_error_after_a_result_keeps_serving() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(1);

        policy.resolver_update(addresses(&eps), &mut controller);
        ready(&mut policy, &eps[0], &mut controller);
        let published = controller.published.len();

        policy.resolution_error(Status::unavailable("registry is down"), &mut controller);

        assert_eq!(controller.published.len(), published);
        assert_eq!(
            controller.last_state().connectivity_state,
            ConnectivityState::Ready
        );
    }

    #[test]
    fn stale_state_changes_are_ignored() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(2);

        policy.resolver_update(addresses(&eps[0..1]), &mut controller);
        let published = controller.published.len();

        // eps[1] was never resolved; its connection's callbacks must not
        // publish.
        let foreign: Arc<dyn Subchannel> = Arc::new(TestSubchannel::new(eps[1].clone()));
        policy.subchannel_update(
            &foreign,
            &SubchannelState::new(ConnectivityState::Ready),
            &mut controller,
        );
        policy.subchannel_update(
            &foreign,
            &SubchannelState::new(ConnectivityState::Shutdown),
            &mut controller,
        );
        assert_eq!(controller.published.len(), published);
    }

    #[test]
    fn late_shutdown_from_a_replaced_connection_is_ignored() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(1);

        // The endpoint leaves the set and comes back, so its first
        // connection is replaced by a second one.
        policy.resolver_update(addresses(&eps), &mut controller);
        let first: Arc<dyn Subchannel> = controller.subchannel(&eps[0]);
        policy.resolver_update(AddressSet::new(), &mut controller);
        policy.resolver_update(addresses(&eps), &mut controller);
        assert_eq!(controller.created.len(), 2);
        assert_eq!(controller.created[0].shutdown_calls(), 1);

        // The first connection's terminal notification arrives only now; it
        // must not evict the replacement.
        policy.subchannel_update(
            &first,
            &SubchannelState::new(ConnectivityState::Shutdown),
            &mut controller,
        );
        ready(&mut policy, &eps[0], &mut controller);
        assert_eq!(
            controller.last_state().connectivity_state,
            ConnectivityState::Ready
        );

        // The replacement is still live: re-resolving the same set creates
        // no third connection and shuts nothing down.
        policy.resolver_update(addresses(&eps), &mut controller);
        assert_eq!(controller.created.len(), 2);
        assert_eq!(controller.subchannel(&eps[0]).shutdown_calls(), 0);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut policy = RoundRobinBalancer::new();
        let mut controller = TestChannelController::new();
        let eps = endpoints(2);

        policy.resolver_update(addresses(&eps), &mut controller);
        policy.shutdown();
        policy.shutdown();

        for ep in &eps {
            assert_eq!(controller.subchannel(ep).shutdown_calls(), 1);
        }
    }
}
