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

//! Test doubles for LB policy tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ChannelController, LbState, Subchannel};
use crate::client::name_resolution::Endpoint;

/// A subchannel double that records how often it was asked to connect and
/// shut down, without any transport behind it.
pub(crate) struct TestSubchannel {
    endpoint: Endpoint,
    connect_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
}

impl TestSubchannel {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

impl Subchannel for TestSubchannel {
    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A [`ChannelController`] double that hands out [`TestSubchannel`]s and
/// records every published balancing state for later assertions.
#[derive(Default)]
pub(crate) struct TestChannelController {
    pub(crate) created: Vec<Arc<TestSubchannel>>,
    pub(crate) published: Vec<LbState>,
}

impl TestChannelController {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The double backing the most recently created subchannel for
    /// `endpoint`.
    pub(crate) fn subchannel(&self, endpoint: &Endpoint) -> Arc<TestSubchannel> {
        self.created
            .iter()
            .rev()
            .find(|sc| &sc.endpoint == endpoint)
            .cloned()
            .expect("no subchannel created for endpoint")
    }

    /// The most recently published balancing state.
    pub(crate) fn last_state(&self) -> &LbState {
        self.published.last().expect("no balancing state published")
    }
}

impl ChannelController for TestChannelController {
    fn new_subchannel(&mut self, endpoint: &Endpoint) -> Arc<dyn Subchannel> {
        let subchannel = Arc::new(TestSubchannel::new(endpoint.clone()));
        self.created.push(subchannel.clone());
        subchannel
    }

    fn update_balancing_state(&mut self, update: LbState) {
        self.published.push(update);
    }
}
