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

//! Pluggable service discovery and client-side load balancing for RPC
//! clients.
//!
//! `rondo` turns a logical service name into a set of live connections and
//! picks one connection per outgoing call:
//!
//! - a name resolver periodically queries an external service registry
//!   (e.g. Consul) for the healthy instances of a service and delivers the
//!   resulting address set to its listener;
//! - a load balancer reconciles each address set against its open
//!   connections, tracks per-connection connectivity state, and publishes an
//!   immutable round-robin [`Picker`](client::load_balancing::Picker)
//!   whenever the set of usable connections changes.
//!
//! The RPC transport itself is out of scope: connections are created through
//! a caller-supplied [`SubchannelFactory`](client::load_balancing::SubchannelFactory)
//! and the current picker is consumed by the RPC runtime for each call.
//! [`BalancedChannel`](client::BalancedChannel) wires the two halves
//! together.

pub mod attributes;
pub mod client;
pub mod registry;
pub mod status;

pub use status::{Status, StatusCode};
