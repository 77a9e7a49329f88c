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

use std::fmt::Display;

pub mod channel;
pub mod load_balancing;
pub mod name_resolution;

pub use channel::{BalancedChannel, ChannelOptions};

/// A representation of the current state of a channel, also used for the
/// state of subchannels (individual connections within the channel).
///
/// A subchannel begins Idle, moves to Connecting when a connection attempt
/// is requested, and from there to Ready on success or TransientFailure on
/// error. From TransientFailure it returns to Connecting or Idle under the
/// transport's backoff. Shutdown is terminal: a subchannel that reported
/// Shutdown never transitions again and is removed from all live
/// collections.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ConnectivityState {
    #[default]
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Idle => write!(f, "Idle"),
            ConnectivityState::Connecting => write!(f, "Connecting"),
            ConnectivityState::Ready => write!(f, "Ready"),
            ConnectivityState::TransientFailure => write!(f, "TransientFailure"),
            ConnectivityState::Shutdown => write!(f, "Shutdown"),
        }
    }
}
