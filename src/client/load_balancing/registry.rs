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
use std::sync::Arc;

use parking_lot::Mutex;

use super::LbPolicyBuilder;

/// A registry to store and retrieve LB policies. Policies are indexed by
/// their name.
///
/// Like [`crate::client::name_resolution::ResolverRegistry`], this is an
/// explicit object passed to channel construction, not an ambient global.
#[derive(Default)]
pub struct LbPolicyRegistry {
    m: Mutex<HashMap<String, Vec<Arc<dyn LbPolicyBuilder>>>>,
}

impl LbPolicyRegistry {
    /// Construct an empty LB policy registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an LB policy into the registry under `builder.name()`. Multiple
    /// builders may share a name; lookup returns the available one with the
    /// highest priority.
    pub fn add_builder(&self, builder: impl LbPolicyBuilder + 'static) {
        self.m
            .lock()
            .entry(builder.name().to_string())
            .or_default()
            .push(Arc::new(builder));
    }

    /// Returns the highest-priority available LB policy builder registered
    /// under the given name, if any.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LbPolicyBuilder>> {
        self.m
            .lock()
            .get(name)?
            .iter()
            .filter(|b| b.is_available())
            .max_by_key(|b| b.priority())
            .cloned()
    }
}
