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

use super::ResolverBuilder;

/// A registry to store and retrieve name resolvers. Resolvers are indexed by
/// the URI scheme they are intended to handle.
///
/// The registry is an explicit object: callers construct one, register their
/// builders, and pass it to channel construction. There is no ambient global
/// registry.
#[derive(Default)]
pub struct ResolverRegistry {
    m: Mutex<HashMap<String, Vec<Arc<dyn ResolverBuilder>>>>,
}

impl ResolverRegistry {
    /// Construct an empty name resolver registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name resolver into the registry. `builder.scheme()` is the
    /// scheme registered with this builder. Multiple builders may share a
    /// scheme; lookup returns the available one with the highest priority.
    /// Panics if the given scheme contains uppercase characters.
    pub fn add_builder(&self, builder: impl ResolverBuilder + 'static) {
        let scheme = builder.scheme();
        if scheme.chars().any(|c| c.is_ascii_uppercase()) {
            panic!("scheme must not contain uppercase characters: {scheme}");
        }
        self.m
            .lock()
            .entry(scheme.to_string())
            .or_default()
            .push(Arc::new(builder));
    }

    /// Returns the highest-priority available resolver builder registered
    /// for the given scheme, if any.
    ///
    /// The provided scheme is case-insensitive; any uppercase characters
    /// will be converted to lowercase before lookup.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        self.m
            .lock()
            .get(&scheme.to_lowercase())?
            .iter()
            .filter(|b| b.is_available())
            .max_by_key(|b| b.priority())
            .cloned()
    }
}
