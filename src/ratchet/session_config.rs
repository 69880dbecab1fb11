// Copyright 2021 Damir Jelić
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

/// The default number of message keys a single message may force us to skip.
pub const DEFAULT_MAX_SKIPPED_MESSAGE_KEYS: usize = 1000;

/// Tunable limits of a [`RatchetState`].
///
/// [`RatchetState`]: super::RatchetState
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "SessionConfigPickle")]
pub struct SessionConfig {
    max_skipped_message_keys: usize,
}

impl SessionConfig {
    /// Create a `SessionConfig` with the given skip bound.
    ///
    /// A message which would force the session to derive
    /// `max_skipped_message_keys` or more keys it didn't use gets rejected,
    /// the cache of skipped message keys never holds more than that many
    /// entries. The bound is raised to 1 if 0 is given.
    pub fn new(max_skipped_message_keys: usize) -> Self {
        Self { max_skipped_message_keys: max_skipped_message_keys.max(1) }
    }

    /// The maximal number of skipped message keys a session will keep around.
    pub fn max_skipped_message_keys(&self) -> usize {
        self.max_skipped_message_keys
    }
}

#[derive(Deserialize)]
struct SessionConfigPickle {
    max_skipped_message_keys: usize,
}

impl From<SessionConfigPickle> for SessionConfig {
    fn from(pickle: SessionConfigPickle) -> Self {
        Self::new(pickle.max_skipped_message_keys)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SKIPPED_MESSAGE_KEYS)
    }
}

#[cfg(test)]
mod test {
    use super::{DEFAULT_MAX_SKIPPED_MESSAGE_KEYS, SessionConfig};

    #[test]
    fn default_skip_bound() {
        assert_eq!(
            SessionConfig::default().max_skipped_message_keys(),
            DEFAULT_MAX_SKIPPED_MESSAGE_KEYS
        );
        assert_eq!(SessionConfig::new(0).max_skipped_message_keys(), 1);
    }

    #[test]
    fn deserialization_raises_a_zero_bound() {
        let config: SessionConfig = serde_json::from_str(r#"{"max_skipped_message_keys":0}"#)
            .expect("The config should deserialize");

        assert_eq!(config, SessionConfig::new(1));

        let config: SessionConfig = serde_json::from_str(r#"{"max_skipped_message_keys":42}"#)
            .expect("The config should deserialize");

        assert_eq!(config.max_skipped_message_keys(), 42);
    }
}
