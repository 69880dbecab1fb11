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

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::message_key::MessageKey;
use crate::Curve25519PublicKey;

/// Identifies a message key we derived but didn't use yet: the ratchet key of
/// the chain it belongs to and its index in that chain.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKeyId {
    /// The ratchet public key of the chain the message key belongs to.
    pub ratchet_key: Curve25519PublicKey,
    /// The message number the key decrypts.
    pub message_number: u64,
}

impl MessageKeyId {
    /// Create a new `MessageKeyId`.
    pub fn new(ratchet_key: Curve25519PublicKey, message_number: u64) -> Self {
        Self { ratchet_key, message_number }
    }
}

#[derive(Serialize, Deserialize)]
struct SkippedMessageKey {
    ratchet_key: Curve25519PublicKey,
    message_key: MessageKey,
}

/// A bounded stash of message keys which allows us to decrypt messages that
/// arrive out of order.
///
/// Once the stash is full the oldest key gets evicted.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SkippedMessageKey>", into = "Vec<SkippedMessageKey>")]
pub(super) struct SkippedMessageKeys {
    keys: HashMap<MessageKeyId, MessageKey>,
    order: VecDeque<MessageKeyId>,
}

impl SkippedMessageKeys {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn get(&self, id: &MessageKeyId) -> Option<&MessageKey> {
        self.keys.get(id)
    }

    pub fn remove(&mut self, id: &MessageKeyId) {
        if self.keys.remove(id).is_some() {
            self.order.retain(|k| k != id);
        }
    }

    pub fn push(&mut self, id: MessageKeyId, message_key: MessageKey, max_keys: usize) {
        if max_keys == 0 {
            return;
        }

        if self.keys.insert(id, message_key).is_none() {
            self.order.push_back(id);
        }

        self.truncate(max_keys);
    }

    /// Evict the oldest keys until at most `max_keys` remain.
    pub fn truncate(&mut self, max_keys: usize) {
        while self.keys.len() > max_keys {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.keys.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

impl From<Vec<SkippedMessageKey>> for SkippedMessageKeys {
    fn from(value: Vec<SkippedMessageKey>) -> Self {
        let mut store = Self::default();

        for SkippedMessageKey { ratchet_key, message_key } in value {
            let id = MessageKeyId::new(ratchet_key, message_key.index());

            if store.keys.insert(id, message_key).is_none() {
                store.order.push_back(id);
            }
        }

        store
    }
}

impl From<SkippedMessageKeys> for Vec<SkippedMessageKey> {
    fn from(mut value: SkippedMessageKeys) -> Self {
        let SkippedMessageKeys { keys, order } = &mut value;

        order
            .drain(..)
            .filter_map(|id| {
                keys.remove(&id)
                    .map(|message_key| SkippedMessageKey { ratchet_key: id.ratchet_key, message_key })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::{MessageKeyId, SkippedMessageKeys};
    use crate::{KeyPair, ratchet::message_key::MessageKey};

    fn key(index: u64) -> MessageKey {
        MessageKey::new(Box::new([index as u8; 32]), index)
    }

    #[test]
    fn push_and_remove() {
        let ratchet_key = KeyPair::generate().public_key();
        let id = MessageKeyId::new(ratchet_key, 1);
        let mut store = SkippedMessageKeys::default();

        assert!(store.get(&id).is_none());
        store.push(id, key(1), 10);
        assert_eq!(store.get(&id).map(MessageKey::index), Some(1));
        assert_eq!(store.len(), 1);

        store.remove(&id);
        assert!(store.get(&id).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn oldest_keys_are_evicted() {
        let ratchet_key = KeyPair::generate().public_key();
        let mut store = SkippedMessageKeys::default();

        for i in 0..5 {
            store.push(MessageKeyId::new(ratchet_key, i), key(i), 3);
        }

        assert_eq!(store.len(), 3);
        assert!(store.get(&MessageKeyId::new(ratchet_key, 0)).is_none());
        assert!(store.get(&MessageKeyId::new(ratchet_key, 1)).is_none());
        assert!(store.get(&MessageKeyId::new(ratchet_key, 4)).is_some());
    }

    #[test]
    fn truncating_keeps_the_newest_keys() {
        let ratchet_key = KeyPair::generate().public_key();
        let mut store = SkippedMessageKeys::default();

        for i in 0..4 {
            store.push(MessageKeyId::new(ratchet_key, i), key(i), 10);
        }

        store.truncate(2);

        assert_eq!(store.len(), 2);
        assert!(store.get(&MessageKeyId::new(ratchet_key, 1)).is_none());
        assert!(store.get(&MessageKeyId::new(ratchet_key, 2)).is_some());
        assert!(store.get(&MessageKeyId::new(ratchet_key, 3)).is_some());
    }

    #[test]
    fn keys_of_different_chains_do_not_collide() {
        let first = KeyPair::generate().public_key();
        let second = KeyPair::generate().public_key();
        let mut store = SkippedMessageKeys::default();

        store.push(MessageKeyId::new(first, 0), key(0), 10);
        store.push(MessageKeyId::new(second, 0), key(0), 10);

        assert_eq!(store.len(), 2);
        store.remove(&MessageKeyId::new(first, 0));
        assert!(store.get(&MessageKeyId::new(second, 0)).is_some());
    }

    #[test]
    fn serialization_keeps_the_insertion_order() {
        let ratchet_key = KeyPair::generate().public_key();
        let mut store = SkippedMessageKeys::default();

        for i in [4, 2, 7] {
            store.push(MessageKeyId::new(ratchet_key, i), key(i), 10);
        }

        let json = serde_json::to_string(&store).expect("The store should serialize");
        let mut restored: SkippedMessageKeys =
            serde_json::from_str(&json).expect("The store should deserialize");

        assert_eq!(restored.len(), 3);

        restored.push(MessageKeyId::new(ratchet_key, 9), key(9), 3);
        assert!(restored.get(&MessageKeyId::new(ratchet_key, 4)).is_none());
        assert!(restored.get(&MessageKeyId::new(ratchet_key, 2)).is_some());
    }
}
