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

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, digest::CtOutput};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::message_key::MessageKey;

const MESSAGE_KEY_SEED: &[u8; 1] = b"\x01";
const ADVANCEMENT_SEED: &[u8; 1] = b"\x02";

fn hmac(key: &[u8; 32], seed: &[u8]) -> CtOutput<Hmac<Sha256>> {
    #[allow(clippy::expect_used)]
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .expect("We should be able to create a HMAC object from a 32-byte key");
    mac.update(seed);

    mac.finalize()
}

/// A symmetric-key ratchet, the `KDF_CK` half of the Double Ratchet.
///
/// The index counts how many message keys were already derived from this
/// chain, it doubles as the message number of the next message.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(super) struct ChainKey {
    key: Box<[u8; 32]>,
    index: u64,
}

impl ChainKey {
    pub const fn new(bytes: Box<[u8; 32]>) -> Self {
        Self { key: bytes, index: 0 }
    }

    pub const fn index(&self) -> u64 {
        self.index
    }

    pub fn advance(&mut self) {
        let mut output = hmac(&self.key, ADVANCEMENT_SEED).into_bytes();
        self.key.copy_from_slice(output.as_slice());
        output.as_mut_slice().zeroize();

        self.index += 1;
    }

    pub fn create_message_key(&mut self) -> MessageKey {
        let mut output = hmac(&self.key, MESSAGE_KEY_SEED).into_bytes();

        let mut key = Box::new([0u8; 32]);
        key.copy_from_slice(output.as_slice());
        output.as_mut_slice().zeroize();

        let message_key = MessageKey::new(key, self.index);

        self.advance();

        message_key
    }

    #[cfg(any(test, feature = "low-level-api"))]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}
