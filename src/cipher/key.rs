// Copyright 2021 The Matrix.org Foundation C.I.C.
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

use chacha20poly1305::{Key as ChaChaKey, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const EXPANDED_LENGTH: usize = KEY_LENGTH + NONCE_LENGTH;

#[derive(Zeroize, ZeroizeOnDrop)]
struct ExpandedKeys(Box<[u8; EXPANDED_LENGTH]>);

impl ExpandedKeys {
    const MESSAGE_HKDF_INFO: &'static [u8] = b"X3RATCHET_MESSAGE_KEYS";
    const PICKLE_HKDF_INFO: &'static [u8] = b"Pickle";

    fn new(message_key: &[u8; 32]) -> Self {
        Self::new_helper(message_key, Self::MESSAGE_HKDF_INFO)
    }

    fn new_pickle(pickle_key: &[u8; 32]) -> Self {
        Self::new_helper(pickle_key, Self::PICKLE_HKDF_INFO)
    }

    fn new_helper(key: &[u8], info: &[u8]) -> Self {
        let mut expanded_keys = Box::new([0u8; EXPANDED_LENGTH]);

        let hkdf: Hkdf<Sha256> = Hkdf::new(Some(&[0]), key);

        #[allow(clippy::expect_used)]
        hkdf.expand(info, expanded_keys.as_mut_slice())
            .expect("We should be able to expand a 32-byte key into 44 bytes");

        Self(expanded_keys)
    }
}

/// The ChaCha20-Poly1305 key and nonce a 32-byte key material expands into.
///
/// Message keys are used exactly once, so the nonce can be derived
/// deterministically together with the key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(super) struct CipherKeys {
    key: Box<[u8; KEY_LENGTH]>,
    nonce: [u8; NONCE_LENGTH],
}

impl CipherKeys {
    pub fn new(message_key: &[u8; 32]) -> Self {
        Self::from_expanded(ExpandedKeys::new(message_key))
    }

    pub fn new_pickle(pickle_key: &[u8; 32]) -> Self {
        Self::from_expanded(ExpandedKeys::new_pickle(pickle_key))
    }

    fn from_expanded(expanded_keys: ExpandedKeys) -> Self {
        let mut key = Box::new([0u8; KEY_LENGTH]);
        let mut nonce = [0u8; NONCE_LENGTH];

        key.copy_from_slice(&expanded_keys.0[0..KEY_LENGTH]);
        nonce.copy_from_slice(&expanded_keys.0[KEY_LENGTH..EXPANDED_LENGTH]);

        Self { key, nonce }
    }

    pub fn key(&self) -> ChaChaKey {
        ChaChaKey::from(*self.key)
    }

    pub fn nonce(&self) -> Nonce {
        Nonce::from(self.nonce)
    }
}
