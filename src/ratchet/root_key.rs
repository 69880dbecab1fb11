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

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{
    chain_key::ChainKey,
    ratchet_key::{RatchetKey, RemoteRatchetKey},
};

const ADVANCEMENT_SEED: &[u8] = b"X3RATCHET_ROOT";
const CHAIN_SEED: &[u8] = b"X3RATCHET_CHAINS";

#[derive(Serialize, Deserialize, Clone, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub(super) struct RootKey {
    key: Box<[u8; 32]>,
}

fn split(output: &[u8; 64]) -> (Box<[u8; 32]>, Box<[u8; 32]>) {
    let mut first = Box::new([0u8; 32]);
    let mut second = Box::new([0u8; 32]);

    first.copy_from_slice(&output[..32]);
    second.copy_from_slice(&output[32..]);

    (first, second)
}

impl RootKey {
    pub fn new(bytes: Box<[u8; 32]>) -> Self {
        Self { key: bytes }
    }

    /// The `KDF_RK` step of the Double Ratchet.
    ///
    /// Mixes the Diffie-Hellman output of our ratchet key and the other side's
    /// ratchet key into the root key, producing a new root key and a fresh
    /// chain key.
    pub fn advance(
        &self,
        ratchet_key: &RatchetKey,
        remote_ratchet_key: &RemoteRatchetKey,
    ) -> (RootKey, ChainKey) {
        let shared_secret = ratchet_key.diffie_hellman(remote_ratchet_key);
        let hkdf: Hkdf<Sha256> = Hkdf::new(Some(self.key.as_ref()), shared_secret.as_bytes());
        let mut output = Box::new([0u8; 64]);

        #[allow(clippy::expect_used)]
        hkdf.expand(ADVANCEMENT_SEED, output.as_mut_slice())
            .expect("We should be able to expand the shared secret into 64 bytes");

        let (root_key, chain_key) = split(&output);
        output.zeroize();

        (RootKey::new(root_key), ChainKey::new(chain_key))
    }

    /// Derive the two initial chain keys of a session.
    ///
    /// Returns the chain the initiator receives on and the one the responder
    /// sends on, in that order. The responder can use its chain before it
    /// performed a DH ratchet step, the initiator's one is never used for
    /// sending.
    pub fn initial_chains(&self) -> (ChainKey, ChainKey) {
        let hkdf: Hkdf<Sha256> = Hkdf::new(None, self.key.as_ref());
        let mut output = Box::new([0u8; 64]);

        #[allow(clippy::expect_used)]
        hkdf.expand(CHAIN_SEED, output.as_mut_slice())
            .expect("We should be able to expand the root key into 64 bytes");

        let (initiator, responder) = split(&output);
        output.zeroize();

        (ChainKey::new(initiator), ChainKey::new(responder))
    }

    #[cfg(any(test, feature = "low-level-api"))]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}
