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
use x25519_dalek::SharedSecret;

use crate::{Curve25519PublicKey, Curve25519SecretKey};

/// Our own ratchet key pair, the public half of it is sent with every message
/// of the current sending chain.
#[derive(Serialize, Deserialize, Clone)]
pub(super) struct RatchetKey {
    secret_key: Curve25519SecretKey,
    public_key: Curve25519PublicKey,
}

/// The ratchet public key of the other side.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(super) struct RemoteRatchetKey(Curve25519PublicKey);

impl RatchetKey {
    pub fn new() -> Self {
        Self::from(Curve25519SecretKey::new())
    }

    pub fn public_key(&self) -> Curve25519PublicKey {
        self.public_key
    }

    pub fn diffie_hellman(&self, other: &RemoteRatchetKey) -> SharedSecret {
        self.secret_key.diffie_hellman(&other.0)
    }
}

impl From<Curve25519SecretKey> for RatchetKey {
    fn from(secret_key: Curve25519SecretKey) -> Self {
        let public_key = Curve25519PublicKey::from(&secret_key);

        Self { secret_key, public_key }
    }
}

impl RemoteRatchetKey {
    pub fn public_key(&self) -> Curve25519PublicKey {
        self.0
    }
}

impl From<Curve25519PublicKey> for RemoteRatchetKey {
    fn from(key: Curve25519PublicKey) -> Self {
        RemoteRatchetKey(key)
    }
}
