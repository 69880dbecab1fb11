// Copyright 2021 Denis Kasak, Damir Jelić
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

use std::fmt::{Debug, Formatter};

use rand::thread_rng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};

use super::KeyError;
use crate::utilities::{base64_decode, base64_encode};

/// A Curve25519 secret key.
#[derive(Serialize, Deserialize, Clone)]
#[serde(transparent)]
pub struct Curve25519SecretKey(Box<StaticSecret>);

impl Curve25519SecretKey {
    /// The number of bytes a Curve25519 secret key has.
    pub const LENGTH: usize = 32;

    /// Generate a new, random, Curve25519SecretKey.
    pub fn new() -> Self {
        let rng = thread_rng();

        Self(Box::new(StaticSecret::random_from_rng(rng)))
    }

    /// Create a `Curve25519SecretKey` from the given bytes.
    pub fn from_slice(bytes: &[u8; Self::LENGTH]) -> Self {
        Self(Box::new(StaticSecret::from(*bytes)))
    }

    /// Perform a Diffie-Hellman key exchange between the given
    /// `Curve25519PublicKey` and this `Curve25519SecretKey` and return a shared
    /// secret.
    pub fn diffie_hellman(&self, their_public_key: &Curve25519PublicKey) -> SharedSecret {
        self.0.diffie_hellman(&their_public_key.inner)
    }

    /// Convert the `Curve25519SecretKey` to a byte array.
    ///
    /// **Note**: This creates a copy of the key which won't be zeroized, the
    /// caller of the method needs to make sure to zeroize the returned array.
    pub fn to_bytes(&self) -> Box<[u8; Self::LENGTH]> {
        Box::new(self.0.to_bytes())
    }
}

impl Default for Curve25519SecretKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Curve25519SecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Curve25519SecretKey").finish_non_exhaustive()
    }
}

/// A Curve25519 public key.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Curve25519PublicKey {
    pub(crate) inner: PublicKey,
}

impl Curve25519PublicKey {
    /// The number of bytes a Curve25519 public key has.
    pub const LENGTH: usize = 32;

    /// Convert this public key to a byte array.
    #[inline]
    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        self.inner.to_bytes()
    }

    /// View this public key as a byte array.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        self.inner.as_bytes()
    }

    /// Instantiate a Curve25519 public key from an unpadded base64
    /// representation.
    pub fn from_base64(input: &str) -> Result<Curve25519PublicKey, KeyError> {
        let key = base64_decode(input)?;
        Self::from_slice(&key)
    }

    /// Try to create a `Curve25519PublicKey` from a slice of bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Curve25519PublicKey, KeyError> {
        let key: [u8; Self::LENGTH] = slice.try_into().map_err(|_| KeyError::InvalidKeyLength {
            key_type: "Curve25519",
            expected_length: Self::LENGTH,
            length: slice.len(),
        })?;

        Ok(Self::from(key))
    }

    /// Serialize a Curve25519 public key to an unpadded base64 representation.
    pub fn to_base64(&self) -> String {
        base64_encode(self.inner.as_bytes())
    }
}

impl Debug for Curve25519PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "curve25519:{}", self.to_base64())
    }
}

impl From<[u8; Self::LENGTH]> for Curve25519PublicKey {
    fn from(bytes: [u8; Self::LENGTH]) -> Curve25519PublicKey {
        Curve25519PublicKey { inner: PublicKey::from(bytes) }
    }
}

impl<'a> From<&'a Curve25519SecretKey> for Curve25519PublicKey {
    fn from(secret: &'a Curve25519SecretKey) -> Curve25519PublicKey {
        Curve25519PublicKey { inner: PublicKey::from(secret.0.as_ref()) }
    }
}

/// A Curve25519 key-agreement key pair.
///
/// Key material we only know the public half of, such as keys published by
/// the other side, is represented by the [`KeyPair::Public`] variant. Every
/// operation which needs the secret half fails with
/// [`KeyError::MissingPrivateKey`] when handed such a key pair.
#[derive(Clone, Serialize, Deserialize)]
pub enum KeyPair {
    /// A public-only view of a key pair.
    Public(Curve25519PublicKey),
    /// A complete key pair.
    Full {
        /// The public half of the key pair.
        public_key: Curve25519PublicKey,
        /// The secret half of the key pair.
        secret_key: Curve25519SecretKey,
    },
}

impl KeyPair {
    /// Generate a new, random, key pair.
    pub fn generate() -> Self {
        Self::from_secret_key(Curve25519SecretKey::new())
    }

    /// Create a complete key pair out of a secret key.
    pub fn from_secret_key(secret_key: Curve25519SecretKey) -> Self {
        let public_key = Curve25519PublicKey::from(&secret_key);

        Self::Full { public_key, secret_key }
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> Curve25519PublicKey {
        match self {
            KeyPair::Public(public_key) | KeyPair::Full { public_key, .. } => *public_key,
        }
    }

    /// The secret half of this key pair.
    ///
    /// Fails with [`KeyError::MissingPrivateKey`] for public-only key pairs.
    pub fn secret_key(&self) -> Result<&Curve25519SecretKey, KeyError> {
        match self {
            KeyPair::Public(_) => Err(KeyError::MissingPrivateKey),
            KeyPair::Full { secret_key, .. } => Ok(secret_key),
        }
    }

    /// Does this key pair contain the secret half.
    pub fn has_secret_key(&self) -> bool {
        matches!(self, KeyPair::Full { .. })
    }

    /// Get a public-only view of this key pair.
    pub fn to_public(&self) -> KeyPair {
        KeyPair::Public(self.public_key())
    }
}

impl From<Curve25519PublicKey> for KeyPair {
    fn from(public_key: Curve25519PublicKey) -> Self {
        KeyPair::Public(public_key)
    }
}

impl From<Curve25519SecretKey> for KeyPair {
    fn from(secret_key: Curve25519SecretKey) -> Self {
        KeyPair::from_secret_key(secret_key)
    }
}

impl Debug for KeyPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPair::Public(public_key) => f.debug_tuple("Public").field(public_key).finish(),
            KeyPair::Full { public_key, .. } => {
                f.debug_struct("Full").field("public_key", public_key).finish_non_exhaustive()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches2::assert_matches;

    use super::{Curve25519PublicKey, Curve25519SecretKey, KeyPair};
    use crate::KeyError;

    #[test]
    fn decoding_invalid_base64_fails() {
        assert_matches!(Curve25519PublicKey::from_base64("a "), Err(KeyError::Base64(_)));
        assert_matches!(Curve25519PublicKey::from_base64("aZ"), Err(KeyError::Base64(_)));
    }

    #[test]
    fn decoding_incorrect_num_of_bytes_fails() {
        assert_matches!(
            Curve25519PublicKey::from_base64("aaaa"),
            Err(KeyError::InvalidKeyLength { expected_length: 32, length: 3, .. })
        );
    }

    #[test]
    fn decoding_of_correct_num_of_bytes_succeeds() {
        let base64_payload = "MDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDA";
        let key = Curve25519PublicKey::from_base64(base64_payload)
            .expect("A 32 byte long base64 payload should decode");

        assert_eq!(key.to_base64(), base64_payload);
    }

    #[test]
    fn public_only_key_pairs_have_no_secret() {
        let key_pair = KeyPair::generate();
        let public = key_pair.to_public();

        assert!(key_pair.has_secret_key());
        assert!(!public.has_secret_key());
        assert_eq!(key_pair.public_key(), public.public_key());
        assert_matches!(public.secret_key(), Err(KeyError::MissingPrivateKey));
    }

    #[test]
    fn diffie_hellman_agrees() {
        let alice = Curve25519SecretKey::new();
        let bob = Curve25519SecretKey::new();

        let first = alice.diffie_hellman(&Curve25519PublicKey::from(&bob));
        let second = bob.diffie_hellman(&Curve25519PublicKey::from(&alice));

        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn secret_key_round_trips_through_bytes() {
        let secret_key = Curve25519SecretKey::new();
        let restored = Curve25519SecretKey::from_slice(&secret_key.to_bytes());

        assert_eq!(Curve25519PublicKey::from(&secret_key), Curve25519PublicKey::from(&restored));
    }
}
