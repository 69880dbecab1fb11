// Copyright 2024 Damir Jelić
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

//! The key derivation step of X3DH.
//!
//! ```text
//!     F  = 0xFF * 32
//!     S  = F || DH1 || DH2 || DH3 [|| DH4]
//!     SK = HKDF-SHA-512(salt = 0 * 32, S, "X3RATCHET_X3DH_CURVE25519_SHA-512", 32)
//! ```
//!
//! The leading `F` block makes sure the input never starts with a valid
//! Curve25519 public key encoding, which keeps the derivation domain-separated
//! from XEdDSA.

use hkdf::Hkdf;
use sha2::Sha512;
use x25519_dalek::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::KeyError;

const PROTOCOL_NAME: &[u8] = b"X3RATCHET_X3DH_CURVE25519_SHA-512";

/// The 32-byte secret both sides of an X3DH handshake agree on.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(super) struct SharedX3dhSecret(Box<[u8; 32]>);

impl std::fmt::Debug for SharedX3dhSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedX3dhSecret").finish_non_exhaustive()
    }
}

impl SharedX3dhSecret {
    /// Merge the outputs of the three or four Diffie-Hellman operations into
    /// a single secret.
    ///
    /// Fails if any of the outputs lacks contributory behavior, e.g. because
    /// the other side sent us a low-order point.
    pub fn new(
        first_secret: SharedSecret,
        second_secret: SharedSecret,
        third_secret: SharedSecret,
        fourth_secret: Option<SharedSecret>,
    ) -> Result<Self, KeyError> {
        let contributory = first_secret.was_contributory()
            && second_secret.was_contributory()
            && third_secret.was_contributory()
            && fourth_secret.as_ref().is_none_or(SharedSecret::was_contributory);

        if !contributory {
            return Err(KeyError::NonContributoryKey);
        }

        let mut merged_secret = Vec::with_capacity(5 * 32);

        merged_secret.extend_from_slice(&[0xFFu8; 32]);
        merged_secret.extend_from_slice(first_secret.as_bytes());
        merged_secret.extend_from_slice(second_secret.as_bytes());
        merged_secret.extend_from_slice(third_secret.as_bytes());

        if let Some(s) = fourth_secret {
            merged_secret.extend_from_slice(s.as_bytes());
        }

        let salt = [0u8; 32];

        let hkdf: Hkdf<Sha512> = Hkdf::new(Some(&salt), &merged_secret);
        let mut secret_key = Box::new([0u8; 32]);

        #[allow(clippy::expect_used)]
        hkdf.expand(PROTOCOL_NAME, secret_key.as_mut_slice())
            .expect("We should be able to expand the merged X3DH secrets into a 32 byte key");

        merged_secret.zeroize();

        Ok(Self(secret_key))
    }

    pub fn into_bytes(self) -> Box<[u8; 32]> {
        self.0.clone()
    }
}

#[cfg(test)]
mod test {
    use assert_matches2::assert_matches;

    use super::SharedX3dhSecret;
    use crate::{Curve25519PublicKey, Curve25519SecretKey, KeyError};

    #[test]
    fn low_order_points_are_rejected() {
        let secret = Curve25519SecretKey::new();
        let public = Curve25519PublicKey::from(&Curve25519SecretKey::new());
        let identity_point = Curve25519PublicKey::from([0u8; 32]);

        let result = SharedX3dhSecret::new(
            secret.diffie_hellman(&public),
            secret.diffie_hellman(&public),
            secret.diffie_hellman(&identity_point),
            None,
        );

        assert_matches!(result, Err(KeyError::NonContributoryKey));
    }

    #[test]
    fn fourth_secret_changes_the_output() {
        let secret = Curve25519SecretKey::new();
        let public = Curve25519PublicKey::from(&Curve25519SecretKey::new());

        let three = SharedX3dhSecret::new(
            secret.diffie_hellman(&public),
            secret.diffie_hellman(&public),
            secret.diffie_hellman(&public),
            None,
        )
        .expect("Random keys should be contributory");

        let four = SharedX3dhSecret::new(
            secret.diffie_hellman(&public),
            secret.diffie_hellman(&public),
            secret.diffie_hellman(&public),
            Some(secret.diffie_hellman(&public)),
        )
        .expect("Random keys should be contributory");

        assert_ne!(three.into_bytes(), four.into_bytes());
    }
}
