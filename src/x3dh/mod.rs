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

//! An implementation of the X3DH (Extended Triple Diffie-Hellman) key
//! agreement.
//!
//! The responder publishes a [`PreKeyBundle`] containing their identity key
//! `IKb`, a signed pre-key `SPKb` together with an XEdDSA signature over it,
//! and optionally a one-time pre-key `OPKb`. The initiator combines the bundle
//! with their own identity key `IKa` and a freshly generated ephemeral key
//! `EKa`:
//!
//! ```text
//!     DH1 = DH(IKa, SPKb)
//!     DH2 = DH(EKa, IKb)
//!     DH3 = DH(EKa, SPKb)
//!     DH4 = DH(EKa, OPKb)
//!
//!     SK = KDF(DH1 || DH2 || DH3 || DH4)
//!     AD = IKa || IKb
//! ```
//!
//! `DH4` is left out if the bundle didn't contain a one-time pre-key. The
//! responder performs the mirrored computations with their secret keys and
//! the initiator's public identity and ephemeral keys, arriving at the same
//! `SK` and `AD`.
//!
//! ```rust
//! use anyhow::Result;
//! use x3ratchet::{
//!     KeyPair,
//!     x3dh::{generate_pre_key_bundle, receiver_x3dh, sender_x3dh},
//! };
//!
//! fn main() -> Result<()> {
//!     let alice_identity = KeyPair::generate();
//!     let alice_ephemeral = KeyPair::generate();
//!
//!     let bob_identity = KeyPair::generate();
//!     let bob_signed_pre_key = KeyPair::generate();
//!     let bob_one_time_key = KeyPair::generate();
//!
//!     let bundle =
//!         generate_pre_key_bundle(&bob_identity, &bob_signed_pre_key, Some(&bob_one_time_key))?;
//!
//!     let alice_result = sender_x3dh(&alice_identity, &alice_ephemeral, &bundle)?;
//!     let bob_result = receiver_x3dh(
//!         &bob_identity,
//!         &bob_signed_pre_key,
//!         Some(&bob_one_time_key),
//!         alice_identity.public_key(),
//!         alice_ephemeral.public_key(),
//!     )?;
//!
//!     assert_eq!(alice_result.shared_secret(), bob_result.shared_secret());
//!     assert_eq!(alice_result.associated_data(), bob_result.associated_data());
//!
//!     Ok(())
//! }
//! ```

mod shared_secret;

use serde::{Deserialize, Serialize};
use shared_secret::SharedX3dhSecret;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    Curve25519PublicKey, KeyError, KeyPair,
    xeddsa::{self, XEdDsaSignature},
};

/// The number of bytes the associated data of an X3DH handshake has.
pub const ASSOCIATED_DATA_LENGTH: usize = 2 * Curve25519PublicKey::LENGTH;

/// The key material a responder publishes so that initiators can establish a
/// session with them while they are offline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    /// The long-term identity key of the responder.
    pub identity_key: Curve25519PublicKey,
    /// The medium-term signed pre-key of the responder.
    pub signed_pre_key: Curve25519PublicKey,
    /// The XEdDSA signature of the identity key over the signed pre-key.
    pub signed_pre_key_signature: XEdDsaSignature,
    /// An optional one-time pre-key, consumed by the first initiator using it.
    pub one_time_pre_key: Option<Curve25519PublicKey>,
}

impl PreKeyBundle {
    /// Check that the signed pre-key was signed by the identity key of this
    /// bundle.
    pub fn verify(&self) -> Result<(), KeyError> {
        Ok(xeddsa::verify(
            &self.identity_key,
            self.signed_pre_key.as_bytes(),
            &self.signed_pre_key_signature,
        )?)
    }
}

/// The output of an X3DH handshake.
///
/// The shared secret is meant to be immediately fed into
/// [`RatchetState::initialize_sender`] or
/// [`RatchetState::initialize_receiver`]; it is zeroized once this struct gets
/// dropped.
///
/// [`RatchetState::initialize_sender`]: crate::ratchet::RatchetState::initialize_sender
/// [`RatchetState::initialize_receiver`]: crate::ratchet::RatchetState::initialize_receiver
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct X3dhResult {
    shared_secret: Box<[u8; 32]>,
    associated_data: [u8; ASSOCIATED_DATA_LENGTH],
}

impl X3dhResult {
    fn new(
        shared_secret: SharedX3dhSecret,
        initiator_identity_key: &Curve25519PublicKey,
        responder_identity_key: &Curve25519PublicKey,
    ) -> Self {
        let mut associated_data = [0u8; ASSOCIATED_DATA_LENGTH];

        associated_data[..Curve25519PublicKey::LENGTH]
            .copy_from_slice(initiator_identity_key.as_bytes());
        associated_data[Curve25519PublicKey::LENGTH..]
            .copy_from_slice(responder_identity_key.as_bytes());

        Self { shared_secret: shared_secret.into_bytes(), associated_data }
    }

    /// The 32-byte secret both sides agreed on.
    pub fn shared_secret(&self) -> &[u8; 32] {
        &self.shared_secret
    }

    /// The initiator's identity key followed by the responder's identity key.
    pub fn associated_data(&self) -> &[u8; ASSOCIATED_DATA_LENGTH] {
        &self.associated_data
    }
}

impl std::fmt::Debug for X3dhResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X3dhResult").finish_non_exhaustive()
    }
}

/// Create a [`PreKeyBundle`] which can be published for initiators to pick
/// up.
///
/// The identity key pair needs to contain its secret half since it signs the
/// signed pre-key, otherwise [`KeyError::MissingPrivateKey`] is returned.
pub fn generate_pre_key_bundle(
    identity_key: &KeyPair,
    signed_pre_key: &KeyPair,
    one_time_pre_key: Option<&KeyPair>,
) -> Result<PreKeyBundle, KeyError> {
    let identity_secret = identity_key.secret_key()?;
    let signed_pre_key = signed_pre_key.public_key();

    let signed_pre_key_signature = xeddsa::sign(identity_secret, signed_pre_key.as_bytes());

    Ok(PreKeyBundle {
        identity_key: identity_key.public_key(),
        signed_pre_key,
        signed_pre_key_signature,
        one_time_pre_key: one_time_pre_key.map(KeyPair::public_key),
    })
}

/// Run the initiator side of the X3DH handshake against a responder's
/// published [`PreKeyBundle`].
///
/// The signature over the signed pre-key is checked before any key agreement
/// takes place.
pub fn sender_x3dh(
    identity_key: &KeyPair,
    ephemeral_key: &KeyPair,
    bundle: &PreKeyBundle,
) -> Result<X3dhResult, KeyError> {
    let identity_secret = identity_key.secret_key()?;
    let ephemeral_secret = ephemeral_key.secret_key()?;

    bundle.verify()?;

    let first_secret = identity_secret.diffie_hellman(&bundle.signed_pre_key);
    let second_secret = ephemeral_secret.diffie_hellman(&bundle.identity_key);
    let third_secret = ephemeral_secret.diffie_hellman(&bundle.signed_pre_key);
    let fourth_secret =
        bundle.one_time_pre_key.as_ref().map(|otk| ephemeral_secret.diffie_hellman(otk));

    debug!(
        responder_identity_key = ?bundle.identity_key,
        uses_one_time_key = fourth_secret.is_some(),
        "Performing the initiator side of X3DH"
    );

    let shared_secret =
        SharedX3dhSecret::new(first_secret, second_secret, third_secret, fourth_secret)?;

    Ok(X3dhResult::new(shared_secret, &identity_key.public_key(), &bundle.identity_key))
}

/// Run the responder side of the X3DH handshake.
///
/// The one-time pre-key pair must be passed in if, and only if, the initiator
/// used the one-time pre-key of the published bundle.
pub fn receiver_x3dh(
    identity_key: &KeyPair,
    signed_pre_key: &KeyPair,
    one_time_pre_key: Option<&KeyPair>,
    sender_identity_key: Curve25519PublicKey,
    sender_ephemeral_key: Curve25519PublicKey,
) -> Result<X3dhResult, KeyError> {
    let identity_secret = identity_key.secret_key()?;
    let signed_pre_key_secret = signed_pre_key.secret_key()?;
    let one_time_secret = one_time_pre_key.map(KeyPair::secret_key).transpose()?;

    let first_secret = signed_pre_key_secret.diffie_hellman(&sender_identity_key);
    let second_secret = identity_secret.diffie_hellman(&sender_ephemeral_key);
    let third_secret = signed_pre_key_secret.diffie_hellman(&sender_ephemeral_key);
    let fourth_secret = one_time_secret.map(|otk| otk.diffie_hellman(&sender_ephemeral_key));

    debug!(
        initiator_identity_key = ?sender_identity_key,
        uses_one_time_key = fourth_secret.is_some(),
        "Performing the responder side of X3DH"
    );

    let shared_secret =
        SharedX3dhSecret::new(first_secret, second_secret, third_secret, fourth_secret)?;

    Ok(X3dhResult::new(shared_secret, &sender_identity_key, &identity_key.public_key()))
}
