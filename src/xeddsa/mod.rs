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

//! XEdDSA signing algorithm implementation
//!
//! XEdDSA lets a Curve25519 key-agreement key produce Ed25519-compatible
//! signatures, so a single identity key can both take part in X3DH and sign
//! the signed pre-key.
//!
//! Reference: <https://signal.org/docs/specifications/xeddsa/#xeddsa>

use std::fmt::{Debug, Formatter};

use curve25519_dalek::{
    EdwardsPoint, MontgomeryPoint,
    scalar::{Scalar, clamp_integer},
};
use ed25519_dalek::{
    Signature, Verifier, VerifyingKey,
    hazmat::{ExpandedSecretKey, raw_sign},
};
use rand::{RngCore, thread_rng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use thiserror::Error;
use zeroize::Zeroize;

use crate::{
    Curve25519PublicKey, Curve25519SecretKey,
    utilities::{base64_decode, base64_encode},
};

/// The number of bytes an XEdDSA signature has.
pub const SIGNATURE_LENGTH: usize = 64;

/// An XEdDSA digital signature, can be used to verify the authenticity of a
/// message.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct XEdDsaSignature(pub(crate) [u8; SIGNATURE_LENGTH]);

impl XEdDsaSignature {
    /// View this signature as a byte array.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Decode a signature from an unpadded base64 string.
    pub fn from_base64(signature: &str) -> Result<Self, SignatureError> {
        base64_decode(signature)?.as_slice().try_into()
    }

    /// Encode the signature as an unpadded base64 string.
    pub fn to_base64(&self) -> String {
        base64_encode(self.0)
    }
}

impl TryFrom<&[u8]> for XEdDsaSignature {
    type Error = SignatureError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let signature: [u8; SIGNATURE_LENGTH] =
            value.try_into().map_err(|_| SignatureError::InvalidSignatureLength(value.len()))?;
        Ok(Self(signature))
    }
}

impl From<[u8; SIGNATURE_LENGTH]> for XEdDsaSignature {
    fn from(value: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(value)
    }
}

impl Debug for XEdDsaSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("XEdDsaSignature").field(&self.to_base64()).finish()
    }
}

impl Serialize for XEdDsaSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for XEdDsaSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let signature = String::deserialize(deserializer)?;
        Self::from_base64(&signature).map_err(serde::de::Error::custom)
    }
}

/// Error type describing XEdDSA signature verification failures.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The signature wasn't valid base64.
    #[error("The signature couldn't be decoded: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded signature was of invalid length.
    #[error("The signature has an invalid length: expected {expected}, got {0}", expected = SIGNATURE_LENGTH)]
    InvalidSignatureLength(usize),
    /// The Curve25519 public key doesn't map to a valid Ed25519 point.
    #[error("The public key can't be converted into a signature verification key")]
    InvalidPublicKey,
    /// The signature failed to be verified.
    #[error("The signature was decoded successfully but is invalid: {0}")]
    InvalidSignature(#[from] ed25519_dalek::SignatureError),
}

/// The Curve25519 secret scalar together with the Ed25519 public key
/// whose sign bit is zero.
///
/// XEdDSA negates the scalar when its public point has the sign bit set, this
/// way the Ed25519 key can be recovered from the Montgomery u-coordinate
/// alone.
fn calculate_key_pair(secret_key: &Curve25519SecretKey) -> (Scalar, EdwardsPoint) {
    let mut secret_bytes = secret_key.to_bytes();
    let scalar = Scalar::from_bytes_mod_order(clamp_integer(*secret_bytes));
    secret_bytes.zeroize();

    let point = EdwardsPoint::mul_base(&scalar);

    if point.compress().as_bytes()[31] & 0x80 != 0 { (-scalar, -point) } else { (scalar, point) }
}

/// Sign the message with the given Curve25519 secret key.
pub(crate) fn sign(secret_key: &Curve25519SecretKey, message: &[u8]) -> XEdDsaSignature {
    let (scalar, point) = calculate_key_pair(secret_key);

    let mut random = [0u8; 64];
    thread_rng().fill_bytes(&mut random);

    // The nonce prefix mixes the secret scalar with fresh randomness, like
    // XEdDSA's hash_1(a || M || Z), the message gets appended by raw_sign.
    let mut digest = Sha512::new()
        .chain_update([0xFEu8])
        .chain_update([0xFFu8; 31])
        .chain_update(scalar.as_bytes())
        .chain_update(random)
        .finalize();
    random.zeroize();

    let mut hash_prefix = [0u8; 32];
    hash_prefix.copy_from_slice(&digest[..32]);
    digest.as_mut_slice().zeroize();

    let expanded_secret_key = ExpandedSecretKey { scalar, hash_prefix };

    #[allow(clippy::expect_used)]
    let verifying_key = VerifyingKey::from_bytes(point.compress().as_bytes())
        .expect("A point we derived from a scalar should always decompress");

    let signature = raw_sign::<Sha512>(&expanded_secret_key, message, &verifying_key);

    XEdDsaSignature(signature.to_bytes())
}

/// Verify that the signature over the message was created by the secret key
/// belonging to the given Curve25519 public key.
///
/// By default this performs an [RFC8032] compatible signature check. A
/// stricter version of the signature check can be enabled with the
/// `strict-signatures` feature flag.
///
/// [RFC8032]: https://datatracker.ietf.org/doc/html/rfc8032#section-5.1.7
pub(crate) fn verify(
    public_key: &Curve25519PublicKey,
    message: &[u8],
    signature: &XEdDsaSignature,
) -> Result<(), SignatureError> {
    let point = MontgomeryPoint(public_key.to_bytes())
        .to_edwards(0)
        .ok_or(SignatureError::InvalidPublicKey)?;

    let verifying_key = VerifyingKey::from_bytes(point.compress().as_bytes())?;
    let signature = Signature::from_bytes(&signature.0);

    if cfg!(feature = "strict-signatures") {
        verifying_key.verify_strict(message, &signature)?;
    } else {
        verifying_key.verify(message, &signature)?;
    }

    Ok(())
}
