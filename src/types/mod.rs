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

mod curve25519;

pub use curve25519::{Curve25519PublicKey, Curve25519SecretKey, KeyPair};
use thiserror::Error;
pub use x25519_dalek::SharedSecret;

use crate::xeddsa::SignatureError;

/// Error type for failures that may occur when decoding or using a
/// cryptographic key.
#[derive(Error, Debug)]
pub enum KeyError {
    /// An operation which needs the secret half of a key pair was handed a
    /// public-only [`KeyPair`].
    #[error("The key pair doesn't contain a private key")]
    MissingPrivateKey,

    /// Failed to correctly decode a key that was encoded in Base64.
    #[error("Failed to decode a key from Base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The key does not contain the expected number of bytes.
    #[error(
        "Failed to decode {key_type} key: \
        Invalid number of bytes for {key_type}, expected {expected_length}, got {length}."
    )]
    InvalidKeyLength {
        /// The type of key being decoded.
        key_type: &'static str,
        /// The expected length of the key.
        expected_length: usize,
        /// The actual length of the key.
        length: usize,
    },

    /// The signature over a signed pre-key didn't verify.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// One or more keys lacked contributory behavior in the Diffie-Hellman
    /// operation, resulting in an insecure shared secret.
    ///
    /// For more details on contributory behavior please refer to the
    /// [`x25519_dalek::SharedSecret::was_contributory()`] method.
    #[error(
        "One or more keys lacked contributory behavior in the Diffie-Hellman operation, \
         resulting in an insecure shared secret"
    )]
    NonContributoryKey,
}
