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

//! A Rust implementation of X3DH and the Double Ratchet
//!
//! x3ratchet implements the two building blocks of an asynchronous,
//! end-to-end encrypted 1-to-1 channel:
//!
//! # X3DH
//!
//! The [Extended Triple
//! Diffie-Hellman](https://signal.org/docs/specifications/x3dh/) key agreement
//! lets an initiator derive a shared secret with a responder who is offline,
//! using a [`x3dh::PreKeyBundle`] the responder published beforehand. The
//! signed pre-key of the bundle is signed with the responder's Curve25519
//! identity key using
//! [XEdDSA](https://signal.org/docs/specifications/xeddsa/).
//!
//! For more information, see the [`x3dh`] module.
//!
//! # Double Ratchet
//!
//! The [Double Ratchet
//! algorithm](https://signal.org/docs/specifications/doubleratchet/) turns the
//! X3DH shared secret into a session with forward secrecy and self-healing
//! properties. Every message is encrypted with ChaCha20-Poly1305 under a
//! fresh message key.
//!
//! For more information, see the [`ratchet`] module.
//!
//! ```rust
//! use anyhow::Result;
//! use x3ratchet::{
//!     KeyPair,
//!     ratchet::RatchetState,
//!     x3dh::{generate_pre_key_bundle, receiver_x3dh, sender_x3dh},
//! };
//!
//! fn main() -> Result<()> {
//!     let alice_identity = KeyPair::generate();
//!     let alice_ephemeral = KeyPair::generate();
//!
//!     let bob_identity = KeyPair::generate();
//!     let bob_signed_pre_key = KeyPair::generate();
//!
//!     let bundle = generate_pre_key_bundle(&bob_identity, &bob_signed_pre_key, None)?;
//!
//!     let alice_x3dh = sender_x3dh(&alice_identity, &alice_ephemeral, &bundle)?;
//!     let mut alice = RatchetState::initialize_sender(
//!         alice_x3dh.shared_secret(),
//!         KeyPair::generate(),
//!         bundle.signed_pre_key,
//!     )?;
//!
//!     let message = alice.encrypt("Hello Bob").to_base64();
//!
//!     let bob_x3dh = receiver_x3dh(
//!         &bob_identity,
//!         &bob_signed_pre_key,
//!         None,
//!         alice_identity.public_key(),
//!         alice_ephemeral.public_key(),
//!     )?;
//!     let mut bob = RatchetState::initialize_receiver(bob_x3dh.shared_secret(), bob_signed_pre_key)?;
//!
//!     let plaintext = bob.decrypt(&x3ratchet::RatchetMessage::from_base64(&message)?)?;
//!     assert_eq!(plaintext, b"Hello Bob");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//!
//! ## Low-level API
//!
//! Feature: `low-level-api` (default: off)
//!
//! Exposes the raw root and chain keys of a [`ratchet::RatchetState`]. This is
//! only useful for diagnostics, and the exposed keys need to be handled with
//! extreme care.
//!
//! ## Strict signatures
//!
//! Feature: `strict-signatures` (default: off)
//!
//! Verifies XEdDSA signatures using the stricter `verify_strict` check of
//! `ed25519-dalek` instead of the RFC8032 compatible one.
//!
//! # Pickling
//!
//! A [`ratchet::RatchetState`] can be serialized into a "pickle" and restored
//! from it later on. The pickle is a [`ratchet::RatchetStatePickle`], which
//! implements [`serde::Serialize`], and can additionally be encrypted with a
//! 32-byte pickle key:
//!
//! ```rust
//! use anyhow::Result;
//! use x3ratchet::{
//!     KeyPair,
//!     ratchet::{RatchetState, RatchetStatePickle},
//! };
//!
//! const PICKLE_KEY: [u8; 32] = [0u8; 32];
//!
//! fn main() -> Result<()> {
//!     let session = RatchetState::initialize_receiver(&[1u8; 32], KeyPair::generate())?;
//!
//!     let pickle = session.pickle().encrypt(&PICKLE_KEY);
//!     let restored =
//!         RatchetState::from_pickle(RatchetStatePickle::from_encrypted(&pickle, &PICKLE_KEY)?);
//!
//!     assert_eq!(session.sending_ratchet_key(), restored.sending_ratchet_key());
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod cipher;
mod messages;
mod types;
mod utilities;

pub mod ratchet;
pub mod x3dh;
pub mod xeddsa;

pub use base64::DecodeError as Base64DecodeError;
pub use messages::{MessageHeader, RatchetMessage};
pub use prost::DecodeError as ProtoBufDecodeError;
pub use types::{Curve25519PublicKey, Curve25519SecretKey, KeyError, KeyPair, SharedSecret};
pub use utilities::{base64_decode, base64_encode};

/// Error type describing the various ways pickles can fail to be decoded.
#[derive(Debug, thiserror::Error)]
pub enum PickleError {
    /// The pickle wasn't valid base64.
    #[error("The pickle wasn't valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The encrypted pickle could not have been decrypted.
    #[error("The pickle couldn't be decrypted: {0}")]
    Decryption(#[from] cipher::DecryptionError),
    /// The serialized object couldn't be deserialized.
    #[error("The pickle couldn't be deserialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error type describing the different ways message decoding can fail.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The message is missing a valid version.
    #[error("The message didn't contain a version")]
    MissingVersion,
    /// The message has a unsupported version.
    #[error("The message didn't have a valid version, expected {0}, got {1}")]
    InvalidVersion(u8, u8),
    /// The ciphertext is shorter than the authentication tag.
    #[error("The message was too short, the ciphertext only had {0} bytes")]
    MessageTooShort(usize),
    /// An embedded public key couldn't be decoded.
    #[error("The message contained an invalid public key: {0}")]
    InvalidKey(#[from] KeyError),
    /// The message couldn't be decoded as a valid protocol buffer message.
    #[error(transparent)]
    ProtoBuf(#[from] ProtoBufDecodeError),
    /// The message wasn't valid base64.
    #[error("The message wasn't valid base64: {0}")]
    Base64(#[from] Base64DecodeError),
}

/// The version of x3ratchet that is being used.
pub static VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
fn corpus_data_path(fuzz_target: &str) -> std::path::PathBuf {
    let manifest_dir =
        std::env::var("CARGO_MANIFEST_DIR").expect("Cargo always sets the manifest dir");

    let mut afl_dir = std::path::PathBuf::from(manifest_dir);
    afl_dir.push("afl");
    afl_dir.push(fuzz_target);
    afl_dir.push("in");

    afl_dir
}

#[cfg(test)]
fn run_corpus<F>(fuzz_target: &str, method: F)
where
    F: FnOnce(&[u8]) + Copy,
{
    let dir = corpus_data_path(fuzz_target);
    let corpus = std::fs::read_dir(dir).expect("Couldn't read the corpus directory");

    for input in corpus {
        let input = input.expect("Couldn't read the input file");
        let data = std::fs::read(input.path()).expect("Couldn't read the input file");
        method(&data)
    }
}
