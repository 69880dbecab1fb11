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

//! An implementation of the Double Ratchet algorithm.
//!
//! A [`RatchetState`] is one end of a 1-to-1 encrypted channel. It is seeded
//! with the shared secret of an [X3DH](crate::x3dh) handshake and from then on
//! continuously introduces new entropy into the channel as messages are sent
//! and received:
//!
//! * Every message is encrypted with a fresh message key derived from a
//!   symmetric chain, old message keys can't be recovered from newer chain
//!   state.
//! * Whenever a message with a new ratchet key of the other side arrives, a
//!   Diffie-Hellman ratchet step mixes new key agreement output into the root
//!   key, healing the session from a past compromise.
//!
//! Messages which arrive out of order can be decrypted as long as the number
//! of message keys the session needs to derive and keep around stays within
//! the bound configured in the [`SessionConfig`].
//!
//! ```rust
//! use anyhow::Result;
//! use x3ratchet::{KeyPair, ratchet::RatchetState};
//!
//! fn main() -> Result<()> {
//!     let shared_secret = [7u8; 32];
//!     let bob_ratchet_key = KeyPair::generate();
//!
//!     let mut alice = RatchetState::initialize_sender(
//!         &shared_secret,
//!         KeyPair::generate(),
//!         bob_ratchet_key.public_key(),
//!     )?;
//!     let mut bob = RatchetState::initialize_receiver(&shared_secret, bob_ratchet_key)?;
//!
//!     let message = alice.encrypt(b"It's a secret to everybody");
//!     assert_eq!(bob.decrypt(&message)?, b"It's a secret to everybody");
//!
//!     let reply = bob.encrypt(b"Indeed");
//!     assert_eq!(alice.decrypt(&reply)?, b"Indeed");
//!
//!     Ok(())
//! }
//! ```

mod chain_key;
mod message_key;
mod ratchet_key;
mod root_key;
mod session_config;
mod skipped_keys;

use chain_key::ChainKey;
use message_key::MessageKey;
use ratchet_key::{RatchetKey, RemoteRatchetKey};
use root_key::RootKey;
use serde::{Deserialize, Serialize};
pub use session_config::{DEFAULT_MAX_SKIPPED_MESSAGE_KEYS, SessionConfig};
pub use skipped_keys::MessageKeyId;
use skipped_keys::SkippedMessageKeys;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    Curve25519PublicKey, KeyError, KeyPair, PickleError,
    messages::RatchetMessage,
    utilities::{pickle, unpickle},
};

/// Error type describing the ways decryption of a [`RatchetMessage`] can fail.
///
/// The [`RatchetState`] is left untouched whenever one of these is returned.
#[derive(Error, Debug)]
pub enum DecryptionError {
    /// The message would require us to derive and store more message keys
    /// than the configured bound allows, either it was forged or too many
    /// messages got lost.
    #[error("Too many skipped messages: the message would skip {gap} message keys, the maximum is {max}")]
    TooManySkippedMessages {
        /// The number of message keys the message would have us skip.
        gap: u64,
        /// The configured bound.
        max: usize,
    },
    /// The message belongs to a part of the chain we already moved past and
    /// we don't have a stored key for it, usually because it was already
    /// decrypted once.
    #[error("The message key for message number {0} isn't available anymore")]
    MissingMessageKey(u64),
    /// The ciphertext or the header failed authentication.
    #[error("The message failed authentication")]
    Authentication,
}

impl From<crate::cipher::DecryptionError> for DecryptionError {
    fn from(_: crate::cipher::DecryptionError) -> Self {
        Self::Authentication
    }
}

/// The result of a Diffie-Hellman ratchet step, on top of the new receiving
/// chain this replaces our root key and our whole sending side.
struct DhRatchetStep {
    root_key: RootKey,
    sending_ratchet_key: RatchetKey,
    sending_chain: ChainKey,
    previous_sending_chain_length: u64,
}

/// Every state change decrypting a message implies, computed on copies of our
/// state so it can be applied only once the message authenticated.
struct ReceiveStep {
    dh_ratchet: Option<DhRatchetStep>,
    receiving_ratchet_key: RemoteRatchetKey,
    receiving_chain: ChainKey,
    skipped_keys: Vec<(MessageKeyId, MessageKey)>,
    message_key: MessageKey,
}

/// One side of a Double Ratchet session.
pub struct RatchetState {
    root_key: RootKey,
    sending_ratchet_key: RatchetKey,
    sending_chain: ChainKey,
    /// The ratchet key of the other side, the current receiving chain belongs
    /// to it. `None` until the first message of the other side arrived if we
    /// are the responder.
    receiving_ratchet_key: Option<RemoteRatchetKey>,
    receiving_chain: ChainKey,
    previous_sending_chain_length: u64,
    skipped_message_keys: SkippedMessageKeys,
    config: SessionConfig,
}

impl std::fmt::Debug for RatchetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetState")
            .field("sending_ratchet_key", &self.sending_ratchet_key())
            .field("receiving_ratchet_key", &self.receiving_ratchet_key())
            .field("send_message_number", &self.send_message_number())
            .field("receive_message_number", &self.receive_message_number())
            .field("previous_sending_chain_length", &self.previous_sending_chain_length)
            .field("skipped_message_keys", &self.skipped_message_keys.len())
            .finish_non_exhaustive()
    }
}

/// Derive keys until the chain reaches the given index, stashing every
/// derived key.
fn skip_message_keys(
    chain: &mut ChainKey,
    ratchet_key: &RemoteRatchetKey,
    until: u64,
    config: &SessionConfig,
    skipped_keys: &mut Vec<(MessageKeyId, MessageKey)>,
) -> Result<(), DecryptionError> {
    let gap = until.saturating_sub(chain.index());
    let max = config.max_skipped_message_keys();

    if gap >= max as u64 {
        warn!(
            ratchet_key = ?ratchet_key.public_key(),
            chain_index = chain.index(),
            gap,
            max,
            "Refusing to skip too many message keys"
        );

        return Err(DecryptionError::TooManySkippedMessages { gap, max });
    }

    derive_skipped_keys(chain, ratchet_key, until, skipped_keys);

    Ok(())
}

/// Stash the keys of the messages the other side sent on its previous chain
/// which we didn't receive yet.
///
/// The length of the previous chain is only authenticated once the message
/// decrypts, so a gap over the skip bound drops the remainder of the old
/// chain instead of deriving it. The new chain stays usable either way.
fn stash_previous_chain(
    chain: &mut ChainKey,
    ratchet_key: &RemoteRatchetKey,
    previous_chain_length: u64,
    config: &SessionConfig,
    skipped_keys: &mut Vec<(MessageKeyId, MessageKey)>,
) {
    let gap = previous_chain_length.saturating_sub(chain.index());
    let max = config.max_skipped_message_keys();

    if gap >= max as u64 {
        warn!(
            ratchet_key = ?ratchet_key.public_key(),
            chain_index = chain.index(),
            gap,
            max,
            "Too many messages of the previous chain are missing, dropping their keys"
        );
    } else {
        derive_skipped_keys(chain, ratchet_key, previous_chain_length, skipped_keys);
    }
}

fn derive_skipped_keys(
    chain: &mut ChainKey,
    ratchet_key: &RemoteRatchetKey,
    until: u64,
    skipped_keys: &mut Vec<(MessageKeyId, MessageKey)>,
) {
    while chain.index() < until {
        let message_key = chain.create_message_key();
        let id = MessageKeyId::new(ratchet_key.public_key(), message_key.index());

        skipped_keys.push((id, message_key));
    }
}

impl RatchetState {
    /// Initialize the session of the side that sends the first message, the
    /// initiator of the X3DH handshake.
    ///
    /// The `receiving_ratchet_key` is the ratchet key the other side
    /// initializes its session with, usually its signed pre-key. Fails if the
    /// `sending_ratchet_key_pair` lacks its secret half.
    pub fn initialize_sender(
        shared_secret: &[u8; 32],
        sending_ratchet_key_pair: KeyPair,
        receiving_ratchet_key: Curve25519PublicKey,
    ) -> Result<Self, KeyError> {
        Self::initialize_sender_with_config(
            shared_secret,
            sending_ratchet_key_pair,
            receiving_ratchet_key,
            SessionConfig::default(),
        )
    }

    /// Same as [`RatchetState::initialize_sender`] but with a custom
    /// [`SessionConfig`].
    pub fn initialize_sender_with_config(
        shared_secret: &[u8; 32],
        sending_ratchet_key_pair: KeyPair,
        receiving_ratchet_key: Curve25519PublicKey,
        config: SessionConfig,
    ) -> Result<Self, KeyError> {
        let sending_ratchet_key = RatchetKey::from(sending_ratchet_key_pair.secret_key()?.clone());
        let receiving_ratchet_key = RemoteRatchetKey::from(receiving_ratchet_key);

        let initial_root_key = RootKey::new(Box::new(*shared_secret));
        let (_, receiving_chain) = initial_root_key.initial_chains();
        let (root_key, sending_chain) =
            initial_root_key.advance(&sending_ratchet_key, &receiving_ratchet_key);

        debug!(
            sending_ratchet_key = ?sending_ratchet_key.public_key(),
            receiving_ratchet_key = ?receiving_ratchet_key.public_key(),
            "Initialized the sending side of a Double Ratchet session"
        );

        Ok(Self {
            root_key,
            sending_ratchet_key,
            sending_chain,
            receiving_ratchet_key: Some(receiving_ratchet_key),
            receiving_chain,
            previous_sending_chain_length: 0,
            skipped_message_keys: SkippedMessageKeys::default(),
            config,
        })
    }

    /// Initialize the session of the side that receives the first message,
    /// the responder of the X3DH handshake.
    ///
    /// Fails if the `receiving_ratchet_key_pair` lacks its secret half.
    pub fn initialize_receiver(
        shared_secret: &[u8; 32],
        receiving_ratchet_key_pair: KeyPair,
    ) -> Result<Self, KeyError> {
        Self::initialize_receiver_with_config(
            shared_secret,
            receiving_ratchet_key_pair,
            SessionConfig::default(),
        )
    }

    /// Same as [`RatchetState::initialize_receiver`] but with a custom
    /// [`SessionConfig`].
    pub fn initialize_receiver_with_config(
        shared_secret: &[u8; 32],
        receiving_ratchet_key_pair: KeyPair,
        config: SessionConfig,
    ) -> Result<Self, KeyError> {
        let sending_ratchet_key =
            RatchetKey::from(receiving_ratchet_key_pair.secret_key()?.clone());

        let root_key = RootKey::new(Box::new(*shared_secret));
        let (receiving_chain, sending_chain) = root_key.initial_chains();

        debug!(
            sending_ratchet_key = ?sending_ratchet_key.public_key(),
            "Initialized the receiving side of a Double Ratchet session"
        );

        Ok(Self {
            root_key,
            sending_ratchet_key,
            sending_chain,
            receiving_ratchet_key: None,
            receiving_chain,
            previous_sending_chain_length: 0,
            skipped_message_keys: SkippedMessageKeys::default(),
            config,
        })
    }

    /// The number of messages we sent on our current sending chain, this is
    /// the message number of the next message we send.
    pub fn send_message_number(&self) -> u64 {
        self.sending_chain.index()
    }

    /// The number of message keys we derived on our current receiving chain.
    pub fn receive_message_number(&self) -> u64 {
        self.receiving_chain.index()
    }

    /// The number of messages we sent on our previous sending chain.
    pub fn previous_sending_chain_length(&self) -> u64 {
        self.previous_sending_chain_length
    }

    /// The number of message keys currently stashed for messages which have
    /// been skipped.
    pub fn skipped_message_keys_len(&self) -> usize {
        self.skipped_message_keys.len()
    }

    /// Do we still hold the key for the given skipped message.
    pub fn has_skipped_message_key(&self, id: &MessageKeyId) -> bool {
        self.skipped_message_keys.get(id).is_some()
    }

    /// Our current ratchet public key, it's sent along with every message.
    pub fn sending_ratchet_key(&self) -> Curve25519PublicKey {
        self.sending_ratchet_key.public_key()
    }

    /// The current ratchet public key of the other side, if we know it.
    pub fn receiving_ratchet_key(&self) -> Option<Curve25519PublicKey> {
        self.receiving_ratchet_key.as_ref().map(RemoteRatchetKey::public_key)
    }

    /// The configuration this session uses.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The current root key.
    ///
    /// **Warning**: This exposes raw secret key material, it should only be
    /// used for diagnostics.
    #[cfg(any(test, feature = "low-level-api"))]
    pub fn root_key(&self) -> &[u8; 32] {
        self.root_key.as_bytes()
    }

    /// The current sending chain key.
    ///
    /// **Warning**: This exposes raw secret key material, it should only be
    /// used for diagnostics.
    #[cfg(any(test, feature = "low-level-api"))]
    pub fn sending_chain_key(&self) -> &[u8; 32] {
        self.sending_chain.as_bytes()
    }

    /// The current receiving chain key.
    ///
    /// **Warning**: This exposes raw secret key material, it should only be
    /// used for diagnostics.
    #[cfg(any(test, feature = "low-level-api"))]
    pub fn receiving_chain_key(&self) -> &[u8; 32] {
        self.receiving_chain.as_bytes()
    }

    /// Encrypt the `plaintext` with the next message key of our sending chain.
    pub fn encrypt(&mut self, plaintext: impl AsRef<[u8]>) -> RatchetMessage {
        let message_key = self.sending_chain.create_message_key();

        message_key.encrypt(
            self.sending_ratchet_key.public_key(),
            self.previous_sending_chain_length,
            plaintext.as_ref(),
        )
    }

    /// Try to decrypt a [`RatchetMessage`] sent by the other side.
    ///
    /// Performs a Diffie-Hellman ratchet step if the message carries a new
    /// ratchet key. Keys of messages that were skipped on the way get
    /// stashed so those messages can still be decrypted once they arrive.
    /// Nothing changes unless the message authenticates.
    pub fn decrypt(&mut self, message: &RatchetMessage) -> Result<Vec<u8>, DecryptionError> {
        let header = &message.header;
        let id = MessageKeyId::new(header.ratchet_key, header.message_number);

        if let Some(message_key) = self.skipped_message_keys.get(&id) {
            let plaintext = message_key.decrypt(message)?;
            self.skipped_message_keys.remove(&id);

            trace!(
                ratchet_key = ?header.ratchet_key,
                message_number = header.message_number,
                "Decrypted a message using a stashed message key"
            );

            return Ok(plaintext);
        }

        let step = self.find_message_key(message)?;
        let plaintext = step.message_key.decrypt(message)?;

        self.apply(step);

        Ok(plaintext)
    }

    fn find_message_key(&self, message: &RatchetMessage) -> Result<ReceiveStep, DecryptionError> {
        let header = &message.header;
        let ratchet_key = RemoteRatchetKey::from(header.ratchet_key);
        let mut skipped_keys = Vec::new();

        let (mut receiving_chain, dh_ratchet) = if self.receiving_ratchet_key == Some(ratchet_key)
        {
            if header.message_number < self.receiving_chain.index() {
                warn!(
                    ratchet_key = ?header.ratchet_key,
                    message_number = header.message_number,
                    chain_index = self.receiving_chain.index(),
                    "Received a message whose key was already used or discarded, \
                     possibly a replay"
                );

                return Err(DecryptionError::MissingMessageKey(header.message_number));
            }

            (self.receiving_chain.clone(), None)
        } else {
            if let Some(current_ratchet_key) = &self.receiving_ratchet_key {
                let mut old_chain = self.receiving_chain.clone();

                stash_previous_chain(
                    &mut old_chain,
                    current_ratchet_key,
                    header.previous_chain_length,
                    &self.config,
                    &mut skipped_keys,
                );
            }

            let (root_key, receiving_chain) =
                self.root_key.advance(&self.sending_ratchet_key, &ratchet_key);

            let sending_ratchet_key = RatchetKey::new();
            let (root_key, sending_chain) = root_key.advance(&sending_ratchet_key, &ratchet_key);

            let step = DhRatchetStep {
                root_key,
                sending_ratchet_key,
                sending_chain,
                previous_sending_chain_length: self.sending_chain.index(),
            };

            (receiving_chain, Some(step))
        };

        skip_message_keys(
            &mut receiving_chain,
            &ratchet_key,
            header.message_number,
            &self.config,
            &mut skipped_keys,
        )?;

        let message_key = receiving_chain.create_message_key();

        Ok(ReceiveStep {
            dh_ratchet,
            receiving_ratchet_key: ratchet_key,
            receiving_chain,
            skipped_keys,
            message_key,
        })
    }

    fn apply(&mut self, step: ReceiveStep) {
        let ReceiveStep {
            dh_ratchet,
            receiving_ratchet_key,
            receiving_chain,
            skipped_keys,
            message_key: _,
        } = step;

        if let Some(DhRatchetStep {
            root_key,
            sending_ratchet_key,
            sending_chain,
            previous_sending_chain_length,
        }) = dh_ratchet
        {
            debug!(
                previous_receiving_ratchet_key = ?self.receiving_ratchet_key(),
                receiving_ratchet_key = ?receiving_ratchet_key.public_key(),
                sending_ratchet_key = ?sending_ratchet_key.public_key(),
                previous_sending_chain_length,
                "Performed a Diffie-Hellman ratchet step"
            );

            self.root_key = root_key;
            self.sending_ratchet_key = sending_ratchet_key;
            self.sending_chain = sending_chain;
            self.previous_sending_chain_length = previous_sending_chain_length;
        }

        if !skipped_keys.is_empty() {
            trace!(count = skipped_keys.len(), "Stashing the keys of skipped messages");
        }

        for (id, message_key) in skipped_keys {
            self.skipped_message_keys.push(
                id,
                message_key,
                self.config.max_skipped_message_keys(),
            );
        }

        self.receiving_ratchet_key = Some(receiving_ratchet_key);
        self.receiving_chain = receiving_chain;
    }

    /// Convert the session into a struct which implements [`serde::Serialize`]
    /// and [`serde::Deserialize`].
    pub fn pickle(&self) -> RatchetStatePickle {
        RatchetStatePickle {
            root_key: self.root_key.clone(),
            sending_ratchet_key: self.sending_ratchet_key.clone(),
            sending_chain: self.sending_chain.clone(),
            receiving_ratchet_key: self.receiving_ratchet_key,
            receiving_chain: self.receiving_chain.clone(),
            previous_sending_chain_length: self.previous_sending_chain_length,
            skipped_message_keys: self.skipped_message_keys.clone(),
            config: self.config,
        }
    }

    /// Restore a [`RatchetState`] from a previously saved
    /// [`RatchetStatePickle`].
    pub fn from_pickle(pickle: RatchetStatePickle) -> Self {
        pickle.into()
    }
}

/// A format suitable for serialization which implements
/// [`serde::Serialize`] and [`serde::Deserialize`]. Obtainable by calling
/// [`RatchetState::pickle`].
#[derive(Serialize, Deserialize)]
pub struct RatchetStatePickle {
    root_key: RootKey,
    sending_ratchet_key: RatchetKey,
    sending_chain: ChainKey,
    receiving_ratchet_key: Option<RemoteRatchetKey>,
    receiving_chain: ChainKey,
    previous_sending_chain_length: u64,
    skipped_message_keys: SkippedMessageKeys,
    #[serde(default)]
    config: SessionConfig,
}

impl RatchetStatePickle {
    /// Serialize and encrypt the pickle using the given key.
    ///
    /// This is the inverse of [`RatchetStatePickle::from_encrypted`].
    pub fn encrypt(self, pickle_key: &[u8; 32]) -> String {
        pickle(&self, pickle_key)
    }

    /// Obtain a pickle from a ciphertext by decrypting and deserializing using
    /// the given key.
    ///
    /// This is the inverse of [`RatchetStatePickle::encrypt`].
    pub fn from_encrypted(ciphertext: &str, pickle_key: &[u8; 32]) -> Result<Self, PickleError> {
        unpickle(ciphertext, pickle_key)
    }
}

impl From<RatchetStatePickle> for RatchetState {
    fn from(pickle: RatchetStatePickle) -> Self {
        let RatchetStatePickle {
            root_key,
            sending_ratchet_key,
            sending_chain,
            receiving_ratchet_key,
            receiving_chain,
            previous_sending_chain_length,
            skipped_message_keys,
            config,
        } = pickle;

        let mut skipped_message_keys = skipped_message_keys;
        skipped_message_keys.truncate(config.max_skipped_message_keys());

        Self {
            root_key,
            sending_ratchet_key,
            sending_chain,
            receiving_ratchet_key,
            receiving_chain,
            previous_sending_chain_length,
            skipped_message_keys,
            config,
        }
    }
}
