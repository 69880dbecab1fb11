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

//! The wire format of Double Ratchet messages.
//!
//! A message is encoded as a version byte followed by a protocol buffer
//! encoded body:
//!
//! ```text
//! +---------+--------------------+-----------------------+
//! | Version | Tag 1: ratchet key | Tag 2: message number |
//! +---------+--------------------+-----------------------+
//! | Tag 3: previous chain length | Tag 4: ciphertext     |
//! +------------------------------+-----------------------+
//! ```
//!
//! Everything in front of the ciphertext field is the message header, the
//! header bytes are authenticated as the associated data of the AEAD.

use prost::Message as ProstMessage;

use crate::{
    Curve25519PublicKey, DecodeError,
    cipher::TAG_LENGTH,
    utilities::{VarInt, base64_decode, base64_encode},
};

const VERSION: u8 = 1;

/// The unencrypted header of a [`RatchetMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// The sender's current ratchet public key.
    pub ratchet_key: Curve25519PublicKey,
    /// The index of the message in the sender's current sending chain.
    pub message_number: u64,
    /// The number of messages the sender sent on their previous sending
    /// chain.
    pub previous_chain_length: u64,
}

impl MessageHeader {
    /// Encode the header, this is used as the associated data of the message
    /// ciphertext.
    pub fn to_bytes(&self) -> Vec<u8> {
        let ratchet_key = self.ratchet_key.as_bytes();

        [
            [VERSION].as_ref(),
            ProtoBufMessage::RATCHET_TAG.as_ref(),
            &ratchet_key.len().to_var_int(),
            ratchet_key,
            ProtoBufMessage::MESSAGE_NUMBER_TAG.as_ref(),
            &self.message_number.to_var_int(),
            ProtoBufMessage::PREVIOUS_LENGTH_TAG.as_ref(),
            &self.previous_chain_length.to_var_int(),
        ]
        .concat()
    }
}

/// An encrypted Double Ratchet message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatchetMessage {
    /// The header of the message.
    pub header: MessageHeader,
    /// The AEAD ciphertext, including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl RatchetMessage {
    pub(crate) fn new(header: MessageHeader, ciphertext: Vec<u8>) -> Self {
        Self { header, ciphertext }
    }

    /// Try to decode a message from its binary encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::try_from(bytes)
    }

    /// Encode the message into its binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut message = self.header.to_bytes();

        message.extend_from_slice(ProtoBufMessage::CIPHER_TAG);
        message.extend(self.ciphertext.len().to_var_int());
        message.extend_from_slice(&self.ciphertext);

        message
    }

    /// Try to decode a message from an unpadded base64 string.
    pub fn from_base64(message: &str) -> Result<Self, DecodeError> {
        Self::try_from(message)
    }

    /// Encode the message as an unpadded base64 string.
    pub fn to_base64(&self) -> String {
        base64_encode(self.to_bytes())
    }
}

impl TryFrom<&str> for RatchetMessage {
    type Error = DecodeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let decoded = base64_decode(value)?;

        Self::try_from(decoded.as_slice())
    }
}

impl TryFrom<&[u8]> for RatchetMessage {
    type Error = DecodeError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let version = *value.first().ok_or(DecodeError::MissingVersion)?;

        if version != VERSION {
            return Err(DecodeError::InvalidVersion(VERSION, version));
        }

        let inner = ProtoBufMessage::decode(&value[1..])?;

        if inner.ciphertext.len() < TAG_LENGTH {
            return Err(DecodeError::MessageTooShort(inner.ciphertext.len()));
        }

        let header = MessageHeader {
            ratchet_key: Curve25519PublicKey::from_slice(&inner.ratchet_key)?,
            message_number: inner.message_number,
            previous_chain_length: inner.previous_chain_length,
        };

        Ok(Self { header, ciphertext: inner.ciphertext })
    }
}

#[derive(ProstMessage, PartialEq)]
struct ProtoBufMessage {
    #[prost(bytes, tag = "1")]
    ratchet_key: Vec<u8>,
    #[prost(uint64, tag = "2")]
    message_number: u64,
    #[prost(uint64, tag = "3")]
    previous_chain_length: u64,
    #[prost(bytes, tag = "4")]
    ciphertext: Vec<u8>,
}

impl ProtoBufMessage {
    const RATCHET_TAG: &'static [u8; 1] = b"\x0A";
    const MESSAGE_NUMBER_TAG: &'static [u8; 1] = b"\x10";
    const PREVIOUS_LENGTH_TAG: &'static [u8; 1] = b"\x18";
    const CIPHER_TAG: &'static [u8; 1] = b"\x22";
}
