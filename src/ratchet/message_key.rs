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

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::DecryptionError;
use crate::{
    Curve25519PublicKey,
    cipher::Cipher,
    messages::{MessageHeader, RatchetMessage},
};

#[derive(Serialize, Deserialize, Clone, Zeroize, ZeroizeOnDrop)]
pub(super) struct MessageKey {
    key: Box<[u8; 32]>,
    index: u64,
}

impl Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { key: _, index } = self;

        f.debug_struct("MessageKey").field("index", index).finish_non_exhaustive()
    }
}

impl MessageKey {
    pub fn new(key: Box<[u8; 32]>, index: u64) -> Self {
        Self { key, index }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Seal the plaintext, the encoded header is authenticated as the
    /// associated data.
    pub fn encrypt(
        &self,
        ratchet_key: Curve25519PublicKey,
        previous_chain_length: u64,
        plaintext: &[u8],
    ) -> RatchetMessage {
        let header = MessageHeader { ratchet_key, message_number: self.index, previous_chain_length };
        let ciphertext = Cipher::new(&self.key).encrypt(&header.to_bytes(), plaintext);

        RatchetMessage::new(header, ciphertext)
    }

    pub fn decrypt(&self, message: &RatchetMessage) -> Result<Vec<u8>, DecryptionError> {
        let cipher = Cipher::new(&self.key);

        Ok(cipher.decrypt(&message.header.to_bytes(), &message.ciphertext)?)
    }

    #[cfg(test)]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

#[cfg(test)]
mod test {
    use assert_matches2::assert_matches;

    use super::MessageKey;
    use crate::{KeyPair, ratchet::DecryptionError};

    #[test]
    fn header_is_authenticated() {
        let message_key = MessageKey::new(Box::new([3u8; 32]), 5);
        let ratchet_key = KeyPair::generate().public_key();

        let message = message_key.encrypt(ratchet_key, 2, b"It's a secret to everybody");

        assert_eq!(message.header.message_number, 5);
        assert_eq!(message.header.previous_chain_length, 2);
        assert_eq!(
            message_key.decrypt(&message).expect("The message should decrypt"),
            b"It's a secret to everybody"
        );

        let mut tampered = message.clone();
        tampered.header.previous_chain_length = 3;
        assert_matches!(message_key.decrypt(&tampered), Err(DecryptionError::Authentication));

        let mut tampered = message;
        tampered.header.ratchet_key = KeyPair::generate().public_key();
        assert_matches!(message_key.decrypt(&tampered), Err(DecryptionError::Authentication));
    }
}
