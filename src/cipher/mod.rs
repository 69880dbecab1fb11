// Copyright 2021 The Matrix.org Foundation C.I.C.
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

mod key;

use chacha20poly1305::{
    ChaCha20Poly1305, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use key::CipherKeys;
use rand::{RngCore, thread_rng};
use thiserror::Error;

/// The length of the Poly1305 authentication tag every ciphertext carries.
pub const TAG_LENGTH: usize = 16;

const NONCE_LENGTH: usize = 12;

/// Error type describing the ways authenticated decryption can fail.
#[derive(Debug, Error)]
pub enum DecryptionError {
    /// The ciphertext failed to authenticate under the given key.
    #[error("The ciphertext failed to authenticate")]
    Authentication,
    /// The ciphertext was too short to contain a nonce and a tag.
    #[error("The ciphertext was too short, expected at least {0} bytes, got {1}")]
    TooShort(usize, usize),
}

/// An authenticated cipher used for encrypting and decrypting messages.
pub(crate) struct Cipher {
    keys: CipherKeys,
}

impl Cipher {
    /// Creates a new [`Cipher`] from a 32-byte message key.
    ///
    /// The key is deterministically expanded into a 32-byte ChaCha20-Poly1305
    /// key and a 12-byte nonce using HKDF-SHA-256, with the byte string
    /// "X3RATCHET_MESSAGE_KEYS" used as the info.
    pub fn new(message_key: &[u8; 32]) -> Self {
        Self { keys: CipherKeys::new(message_key) }
    }

    /// Creates a new [`Cipher`] for encrypting pickles.
    ///
    /// Pickle keys are reused, so pickles get a random nonce which is
    /// prepended to the ciphertext.
    pub fn new_pickle(pickle_key: &[u8; 32]) -> Self {
        Self { keys: CipherKeys::new_pickle(pickle_key) }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(&self.keys.key())
    }

    /// Encrypt and authenticate the plaintext, binding the associated data
    /// to the ciphertext.
    ///
    /// The ciphertext is exactly [`TAG_LENGTH`] bytes longer than the
    /// plaintext.
    pub fn encrypt(&self, associated_data: &[u8], plaintext: &[u8]) -> Vec<u8> {
        self.encrypt_with_nonce(&self.keys.nonce(), associated_data, plaintext)
    }

    /// Authenticate and decrypt a ciphertext produced by [`Cipher::encrypt`].
    pub fn decrypt(
        &self,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DecryptionError> {
        self.decrypt_with_nonce(&self.keys.nonce(), associated_data, ciphertext)
    }

    fn encrypt_with_nonce(
        &self,
        nonce: &Nonce,
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Vec<u8> {
        #[allow(clippy::expect_used)]
        self.cipher()
            .encrypt(nonce, Payload { msg: plaintext, aad: associated_data })
            .expect("ChaCha20-Poly1305 encryption only fails for plaintexts larger than 256 GiB")
    }

    fn decrypt_with_nonce(
        &self,
        nonce: &Nonce,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DecryptionError> {
        self.cipher()
            .decrypt(nonce, Payload { msg: ciphertext, aad: associated_data })
            .map_err(|_| DecryptionError::Authentication)
    }

    /// Encrypt a pickle, prepending a freshly generated nonce to the
    /// ciphertext.
    pub fn encrypt_pickle(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; NONCE_LENGTH];
        thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self.encrypt_with_nonce(&Nonce::from(nonce), &[], plaintext);

        [nonce.as_slice(), &ciphertext].concat()
    }

    /// Decrypt a pickle produced by [`Cipher::encrypt_pickle`].
    pub fn decrypt_pickle(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let minimum_length = NONCE_LENGTH + TAG_LENGTH;

        if ciphertext.len() < minimum_length {
            Err(DecryptionError::TooShort(minimum_length, ciphertext.len()))
        } else {
            let (nonce, ciphertext) = ciphertext.split_at(NONCE_LENGTH);
            let mut nonce_bytes = [0u8; NONCE_LENGTH];
            nonce_bytes.copy_from_slice(nonce);

            self.decrypt_with_nonce(&Nonce::from(nonce_bytes), &[], ciphertext)
        }
    }
}

#[cfg(test)]
mod test {
    use assert_matches2::assert_matches;

    use super::{Cipher, DecryptionError, TAG_LENGTH};

    #[test]
    fn ciphertext_carries_a_fixed_tag() {
        let cipher = Cipher::new(&[1u8; 32]);

        assert_eq!(cipher.encrypt(b"header", b"").len(), TAG_LENGTH);
        assert_eq!(cipher.encrypt(b"header", b"hello").len(), 5 + TAG_LENGTH);
    }

    #[test]
    fn associated_data_is_authenticated() {
        let cipher = Cipher::new(&[1u8; 32]);
        let ciphertext = cipher.encrypt(b"header", b"It's a secret to everybody");

        assert_matches!(
            cipher.decrypt(b"other header", &ciphertext),
            Err(DecryptionError::Authentication)
        );
        assert_eq!(
            cipher.decrypt(b"header", &ciphertext).expect("The ciphertext should authenticate"),
            b"It's a secret to everybody"
        );
    }

    #[test]
    fn decrypt_pickle_too_short() {
        let cipher = Cipher::new_pickle(&[1u8; 32]);

        assert_matches!(cipher.decrypt_pickle(&[2u8; 20]), Err(DecryptionError::TooShort(28, 20)));
        assert_matches!(cipher.decrypt_pickle(&[0u8; 28]), Err(DecryptionError::Authentication));
    }

    #[test]
    fn pickles_use_fresh_nonces() {
        let cipher = Cipher::new_pickle(&[1u8; 32]);

        let first = cipher.encrypt_pickle(b"pickle");
        let second = cipher.encrypt_pickle(b"pickle");

        assert_ne!(first, second);
        assert_eq!(cipher.decrypt_pickle(&first).expect("The pickle should decrypt"), b"pickle");
    }
}
