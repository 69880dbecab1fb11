//! End-to-end tests of X3DH handshakes followed by Double Ratchet sessions.

use anyhow::Result;
use assert_matches2::assert_matches;
use proptest::prelude::*;
use x3ratchet::{
    KeyPair, RatchetMessage,
    ratchet::{DecryptionError, MessageKeyId, RatchetState, SessionConfig},
    x3dh::{generate_pre_key_bundle, receiver_x3dh, sender_x3dh},
};

/// Run a full X3DH handshake between Alice and Bob and set up both sides of
/// the Double Ratchet session.
fn established_sessions() -> Result<(RatchetState, RatchetState)> {
    let alice_identity = KeyPair::generate();
    let alice_ephemeral = KeyPair::generate();

    let bob_identity = KeyPair::generate();
    let bob_signed_pre_key = KeyPair::generate();
    let bob_one_time_key = KeyPair::generate();

    let bundle =
        generate_pre_key_bundle(&bob_identity, &bob_signed_pre_key, Some(&bob_one_time_key))?;

    let alice_result = sender_x3dh(&alice_identity, &alice_ephemeral, &bundle)?;
    let bob_result = receiver_x3dh(
        &bob_identity,
        &bob_signed_pre_key,
        Some(&bob_one_time_key),
        alice_identity.public_key(),
        alice_ephemeral.public_key(),
    )?;

    assert_eq!(alice_result.shared_secret(), bob_result.shared_secret());

    let alice = RatchetState::initialize_sender(
        alice_result.shared_secret(),
        KeyPair::generate(),
        bundle.signed_pre_key,
    )?;
    let bob = RatchetState::initialize_receiver(bob_result.shared_secret(), bob_signed_pre_key)?;

    Ok((alice, bob))
}

#[test]
fn round_trip() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    let text = "It's a secret to everybody";
    let message = alice.encrypt(text);

    assert_eq!(bob.decrypt(&message)?, text.as_bytes());

    Ok(())
}

#[test]
fn empty_and_large_plaintexts() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    let empty = alice.encrypt(b"");
    assert_eq!(empty.ciphertext.len(), 16);
    assert_eq!(bob.decrypt(&empty)?, b"");

    let large = vec![0x42u8; 4 * 1024 * 1024];
    let message = alice.encrypt(&large);
    assert_eq!(bob.decrypt(&message)?, large);

    Ok(())
}

#[test]
fn three_messages_in_a_row() -> Result<()> {
    let shared_secret = [0u8; 32];
    let bob_ratchet_key = KeyPair::generate();

    let mut alice = RatchetState::initialize_sender(
        &shared_secret,
        KeyPair::generate(),
        bob_ratchet_key.public_key(),
    )?;
    let mut bob = RatchetState::initialize_receiver(&shared_secret, bob_ratchet_key)?;

    let messages: Vec<_> =
        ["Message 1", "Message 2", "Message 3"].iter().map(|text| alice.encrypt(text)).collect();

    for (message, text) in messages.iter().zip(["Message 1", "Message 2", "Message 3"]) {
        assert_eq!(String::from_utf8(bob.decrypt(message)?)?, text);
    }

    assert_eq!(alice.send_message_number(), 3);
    assert_eq!(bob.receive_message_number(), 3);

    Ok(())
}

#[test]
fn bidirectional_conversation() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    let message = alice.encrypt("Hi Bob");
    assert_eq!(bob.decrypt(&message)?, b"Hi Bob");

    let message = bob.encrypt("Hi Alice");
    assert_eq!(alice.decrypt(&message)?, b"Hi Alice");

    let alice_ratchet_key = alice.sending_ratchet_key();
    let message = alice.encrypt("How are you?");
    assert_eq!(message.header.ratchet_key, alice_ratchet_key);
    assert_eq!(message.header.message_number, 0);
    assert_eq!(message.header.previous_chain_length, 1);
    assert_eq!(bob.decrypt(&message)?, b"How are you?");

    let message = bob.encrypt("Fine, thanks");
    assert_eq!(alice.decrypt(&message)?, b"Fine, thanks");

    assert_eq!(alice.receiving_ratchet_key(), Some(bob.sending_ratchet_key()));
    assert_eq!(bob.receiving_ratchet_key(), Some(alice.sending_ratchet_key()));

    Ok(())
}

#[test]
fn out_of_order_messages() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    let messages: Vec<_> = (0..5).map(|i| alice.encrypt(format!("Message {i}"))).collect();

    assert_eq!(bob.decrypt(&messages[3])?, b"Message 3");
    assert_eq!(bob.skipped_message_keys_len(), 3);

    let id = MessageKeyId::new(alice.sending_ratchet_key(), 1);
    assert!(bob.has_skipped_message_key(&id));

    assert_eq!(bob.decrypt(&messages[1])?, b"Message 1");
    assert!(!bob.has_skipped_message_key(&id));
    assert_eq!(bob.decrypt(&messages[0])?, b"Message 0");
    assert_eq!(bob.decrypt(&messages[4])?, b"Message 4");
    assert_eq!(bob.decrypt(&messages[2])?, b"Message 2");

    assert_eq!(bob.skipped_message_keys_len(), 0);

    assert_matches!(bob.decrypt(&messages[2]), Err(DecryptionError::MissingMessageKey(2)));

    Ok(())
}

#[test]
fn too_many_skipped_messages() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    let messages: Vec<_> = (0..1001).map(|_| alice.encrypt("spam")).collect();

    assert_matches!(
        bob.decrypt(&messages[1000]),
        Err(DecryptionError::TooManySkippedMessages { gap: 1000, max: 1000 })
    );
    assert_eq!(bob.skipped_message_keys_len(), 0);

    Ok(())
}

#[test]
fn losing_more_than_the_bound_on_a_previous_chain() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    assert_eq!(bob.decrypt(&alice.encrypt("Delivered"))?, b"Delivered");

    for _ in 0..1001 {
        alice.encrypt("Never delivered");
    }

    assert_eq!(alice.decrypt(&bob.encrypt("Are you there?"))?, b"Are you there?");

    let first = alice.encrypt("Back again");
    let second = alice.encrypt("Still here");
    assert_eq!(first.header.message_number, 0);
    assert_eq!(first.header.previous_chain_length, 1002);

    assert_eq!(bob.decrypt(&first)?, b"Back again");
    assert_eq!(bob.decrypt(&second)?, b"Still here");

    Ok(())
}

#[test]
fn skipping_within_the_bound() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    let messages: Vec<_> = (0..100).map(|i| alice.encrypt(format!("{i}"))).collect();

    assert_eq!(bob.decrypt(&messages[0])?, b"0");
    assert_eq!(bob.decrypt(&messages[99])?, b"99");

    let skipped = bob.skipped_message_keys_len();
    assert!(skipped > 0 && skipped < 1000);
    assert_eq!(skipped, 98);

    Ok(())
}

#[test]
fn cache_is_bounded() -> Result<()> {
    let config = SessionConfig::new(5);
    let bob_ratchet_key = KeyPair::generate();
    let shared_secret = [3u8; 32];

    let mut alice = RatchetState::initialize_sender_with_config(
        &shared_secret,
        KeyPair::generate(),
        bob_ratchet_key.public_key(),
        config,
    )?;
    let mut bob =
        RatchetState::initialize_receiver_with_config(&shared_secret, bob_ratchet_key, config)?;

    let messages: Vec<_> = (0..12).map(|_| alice.encrypt("Hello")).collect();

    bob.decrypt(&messages[4])?;
    assert_eq!(bob.skipped_message_keys_len(), 4);

    bob.decrypt(&messages[8])?;
    assert_eq!(bob.skipped_message_keys_len(), 5);

    // The oldest stashed keys got evicted to make room.
    assert_matches!(bob.decrypt(&messages[0]), Err(DecryptionError::MissingMessageKey(0)));
    assert_eq!(bob.decrypt(&messages[7])?, b"Hello");

    Ok(())
}

#[test]
fn tampered_messages_are_rejected() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    let message = alice.encrypt("Attack at dawn");

    let mut tampered = message.clone();
    let last = tampered.ciphertext.len() - 1;
    tampered.ciphertext[last] ^= 0x01;
    assert_matches!(bob.decrypt(&tampered), Err(DecryptionError::Authentication));

    let mut tampered = message.clone();
    tampered.header.previous_chain_length += 1;
    assert_matches!(bob.decrypt(&tampered), Err(DecryptionError::Authentication));

    let mut tampered = message.clone();
    tampered.header.message_number += 1;
    assert_matches!(bob.decrypt(&tampered), Err(DecryptionError::Authentication));

    assert_eq!(bob.decrypt(&message)?, b"Attack at dawn");

    Ok(())
}

#[test]
fn messages_survive_the_wire() -> Result<()> {
    let (mut alice, mut bob) = established_sessions()?;

    let encoded = alice.encrypt("Over the wire").to_base64();
    let message = RatchetMessage::from_base64(&encoded)?;
    assert_eq!(bob.decrypt(&message)?, b"Over the wire");

    let encoded = bob.encrypt("And back").to_bytes();
    let message = RatchetMessage::from_bytes(&encoded)?;
    assert_eq!(alice.decrypt(&message)?, b"And back");

    Ok(())
}

#[test]
fn session_without_one_time_key() -> Result<()> {
    let alice_identity = KeyPair::generate();
    let alice_ephemeral = KeyPair::generate();
    let bob_identity = KeyPair::generate();
    let bob_signed_pre_key = KeyPair::generate();

    let bundle = generate_pre_key_bundle(&bob_identity, &bob_signed_pre_key, None)?;
    let alice_result = sender_x3dh(&alice_identity, &alice_ephemeral, &bundle)?;
    let bob_result = receiver_x3dh(
        &bob_identity,
        &bob_signed_pre_key,
        None,
        alice_identity.public_key(),
        alice_ephemeral.public_key(),
    )?;

    let mut alice = RatchetState::initialize_sender(
        alice_result.shared_secret(),
        KeyPair::generate(),
        bundle.signed_pre_key,
    )?;
    let mut bob = RatchetState::initialize_receiver(bob_result.shared_secret(), bob_signed_pre_key)?;

    assert_eq!(bob.decrypt(&alice.encrypt("Hello"))?, b"Hello");

    Ok(())
}

proptest! {
    #[test]
    fn arbitrary_plaintexts_round_trip(
        plaintexts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..8)
    ) {
        let (mut alice, mut bob) = established_sessions().expect("Sessions should be established");

        for plaintext in &plaintexts {
            let message = alice.encrypt(plaintext);
            let decrypted = bob.decrypt(&message).expect("The message should decrypt");
            prop_assert_eq!(&decrypted, plaintext);

            let reply = bob.encrypt(plaintext);
            let decrypted = alice.decrypt(&reply).expect("The reply should decrypt");
            prop_assert_eq!(&decrypted, plaintext);
        }
    }
}
