//! Integration-level unit tests for the CryptoService public API.
//!
//! These tests exercise the CryptoService through its public trait interface:
//! encryption correctness, key handling and PKCE material.

use smartmarks::services::crypto_service::{CryptoService, CryptoServiceTrait};

fn key(service: &CryptoService, passphrase: &str) -> Vec<u8> {
    let salt = service.generate_random_bytes(16).unwrap();
    service.derive_key(passphrase, &salt).unwrap()
}

/// Encrypting then decrypting with the same key returns the original bytes.
#[test]
fn test_encrypt_decrypt_with_same_key() {
    let service = CryptoService::new();
    let key = key(&service, "session-key");
    let plaintext = br#"{"access_token":"abc"}"#;

    let encrypted = service.encrypt_aes256gcm(plaintext, &key).unwrap();
    assert_ne!(encrypted.ciphertext, plaintext.to_vec());
    let decrypted = service.decrypt_aes256gcm(&encrypted, &key).unwrap();
    assert_eq!(decrypted, plaintext.to_vec());
}

/// The same plaintext encrypts differently each time (fresh nonce).
#[test]
fn test_encryption_uses_fresh_nonce() {
    let service = CryptoService::new();
    let key = key(&service, "session-key");
    let a = service.encrypt_aes256gcm(b"same", &key).unwrap();
    let b = service.encrypt_aes256gcm(b"same", &key).unwrap();
    assert_ne!(a.iv, b.iv);
    assert_ne!(a.ciphertext, b.ciphertext);
}

/// Data encrypted with one key cannot be decrypted with another.
#[test]
fn test_decryption_with_wrong_key_fails() {
    let service = CryptoService::new();
    let salt = service.generate_random_bytes(16).unwrap();
    let correct = service.derive_key("correct", &salt).unwrap();
    let wrong = service.derive_key("wrong", &salt).unwrap();

    let encrypted = service.encrypt_aes256gcm(b"refresh-token", &correct).unwrap();
    assert!(service.decrypt_aes256gcm(&encrypted, &wrong).is_err());
}

/// A tampered ciphertext fails authentication.
#[test]
fn test_tampered_ciphertext_is_rejected() {
    let service = CryptoService::new();
    let key = key(&service, "session-key");
    let mut encrypted = service.encrypt_aes256gcm(b"payload", &key).unwrap();
    encrypted.ciphertext[0] ^= 0xFF;
    assert!(service.decrypt_aes256gcm(&encrypted, &key).is_err());
}

/// PKCE pairs are unique and the challenge is derived from the verifier.
#[test]
fn test_pkce_pairs_are_unique_and_consistent() {
    let service = CryptoService::new();
    let first = service.generate_pkce_pair().unwrap();
    let second = service.generate_pkce_pair().unwrap();
    assert_ne!(first.verifier, second.verifier);
    assert_eq!(first.challenge, CryptoService::pkce_challenge(&first.verifier));
    assert!(!first.challenge.contains('='));
}

#[test]
fn test_random_bytes_have_requested_length() {
    let service = CryptoService::new();
    assert_eq!(service.generate_random_bytes(32).unwrap().len(), 32);
    assert_ne!(
        service.generate_random_bytes(32).unwrap(),
        service.generate_random_bytes(32).unwrap()
    );
}
