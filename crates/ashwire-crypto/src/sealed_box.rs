//! Sealed-box encryption using X25519 and `XChaCha20-Poly1305`
//!
//! All functions are pure - random bytes must be provided by the caller.
//! This enables deterministic testing and keeps the crate free of any
//! runtime or RNG dependency.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of an X25519 public key (32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the caller-provided seed for the per-message ephemeral key
pub const EPHEMERAL_SEED_SIZE: usize = 32;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Minimum sealed message size: ephemeral key + empty ciphertext + tag
const MIN_SEALED_SIZE: usize = PUBLIC_KEY_SIZE + POLY1305_TAG_SIZE;

/// HKDF domain separator for sealed-box key derivation
const HKDF_DOMAIN: &[u8] = b"ashwire-sealed-box-v1";

/// Errors from sealed-box operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Sealed message is structurally too short to contain a key and tag.
    #[error("sealed message too short: {size} bytes, minimum {min}")]
    SealedTooShort {
        /// Actual message size
        size: usize,
        /// Minimum valid size
        min: usize,
    },

    /// Authentication tag or key material is incorrect.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Why the decryption was rejected
        reason: String,
    },
}

/// An X25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Construct from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Construct from a byte slice. `None` if the length is wrong.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

/// An X25519 secret key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Construct from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

// Manual Debug that never prints key material
impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// A public/secret keypair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Public half, safe to distribute.
    pub public: PublicKey,
    /// Secret half, zeroized on drop.
    pub secret: SecretKey,
}

/// Generate an X25519 keypair from caller-provided random bytes.
///
/// # Security
///
/// - Caller MUST provide cryptographically secure random bytes in production
/// - The seed is clamped per X25519; any 32-byte input yields a valid key
#[must_use]
pub fn generate_keypair(seed: [u8; 32]) -> KeyPair {
    let secret = x25519_dalek::StaticSecret::from(seed);
    let public = x25519_dalek::PublicKey::from(&secret);

    KeyPair {
        public: PublicKey(public.to_bytes()),
        secret: SecretKey(secret.to_bytes()),
    }
}

/// Seal a message to a recipient's public key.
///
/// Returns the sealed wire format:
/// `[ephemeral_pk: 32][ciphertext + tag: variable]`.
///
/// # Security
///
/// - One ephemeral keypair per message; the seed MUST NOT be reused
/// - The ephemeral secret is dropped (and zeroized) before this returns
/// - Caller MUST provide cryptographically secure random bytes in production
#[must_use]
pub fn seal(
    plaintext: &[u8],
    recipient: &PublicKey,
    ephemeral_seed: [u8; EPHEMERAL_SEED_SIZE],
) -> Vec<u8> {
    let ephemeral_secret = x25519_dalek::StaticSecret::from(ephemeral_seed);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral_secret);

    let recipient_key = x25519_dalek::PublicKey::from(*recipient.as_bytes());
    let shared = Zeroizing::new(ephemeral_secret.diffie_hellman(&recipient_key).to_bytes());
    drop(ephemeral_secret);

    let (key, nonce) = derive_key_and_nonce(&shared, &ephemeral_public.to_bytes(), recipient);

    let cipher = XChaCha20Poly1305::new((&*key).into());
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut sealed = Vec::with_capacity(PUBLIC_KEY_SIZE + ciphertext.len());
    sealed.extend_from_slice(&ephemeral_public.to_bytes());
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/// Open a sealed message with the recipient's secret key.
///
/// Returns the decrypted plaintext.
///
/// # Errors
///
/// - `SealedTooShort`: message cannot contain an ephemeral key and tag
/// - `DecryptionFailed`: authentication tag or key is incorrect (tamper, or
///   the message was sealed to a different key)
pub fn open(sealed: &[u8], own_secret: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < MIN_SEALED_SIZE {
        return Err(CryptoError::SealedTooShort { size: sealed.len(), min: MIN_SEALED_SIZE });
    }

    // INVARIANT: length checked above, split cannot panic
    let (ephemeral_bytes, ciphertext) = sealed.split_at(PUBLIC_KEY_SIZE);
    let Some(ephemeral) = PublicKey::from_slice(ephemeral_bytes) else {
        unreachable!("split_at produces exactly PUBLIC_KEY_SIZE bytes");
    };

    let secret = x25519_dalek::StaticSecret::from(own_secret.0);
    let own_public = PublicKey(x25519_dalek::PublicKey::from(&secret).to_bytes());

    let ephemeral_key = x25519_dalek::PublicKey::from(*ephemeral.as_bytes());
    let shared = Zeroizing::new(secret.diffie_hellman(&ephemeral_key).to_bytes());

    let (key, nonce) = derive_key_and_nonce(&shared, ephemeral.as_bytes(), &own_public);

    let cipher = XChaCha20Poly1305::new((&*key).into());
    cipher.decrypt(XNonce::from_slice(&nonce), ciphertext).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}

/// Derive the AEAD key and nonce from the ECDH shared secret.
///
/// Both public keys are mixed into the HKDF info so a ciphertext is bound
/// to its exact (ephemeral, recipient) key pair.
fn derive_key_and_nonce(
    shared: &[u8; 32],
    ephemeral_pk: &[u8; PUBLIC_KEY_SIZE],
    recipient_pk: &PublicKey,
) -> (Zeroizing<[u8; 32]>, [u8; 24]) {
    let hkdf = Hkdf::<Sha256>::new(Some(HKDF_DOMAIN), shared);

    let mut info = [0u8; PUBLIC_KEY_SIZE * 2];
    info[..PUBLIC_KEY_SIZE].copy_from_slice(ephemeral_pk);
    info[PUBLIC_KEY_SIZE..].copy_from_slice(recipient_pk.as_bytes());

    let mut okm = Zeroizing::new([0u8; 56]);
    let Ok(()) = hkdf.expand(&info, okm.as_mut_slice()) else {
        unreachable!("56 bytes is a valid HKDF-SHA256 output length");
    };
    let okm_bytes: &[u8] = okm.as_slice();

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&okm_bytes[..32]);

    let mut nonce = [0u8; 24];
    nonce.copy_from_slice(&okm_bytes[32..]);

    (key, nonce)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn test_keypair(tag: u8) -> KeyPair {
        generate_keypair([tag; 32])
    }

    #[test]
    fn seal_open_roundtrip() {
        let recipient = test_keypair(1);
        let plaintext = b"Hello, World!";

        let sealed = seal(plaintext, &recipient.public, [0xAB; EPHEMERAL_SEED_SIZE]);
        let opened = open(&sealed, &recipient.secret).unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn seal_open_empty_message() {
        let recipient = test_keypair(2);

        let sealed = seal(b"", &recipient.public, [0x00; EPHEMERAL_SEED_SIZE]);
        let opened = open(&sealed, &recipient.secret).unwrap();

        assert!(opened.is_empty());
    }

    #[test]
    fn seal_open_large_message() {
        let recipient = test_keypair(3);
        let plaintext = vec![0x42u8; 64 * 1024]; // 64KB

        let sealed = seal(&plaintext, &recipient.public, [0xFF; EPHEMERAL_SEED_SIZE]);
        let opened = open(&sealed, &recipient.secret).unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn sealed_size_is_plaintext_plus_overhead() {
        let recipient = test_keypair(4);
        let plaintext = b"test message";

        let sealed = seal(plaintext, &recipient.public, [0x11; EPHEMERAL_SEED_SIZE]);

        assert_eq!(sealed.len(), plaintext.len() + PUBLIC_KEY_SIZE + POLY1305_TAG_SIZE);
    }

    #[test]
    fn different_seeds_produce_different_ciphertexts() {
        let recipient = test_keypair(5);
        let plaintext = b"same plaintext";

        let sealed1 = seal(plaintext, &recipient.public, [0x00; EPHEMERAL_SEED_SIZE]);
        let sealed2 = seal(plaintext, &recipient.public, [0x01; EPHEMERAL_SEED_SIZE]);

        assert_ne!(sealed1, sealed2);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let recipient = test_keypair(6);
        let wrong = test_keypair(7);

        let sealed = seal(b"secret message", &recipient.public, [0x22; EPHEMERAL_SEED_SIZE]);
        let result = open(&sealed, &wrong.secret);

        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("authentication")
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let recipient = test_keypair(8);

        let mut sealed = seal(b"original message", &recipient.public, [0x33; EPHEMERAL_SEED_SIZE]);
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        assert!(open(&sealed, &recipient.secret).is_err());
    }

    #[test]
    fn truncated_message_rejected_structurally() {
        let recipient = test_keypair(9);

        let result = open(&[0u8; MIN_SEALED_SIZE - 1], &recipient.secret);

        assert!(matches!(result, Err(CryptoError::SealedTooShort { .. })));
    }

    #[test]
    fn keypair_generation_is_deterministic() {
        let a = generate_keypair([7; 32]);
        let b = generate_keypair([7; 32]);

        assert_eq!(a.public, b.public);
    }

    #[test]
    fn secret_key_debug_hides_material() {
        let pair = test_keypair(10);

        assert_eq!(format!("{:?}", pair.secret), "SecretKey(..)");
    }

    proptest! {
        #[test]
        fn prop_seal_open_identity(
            plaintext in prop::collection::vec(any::<u8>(), 0..4096),
            recipient_seed in any::<[u8; 32]>(),
            ephemeral_seed in any::<[u8; 32]>(),
        ) {
            let recipient = generate_keypair(recipient_seed);

            let sealed = seal(&plaintext, &recipient.public, ephemeral_seed);
            let opened = open(&sealed, &recipient.secret).unwrap();

            prop_assert_eq!(opened, plaintext);
        }

        #[test]
        fn prop_ciphertext_never_contains_plaintext(
            plaintext in prop::collection::vec(any::<u8>(), 16..256),
            recipient_seed in any::<[u8; 32]>(),
            ephemeral_seed in any::<[u8; 32]>(),
        ) {
            let recipient = generate_keypair(recipient_seed);
            let sealed = seal(&plaintext, &recipient.public, ephemeral_seed);

            // The sealed bytes must not leak the plaintext as a substring
            let leaked = sealed.windows(plaintext.len()).any(|w| w == plaintext.as_slice());
            prop_assert!(!leaked, "plaintext leaked into sealed bytes");
        }
    }
}
