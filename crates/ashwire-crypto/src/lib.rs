//! Ashwire Cryptographic Primitives
//!
//! Sealed-box public-key encryption used by Ashwire clients to encrypt
//! messages to each other. The relay itself only ever calls
//! [`generate_keypair`] (for its own published key) and otherwise treats all
//! key and ciphertext bytes as opaque blobs.
//!
//! All functions are pure with deterministic outputs. Callers provide random
//! bytes for deterministic testing.
//!
//! # Construction
//!
//! ```text
//! Ephemeral X25519 Keypair (per message)
//!        │
//!        ▼
//! ECDH(ephemeral_secret, recipient_public) → Shared Secret
//!        │
//!        ▼
//! HKDF-SHA256(shared, ephemeral_pk ‖ recipient_pk) → Message Key + Nonce
//!        │
//!        ▼
//! XChaCha20-Poly1305 → Ciphertext
//! ```
//!
//! Wire format: `[ephemeral_pk: 32][ciphertext + tag: variable]`. The nonce
//! is derived alongside the message key, so it never appears on the wire;
//! uniqueness follows from the per-message ephemeral keypair.
//!
//! # Security
//!
//! - Sender Forward Secrecy: the ephemeral secret is zeroized immediately
//!   after the shared secret is derived. A sender cannot decrypt its own
//!   sealed messages afterwards.
//! - Authenticity: Poly1305 tags reject any tampering with the ciphertext.
//!   There is no sender authentication by design - sessions are anonymous.
//! - Key Binding: both public keys are mixed into the HKDF info, so a
//!   ciphertext re-targeted at a different recipient key fails to open.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod sealed_box;

pub use sealed_box::{
    CryptoError, EPHEMERAL_SEED_SIZE, KeyPair, PUBLIC_KEY_SIZE, PublicKey, SecretKey,
    generate_keypair, open, seal,
};
