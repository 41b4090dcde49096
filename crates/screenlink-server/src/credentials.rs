//! Credential service: session identifiers, one-time passwords, and
//! password hashing.
//!
//! Session IDs and passwords are minted from the OS random source. Passwords
//! are hashed with bcrypt (cost 10) before they ever touch the session
//! store; the plaintext is returned to the host exactly once at creation.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use screenlink_proto::{LinkError, LinkResult};
use tracing::error;

/// Length of a session identifier in hex characters.
pub const SESSION_ID_LEN: usize = 16;

/// Length of a generated one-time password.
pub const PASSWORD_LEN: usize = 12;

/// bcrypt work factor for session passwords.
const BCRYPT_COST: u32 = 10;

/// Password alphabet with visually ambiguous glyphs removed
/// (no `0`/`O`, `1`/`I`/`l`).
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// Generate a session identifier: 16 uppercase hex characters from the OS
/// random source.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_LEN / 2];
    OsRng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

/// Generate a server-assigned connection identifier (16 lowercase hex
/// characters), unique per live connection in practice.
pub fn generate_connection_id() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a 12-character one-time session password drawn uniformly from
/// the unambiguous alphabet.
pub fn generate_password() -> String {
    let mut rng = OsRng;
    (0..PASSWORD_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_ALPHABET.len());
            PASSWORD_ALPHABET[idx] as char
        })
        .collect()
}

/// Hash a plaintext password with bcrypt. The plaintext is never stored.
pub fn hash_password(plaintext: &str) -> LinkResult<String> {
    bcrypt::hash(plaintext, BCRYPT_COST).map_err(|e| {
        error!(error = %e, "password hashing backend failed");
        LinkError::Credential(e.to_string())
    })
}

/// Verify a plaintext password against a stored bcrypt hash.
///
/// Fails closed: any backend error (malformed hash, backend failure)
/// verifies as `false`.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    match bcrypt::verify(plaintext, hash) {
        Ok(ok) => ok,
        Err(e) => {
            error!(error = %e, "password verification backend failed");
            false
        }
    }
}
