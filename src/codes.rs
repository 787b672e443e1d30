//! Gift card code and token generation.
//!
//! Raw redemption codes are handed to the purchaser/recipient exactly once
//! (inside notification events) and only their salted hash is persisted.
//! Verification tokens are a separate, shorter secret for staff lookups.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const CODE_BYTES: usize = 32;
const TOKEN_BYTES: usize = 16;
const SALT_BYTES: usize = 16;

/// Generate a random redemption code (base64url, unpadded).
pub fn generate_code() -> String {
    random_base64(CODE_BYTES)
}

/// Generate a random verification token (base64url, unpadded).
pub fn generate_verification_token() -> String {
    random_base64(TOKEN_BYTES)
}

fn random_base64(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a redemption code for storage.
///
/// Format: `base64url(salt)$base64url(sha256(salt || code))`. The salt is
/// fresh per card, so equal codes never share a stored hash.
pub fn hash_code(code: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);
    let digest = salted_digest(&salt, code);
    format!(
        "{}${}",
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Check a supplied code against a stored hash.
///
/// Digest comparison is constant-time; a malformed stored hash simply
/// fails verification.
pub fn verify_code(code: &str, stored_hash: &str) -> bool {
    let Some((salt_part, digest_part)) = stored_hash.split_once('$') else {
        return false;
    };
    let Ok(salt) = URL_SAFE_NO_PAD.decode(salt_part) else {
        return false;
    };
    let Ok(expected) = URL_SAFE_NO_PAD.decode(digest_part) else {
        return false;
    };

    let actual = salted_digest(&salt, code);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn salted_digest(salt: &[u8], code: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(code.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_unique_and_unpadded() {
        let a = generate_code();
        let b = generate_code();
        assert_ne!(a, b);
        assert!(!a.contains('='));
        // 32 bytes of entropy -> 43 base64url characters
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn verification_tokens_are_shorter_than_codes() {
        let token = generate_verification_token();
        assert_eq!(token.len(), 22);
    }

    #[test]
    fn hash_round_trip_verifies() {
        let code = generate_code();
        let hash = hash_code(&code);
        assert!(verify_code(&code, &hash));
    }

    #[test]
    fn wrong_code_fails_verification() {
        let hash = hash_code("right-code");
        assert!(!verify_code("wrong-code", &hash));
    }

    #[test]
    fn same_code_hashes_differently_per_card() {
        let first = hash_code("shared-code");
        let second = hash_code("shared-code");
        assert_ne!(first, second);
        assert!(verify_code("shared-code", &first));
        assert!(verify_code("shared-code", &second));
    }

    #[test]
    fn malformed_stored_hash_fails_closed() {
        assert!(!verify_code("anything", "no-separator"));
        assert!(!verify_code("anything", "!!$not-base64"));
    }
}
