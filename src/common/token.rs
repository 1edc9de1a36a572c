// src/common/token.rs
//! Crockford Base32 ID and session token generator
//!
//! User ids are short prefixed ids (U_XXXXXX). Session tokens are long raw
//! strings drawn from the same alphabet; `rand::thread_rng` is a CSPRNG, so
//! tokens are unguessable and carry no ordering.

use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Session tokens are 40 characters = 200 bits of randomness.
const SESSION_TOKEN_LEN: usize = 40;

/// Generate a random Crockford Base32 string of specified length
fn generate_crockford_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..32);
            CROCKFORD_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a User ID (U_XXXXXX)
pub fn generate_user_id() -> String {
    format!("U_{}", generate_crockford_string(6))
}

/// Generate an opaque session bearer token.
///
/// Tokens are immutable once issued and unique by construction (the store
/// additionally enforces a UNIQUE constraint).
pub fn generate_session_token() -> String {
    generate_crockford_string(SESSION_TOKEN_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_user_id_format() {
        let id = generate_user_id();
        assert!(id.starts_with("U_"));
        assert_eq!(id.len(), 8); // "U_" + 6 chars
    }

    #[test]
    fn test_crockford_alphabet_only() {
        let token = generate_session_token();
        for c in token.chars() {
            assert!(
                CROCKFORD_ALPHABET.contains(&(c as u8)),
                "Character '{}' not in Crockford alphabet",
                c
            );
        }

        // Verify no ambiguous characters
        assert!(!token.contains('I'));
        assert!(!token.contains('L'));
        assert!(!token.contains('O'));
        assert!(!token.contains('U'));
    }

    #[test]
    fn test_session_token_length() {
        assert_eq!(generate_session_token().len(), SESSION_TOKEN_LEN);
    }

    #[test]
    fn test_uniqueness() {
        let mut tokens = HashSet::new();
        for _ in 0..1000 {
            let token = generate_session_token();
            assert!(tokens.insert(token), "Duplicate session token generated");
        }
    }
}
